//! Storage traits and their in-memory implementations.

pub mod sessions;
pub mod users;

pub use sessions::{InMemorySessions, SessionStore};
pub use users::{InMemoryUsers, UserStore};
