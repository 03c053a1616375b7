//! Storage collaborators for the authentication core.
//!
//! The auth layer only needs a handful of reads and writes against users and sessions, so storage
//! is expressed as two narrow async traits ([`handlers::UserStore`], [`handlers::SessionStore`]).
//! The in-memory implementations here back the server by default and are what the tests run
//! against; a relational implementation only has to satisfy the same traits.

pub mod errors;
pub mod handlers;
pub mod models;
