//! Authentication and authorization.
//!
//! # Authentication
//!
//! Two credential types are accepted, tried in this order:
//!
//! ## 1. Session cookie
//!
//! Browser clients log in via `/auth/login` with email and password. The server stores an opaque
//! random token and returns it in an `HttpOnly` cookie. The session ends on logout or expiry.
//!
//! ## 2. Bearer token
//!
//! Programmatic clients send `Authorization: Bearer <jwt>`. Tokens are issued at login and by
//! `/auth/token`, signed with the configured secret, and carry only the user id. The scheme
//! prefix is matched exactly (`Bearer` followed by one space).
//!
//! A credential that is absent, invalid, expired, or names a user that no longer exists simply
//! yields no principal; so does a storage failure while checking it. See [`resolver`].
//!
//! # Authorization
//!
//! Routes declare a minimum [`Role`](roles::Role). A principal passes if its role equals the
//! requirement or inherits it through the configured [`RoleHierarchy`](roles::RoleHierarchy).
//! See [`middleware`] for the gates.

pub mod current_user;
pub mod middleware;
pub mod password;
pub mod resolver;
pub mod roles;
pub mod session;
pub mod token;
