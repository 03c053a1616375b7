use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{api::models::users::Principal, errors::Error};

/// Handlers behind the authentication gate take the principal as an argument.
///
/// Only reads what the gate attached; a route without the gate always gets 401.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(Error::Unauthenticated { message: None })
    }
}
