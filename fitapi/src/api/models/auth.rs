use axum::{
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::api::models::{response::ApiResponse, users::Principal};

/// Request to login
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request to register a new user
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    /// Password (will be hashed)
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// A freshly signed bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerToken {
    pub token: String,
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: u64,
}

impl BearerToken {
    pub fn new(token: String, expires_in: u64) -> Self {
        Self {
            token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Payload after successful login or registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthPayload {
    pub user: Principal,
    pub bearer: BearerToken,
}

/// Envelope plus a `Set-Cookie` header, for responses that start or end a session
pub struct WithSessionCookie<T> {
    pub body: ApiResponse<T>,
    pub cookie: String,
}

impl<T: Serialize> IntoResponse for WithSessionCookie<T> {
    fn into_response(self) -> Response {
        let mut response = self.body.into_response();
        match HeaderValue::from_str(&self.cookie) {
            Ok(value) => {
                response.headers_mut().insert(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Dropping unencodable session cookie: {e}"),
        }
        response
    }
}
