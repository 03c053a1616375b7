use crate::types::UserId;
use chrono::{DateTime, Utc};

/// A login session as stored. The token is the opaque value carried in the session cookie.
#[derive(Debug, Clone)]
pub struct SessionDBResponse {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionDBResponse {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
