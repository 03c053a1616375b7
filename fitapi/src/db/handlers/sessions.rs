use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, instrument, trace};

use crate::{
    auth::session::generate_session_token,
    db::{
        errors::{DbError, Result},
        handlers::users::UserStore,
        models::{sessions::SessionDBResponse, users::UserDBResponse},
    },
    types::{UserId, abbrev_uuid},
};

/// Session storage. Lookups never mutate; sessions end through [`SessionStore::invalidate`] or by
/// passing their expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a session for `user_id` lasting `ttl`
    async fn create_session(&self, user_id: UserId, ttl: Duration) -> Result<SessionDBResponse>;

    /// Resolve a session token to its user. Unknown and expired tokens, and sessions whose user has
    /// since been deleted, are `Ok(None)`.
    async fn lookup_user(&self, token: &str) -> Result<Option<UserDBResponse>>;

    /// Returns whether a session was removed
    async fn invalidate(&self, token: &str) -> Result<bool>;

    /// Drop expired sessions, returning how many were removed
    async fn purge_expired(&self) -> Result<usize>;
}

/// `DashMap`-backed session store. User details are read through the user store on every lookup, so
/// a role change applies to existing sessions immediately.
pub struct InMemorySessions {
    sessions: DashMap<String, SessionDBResponse>,
    users: Arc<dyn UserStore>,
}

impl InMemorySessions {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            users,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessions {
    #[instrument(skip(self), fields(user = %abbrev_uuid(&user_id)), err)]
    async fn create_session(&self, user_id: UserId, ttl: Duration) -> Result<SessionDBResponse> {
        let ttl = chrono::Duration::from_std(ttl).map_err(|e| DbError::Other(anyhow::anyhow!("session ttl out of range: {e}")))?;
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| DbError::Other(anyhow::anyhow!("session ttl of {}s overflows the clock", ttl.num_seconds())))?;
        let session = SessionDBResponse {
            token: generate_session_token(),
            user_id,
            created_at: now,
            expires_at,
        };

        self.sessions.insert(session.token.clone(), session.clone());
        debug!("Created session expiring at {}", session.expires_at);
        Ok(session)
    }

    async fn lookup_user(&self, token: &str) -> Result<Option<UserDBResponse>> {
        // Clone out so the shard guard is released before awaiting the user store
        let Some(session) = self.sessions.get(token).map(|entry| entry.value().clone()) else {
            trace!("No session for presented token");
            return Ok(None);
        };

        if session.is_expired_at(Utc::now()) {
            trace!("Session for user {} has expired", abbrev_uuid(&session.user_id));
            return Ok(None);
        }

        self.users.find_user_by_id(session.user_id).await
    }

    async fn invalidate(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.remove(token).is_some())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| !session.is_expired_at(now));
        Ok(before.saturating_sub(self.sessions.len()))
    }
}
