//! Credential resolution: turn a request's session cookie and/or bearer header into a principal.
//!
//! Resolution walks an ordered list of [`CredentialStrategy`]s and stops at the first one that
//! finds a principal. The standard order is session cookie first, then bearer token. Each strategy
//! reports one of three outcomes ([`Resolution`]); the resolver treats both `NotFound` and
//! `TransientError` as "try the next strategy", so a storage outage during the session lookup
//! still lets a valid bearer token through. Transient errors are logged at `warn` so an outage does
//! not hide behind a stream of 401s.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use tracing::{debug, instrument, trace, warn};

use crate::{
    api::models::users::Principal,
    auth::{session::session_tokens_from_headers, token::BearerTokens},
    db::handlers::{SessionStore, UserStore},
    errors::Error,
    types::abbrev_uuid,
};

/// The scheme prefix accepted on the `Authorization` header. Case-sensitive, one space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Raw credentials lifted off a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestCredentials {
    /// Every value of the session cookie, in the order sent
    pub session_tokens: Vec<String>,
    pub authorization: Option<String>,
}

impl RequestCredentials {
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        Self {
            session_tokens: session_tokens_from_headers(headers, cookie_name),
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        }
    }

    /// The token after a literal `Bearer ` prefix, if the header uses that scheme
    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization.as_deref()?.strip_prefix(BEARER_PREFIX)
    }
}

/// Outcome of a single strategy.
#[derive(Debug)]
pub enum Resolution {
    Found(Principal),
    /// Credential absent, malformed, expired, or pointing at a user that no longer exists
    NotFound,
    /// A collaborator failed; the credential may well be valid
    TransientError(Error),
}

impl Resolution {
    pub fn into_principal(self) -> Option<Principal> {
        match self {
            Resolution::Found(principal) => Some(principal),
            Resolution::NotFound | Resolution::TransientError(_) => None,
        }
    }
}

#[async_trait]
pub trait CredentialStrategy: Send + Sync {
    /// Short label used in logs
    fn name(&self) -> &'static str;

    async fn resolve(&self, credentials: &RequestCredentials) -> Resolution;
}

/// Looks the session cookie up in session storage. Each value of a duplicated cookie is tried in
/// turn; a storage failure is reported only if no value resolved.
pub struct SessionStrategy {
    sessions: Arc<dyn SessionStore>,
}

impl SessionStrategy {
    pub fn new(sessions: Arc<dyn SessionStore>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl CredentialStrategy for SessionStrategy {
    fn name(&self) -> &'static str {
        "session"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Resolution {
        let mut failure = None;

        for token in &credentials.session_tokens {
            match self.sessions.lookup_user(token).await {
                Ok(Some(user)) => return Resolution::Found(user.into()),
                Ok(None) => {}
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Resolution::TransientError(e.into()),
            None => Resolution::NotFound,
        }
    }
}

/// Verifies a `Bearer` token and loads the user named by its `sub` claim.
pub struct BearerStrategy {
    tokens: BearerTokens,
    users: Arc<dyn UserStore>,
}

impl BearerStrategy {
    pub fn new(tokens: BearerTokens, users: Arc<dyn UserStore>) -> Self {
        Self { tokens, users }
    }
}

#[async_trait]
impl CredentialStrategy for BearerStrategy {
    fn name(&self) -> &'static str {
        "bearer"
    }

    async fn resolve(&self, credentials: &RequestCredentials) -> Resolution {
        let Some(token) = credentials.bearer_token() else {
            if credentials.authorization.is_some() {
                trace!("Authorization header present but not a Bearer credential");
            }
            return Resolution::NotFound;
        };

        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(Error::Unauthenticated { .. }) => return Resolution::NotFound,
            Err(e) => return Resolution::TransientError(e),
        };

        match self.users.find_user_by_id(claims.sub).await {
            Ok(Some(user)) => Resolution::Found(user.into()),
            Ok(None) => {
                debug!("Bearer token names unknown user {}", abbrev_uuid(&claims.sub));
                Resolution::NotFound
            }
            Err(e) => Resolution::TransientError(e.into()),
        }
    }
}

/// Ordered list of strategies; first `Found` wins and identities are never merged.
pub struct CredentialResolver {
    strategies: Vec<Box<dyn CredentialStrategy>>,
}

impl CredentialResolver {
    pub fn new(strategies: Vec<Box<dyn CredentialStrategy>>) -> Self {
        Self { strategies }
    }

    /// Session cookie first, then bearer token
    pub fn standard(sessions: Arc<dyn SessionStore>, users: Arc<dyn UserStore>, tokens: BearerTokens) -> Self {
        Self::new(vec![
            Box::new(SessionStrategy::new(sessions)),
            Box::new(BearerStrategy::new(tokens, users)),
        ])
    }

    /// Resolve to a principal, or `None` if no strategy produced one. Never fails.
    pub async fn resolve(&self, credentials: &RequestCredentials) -> Option<Principal> {
        self.resolve_detailed(credentials)
            .await
            .into_iter()
            .find_map(|(_, resolution)| resolution.into_principal())
    }

    /// Every strategy's outcome up to and including the first `Found`, in order.
    #[instrument(skip_all)]
    pub async fn resolve_detailed(&self, credentials: &RequestCredentials) -> Vec<(&'static str, Resolution)> {
        let mut outcomes = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let resolution = strategy.resolve(credentials).await;
            match &resolution {
                Resolution::Found(principal) => {
                    debug!("Resolved user {} via {}", abbrev_uuid(&principal.id), strategy.name());
                    outcomes.push((strategy.name(), resolution));
                    return outcomes;
                }
                Resolution::NotFound => {
                    trace!("No principal via {}", strategy.name());
                }
                Resolution::TransientError(e) => {
                    warn!("Credential lookup via {} failed, falling through: {:#}", strategy.name(), e);
                }
            }
            outcomes.push((strategy.name(), resolution));
        }

        outcomes
    }
}
