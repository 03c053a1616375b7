//! Shared fixtures for unit and end-to-end tests.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::http::header;
use axum_test::TestServer;
use serde_json::json;

use crate::{
    AppState, Application,
    auth::{
        password::{Argon2Params, hash_password},
        resolver::CredentialResolver,
        roles::Role,
        token::BearerTokens,
    },
    config::Config,
    db::{
        errors::{DbError, Result},
        handlers::{InMemorySessions, InMemoryUsers, SessionStore, UserStore},
        models::{
            sessions::SessionDBResponse,
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    types::UserId,
};

pub const TEST_SECRET: &str = "test-secret-key-for-testing-only";

/// Argon2 parameters cheap enough for tests
pub fn cheap_argon2_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

pub fn create_test_config() -> Config {
    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some(TEST_SECRET.to_string()),
        admin_email: "admin@test.local".to_string(),
        admin_password: None,
        ..Default::default()
    };

    let params = cheap_argon2_params();
    config.auth.password.argon2_memory_kib = params.memory_kib;
    config.auth.password.argon2_iterations = params.iterations;
    config.auth.password.argon2_parallelism = params.parallelism;
    config.auth.session.cookie_secure = false;
    config
}

/// Bearer token signer/verifier matching [`create_test_config`]
pub fn test_tokens() -> BearerTokens {
    BearerTokens::new(TEST_SECRET, Duration::from_secs(3600))
}

/// Full application behind a test server, plus its state for seeding and inspection
pub async fn create_test_app(config: Config) -> (TestServer, AppState) {
    let app = Application::new(config).await.expect("Failed to create application");
    let state = app.state().clone();
    let (server, _bg_services) = app.into_test_server();
    (server, state)
}

/// Create a user with a password directly in storage
pub async fn seed_user(state: &AppState, email: &str, password: &str, role: Role) -> UserDBResponse {
    let password_hash = hash_password(password, cheap_argon2_params()).expect("Failed to hash password");
    state
        .users
        .create_user(&UserCreateDBRequest {
            username: email.split('@').next().unwrap_or(email).to_string(),
            email: email.to_string(),
            role,
            password_hash: Some(password_hash),
        })
        .await
        .expect("Failed to create test user")
}

/// Log in through the API and return the `name=value` pair for a `Cookie` header
pub async fn login_as(server: &TestServer, email: &str, password: &str) -> String {
    let response = server
        .post("/auth/login")
        .json(&json!({"email": email, "password": password}))
        .await;
    response.assert_status_ok();

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("login should set a cookie")
        .to_str()
        .expect("cookie should be ASCII")
        .to_string();
    set_cookie.split(';').next().unwrap_or_default().to_string()
}

/// In-memory stores for exercising the resolver without HTTP
pub struct TestStores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
}

impl Default for TestStores {
    fn default() -> Self {
        Self::new()
    }
}

impl TestStores {
    pub fn new() -> Self {
        let users: Arc<dyn UserStore> = Arc::new(InMemoryUsers::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessions::new(users.clone()));
        Self { users, sessions }
    }

    pub async fn user(&self, email: &str, role: Role) -> UserDBResponse {
        self.users
            .create_user(&UserCreateDBRequest {
                username: email.to_string(),
                email: email.to_string(),
                role,
                password_hash: None,
            })
            .await
            .expect("Failed to create test user")
    }

    pub async fn session(&self, user_id: UserId, ttl: Duration) -> SessionDBResponse {
        self.sessions.create_session(user_id, ttl).await.expect("Failed to create session")
    }

    /// Session-then-bearer resolver over these stores, verifying with [`test_tokens`]
    pub fn resolver(&self) -> CredentialResolver {
        CredentialResolver::standard(self.sessions.clone(), self.users.clone(), test_tokens())
    }
}

fn outage() -> DbError {
    DbError::Unavailable("connection refused".to_string())
}

/// Session store whose every call fails as if storage were unreachable
pub struct FailingSessions;

#[async_trait]
impl SessionStore for FailingSessions {
    async fn create_session(&self, _user_id: UserId, _ttl: Duration) -> Result<SessionDBResponse> {
        Err(outage())
    }

    async fn lookup_user(&self, _token: &str) -> Result<Option<UserDBResponse>> {
        Err(outage())
    }

    async fn invalidate(&self, _token: &str) -> Result<bool> {
        Err(outage())
    }

    async fn purge_expired(&self) -> Result<usize> {
        Err(outage())
    }
}

/// User store whose every call fails as if storage were unreachable
pub struct FailingUsers;

#[async_trait]
impl UserStore for FailingUsers {
    async fn create_user(&self, _request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        Err(outage())
    }

    async fn find_user_by_id(&self, _id: UserId) -> Result<Option<UserDBResponse>> {
        Err(outage())
    }

    async fn find_user_by_email(&self, _email: &str) -> Result<Option<UserDBResponse>> {
        Err(outage())
    }

    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        Err(outage())
    }

    async fn update_role(&self, _id: UserId, _role: Role) -> Result<UserDBResponse> {
        Err(outage())
    }

    async fn update_password(&self, _id: UserId, _password_hash: Option<String>) -> Result<UserDBResponse> {
        Err(outage())
    }
}
