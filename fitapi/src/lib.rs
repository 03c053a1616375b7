//! # fitapi: authentication and role-based authorization for a fitness platform
//!
//! `fitapi` is the identity core of a multi-tenant fitness backend. It decides who is calling and
//! whether their role lets them reach a route. Domain resources (gyms, challenges, training
//! logs) sit behind these gates and are not part of this crate.
//!
//! ## Request flow
//!
//! Every protected route sits behind two gates:
//!
//! 1. The **authentication gate** ([`auth::middleware::require_authentication`]) lifts the session
//!    cookie and `Authorization` header off the request and hands them to the
//!    [`CredentialResolver`](auth::resolver::CredentialResolver). The session cookie is tried
//!    first; if it is missing, unknown or expired, a `Bearer` token is tried next. The first
//!    credential that resolves wins and the resulting [`Principal`](api::models::users::Principal)
//!    is attached to the request. No principal means `401`.
//! 2. The **authorization gate** ([`auth::middleware::require_role`]) compares the principal's role
//!    against the route's required role using the configured
//!    [`RoleHierarchy`](auth::roles::RoleHierarchy). A role satisfies a requirement if it is the
//!    same role or inherits it, directly or transitively. A shortfall means `403`.
//!
//! Both rejections, like every other error, are JSON bodies of the shape
//! `{"message": ..., "status": ..., "timestamp": ...}`.
//!
//! ## Credentials
//!
//! - **Sessions** are opaque random tokens stored server side and carried in an `HttpOnly` cookie
//!   (named `session` by default). They are created by `POST /auth/login` and
//!   `POST /auth/register` and ended by `POST /auth/logout` or by expiring.
//! - **Bearer tokens** are HS256 JWTs signed with `secret_key`. They carry only the user id; the
//!   user's role is read from storage on every request, so role changes apply immediately.
//!
//! ## Configuration
//!
//! See [`config`] for the YAML layout and environment overrides. The role hierarchy is part of the
//! configuration and a cyclic hierarchy stops the server from starting.
//!
//! ## Storage
//!
//! Users and sessions live behind the [`UserStore`](db::handlers::UserStore) and
//! [`SessionStore`](db::handlers::SessionStore) traits. The bundled implementations are in-memory.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod telemetry;
pub mod types;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use bon::Builder;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, error, info, instrument, warn};

pub use config::Config;

use crate::{
    api::handlers::{auth as auth_handlers, users as user_handlers},
    auth::{
        middleware::{RequireRoleLayer, require_authentication, require_role},
        password::{self, Argon2Params},
        resolver::CredentialResolver,
        roles::{Role, RoleHierarchy},
        token::BearerTokens,
    },
    db::{
        handlers::{InMemorySessions, InMemoryUsers, SessionStore, UserStore},
        models::users::UserCreateDBRequest,
    },
    errors::Error,
    types::{UserId, abbrev_uuid},
};

/// Shared state handed to every handler and middleware.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .users(users)
///     .sessions(sessions)
///     .tokens(tokens)
///     .hierarchy(hierarchy)
///     .resolver(resolver)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub tokens: BearerTokens,
    pub hierarchy: Arc<RoleHierarchy>,
    pub resolver: Arc<CredentialResolver>,
}

impl AppState {
    /// Derive tokens, hierarchy and the standard resolver from `config` and wire them to the stores.
    pub fn from_config(config: Config, users: Arc<dyn UserStore>, sessions: Arc<dyn SessionStore>) -> Result<Self, Error> {
        let tokens = BearerTokens::from_config(&config)?;
        let hierarchy = Arc::new(config.role_hierarchy()?);
        let resolver = Arc::new(CredentialResolver::standard(sessions.clone(), users.clone(), tokens.clone()));

        Ok(Self::builder()
            .config(config)
            .users(users)
            .sessions(sessions)
            .tokens(tokens)
            .hierarchy(hierarchy)
            .resolver(resolver)
            .build())
    }

    /// Authorization gate for `required` against this state's hierarchy
    pub fn require_role(&self, required: Role) -> RequireRoleLayer {
        require_role(self.hierarchy.clone(), required)
    }
}

/// Create the initial admin user if it doesn't exist.
///
/// Idempotent. An existing user with this email is promoted to `ADMIN` if needed and, when a
/// password is given, has it replaced. Returns the admin's id.
#[instrument(skip_all)]
pub async fn create_initial_admin_user(
    email: &str,
    password: Option<&str>,
    users: &dyn UserStore,
    params: Argon2Params,
) -> Result<UserId, Error> {
    let password_hash = match password {
        Some(pwd) => Some(password::hash_password_blocking(pwd.to_string(), params).await?),
        None => None,
    };

    if let Some(existing_user) = users.find_user_by_email(email).await? {
        if existing_user.role != Role::Admin {
            users.update_role(existing_user.id, Role::Admin).await?;
        }
        if password_hash.is_some() {
            users.update_password(existing_user.id, password_hash).await?;
        }
        debug!("Initial admin {} already present", abbrev_uuid(&existing_user.id));
        return Ok(existing_user.id);
    }

    let created_user = users
        .create_user(&UserCreateDBRequest {
            username: email.to_string(),
            email: email.to_string(),
            role: Role::Admin,
            password_hash,
        })
        .await?;

    info!("Created initial admin user {}", abbrev_uuid(&created_user.id));
    Ok(created_user.id)
}

/// Build the application router.
///
/// | Route | Gates |
/// |---|---|
/// | `GET /healthz`, `POST /auth/{login,logout,register}` | none |
/// | `GET /auth/me`, `POST /auth/token`, `POST /auth/password` | authenticated |
/// | `GET /users/{id}` | authenticated, `MODERATOR` |
/// | `GET /users`, `PATCH /users/{id}/role` | authenticated, `ADMIN` |
pub fn build_router(state: &AppState) -> Router {
    let authenticated = Router::new()
        .route("/auth/me", get(auth_handlers::me))
        .route("/auth/token", post(auth_handlers::issue_token))
        .route("/auth/password", post(auth_handlers::change_password));

    let moderator = Router::new()
        .route("/users/{id}", get(user_handlers::get_user))
        .route_layer(state.require_role(Role::Moderator));

    let admin = Router::new()
        .route("/users", get(user_handlers::list_users))
        .route("/users/{id}/role", patch(user_handlers::update_role))
        .route_layer(state.require_role(Role::Admin));

    // Role gates are added first so they run after authentication
    let protected = authenticated
        .merge(moderator)
        .merge(admin)
        .route_layer(from_fn_with_state(state.clone(), require_authentication));

    Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/logout", post(auth_handlers::logout))
        .route("/auth/register", post(auth_handlers::register))
        .merge(protected)
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Sweep expired sessions every `interval` until `shutdown` fires.
fn spawn_session_purge(sessions: Arc<dyn SessionStore>, interval: Duration, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Session purge task stopping");
                    break;
                }
                _ = ticker.tick() => match sessions.purge_expired().await {
                    Ok(0) => {}
                    Ok(purged) => debug!("Purged {} expired sessions", purged),
                    Err(e) if e.is_transient() => warn!("Session storage unavailable, skipping purge: {}", e),
                    Err(e) => error!("Failed to purge expired sessions: {:#}", e),
                },
            }
        }
    })
}

/// Background tasks and the token that stops them.
pub struct BackgroundServices {
    background_tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown_token: CancellationToken,
}

impl BackgroundServices {
    /// Gracefully shutdown all background tasks
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        for handle in self.background_tasks {
            let _ = handle.await;
        }
    }
}

/// Owns the router, state and background tasks for one server instance.
///
/// 1. [`Application::new`] builds storage, seeds the initial admin and starts background tasks
/// 2. [`Application::serve`] binds the configured address and serves until `shutdown` resolves
pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    bg_services: BackgroundServices,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!(
            "Starting on {} with role hierarchy {:?}",
            config.bind_address(),
            config.auth.role_hierarchy
        );

        let users: Arc<dyn UserStore> = Arc::new(InMemoryUsers::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessions::new(users.clone()));
        let app_state = AppState::from_config(config.clone(), users, sessions)?;

        create_initial_admin_user(
            &config.admin_email,
            config.admin_password.as_deref(),
            app_state.users.as_ref(),
            config.auth.password.argon2_params(),
        )
        .await?;

        let shutdown_token = CancellationToken::new();
        let purge = spawn_session_purge(
            app_state.sessions.clone(),
            config.auth.session.purge_interval,
            shutdown_token.clone(),
        );
        let bg_services = BackgroundServices {
            background_tasks: vec![purge],
            shutdown_token,
        };

        let router = build_router(&app_state);

        Ok(Self {
            router,
            app_state,
            config,
            bg_services,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.app_state
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> (axum_test::TestServer, BackgroundServices) {
        let server = axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server");
        (server, self.bg_services)
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("fitapi listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Stopping background tasks...");
        self.bg_services.shutdown().await;

        Ok(())
    }
}
