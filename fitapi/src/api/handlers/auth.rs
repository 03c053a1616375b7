use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::{
    AppState,
    api::models::{
        auth::{AuthPayload, BearerToken, ChangePasswordRequest, LoginRequest, RegisterRequest, WithSessionCookie},
        response::ApiResponse,
        users::{Principal, UserResponse},
    },
    auth::{
        password,
        roles::Role,
        session::{cleared_session_cookie, session_cookie, session_tokens_from_headers},
    },
    db::models::users::{UserCreateDBRequest, UserDBResponse},
    errors::Error,
    types::abbrev_uuid,
};

fn invalid_credentials() -> Error {
    Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    }
}

fn validate_password_length(state: &AppState, password: &str) -> Result<(), Error> {
    let password_config = &state.config.auth.password;
    let length = password.chars().count();
    if length < password_config.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", password_config.min_length),
        });
    }
    if length > password_config.max_length {
        return Err(Error::BadRequest {
            message: format!("Password must be no more than {} characters", password_config.max_length),
        });
    }
    Ok(())
}

/// Start a session for `user` and build the response carrying its cookie and a bearer token.
async fn start_session(
    state: &AppState,
    user: UserDBResponse,
    status: StatusCode,
    message: &str,
) -> Result<WithSessionCookie<AuthPayload>, Error> {
    let session_config = &state.config.auth.session;
    let session = state.sessions.create_session(user.id, session_config.timeout).await?;
    let token = state.tokens.issue(user.id)?;

    let payload = AuthPayload {
        user: Principal::from(user),
        bearer: BearerToken::new(token, state.tokens.expiry().as_secs()),
    };

    Ok(WithSessionCookie {
        body: ApiResponse::new(status, message, Some(payload)),
        cookie: session_cookie(&session.token, session_config),
    })
}

/// Login with email and password
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<WithSessionCookie<AuthPayload>, Error> {
    let user = state.users.find_user_by_email(&request.email).await?.ok_or_else(invalid_credentials)?;

    // Accounts without a password (e.g. a seeded admin with none configured) cannot log in
    let password_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;

    if !password::verify_password_blocking(request.password, password_hash).await? {
        return Err(invalid_credentials());
    }

    tracing::info!("User {} logged in", abbrev_uuid(&user.id));
    start_session(&state, user, StatusCode::OK, "Login successful").await
}

/// Logout: end every session named by the cookie, if any, and clear the cookie
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<WithSessionCookie<()>, Error> {
    let session_config = &state.config.auth.session;

    for token in session_tokens_from_headers(&headers, &session_config.cookie_name) {
        if state.sessions.invalidate(&token).await? {
            tracing::debug!("Session invalidated");
        } else {
            tracing::debug!("Logout for unknown or already ended session");
        }
    }

    Ok(WithSessionCookie {
        body: ApiResponse::new(StatusCode::OK, "Logout successful", None),
        cookie: cleared_session_cookie(session_config),
    })
}

/// Register a new account with the `USER` role
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<WithSessionCookie<AuthPayload>, Error> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    if request.email.trim().is_empty() || !request.email.contains('@') {
        return Err(Error::BadRequest {
            message: "A valid email address is required".to_string(),
        });
    }
    if request.username.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "Username cannot be empty".to_string(),
        });
    }
    validate_password_length(&state, &request.password)?;

    let password_hash = password::hash_password_blocking(request.password, state.config.auth.password.argon2_params()).await?;

    // Email uniqueness is enforced by the store and surfaces as 409
    let user = state
        .users
        .create_user(&UserCreateDBRequest {
            username: request.username,
            email: request.email,
            role: Role::User,
            password_hash: Some(password_hash),
        })
        .await?;

    tracing::info!("Registered user {}", abbrev_uuid(&user.id));
    start_session(&state, user, StatusCode::CREATED, "Registration successful").await
}

/// The authenticated principal
#[tracing::instrument(skip_all)]
pub async fn me(principal: Principal) -> ApiResponse<Principal> {
    ApiResponse::ok("Authenticated", principal)
}

/// Issue a fresh bearer token for the authenticated principal
#[tracing::instrument(skip_all)]
pub async fn issue_token(State(state): State<AppState>, principal: Principal) -> Result<ApiResponse<BearerToken>, Error> {
    let token = state.tokens.issue(principal.id)?;
    Ok(ApiResponse::ok(
        "Token issued",
        BearerToken::new(token, state.tokens.expiry().as_secs()),
    ))
}

/// Change the authenticated user's password
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<ApiResponse<UserResponse>, Error> {
    let user = state
        .users
        .find_user_by_id(principal.id)
        .await?
        .ok_or_else(|| Error::Unauthenticated { message: None })?;

    let current_hash = user.password_hash.ok_or_else(|| Error::BadRequest {
        message: "Account has no password set".to_string(),
    })?;
    if !password::verify_password_blocking(request.current_password, current_hash).await? {
        return Err(Error::BadRequest {
            message: "Current password is incorrect".to_string(),
        });
    }

    validate_password_length(&state, &request.new_password)?;
    let new_hash = password::hash_password_blocking(request.new_password, state.config.auth.password.argon2_params()).await?;

    let updated = state.users.update_password(principal.id, Some(new_hash)).await?;
    tracing::info!("Password changed for user {}", abbrev_uuid(&principal.id));

    Ok(ApiResponse::ok("Password changed", UserResponse::from(updated)))
}
