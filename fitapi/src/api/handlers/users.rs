use axum::{
    Json,
    extract::{Path, State},
};

use crate::{
    AppState,
    api::models::{
        response::ApiResponse,
        users::{Principal, RoleUpdate, UserResponse},
    },
    db::errors::DbError,
    errors::Error,
    types::{UserId, abbrev_uuid},
};

/// List all users (ADMIN)
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>) -> Result<ApiResponse<Vec<UserResponse>>, Error> {
    let users = state.users.list_users().await?;
    let users: Vec<UserResponse> = users.into_iter().map(UserResponse::from).collect();

    Ok(ApiResponse::ok(format!("{} users", users.len()), users))
}

/// Get a single user (MODERATOR)
#[tracing::instrument(skip_all, fields(user = %abbrev_uuid(&id)))]
pub async fn get_user(State(state): State<AppState>, Path(id): Path<UserId>) -> Result<ApiResponse<UserResponse>, Error> {
    let user = state.users.find_user_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: "User".to_string(),
        id: id.to_string(),
    })?;

    Ok(ApiResponse::ok("User found", UserResponse::from(user)))
}

/// Change a user's role (ADMIN). Takes effect on the user's next request, sessions included.
#[tracing::instrument(skip_all, fields(user = %abbrev_uuid(&id)))]
pub async fn update_role(
    State(state): State<AppState>,
    principal: Principal,
    Path(id): Path<UserId>,
    Json(update): Json<RoleUpdate>,
) -> Result<ApiResponse<UserResponse>, Error> {
    if principal.id == id && update.role != principal.role {
        return Err(Error::BadRequest {
            message: "Cannot change your own role".to_string(),
        });
    }

    let user = state.users.update_role(id, update.role).await.map_err(|e| match e {
        DbError::NotFound => Error::NotFound {
            resource: "User".to_string(),
            id: id.to_string(),
        },
        other => other.into(),
    })?;

    tracing::info!(
        "User {} changed role of {} to {}",
        abbrev_uuid(&principal.id),
        abbrev_uuid(&id),
        update.role
    );
    Ok(ApiResponse::ok("Role updated", UserResponse::from(user)))
}
