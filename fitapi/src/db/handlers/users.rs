use async_trait::async_trait;
use chrono::Utc;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    auth::roles::Role,
    db::{
        errors::{DbError, Result},
        models::users::{UserCreateDBRequest, UserDBResponse},
    },
    types::{UserId, abbrev_uuid},
};

/// User storage as consumed by authentication and the user routes.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Emails compare case-insensitively
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>>;

    /// All users, oldest first
    async fn list_users(&self) -> Result<Vec<UserDBResponse>>;

    async fn update_role(&self, id: UserId, role: Role) -> Result<UserDBResponse>;

    async fn update_password(&self, id: UserId, password_hash: Option<String>) -> Result<UserDBResponse>;
}

/// `DashMap`-backed user store with a secondary index on normalised email.
#[derive(Debug, Default)]
pub struct InMemoryUsers {
    users: DashMap<UserId, UserDBResponse>,
    by_email: DashMap<String, UserId>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl UserStore for InMemoryUsers {
    #[instrument(skip_all, err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let now = Utc::now();
        let user = UserDBResponse {
            id: Uuid::new_v4(),
            username: request.username.clone(),
            email: request.email.trim().to_string(),
            role: request.role,
            password_hash: request.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.by_email.entry(normalise_email(&request.email)) {
            Entry::Occupied(_) => {
                return Err(DbError::UniqueViolation {
                    entity: "users".to_string(),
                    field: "email".to_string(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(user.id);
                self.users.insert(user.id, user.clone());
            }
        }

        debug!("Created user {} with role {}", abbrev_uuid(&user.id), user.role);
        Ok(user)
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let Some(id) = self.by_email.get(&normalise_email(email)).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.find_user_by_id(id).await
    }

    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        let mut users: Vec<UserDBResponse> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.email.cmp(&b.email)));
        Ok(users)
    }

    #[instrument(skip(self), err)]
    async fn update_role(&self, id: UserId, role: Role) -> Result<UserDBResponse> {
        let mut entry = self.users.get_mut(&id).ok_or(DbError::NotFound)?;
        entry.role = role;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }

    #[instrument(skip_all, err)]
    async fn update_password(&self, id: UserId, password_hash: Option<String>) -> Result<UserDBResponse> {
        let mut entry = self.users.get_mut(&id).ok_or(DbError::NotFound)?;
        entry.password_hash = password_hash;
        entry.updated_at = Utc::now();
        Ok(entry.value().clone())
    }
}
