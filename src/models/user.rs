use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::Role;

/// Claims the provider embeds in the identity at sign-up time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub role: Option<Role>,
}

/// The authenticated identity as the hosted provider reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// Live session: provider-issued opaque token pair plus the identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: AuthUser,
}

impl AuthUser {
    pub fn role_claim(&self) -> Option<Role> {
        self.user_metadata.role
    }
}

/// Row in the `user` role table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub email: String,
    /// Raw on purpose; resolution always goes through `resolve_role`.
    pub role: String,
    pub created_at: NaiveDate,
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStaffRequest {
    pub role: Role,
}
