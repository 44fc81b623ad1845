use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Stored Records ---

/// User
///
/// The canonical user record as kept by the store. Carries the password hash, so it is
/// never serialized to clients directly; responses use `UserProfile`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    // Stored name of the profile picture, if one was uploaded at registration.
    pub picture_path: Option<String>,
    pub location: Option<String>,
    pub occupation: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// NewUser
///
/// Everything needed to insert a user; the store assigns `id` and `created_at`.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub picture_path: Option<String>,
    pub location: Option<String>,
    pub occupation: Option<String>,
}

/// Post
///
/// A feed entry. Author name, location and picture are copied from the user at creation
/// time so the feed renders without a join.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub location: Option<String>,
    pub description: String,
    pub picture_path: Option<String>,
    pub user_picture_path: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub location: Option<String>,
    pub description: String,
    pub picture_path: Option<String>,
    pub user_picture_path: Option<String>,
}

// --- Pipeline Annotations ---

/// AttachmentRef
///
/// Where a committed attachment lives: its stored name, declared content type, size in
/// bytes, and the location clients fetch it from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AttachmentRef {
    pub name: String,
    pub content_type: String,
    #[ts(type = "number")]
    pub size: u64,
    pub url: String,
}

// --- Request Payloads ---

/// RegisterUserRequest
///
/// Text fields of the multipart registration form. The password is hashed before it
/// reaches the store and is never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterUserRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
}

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 5;

impl RegisterUserRequest {
    /// validate
    ///
    /// Rejects blank names, addresses without an `@`, and short passwords. Returns the
    /// machine-readable reason of the first failed check.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err("name_required");
        }
        let email = self.email.trim();
        if email.len() < 3 || !email.contains('@') {
            return Err("invalid_email");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err("password_too_short");
        }
        Ok(())
    }
}

/// CreatePostRequest
///
/// Text fields of a post creation body (multipart, JSON or url-encoded).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// --- Responses ---

/// UserProfile
///
/// The client-facing view of a user.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub picture_path: Option<String>,
    pub location: Option<String>,
    pub occupation: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            picture_path: user.picture_path,
            location: user.location,
            occupation: user.occupation,
            created_at: user.created_at,
        }
    }
}

/// CreatedUser
///
/// Registration response: the new profile plus the attachment committed with it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedUser {
    pub user: UserProfile,
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreatedPost {
    pub post: Post,
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}
