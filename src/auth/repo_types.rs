use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as stored by either backend.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String, // always lowercased
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2, not exposed in JSON
    pub full_name: String,
    pub profile_pic: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Input for creating a user; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub profile_pic: String,
}

impl NewUser {
    pub fn into_user(self, id: Uuid, now: OffsetDateTime) -> User {
        User {
            id,
            username: self.username,
            email: self.email.to_lowercase(),
            password_hash: self.password_hash,
            full_name: self.full_name,
            profile_pic: self.profile_pic,
            created_at: now,
        }
    }
}
