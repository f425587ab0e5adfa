use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing)]
    pub verification_token: String,
    pub profile_pic_path: Option<String>,
}
