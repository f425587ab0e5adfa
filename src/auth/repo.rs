use crate::auth::repo_types::User;
use sqlx::PgPool;
use thiserror::Error;

const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, is_superuser, \
                            created_at, verification_token, profile_pic_path";

/// Insert failures classified by the violated unique constraint. The database
/// index is the single arbiter of uniqueness, so concurrent inserts racing on
/// the same username/email resolve here, not in the service layer.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("username already taken")]
    DuplicateUsername,
    #[error("email already taken")]
    DuplicateEmail,
    #[error("verification token collision")]
    DuplicateToken,
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

fn classify_insert_error(err: sqlx::Error) -> InsertError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.constraint() {
            Some("users_username_key") => return InsertError::DuplicateUsername,
            Some("users_email_key") => return InsertError::DuplicateEmail,
            Some("users_verification_token_key") => return InsertError::DuplicateToken,
            _ => {}
        }
    }
    InsertError::Other(err)
}

impl User {
    pub async fn find_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(db)
            .await
    }

    /// Login identifier may be either a username or an email.
    pub async fn find_by_username_or_email(
        db: &PgPool,
        identifier: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = $1"
        ))
        .bind(identifier)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_verification_token(
        db: &PgPool,
        token: &str,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE verification_token = $1"
        ))
        .bind(token)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create an inactive user. All-or-nothing: a duplicate key leaves no row
    /// behind and reports which field collided.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
        verification_token: &str,
    ) -> Result<User, InsertError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash, verification_token) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(verification_token)
        .fetch_one(db)
        .await
        .map_err(classify_insert_error)
    }

    pub async fn activate(db: &PgPool, id: i64) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_profile_pic(db: &PgPool, id: i64, path: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET profile_pic_path = $2 WHERE id = $1")
            .bind(id)
            .bind(path)
            .execute(db)
            .await?;
        Ok(())
    }
}
