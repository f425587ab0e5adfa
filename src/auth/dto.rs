use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::repo_types::User;

/// Request body for user signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for login; the identifier may be a username or an email.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Request body for re-sending the verification email.
#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

impl TokenResponse {
    pub fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".into(),
        }
    }
}

/// Plain message responses (signup confirmation, verification results).
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Public part of the user returned to the client. Never carries the
/// password hash or the verification token.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub profile_pic_path: Option<String>,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            is_active: u.is_active,
            created_at: u.created_at,
            profile_pic_path: u.profile_pic_path,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfilePicResponse {
    pub message: String,
    pub profile_pic: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_user_omits_secrets() {
        let user = User {
            id: 1,
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: "$argon2id$secret".into(),
            is_active: true,
            is_superuser: false,
            created_at: OffsetDateTime::UNIX_EPOCH,
            verification_token: "very-secret-token".into(),
            profile_pic_path: None,
        };
        let json = serde_json::to_string(&PublicUser::from(user)).unwrap();
        assert!(json.contains("alice@x.com"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("very-secret-token"));
    }

    #[test]
    fn token_response_is_bearer() {
        let json = serde_json::to_string(&TokenResponse::bearer("abc".into())).unwrap();
        assert!(json.contains(r#""token_type":"bearer""#));
        assert!(json.contains(r#""access_token":"abc""#));
    }
}
