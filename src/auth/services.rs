use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::dto::SignupRequest;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::repo::InsertError;
use crate::auth::repo_types::User;
use crate::error::ApiError;
use crate::state::AppState;

// --- validation ---

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn is_valid_username(username: &str) -> bool {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    }
    USERNAME_RE.is_match(username)
}

/// Password strength policy. Thresholds live here rather than inline in the
/// signup path so deployments can tune them.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_len: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_len: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
        }
    }
}

impl PasswordPolicy {
    pub fn check(&self, password: &str) -> Result<(), String> {
        if password.chars().count() < self.min_len {
            return Err(format!(
                "Password must be at least {} characters",
                self.min_len
            ));
        }
        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err("Password must contain at least one uppercase letter".into());
        }
        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err("Password must contain at least one lowercase letter".into());
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            return Err("Password must contain at least one number".into());
        }
        Ok(())
    }
}

// --- verification tokens ---

/// Opaque single-purpose token mailed to the user. UUIDv4 gives 122 bits of
/// entropy; the unique index on the column backstops the negligible
/// collision odds.
pub fn new_verification_token() -> String {
    Uuid::new_v4().to_string()
}

fn verification_link(frontend_base_url: &str, token: &str) -> String {
    format!("{}/verify?token={}", frontend_base_url, token)
}

fn verification_email_html(username: &str, link: &str) -> String {
    format!(
        "<html>\n<body>\n\
         <h1>Welcome!</h1>\n\
         <p>Hi {username},</p>\n\
         <p>Please verify your email by clicking the link below:</p>\n\
         <p><a href=\"{link}\">Verify Email</a></p>\n\
         <p>Or copy and paste this link: {link}</p>\n\
         </body>\n</html>"
    )
}

/// Hand the verification email to a background task. The signup/resend
/// response never waits on SMTP; a failed send only reaches the log.
fn dispatch_verification_email(st: &AppState, user: &User, subject: &'static str) {
    let mailer = st.mailer.clone();
    let link = verification_link(&st.config.frontend_base_url, &user.verification_token);
    let html = verification_email_html(&user.username, &link);
    let email = user.email.clone();
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&email, subject, &html).await {
            warn!(error = %e, to = %email, "verification email dispatch failed");
        }
    });
}

// --- operations ---

pub async fn signup(st: &AppState, mut req: SignupRequest) -> Result<User, ApiError> {
    req.email = req.email.trim().to_lowercase();

    if !is_valid_username(&req.username) {
        return Err(ApiError::Validation(
            "Username may only contain letters, numbers and underscores".into(),
        ));
    }
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    PasswordPolicy::default()
        .check(&req.password)
        .map_err(ApiError::Validation)?;

    let password_hash = hash_password(&req.password)?;
    let token = new_verification_token();

    // Uniqueness is decided by the insert itself, not by a prior lookup.
    let user = User::create(&st.db, &req.username, &req.email, &password_hash, &token)
        .await
        .map_err(|e| match e {
            InsertError::DuplicateUsername => ApiError::Conflict("Username"),
            InsertError::DuplicateEmail => ApiError::Conflict("Email"),
            InsertError::DuplicateToken => {
                ApiError::Internal(anyhow::anyhow!("verification token collision"))
            }
            InsertError::Other(e) => ApiError::Internal(e.into()),
        })?;

    info!(user_id = user.id, username = %user.username, "user signed up");
    dispatch_verification_email(st, &user, "Verify your email");
    Ok(user)
}

pub enum VerifyOutcome {
    Verified,
    AlreadyVerified,
}

pub async fn verify_email(st: &AppState, token: &str) -> Result<VerifyOutcome, ApiError> {
    let user = User::find_by_verification_token(&st.db, token)
        .await?
        .ok_or(ApiError::NotFound("Invalid verification token"))?;

    if user.is_active {
        // Active is terminal; repeat verification is a successful no-op.
        return Ok(VerifyOutcome::AlreadyVerified);
    }

    User::activate(&st.db, user.id).await?;
    info!(user_id = user.id, "email verified");
    Ok(VerifyOutcome::Verified)
}

/// Emails are stored lowercased, so a mixed-case email identifier must be
/// lowercased before lookup. Usernames cannot contain '@', which makes the
/// two sides distinguishable; username matching stays case-sensitive.
fn normalize_login_identifier(identifier: &str) -> String {
    let id = identifier.trim();
    if id.contains('@') {
        id.to_lowercase()
    } else {
        id.to_string()
    }
}

pub async fn login(
    st: &AppState,
    username_or_email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let identifier = normalize_login_identifier(username_or_email);
    let user = User::find_by_username_or_email(&st.db, &identifier).await?;

    // Unknown user and wrong password take the same exit.
    let user = match user {
        Some(u) if verify_password(password, &u.password_hash) => u,
        _ => {
            warn!(identifier = %username_or_email, "login rejected");
            return Err(ApiError::Unauthorized);
        }
    };

    if !user.is_active {
        return Err(ApiError::EmailNotVerified);
    }

    info!(user_id = user.id, "user logged in");
    Ok(user)
}

pub enum ResendOutcome {
    Sent,
    AlreadyVerified,
}

pub async fn resend_verification(st: &AppState, email: &str) -> Result<ResendOutcome, ApiError> {
    let email = email.trim().to_lowercase();
    let user = User::find_by_email(&st.db, &email)
        .await?
        .ok_or(ApiError::NotFound("User with this email does not exist"))?;

    if user.is_active {
        return Ok(ResendOutcome::AlreadyVerified);
    }

    // The existing token stays valid; re-mail it rather than re-issue.
    dispatch_verification_email(st, &user, "Verify your email again");
    Ok(ResendOutcome::Sent)
}

/// Authenticated operations are reserved for verified accounts, matching the
/// gate the login path applies when issuing tokens.
pub fn ensure_active(user: &User) -> Result<(), ApiError> {
    if user.is_active {
        Ok(())
    } else {
        Err(ApiError::EmailNotVerified)
    }
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

/// Deterministic per-user key so a repeat upload overwrites the previous
/// picture instead of accumulating blobs.
fn profile_pic_key(user_id: i64, ext: &str) -> String {
    format!("profile_pics/user_{}.{}", user_id, ext)
}

pub async fn save_profile_picture(
    st: &AppState,
    user_id: i64,
    content_type: &str,
    body: Bytes,
) -> Result<String, ApiError> {
    if !content_type.starts_with("image/") {
        return Err(ApiError::UnsupportedMediaType(content_type.to_string()));
    }
    let user = User::find_by_id(&st.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    ensure_active(&user)?;

    let ext = ext_from_mime(content_type).unwrap_or("bin");
    let key = profile_pic_key(user_id, ext);

    st.storage.put_object(&key, body, content_type).await?;
    User::set_profile_pic(&st.db, user_id, &key).await?;

    info!(user_id, key = %key, "profile picture stored");
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_charset() {
        assert!(is_valid_username("alice"));
        assert!(is_valid_username("alice_99"));
        assert!(is_valid_username("ALICE"));
        assert!(!is_valid_username("alice!"));
        assert!(!is_valid_username("al ice"));
        assert!(!is_valid_username("café"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("alice@x.com"));
        assert!(is_valid_email("a.b+c@sub.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn password_policy_defaults() {
        let policy = PasswordPolicy::default();
        assert!(policy.check("Passw0rd1").is_ok());
        assert!(policy.check("short1A").is_err()); // 7 chars
        assert!(policy.check("passw0rd1").is_err()); // no uppercase
        assert!(policy.check("PASSW0RD1").is_err()); // no lowercase
        assert!(policy.check("Password!").is_err()); // no digit
    }

    #[test]
    fn password_policy_is_tunable() {
        let lax = PasswordPolicy {
            min_len: 4,
            require_uppercase: false,
            require_lowercase: false,
            require_digit: false,
        };
        assert!(lax.check("abcd").is_ok());
        assert!(lax.check("abc").is_err());
    }

    #[test]
    fn login_identifier_matches_signup_email_normalization() {
        // Signup stores emails trimmed and lowercased; the same string typed
        // at login must resolve to the stored form.
        assert_eq!(normalize_login_identifier("Alice@X.com"), "alice@x.com");
        assert_eq!(normalize_login_identifier(" alice@x.com "), "alice@x.com");
        // Usernames stay case-sensitive.
        assert_eq!(normalize_login_identifier("Alice_99"), "Alice_99");
        assert_eq!(normalize_login_identifier(" alice "), "alice");
    }

    #[test]
    fn verification_tokens_are_unique_and_opaque() {
        let a = new_verification_token();
        let b = new_verification_token();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert_eq!(a.len(), 36); // uuid string form
    }

    #[test]
    fn verification_link_embeds_token() {
        let link = verification_link("http://localhost:3000", "tok123");
        assert_eq!(link, "http://localhost:3000/verify?token=tok123");
    }

    #[test]
    fn verification_email_contains_username_and_link() {
        let html = verification_email_html("alice", "http://x/verify?token=t");
        assert!(html.contains("Hi alice"));
        assert!(html.contains("href=\"http://x/verify?token=t\""));
    }

    #[test]
    fn ensure_active_gates_unverified_accounts() {
        let mut user = User {
            id: 1,
            username: "alice".into(),
            email: "alice@x.com".into(),
            password_hash: "hash".into(),
            is_active: false,
            is_superuser: false,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
            verification_token: "tok".into(),
            profile_pic_path: None,
        };
        let err = ensure_active(&user).unwrap_err();
        assert_eq!(err.kind(), "email_not_verified");

        user.is_active = true;
        assert!(ensure_active(&user).is_ok());
    }

    #[test]
    fn ext_from_mime_known_and_unknown() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn profile_pic_key_is_deterministic_per_user() {
        assert_eq!(profile_pic_key(7, "png"), "profile_pics/user_7.png");
        // Same user, same extension: same key, so re-upload overwrites.
        assert_eq!(profile_pic_key(7, "png"), profile_pic_key(7, "png"));
        assert_ne!(profile_pic_key(7, "png"), profile_pic_key(8, "png"));
    }
}
