use axum::{
    extract::{DefaultBodyLimit, FromRef, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, MessageResponse, ProfilePicResponse, PublicUser,
            ResendVerificationRequest, SignupRequest, TokenResponse,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        repo_types::User,
        services::{self, ResendOutcome, VerifyOutcome},
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/verify/:token", post(verify_email))
        .route("/login", post(login))
        .route("/resend-verification", post(resend_verification))
        .route(
            "/profile-pic",
            post(upload_profile_pic).layer(DefaultBodyLimit::max(5 * 1024 * 1024)),
        )
        .route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    services::signup(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(
            "User created successfully. Please check your email for verification.",
        )),
    ))
}

#[instrument(skip(state))]
pub async fn verify_email(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = match services::verify_email(&state, &token).await? {
        VerifyOutcome::Verified => "Email verified successfully. You can now log in.",
        VerifyOutcome::AlreadyVerified => "Email already verified.",
    };
    Ok(Json(MessageResponse::new(message)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let user = services::login(&state, &payload.username_or_email, &payload.password).await?;
    let keys = JwtKeys::from_ref(&state);
    let token = keys.sign(user.id)?;
    Ok(Json(TokenResponse::bearer(token)))
}

#[instrument(skip(state, payload))]
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = match services::resend_verification(&state, &payload.email).await? {
        ResendOutcome::Sent => "Verification email sent again. Please check your inbox.",
        ResendOutcome::AlreadyVerified => "Email already verified.",
    };
    Ok(Json(MessageResponse::new(message)))
}

#[instrument(skip(state, mp))]
pub async fn upload_profile_pic(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<ProfilePicResponse>, ApiError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        let body = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        let key = services::save_profile_picture(&state, user_id, &content_type, body).await?;
        return Ok(Json(ProfilePicResponse {
            message: "Profile picture uploaded successfully.".into(),
            profile_pic: key,
        }));
    }
    Err(ApiError::Validation("file field is required".into()))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, user_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    services::ensure_active(&user)?;
    Ok(Json(PublicUser::from(user)))
}
