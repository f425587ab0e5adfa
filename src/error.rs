use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to API clients. Each variant maps to a stable
/// machine-checkable `error` kind in the JSON body plus a human message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    /// A signup collided with an existing record; names the field.
    #[error("{0} already registered")]
    Conflict(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    /// Same kind and message for unknown user and wrong password.
    #[error("Incorrect username/email or password")]
    Unauthorized,

    #[error("Email not verified. Please check your email for verification link.")]
    EmailNotVerified,

    #[error("Only image files are allowed, got {0}")]
    UnsupportedMediaType(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_failed",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized => "unauthorized",
            ApiError::EmailNotVerified => "email_not_verified",
            ApiError::UnsupportedMediaType(_) => "unsupported_media_type",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::EmailNotVerified => StatusCode::FORBIDDEN,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(anyhow::Error::new(err))
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(err) => {
                tracing::error!(error = ?err, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = Json(ErrorBody {
            error: self.kind(),
            message,
        });
        if matches!(self, ApiError::Unauthorized) {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_statuses_are_stable() {
        let cases = [
            (
                ApiError::Validation("bad".into()),
                "validation_failed",
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Conflict("Username"), "conflict", StatusCode::CONFLICT),
            (
                ApiError::NotFound("Invalid verification token"),
                "not_found",
                StatusCode::NOT_FOUND,
            ),
            (ApiError::Unauthorized, "unauthorized", StatusCode::UNAUTHORIZED),
            (
                ApiError::EmailNotVerified,
                "email_not_verified",
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::UnsupportedMediaType("text/plain".into()),
                "unsupported_media_type",
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ),
        ];
        for (err, kind, status) in cases {
            assert_eq!(err.kind(), kind);
            assert_eq!(err.status(), status);
        }
    }

    #[test]
    fn unauthorized_message_does_not_name_the_failing_field() {
        // Unknown user and wrong password must be indistinguishable.
        let msg = ApiError::Unauthorized.to_string();
        assert_eq!(msg, "Incorrect username/email or password");
    }

    #[test]
    fn conflict_names_the_colliding_field() {
        assert_eq!(
            ApiError::Conflict("Email").to_string(),
            "Email already registered"
        );
    }
}
