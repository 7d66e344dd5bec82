use crate::services::{AuthError, MagicLinkError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::json;
use thiserror::Error;

// Type alias for Result with our AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors returned by the JSON endpoints.
///
/// The client only ever sees the fixed message for each variant; underlying
/// causes are logged where they occur.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(&'static str),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Outcome codes carried in `/signin?error=<code>` after a failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCode {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    CredentialsSigninFailed,
    AuthError,
    VerificationFailed,
    DevMissingEmail,
    DevAutoSignInFailed,
}

impl VerificationCode {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationCode::MissingToken => "VerificationMissingToken",
            VerificationCode::InvalidToken => "VerificationInvalidToken",
            VerificationCode::ExpiredToken => "VerificationExpiredToken",
            VerificationCode::CredentialsSigninFailed => "CredentialsSigninFailed",
            VerificationCode::AuthError => "AuthError",
            VerificationCode::VerificationFailed => "VerificationFailed",
            VerificationCode::DevMissingEmail => "DevMissingEmail",
            VerificationCode::DevAutoSignInFailed => "DevAutoSignInFailed",
        }
    }

    pub fn redirect_location(self) -> String {
        format!("/signin?error={}", self.as_str())
    }
}

impl std::fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntoResponse for VerificationCode {
    fn into_response(self) -> Response {
        Redirect::to(&self.redirect_location()).into_response()
    }
}

impl From<&MagicLinkError> for VerificationCode {
    fn from(err: &MagicLinkError) -> Self {
        match err {
            MagicLinkError::MissingToken => VerificationCode::MissingToken,
            MagicLinkError::InvalidToken => VerificationCode::InvalidToken,
            MagicLinkError::ExpiredToken => VerificationCode::ExpiredToken,
            MagicLinkError::InvalidEmail
            | MagicLinkError::Store(_)
            | MagicLinkError::Email(_) => VerificationCode::VerificationFailed,
        }
    }
}

impl From<&AuthError> for VerificationCode {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::CredentialsSignin | AuthError::CallbackRoute(_) => {
                VerificationCode::CredentialsSigninFailed
            }
            AuthError::Session(_) => VerificationCode::AuthError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::RepositoryError;
    use crate::services::TokenStoreError;

    #[test]
    fn test_redeem_failures_map_to_codes() {
        assert_eq!(
            VerificationCode::from(&MagicLinkError::MissingToken).as_str(),
            "VerificationMissingToken"
        );
        assert_eq!(
            VerificationCode::from(&MagicLinkError::InvalidToken).as_str(),
            "VerificationInvalidToken"
        );
        assert_eq!(
            VerificationCode::from(&MagicLinkError::ExpiredToken).as_str(),
            "VerificationExpiredToken"
        );
        assert_eq!(
            VerificationCode::from(&MagicLinkError::Store(TokenStoreError::UnexpectedStatus(
                503
            ))),
            VerificationCode::VerificationFailed
        );
    }

    #[test]
    fn test_sign_in_failures_map_to_codes() {
        assert_eq!(
            VerificationCode::from(&AuthError::CredentialsSignin),
            VerificationCode::CredentialsSigninFailed
        );
        assert_eq!(
            VerificationCode::from(&AuthError::CallbackRoute(RepositoryError::NotFound)),
            VerificationCode::CredentialsSigninFailed
        );

        let session_error = tower_sessions::session::Error::from(
            serde_json::from_str::<i32>("not a number").unwrap_err(),
        );
        let code = VerificationCode::from(&AuthError::Session(session_error));
        assert_eq!(code, VerificationCode::AuthError);
        assert_eq!(code.redirect_location(), "/signin?error=AuthError");
    }

    #[test]
    fn test_redirect_location() {
        let response = VerificationCode::ExpiredToken.into_response();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/signin?error=VerificationExpiredToken"
        );
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let response = AppError::Internal("Failed to send magic link due to an internal error.")
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
