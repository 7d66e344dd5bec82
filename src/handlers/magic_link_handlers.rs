use crate::config::LoginMode;
use crate::error::{AppError, VerificationCode};
use crate::middleware::referral::{
    attribution_cookie, first_query_value, REFERRAL_CODE_COOKIE, REFERRER_ID_COOKIE,
};
use crate::services::{AuthError, MagicLinkError};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{json, Value};
use tower_sessions::Session;

const SEND_FAILED: &str = "Failed to send magic link due to an internal error.";

/// Query of the verification link. A repeated key keeps its first value.
#[derive(Debug, Default)]
pub struct VerifyMagicLinkQuery {
    pub token: Option<String>,
    /// Only honored in dev-email login mode.
    #[cfg(any(test, feature = "dev-login"))]
    pub email: Option<String>,
}

impl VerifyMagicLinkQuery {
    pub fn from_raw(query: Option<&str>) -> Self {
        Self {
            token: first_query_value(query, "token"),
            #[cfg(any(test, feature = "dev-login"))]
            email: first_query_value(query, "email"),
        }
    }
}

/// `POST /api/auth/send-magic-link`
///
/// The body is parsed as JSON whatever its `Content-Type`.
pub async fn send_magic_link_handler(
    State(state): State<AppState>,
    payload: Result<Bytes, BytesRejection>,
) -> Response {
    let parsed = payload
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).map_err(|e| e.to_string()));

    let body = match parsed {
        Ok(body @ Value::Object(_)) => body,
        Ok(_) => return AppError::BadRequest("Invalid request body".to_string()).into_response(),
        Err(reason) => {
            tracing::debug!("Rejected magic link request body: {}", reason);
            return AppError::BadRequest("Invalid request body".to_string()).into_response();
        }
    };

    let email = match body.get("email").and_then(Value::as_str) {
        Some(email) if !email.is_empty() => email,
        _ => {
            return AppError::BadRequest("Email is required and must be a string".to_string())
                .into_response()
        }
    };

    match state.magic_link_service.issue(email).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "message": "Magic link sent successfully. Check your email." })),
        )
            .into_response(),
        Err(MagicLinkError::InvalidEmail) => {
            AppError::BadRequest("Invalid email format".to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("Error sending magic link: {}", e);
            AppError::Internal(SEND_FAILED).into_response()
        }
    }
}

/// `GET /api/auth/verify-magic-link`
///
/// Every outcome is a redirect: `/` once a session exists, otherwise
/// `/signin?error=<code>`.
pub async fn verify_magic_link_handler(
    State(state): State<AppState>,
    session: Session,
    jar: CookieJar,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let query = VerifyMagicLinkQuery::from_raw(raw_query.as_deref());

    match state.config.login_mode {
        LoginMode::MagicLink => verify_token(&state, &session, jar, query.token.as_deref()).await,
        #[cfg(any(test, feature = "dev-login"))]
        LoginMode::DevEmail => dev_sign_in(&state, &session, jar, query.email.as_deref()).await,
    }
}

async fn verify_token(
    state: &AppState,
    session: &Session,
    jar: CookieJar,
    token: Option<&str>,
) -> Response {
    let email = match state.magic_link_service.redeem(token).await {
        Ok(email) => email,
        Err(e) => {
            let code = VerificationCode::from(&e);
            if code == VerificationCode::VerificationFailed {
                tracing::error!("Magic link verification failed: {}", e);
            } else {
                tracing::info!("Magic link rejected: {}", e);
            }
            return code.into_response();
        }
    };

    match establish_session(state, session, jar, &email).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Sign-in after magic link failed for {}: {}", email, e);
            VerificationCode::from(&e).into_response()
        }
    }
}

#[cfg(any(test, feature = "dev-login"))]
async fn dev_sign_in(
    state: &AppState,
    session: &Session,
    jar: CookieJar,
    email: Option<&str>,
) -> Response {
    let Some(email) = email.filter(|email| crate::services::is_valid_email(email)) else {
        return VerificationCode::DevMissingEmail.into_response();
    };

    tracing::warn!("Dev login: signing in {} without a token", email);
    match establish_session(state, session, jar, email).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Dev sign-in failed for {}: {}", email, e);
            VerificationCode::DevAutoSignInFailed.into_response()
        }
    }
}

/// Signs `email` in, crediting the first-touch referral code if the account
/// is new, and redirects home.
async fn establish_session(
    state: &AppState,
    session: &Session,
    jar: CookieJar,
    email: &str,
) -> Result<Response, AuthError> {
    let referral_code = jar
        .get(REFERRAL_CODE_COOKIE)
        .map(|cookie| cookie.value().to_string());

    let sign_in = state
        .auth_service
        .sign_in(session, email, referral_code.as_deref())
        .await?;

    let jar = match sign_in.referrer_id {
        Some(referrer_id) => jar.add(attribution_cookie(REFERRER_ID_COOKIE, referrer_id)),
        None => jar,
    };

    Ok((jar, Redirect::to("/")).into_response())
}
