use crate::error::{AppError, Result};
use crate::AppState;
use axum::{extract::State, response::Json};
use serde_json::{json, Value};
use tower_sessions::Session;

/// `GET /api/referrals`: the caller's own code and the accounts it brought in.
pub async fn list_referrals_handler(
    State(state): State<AppState>,
    session: Session,
) -> Result<Json<Value>> {
    let user = state
        .auth_service
        .current_user(&session)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load session user: {}", e);
            AppError::Internal("Internal server error")
        })?
        .ok_or(AppError::Unauthenticated)?;

    let referrals = state
        .referral_repository
        .list_by_referrer(&user.id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list referrals for {}: {}", user.id, e);
            AppError::Internal("Internal server error")
        })?;

    Ok(Json(json!({
        "referral_code": user.referral_link,
        "referrals": referrals,
    })))
}
