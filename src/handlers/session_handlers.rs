use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::State,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde_json::{json, Value};
use tower_sessions::Session;

pub async fn index_handler(State(state): State<AppState>, session: Session) -> Result<Json<Value>> {
    let user = state.auth_service.current_user(&session).await.map_err(|e| {
        tracing::error!("Failed to load session user: {}", e);
        AppError::Internal("Internal server error")
    })?;

    Ok(Json(json!({
        "service": "opencharacter",
        "signed_in": user.is_some(),
    })))
}

/// `GET /api/auth/session`
pub async fn session_handler(State(state): State<AppState>, session: Session) -> Result<Json<Value>> {
    let user = state.auth_service.current_user(&session).await.map_err(|e| {
        tracing::error!("Failed to load session user: {}", e);
        AppError::Internal("Internal server error")
    })?;

    Ok(Json(json!({ "user": user })))
}

/// `POST /api/auth/signout`
pub async fn signout_handler(State(state): State<AppState>, session: Session) -> Response {
    match state.auth_service.sign_out(&session).await {
        Ok(()) => Redirect::to("/").into_response(),
        Err(e) => {
            tracing::error!("Failed to sign out: {}", e);
            AppError::Internal("Internal server error").into_response()
        }
    }
}

pub async fn not_found_handler() -> Response {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found" })),
    )
        .into_response()
}
