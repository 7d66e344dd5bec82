use crate::error::AppError;
use crate::services::auth_service::SESSION_USER_ID;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

pub async fn require_auth(session: Session, request: Request, next: Next) -> Response {
    if let Ok(Some(_user_id)) = session.get::<String>(SESSION_USER_ID).await {
        next.run(request).await
    } else {
        AppError::Unauthenticated.into_response()
    }
}
