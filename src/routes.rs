use crate::{auth, handlers, middleware as app_middleware, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Application routes with every layer except sessions, which the caller
/// attaches so the binary and tests can pick their own session store.
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/referrals", get(handlers::list_referrals_handler))
        .layer(middleware::from_fn(auth::require_auth));

    Router::new()
        .route("/", get(handlers::index_handler))
        .route(
            "/api/auth/send-magic-link",
            post(handlers::send_magic_link_handler),
        )
        .route(
            "/api/auth/verify-magic-link",
            get(handlers::verify_magic_link_handler),
        )
        .route("/api/auth/session", get(handlers::session_handler))
        .route("/api/auth/signout", post(handlers::signout_handler))
        .merge(protected_routes)
        .fallback(handlers::not_found_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(
                    state.config.clone(),
                    app_middleware::add_security_headers,
                ))
                .layer(middleware::from_fn(app_middleware::referral_attribution)),
        )
        .with_state(state)
}
