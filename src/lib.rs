pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use config::AppConfig;
use repositories::{
    ReferralRepository, SqliteReferralRepository, SqliteUserRepository, UserRepository,
};
use services::{AuthService, EmailService, MagicLinkService, TokenStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub magic_link_service: Arc<MagicLinkService>,
    pub auth_service: Arc<AuthService>,
    pub user_repository: Arc<dyn UserRepository>,
    pub referral_repository: Arc<dyn ReferralRepository>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        pool: sqlx::SqlitePool,
        token_store: Arc<dyn TokenStore>,
        email_service: Arc<dyn EmailService>,
    ) -> Self {
        let user_repository: Arc<dyn UserRepository> =
            Arc::new(SqliteUserRepository::new(pool.clone()));
        let referral_repository: Arc<dyn ReferralRepository> =
            Arc::new(SqliteReferralRepository::new(pool));

        let magic_link_service = Arc::new(MagicLinkService::new(
            token_store,
            email_service,
            config.clone(),
        ));
        let auth_service = Arc::new(AuthService::new(
            user_repository.clone(),
            referral_repository.clone(),
        ));

        Self {
            config,
            magic_link_service,
            auth_service,
            user_repository,
            referral_repository,
        }
    }
}
