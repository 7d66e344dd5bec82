pub mod test_helpers {
    use crate::config::AppConfig;
    use crate::models::{MagicLinkEmail, User};
    use crate::repositories::{RepositoryResult, SqliteUserRepository, UserRepository};
    use crate::services::{EmailError, EmailService, MemoryTokenStore};
    use crate::AppState;
    use async_trait::async_trait;
    use axum::Router;
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower_sessions::MemoryStore;

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Insert a test user with a generated referral code
    pub async fn insert_test_user(pool: &SqlitePool, email: &str) -> RepositoryResult<User> {
        SqliteUserRepository::new(pool.clone())
            .create_user(email)
            .await
    }

    /// Development configuration with an in-memory token store.
    pub fn test_config() -> AppConfig {
        match AppConfig::from_lookup(|key| match key {
            "TOKEN_STORE" => Some("memory".to_string()),
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            _ => None,
        }) {
            Ok(config) => config,
            Err(e) => panic!("Failed to build test config: {}", e),
        }
    }

    /// Captures outgoing magic links instead of sending them.
    #[derive(Default)]
    pub struct RecordingEmailService {
        sent: Mutex<Vec<MagicLinkEmail>>,
    }

    impl RecordingEmailService {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn sent(&self) -> Vec<MagicLinkEmail> {
            self.sent.lock().await.clone()
        }

        /// Token from the most recently sent link.
        pub async fn last_token(&self) -> Option<String> {
            let sent = self.sent.lock().await;
            let url = &sent.last()?.url;
            url.split("token=").nth(1).map(str::to_string)
        }
    }

    #[async_trait]
    impl EmailService for RecordingEmailService {
        async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    /// Rejects every message.
    pub struct FailingEmailService;

    #[async_trait]
    impl EmailService for FailingEmailService {
        async fn send_magic_link(&self, _message: &MagicLinkEmail) -> Result<(), EmailError> {
            Err(EmailError::SendFailed("connection refused".to_string()))
        }
    }

    /// Full router wrapped in an in-memory session layer.
    pub fn router_with_sessions(state: AppState) -> Router {
        let session_layer = state
            .config
            .session_config()
            .create_layer(MemoryStore::default(), state.config.session_secret.as_deref());
        crate::routes::build_router(state).layer(session_layer)
    }

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
        pub pool: SqlitePool,
        pub tokens: Arc<MemoryTokenStore>,
        pub emails: Arc<RecordingEmailService>,
    }

    pub async fn build_test_app() -> TestApp {
        build_test_app_with_config(test_config()).await
    }

    pub async fn build_test_app_with_config(config: AppConfig) -> TestApp {
        let pool = match create_test_db().await {
            Ok(pool) => pool,
            Err(e) => panic!("Failed to create test database: {}", e),
        };
        let tokens = Arc::new(MemoryTokenStore::new());
        let emails = Arc::new(RecordingEmailService::new());

        let state = AppState::new(
            Arc::new(config),
            pool.clone(),
            tokens.clone(),
            emails.clone(),
        );

        TestApp {
            router: router_with_sessions(state.clone()),
            state,
            pool,
            tokens,
            emails,
        }
    }
}

// Re-export commonly used test functions at module level for convenience
// Note: This is test-only code. Panic on error is acceptable in tests.
#[cfg(test)]
pub async fn create_test_pool() -> sqlx::SqlitePool {
    match test_helpers::create_test_db().await {
        Ok(pool) => pool,
        Err(e) => panic!("Failed to create test pool: {}", e),
    }
}
