use crate::models::user::User;
use async_trait::async_trait;
use rand::Rng;
use sqlx::SqlitePool;
use uuid::Uuid;

const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("User not found")]
    NotFound,
    #[error("User already exists")]
    AlreadyExists,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, email: &str) -> RepositoryResult<User>;
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<User>>;
    async fn find_by_referral_code(&self, code: &str) -> RepositoryResult<Option<User>>;
    async fn mark_email_verified(&self, id: &str, verified_at: i64) -> RepositoryResult<()>;
}

pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_CODE_CHARSET[rng.gen_range(0..REFERRAL_CODE_CHARSET.len())] as char)
        .collect()
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, name, email, email_verified, image, referral_link, created_at";

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create_user(&self, email: &str) -> RepositoryResult<User> {
        let id = Uuid::new_v4().to_string();
        let referral_code = generate_referral_code();
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            "INSERT INTO users (id, email, referral_link, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(&referral_code)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.find_by_id(&id).await?.ok_or(RepositoryError::NotFound),
            Err(e) => {
                if e.to_string().contains("UNIQUE") {
                    Err(RepositoryError::AlreadyExists)
                } else {
                    Err(RepositoryError::Database(e))
                }
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_referral_code(&self, code: &str) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE referral_link = ?",
            USER_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn mark_email_verified(&self, id: &str, verified_at: i64) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE users SET email_verified = ? WHERE id = ? AND email_verified IS NULL",
        )
        .bind(verified_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 && self.find_by_id(id).await?.is_none() {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_pool;

    #[test]
    fn test_referral_code_shape() {
        let code = generate_referral_code();
        assert_eq!(code.len(), REFERRAL_CODE_LEN);
        assert!(code.bytes().all(|b| REFERRAL_CODE_CHARSET.contains(&b)));
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let pool = create_test_pool().await;
        let repo = SqliteUserRepository::new(pool);

        let user = repo.create_user("reader@example.com").await.unwrap();
        assert_eq!(user.email, "reader@example.com");
        assert!(user.email_verified.is_none());
        let code = user.referral_link.clone().unwrap();

        let by_email = repo.find_by_email("reader@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        let by_code = repo.find_by_referral_code(&code).await.unwrap().unwrap();
        assert_eq!(by_code.id, user.id);

        assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let pool = create_test_pool().await;
        let repo = SqliteUserRepository::new(pool);

        repo.create_user("twice@example.com").await.unwrap();
        let result = repo.create_user("twice@example.com").await;
        assert!(matches!(result, Err(RepositoryError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_mark_email_verified_keeps_first_timestamp() {
        let pool = create_test_pool().await;
        let repo = SqliteUserRepository::new(pool);
        let user = repo.create_user("verify@example.com").await.unwrap();

        repo.mark_email_verified(&user.id, 1_000).await.unwrap();
        repo.mark_email_verified(&user.id, 2_000).await.unwrap();

        let user = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(user.email_verified, Some(1_000));

        let missing = repo.mark_email_verified("missing-id", 3_000).await;
        assert!(matches!(missing, Err(RepositoryError::NotFound)));
    }
}
