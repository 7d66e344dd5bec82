use crate::models::referral::{Referral, REFERRAL_STATUS_PENDING};
use crate::repositories::user_repository::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewReferral {
    pub referrer_id: String,
    pub referred_id: String,
    pub signup_date: i64,
    pub attribution_expires: i64,
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ReferralRepository: Send + Sync {
    async fn create_referral(&self, referral: NewReferral) -> RepositoryResult<Referral>;
    async fn find_by_referred(&self, referred_id: &str) -> RepositoryResult<Option<Referral>>;
    async fn list_by_referrer(&self, referrer_id: &str) -> RepositoryResult<Vec<Referral>>;
}

pub struct SqliteReferralRepository {
    pool: SqlitePool,
}

impl SqliteReferralRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const REFERRAL_COLUMNS: &str = "id, referrer_id, referred_id, signup_date, attribution_expires, \
     status, total_earnings, created_at, updated_at";

#[async_trait]
impl ReferralRepository for SqliteReferralRepository {
    async fn create_referral(&self, referral: NewReferral) -> RepositoryResult<Referral> {
        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO referrals
                (id, referrer_id, referred_id, signup_date, attribution_expires, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&referral.referrer_id)
        .bind(&referral.referred_id)
        .bind(referral.signup_date)
        .bind(referral.attribution_expires)
        .bind(REFERRAL_STATUS_PENDING)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            return if e.to_string().contains("UNIQUE") {
                Err(RepositoryError::AlreadyExists)
            } else {
                Err(RepositoryError::Database(e))
            };
        }

        let created = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE id = ?",
            REFERRAL_COLUMNS
        ))
        .bind(&id)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn find_by_referred(&self, referred_id: &str) -> RepositoryResult<Option<Referral>> {
        let referral = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE referred_id = ?",
            REFERRAL_COLUMNS
        ))
        .bind(referred_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(referral)
    }

    async fn list_by_referrer(&self, referrer_id: &str) -> RepositoryResult<Vec<Referral>> {
        let referrals = sqlx::query_as::<_, Referral>(&format!(
            "SELECT {} FROM referrals WHERE referrer_id = ? ORDER BY signup_date DESC",
            REFERRAL_COLUMNS
        ))
        .bind(referrer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(referrals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::user_repository::{SqliteUserRepository, UserRepository};
    use crate::test_utils::create_test_pool;

    #[tokio::test]
    async fn test_referred_user_is_attributed_once() {
        let pool = create_test_pool().await;
        let users = SqliteUserRepository::new(pool.clone());
        let referrals = SqliteReferralRepository::new(pool);

        let referrer = users.create_user("referrer@example.com").await.unwrap();
        let referred = users.create_user("referred@example.com").await.unwrap();

        let created = referrals
            .create_referral(NewReferral {
                referrer_id: referrer.id.clone(),
                referred_id: referred.id.clone(),
                signup_date: 10,
                attribution_expires: 20,
            })
            .await
            .unwrap();
        assert_eq!(created.status, REFERRAL_STATUS_PENDING);
        assert_eq!(created.total_earnings, 0.0);

        let again = referrals
            .create_referral(NewReferral {
                referrer_id: referrer.id.clone(),
                referred_id: referred.id.clone(),
                signup_date: 11,
                attribution_expires: 21,
            })
            .await;
        assert!(matches!(again, Err(RepositoryError::AlreadyExists)));

        let found = referrals.find_by_referred(&referred.id).await.unwrap().unwrap();
        assert_eq!(found.referrer_id, referrer.id);

        let listed = referrals.list_by_referrer(&referrer.id).await.unwrap();
        assert_eq!(listed.len(), 1);
    }
}
