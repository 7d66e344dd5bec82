use crate::config::AppConfig;
use crate::models::{MagicLinkEmail, MagicLinkToken, MAGIC_LINK_TTL_MS};
use crate::services::email_service::{EmailError, EmailService};
use crate::services::token_store::{TokenStore, TokenStoreError};
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use std::sync::Arc;

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());

/// Something before an `@`, and a dotted domain after it. No whitespace.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

#[derive(Debug, thiserror::Error)]
pub enum MagicLinkError {
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Verification token is missing")]
    MissingToken,
    #[error("Verification token is unknown or already used")]
    InvalidToken,
    #[error("Verification token has expired")]
    ExpiredToken,
    #[error("Token store error: {0}")]
    Store(#[from] TokenStoreError),
    #[error("Email error: {0}")]
    Email(#[from] EmailError),
}

pub struct MagicLinkService {
    store: Arc<dyn TokenStore>,
    email_service: Arc<dyn EmailService>,
    config: Arc<AppConfig>,
}

impl MagicLinkService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        email_service: Arc<dyn EmailService>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            email_service,
            config,
        }
    }

    fn generate_token() -> String {
        let mut rng = rand::thread_rng();
        let bytes: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
        hex::encode(bytes)
    }

    /// Persists a new token for `email` and mails the link.
    ///
    /// Whether an account exists for `email` is never consulted, so callers
    /// see the same outcome for known and unknown addresses.
    pub async fn issue(&self, email: &str) -> Result<MagicLinkToken, MagicLinkError> {
        if !is_valid_email(email) {
            return Err(MagicLinkError::InvalidEmail);
        }

        let issued = MagicLinkToken {
            token: Self::generate_token(),
            email: email.to_string(),
            expires_at: Utc::now().timestamp_millis() + MAGIC_LINK_TTL_MS,
        };

        self.store.put(&issued.token, &issued.payload()).await?;

        let message = MagicLinkEmail {
            email: issued.email.clone(),
            url: self.config.verification_url(&issued.token),
            host: self.config.app_host.clone(),
        };

        tracing::info!("Sending magic link to: {}", email);
        if let Err(e) = self.email_service.send_magic_link(&message).await {
            tracing::error!("❌ Failed to send magic link to {}: {:?}", email, e);
            // The link was never delivered; don't leave a live token behind.
            if let Err(cleanup) = self.store.delete(&issued.token).await {
                tracing::debug!("Could not drop undelivered token: {}", cleanup);
            }
            return Err(e.into());
        }

        Ok(issued)
    }

    /// Consumes `token` and returns the email it was issued for.
    ///
    /// The record is removed before its deadline is checked: once found, a
    /// token is gone for every later caller whether or not it was still valid.
    pub async fn redeem(&self, token: Option<&str>) -> Result<String, MagicLinkError> {
        let token = match token {
            Some(token) if !token.is_empty() => token,
            _ => return Err(MagicLinkError::MissingToken),
        };

        let Some(payload) = self.store.take(token).await? else {
            if let Err(e) = self.store.delete(token).await {
                tracing::debug!("Ignoring cleanup failure for unknown token: {}", e);
            }
            return Err(MagicLinkError::InvalidToken);
        };

        if payload.is_expired(Utc::now().timestamp_millis()) {
            tracing::info!("Expired magic link presented for: {}", payload.email);
            return Err(MagicLinkError::ExpiredToken);
        }

        Ok(payload.email)
    }

    pub async fn purge_expired(&self) -> Result<u64, MagicLinkError> {
        Ok(self
            .store
            .purge_expired(Utc::now().timestamp_millis())
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MagicLinkPayload;
    use crate::services::token_store::MemoryTokenStore;
    use crate::test_utils::test_helpers::{test_config, FailingEmailService, RecordingEmailService};

    fn service_with(
        store: Arc<MemoryTokenStore>,
        email_service: Arc<dyn EmailService>,
    ) -> MagicLinkService {
        MagicLinkService::new(store, email_service, Arc::new(test_config()))
    }

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("a@b.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_generated_tokens_are_unique_hex() {
        let a = MagicLinkService::generate_token();
        let b = MagicLinkService::generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_issue_persists_and_mails_link() {
        let store = Arc::new(MemoryTokenStore::new());
        let emails = Arc::new(RecordingEmailService::new());
        let service = service_with(store.clone(), emails.clone());

        let before = Utc::now().timestamp_millis();
        let issued = service.issue("a@b.com").await.unwrap();
        let after = Utc::now().timestamp_millis();

        assert!(issued.expires_at >= before + MAGIC_LINK_TTL_MS);
        assert!(issued.expires_at <= after + MAGIC_LINK_TTL_MS);

        let stored = store.get(&issued.token).await.unwrap().unwrap();
        assert_eq!(stored.email, "a@b.com");
        assert_eq!(stored.expires, issued.expires_at);

        let sent = emails.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email, "a@b.com");
        assert_eq!(sent[0].host, "localhost:3000");
        assert_eq!(
            sent[0].url,
            format!(
                "http://localhost:3000/api/auth/verify-magic-link?token={}",
                issued.token
            )
        );
    }

    #[tokio::test]
    async fn test_issue_rejects_bad_email_without_side_effects() {
        let store = Arc::new(MemoryTokenStore::new());
        let emails = Arc::new(RecordingEmailService::new());
        let service = service_with(store.clone(), emails.clone());

        let result = service.issue("not-an-email").await;
        assert!(matches!(result, Err(MagicLinkError::InvalidEmail)));
        assert!(store.is_empty().await);
        assert!(emails.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_issue_email_failure_drops_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with(store.clone(), Arc::new(FailingEmailService));

        let result = service.issue("a@b.com").await;
        assert!(matches!(result, Err(MagicLinkError::Email(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_redeem_is_single_use() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with(store.clone(), Arc::new(RecordingEmailService::new()));

        let issued = service.issue("a@b.com").await.unwrap();
        assert_eq!(
            service.redeem(Some(&issued.token)).await.unwrap(),
            "a@b.com"
        );
        assert!(matches!(
            service.redeem(Some(&issued.token)).await,
            Err(MagicLinkError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_redeem_missing_token() {
        let service = service_with(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(RecordingEmailService::new()),
        );
        assert!(matches!(
            service.redeem(None).await,
            Err(MagicLinkError::MissingToken)
        ));
        assert!(matches!(
            service.redeem(Some("")).await,
            Err(MagicLinkError::MissingToken)
        ));
    }

    #[tokio::test]
    async fn test_redeem_does_not_trim_token() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with(store.clone(), Arc::new(RecordingEmailService::new()));

        store
            .put(
                "abc",
                &MagicLinkPayload {
                    email: "a@b.com".to_string(),
                    expires: Utc::now().timestamp_millis() + 60_000,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.redeem(Some("  ")).await,
            Err(MagicLinkError::InvalidToken)
        ));
        assert!(matches!(
            service.redeem(Some(" abc")).await,
            Err(MagicLinkError::InvalidToken)
        ));
        assert_eq!(service.redeem(Some("abc")).await.unwrap(), "a@b.com");
    }

    #[tokio::test]
    async fn test_redeem_expired_token_is_consumed() {
        let store = Arc::new(MemoryTokenStore::new());
        let service = service_with(store.clone(), Arc::new(RecordingEmailService::new()));

        store
            .put(
                "stale",
                &MagicLinkPayload {
                    email: "a@b.com".to_string(),
                    expires: Utc::now().timestamp_millis() - 1,
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.redeem(Some("stale")).await,
            Err(MagicLinkError::ExpiredToken)
        ));
        assert!(store.get("stale").await.unwrap().is_none());
        assert!(matches!(
            service.redeem(Some("stale")).await,
            Err(MagicLinkError::InvalidToken)
        ));
    }
}
