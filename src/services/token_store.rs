//! Storage backends for magic-link tokens.
//!
//! Every backend keeps `token -> MagicLinkPayload`. Verification only ever
//! redeems through [`TokenStore::take`], which removes the record before the
//! caller inspects it, so a token can be observed by at most one request.
//!
//! | Backend              | `take`                          |
//! |----------------------|---------------------------------|
//! | [`MemoryTokenStore`] | `HashMap::remove` under a mutex |
//! | [`SqliteTokenStore`] | `DELETE ... RETURNING`          |
//! | [`KvTokenStore`]     | `GET`, `DELETE`, then parse     |

use crate::config::{KvConfig, TokenStoreBackend};
use crate::models::MagicLinkPayload;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Cloudflare refuses `expiration_ttl` values below one minute.
const KV_MIN_TTL_SECS: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Key-value request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Key-value store responded with status {0}")]
    UnexpectedStatus(u16),
    #[error("Stored payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Invalid key-value endpoint: {0}")]
    InvalidEndpoint(String),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError>;

    async fn put(&self, token: &str, payload: &MagicLinkPayload) -> Result<(), TokenStoreError>;

    /// Deleting a missing token is not an error.
    async fn delete(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Removes the record and hands it back.
    async fn take(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        let payload = self.get(token).await?;
        if payload.is_some() {
            self.delete(token).await?;
        }
        Ok(payload)
    }

    /// Drops records whose deadline is before `now_ms`, returning how many went.
    async fn purge_expired(&self, _now_ms: i64) -> Result<u64, TokenStoreError> {
        Ok(0)
    }
}

pub fn create_token_store(
    backend: &TokenStoreBackend,
    pool: SqlitePool,
) -> Result<Arc<dyn TokenStore>, TokenStoreError> {
    let store: Arc<dyn TokenStore> = match backend {
        TokenStoreBackend::Memory => {
            tracing::info!("Using in-memory magic link token store");
            Arc::new(MemoryTokenStore::new())
        }
        TokenStoreBackend::Sqlite => {
            tracing::info!("Using SQLite magic link token store");
            Arc::new(SqliteTokenStore::new(pool))
        }
        TokenStoreBackend::Kv(config) => {
            tracing::info!("Using key-value magic link token store at {}", config.api_base);
            Arc::new(KvTokenStore::new(config)?)
        }
    };
    Ok(store)
}

#[derive(Default)]
pub struct MemoryTokenStore {
    records: Mutex<HashMap<String, MagicLinkPayload>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        Ok(self.records.lock().await.get(token).cloned())
    }

    async fn put(&self, token: &str, payload: &MagicLinkPayload) -> Result<(), TokenStoreError> {
        self.records
            .lock()
            .await
            .insert(token.to_string(), payload.clone());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
        self.records.lock().await.remove(token);
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        Ok(self.records.lock().await.remove(token))
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64, TokenStoreError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, payload| !payload.is_expired(now_ms));
        Ok((before - records.len()) as u64)
    }
}

/// Tokens in the `magic_links` table of the application database.
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT email, expires FROM magic_links WHERE token = ?")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(email, expires)| MagicLinkPayload { email, expires }))
    }

    async fn put(&self, token: &str, payload: &MagicLinkPayload) -> Result<(), TokenStoreError> {
        sqlx::query(
            r#"
            INSERT INTO magic_links (token, email, expires)
            VALUES (?, ?, ?)
            ON CONFLICT(token) DO UPDATE SET email = excluded.email, expires = excluded.expires
            "#,
        )
        .bind(token)
        .bind(&payload.email)
        .bind(payload.expires)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
        sqlx::query("DELETE FROM magic_links WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        let row: Option<(String, i64)> =
            sqlx::query_as("DELETE FROM magic_links WHERE token = ? RETURNING email, expires")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(email, expires)| MagicLinkPayload { email, expires }))
    }

    async fn purge_expired(&self, now_ms: i64) -> Result<u64, TokenStoreError> {
        let result = sqlx::query("DELETE FROM magic_links WHERE expires < ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Cloudflare Workers KV, reached through its REST API.
///
/// KV has no atomic fetch-and-delete, so `take` is a read followed by a
/// delete. Two redemptions landing between those calls can both observe the
/// record; records also expire on the KV side via `expiration_ttl`.
pub struct KvTokenStore {
    client: reqwest::Client,
    values_url: Url,
    api_token: String,
}

impl KvTokenStore {
    pub fn new(config: &KvConfig) -> Result<Self, TokenStoreError> {
        let values_url = Url::parse(&format!(
            "{}/accounts/{}/storage/kv/namespaces/{}/values",
            config.api_base, config.account_id, config.namespace_id
        ))
        .map_err(|e| TokenStoreError::InvalidEndpoint(e.to_string()))?;

        if values_url.cannot_be_a_base() {
            return Err(TokenStoreError::InvalidEndpoint(config.api_base.clone()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            values_url,
            api_token: config.api_token.clone(),
        })
    }

    fn key_url(&self, token: &str) -> Result<Url, TokenStoreError> {
        let mut url = self.values_url.clone();
        url.path_segments_mut()
            .map_err(|_| TokenStoreError::InvalidEndpoint(self.values_url.to_string()))?
            .push(token);
        Ok(url)
    }

    /// Raw stored value, unparsed.
    async fn get_raw(&self, token: &str) -> Result<Option<String>, TokenStoreError> {
        let response = self
            .client
            .get(self.key_url(token)?)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            status => Err(TokenStoreError::UnexpectedStatus(status.as_u16())),
        }
    }
}

#[async_trait]
impl TokenStore for KvTokenStore {
    async fn get(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        match self.get_raw(token).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// The record is deleted before its body is parsed, so a corrupt value
    /// is still consumed.
    async fn take(&self, token: &str) -> Result<Option<MagicLinkPayload>, TokenStoreError> {
        let Some(body) = self.get_raw(token).await? else {
            return Ok(None);
        };
        self.delete(token).await?;
        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn put(&self, token: &str, payload: &MagicLinkPayload) -> Result<(), TokenStoreError> {
        let remaining_ms = payload.expires - chrono::Utc::now().timestamp_millis();
        let ttl_secs = ((remaining_ms + 999) / 1000).max(KV_MIN_TTL_SECS);

        let response = self
            .client
            .put(self.key_url(token)?)
            .query(&[("expiration_ttl", ttl_secs)])
            .bearer_auth(&self.api_token)
            .body(serde_json::to_string(payload)?)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TokenStoreError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
        let response = self
            .client
            .delete(self.key_url(token)?)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(TokenStoreError::UnexpectedStatus(status.as_u16()))
        }
    }
}
