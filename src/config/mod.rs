pub mod session;

use std::env;

use reqwest::Url;
use tracing::warn;

use self::session::{decode_secret_bytes, SessionConfig};

const DEFAULT_DEV_APP_URL: &str = "http://localhost:3000";
const DEFAULT_PROD_APP_URL: &str = "https://opencharacter.org";
const DEFAULT_KV_API_BASE: &str = "https://api.cloudflare.com/client/v4";
const MIN_SESSION_SECRET_BYTES: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("Insecure production configuration: {0}")]
    Insecure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// How `GET /api/auth/verify-magic-link` authenticates its caller.
///
/// `DevEmail` trusts an `email` query parameter and skips the token store
/// entirely. It only exists in test builds or with the `dev-login` feature,
/// and `AppConfig::validate` refuses it in production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginMode {
    MagicLink,
    #[cfg(any(test, feature = "dev-login"))]
    DevEmail,
}

#[derive(Debug, Clone)]
pub struct KvConfig {
    pub api_base: String,
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
}

#[derive(Debug, Clone)]
pub enum TokenStoreBackend {
    Memory,
    Sqlite,
    Kv(KvConfig),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEncryption {
    Tls,
    StartTls,
    None,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
    pub encryption: SmtpEncryption,
}

/// Process-wide configuration, built once at startup and shared by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Public origin used to build verification links, without a trailing slash.
    pub base_url: String,
    /// Host (and non-default port) of `base_url`, shown in outgoing emails.
    pub app_host: String,
    pub token_store: TokenStoreBackend,
    pub login_mode: LoginMode,
    pub session_secret: Option<String>,
    pub force_https: bool,
    pub smtp: Option<SmtpConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = var("ENVIRONMENT")
            .map(|value| Environment::parse(&value))
            .unwrap_or(Environment::Development);

        let host = var("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match var("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value,
            })?,
            None => 8080,
        };

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://data/opencharacter.db".to_string());

        let base_url = match (environment, var("APP_URL")) {
            (_, Some(url)) => url.trim_end_matches('/').to_string(),
            (Environment::Production, None) => DEFAULT_PROD_APP_URL.to_string(),
            (Environment::Development, None) => DEFAULT_DEV_APP_URL.to_string(),
        };
        let app_host = parse_host(&base_url)?;

        let token_store = match var("TOKEN_STORE").as_deref() {
            None | Some("sqlite") => TokenStoreBackend::Sqlite,
            Some("memory") => TokenStoreBackend::Memory,
            Some("kv") => TokenStoreBackend::Kv(KvConfig {
                api_base: var("KV_API_BASE")
                    .unwrap_or_else(|| DEFAULT_KV_API_BASE.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                account_id: var("KV_ACCOUNT_ID").ok_or(ConfigError::Missing("KV_ACCOUNT_ID"))?,
                namespace_id: var("KV_NAMESPACE_ID")
                    .ok_or(ConfigError::Missing("KV_NAMESPACE_ID"))?,
                api_token: var("KV_API_TOKEN").ok_or(ConfigError::Missing("KV_API_TOKEN"))?,
            }),
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "TOKEN_STORE",
                    value: other.to_string(),
                })
            }
        };

        let login_mode = parse_login_mode(var("LOGIN_MODE"))?;

        let smtp = match var("SMTP_HOST") {
            Some(smtp_host) => Some(SmtpConfig {
                host: smtp_host,
                port: match var("SMTP_PORT") {
                    Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                        key: "SMTP_PORT",
                        value,
                    })?,
                    None => 587,
                },
                username: var("SMTP_USERNAME").ok_or(ConfigError::Missing("SMTP_USERNAME"))?,
                password: var("SMTP_PASSWORD").ok_or(ConfigError::Missing("SMTP_PASSWORD"))?,
                from_email: var("SMTP_FROM_EMAIL").ok_or(ConfigError::Missing("SMTP_FROM_EMAIL"))?,
                from_name: var("SMTP_FROM_NAME").unwrap_or_else(|| "OpenCharacter".to_string()),
                encryption: parse_encryption(var("SMTP_ENCRYPTION"))?,
            }),
            None => None,
        };

        Ok(Self {
            environment,
            host,
            port,
            database_url,
            base_url,
            app_host,
            token_store,
            login_mode,
            session_secret: var("SESSION_SECRET"),
            force_https: var("FORCE_HTTPS").is_some_and(|value| flag_enabled(&value)),
            smtp,
        })
    }

    /// Rejects configurations that must never reach a production deployment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.environment.is_production() {
            return Ok(());
        }

        if self.login_mode != LoginMode::MagicLink {
            return Err(ConfigError::Insecure(
                "email-only dev login cannot be enabled in production".to_string(),
            ));
        }

        if !self.force_https {
            return Err(ConfigError::Insecure(
                "production requires HTTPS, set FORCE_HTTPS=true".to_string(),
            ));
        }

        let secret = self
            .session_secret
            .as_deref()
            .ok_or(ConfigError::Missing("SESSION_SECRET"))?;

        if decode_secret_bytes(secret).len() < MIN_SESSION_SECRET_BYTES {
            return Err(ConfigError::Insecure(format!(
                "SESSION_SECRET must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        let lowered = secret.to_ascii_lowercase();
        if lowered.contains("example") || lowered.contains("changeme") || lowered.contains("default")
        {
            return Err(ConfigError::Insecure(
                "SESSION_SECRET appears to be a default value".to_string(),
            ));
        }

        if matches!(self.token_store, TokenStoreBackend::Memory) {
            warn!("In-memory token store in production: magic links die with the process");
        }
        if self.smtp.is_none() {
            warn!("SMTP not configured in production: magic links will only be logged");
        }

        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::for_environment(self.environment)
    }

    pub fn verification_url(&self, token: &str) -> String {
        format!("{}/api/auth/verify-magic-link?token={}", self.base_url, token)
    }
}

fn parse_host(base_url: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::Invalid {
        key: "APP_URL",
        value: base_url.to_string(),
    };
    let url = Url::parse(base_url).map_err(|_| invalid())?;
    let host = url.host_str().ok_or_else(invalid)?;

    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn parse_login_mode(value: Option<String>) -> Result<LoginMode, ConfigError> {
    match value.as_deref().map(str::trim) {
        None | Some("magic-link") => Ok(LoginMode::MagicLink),
        #[cfg(any(test, feature = "dev-login"))]
        Some("dev-email") => Ok(LoginMode::DevEmail),
        Some(other) => Err(ConfigError::Invalid {
            key: "LOGIN_MODE",
            value: other.to_string(),
        }),
    }
}

fn parse_encryption(value: Option<String>) -> Result<SmtpEncryption, ConfigError> {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None | Some("starttls") => Ok(SmtpEncryption::StartTls),
        Some("tls") => Ok(SmtpEncryption::Tls),
        Some("none") => Ok(SmtpEncryption::None),
        Some(other) => Err(ConfigError::Invalid {
            key: "SMTP_ENCRYPTION",
            value: other.to_string(),
        }),
    }
}

fn flag_enabled(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True")
}
