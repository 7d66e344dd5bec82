use crate::config::{AppConfig, SmtpConfig, SmtpEncryption};
use crate::models::MagicLinkEmail;
use async_trait::async_trait;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to build email message: {0}")]
    MessageBuild(String),
    #[error("Failed to send email: {0}")]
    SendFailed(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
pub trait EmailService: Send + Sync {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError>;
}

/// Writes magic links to the log instead of delivering them.
#[derive(Default)]
pub struct MockEmailService;

impl MockEmailService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmailService for MockEmailService {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError> {
        tracing::info!("📧 [MOCK EMAIL] Magic link to: {}", message.email);
        tracing::info!("   Subject: Sign in to {}", message.host);
        tracing::info!("   Magic link: {}", message.url);
        tracing::info!("   ---");
        Ok(())
    }
}

pub struct SmtpEmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpEmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let credentials = Credentials::new(config.username.clone(), config.password.clone());

        let mailer = match config.encryption {
            SmtpEncryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| EmailError::ConfigError(format!("SMTP relay error: {}", e)))?
                .port(config.port)
                .credentials(credentials)
                .build(),
            SmtpEncryption::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| EmailError::ConfigError(format!("SMTP starttls error: {}", e)))?
                    .port(config.port)
                    .credentials(credentials)
                    .build()
            }
            SmtpEncryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                    .port(config.port)
                    .credentials(credentials)
                    .build()
            }
        };

        Ok(Self {
            mailer,
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
        })
    }
}

fn magic_link_html(message: &MagicLinkEmail) -> String {
    format!(
        r#"
<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h1 style="color: #333;">Sign in to {host}</h1>
    <p>Click the button below to sign in to your account:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background-color: #18181b; color: white; padding: 12px 24px; text-decoration: none; border-radius: 9999px; display: inline-block;">Sign in</a>
    </p>
    <p style="color: #666; font-size: 14px;">Or copy and paste this link into your browser:</p>
    <p style="color: #666; font-size: 14px; word-break: break-all;">{url}</p>
    <p style="color: #999; font-size: 12px; margin-top: 40px;">This link will expire in 15 minutes and can only be used once. If you didn't request it, you can safely ignore this email.</p>
</body>
</html>
"#,
        host = message.host,
        url = message.url
    )
}

#[async_trait]
impl EmailService for SmtpEmailService {
    async fn send_magic_link(&self, message: &MagicLinkEmail) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                format!("{} <{}>", self.from_name, self.from_email)
                    .parse()
                    .map_err(|e| {
                        EmailError::MessageBuild(format!("Invalid from address: {}", e))
                    })?,
            )
            .to(message
                .email
                .parse()
                .map_err(|e| EmailError::MessageBuild(format!("Invalid to address: {}", e)))?)
            .subject(format!("Sign in to {}", message.host))
            .header(ContentType::TEXT_HTML)
            .body(magic_link_html(message))
            .map_err(|e| EmailError::MessageBuild(e.to_string()))?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        Ok(())
    }
}

pub fn create_email_service(config: &AppConfig) -> Arc<dyn EmailService> {
    match &config.smtp {
        Some(smtp) => match SmtpEmailService::new(smtp) {
            Ok(service) => {
                tracing::info!("Using SMTP email service");
                Arc::new(service)
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize SMTP email service: {}. Falling back to mock service",
                    e
                );
                Arc::new(MockEmailService::new())
            }
        },
        None => {
            tracing::info!(
                "SMTP not configured. Using mock email service (emails will be logged to console)"
            );
            Arc::new(MockEmailService::new())
        }
    }
}
