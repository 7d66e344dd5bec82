use crate::models::user::User;
use crate::repositories::referral_repository::{NewReferral, ReferralRepository};
use crate::repositories::user_repository::{RepositoryError, UserRepository};
use crate::services::magic_link_service::is_valid_email;
use std::sync::Arc;
use tower_sessions::Session;

pub const SESSION_USER_ID: &str = "user_id";
pub const SESSION_EMAIL: &str = "email";
pub const SESSION_AUTH_TIMESTAMP: &str = "auth_timestamp";

/// How long a referrer keeps earning from a user they brought in.
pub const ATTRIBUTION_WINDOW_MS: i64 = 365 * 24 * 60 * 60 * 1000;

/// Failures while establishing a session for an email address.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The credentials were refused before any user lookup.
    #[error("Credentials rejected")]
    CredentialsSignin,
    /// Resolving or creating the user record failed.
    #[error("Sign-in callback failed: {0}")]
    CallbackRoute(#[from] RepositoryError),
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),
}

#[derive(Debug, Clone)]
pub struct SignIn {
    pub user: User,
    /// The account did not exist before this sign-in.
    pub created: bool,
    /// Set when this sign-in attributed the new account to a referrer.
    pub referrer_id: Option<String>,
}

pub struct AuthService {
    user_repository: Arc<dyn UserRepository>,
    referral_repository: Arc<dyn ReferralRepository>,
}

impl AuthService {
    pub fn new(
        user_repository: Arc<dyn UserRepository>,
        referral_repository: Arc<dyn ReferralRepository>,
    ) -> Self {
        Self {
            user_repository,
            referral_repository,
        }
    }

    /// Credentials-style sign-in: trusts that `email` was already proven by
    /// the caller, finds or creates the account, and writes the session.
    pub async fn sign_in(
        &self,
        session: &Session,
        email: &str,
        referral_code: Option<&str>,
    ) -> Result<SignIn, AuthError> {
        let sign_in = self.authorize(email, referral_code).await?;

        session.cycle_id().await?;
        session.insert(SESSION_USER_ID, &sign_in.user.id).await?;
        session.insert(SESSION_EMAIL, &sign_in.user.email).await?;
        session
            .insert(SESSION_AUTH_TIMESTAMP, chrono::Utc::now().timestamp())
            .await?;

        tracing::info!(
            user_id = %sign_in.user.id,
            created = sign_in.created,
            "User signed in"
        );
        Ok(sign_in)
    }

    pub async fn authorize(
        &self,
        email: &str,
        referral_code: Option<&str>,
    ) -> Result<SignIn, AuthError> {
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(AuthError::CredentialsSignin);
        }

        let now = chrono::Utc::now().timestamp_millis();

        let (mut user, created) = match self.user_repository.find_by_email(email).await? {
            Some(user) => (user, false),
            None => match self.user_repository.create_user(email).await {
                Ok(user) => (user, true),
                // Lost a race with a concurrent first sign-in for the same address.
                Err(RepositoryError::AlreadyExists) => (
                    self.user_repository
                        .find_by_email(email)
                        .await?
                        .ok_or(RepositoryError::NotFound)?,
                    false,
                ),
                Err(e) => return Err(e.into()),
            },
        };

        if user.email_verified.is_none() {
            self.user_repository
                .mark_email_verified(&user.id, now)
                .await?;
            user.email_verified = Some(now);
        }

        let referrer_id = match (created, referral_code) {
            (true, Some(code)) if !code.is_empty() => {
                self.attribute_referral(&user, code, now).await
            }
            _ => None,
        };

        Ok(SignIn {
            user,
            created,
            referrer_id,
        })
    }

    /// Links a brand-new account to the owner of `code`. Attribution problems
    /// never fail the sign-in.
    async fn attribute_referral(&self, user: &User, code: &str, now: i64) -> Option<String> {
        let referrer = match self.user_repository.find_by_referral_code(code).await {
            Ok(Some(referrer)) if referrer.id != user.id => referrer,
            Ok(_) => {
                tracing::debug!("Referral code {} does not resolve to another user", code);
                return None;
            }
            Err(e) => {
                tracing::warn!("Failed to resolve referral code {}: {}", code, e);
                return None;
            }
        };

        let referral = NewReferral {
            referrer_id: referrer.id.clone(),
            referred_id: user.id.clone(),
            signup_date: now,
            attribution_expires: now + ATTRIBUTION_WINDOW_MS,
        };

        match self.referral_repository.create_referral(referral).await {
            Ok(_) => {
                tracing::info!("Attributed user {} to referrer {}", user.id, referrer.id);
                Some(referrer.id)
            }
            Err(e) => {
                tracing::warn!("Failed to record referral for user {}: {}", user.id, e);
                None
            }
        }
    }

    pub async fn current_user(&self, session: &Session) -> Result<Option<User>, AuthError> {
        let Some(user_id) = session.get::<String>(SESSION_USER_ID).await? else {
            return Ok(None);
        };
        Ok(self.user_repository.find_by_id(&user_id).await?)
    }

    pub async fn sign_out(&self, session: &Session) -> Result<(), AuthError> {
        session.flush().await?;
        Ok(())
    }
}
