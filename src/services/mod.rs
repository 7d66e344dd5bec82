pub mod auth_service;
pub mod email_service;
pub mod magic_link_service;
pub mod token_store;

pub use auth_service::{AuthError, AuthService, SignIn};
pub use email_service::{
    create_email_service, EmailError, EmailService, MockEmailService, SmtpEmailService,
};
pub use magic_link_service::{is_valid_email, MagicLinkError, MagicLinkService};
pub use token_store::{
    create_token_store, KvTokenStore, MemoryTokenStore, SqliteTokenStore, TokenStore,
    TokenStoreError,
};
