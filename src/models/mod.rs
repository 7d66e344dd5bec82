pub mod magic_link;
pub mod referral;
pub mod user;

pub use magic_link::{MagicLinkEmail, MagicLinkPayload, MagicLinkToken, MAGIC_LINK_TTL_MS};
pub use referral::{Referral, REFERRAL_STATUS_PENDING};
pub use user::User;
