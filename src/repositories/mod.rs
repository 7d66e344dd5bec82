pub mod referral_repository;
pub mod user_repository;

pub use referral_repository::{NewReferral, ReferralRepository, SqliteReferralRepository};
pub use user_repository::{RepositoryError, RepositoryResult, SqliteUserRepository, UserRepository};
