use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    /// Epoch milliseconds of the first successful email sign-in.
    pub email_verified: Option<i64>,
    pub image: Option<String>,
    /// Code other visitors carry in `?ref=` to credit this user.
    pub referral_link: Option<String>,
    pub created_at: i64,
}
