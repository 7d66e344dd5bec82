use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const REFERRAL_STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Referral {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub signup_date: i64,
    pub attribution_expires: i64,
    pub status: String,
    pub total_earnings: f64,
    pub created_at: i64,
    pub updated_at: i64,
}
