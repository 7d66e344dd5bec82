pub mod referral;
pub mod security_headers;

pub use referral::{
    attribution_cookie, is_attribution_path, referral_attribution, REFERRAL_CODE_COOKIE,
    REFERRER_ID_COOKIE,
};
pub use security_headers::add_security_headers;
