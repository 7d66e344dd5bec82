pub mod magic_link_handlers;
pub mod referral_handlers;
pub mod session_handlers;

pub use magic_link_handlers::{send_magic_link_handler, verify_magic_link_handler};
pub use referral_handlers::list_referrals_handler;
pub use session_handlers::{index_handler, not_found_handler, session_handler, signout_handler};
