// marketplace/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod auth_handlers;
pub mod harvest_handlers;
pub mod listing_handlers;
pub mod order_handlers;
pub mod partner_handlers;
pub mod payment_handlers;
pub mod profile_handlers;
pub mod qr_code_handlers;
pub mod report_handlers;
pub mod transaction_handlers;
