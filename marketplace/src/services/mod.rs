// marketplace/src/services/mod.rs

pub mod auth_service;
pub mod email;
pub mod email_queue;
pub mod sms;
pub mod templates;
pub mod token_store;
