// marketplace/src/pipelines/mod.rs

//! Multi-step workflows run through the `furrow` registry.

use crate::errors::AppError;
use crate::state::AppState;
use furrow::Furrow;
use std::sync::Arc;

pub mod common_steps;
pub mod contexts;

pub mod listing_pipeline;
pub mod order_pipeline;
pub mod password_reset_pipeline;
pub mod signin_pipeline;
pub mod signup_pipeline;
pub mod verify_email_pipeline;

/// Registers every pipeline. Called once at startup.
pub fn register_all_pipelines(furrow: &Arc<Furrow<AppError>>, app_state: &AppState) {
  tracing::info!("Registering pipelines...");

  signup_pipeline::register_signup_pipeline(furrow, app_state);
  signin_pipeline::register_signin_pipeline(furrow, app_state);
  verify_email_pipeline::register_verify_email_pipeline(furrow, app_state);
  password_reset_pipeline::register_password_reset_request_pipeline(furrow, app_state);
  password_reset_pipeline::register_password_reset_confirm_pipeline(furrow, app_state);
  listing_pipeline::register_create_listing_pipeline(furrow, app_state);
  order_pipeline::register_place_order_pipeline(furrow, app_state);
  order_pipeline::register_update_order_status_pipeline(furrow, app_state);

  tracing::info!("All application pipelines registered.");
}
