// marketplace/src/pipelines/common_steps.rs

//! Lookups and notification helpers shared by several pipelines.

use crate::errors::{AppError, Result as AppResult};
use crate::models::harvest::{HarvestAllocation, HARVEST_ALLOCATION_QUERY, HARVEST_COLUMNS};
use crate::models::user::USER_COLUMNS;
use crate::models::{Harvest, HarvestStatus, User};
use crate::services::email::EmailMessage;
use crate::state::AppState;
use furrow::PipelineControl;
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub fn validate_input<T: Validate>(input: &T) -> AppResult<PipelineControl> {
  input.validate()?;
  Ok(PipelineControl::Continue)
}

pub fn normalize_email(email: &str) -> String {
  email.trim().to_lowercase()
}

#[instrument(name = "common_step::fetch_user_by_email", skip(pool))]
pub async fn fetch_user_by_email(pool: &PgPool, email: &str) -> AppResult<Option<User>> {
  let query = format!("SELECT {} FROM users WHERE lower(email) = lower($1)", USER_COLUMNS);
  Ok(sqlx::query_as::<_, User>(&query).bind(email).fetch_optional(pool).await?)
}

#[instrument(name = "common_step::fetch_user", skip(pool), fields(user_id = %user_id))]
pub async fn fetch_user(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
  let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
  sqlx::query_as::<_, User>(&query)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found.", user_id)))
}

/// Locks the harvest row for the rest of the transaction and loads how much of it is committed.
pub async fn lock_harvest(conn: &mut PgConnection, harvest_id: Uuid) -> AppResult<(Harvest, HarvestAllocation)> {
  let query = format!("SELECT {} FROM harvests WHERE id = $1 FOR UPDATE", HARVEST_COLUMNS);
  let harvest = sqlx::query_as::<_, Harvest>(&query)
    .bind(harvest_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Harvest {} not found.", harvest_id)))?;
  let allocation = sqlx::query_as::<_, HarvestAllocation>(HARVEST_ALLOCATION_QUERY)
    .bind(harvest_id)
    .fetch_one(&mut *conn)
    .await?;
  Ok((harvest, allocation))
}

/// Stores the status a harvest should have after its listings or orders changed.
pub async fn settle_harvest_status(conn: &mut PgConnection, harvest_id: Uuid) -> AppResult<HarvestStatus> {
  let (harvest, allocation) = lock_harvest(conn, harvest_id).await?;
  let status = allocation.settled_status(&harvest);
  if status != harvest.status {
    sqlx::query("UPDATE harvests SET status = $1, updated_at = now() WHERE id = $2")
      .bind(status)
      .bind(harvest_id)
      .execute(&mut *conn)
      .await?;
    info!(%harvest_id, from = ?harvest.status, to = ?status, "Harvest status settled.");
  }
  Ok(status)
}

/// Loads the caller's account and refuses suspended or unverified ones.
pub async fn fetch_signed_in_user(pool: &PgPool, user_id: Uuid) -> AppResult<User> {
  let user = fetch_user(pool, user_id).await?;
  user.ensure_can_sign_in()?;
  Ok(user)
}

/// Hands the message to the delivery queue. Queueing never fails the calling pipeline.
pub fn queue_email_step(app_state: &AppState, message: EmailMessage) -> PipelineControl {
  info!(to = %message.to, subject = %message.subject, "Queueing notification email.");
  app_state.queue_email(message);
  PipelineControl::Continue
}

/// Sends an SMS right away. Failures are logged and swallowed.
#[instrument(name = "common_step::send_sms", skip(app_state, body))]
pub async fn send_sms_step(app_state: &AppState, to: &str, body: &str) -> Option<String> {
  match app_state.sms.send(to, body).await {
    Ok(provider) => {
      info!(%provider, "SMS notification sent.");
      Some(provider)
    }
    Err(e) => {
      warn!(error = %e, "SMS notification failed.");
      None
    }
  }
}
