// marketplace/src/web/handlers/harvest_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::harvest::HARVEST_COLUMNS;
use crate::models::{Harvest, HarvestStatus, UserRole};
use crate::pipelines::common_steps;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateHarvestPayload {
  #[validate(length(min = 1, max = 80, message = "is required"))]
  pub crop: String,
  #[validate(length(max = 80))]
  pub variety: Option<String>,
  #[validate(range(exclusive_min = 0.0, max = 1_000_000.0, message = "must be positive and at most 1000000"))]
  pub quantity_kg: f64,
  #[validate(range(min = 0))]
  pub unit_price_cents: Option<i64>,
  pub harvested_on: NaiveDate,
  #[validate(length(max = 200))]
  pub location: Option<String>,
  #[validate(length(max = 2000))]
  pub notes: Option<String>,
}

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateHarvestPayload {
  #[validate(length(min = 1, max = 80))]
  pub crop: Option<String>,
  #[validate(length(max = 80))]
  pub variety: Option<String>,
  #[validate(range(exclusive_min = 0.0, max = 1_000_000.0, message = "must be positive and at most 1000000"))]
  pub quantity_kg: Option<f64>,
  #[validate(range(min = 0))]
  pub unit_price_cents: Option<i64>,
  pub harvested_on: Option<NaiveDate>,
  #[validate(length(max = 200))]
  pub location: Option<String>,
  #[validate(length(max = 2000))]
  pub notes: Option<String>,
}

async fn fetch_owned(app_state: &AppState, farmer_id: Uuid, harvest_id: Uuid) -> Result<Harvest, AppError> {
  let query = format!("SELECT {} FROM harvests WHERE id = $1 AND farmer_id = $2", HARVEST_COLUMNS);
  sqlx::query_as::<_, Harvest>(&query)
    .bind(harvest_id)
    .bind(farmer_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Harvest {} not found.", harvest_id)))
}

#[instrument(name = "handler::list_harvests", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_harvests_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  let query = format!(
    "SELECT {} FROM harvests WHERE farmer_id = $1 ORDER BY harvested_on DESC, created_at DESC",
    HARVEST_COLUMNS
  );
  let harvests = sqlx::query_as::<_, Harvest>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(harvests))
}

#[instrument(name = "handler::create_harvest", skip(app_state, req_payload), fields(user_id = %auth_user.user_id, crop = %req_payload.crop))]
pub async fn create_harvest_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreateHarvestPayload>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  req_payload.validate()?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let payload = req_payload.into_inner();

  let query = format!(
    "INSERT INTO harvests (id, farmer_id, crop, variety, quantity_kg, unit_price_cents, harvested_on, location, notes, status) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {}",
    HARVEST_COLUMNS
  );
  let harvest = sqlx::query_as::<_, Harvest>(&query)
    .bind(Uuid::new_v4())
    .bind(auth_user.user_id)
    .bind(payload.crop.trim())
    .bind(&payload.variety)
    .bind(payload.quantity_kg)
    .bind(payload.unit_price_cents)
    .bind(payload.harvested_on)
    .bind(&payload.location)
    .bind(&payload.notes)
    .bind(HarvestStatus::Logged)
    .fetch_one(&app_state.db_pool)
    .await?;
  info!(harvest_id = %harvest.id, "Harvest logged.");
  Ok(HttpResponse::Created().json(harvest))
}

#[instrument(name = "handler::get_harvest", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn get_harvest_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  let harvest = fetch_owned(&app_state, auth_user.user_id, path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(harvest))
}

#[instrument(name = "handler::update_harvest", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn update_harvest_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<UpdateHarvestPayload>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  req_payload.validate()?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let existing = fetch_owned(&app_state, auth_user.user_id, path.into_inner()).await?;
  let payload = req_payload.into_inner();

  let mut tx = app_state.db_pool.begin().await?;
  let (locked, allocation) = common_steps::lock_harvest(&mut tx, existing.id).await?;
  if matches!(locked.status, HarvestStatus::Sold | HarvestStatus::Archived) {
    return Err(AppError::Conflict(format!("A {:?} harvest cannot be edited.", locked.status)));
  }
  if let Some(quantity_kg) = payload.quantity_kg {
    allocation.check_quantity_change(quantity_kg)?;
  }

  let query = format!(
    "UPDATE harvests SET crop = COALESCE($1, crop), variety = COALESCE($2, variety), \
     quantity_kg = COALESCE($3, quantity_kg), unit_price_cents = COALESCE($4, unit_price_cents), \
     harvested_on = COALESCE($5, harvested_on), location = COALESCE($6, location), \
     notes = COALESCE($7, notes), updated_at = now() WHERE id = $8 RETURNING {}",
    HARVEST_COLUMNS
  );
  let mut harvest = sqlx::query_as::<_, Harvest>(&query)
    .bind(payload.crop.as_deref().map(str::trim))
    .bind(&payload.variety)
    .bind(payload.quantity_kg)
    .bind(payload.unit_price_cents)
    .bind(payload.harvested_on)
    .bind(&payload.location)
    .bind(&payload.notes)
    .bind(existing.id)
    .fetch_one(&mut *tx)
    .await?;
  // Trimming the quantity down to what is already sold settles the harvest as sold.
  harvest.status = common_steps::settle_harvest_status(&mut tx, harvest.id).await?;
  tx.commit().await?;
  Ok(HttpResponse::Ok().json(harvest))
}

/// Refused while a live listing exists. A harvest whose listings are all
/// archived or rejected is archived instead of deleted.
#[instrument(name = "handler::delete_harvest", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn delete_harvest_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let harvest = fetch_owned(&app_state, auth_user.user_id, path.into_inner()).await?;

  let (live, total): (i64, i64) = sqlx::query_as(
    "SELECT COUNT(*) FILTER (WHERE status IN ('pending_approval', 'active', 'sold_out')), COUNT(*) \
     FROM listings WHERE harvest_id = $1",
  )
  .bind(harvest.id)
  .fetch_one(&app_state.db_pool)
  .await?;
  if live > 0 {
    return Err(AppError::Conflict("Harvest has active listings; archive them first.".to_string()));
  }

  if total > 0 {
    sqlx::query("UPDATE harvests SET status = $1, updated_at = now() WHERE id = $2")
      .bind(HarvestStatus::Archived)
      .bind(harvest.id)
      .execute(&app_state.db_pool)
      .await?;
    info!(harvest_id = %harvest.id, "Harvest archived.");
    return Ok(HttpResponse::Ok().json(json!({ "message": "Harvest archived.", "id": harvest.id })));
  }

  sqlx::query("DELETE FROM harvests WHERE id = $1")
    .bind(harvest.id)
    .execute(&app_state.db_pool)
    .await?;
  info!(harvest_id = %harvest.id, "Harvest deleted.");
  Ok(HttpResponse::NoContent().finish())
}
