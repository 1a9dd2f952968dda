// marketplace/src/web/handlers/qr_code_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::harvest::HARVEST_COLUMNS;
use crate::models::listing::LISTING_COLUMNS;
use crate::models::qr_code::{generate_code, QR_CODE_COLUMNS};
use crate::models::{Harvest, Listing, QrCode, UserRole};
use crate::pipelines::common_steps;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateQrCodePayload {
  pub harvest_id: Uuid,
  pub listing_id: Option<Uuid>,
}

#[instrument(name = "handler::list_qr_codes", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_qr_codes_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  let query = format!("SELECT {} FROM qr_codes WHERE farmer_id = $1 ORDER BY created_at DESC", QR_CODE_COLUMNS);
  let codes = sqlx::query_as::<_, QrCode>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(codes))
}

#[instrument(name = "handler::create_qr_code", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn create_qr_code_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreateQrCodePayload>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let payload = req_payload.into_inner();

  let owns_harvest = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM harvests WHERE id = $1 AND farmer_id = $2)")
    .bind(payload.harvest_id)
    .bind(auth_user.user_id)
    .fetch_one(&app_state.db_pool)
    .await?;
  if !owns_harvest {
    return Err(AppError::NotFound(format!("Harvest {} not found.", payload.harvest_id)));
  }
  if let Some(listing_id) = payload.listing_id {
    let matches = sqlx::query_scalar::<_, bool>(
      "SELECT EXISTS(SELECT 1 FROM listings WHERE id = $1 AND farmer_id = $2 AND harvest_id = $3)",
    )
    .bind(listing_id)
    .bind(auth_user.user_id)
    .bind(payload.harvest_id)
    .fetch_one(&app_state.db_pool)
    .await?;
    if !matches {
      return Err(AppError::Validation("listingId: must be a listing of the same harvest".to_string()));
    }
  }

  let query = format!(
    "INSERT INTO qr_codes (id, code, farmer_id, harvest_id, listing_id) VALUES ($1, $2, $3, $4, $5) RETURNING {}",
    QR_CODE_COLUMNS
  );
  let code = sqlx::query_as::<_, QrCode>(&query)
    .bind(Uuid::new_v4())
    .bind(generate_code())
    .bind(auth_user.user_id)
    .bind(payload.harvest_id)
    .bind(payload.listing_id)
    .fetch_one(&app_state.db_pool)
    .await?;
  info!(code = %code.code, "QR code generated.");
  Ok(HttpResponse::Created().json(code))
}

#[instrument(name = "handler::delete_qr_code", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn delete_qr_code_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let qr_id = path.into_inner();
  let deleted = sqlx::query("DELETE FROM qr_codes WHERE id = $1 AND farmer_id = $2")
    .bind(qr_id)
    .bind(auth_user.user_id)
    .execute(&app_state.db_pool)
    .await?;
  if deleted.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("QR code {} not found.", qr_id)));
  }
  Ok(HttpResponse::NoContent().finish())
}

/// Public provenance lookup. Every scan is counted.
#[instrument(name = "handler::scan_qr_code", skip(app_state))]
pub async fn scan_qr_code_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let code = path.into_inner().trim().to_ascii_uppercase();
  let query = format!(
    "UPDATE qr_codes SET scan_count = scan_count + 1, last_scanned_at = now() WHERE code = $1 RETURNING {}",
    QR_CODE_COLUMNS
  );
  let qr = sqlx::query_as::<_, QrCode>(&query)
    .bind(&code)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("QR code {} not found.", code)))?;

  let farmer = common_steps::fetch_user(&app_state.db_pool, qr.farmer_id).await?;
  let harvest_query = format!("SELECT {} FROM harvests WHERE id = $1", HARVEST_COLUMNS);
  let harvest = sqlx::query_as::<_, Harvest>(&harvest_query)
    .bind(qr.harvest_id)
    .fetch_one(&app_state.db_pool)
    .await?;
  let listing = match qr.listing_id {
    Some(listing_id) => {
      let listing_query = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
      sqlx::query_as::<_, Listing>(&listing_query)
        .bind(listing_id)
        .fetch_optional(&app_state.db_pool)
        .await?
    }
    None => None,
  };

  Ok(HttpResponse::Ok().json(json!({
    "code": qr.code,
    "scanCount": qr.scan_count,
    "farmer": {
      "name": farmer.full_name,
      "location": farmer.location,
    },
    "harvest": {
      "crop": harvest.crop,
      "variety": harvest.variety,
      "harvestedOn": harvest.harvested_on,
      "location": harvest.location,
      "quantityKg": harvest.quantity_kg,
    },
    "listing": listing.map(|l| json!({
      "id": l.id,
      "title": l.title,
      "priceCents": l.price_cents,
      "currency": l.currency,
      "status": l.status,
    })),
  })))
}
