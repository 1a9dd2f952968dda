// marketplace/src/web/handlers/listing_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::listing::LISTING_COLUMNS;
use crate::models::{Listing, ListingStatus, UserRole};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{CreateListingCtxData, CreateListingInput};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use furrow::{ContextData, PipelineResult};

#[derive(Deserialize, Debug)]
pub struct ListingQuery {
  pub crop: Option<String>,
  pub farmer_id: Option<Uuid>,
}

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateListingPayload {
  #[validate(length(min = 1, max = 120))]
  pub title: Option<String>,
  #[validate(length(max = 2000))]
  pub description: Option<String>,
  #[validate(range(min = 1, max = 1_000_000_000, message = "must be between 1 and 1000000000"))]
  pub price_cents: Option<i64>,
}

async fn fetch_listing(app_state: &AppState, listing_id: Uuid) -> Result<Listing, AppError> {
  let query = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
  sqlx::query_as::<_, Listing>(&query)
    .bind(listing_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Listing {} not found.", listing_id)))
}

async fn fetch_owned_listing(app_state: &AppState, auth_user: &AuthenticatedUser, listing_id: Uuid) -> Result<Listing, AppError> {
  let listing = fetch_listing(app_state, listing_id).await?;
  if listing.farmer_id != auth_user.user_id {
    return Err(AppError::NotFound(format!("Listing {} not found.", listing_id)));
  }
  Ok(listing)
}

/// Public marketplace view: active listings only. `crop` matches the title or the harvest's crop.
#[instrument(name = "handler::list_listings", skip(app_state))]
pub async fn list_listings_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListingQuery>,
) -> Result<HttpResponse, AppError> {
  let crop_pattern = query.crop.as_ref().map(|c| format!("%{}%", c.trim()));
  let sql = format!(
    "SELECT {} FROM listings l WHERE l.status = 'active' \
     AND ($1::text IS NULL OR l.title ILIKE $1 OR EXISTS (SELECT 1 FROM harvests h WHERE h.id = l.harvest_id AND h.crop ILIKE $1)) \
     AND ($2::uuid IS NULL OR l.farmer_id = $2) \
     ORDER BY l.created_at DESC LIMIT 200",
    LISTING_COLUMNS
      .split(", ")
      .map(|c| format!("l.{}", c))
      .collect::<Vec<_>>()
      .join(", ")
  );
  let listings = sqlx::query_as::<_, Listing>(&sql)
    .bind(crop_pattern)
    .bind(query.farmer_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(listings))
}

#[instrument(name = "handler::my_listings", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn my_listings_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  let query = format!("SELECT {} FROM listings WHERE farmer_id = $1 ORDER BY created_at DESC", LISTING_COLUMNS);
  let listings = sqlx::query_as::<_, Listing>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(listings))
}

#[instrument(name = "handler::create_listing", skip(app_state, req_payload), fields(user_id = %auth_user.user_id, harvest_id = %req_payload.harvest_id))]
pub async fn create_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreateListingInput>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  let ctx = ContextData::new(CreateListingCtxData {
    app_state: app_state.get_ref().clone(),
    farmer_id: auth_user.user_id,
    input: req_payload.into_inner(),
    farmer: None,
    harvest: None,
    listing: None,
  });

  match app_state.furrow.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let listing = ctx
        .read()
        .listing
        .clone()
        .ok_or_else(|| AppError::Internal("Listing pipeline completed without a listing.".to_string()))?;
      Ok(HttpResponse::Created().json(listing))
    }
    Ok(PipelineResult::Stopped) => Err(AppError::Internal("Listing creation was halted.".to_string())),
    Err(app_err) => {
      warn!(error = %app_err, "Listing creation failed.");
      Err(app_err)
    }
  }
}

/// Active listings are public. Other states are visible to the owner and admins only.
#[instrument(name = "handler::get_listing", skip(app_state, auth_user))]
pub async fn get_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: Option<AuthenticatedUser>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let listing = fetch_listing(&app_state, path.into_inner()).await?;
  let privileged = auth_user
    .map(|u| u.is_admin() || u.user_id == listing.farmer_id)
    .unwrap_or(false);
  if listing.status != ListingStatus::Active && !privileged {
    return Err(AppError::NotFound(format!("Listing {} not found.", listing.id)));
  }
  Ok(HttpResponse::Ok().json(listing))
}

#[instrument(name = "handler::update_listing", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn update_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<UpdateListingPayload>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  req_payload.validate()?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let existing = fetch_owned_listing(&app_state, &auth_user, path.into_inner()).await?;
  if !existing.is_editable() {
    return Err(AppError::Conflict(format!("A {:?} listing cannot be changed.", existing.status)));
  }
  let payload = req_payload.into_inner();

  let query = format!(
    "UPDATE listings SET title = COALESCE($1, title), description = COALESCE($2, description), \
     price_cents = COALESCE($3, price_cents), updated_at = now() WHERE id = $4 RETURNING {}",
    LISTING_COLUMNS
  );
  let listing = sqlx::query_as::<_, Listing>(&query)
    .bind(payload.title.as_deref().map(str::trim))
    .bind(&payload.description)
    .bind(payload.price_cents)
    .bind(existing.id)
    .fetch_one(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(listing))
}

#[instrument(name = "handler::archive_listing", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn archive_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Farmer])?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let existing = fetch_owned_listing(&app_state, &auth_user, path.into_inner()).await?;
  if existing.status == ListingStatus::Archived {
    return Ok(HttpResponse::Ok().json(existing));
  }
  let query = format!(
    "UPDATE listings SET status = $1, updated_at = now() WHERE id = $2 RETURNING {}",
    LISTING_COLUMNS
  );
  let mut tx = app_state.db_pool.begin().await?;
  let listing = sqlx::query_as::<_, Listing>(&query)
    .bind(ListingStatus::Archived)
    .bind(existing.id)
    .fetch_one(&mut *tx)
    .await?;
  // Unsold stock goes back to the harvest.
  let harvest_status = common_steps::settle_harvest_status(&mut tx, listing.harvest_id).await?;
  tx.commit().await?;
  info!(listing_id = %listing.id, harvest_status = ?harvest_status, "Listing archived.");
  Ok(HttpResponse::Ok().json(listing))
}
