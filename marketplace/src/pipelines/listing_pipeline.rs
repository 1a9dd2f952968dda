// marketplace/src/pipelines/listing_pipeline.rs

use crate::errors::AppError;
use crate::models::harvest::HARVEST_COLUMNS;
use crate::models::listing::{LISTING_COLUMNS, STOCK_TOLERANCE_KG};
use crate::models::{Harvest, Listing, ListingStatus};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::CreateListingCtxData;
use crate::state::AppState;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub fn register_create_listing_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut listing_p = Pipeline::<CreateListingCtxData, AppError>::new(&[
    ("validate_listing_input", false, None),
    ("load_owned_harvest", false, None),
    ("check_listing_rules", false, None),
    ("insert_listing", false, None),
  ]);

  listing_p.on_root("validate_listing_input", |ctx_data: ContextData<CreateListingCtxData>| {
    Box::pin(async move {
      let input = ctx_data.read().input.clone();
      common_steps::validate_input(&input)?;
      ctx_data.write().input.currency = input.currency.to_ascii_uppercase();
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  listing_p.on_root("load_owned_harvest", |ctx_data: ContextData<CreateListingCtxData>| {
    Box::pin(async move {
      let (farmer_id, harvest_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.farmer_id, guard.input.harvest_id, guard.app_state.db_pool.clone())
      };

      let farmer = common_steps::fetch_user(&db_pool, farmer_id).await?;
      let query = format!("SELECT {} FROM harvests WHERE id = $1 AND farmer_id = $2", HARVEST_COLUMNS);
      let harvest = sqlx::query_as::<_, Harvest>(&query)
        .bind(harvest_id)
        .bind(farmer_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Harvest {} not found.", harvest_id)))?;

      let mut guard = ctx_data.write();
      guard.farmer = Some(farmer);
      guard.harvest = Some(harvest);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  listing_p.on_root("check_listing_rules", |ctx_data: ContextData<CreateListingCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let (farmer, harvest) = match (&guard.farmer, &guard.harvest) {
        (Some(f), Some(h)) => (f, h),
        _ => return Err(AppError::Internal("Listing context incomplete.".to_string())),
      };
      farmer.ensure_active()?;
      if !harvest.is_listable() {
        warn!(harvest_id = %harvest.id, status = ?harvest.status, "Harvest cannot be listed.");
        return Err(AppError::Validation(format!(
          "Harvest is {:?} and cannot be listed.",
          harvest.status
        )));
      }
      if guard.input.quantity_kg > harvest.quantity_kg + STOCK_TOLERANCE_KG {
        return Err(AppError::Validation(format!(
          "quantity_kg: cannot exceed the harvested {} kg",
          harvest.quantity_kg
        )));
      }
      Ok(PipelineControl::Continue)
    })
  });

  listing_p.on_root("insert_listing", |ctx_data: ContextData<CreateListingCtxData>| {
    Box::pin(async move {
      let (farmer_id, input, db_pool) = {
        let guard = ctx_data.read();
        (guard.farmer_id, guard.input.clone(), guard.app_state.db_pool.clone())
      };

      let mut tx = db_pool.begin().await?;
      // Concurrent listings of one harvest serialize on the harvest row.
      let (harvest, allocation) = common_steps::lock_harvest(&mut tx, input.harvest_id).await?;
      if !harvest.is_listable() {
        return Err(AppError::Validation(format!("Harvest is {:?} and cannot be listed.", harvest.status)));
      }
      allocation.check_new_listing(&harvest, input.quantity_kg)?;

      let query = format!(
        "INSERT INTO listings (id, harvest_id, farmer_id, title, description, price_cents, currency, quantity_kg, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
        LISTING_COLUMNS
      );
      let listing = sqlx::query_as::<_, Listing>(&query)
        .bind(Uuid::new_v4())
        .bind(input.harvest_id)
        .bind(farmer_id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.price_cents)
        .bind(&input.currency)
        .bind(input.quantity_kg)
        .bind(ListingStatus::PendingApproval)
        .fetch_one(&mut *tx)
        .await?;
      common_steps::settle_harvest_status(&mut tx, input.harvest_id).await?;
      tx.commit().await?;

      info!(listing_id = %listing.id, %farmer_id, "Listing created, awaiting approval.");
      ctx_data.write().listing = Some(listing);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(listing_p);
  tracing::info!("Create-listing pipeline registered.");
}
