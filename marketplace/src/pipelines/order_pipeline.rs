// marketplace/src/pipelines/order_pipeline.rs

//! Placing orders and moving them through their lifecycle.

use crate::errors::AppError;
use crate::models::listing::{StockChange, LISTING_COLUMNS};
use crate::models::order::{total_cents, ORDER_COLUMNS};
use crate::models::transaction::{delivery_entries, reference_for, LedgerEntry};
use crate::models::{Listing, ListingStatus, Order, OrderStatus, TransactionStatus, UserRole};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::{PlaceOrderCtxData, UpdateOrderStatusCtxData};
use crate::services::templates::{self, OrderSummary};
use crate::state::AppState;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl, SkipCondition};
use sqlx::{PgConnection, Postgres, Transaction as DbTransaction};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub fn register_place_order_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let farmer_has_no_phone: SkipCondition<PlaceOrderCtxData> = Arc::new(|ctx: ContextData<PlaceOrderCtxData>| {
    ctx.read().farmer.as_ref().and_then(|f| f.phone.as_ref()).is_none()
  });

  let mut order_p = Pipeline::<PlaceOrderCtxData, AppError>::new(&[
    ("validate_order_input", false, None),
    ("load_orderable_listing", false, None),
    ("reserve_stock_and_insert_order", false, None),
    ("notify_farmer_email", true, None),
    ("notify_farmer_sms", true, Some(farmer_has_no_phone)),
  ]);

  order_p.on_root("validate_order_input", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let input = ctx_data.read().input.clone();
      common_steps::validate_input(&input)
    })
  });

  order_p.on_root("load_orderable_listing", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (buyer_id, listing_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.buyer_id, guard.input.listing_id, guard.app_state.db_pool.clone())
      };

      let query = format!("SELECT {} FROM listings WHERE id = $1", LISTING_COLUMNS);
      let listing = sqlx::query_as::<_, Listing>(&query)
        .bind(listing_id)
        .fetch_optional(&db_pool)
        .await?
        .filter(|l| l.status != ListingStatus::PendingApproval && l.status != ListingStatus::Rejected)
        .ok_or_else(|| AppError::NotFound(format!("Listing {} not found.", listing_id)))?;

      let buyer = common_steps::fetch_user(&db_pool, buyer_id).await?;
      let farmer = common_steps::fetch_user(&db_pool, listing.farmer_id).await?;
      listing.check_order_request(&buyer, &farmer)?;

      let mut guard = ctx_data.write();
      guard.listing = Some(listing);
      guard.farmer = Some(farmer);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  order_p.on_root("reserve_stock_and_insert_order", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (buyer_id, input, listing, db_pool) = {
        let guard = ctx_data.read();
        (
          guard.buyer_id,
          guard.input.clone(),
          guard.listing.clone(),
          guard.app_state.db_pool.clone(),
        )
      };
      let listing = listing.ok_or_else(|| AppError::Internal("Listing missing from order context.".to_string()))?;

      let total = total_cents(listing.price_cents, input.quantity_kg)?;
      let mut tx = db_pool.begin().await?;
      let locked = lock_listing(&mut tx, listing.id).await?;
      let Some(change) = locked.reserve(input.quantity_kg) else {
        warn!(listing_id = %listing.id, requested = input.quantity_kg, available = locked.quantity_kg, "Insufficient stock.");
        return Err(AppError::Conflict("Not enough quantity available for this listing.".to_string()));
      };
      store_stock(&mut tx, listing.id, change).await?;

      let query = format!(
        "INSERT INTO orders (id, listing_id, buyer_id, farmer_id, quantity_kg, total_cents, currency, status, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
        ORDER_COLUMNS
      );
      let order = sqlx::query_as::<_, Order>(&query)
        .bind(Uuid::new_v4())
        .bind(listing.id)
        .bind(buyer_id)
        .bind(listing.farmer_id)
        .bind(input.quantity_kg)
        .bind(total)
        .bind(&listing.currency)
        .bind(OrderStatus::Pending)
        .bind(&input.notes)
        .fetch_one(&mut *tx)
        .await?;
      if change.status == ListingStatus::SoldOut {
        common_steps::settle_harvest_status(&mut tx, listing.harvest_id).await?;
      }
      tx.commit().await?;

      info!(order_id = %order.id, listing_id = %listing.id, remaining_kg = change.remaining_kg, "Order placed.");
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  order_p.on_root("notify_farmer_email", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (app_state, farmer, listing, order) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.farmer.clone(), guard.listing.clone(), guard.order.clone())
      };
      let (Some(farmer), Some(listing), Some(order)) = (farmer, listing, order) else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };
      let summary = OrderSummary {
        order_id: order.id,
        listing_title: &listing.title,
        quantity_kg: order.quantity_kg,
        total_cents: order.total_cents,
        currency: &order.currency,
      };
      let orders_url = format!("{}/orders", app_state.config.frontend_url.trim_end_matches('/'));
      common_steps::queue_email_step(
        &app_state,
        templates::order_placed_email(&farmer.email, farmer.first_name(), &summary, &orders_url),
      );
      ctx_data.write().farmer_emailed = true;
      Ok(PipelineControl::Continue)
    })
  });

  order_p.on_root("notify_farmer_sms", |ctx_data: ContextData<PlaceOrderCtxData>| {
    Box::pin(async move {
      let (app_state, phone, listing, order) = {
        let guard = ctx_data.read();
        (
          guard.app_state.clone(),
          guard.farmer.as_ref().and_then(|f| f.phone.clone()),
          guard.listing.clone(),
          guard.order.clone(),
        )
      };
      let (Some(phone), Some(listing), Some(order)) = (phone, listing, order) else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };
      let body = templates::order_placed_sms(&OrderSummary {
        order_id: order.id,
        listing_title: &listing.title,
        quantity_kg: order.quantity_kg,
        total_cents: order.total_cents,
        currency: &order.currency,
      });
      let provider = common_steps::send_sms_step(&app_state, &phone, &body).await;
      ctx_data.write().sms_provider = provider;
      Ok(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(order_p);
  tracing::info!("Place-order pipeline registered.");
}

async fn lock_listing(conn: &mut PgConnection, listing_id: Uuid) -> Result<Listing, AppError> {
  let query = format!("SELECT {} FROM listings WHERE id = $1 FOR UPDATE", LISTING_COLUMNS);
  sqlx::query_as::<_, Listing>(&query)
    .bind(listing_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Listing {} not found.", listing_id)))
}

async fn store_stock(conn: &mut PgConnection, listing_id: Uuid, change: StockChange) -> Result<(), AppError> {
  sqlx::query("UPDATE listings SET quantity_kg = $1, status = $2, updated_at = now() WHERE id = $3")
    .bind(change.remaining_kg)
    .bind(change.status)
    .bind(listing_id)
    .execute(&mut *conn)
    .await?;
  Ok(())
}

async fn restore_stock(tx: &mut DbTransaction<'_, Postgres>, order: &Order) -> Result<(), AppError> {
  let listing = lock_listing(&mut **tx, order.listing_id).await?;
  let change = listing.restock(order.quantity_kg);
  store_stock(&mut **tx, listing.id, change).await?;
  common_steps::settle_harvest_status(&mut **tx, listing.harvest_id).await?;
  Ok(())
}

async fn insert_transaction(tx: &mut DbTransaction<'_, Postgres>, order: &Order, entry: LedgerEntry) -> Result<(), AppError> {
  sqlx::query(
    "INSERT INTO transactions (id, user_id, order_id, kind, amount_cents, currency, status, reference) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
  )
  .bind(Uuid::new_v4())
  .bind(entry.user_id)
  .bind(order.id)
  .bind(entry.kind)
  .bind(entry.amount_cents)
  .bind(&order.currency)
  .bind(TransactionStatus::Completed)
  .bind(reference_for(entry.kind, order.id))
  .execute(&mut **tx)
  .await?;
  Ok(())
}

async fn record_delivery(tx: &mut DbTransaction<'_, Postgres>, order: &Order, commission_bps: i64) -> Result<(), AppError> {
  let partner_id = sqlx::query_scalar::<_, Option<Uuid>>("SELECT partner_id FROM users WHERE id = $1")
    .bind(order.farmer_id)
    .fetch_one(&mut **tx)
    .await?;
  let entries = delivery_entries(order.total_cents, order.farmer_id, order.buyer_id, partner_id, commission_bps)?;
  for entry in entries {
    insert_transaction(tx, order, entry).await?;
  }
  Ok(())
}

pub fn register_update_order_status_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut status_p = Pipeline::<UpdateOrderStatusCtxData, AppError>::new(&[
    ("load_order", false, None),
    ("authorize_transition", false, None),
    ("apply_transition", false, None),
    ("notify_buyer", true, None),
  ]);

  status_p.on_root("load_order", |ctx_data: ContextData<UpdateOrderStatusCtxData>| {
    Box::pin(async move {
      let (order_id, actor_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.order_id, guard.actor_id, guard.app_state.db_pool.clone())
      };
      common_steps::fetch_signed_in_user(&db_pool, actor_id).await?;
      let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
      let order = sqlx::query_as::<_, Order>(&query)
        .bind(order_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  status_p.on_root("authorize_transition", |ctx_data: ContextData<UpdateOrderStatusCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let order = guard
        .order
        .as_ref()
        .ok_or_else(|| AppError::Internal("Order missing from status context.".to_string()))?;
      // Outsiders get NotFound so order ids do not leak.
      let party = order
        .party_of(guard.actor_id, guard.actor_role == UserRole::Admin)
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order.id)))?;
      order.status.check_transition(guard.next_status, party)?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  status_p.on_root("apply_transition", |ctx_data: ContextData<UpdateOrderStatusCtxData>| {
    Box::pin(async move {
      let (order, next_status, app_state) = {
        let guard = ctx_data.read();
        (guard.order.clone(), guard.next_status, guard.app_state.clone())
      };
      let order = order.ok_or_else(|| AppError::Internal("Order missing from status context.".to_string()))?;

      let mut tx = app_state.db_pool.begin().await?;
      let query = format!(
        "UPDATE orders SET status = $1, updated_at = now() WHERE id = $2 AND status = $3 RETURNING {}",
        ORDER_COLUMNS
      );
      let updated = sqlx::query_as::<_, Order>(&query)
        .bind(next_status)
        .bind(order.id)
        .bind(order.status)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Conflict("Order was modified concurrently; reload and try again.".to_string()))?;

      match next_status {
        OrderStatus::Cancelled => restore_stock(&mut tx, &updated).await?,
        OrderStatus::Delivered => record_delivery(&mut tx, &updated, app_state.config.partner_commission_bps).await?,
        _ => {}
      }
      tx.commit().await?;

      info!(order_id = %updated.id, from = ?order.status, to = ?next_status, "Order status changed.");
      ctx_data.write().updated = Some(updated);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  status_p.on_root("notify_buyer", |ctx_data: ContextData<UpdateOrderStatusCtxData>| {
    Box::pin(async move {
      let (app_state, updated, actor_id) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.updated.clone(), guard.actor_id)
      };
      let Some(order) = updated else {
        return Ok::<_, AppError>(PipelineControl::Continue);
      };
      if order.buyer_id == actor_id {
        return Ok(PipelineControl::Continue);
      }
      match common_steps::fetch_user(&app_state.db_pool, order.buyer_id).await {
        Ok(buyer) => {
          let orders_url = format!("{}/orders", app_state.config.frontend_url.trim_end_matches('/'));
          common_steps::queue_email_step(
            &app_state,
            templates::order_status_email(&buyer.email, buyer.first_name(), order.id, order.status, &orders_url),
          );
        }
        Err(e) => warn!(error = %e, order_id = %order.id, "Could not notify buyer of status change."),
      }
      Ok(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(status_p);
  tracing::info!("Order status pipeline registered.");
}
