// marketplace/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::order::ORDER_COLUMNS;
use crate::models::{Order, OrderStatus, UserRole};
use crate::pipelines::contexts::{PlaceOrderCtxData, PlaceOrderInput, UpdateOrderStatusCtxData};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use furrow::{ContextData, PipelineResult};

#[derive(Deserialize, Debug)]
pub struct OrderStatusPayload {
  pub status: OrderStatus,
}

#[instrument(name = "handler::list_orders", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let filter = match auth_user.role {
    UserRole::Buyer => "WHERE buyer_id = $1",
    UserRole::Farmer => "WHERE farmer_id = $1",
    UserRole::Admin => "WHERE $1::uuid IS NOT NULL",
    UserRole::Partner => "WHERE farmer_id IN (SELECT id FROM users WHERE partner_id = $1)",
  };
  let query = format!("SELECT {} FROM orders {} ORDER BY created_at DESC", ORDER_COLUMNS, filter);
  let orders = sqlx::query_as::<_, Order>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::place_order", skip(app_state, req_payload), fields(user_id = %auth_user.user_id, listing_id = %req_payload.listing_id))]
pub async fn place_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<PlaceOrderInput>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Buyer])?;
  let ctx = ContextData::new(PlaceOrderCtxData {
    app_state: app_state.get_ref().clone(),
    buyer_id: auth_user.user_id,
    input: req_payload.into_inner(),
    listing: None,
    farmer: None,
    order: None,
    farmer_emailed: false,
    sms_provider: None,
  });

  match app_state.furrow.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let order = ctx
        .read()
        .order
        .clone()
        .ok_or_else(|| AppError::Internal("Order pipeline completed without an order.".to_string()))?;
      info!(order_id = %order.id, "Order placed.");
      Ok(HttpResponse::Created().json(order))
    }
    Ok(PipelineResult::Stopped) => Err(AppError::Internal("Order placement was halted.".to_string())),
    Err(app_err) => {
      warn!(error = %app_err, "Order placement failed.");
      Err(app_err)
    }
  }
}

#[instrument(name = "handler::get_order", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
  let order = sqlx::query_as::<_, Order>(&query)
    .bind(order_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .filter(|o| o.party_of(auth_user.user_id, auth_user.is_admin()).is_some())
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::update_order_status", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  req_payload: web::Json<OrderStatusPayload>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(UpdateOrderStatusCtxData {
    app_state: app_state.get_ref().clone(),
    order_id: path.into_inner(),
    actor_id: auth_user.user_id,
    actor_role: auth_user.role,
    next_status: req_payload.status,
    order: None,
    updated: None,
  });

  app_state.furrow.run(ctx.clone()).await?;
  let updated = ctx
    .read()
    .updated
    .clone()
    .ok_or_else(|| AppError::Internal("Status change completed without an order.".to_string()))?;
  Ok(HttpResponse::Ok().json(updated))
}
