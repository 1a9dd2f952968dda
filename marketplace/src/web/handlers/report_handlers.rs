// marketplace/src/web/handlers/report_handlers.rs

//! Dashboard totals. Each role sees a different summary.

use actix_web::{web, HttpResponse};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::UserRole;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

async fn count(pool: &PgPool, sql: &str, id: Option<Uuid>) -> Result<i64, AppError> {
  let value = sqlx::query_scalar::<_, i64>(sql).bind(id).fetch_one(pool).await?;
  Ok(value)
}

async fn farmer_summary(pool: &PgPool, farmer_id: Uuid) -> Result<JsonValue, AppError> {
  let id = Some(farmer_id);
  Ok(json!({
    "role": UserRole::Farmer,
    "harvests": count(pool, "SELECT COUNT(*) FROM harvests WHERE farmer_id = $1", id).await?,
    "activeListings": count(pool, "SELECT COUNT(*) FROM listings WHERE farmer_id = $1 AND status = 'active'", id).await?,
    "pendingListings": count(pool, "SELECT COUNT(*) FROM listings WHERE farmer_id = $1 AND status = 'pending_approval'", id).await?,
    "openOrders": count(pool, "SELECT COUNT(*) FROM orders WHERE farmer_id = $1 AND status IN ('pending', 'confirmed', 'shipped')", id).await?,
    "deliveredOrders": count(pool, "SELECT COUNT(*) FROM orders WHERE farmer_id = $1 AND status = 'delivered'", id).await?,
    "salesCents": count(pool, "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions WHERE user_id = $1 AND kind = 'sale'", id).await?,
    "qrScans": count(pool, "SELECT COALESCE(SUM(scan_count), 0)::BIGINT FROM qr_codes WHERE farmer_id = $1", id).await?,
  }))
}

async fn buyer_summary(pool: &PgPool, buyer_id: Uuid) -> Result<JsonValue, AppError> {
  let id = Some(buyer_id);
  Ok(json!({
    "role": UserRole::Buyer,
    "orders": count(pool, "SELECT COUNT(*) FROM orders WHERE buyer_id = $1", id).await?,
    "openOrders": count(pool, "SELECT COUNT(*) FROM orders WHERE buyer_id = $1 AND status IN ('pending', 'confirmed', 'shipped')", id).await?,
    "spentCents": count(pool, "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions WHERE user_id = $1 AND kind = 'purchase'", id).await?,
  }))
}

async fn partner_summary(pool: &PgPool, partner_id: Uuid) -> Result<JsonValue, AppError> {
  let id = Some(partner_id);
  Ok(json!({
    "role": UserRole::Partner,
    "farmers": count(pool, "SELECT COUNT(*) FROM users WHERE partner_id = $1", id).await?,
    "activeFarmers": count(pool, "SELECT COUNT(*) FROM users WHERE partner_id = $1 AND status = 'active'", id).await?,
    "farmerSalesCents": count(
      pool,
      "SELECT COALESCE(SUM(t.amount_cents), 0)::BIGINT FROM transactions t JOIN users u ON u.id = t.user_id \
       WHERE u.partner_id = $1 AND t.kind = 'sale'",
      id,
    )
    .await?,
    "commissionCents": count(pool, "SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions WHERE user_id = $1 AND kind = 'commission'", id).await?,
  }))
}

async fn admin_summary(pool: &PgPool) -> Result<JsonValue, AppError> {
  Ok(json!({
    "role": UserRole::Admin,
    "users": count(pool, "SELECT COUNT(*) FROM users WHERE $1::uuid IS NULL", None).await?,
    "pendingUsers": count(pool, "SELECT COUNT(*) FROM users WHERE status = 'pending' AND $1::uuid IS NULL", None).await?,
    "pendingListings": count(pool, "SELECT COUNT(*) FROM listings WHERE status = 'pending_approval' AND $1::uuid IS NULL", None).await?,
    "orders": count(pool, "SELECT COUNT(*) FROM orders WHERE $1::uuid IS NULL", None).await?,
    "deliveredVolumeCents": count(
      pool,
      "SELECT COALESCE(SUM(total_cents), 0)::BIGINT FROM orders WHERE status = 'delivered' AND $1::uuid IS NULL",
      None,
    )
    .await?,
  }))
}

#[instrument(name = "handler::report_summary", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn report_summary_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let pool = &app_state.db_pool;
  let summary = match auth_user.role {
    UserRole::Farmer => farmer_summary(pool, auth_user.user_id).await?,
    UserRole::Buyer => buyer_summary(pool, auth_user.user_id).await?,
    UserRole::Partner => partner_summary(pool, auth_user.user_id).await?,
    UserRole::Admin => admin_summary(pool).await?,
  };
  Ok(HttpResponse::Ok().json(summary))
}
