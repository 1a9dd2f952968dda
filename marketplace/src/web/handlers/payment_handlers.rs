// marketplace/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::payment_method::{last4, next_default, PAYMENT_METHOD_COLUMNS};
use crate::models::{PaymentMethod, PaymentMethodKind};
use crate::pipelines::common_steps;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentMethodPayload {
  pub kind: PaymentMethodKind,
  #[validate(length(min = 1, max = 80, message = "is required"))]
  pub label: String,
  #[validate(length(min = 4, max = 34, message = "must contain at least four digits"))]
  pub account_number: String,
  #[validate(length(max = 80))]
  pub provider: Option<String>,
}

#[instrument(name = "handler::list_payment_methods", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_payment_methods_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let query = format!(
    "SELECT {} FROM payment_methods WHERE user_id = $1 ORDER BY is_default DESC, created_at",
    PAYMENT_METHOD_COLUMNS
  );
  let methods = sqlx::query_as::<_, PaymentMethod>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(methods))
}

#[instrument(name = "handler::create_payment_method", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn create_payment_method_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<CreatePaymentMethodPayload>,
) -> Result<HttpResponse, AppError> {
  req_payload.validate()?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let payload = req_payload.into_inner();
  let digits = last4(&payload.account_number)
    .ok_or_else(|| AppError::Validation("accountNumber: must contain at least four digits".to_string()))?;

  // The first method a user stores becomes the default.
  let query = format!(
    "INSERT INTO payment_methods (id, user_id, kind, label, account_last4, provider, is_default) \
     VALUES ($1, $2, $3, $4, $5, $6, NOT EXISTS(SELECT 1 FROM payment_methods WHERE user_id = $2)) \
     RETURNING {}",
    PAYMENT_METHOD_COLUMNS
  );
  let method = sqlx::query_as::<_, PaymentMethod>(&query)
    .bind(Uuid::new_v4())
    .bind(auth_user.user_id)
    .bind(payload.kind)
    .bind(payload.label.trim())
    .bind(digits)
    .bind(payload.provider)
    .fetch_one(&app_state.db_pool)
    .await?;
  info!(payment_method_id = %method.id, is_default = method.is_default, "Payment method stored.");
  Ok(HttpResponse::Created().json(method))
}

#[instrument(name = "handler::delete_payment_method", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn delete_payment_method_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let method_id = path.into_inner();
  let mut tx = app_state.db_pool.begin().await?;
  let was_default = sqlx::query_scalar::<_, bool>(
    "DELETE FROM payment_methods WHERE id = $1 AND user_id = $2 RETURNING is_default",
  )
  .bind(method_id)
  .bind(auth_user.user_id)
  .fetch_optional(&mut *tx)
  .await?
  .ok_or_else(|| AppError::NotFound(format!("Payment method {} not found.", method_id)))?;

  if was_default {
    let query = format!(
      "SELECT {} FROM payment_methods WHERE user_id = $1 FOR UPDATE",
      PAYMENT_METHOD_COLUMNS
    );
    let remaining = sqlx::query_as::<_, PaymentMethod>(&query)
      .bind(auth_user.user_id)
      .fetch_all(&mut *tx)
      .await?;
    if let Some(promoted) = next_default(&remaining) {
      sqlx::query("UPDATE payment_methods SET is_default = TRUE, updated_at = now() WHERE id = $1")
        .bind(promoted)
        .execute(&mut *tx)
        .await?;
      info!(payment_method_id = %promoted, "Default payment method promoted.");
    }
  }
  tx.commit().await?;
  Ok(HttpResponse::NoContent().finish())
}

#[instrument(name = "handler::set_default_payment_method", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn set_default_payment_method_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let method_id = path.into_inner();
  let mut tx = app_state.db_pool.begin().await?;

  let exists = sqlx::query_scalar::<_, bool>(
    "SELECT EXISTS(SELECT 1 FROM payment_methods WHERE id = $1 AND user_id = $2)",
  )
  .bind(method_id)
  .bind(auth_user.user_id)
  .fetch_one(&mut *tx)
  .await?;
  if !exists {
    return Err(AppError::NotFound(format!("Payment method {} not found.", method_id)));
  }

  sqlx::query("UPDATE payment_methods SET is_default = FALSE, updated_at = now() WHERE user_id = $1 AND is_default")
    .bind(auth_user.user_id)
    .execute(&mut *tx)
    .await?;
  let query = format!(
    "UPDATE payment_methods SET is_default = TRUE, updated_at = now() WHERE id = $1 RETURNING {}",
    PAYMENT_METHOD_COLUMNS
  );
  let method = sqlx::query_as::<_, PaymentMethod>(&query)
    .bind(method_id)
    .fetch_one(&mut *tx)
    .await?;
  tx.commit().await?;
  Ok(HttpResponse::Ok().json(method))
}
