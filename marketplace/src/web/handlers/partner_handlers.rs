// marketplace/src/web/handlers/partner_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::user::USER_COLUMNS;
use crate::models::{AccountStatus, User, UserRole};
use crate::pipelines::common_steps::{self, normalize_email};
use crate::pipelines::contexts::validate_phone;
use crate::services::auth_service;
use crate::services::templates;
use crate::services::token_store::TokenPurpose;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OnboardFarmerPayload {
  #[validate(email(message = "must be a valid email address"))]
  pub email: String,
  #[validate(length(min = 1, max = 120, message = "is required"))]
  pub full_name: String,
  #[validate(custom(function = validate_phone))]
  pub phone: Option<String>,
  #[validate(length(max = 200))]
  pub location: Option<String>,
}

#[instrument(name = "handler::list_partner_farmers", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_partner_farmers_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Partner])?;
  let query = format!("SELECT {} FROM users WHERE partner_id = $1 ORDER BY created_at DESC", USER_COLUMNS);
  let farmers = sqlx::query_as::<_, User>(&query)
    .bind(auth_user.user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(farmers))
}

/// Creates a pending farmer account on behalf of the calling partner. The
/// farmer never learns the generated password; the emailed reset link sets
/// their own and verifies the address.
#[instrument(name = "handler::onboard_farmer", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn onboard_farmer_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<OnboardFarmerPayload>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Partner])?;
  req_payload.validate()?;
  let partner = common_steps::fetch_user(&app_state.db_pool, auth_user.user_id).await?;
  partner.ensure_active()?;

  let payload = req_payload.into_inner();
  let email = normalize_email(&payload.email);
  if common_steps::fetch_user_by_email(&app_state.db_pool, &email).await?.is_some() {
    warn!(%email, "Onboarding an already registered email.");
    return Err(AppError::Conflict("An account with this email already exists.".to_string()));
  }

  let password_hash = auth_service::hash_password(&auth_service::random_hex(24))?;
  let query = format!(
    "INSERT INTO users (id, email, password_hash, full_name, phone, location, role, status, email_verified, partner_id) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9) RETURNING {}",
    USER_COLUMNS
  );
  let farmer = sqlx::query_as::<_, User>(&query)
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(password_hash)
    .bind(payload.full_name.trim())
    .bind(payload.phone)
    .bind(payload.location)
    .bind(UserRole::Farmer)
    .bind(AccountStatus::Pending)
    .bind(partner.id)
    .fetch_one(&app_state.db_pool)
    .await?;

  let token = app_state
    .token_store
    .issue(farmer.id, TokenPurpose::PasswordReset, app_state.config.reset_token_ttl);
  let link = app_state.config.frontend_link("reset-password", &token);
  app_state.queue_email(templates::farmer_onboarded_email(
    &farmer.email,
    farmer.first_name(),
    &partner.full_name,
    &link,
  ));
  info!(farmer_id = %farmer.id, "Farmer onboarded by partner.");
  Ok(HttpResponse::Created().json(farmer))
}
