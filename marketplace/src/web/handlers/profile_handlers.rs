// marketplace/src/web/handlers/profile_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::AppError;
use crate::models::user::USER_COLUMNS;
use crate::models::User;
use crate::pipelines::common_steps;
use crate::pipelines::contexts::validate_phone;
use crate::services::auth_service;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfilePayload {
  #[validate(length(min = 1, max = 120, message = "cannot be empty"))]
  pub full_name: Option<String>,
  #[validate(custom(function = validate_phone))]
  pub phone: Option<String>,
  #[validate(length(max = 200))]
  pub location: Option<String>,
}

#[derive(Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordPayload {
  #[validate(length(min = 1, message = "is required"))]
  pub current_password: String,
  #[validate(length(min = 8, message = "must be at least 8 characters"))]
  pub new_password: String,
}

#[instrument(name = "handler::get_profile", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn get_profile_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let user = common_steps::fetch_user(&app_state.db_pool, auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(user))
}

/// Absent fields are left unchanged.
#[instrument(name = "handler::update_profile", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn update_profile_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<UpdateProfilePayload>,
) -> Result<HttpResponse, AppError> {
  req_payload.validate()?;
  common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  let payload = req_payload.into_inner();
  let query = format!(
    "UPDATE users SET full_name = COALESCE($1, full_name), phone = COALESCE($2, phone), \
     location = COALESCE($3, location), updated_at = now() WHERE id = $4 RETURNING {}",
    USER_COLUMNS
  );
  let user = sqlx::query_as::<_, User>(&query)
    .bind(payload.full_name.as_deref().map(str::trim))
    .bind(&payload.phone)
    .bind(&payload.location)
    .bind(auth_user.user_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound("Account not found.".to_string()))?;
  info!("Profile updated.");
  Ok(HttpResponse::Ok().json(user))
}

#[instrument(name = "handler::change_password", skip(app_state, req_payload), fields(user_id = %auth_user.user_id))]
pub async fn change_password_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  req_payload: web::Json<ChangePasswordPayload>,
) -> Result<HttpResponse, AppError> {
  req_payload.validate()?;
  let user = common_steps::fetch_signed_in_user(&app_state.db_pool, auth_user.user_id).await?;
  if !auth_service::verify_password(&user.password_hash, &req_payload.current_password)? {
    return Err(AppError::Auth("Current password is incorrect.".to_string()));
  }
  let new_hash = auth_service::hash_password(&req_payload.new_password)?;
  sqlx::query("UPDATE users SET password_hash = $1, updated_at = now() WHERE id = $2")
    .bind(new_hash)
    .bind(user.id)
    .execute(&app_state.db_pool)
    .await?;
  info!("Password changed.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Password updated." })))
}
