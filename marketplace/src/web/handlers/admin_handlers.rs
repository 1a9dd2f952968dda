// marketplace/src/web/handlers/admin_handlers.rs

//! Account and listing moderation.

use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::listing::LISTING_COLUMNS;
use crate::models::user::USER_COLUMNS;
use crate::models::{AccountStatus, Listing, ListingStatus, User, UserRole};
use crate::pipelines::common_steps;
use crate::services::templates;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::list_approvals", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn list_approvals_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let user_query = format!("SELECT {} FROM users WHERE status = $1 ORDER BY created_at", USER_COLUMNS);
  let users = sqlx::query_as::<_, User>(&user_query)
    .bind(AccountStatus::Pending)
    .fetch_all(&app_state.db_pool)
    .await?;
  let listing_query = format!("SELECT {} FROM listings WHERE status = $1 ORDER BY created_at", LISTING_COLUMNS);
  let listings = sqlx::query_as::<_, Listing>(&listing_query)
    .bind(ListingStatus::PendingApproval)
    .fetch_all(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "users": users, "listings": listings })))
}

/// Moves a user from one of `from` to `to`. Admin accounts are never changed here.
async fn transition_user(
  app_state: &AppState,
  user_id: Uuid,
  from: &[AccountStatus],
  to: AccountStatus,
) -> Result<User, AppError> {
  let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
  let user = sqlx::query_as::<_, User>(&query)
    .bind(user_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found.", user_id)))?;

  if user.role == UserRole::Admin {
    return Err(AppError::Forbidden("Admin accounts cannot be moderated.".to_string()));
  }
  if !from.contains(&user.status) {
    return Err(AppError::Conflict(format!(
      "Account is {:?}; cannot move it to {:?}.",
      user.status, to
    )));
  }

  let update = format!(
    "UPDATE users SET status = $2, updated_at = now() WHERE id = $1 AND status = $3 RETURNING {}",
    USER_COLUMNS
  );
  sqlx::query_as::<_, User>(&update)
    .bind(user_id)
    .bind(to)
    .bind(user.status)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Account status changed concurrently; retry.".to_string()))
}

#[instrument(name = "handler::approve_user", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn approve_user_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let user = transition_user(&app_state, path.into_inner(), &[AccountStatus::Pending], AccountStatus::Active).await?;
  let login_url = format!("{}/signin", app_state.config.frontend_url.trim_end_matches('/'));
  app_state.queue_email(templates::account_approved_email(&user.email, user.first_name(), &login_url));
  info!(approved_user = %user.id, "Account approved.");
  Ok(HttpResponse::Ok().json(user))
}

#[instrument(name = "handler::suspend_user", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn suspend_user_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let user = transition_user(
    &app_state,
    path.into_inner(),
    &[AccountStatus::Pending, AccountStatus::Active],
    AccountStatus::Suspended,
  )
  .await?;
  info!(suspended_user = %user.id, "Account suspended.");
  Ok(HttpResponse::Ok().json(user))
}

#[instrument(name = "handler::reinstate_user", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn reinstate_user_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let user = transition_user(&app_state, path.into_inner(), &[AccountStatus::Suspended], AccountStatus::Active).await?;
  info!(reinstated_user = %user.id, "Account reinstated.");
  Ok(HttpResponse::Ok().json(user))
}

async fn moderate_listing(app_state: &AppState, listing_id: Uuid, to: ListingStatus) -> Result<Listing, AppError> {
  let mut tx = app_state.db_pool.begin().await?;
  let query = format!(
    "UPDATE listings SET status = $2, updated_at = now() WHERE id = $1 AND status = $3 RETURNING {}",
    LISTING_COLUMNS
  );
  let listing = sqlx::query_as::<_, Listing>(&query)
    .bind(listing_id)
    .bind(to)
    .bind(ListingStatus::PendingApproval)
    .fetch_optional(&mut *tx)
    .await?;
  let Some(listing) = listing else {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM listings WHERE id = $1)")
      .bind(listing_id)
      .fetch_one(&mut *tx)
      .await?;
    return Err(if exists {
      AppError::Conflict("Only listings awaiting approval can be moderated.".to_string())
    } else {
      AppError::NotFound(format!("Listing {} not found.", listing_id))
    });
  };

  if to == ListingStatus::Rejected {
    common_steps::settle_harvest_status(&mut tx, listing.harvest_id).await?;
  }
  tx.commit().await?;
  Ok(listing)
}

#[instrument(name = "handler::approve_listing", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn approve_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let listing = moderate_listing(&app_state, path.into_inner(), ListingStatus::Active).await?;
  info!(listing_id = %listing.id, "Listing approved.");
  Ok(HttpResponse::Ok().json(listing))
}

#[instrument(name = "handler::reject_listing", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn reject_listing_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[UserRole::Admin])?;
  let listing = moderate_listing(&app_state, path.into_inner(), ListingStatus::Rejected).await?;
  info!(listing_id = %listing.id, "Listing rejected.");
  Ok(HttpResponse::Ok().json(listing))
}
