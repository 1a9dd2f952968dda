// marketplace/src/pipelines/password_reset_pipeline.rs

//! Forgot-password request and confirmation.

use crate::errors::AppError;
use crate::pipelines::common_steps::{self, normalize_email};
use crate::pipelines::contexts::{PasswordResetConfirmCtxData, PasswordResetRequestCtxData};
use crate::pipelines::verify_email_pipeline::token_rejection;
use crate::services::auth_service;
use crate::services::templates;
use crate::services::token_store::TokenPurpose;
use crate::state::AppState;
use chrono::Utc;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub fn register_password_reset_request_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut request_p = Pipeline::<PasswordResetRequestCtxData, AppError>::new(&[
    ("validate_reset_email", false, None),
    ("lookup_reset_user", false, None),
    ("issue_reset_token", false, None),
    ("send_reset_email", true, None),
  ]);

  request_p.on_root("validate_reset_email", |ctx_data: ContextData<PasswordResetRequestCtxData>| {
    Box::pin(async move {
      let email = normalize_email(&ctx_data.read().email);
      if !validator::ValidateEmail::validate_email(&email) {
        return Err(AppError::Validation("email: must be a valid email address".to_string()));
      }
      ctx_data.write().email = email;
      Ok(PipelineControl::Continue)
    })
  });

  request_p.on_root("lookup_reset_user", |ctx_data: ContextData<PasswordResetRequestCtxData>| {
    Box::pin(async move {
      let (email, db_pool) = {
        let guard = ctx_data.read();
        (guard.email.clone(), guard.app_state.db_pool.clone())
      };
      match common_steps::fetch_user_by_email(&db_pool, &email).await? {
        Some(user) => {
          ctx_data.write().user = Some(user);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        None => {
          debug!("Password reset requested for unknown email.");
          Ok(PipelineControl::Stop)
        }
      }
    })
  });

  request_p.on_root("issue_reset_token", |ctx_data: ContextData<PasswordResetRequestCtxData>| {
    Box::pin(async move {
      let (app_state, user) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.user.clone())
      };
      let user = user.ok_or_else(|| AppError::Internal("User missing from reset context.".to_string()))?;

      let revoked = app_state.token_store.revoke_for_user(user.id, TokenPurpose::PasswordReset);
      let token = app_state
        .token_store
        .issue(user.id, TokenPurpose::PasswordReset, app_state.config.reset_token_ttl);
      let link = app_state.config.frontend_link("reset-password", &token);
      info!(user_id = %user.id, revoked, "Password reset token issued.");
      ctx_data.write().reset_link = Some(link);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  request_p.on_root("send_reset_email", |ctx_data: ContextData<PasswordResetRequestCtxData>| {
    Box::pin(async move {
      let (app_state, user, link) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.user.clone(), guard.reset_link.clone())
      };
      let (Some(user), Some(link)) = (user, link) else {
        warn!("Reset email step reached without a user or link.");
        return Ok::<_, AppError>(PipelineControl::Continue);
      };
      let control = common_steps::queue_email_step(
        &app_state,
        templates::password_reset_email(&user.email, user.first_name(), &link),
      );
      ctx_data.write().reset_queued = true;
      Ok(control)
    })
  });

  furrow.register_pipeline(request_p);
  tracing::info!("Password reset request pipeline registered.");
}

pub fn register_password_reset_confirm_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut confirm_p = Pipeline::<PasswordResetConfirmCtxData, AppError>::new(&[
    ("validate_new_password", false, None),
    ("consume_reset_token", false, None),
    ("store_new_password", false, None),
  ]);

  confirm_p.on_root("validate_new_password", |ctx_data: ContextData<PasswordResetConfirmCtxData>| {
    Box::pin(async move {
      let input = ctx_data.read().input.clone();
      common_steps::validate_input(&input)?;
      auth_service::check_password_policy(&input.new_password)?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  confirm_p.on_root("consume_reset_token", |ctx_data: ContextData<PasswordResetConfirmCtxData>| {
    Box::pin(async move {
      let (token, app_state) = {
        let guard = ctx_data.read();
        (guard.input.token.clone(), guard.app_state.clone())
      };
      let user_id = app_state
        .token_store
        .consume(token.trim(), TokenPurpose::PasswordReset, Utc::now())
        .map_err(|e| {
          warn!(error = %e, "Password reset token rejected.");
          token_rejection(e)
        })?;
      ctx_data.write().user_id = Some(user_id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  confirm_p.on_root("store_new_password", |ctx_data: ContextData<PasswordResetConfirmCtxData>| {
    Box::pin(async move {
      let (user_id, new_password, db_pool) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.input.new_password.clone(), guard.app_state.db_pool.clone())
      };
      let user_id = user_id.ok_or_else(|| AppError::Internal("User missing from reset context.".to_string()))?;

      let password_hash = auth_service::hash_password(&new_password)?;
      // A reset link proves control of the mailbox.
      let updated = sqlx::query(
        "UPDATE users SET password_hash = $1, email_verified = TRUE, updated_at = now() WHERE id = $2",
      )
      .bind(password_hash)
      .bind(user_id)
      .execute(&db_pool)
      .await?;
      if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("Account no longer exists.".to_string()));
      }
      info!(%user_id, "Password reset completed.");
      Ok(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(confirm_p);
  tracing::info!("Password reset confirm pipeline registered.");
}
