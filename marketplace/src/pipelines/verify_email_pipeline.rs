// marketplace/src/pipelines/verify_email_pipeline.rs

use crate::errors::AppError;
use crate::models::user::USER_COLUMNS;
use crate::models::{AccountStatus, User};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::VerifyEmailCtxData;
use crate::services::templates;
use crate::services::token_store::{TokenError, TokenPurpose};
use crate::state::AppState;
use chrono::Utc;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) fn token_rejection(err: TokenError) -> AppError {
  match err {
    TokenError::Expired => AppError::Validation("This link has expired. Request a new one.".to_string()),
    TokenError::Unknown | TokenError::PurposeMismatch => {
      AppError::Validation("This link is invalid or has already been used.".to_string())
    }
  }
}

pub fn register_verify_email_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut verify_p = Pipeline::<VerifyEmailCtxData, AppError>::new(&[
    ("consume_verification_token", false, None),
    ("mark_email_verified", false, None),
    ("send_welcome_email", true, None),
  ]);

  verify_p.on_root("consume_verification_token", |ctx_data: ContextData<VerifyEmailCtxData>| {
    Box::pin(async move {
      let (token, app_state) = {
        let guard = ctx_data.read();
        (guard.token.clone(), guard.app_state.clone())
      };
      let user_id = app_state
        .token_store
        .consume(token.trim(), TokenPurpose::EmailVerification, Utc::now())
        .map_err(|e| {
          warn!(error = %e, "Email verification token rejected.");
          token_rejection(e)
        })?;

      let user = common_steps::fetch_user(&app_state.db_pool, user_id).await?;
      ctx_data.write().user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  verify_p.on_root("mark_email_verified", |ctx_data: ContextData<VerifyEmailCtxData>| {
    Box::pin(async move {
      let (user_id, db_pool) = {
        let guard = ctx_data.read();
        let user_id = guard.user.as_ref().map(|u| u.id);
        (user_id, guard.app_state.db_pool.clone())
      };
      let user_id = user_id.ok_or_else(|| AppError::Internal("User missing from verification context.".to_string()))?;

      let query = format!(
        "UPDATE users SET email_verified = TRUE, updated_at = now() WHERE id = $1 RETURNING {}",
        USER_COLUMNS
      );
      let user = sqlx::query_as::<_, User>(&query).bind(user_id).fetch_one(&db_pool).await?;
      info!(%user_id, "Email verified.");
      ctx_data.write().user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  verify_p.on_root("send_welcome_email", |ctx_data: ContextData<VerifyEmailCtxData>| {
    Box::pin(async move {
      let (app_state, user) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.user.clone())
      };
      if let Some(user) = user {
        let dashboard = format!("{}/dashboard", app_state.config.frontend_url.trim_end_matches('/'));
        common_steps::queue_email_step(
          &app_state,
          templates::welcome_email(
            &user.email,
            user.first_name(),
            user.status == AccountStatus::Pending,
            &dashboard,
          ),
        );
        ctx_data.write().welcome_queued = true;
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(verify_p);
  tracing::info!("Email verification pipeline registered.");
}
