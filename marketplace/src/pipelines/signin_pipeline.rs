// marketplace/src/pipelines/signin_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::common_steps::{self, normalize_email};
use crate::pipelines::contexts::SigninCtxData;
use crate::services::auth_service;
use crate::state::AppState;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{event, warn, Level};

const BAD_CREDENTIALS: &str = "Invalid email or password.";

pub fn register_signin_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut signin_p = Pipeline::<SigninCtxData, AppError>::new(&[
    ("validate_signin_input", false, None),
    ("fetch_user_by_email_signin", false, None),
    ("verify_user_password_signin", false, None),
    ("check_account_signin", false, None),
    ("issue_session_token_signin", false, None),
  ]);

  signin_p.on_root("validate_signin_input", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let input = ctx_data.read().input.clone();
      common_steps::validate_input(&input)?;
      ctx_data.write().input.email = normalize_email(&input.email);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p.on_root("fetch_user_by_email_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (email, password, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.email.clone(), guard.input.password.clone(), guard.app_state.db_pool.clone())
      };

      match common_steps::fetch_user_by_email(&db_pool, &email).await? {
        Some(user) => {
          event!(Level::DEBUG, user_id = %user.id, "User found for signin.");
          ctx_data.write().user = Some(user);
          Ok(PipelineControl::Continue)
        }
        None => {
          auth_service::verify_dummy_password(&password);
          warn!(%email, "Signin for unknown email.");
          Err(AppError::Auth(BAD_CREDENTIALS.to_string()))
        }
      }
    })
  });

  signin_p.on_root("verify_user_password_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (stored_hash, password, user_id) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("User missing from signin context.".to_string()))?;
        (user.password_hash.clone(), guard.input.password.clone(), user.id)
      };

      if auth_service::verify_password(&stored_hash, &password)? {
        Ok(PipelineControl::Continue)
      } else {
        warn!(%user_id, "Password mismatch on signin.");
        Err(AppError::Auth(BAD_CREDENTIALS.to_string()))
      }
    })
  });

  signin_p.on_root("check_account_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let user = guard
        .user
        .as_ref()
        .ok_or_else(|| AppError::Internal("User missing from signin context.".to_string()))?;
      user.ensure_can_sign_in()?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p.on_root("issue_session_token_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (user_id, role, config) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("User missing from signin context.".to_string()))?;
        (user.id, user.role, guard.app_state.config.clone())
      };

      let token = auth_service::issue_jwt(user_id, role, &config.jwt_secret, config.jwt_ttl)?;
      ctx_data.write().session_token = Some(token);
      event!(Level::INFO, %user_id, "Session token issued.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(signin_p);
  tracing::info!("Sign-in pipeline registered.");
}
