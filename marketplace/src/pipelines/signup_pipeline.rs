// marketplace/src/pipelines/signup_pipeline.rs

use crate::errors::AppError;
use crate::models::user::USER_COLUMNS;
use crate::models::{User, UserRole};
use crate::pipelines::common_steps::{self, normalize_email};
use crate::pipelines::contexts::SignupCtxData;
use crate::services::auth_service;
use crate::services::templates;
use crate::services::token_store::TokenPurpose;
use crate::state::AppState;
use furrow::{ContextData, Furrow, Pipeline, PipelineControl};
use std::sync::Arc;
use tracing::{event, info, warn, Level};
use uuid::Uuid;

pub fn register_signup_pipeline(furrow: &Arc<Furrow<AppError>>, _app_state: &AppState) {
  let mut signup_p = Pipeline::<SignupCtxData, AppError>::new(&[
    ("validate_signup_input", false, None),
    ("check_existing_user_signup", false, None),
    ("create_user_in_db", false, None),
    ("send_verification_email_signup", true, None),
  ]);

  signup_p.on_root("validate_signup_input", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let input = ctx_data.read().input.clone();
      common_steps::validate_input(&input)?;
      if input.role == UserRole::Admin {
        warn!("Rejected self-signup with admin role.");
        return Err(AppError::Validation("role: admin accounts cannot be created through signup".to_string()));
      }
      ctx_data.write().input.email = normalize_email(&input.email);
      Ok(PipelineControl::Continue)
    })
  });

  signup_p.on_root("check_existing_user_signup", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (email, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.email.clone(), guard.app_state.db_pool.clone())
      };

      event!(Level::DEBUG, %email, "Checking if email is taken.");
      let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = $1)")
        .bind(&email)
        .fetch_one(&db_pool)
        .await?;
      if exists {
        warn!(%email, "Signup with an existing email.");
        return Err(AppError::Conflict("An account with this email already exists.".to_string()));
      }
      Ok(PipelineControl::Continue)
    })
  });

  signup_p.on_root("create_user_in_db", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (input, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.clone(), guard.app_state.db_pool.clone())
      };

      let password_hash = auth_service::hash_password(&input.password)?;
      let query = format!(
        "INSERT INTO users (id, email, password_hash, full_name, phone, location, role, status, email_verified) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE) RETURNING {}",
        USER_COLUMNS
      );
      let user = sqlx::query_as::<_, User>(&query)
        .bind(Uuid::new_v4())
        .bind(&input.email)
        .bind(password_hash)
        .bind(input.full_name.trim())
        .bind(&input.phone)
        .bind(&input.location)
        .bind(input.role)
        .bind(input.role.initial_status())
        .fetch_one(&db_pool)
        .await?;

      info!(user_id = %user.id, role = user.role.as_str(), status = ?user.status, "User created.");
      ctx_data.write().created_user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p.on_root("send_verification_email_signup", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (app_state, user) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.created_user.clone())
      };
      let Some(user) = user else {
        warn!("No user in signup context, skipping verification email.");
        return Ok::<_, AppError>(PipelineControl::Continue);
      };

      let token = app_state.token_store.issue(
        user.id,
        TokenPurpose::EmailVerification,
        app_state.config.verification_token_ttl,
      );
      let link = app_state.config.frontend_link("verify-email", &token);
      common_steps::queue_email_step(
        &app_state,
        templates::verification_email(&user.email, user.first_name(), &link),
      );
      ctx_data.write().verification_queued = true;
      Ok(PipelineControl::Continue)
    })
  });

  furrow.register_pipeline(signup_p);
  tracing::info!("Sign-up pipeline registered.");
}
