// marketplace/src/web/handlers/auth_handlers.rs

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::User;
use crate::pipelines::common_steps::{self, normalize_email};
use crate::pipelines::contexts::{
  PasswordResetConfirmCtxData, PasswordResetRequestCtxData, ResetPasswordInput, SigninCtxData, SigninInput,
  SignupCtxData, SignupInput, VerifyEmailCtxData,
};
use crate::services::templates;
use crate::services::token_store::TokenPurpose;
use crate::state::AppState;
use crate::web::extractors::{AuthenticatedUser, SESSION_COOKIE};
use furrow::{ContextData, PipelineResult};

#[derive(Deserialize, Debug)]
pub struct TokenPayload {
  pub token: String,
}

#[derive(Deserialize, Debug)]
pub struct EmailPayload {
  pub email: String,
}

const RESET_ACK: &str = "If an account exists for that email, a password reset link has been sent.";
const RESEND_ACK: &str = "If an unverified account exists for that email, a new verification link has been sent.";

fn session_cookie(token: &str, max_age_secs: i64) -> Cookie<'static> {
  Cookie::build(SESSION_COOKIE, token.to_string())
    .path("/")
    .http_only(true)
    .same_site(SameSite::Lax)
    .max_age(CookieDuration::seconds(max_age_secs))
    .finish()
}

#[instrument(name = "handler::signup", skip(app_state, req_payload), fields(req_email = %req_payload.email, role = ?req_payload.role))]
pub async fn signup_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SignupInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(SignupCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    created_user: None,
    verification_queued: false,
  });

  match app_state.furrow.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let guard = ctx.read();
      let user = guard.created_user.as_ref().ok_or_else(|| {
        warn!("Signup pipeline completed without a user.");
        AppError::Internal("Signup completed without creating a user.".to_string())
      })?;
      info!(user_id = %user.id, "Signup successful.");
      Ok(HttpResponse::Created().json(json!({
        "message": "Account created. Check your email to verify your address.",
        "user": user,
        "verificationEmailQueued": guard.verification_queued,
      })))
    }
    Ok(PipelineResult::Stopped) => Err(AppError::Internal("Signup was halted by an internal step.".to_string())),
    Err(app_err) => {
      warn!(error = %app_err, "Signup failed.");
      Err(app_err)
    }
  }
}

#[instrument(name = "handler::signin", skip(app_state, req_payload), fields(req_email = %req_payload.email))]
pub async fn signin_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SigninInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(SigninCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    user: None,
    session_token: None,
  });

  match app_state.furrow.run(ctx.clone()).await {
    Ok(PipelineResult::Completed) => {
      let guard = ctx.read();
      let (user, token) = match (&guard.user, &guard.session_token) {
        (Some(u), Some(t)) => (u, t),
        _ => return Err(AppError::Internal("Signin completed without a session.".to_string())),
      };
      info!(user_id = %user.id, "Signin successful.");
      let max_age = app_state.config.jwt_ttl.as_secs() as i64;
      Ok(
        HttpResponse::Ok()
          .cookie(session_cookie(token, max_age))
          .json(json!({
            "token": token,
            "expiresIn": max_age,
            "user": user,
          })),
      )
    }
    Ok(PipelineResult::Stopped) => Err(AppError::Auth("Authentication was halted.".to_string())),
    Err(app_err) => {
      warn!(error = %app_err, "Signin failed.");
      Err(app_err)
    }
  }
}

#[instrument(name = "handler::signout")]
pub async fn signout_handler() -> HttpResponse {
  let mut cookie = session_cookie("", 0);
  cookie.make_removal();
  HttpResponse::Ok().cookie(cookie).json(json!({ "message": "Signed out." }))
}

#[instrument(name = "handler::verify_email", skip_all)]
pub async fn verify_email_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<TokenPayload>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(VerifyEmailCtxData {
    app_state: app_state.get_ref().clone(),
    token: req_payload.into_inner().token,
    user: None,
    welcome_queued: false,
  });
  app_state.furrow.run(ctx.clone()).await?;
  let guard = ctx.read();
  Ok(HttpResponse::Ok().json(json!({
    "message": "Email verified.",
    "user": guard.user,
  })))
}

/// Same response whether or not the account exists or is already verified.
#[instrument(name = "handler::resend_verification", skip_all)]
pub async fn resend_verification_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<EmailPayload>,
) -> Result<HttpResponse, AppError> {
  let email = normalize_email(&req_payload.email);
  if let Some(user) = common_steps::fetch_user_by_email(&app_state.db_pool, &email).await? {
    if !user.email_verified {
      app_state
        .token_store
        .revoke_for_user(user.id, TokenPurpose::EmailVerification);
      let token = app_state.token_store.issue(
        user.id,
        TokenPurpose::EmailVerification,
        app_state.config.verification_token_ttl,
      );
      let link = app_state.config.frontend_link("verify-email", &token);
      app_state.queue_email(templates::verification_email(&user.email, user.first_name(), &link));
      info!(user_id = %user.id, "Verification email re-sent.");
    }
  }
  Ok(HttpResponse::Ok().json(json!({ "message": RESEND_ACK })))
}

#[instrument(name = "handler::forgot_password", skip_all)]
pub async fn forgot_password_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<EmailPayload>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(PasswordResetRequestCtxData {
    app_state: app_state.get_ref().clone(),
    email: req_payload.into_inner().email,
    user: None,
    reset_link: None,
    reset_queued: false,
  });
  // Completed and Stopped (unknown email) look the same to the caller.
  app_state.furrow.run(ctx).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": RESET_ACK })))
}

#[instrument(name = "handler::reset_password", skip_all)]
pub async fn reset_password_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ResetPasswordInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(PasswordResetConfirmCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    user_id: None,
  });
  app_state.furrow.run(ctx).await?;
  Ok(HttpResponse::Ok().json(json!({ "message": "Password updated. You can now sign in." })))
}

#[instrument(name = "handler::me", skip(app_state), fields(user_id = %auth_user.user_id))]
pub async fn me_handler(app_state: web::Data<AppState>, auth_user: AuthenticatedUser) -> Result<HttpResponse, AppError> {
  let user: User = common_steps::fetch_user(&app_state.db_pool, auth_user.user_id)
    .await
    .map_err(|e| match e {
      AppError::NotFound(_) => AppError::Auth("Session refers to a deleted account.".to_string()),
      other => other,
    })?;
  Ok(HttpResponse::Ok().json(user))
}
