// marketplace/src/web/extractors.rs

use crate::errors::AppError;
use crate::models::UserRole;
use crate::services::auth_service;
use crate::state::AppState;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "token";

/// Caller identity taken from a verified session token.
///
/// The token is read from `Authorization: Bearer ...` first, then from the
/// `token` cookie.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub role: UserRole,
}

impl AuthenticatedUser {
  pub fn require_role(&self, allowed: &[UserRole]) -> Result<(), AppError> {
    if allowed.contains(&self.role) {
      Ok(())
    } else {
      Err(AppError::Forbidden(format!(
        "This action is not available to {} accounts.",
        self.role.as_str()
      )))
    }
  }

  pub fn is_admin(&self) -> bool {
    self.role == UserRole::Admin
  }
}

fn bearer_token(req: &HttpRequest) -> Option<String> {
  let header = req.headers().get(actix_web::http::header::AUTHORIZATION)?.to_str().ok()?;
  let (scheme, token) = header.split_once(' ')?;
  if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
    Some(token.trim().to_string())
  } else {
    None
  }
}

fn session_token(req: &HttpRequest) -> Option<String> {
  bearer_token(req).or_else(|| req.cookie(SESSION_COOKIE).map(|c| c.value().to_string()))
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let Some(state) = req.app_data::<web::Data<AppState>>() else {
      return ready(Err(AppError::Internal("Application state is not configured.".to_string())));
    };
    let Some(token) = session_token(req) else {
      debug!("Request without session token.");
      return ready(Err(AppError::Auth("Authentication required.".to_string())));
    };
    ready(
      auth_service::verify_jwt(&token, &state.config.jwt_secret).map(|claims| AuthenticatedUser {
        user_id: claims.sub,
        role: claims.role,
      }),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::tests::test_state;
  use actix_web::cookie::Cookie;
  use actix_web::test::TestRequest;
  use std::time::Duration;

  fn token_for(state: &AppState, role: UserRole) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    let token = auth_service::issue_jwt(user_id, role, &state.config.jwt_secret, Duration::from_secs(60)).unwrap();
    (user_id, token)
  }

  #[actix_web::test]
  async fn accepts_bearer_header() {
    let state = test_state();
    let (user_id, token) = token_for(&state, UserRole::Farmer);
    let req = TestRequest::default()
      .app_data(web::Data::new(state))
      .insert_header(("Authorization", format!("Bearer {}", token)))
      .to_http_request();
    let user = AuthenticatedUser::extract(&req).await.unwrap();
    assert_eq!(user.user_id, user_id);
    assert_eq!(user.role, UserRole::Farmer);
  }

  #[actix_web::test]
  async fn accepts_cookie() {
    let state = test_state();
    let (user_id, token) = token_for(&state, UserRole::Buyer);
    let req = TestRequest::default()
      .app_data(web::Data::new(state))
      .cookie(Cookie::new(SESSION_COOKIE, token))
      .to_http_request();
    assert_eq!(AuthenticatedUser::extract(&req).await.unwrap().user_id, user_id);
  }

  #[actix_web::test]
  async fn rejects_missing_and_tampered_tokens() {
    let state = test_state();
    let (_, token) = token_for(&state, UserRole::Buyer);
    let data = web::Data::new(state);

    let bare = TestRequest::default().app_data(data.clone()).to_http_request();
    assert!(matches!(AuthenticatedUser::extract(&bare).await, Err(AppError::Auth(_))));

    let tampered = TestRequest::default()
      .app_data(data)
      .insert_header(("Authorization", format!("Bearer {}x", token)))
      .to_http_request();
    assert!(matches!(AuthenticatedUser::extract(&tampered).await, Err(AppError::Auth(_))));
  }

  #[test]
  fn role_guard() {
    let user = AuthenticatedUser {
      user_id: Uuid::new_v4(),
      role: UserRole::Buyer,
    };
    assert!(user.require_role(&[UserRole::Buyer, UserRole::Admin]).is_ok());
    assert!(matches!(user.require_role(&[UserRole::Farmer]), Err(AppError::Forbidden(_))));
  }
}
