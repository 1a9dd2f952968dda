// marketplace/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use furrow::FurrowError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Token Error: {0}")]
  Jwt(#[from] jsonwebtoken::errors::Error),

  #[error("Delivery Error: {0}")]
  Delivery(String),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FurrowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(sqlx_err) => AppError::Sqlx(sqlx_err),
        Err(other) => AppError::Internal(other.to_string()),
      },
    }
  }
}

impl From<validator::ValidationErrors> for AppError {
  fn from(errors: validator::ValidationErrors) -> Self {
    let mut fields: Vec<String> = errors
      .field_errors()
      .into_iter()
      .map(|(field, errs)| {
        let reason = errs
          .iter()
          .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
          .unwrap_or_else(|| errs.first().map(|e| e.code.to_string()).unwrap_or_default());
        format!("{}: {}", field, reason)
      })
      .collect();
    fields.sort();
    AppError::Validation(fields.join("; "))
  }
}

impl AppError {
  /// Unwraps a workflow error whose handler failure was itself an `AppError`.
  fn effective(&self) -> &AppError {
    if let AppError::Workflow {
      source: FurrowError::HandlerError { source },
    } = self
    {
      if let Some(inner) = source.downcast_ref::<AppError>() {
        return inner.effective();
      }
    }
    self
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self.effective() {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) | AppError::Jwt(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) => StatusCode::CONFLICT,
      AppError::Delivery(_) => StatusCode::BAD_GATEWAY,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Workflow { .. } | AppError::Internal(_) => {
        StatusCode::INTERNAL_SERVER_ERROR
      }
    }
  }

  fn error_response(&self) -> HttpResponse {
    let err = self.effective();
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %err, "Responding with error");
    } else {
      tracing::debug!(application_error = %err, "Responding with client error");
    }
    let body = match err {
      AppError::Validation(m)
      | AppError::Auth(m)
      | AppError::Forbidden(m)
      | AppError::NotFound(m)
      | AppError::Conflict(m) => json!({ "error": m }),
      AppError::Jwt(_) => json!({ "error": "Invalid or expired session token." }),
      AppError::Delivery(m) => json!({ "error": "Message delivery failed", "detail": m }),
      AppError::Config(m) => json!({ "error": "Configuration issue", "detail": m }),
      AppError::Sqlx(_) => json!({ "error": "Database operation failed" }),
      AppError::Workflow { source } => json!({ "error": "Workflow processing error", "detail": source.to_string() }),
      AppError::Internal(m) => json!({ "error": "An internal error occurred", "detail": m }),
    };
    HttpResponse::build(status).json(body)
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::body::to_bytes;

  #[test]
  fn maps_variants_to_status_codes() {
    assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
    assert_eq!(AppError::Auth("x".into()).status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
    assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
    assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
    assert_eq!(
      AppError::Sqlx(sqlx::Error::RowNotFound).status_code(),
      StatusCode::INTERNAL_SERVER_ERROR
    );
  }

  #[test]
  fn workflow_error_wrapping_app_error_keeps_its_status() {
    let wrapped = AppError::Workflow {
      source: FurrowError::HandlerError {
        source: anyhow::Error::new(AppError::Conflict("taken".into())),
      },
    };
    assert_eq!(wrapped.status_code(), StatusCode::CONFLICT);
  }

  #[test]
  fn anyhow_round_trip_preserves_variant() {
    let err: AppError = anyhow::Error::new(AppError::NotFound("listing".into())).into();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "listing"));
  }

  #[actix_web::test]
  async fn database_errors_hide_driver_detail() {
    let resp = AppError::Sqlx(sqlx::Error::PoolTimedOut).error_response();
    let body = to_bytes(resp.into_body()).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("Database operation failed"));
    assert!(!text.contains("timed out"));
  }
}
