// core/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FurrowError {
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("No pipeline registered for context type {type_name}")]
  NotRegistered { type_name: String },

  #[error("Context type mismatch: expected {expected_type}")]
  TypeMismatch { expected_type: String },

  #[error("Handler failed: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal furrow error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FurrowError {
  fn from(err: AnyhowError) -> Self {
    // An anyhow error that already wraps a FurrowError is unwrapped instead of nested.
    match err.downcast::<FurrowError>() {
      Ok(furrow_err) => furrow_err,
      Err(other) => FurrowError::HandlerError { source: other },
    }
  }
}

pub type FurrowResult<T, E = FurrowError> = std::result::Result<T, E>;
