// core/tests/common/mod.rs
#![allow(dead_code)]

use furrow::{ContextData, FurrowError, PipelineControl};
use once_cell::sync::Lazy;
use tracing::Level;

#[derive(Clone, Debug, Default)]
pub struct TallyContext {
  pub count: i32,
  pub trail: Vec<String>,
  pub stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  // FurrowError is neither Clone nor PartialEq; keep its Debug text.
  #[error("furrow: {0}")]
  Furrow(String),

  #[error("handler failed: {0}")]
  Handler(String),
}

impl From<FurrowError> for TestError {
  fn from(e: FurrowError) -> Self {
    TestError::Furrow(format!("{:?}", e))
  }
}

/// Appends `label` to the trail, bumps the count, and stops when `stop_at` names this label.
pub fn tally(label: &'static str) -> furrow::Handler<TallyContext, TestError> {
  Box::new(move |ctx: ContextData<TallyContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.count += 1;
      guard.trail.push(label.to_string());
      if guard.stop_at.as_deref() == Some(label) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn failing(label: &'static str, message: &'static str) -> furrow::Handler<TallyContext, TestError> {
  Box::new(move |ctx: ContextData<TallyContext>| {
    Box::pin(async move {
      ctx.write().trail.push(label.to_string());
      Err(TestError::Handler(message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
