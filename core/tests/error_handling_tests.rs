// core/tests/error_handling_tests.rs
mod common;

use common::*;
use furrow::{ContextData, FurrowError, Pipeline, PipelineControl};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn pipeline_can_use_furrow_error_directly() {
  setup_tracing();
  let mut p = Pipeline::<TallyContext, FurrowError>::new(&[("task", false, None)]);
  p.on_root("task", |_ctx: ContextData<TallyContext>| async move {
    Err::<PipelineControl, _>(FurrowError::Internal("deliberate".to_string()))
  });

  match p.run(ContextData::new(TallyContext::default())).await {
    Err(FurrowError::Internal(msg)) => assert_eq!(msg, "deliberate"),
    other => panic!("expected Internal, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn anyhow_errors_become_handler_errors() {
  setup_tracing();
  let mut p = Pipeline::<TallyContext, FurrowError>::new(&[("io", false, None)]);
  p.on_root("io", |_ctx: ContextData<TallyContext>| async move {
    Err::<PipelineControl, _>(anyhow::anyhow!("socket closed"))
  });

  match p.run(ContextData::new(TallyContext::default())).await {
    Err(FurrowError::HandlerError { source }) => assert_eq!(source.to_string(), "socket closed"),
    other => panic!("expected HandlerError, got {:?}", other),
  }
}

#[test]
fn wrapped_furrow_error_is_not_nested() {
  let wrapped = anyhow::Error::new(FurrowError::StepNotFound {
    step_name: "x".to_string(),
  });
  match FurrowError::from(wrapped) {
    FurrowError::StepNotFound { step_name } => assert_eq!(step_name, "x"),
    other => panic!("expected StepNotFound, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn context_survives_across_awaits() {
  setup_tracing();
  let mut p = Pipeline::<TallyContext, FurrowError>::new(&[("slow", false, None), ("check", false, None)]);
  p.on_root("slow", |ctx: ContextData<TallyContext>| async move {
    let start = ctx.with(|c| c.count);
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    ctx.write().count = start + 10;
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });
  p.on_root("check", |ctx: ContextData<TallyContext>| async move {
    assert_eq!(ctx.read().count, 10);
    ctx.write().trail.push("checked".to_string());
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });

  let ctx = ContextData::new(TallyContext::default());
  let clone = ctx.clone();
  p.run(ctx).await.unwrap();
  assert_eq!(clone.read().trail, vec!["checked"]);
}
