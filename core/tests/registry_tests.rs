// core/tests/registry_tests.rs
mod common;

use common::*;
use furrow::{ContextData, Furrow, FurrowError, Pipeline, PipelineControl, PipelineResult};

#[derive(Clone, Debug, Default)]
struct HarvestCtx {
  crop: String,
}

#[derive(Clone, Debug, Default)]
struct OrderCtx {
  quantity: i32,
}

#[tokio::test]
async fn dispatches_on_context_type() {
  setup_tracing();
  let registry = Furrow::<TestError>::new();

  let mut harvest = Pipeline::<HarvestCtx, TestError>::new(&[("log", false, None)]);
  harvest.on_root("log", |ctx: ContextData<HarvestCtx>| async move {
    ctx.write().crop = "maize".to_string();
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });
  registry.register_pipeline(harvest);

  let mut order = Pipeline::<OrderCtx, TestError>::new(&[("place", false, None)]);
  order.on_root("place", |ctx: ContextData<OrderCtx>| async move {
    ctx.write().quantity = 40;
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });
  registry.register_pipeline(order);

  assert!(registry.is_registered::<HarvestCtx>());
  assert!(registry.is_registered::<OrderCtx>());

  let h = ContextData::new(HarvestCtx::default());
  assert_eq!(registry.run(h.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(h.read().crop, "maize");

  let o = ContextData::new(OrderCtx::default());
  assert_eq!(registry.run(o.clone()).await.unwrap(), PipelineResult::Completed);
  assert_eq!(o.read().quantity, 40);
}

#[tokio::test]
async fn unregistered_context_is_an_error() {
  setup_tracing();
  let registry = Furrow::<TestError>::new();

  #[derive(Default)]
  struct Orphan;

  match registry.run(ContextData::new(Orphan)).await {
    Err(TestError::Furrow(s)) => {
      assert!(s.contains("NotRegistered"));
      assert!(s.contains("Orphan"));
    }
    other => panic!("expected NotRegistered, got {:?}", other),
  }
}

#[tokio::test]
async fn handler_error_reaches_caller_unchanged() {
  setup_tracing();
  let registry = Furrow::<TestError>::new();
  let mut p = Pipeline::<HarvestCtx, TestError>::new(&[("fail", false, None)]);
  p.on_root("fail", |_ctx: ContextData<HarvestCtx>| async move {
    Err::<PipelineControl, _>(TestError::Handler("no stock".to_string()))
  });
  registry.register_pipeline(p);

  let err = registry.run(ContextData::new(HarvestCtx::default())).await.unwrap_err();
  assert_eq!(err, TestError::Handler("no stock".to_string()));
}

#[tokio::test]
async fn later_registration_replaces_earlier() {
  setup_tracing();
  let registry = Furrow::<FurrowError>::default();

  let mut first = Pipeline::<OrderCtx, FurrowError>::new(&[("s", false, None)]);
  first.on_root("s", |ctx: ContextData<OrderCtx>| async move {
    ctx.write().quantity = 1;
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });
  registry.register_pipeline(first);

  let mut second = Pipeline::<OrderCtx, FurrowError>::new(&[("s", false, None)]);
  second.on_root("s", |ctx: ContextData<OrderCtx>| async move {
    ctx.write().quantity = 2;
    Ok::<_, FurrowError>(PipelineControl::Continue)
  });
  registry.register_pipeline(second);

  let ctx = ContextData::new(OrderCtx::default());
  registry.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().quantity, 2);
}
