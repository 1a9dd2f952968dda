// core/benches/furrow_benchmarks.rs
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use furrow::{ContextData, Furrow, FurrowError, Pipeline, PipelineControl, SkipCondition};
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Clone, Debug, Default)]
struct LedgerCtx {
  entries: u64,
  done: bool,
}

fn counting_pipeline(steps: usize, skip_every_other: bool) -> Pipeline<LedgerCtx, FurrowError> {
  let names: Vec<String> = (0..steps).map(|i| format!("step_{}", i)).collect();
  let defs: Vec<(&str, bool, Option<SkipCondition<LedgerCtx>>)> = names
    .iter()
    .enumerate()
    .map(|(i, name)| {
      let skip: Option<SkipCondition<LedgerCtx>> = if skip_every_other && i % 2 == 1 {
        Some(Arc::new(|ctx: ContextData<LedgerCtx>| ctx.read().done))
      } else {
        None
      };
      (name.as_str(), false, skip)
    })
    .collect();

  let mut pipeline = Pipeline::<LedgerCtx, FurrowError>::new(&defs);
  for name in &names {
    pipeline.on_root(name, |ctx: ContextData<LedgerCtx>| async move {
      ctx.write().entries += 1;
      Ok::<_, FurrowError>(PipelineControl::Continue)
    });
  }
  pipeline
}

fn bench_pipeline_run(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let mut group = c.benchmark_group("pipeline_run");

  for steps in [1usize, 5, 20] {
    let pipeline = Arc::new(counting_pipeline(steps, false));
    group.throughput(Throughput::Elements(steps as u64));
    group.bench_with_input(BenchmarkId::from_parameter(steps), &steps, |b, _| {
      b.to_async(&rt).iter_batched(
        || ContextData::new(LedgerCtx::default()),
        |ctx| {
          let p = pipeline.clone();
          async move { p.run(ctx).await.unwrap() }
        },
        criterion::BatchSize::SmallInput,
      );
    });
  }
  group.finish();
}

fn bench_skip_conditions(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let pipeline = Arc::new(counting_pipeline(20, true));
  c.bench_function("pipeline_run_skipping_half", |b| {
    b.to_async(&rt).iter_batched(
      || ContextData::new(LedgerCtx { entries: 0, done: true }),
      |ctx| {
        let p = pipeline.clone();
        async move { p.run(ctx).await.unwrap() }
      },
      criterion::BatchSize::SmallInput,
    );
  });
}

fn bench_registry_dispatch(c: &mut Criterion) {
  let rt = Runtime::new().expect("tokio runtime");
  let registry = Arc::new(Furrow::<FurrowError>::new());
  registry.register_pipeline(counting_pipeline(5, false));
  c.bench_function("registry_dispatch_5_steps", |b| {
    b.to_async(&rt).iter_batched(
      || ContextData::new(LedgerCtx::default()),
      |ctx| {
        let r = registry.clone();
        async move { r.run(ctx).await.unwrap() }
      },
      criterion::BatchSize::SmallInput,
    );
  });
}

criterion_group!(benches, bench_pipeline_run, bench_skip_conditions, bench_registry_dispatch);
criterion_main!(benches);
