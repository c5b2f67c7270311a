use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use lumen_core::jobs::{JobContext, JobSystem};
use lumen_core::pool::FramePool;

// ---------------------------------------------------------------------------
// Job system
// ---------------------------------------------------------------------------

fn bench_execute_small_jobs(c: &mut Criterion) {
    let jobs = JobSystem::new(4);
    c.bench_function("jobs_execute_64", |b| {
        b.iter(|| {
            let sum = AtomicU64::new(0);
            jobs.scope(|scope| {
                let ctx = JobContext::new();
                for i in 0..64u64 {
                    let sum = &sum;
                    scope.execute(&ctx, move |_| {
                        sum.fetch_add(black_box(i), Ordering::Relaxed);
                    });
                }
                scope.wait(&ctx);
            });
            black_box(sum.load(Ordering::Relaxed))
        });
    });
}

fn bench_dispatch_culling_sized(c: &mut Criterion) {
    let jobs = JobSystem::new(4);
    let bounds: Vec<f32> = (0..10_000).map(|i| i as f32 * 0.5).collect();
    c.bench_function("jobs_dispatch_10k_group_64", |b| {
        b.iter(|| {
            let visible = AtomicU64::new(0);
            jobs.scope(|scope| {
                let ctx = JobContext::new();
                scope.dispatch(&ctx, bounds.len() as u32, 64, |args| {
                    if bounds[args.job_index as usize] < 2_500.0 {
                        visible.fetch_add(1, Ordering::Relaxed);
                    }
                });
                scope.wait(&ctx);
            });
            black_box(visible.load(Ordering::Relaxed))
        });
    });
}

// ---------------------------------------------------------------------------
// Frame pool
// ---------------------------------------------------------------------------

fn bench_pool_steady_state(c: &mut Criterion) {
    let mut pool = FramePool::<Vec<u32>>::new();
    c.bench_function("frame_pool_acquire_recycle", |b| {
        b.iter(|| {
            let mut list = pool.acquire();
            list.extend(0..black_box(256));
            pool.recycle(list);
        });
    });
}

criterion_group!(
    benches,
    bench_execute_small_jobs,
    bench_dispatch_culling_sized,
    bench_pool_steady_state,
);
criterion_main!(benches);
