use std::hint::black_box;
use std::time::Duration;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use pm_ratelimit::RateLimiter;
use pm_ratelimit::TokenBucket;
use pm_types::RateLimitConfig;

fn bench_try_acquire(c: &mut Criterion) {
    // Large budget and fast refill so the hot path stays on the grant branch
    let bucket = TokenBucket::new(1_000_000, 10_000_000.0);

    c.bench_function("bucket try_acquire hit", |b| b.iter(|| bucket.try_acquire(black_box(1))));

    let empty = TokenBucket::new(1, 0.001);
    empty.try_acquire(1);

    c.bench_function("bucket try_acquire miss", |b| b.iter(|| empty.try_acquire(black_box(1))));
}

fn bench_limiter_lookup(c: &mut Criterion) {
    let config = RateLimitConfig { requests_per_minute: 6_000_000, burst_capacity: 1_000_000, ..Default::default() };
    let limiter = RateLimiter::new(config).unwrap();
    limiter.try_acquire("project:42", 1);

    c.bench_function("limiter try_acquire existing context", |b| {
        b.iter(|| limiter.try_acquire(black_box("project:42"), black_box(1)))
    });

    c.bench_function("limiter status", |b| b.iter(|| limiter.status(black_box("project:42"))));
}

fn bench_estimated_wait(c: &mut Criterion) {
    let bucket = TokenBucket::new(10, 1.0);
    while bucket.try_acquire(1) {}

    c.bench_function("bucket estimated_wait", |b| {
        b.iter(|| {
            let wait: Duration = bucket.estimated_wait(black_box(1));
            wait
        })
    });
}

criterion_group!(benches, bench_try_acquire, bench_limiter_lookup, bench_estimated_wait);
criterion_main!(benches);
