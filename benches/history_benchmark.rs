use criterion::{criterion_group, criterion_main, Criterion};
use run_tracker::models::{LocationFix, RunHistory};
use run_tracker::services::distance::cumulative_distance_km;
use std::hint::black_box;

/// A winding track of `n` fixes, 5 s apart.
fn track(n: usize) -> Vec<LocationFix> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            LocationFix::new(
                37.4 + 0.0004 * t + 0.0001 * (t / 3.0).sin(),
                -122.2 + 0.0003 * t,
                1_705_312_800_000 + 5000 * i as i64,
            )
        })
        .collect()
}

fn benchmark_history(c: &mut Criterion) {
    let fixes = track(500);

    let mut group = c.benchmark_group("run_history");

    // Every fix pushes into the window and recomputes the live distance
    group.bench_function("push_and_recompute_500_fixes", |b| {
        b.iter(|| {
            let mut history = RunHistory::new();
            let mut total = 0.0;
            for fix in black_box(&fixes) {
                history.push(*fix);
                total = cumulative_distance_km(history.iter());
            }
            total
        })
    });

    let mut full = RunHistory::new();
    for fix in &fixes {
        full.push(*fix);
    }
    group.bench_function("cumulative_distance_full_window", |b| {
        b.iter(|| cumulative_distance_km(black_box(&full).iter()))
    });

    group.finish();
}

criterion_group!(benches, benchmark_history);
criterion_main!(benches);
