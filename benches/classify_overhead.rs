//! Classification and gap-scan throughput
//!
//! ```bash
//! cargo bench --bench classify_overhead
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::{Duration, Instant};
use whyismybuildslow::classifier::{classify, CauseRules};
use whyismybuildslow::idle_gap::{detect_idle_gaps, DEFAULT_THRESHOLD};
use whyismybuildslow::timeline::{Event, EventKind};

fn build_log(len: usize) -> Vec<Event> {
    let base = Instant::now();
    (0..len)
        .map(|i| {
            // Every 50th line follows a 3s silence
            let offset = Duration::from_millis(i as u64 * 10 + (i as u64 / 50) * 3000);
            Event::new(
                base + offset,
                EventKind::Output,
                format!("   Compiling crate-{} v0.{}.0 (registry+https)", i, i % 7),
            )
        })
        .collect()
}

fn bench_classify(c: &mut Criterion) {
    c.bench_function("classify_docker_hit", |b| {
        b.iter(|| classify(black_box("Pulling fs layer 3f4d"), black_box(""), black_box(4.0)))
    });

    c.bench_function("classify_fallthrough", |b| {
        b.iter(|| {
            classify(
                black_box("   Compiling serde_derive v1.0.210"),
                black_box("    Finished dev [unoptimized] target(s)"),
                black_box(1.0),
            )
        })
    });
}

fn bench_detect(c: &mut Criterion) {
    let rules = CauseRules::builtin();
    let mut group = c.benchmark_group("detect_idle_gaps");

    for len in [100, 1_000, 10_000] {
        let events = build_log(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &events, |b, events| {
            b.iter(|| detect_idle_gaps(black_box(events), DEFAULT_THRESHOLD, &rules))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_detect);
criterion_main!(benches);
