use criterion::{
    black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use pipescan_core::prelude::*;

fn complete(job: &AvailableJob<u64, u64>) -> u64 {
    match job {
        AvailableJob::Base(d) => *d,
        AvailableJob::Merge { left, right } => left + right,
    }
}

/// Run a saturated pipeline until its forest reaches steady state.
fn warm_state(max: u32, delay: u32) -> ScanState<u64, u64> {
    let mut state: ScanState<u64, u64> = ScanState::empty(max, delay);
    for round in 0..4 * u64::from(delay + 1) * u64::from(state.depth() + 1) {
        let data: Vec<u64> = (0..u64::from(max)).map(|i| round + i).collect();
        let jobs: Vec<u64> = state
            .jobs_for_next_update(data.len())
            .iter()
            .map(complete)
            .collect();
        let (_, next) = state.update(&data, &jobs).expect("steady round");
        state = next;
    }
    state
}

fn bench_rounds(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_rounds");
    for &(max, delay) in &[(8u32, 1u32), (32, 2), (128, 2)] {
        let state = warm_state(max, delay);
        let data: Vec<u64> = (0..u64::from(max)).collect();
        group.throughput(Throughput::Elements(u64::from(max)));

        group.bench_function(
            BenchmarkId::new("steady_round", format!("max{max}_delay{delay}")),
            |b| {
                b.iter_batched(
                    || {
                        let jobs: Vec<u64> = state
                            .jobs_for_next_update(data.len())
                            .iter()
                            .map(complete)
                            .collect();
                        (state.clone(), jobs)
                    },
                    |(s, jobs)| black_box(s.update(black_box(&data), &jobs).expect("round")),
                    BatchSize::SmallInput,
                )
            },
        );

        group.bench_function(
            BenchmarkId::new("job_census", format!("max{max}_delay{delay}")),
            |b| b.iter(|| black_box(black_box(&state).next_jobs())),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_rounds);
criterion_main!(benches);
