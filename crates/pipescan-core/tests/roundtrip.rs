//! Structural serialization round-trips of live forests.

use pipescan_core::io::{from_cbor, to_cbor};
use pipescan_core::prelude::*;

fn complete(job: &AvailableJob<u64, u64>) -> u64 {
    match job {
        AvailableJob::Base(d) => *d,
        AvailableJob::Merge { left, right } => left + right,
    }
}

/// Drive a saturated pipeline for `rounds` rounds.
fn drive(max: u32, delay: u32, rounds: u64) -> ScanState<u64, u64> {
    let mut state: ScanState<u64, u64> = ScanState::empty(max, delay);
    for round in 0..rounds {
        let data: Vec<u64> = (0..u64::from(max)).map(|i| round * 10 + i).collect();
        let jobs: Vec<u64> = state
            .jobs_for_next_update(data.len())
            .iter()
            .map(complete)
            .collect();
        let (_, next) = state.update(&data, &jobs).unwrap();
        state = next;
    }
    state
}

#[test]
fn json_roundtrip_mid_pipeline() {
    for (max, delay) in [(2u32, 0u32), (8, 2)] {
        let state = drive(max, delay, 20);
        let json = serde_json::to_string(&state).unwrap();
        let back: ScanState<u64, u64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state, "max {max} delay {delay}");
    }
}

#[test]
fn cbor_roundtrip_mid_pipeline() {
    let state = drive(8, 1, 25);
    let bytes = to_cbor(&state).unwrap();
    let back: ScanState<u64, u64> = from_cbor(&bytes).unwrap();
    assert_eq!(back, state);
}

#[test]
fn bincode_wire_roundtrip() {
    let state = drive(4, 1, 15);
    let bytes = bincode::serialize(&state).unwrap();
    let back: ScanState<u64, u64> = bincode::deserialize(&bytes).unwrap();
    assert_eq!(back, state);
}

#[test]
fn restored_state_keeps_advancing() {
    let state = drive(4, 0, 12);
    let bytes = to_cbor(&state).unwrap();
    let restored: ScanState<u64, u64> = from_cbor(&bytes).unwrap();

    let data = [1u64, 2, 3, 4];
    let jobs: Vec<u64> = state
        .jobs_for_next_update(data.len())
        .iter()
        .map(complete)
        .collect();
    let (a, next_a) = state.update(&data, &jobs).unwrap();
    let (b, next_b) = restored.update(&data, &jobs).unwrap();
    assert_eq!(a, b);
    assert_eq!(next_a, next_b);
}
