//! Replays the bundled churn fixture end to end with the consistency
//! checker running on every operation.

use segfit_harness::{ReplaySettings, parse_str, replay};

const CHURN: &str = include_str!("fixtures/churn.trace");

#[test]
fn churn_fixture_replays_cleanly() {
    let ops = parse_str(CHURN).unwrap();
    assert_eq!(ops.len(), 14);

    let settings = ReplaySettings {
        heap_limit: None,
        check_every: Some(1),
    };
    let report = replay(&ops, &settings).unwrap();

    assert_eq!(report.ops_replayed, 14);
    // Five `f` lines plus the release inside each of the three resizes.
    assert_eq!(report.releases, 8);
    assert_eq!(report.resizes, 3);
    // Everything was freed by the end; utilization is still meaningful
    // because it is computed against the peak.
    assert!(report.peak_live_bytes >= 512 + 128 + 2048);
    assert!(report.utilization_permille <= 1000);
}

#[test]
fn churn_fixture_respects_heap_limit() {
    let ops = parse_str(CHURN).unwrap();
    let settings = ReplaySettings {
        heap_limit: Some(4128), // sentinels + one chunk, no further growth
        check_every: None,
    };
    // The 4096-byte allocation cannot fit; replay must fail with OOM
    // rather than corrupt state.
    assert!(replay(&ops, &settings).is_err());
}
