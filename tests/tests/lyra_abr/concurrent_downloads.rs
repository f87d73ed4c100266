#![forbid(unsafe_code)]

use std::time::Duration;

use lyra_abr::{AbrOptions, DownloadTracker};
use rstest::rstest;

use crate::common::{EstimatorHarness, Xorshift64};

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

#[test]
fn partial_overlap_adds_to_the_rate() {
    let mut tracker = DownloadTracker::new();
    let a = tracker.start(secs(0.0));
    let b = tracker.start(secs(1.0));
    tracker.add_sample(a, secs(1.0), 100_000, u64::MAX).unwrap();
    tracker.add_sample(a, secs(2.0), 200_000, u64::MAX).unwrap();
    tracker.add_sample(b, secs(2.0), 50_000, u64::MAX).unwrap();
    tracker.add_sample(b, secs(3.0), 100_000, u64::MAX).unwrap();

    let (entry_a, entry_b) = (tracker.get(a).unwrap(), tracker.get(b).unwrap());
    let own = entry_a.span_rate();
    let other = entry_b.rate_over_span(entry_a.min_elapsed(), entry_a.max_elapsed());
    let combined = tracker.calculate_rate(a);

    assert!(other > 0.0);
    assert!(combined > own);
    assert!(combined > other);
}

#[rstest]
#[case(11)]
#[case(2024)]
fn overlapping_rates_never_fall_below_own_rate(#[case] seed: u64) {
    let mut rng = Xorshift64::new(seed);
    for _ in 0..50 {
        let mut tracker = DownloadTracker::new();
        let ids: Vec<_> = (0..rng.range_u64(2, 6))
            .map(|_| tracker.start(Duration::from_millis(rng.range_u64(0, 2_000))))
            .collect();
        for &id in &ids {
            let start = tracker.get(id).unwrap().min_elapsed();
            let mut bytes = 0;
            for step in 1..=rng.range_u64(1, 8) {
                bytes += rng.range_u64(1, 200_000);
                let at = start + Duration::from_millis(step * rng.range_u64(50, 400));
                tracker.add_sample(id, at, bytes, u64::MAX).unwrap();
            }
        }
        for &id in &ids {
            let own = tracker.get(id).unwrap().span_rate();
            assert!(tracker.calculate_rate(id) >= own);
        }
    }
}

#[test]
fn estimator_combines_parallel_segment_fetches() {
    let harness = EstimatorHarness::started_sync(AbrOptions::default(), 500_000);
    let estimator = &harness.estimator;

    let video = estimator.begin_download(true);
    let audio = estimator.begin_download(false);
    harness.clock.advance(secs(1.0));
    estimator.progress(video, 250_000, true);
    estimator.progress(audio, 125_000, false);

    // 2 Mbps own rate plus 1 Mbps from the overlapping audio fetch.
    assert!((estimator.calculate_rate(video) - 3_000_000.0).abs() < 1.0);
    assert_eq!(estimator.tracked_downloads(), 2);

    estimator.complete(audio, false, false);
    estimator.complete(video, false, true);
    assert_eq!(estimator.tracked_downloads(), 0);
    assert_eq!(harness.handler.targets(), vec![2_000_000]);
}
