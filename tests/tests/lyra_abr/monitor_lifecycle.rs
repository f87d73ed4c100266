#![forbid(unsafe_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use lyra_abr::{AbrOptions, BitrateSuggestion, PlaybackState};
use lyra_platform::Mutex;
use rstest::rstest;

use crate::common::{EstimatorHarness, RecordingHandler, Xorshift64, tracing_setup};

#[rstest]
#[timeout(Duration::from_secs(10))]
fn stop_returns_after_in_flight_delivery(_tracing_setup: ()) {
    let harness = EstimatorHarness::new(AbrOptions::default());
    let estimator = &harness.estimator;

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = Mutex::new(release_rx);
    let finished = Arc::new(AtomicBool::new(false));
    let done = Arc::clone(&finished);
    estimator.set_suggestion_handler(Some(Arc::new(
        move |_: &BitrateSuggestion, _: &mut bool| {
            let _ = entered_tx.send(());
            let _ = release_rx.lock().recv();
            done.store(true, Ordering::SeqCst);
        },
    )));
    estimator.start().unwrap();

    let suggestion = estimator.notify_bitrate_change_if_needed(3_000_000.0, 3_000_000.0, 0.0);
    assert_eq!(suggestion.map(|s| s.to_bps), Some(2_000_000));
    entered_rx.recv().unwrap();

    thread::scope(|scope| {
        let stopper = scope.spawn(|| estimator.stop());
        thread::sleep(Duration::from_millis(50));
        assert!(!stopper.is_finished());
        release_tx.send(()).unwrap();
        stopper.join().unwrap();
    });

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(estimator.pending_notifications(), 0);
    assert!(!estimator.is_running());
}

#[rstest]
#[case::sync(true)]
#[case::pooled(false)]
fn repeated_decision_notifies_once(#[case] sync: bool) {
    let harness = if sync {
        EstimatorHarness::started_sync(AbrOptions::default(), 1_000_000)
    } else {
        let harness = EstimatorHarness::new(AbrOptions::default());
        harness.estimator.set_last_suggested_bandwidth(1_000_000);
        harness.estimator.start().unwrap();
        harness
    };

    for _ in 0..3 {
        harness
            .estimator
            .notify_bitrate_change_if_needed(3_000_000.0, 3_000_000.0, 0.0);
    }
    harness.estimator.wait_notifications();

    assert_eq!(harness.handler.targets(), vec![2_000_000]);
    harness.estimator.stop();
}

#[test]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "synthetic byte counts are positive and small"
)]
fn time_averaged_measurements_decide_on_tick() {
    let harness =
        EstimatorHarness::started_sync(AbrOptions::default().with_time_averaged(true), 1_000_000);
    let mut rng = Xorshift64::new(99);

    // Segments at roughly 3 Mbps: each complete() only feeds the history.
    for rate in rng.throughput_trace(3_000_000.0, 0.05, 5) {
        let id = harness.estimator.begin_download(true);
        harness.clock.advance(Duration::from_secs(1));
        harness.estimator.progress(id, (rate / 8.0) as u64, true);
        harness.estimator.complete(id, false, true);
    }
    assert!(harness.handler.targets().is_empty());
    assert!(harness.estimator.last_measured_bandwidth() > 2_700_000);

    harness.estimator.tick();
    assert_eq!(harness.handler.targets(), vec![2_000_000]);

    // The window was consumed.
    harness.estimator.tick();
    assert_eq!(harness.handler.received().len(), 1);
    harness.estimator.stop();
}

#[test]
fn slow_segment_downshifts_without_waiting_for_tick() {
    let harness =
        EstimatorHarness::started_sync(AbrOptions::default().with_time_averaged(true), 4_000_000);

    let id = harness.estimator.begin_download(true);
    harness.clock.advance(Duration::from_secs(2));
    // 1.6 Mbps against a 4 Mbps anchor.
    harness.estimator.progress(id, 400_000, true);
    harness.estimator.complete(id, false, true);

    assert_eq!(harness.handler.targets(), vec![500_000]);
    harness.estimator.stop();
}

#[rstest]
#[case(PlaybackState::Paused, false)]
#[case(PlaybackState::Seeking, false)]
#[case(PlaybackState::Buffering, true)]
fn consumer_state_gates_suggestions(#[case] state: PlaybackState, #[case] delivered: bool) {
    let harness = EstimatorHarness::started_sync(AbrOptions::default(), 1_000_000);
    harness.playback.set(state);

    let suggestion = harness
        .estimator
        .notify_bitrate_change_if_needed(3_000_000.0, 3_000_000.0, 0.0);

    assert_eq!(suggestion.is_some(), delivered);
    assert_eq!(harness.handler.targets().len(), usize::from(delivered));
    harness.estimator.stop();
}

#[test]
fn vetoed_suggestion_restores_anchor() {
    let harness = EstimatorHarness::started_sync(AbrOptions::default(), 1_000_000);
    harness
        .estimator
        .set_suggestion_handler(Some(RecordingHandler::vetoing()));

    harness
        .estimator
        .notify_bitrate_change_if_needed(3_000_000.0, 3_000_000.0, 0.0);
    assert_eq!(harness.estimator.last_suggested_bandwidth(), 1_000_000);
    harness.estimator.stop();
}
