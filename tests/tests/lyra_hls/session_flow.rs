#![forbid(unsafe_code)]

use std::time::Duration;

use lyra_abr::{AbrOptions, BitrateSuggestion, PlaybackState};
use lyra_events::StreamKind;
use lyra_hls::{AppliedSwitch, HlsConfig};
use rstest::rstest;

use crate::common::{SessionHarness, session_at_1m, tracing_setup};

fn pending(harness: &SessionHarness, kind: StreamKind) -> Option<u32> {
    harness
        .session
        .coordinator(kind)
        .pending_bitrate_switch()
        .map(|p| p.target_bps())
}

#[rstest]
fn fast_network_upshifts_at_the_next_boundary(_tracing_setup: (), session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();

    // 375 kB in one second: 3 Mbps.
    h.download(375_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(2_000_000));
    assert_eq!(h.session.active_bitrate(), 1_000_000);

    assert_eq!(
        h.session.on_segment_boundary(StreamKind::Video),
        vec![AppliedSwitch::Bitrate {
            from_bps: 1_000_000,
            to_bps: 2_000_000,
        }]
    );
    assert_eq!(h.session.active_bitrate(), 2_000_000);
    assert_eq!(
        h.session.active_variant().unwrap().uri(),
        "video/2000k/index.m3u8"
    );
    h.session.on_segment_boundary(StreamKind::Audio);
    assert_eq!(pending(&h, StreamKind::Audio), None);
    h.session.stop();
}

#[rstest]
fn back_to_back_suggestions_keep_one_pending_switch(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();

    h.download(375_000, Duration::from_secs(1));
    // Still above the pending target: waits for the first switch.
    h.download(1_000_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(2_000_000));

    h.segment_boundary();
    h.download(1_000_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(4_000_000));
    h.segment_boundary();
    assert_eq!(h.session.active_bitrate(), 4_000_000);
    h.session.stop();
}

#[rstest]
fn collapsing_network_cancels_a_pending_upshift(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();

    h.download(375_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(2_000_000));

    // 0.8 Mbps: the upshift goes and a downshift takes its place.
    h.download(100_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(500_000));
    assert_eq!(pending(&h, StreamKind::Audio), Some(500_000));

    h.segment_boundary();
    assert_eq!(h.session.active_bitrate(), 500_000);
    h.session.stop();
}

#[rstest]
fn rebuffering_drops_to_the_lowest_variant() {
    let h = SessionHarness::new(
        HlsConfig::new(AbrOptions::default().with_downshift_tolerance(0.25))
            .with_start_bitrate(4_000_000),
    );
    h.session.start().unwrap();

    // 6 Mbps keeps the top variant.
    h.download(750_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), None);

    h.playback.set(PlaybackState::Buffering);
    h.session.on_buffering_started(PlaybackState::Started);
    let request = h
        .session
        .coordinator(StreamKind::Video)
        .pending_bitrate_switch()
        .unwrap();
    assert_eq!(request.target_bps(), 500_000);
    assert!(request.ignore_buffer());
    h.session.stop();
}

#[rstest]
fn unreachable_switch_target_is_abandoned(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();
    h.download(375_000, Duration::from_secs(1));

    assert!(!h.session.on_switch_segment_failed(StreamKind::Video));
    assert!(!h.session.on_switch_segment_failed(StreamKind::Video));
    assert!(h.session.on_switch_segment_failed(StreamKind::Video));
    assert_eq!(pending(&h, StreamKind::Video), None);
    assert_eq!(pending(&h, StreamKind::Audio), None);
    assert_eq!(h.session.estimator().last_suggested_bandwidth(), 1_000_000);
    h.session.stop();
}

#[rstest]
fn application_approval_and_lock(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();
    h.session.set_approver(Some(std::sync::Arc::new(
        |s: &BitrateSuggestion, cancel: &mut bool| *cancel = s.to_bps > 2_000_000,
    )));

    h.download(1_000_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), None);

    h.download(375_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), Some(2_000_000));
    h.segment_boundary();

    h.session.set_bitrate_lock(true);
    h.download(100_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), None);
    assert_eq!(h.session.active_bitrate(), 2_000_000);
    h.session.stop();
}

#[rstest]
fn trick_play_ignores_measurements(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();
    h.session.set_playback_rate(2.0);

    h.download(1_000_000, Duration::from_secs(1));
    assert_eq!(pending(&h, StreamKind::Video), None);
    assert_eq!(h.session.estimator().last_suggested_bandwidth(), 1_000_000);
    h.session.stop();
}
