#![forbid(unsafe_code)]

use std::{sync::Arc, time::Duration};

use lyra_abr::PlaybackState;
use lyra_events::StreamKind;
use lyra_hls::{AppliedSwitch, HlsError, MediaPlaylist};
use rstest::rstest;

use crate::common::{SessionHarness, session_at_1m};

fn rendition(h: &SessionHarness, name: &str) -> Arc<MediaPlaylist> {
    Arc::clone(
        h.session
            .variants()
            .find_rendition(StreamKind::Audio, name)
            .unwrap(),
    )
}

#[rstest]
fn alternate_audio_round_trip(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    let french = rendition(&h, "Français");

    h.session
        .request_rendition_switch(StreamKind::Audio, Some(&*french))
        .unwrap();
    assert!(h.session.on_segment_boundary(StreamKind::Video).is_empty());
    assert_eq!(
        h.session.on_segment_boundary(StreamKind::Audio),
        vec![AppliedSwitch::Rendition {
            name: "Français".to_owned(),
        }]
    );
    assert!(
        h.session
            .coordinator(StreamKind::Audio)
            .is_on_alternate_rendition()
    );

    // Asking for the active rendition again is a no-op.
    h.session
        .request_rendition_switch(StreamKind::Audio, Some(&*french))
        .unwrap();
    assert!(
        h.session
            .coordinator(StreamKind::Audio)
            .pending_rendition_switch()
            .is_none()
    );

    h.session
        .request_rendition_switch(StreamKind::Audio, None)
        .unwrap();
    h.session.on_segment_boundary(StreamKind::Audio);
    assert!(
        !h.session
            .coordinator(StreamKind::Audio)
            .is_on_alternate_rendition()
    );
    assert_eq!(
        h.session.coordinator(StreamKind::Audio).active_bandwidth(),
        1_000_000
    );
}

#[rstest]
fn bitrate_switches_skip_alternate_audio(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();
    let english = rendition(&h, "English");
    h.session
        .request_rendition_switch(StreamKind::Audio, Some(&*english))
        .unwrap();
    h.session.on_segment_boundary(StreamKind::Audio);

    h.download(375_000, Duration::from_secs(1));
    assert!(
        h.session
            .coordinator(StreamKind::Video)
            .pending_bitrate_switch()
            .is_some()
    );
    assert!(
        h.session
            .coordinator(StreamKind::Audio)
            .pending_bitrate_switch()
            .is_none()
    );

    h.segment_boundary();
    assert_eq!(h.session.active_bitrate(), 2_000_000);
    assert!(
        h.session
            .coordinator(StreamKind::Audio)
            .is_on_alternate_rendition()
    );
    h.session.stop();
}

#[rstest]
#[case(PlaybackState::Paused)]
#[case(PlaybackState::Buffering)]
fn renditions_switch_only_while_playing(
    session_at_1m: SessionHarness,
    #[case] state: PlaybackState,
) {
    let h = session_at_1m;
    let english = rendition(&h, "English");
    h.playback.set(state);
    assert!(matches!(
        h.session
            .request_rendition_switch(StreamKind::Audio, Some(&*english)),
        Err(HlsError::NotStarted)
    ));
}

#[rstest]
fn deselected_stream_keeps_its_track(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    let english = rendition(&h, "English");
    h.session.coordinator(StreamKind::Audio).set_selected(false);

    h.session
        .request_rendition_switch(StreamKind::Audio, Some(&*english))
        .unwrap();
    assert!(h.session.on_segment_boundary(StreamKind::Audio).is_empty());
}

#[rstest]
fn stop_drops_pending_rendition_switch(session_at_1m: SessionHarness) {
    let h = session_at_1m;
    h.session.start().unwrap();
    let english = rendition(&h, "English");
    h.session
        .request_rendition_switch(StreamKind::Audio, Some(&*english))
        .unwrap();

    h.session.stop();
    assert!(h.session.on_segment_boundary(StreamKind::Audio).is_empty());
}
