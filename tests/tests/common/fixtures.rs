use std::{sync::Arc, time::Duration};

use lyra_abr::{AbrOptions, ManualClock, PlaybackState, SharedPlaybackState, SuggestionDispatch};
use lyra_events::StreamKind;
use lyra_hls::{AdaptiveSession, HlsConfig, MediaPlaylist, RenditionInfo, VariantSet};
use lyra_test_utils::LADDER;
use rstest::fixture;

/// Master playlist of [`LADDER`] variants sharing the `aud` audio group, with
/// two alternate audio renditions in it.
#[fixture]
pub fn presentation() -> VariantSet {
    VariantSet::new(LADDER.iter().map(|&bps| {
        MediaPlaylist::variant(format!("video/{}k/index.m3u8", bps / 1000), bps)
            .with_audio_group("aud")
    }))
    .unwrap()
    .with_renditions([
        MediaPlaylist::rendition(
            "audio/en/index.m3u8",
            RenditionInfo::new(StreamKind::Audio, "aud", "English")
                .with_language("en")
                .with_default(true),
        ),
        MediaPlaylist::rendition(
            "audio/fr/index.m3u8",
            RenditionInfo::new(StreamKind::Audio, "aud", "Français").with_language("fr"),
        ),
    ])
    .unwrap()
}

/// A session over [`presentation`] driven by a manual clock, delivering
/// suggestions synchronously.
pub struct SessionHarness {
    pub session: AdaptiveSession,
    pub playback: SharedPlaybackState,
    pub clock: Arc<ManualClock>,
}

impl SessionHarness {
    pub fn new(config: HlsConfig) -> Self {
        let playback = SharedPlaybackState::new(PlaybackState::Started);
        let clock = Arc::new(ManualClock::new());
        let abr = config
            .abr
            .clone()
            .with_dispatch(SuggestionDispatch::Sync)
            .with_notification_interval(Duration::from_secs(3600));
        let session = AdaptiveSession::new(
            config.with_abr(abr).with_clock(clock.clone()),
            presentation(),
            Arc::new(playback.clone()),
        )
        .unwrap();
        Self {
            session,
            playback,
            clock,
        }
    }

    /// Simulate one segment download of `bytes` taking `took`.
    pub fn download(&self, bytes: u64, took: Duration) {
        let estimator = self.session.estimator();
        let id = estimator.begin_download(true);
        self.clock.advance(took);
        estimator.progress(id, bytes, true);
        estimator.complete(id, false, true);
    }

    /// Both streams cross a segment boundary.
    pub fn segment_boundary(&self) {
        self.session.on_segment_boundary(StreamKind::Video);
        self.session.on_segment_boundary(StreamKind::Audio);
    }
}

#[fixture]
pub fn session_at_1m() -> SessionHarness {
    SessionHarness::new(HlsConfig::new(AbrOptions::default()).with_start_bitrate(1_000_000))
}
