use std::sync::Arc;

use lyra_abr::{
    AbrOptions, BandwidthEstimator, BitrateSuggestion, EstimatorContext, ManualClock,
    PlaybackState, SharedPlaybackState, SuggestionDispatch, SuggestionHandler,
};
use lyra_platform::{Mutex, ThreadPool};
use rstest::fixture;

/// Bitrate ladder used across tests, ascending.
pub const LADDER: [u32; 4] = [500_000, 1_000_000, 2_000_000, 4_000_000];

#[fixture]
pub fn tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("warn".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn debug_tracing_setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::default()
                .add_directive("lyra_abr=debug".parse().expect("valid directive"))
                .add_directive("lyra_hls=debug".parse().expect("valid directive")),
        )
        .with_test_writer()
        .try_init();
}

#[fixture]
pub fn ladder() -> Vec<u32> {
    LADDER.to_vec()
}

/// Suggestion handler that records every suggestion and optionally vetoes.
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<BitrateSuggestion>>,
    veto: bool,
}

impl RecordingHandler {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that cancels every suggestion it receives.
    #[must_use]
    pub fn vetoing() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            veto: true,
        })
    }

    #[must_use]
    pub fn received(&self) -> Vec<BitrateSuggestion> {
        self.received.lock().clone()
    }

    /// Target bitrates received so far, in order.
    #[must_use]
    pub fn targets(&self) -> Vec<u32> {
        self.received.lock().iter().map(|s| s.to_bps).collect()
    }
}

impl SuggestionHandler for RecordingHandler {
    fn on_suggestion(&self, suggestion: &BitrateSuggestion, cancel: &mut bool) {
        self.received.lock().push(*suggestion);
        *cancel = self.veto;
    }
}

/// Estimator wired to a manual clock, shared playback state and a
/// [`RecordingHandler`].
pub struct EstimatorHarness {
    pub estimator: BandwidthEstimator,
    pub clock: Arc<ManualClock>,
    pub playback: SharedPlaybackState,
    pub handler: Arc<RecordingHandler>,
}

impl EstimatorHarness {
    /// Build over [`LADDER`] with the given options. The monitor is not
    /// started.
    #[must_use]
    pub fn new(options: AbrOptions) -> Self {
        let clock = Arc::new(ManualClock::new());
        let playback = SharedPlaybackState::new(PlaybackState::Started);
        let estimator = BandwidthEstimator::new(
            options,
            EstimatorContext::new(Arc::new(playback.clone()))
                .with_clock(clock.clone())
                .with_thread_pool(ThreadPool::with_num_threads(2).unwrap()),
        );
        estimator.set_bandwidth_range(&LADDER).unwrap();
        let handler = RecordingHandler::new();
        estimator.set_suggestion_handler(Some(handler.clone()));
        Self {
            estimator,
            clock,
            playback,
            handler,
        }
    }

    /// Synchronous dispatch, started, anchored at `anchor`.
    #[must_use]
    pub fn started_sync(options: AbrOptions, anchor: u32) -> Self {
        let harness = Self::new(options.with_dispatch(SuggestionDispatch::Sync));
        harness.estimator.set_last_suggested_bandwidth(anchor);
        harness.estimator.start().unwrap();
        harness
    }
}
