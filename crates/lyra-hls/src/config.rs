#![forbid(unsafe_code)]

use std::{fmt, sync::Arc};

pub use lyra_abr::AbrOptions;
use lyra_abr::Clock;
use lyra_events::EventBus;
use lyra_platform::ThreadPool;

/// Configuration for an adaptive HLS session.
#[derive(Clone)]
pub struct HlsConfig {
    /// Bandwidth estimation and decision policy options.
    pub abr: AbrOptions,
    /// Preferred initial bitrate; the closest variant is picked. `None`
    /// starts on the lowest variant.
    pub start_bitrate: Option<u32>,
    /// Lowest bitrate the session may switch to.
    pub min_allowed_bitrate: Option<u32>,
    /// Highest bitrate the session may switch to.
    pub max_allowed_bitrate: Option<u32>,
    /// Failed segment fetches tolerated on a switch target before the pending
    /// switch is cancelled. 0 disables the limit. Default: 2.
    pub segment_try_limit: u32,
    /// Evaluate a downshift as soon as playback starts buffering.
    pub downshift_on_buffering: bool,
    /// Capacity of the events channel (used when `events` is not provided).
    pub events_channel_capacity: usize,
    /// Event bus (optional - if not provided, one is created internally).
    pub events: Option<EventBus>,
    /// Thread pool for suggestion delivery.
    ///
    /// Shared across sessions. Defaults to the global rayon pool.
    pub thread_pool: ThreadPool,
    /// Time source for download measurements. Defaults to a monotonic clock.
    pub clock: Option<Arc<dyn Clock>>,
}

impl Default for HlsConfig {
    fn default() -> Self {
        Self {
            abr: AbrOptions::default(),
            start_bitrate: None,
            min_allowed_bitrate: None,
            max_allowed_bitrate: None,
            segment_try_limit: 2,
            downshift_on_buffering: true,
            events_channel_capacity: 64,
            events: None,
            thread_pool: ThreadPool::default(),
            clock: None,
        }
    }
}

impl fmt::Debug for HlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HlsConfig")
            .field("abr", &self.abr)
            .field("start_bitrate", &self.start_bitrate)
            .field("min_allowed_bitrate", &self.min_allowed_bitrate)
            .field("max_allowed_bitrate", &self.max_allowed_bitrate)
            .field("segment_try_limit", &self.segment_try_limit)
            .field("downshift_on_buffering", &self.downshift_on_buffering)
            .field("events_channel_capacity", &self.events_channel_capacity)
            .field("events", &self.events.is_some())
            .field("thread_pool", &self.thread_pool)
            .field("clock", &self.clock.as_ref().map(|_| "Clock"))
            .finish()
    }
}

impl HlsConfig {
    /// Create a config with the given ABR options.
    #[must_use]
    pub fn new(abr: AbrOptions) -> Self {
        Self {
            abr,
            ..Self::default()
        }
    }

    /// Set ABR options.
    #[must_use]
    pub fn with_abr(mut self, abr: AbrOptions) -> Self {
        self.abr = abr;
        self
    }

    /// Set the preferred initial bitrate.
    #[must_use]
    pub fn with_start_bitrate(mut self, bitrate: u32) -> Self {
        self.start_bitrate = Some(bitrate);
        self
    }

    /// Restrict switching to `[min, max]`.
    #[must_use]
    pub fn with_allowed_bitrates(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_allowed_bitrate = min;
        self.max_allowed_bitrate = max;
        self
    }

    /// Set the failed-fetch limit for switch targets.
    #[must_use]
    pub fn with_segment_try_limit(mut self, limit: u32) -> Self {
        self.segment_try_limit = limit;
        self
    }

    #[must_use]
    pub fn with_downshift_on_buffering(mut self, enabled: bool) -> Self {
        self.downshift_on_buffering = enabled;
        self
    }

    /// Set events channel capacity.
    #[must_use]
    pub fn with_events_channel_capacity(mut self, capacity: usize) -> Self {
        self.events_channel_capacity = capacity;
        self
    }

    /// Set the event bus.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Set thread pool for suggestion delivery.
    #[must_use]
    pub fn with_thread_pool(mut self, pool: ThreadPool) -> Self {
        self.thread_pool = pool;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }
}
