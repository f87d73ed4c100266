#![forbid(unsafe_code)]

use std::time::Duration;

/// Events emitted by the bandwidth estimator.
#[derive(Clone, Debug, PartialEq)]
pub enum AbrEvent {
    /// Periodic averaging started.
    MonitorStarted { interval: Duration },
    /// Periodic averaging stopped and outstanding notifications drained.
    MonitorStopped,
    /// One averaging tick summarized the completed-download history.
    BandwidthAveraged {
        average_bps: f64,
        last_bps: f64,
        std_dev_bps: f64,
        samples: usize,
    },
    /// A new bitrate was suggested to subscribers.
    BitrateSuggested {
        from_bps: u32,
        to_bps: u32,
        last_measured_bps: u32,
    },
    /// An upshift was withheld because the measurement was too volatile.
    SuggestionSuppressed {
        measured_bps: f64,
        candidate_bps: u32,
        std_dev_bps: f64,
    },
    /// A subscriber cancelled a suggestion and the previous anchor was restored.
    SuggestionCancelled { suggested_bps: u32, restored_bps: u32 },
}
