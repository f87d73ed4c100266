use std::time::Duration;

/// How an accepted suggestion reaches the registered handler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SuggestionDispatch {
    /// Posted to the thread pool. The handler runs after the decision path
    /// has moved on, so setting the cancel flag restores the previous anchor
    /// even if a newer suggestion was accepted meanwhile.
    #[default]
    Async,
    /// Invoked on the deciding thread before the decision returns. Setting the
    /// cancel flag reliably withdraws the suggestion.
    Sync,
}

/// Bandwidth estimator configuration.
#[derive(Clone, Debug)]
pub struct AbrOptions {
    /// Master switch. When false the monitor never starts and no suggestion
    /// is raised.
    pub enabled: bool,
    /// Period of the averaging tick.
    pub notification_interval: Duration,
    /// Fraction a measurement must exceed a candidate bitrate by before
    /// upshifting to it (0.35 means 135% of the candidate).
    pub upshift_padding: f64,
    /// Fraction measured throughput may fall below the current suggestion
    /// before a downshift is considered.
    pub downshift_tolerance: f64,
    /// Upshift one table entry at a time instead of jumping to the largest
    /// safe entry.
    pub upshift_in_steps: bool,
    /// Defer decisions on completed downloads to the averaging tick.
    pub time_averaged: bool,
    pub dispatch: SuggestionDispatch,
    /// Bytes a download must accumulate between running-rate recomputations.
    pub checkpoint_bytes: u64,
    /// Upshift suppression: standard deviation, as a fraction of the measured
    /// rate, above which a measurement counts as volatile.
    pub suppression_std_dev_ratio: f64,
    /// Upshift suppression: a volatile measurement still upshifts once it
    /// reaches this multiple of the candidate bitrate.
    pub suppression_headroom_ratio: f64,
}

impl Default for AbrOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            notification_interval: Duration::from_secs(15),
            upshift_padding: 0.35,
            downshift_tolerance: 0.0,
            upshift_in_steps: false,
            time_averaged: false,
            dispatch: SuggestionDispatch::Async,
            checkpoint_bytes: 1024 * 1024,
            suppression_std_dev_ratio: 0.25,
            suppression_headroom_ratio: 1.5,
        }
    }
}

impl AbrOptions {
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_notification_interval(mut self, interval: Duration) -> Self {
        self.notification_interval = interval;
        self
    }

    #[must_use]
    pub fn with_upshift_padding(mut self, padding: f64) -> Self {
        self.upshift_padding = padding;
        self
    }

    #[must_use]
    pub fn with_downshift_tolerance(mut self, tolerance: f64) -> Self {
        self.downshift_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn with_upshift_in_steps(mut self, in_steps: bool) -> Self {
        self.upshift_in_steps = in_steps;
        self
    }

    #[must_use]
    pub fn with_time_averaged(mut self, time_averaged: bool) -> Self {
        self.time_averaged = time_averaged;
        self
    }

    #[must_use]
    pub fn with_dispatch(mut self, dispatch: SuggestionDispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    #[must_use]
    pub fn with_checkpoint_bytes(mut self, bytes: u64) -> Self {
        self.checkpoint_bytes = bytes;
        self
    }
}
