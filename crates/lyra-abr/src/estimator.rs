//! Throughput monitor that turns download measurements into bitrate suggestions.

use std::{
    cell::RefCell,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use lyra_events::{AbrEvent, EventBus};
use lyra_platform::{
    CancellationToken, Mutex, ReentrantMutex, RwLock, TaskRegistry, ThreadPool, Ticker,
};
use tracing::{debug, info, trace, warn};

use crate::{
    AbrOptions, AbrResult, BitrateHistory, BitratePolicy, BitrateSuggestion, Clock, DownloadId,
    DownloadTracker, MonotonicClock, PlaybackStateSource, SuggestionDispatch, SuggestionHandler,
};

/// Collaborators of a [`BandwidthEstimator`].
#[derive(Clone)]
pub struct EstimatorContext {
    /// Consumer state; suggestions are only raised while it accepts them.
    pub playback: Arc<dyn PlaybackStateSource>,
    pub clock: Arc<dyn Clock>,
    /// Pool that runs asynchronous suggestion delivery.
    pub thread_pool: ThreadPool,
    pub events: Option<EventBus>,
}

impl EstimatorContext {
    #[must_use]
    pub fn new(playback: Arc<dyn PlaybackStateSource>) -> Self {
        Self {
            playback,
            clock: Arc::new(MonotonicClock::new()),
            thread_pool: ThreadPool::default(),
            events: None,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_thread_pool(mut self, pool: ThreadPool) -> Self {
        self.thread_pool = pool;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }
}

impl fmt::Debug for EstimatorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstimatorContext")
            .field("playback", &self.playback.playback_state())
            .field("thread_pool", &self.thread_pool)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

struct EstimatorState {
    tracker: DownloadTracker,
    history: BitrateHistory,
    policy: BitratePolicy,
}

enum Outcome {
    Unchanged,
    Suppressed { candidate: u32 },
    Accepted(BitrateSuggestion),
}

struct Inner {
    options: AbrOptions,
    context: EstimatorContext,
    state: ReentrantMutex<RefCell<EstimatorState>>,
    handler: RwLock<Option<Arc<dyn SuggestionHandler>>>,
    ticker: Mutex<Option<Ticker>>,
    running: AtomicBool,
    tasks: TaskRegistry,
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "float-to-int casts saturate; rates are clamped into u32 bps"
)]
fn to_bps(rate: f64) -> u32 {
    rate as u32
}

impl Inner {
    /// Run `f` under the estimator lock. `f` must not call back into the
    /// estimator.
    fn with_state<R>(&self, f: impl FnOnce(&mut EstimatorState) -> R) -> R {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    fn publish(&self, event: AbrEvent) {
        if let Some(ref bus) = self.context.events {
            bus.publish(event);
        }
    }

    fn tick(self: &Arc<Self>) {
        let Some(summary) = self.with_state(|s| s.history.summarize_and_clear()) else {
            trace!("averaging tick without samples");
            return;
        };
        debug!(
            average_bps = summary.average,
            last_bps = summary.last,
            std_dev_bps = summary.std_dev,
            samples = summary.samples,
            "bandwidth averaged"
        );
        self.publish(AbrEvent::BandwidthAveraged {
            average_bps: summary.average,
            last_bps: summary.last,
            std_dev_bps: summary.std_dev,
            samples: summary.samples,
        });
        if self.options.time_averaged {
            self.notify(summary.average, summary.last, summary.std_dev);
        }
    }

    fn notify(
        self: &Arc<Self>,
        measured: f64,
        last_measured: f64,
        std_dev: f64,
    ) -> Option<BitrateSuggestion> {
        let handler = self.handler.read().clone();
        let gate_open = handler.is_some()
            && self.options.enabled
            && self.context.playback.playback_state().accepts_suggestions();

        let outcome = self.with_state(|s| {
            s.policy.set_last_measured(to_bps(last_measured));
            if !gate_open || s.policy.bandwidths().is_empty() {
                return Outcome::Unchanged;
            }
            let candidate = s.policy.find_bitrate_to_switch_to(measured);
            let last = s.policy.last_suggested();
            if std_dev > 0.0
                && candidate > last
                && std_dev > measured * self.options.suppression_std_dev_ratio
                && measured < self.options.suppression_headroom_ratio * f64::from(candidate)
            {
                return Outcome::Suppressed { candidate };
            }
            if candidate == last {
                return Outcome::Unchanged;
            }
            s.policy.set_last_suggested(candidate);
            Outcome::Accepted(BitrateSuggestion {
                from_bps: last,
                to_bps: candidate,
                last_measured_bps: s.policy.last_measured(),
            })
        });

        match outcome {
            Outcome::Unchanged => None,
            Outcome::Suppressed { candidate } => {
                debug!(
                    measured_bps = measured,
                    candidate_bps = candidate,
                    std_dev_bps = std_dev,
                    "volatile measurement, upshift suppressed"
                );
                self.publish(AbrEvent::SuggestionSuppressed {
                    measured_bps: measured,
                    candidate_bps: candidate,
                    std_dev_bps: std_dev,
                });
                None
            }
            Outcome::Accepted(suggestion) => {
                debug!(
                    from_bps = suggestion.from_bps,
                    to_bps = suggestion.to_bps,
                    measured_bps = measured,
                    upshift_padding = self.options.upshift_padding,
                    downshift_tolerance = self.options.downshift_tolerance,
                    "bitrate suggested"
                );
                self.publish(AbrEvent::BitrateSuggested {
                    from_bps: suggestion.from_bps,
                    to_bps: suggestion.to_bps,
                    last_measured_bps: suggestion.last_measured_bps,
                });
                if let Some(handler) = handler {
                    self.dispatch(suggestion, handler);
                }
                Some(suggestion)
            }
        }
    }

    fn dispatch(self: &Arc<Self>, suggestion: BitrateSuggestion, handler: Arc<dyn SuggestionHandler>) {
        match self.options.dispatch {
            SuggestionDispatch::Async => {
                let inner = Arc::clone(self);
                self.tasks.spawn(&self.context.thread_pool, move |token| {
                    inner.deliver_async(handler.as_ref(), suggestion, token);
                });
            }
            SuggestionDispatch::Sync => {
                if invoke(handler.as_ref(), &suggestion) {
                    let restored = self.with_state(|s| {
                        let current = s.policy.last_suggested() == suggestion.to_bps;
                        if current {
                            s.policy.set_last_suggested(suggestion.from_bps);
                        }
                        current
                    });
                    if restored {
                        self.cancelled(suggestion);
                    }
                }
            }
        }
    }

    fn deliver_async(
        &self,
        handler: &dyn SuggestionHandler,
        suggestion: BitrateSuggestion,
        token: &CancellationToken,
    ) {
        if token.is_cancelled() {
            return;
        }
        let state = self.context.playback.playback_state();
        if !state.accepts_suggestions() {
            trace!(?state, to_bps = suggestion.to_bps, "stale suggestion dropped");
            return;
        }
        if invoke(handler, &suggestion) {
            // Unconditional: a newer suggestion accepted meanwhile is overwritten.
            self.with_state(|s| s.policy.set_last_suggested(suggestion.from_bps));
            self.cancelled(suggestion);
        }
    }

    fn cancelled(&self, suggestion: BitrateSuggestion) {
        debug!(
            suggested_bps = suggestion.to_bps,
            restored_bps = suggestion.from_bps,
            "suggestion cancelled by handler"
        );
        self.publish(AbrEvent::SuggestionCancelled {
            suggested_bps: suggestion.to_bps,
            restored_bps: suggestion.from_bps,
        });
    }
}

/// Call the handler, containing panics. Returns the cancel flag.
fn invoke(handler: &dyn SuggestionHandler, suggestion: &BitrateSuggestion) -> bool {
    let mut cancel = false;
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        handler.on_suggestion(suggestion, &mut cancel);
    }));
    if result.is_err() {
        warn!(to_bps = suggestion.to_bps, "suggestion handler panicked");
        return false;
    }
    cancel
}

/// Live throughput estimate and bitrate decision engine.
///
/// Downloads report progress through [`begin_download`], [`progress`] and
/// [`complete`]. Rates of concurrent downloads are combined, fed either
/// directly or through a periodic averaging tick into the
/// [`BitratePolicy`], and changed decisions are delivered to the registered
/// [`SuggestionHandler`].
///
/// All state sits behind one re-entrant lock; no I/O happens while it is
/// held and handlers are always invoked with it released.
///
/// [`begin_download`]: BandwidthEstimator::begin_download
/// [`progress`]: BandwidthEstimator::progress
/// [`complete`]: BandwidthEstimator::complete
pub struct BandwidthEstimator {
    inner: Arc<Inner>,
}

impl BandwidthEstimator {
    #[must_use]
    pub fn new(options: AbrOptions, context: EstimatorContext) -> Self {
        let policy = BitratePolicy::new(&options);
        Self {
            inner: Arc::new(Inner {
                options,
                context,
                state: ReentrantMutex::new(RefCell::new(EstimatorState {
                    tracker: DownloadTracker::new(),
                    history: BitrateHistory::new(),
                    policy,
                })),
                handler: RwLock::new(None),
                ticker: Mutex::new(None),
                running: AtomicBool::new(false),
                tasks: TaskRegistry::new(),
            }),
        }
    }

    /// Start the averaging tick. No-op when already running or disabled.
    ///
    /// # Errors
    ///
    /// [`crate::AbrError::Timer`] if the timer thread cannot be spawned.
    pub fn start(&self) -> AbrResult<()> {
        let mut slot = self.inner.ticker.lock();
        if slot.is_some() {
            return Ok(());
        }
        if !self.inner.options.enabled {
            debug!("bitrate monitor disabled");
            return Ok(());
        }
        let interval = self.inner.options.notification_interval;
        let weak = Arc::downgrade(&self.inner);
        let ticker = Ticker::start("lyra-abr-monitor", interval, move || {
            if let Some(inner) = weak.upgrade() {
                inner.tick();
            }
        })?;
        *slot = Some(ticker);
        self.inner.running.store(true, Ordering::Release);
        drop(slot);

        info!(?interval, "bitrate monitor started");
        self.inner.publish(AbrEvent::MonitorStarted { interval });
        Ok(())
    }

    /// Stop the averaging tick, cancel queued suggestion deliveries and wait
    /// for running ones to finish.
    ///
    /// Must not be called from inside a [`SuggestionHandler`] with
    /// asynchronous dispatch: the handler would wait for itself.
    pub fn stop(&self) {
        let ticker = self.inner.ticker.lock().take();
        let was_running = self.inner.running.swap(false, Ordering::AcqRel);
        if let Some(mut ticker) = ticker {
            ticker.stop();
        }
        self.inner.tasks.cancel_all();
        self.inner.tasks.wait_all();
        // Completions are ignored from here on; in-flight entries would linger.
        self.inner.with_state(|s| s.tracker.clear());
        if was_running {
            info!("bitrate monitor stopped");
            self.inner.publish(AbrEvent::MonitorStopped);
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Begin measuring a download.
    ///
    /// An id is always returned; while the monitor is stopped nothing is
    /// tracked under it and later reports for it are ignored.
    pub fn begin_download(&self, active_variant: bool) -> DownloadId {
        let at = self.inner.context.clock.elapsed();
        let running = self.is_running();
        let id = self.inner.with_state(|s| {
            if running {
                s.tracker.start(at)
            } else {
                s.tracker.allocate_id()
            }
        });
        trace!(id = id.as_u64(), active_variant, tracked = running, "download begun");
        id
    }

    /// Report `total_bytes` received so far for `id`.
    ///
    /// For the current variant, every checkpoint recomputes the running rate;
    /// a rate under the last suggestion is evaluated at once instead of
    /// waiting for the tick.
    pub fn progress(&self, id: DownloadId, total_bytes: u64, current_variant: bool) {
        if !self.is_running() {
            return;
        }
        let at = self.inner.context.clock.elapsed();
        let checkpoint_bytes = self.inner.options.checkpoint_bytes;
        let early = self.inner.with_state(|s| {
            let checkpoint = s.tracker.add_sample(id, at, total_bytes, checkpoint_bytes)?;
            if !(current_variant && checkpoint) {
                return None;
            }
            let rate = s.tracker.update_running_rate(id)?;
            (rate < f64::from(s.policy.last_suggested())).then_some(rate)
        });
        trace!(id = id.as_u64(), total_bytes, ?at, "download progress");

        if let Some(rate) = early
            && self.is_running()
        {
            debug!(id = id.as_u64(), rate_bps = rate, "running rate below suggestion");
            self.inner.notify(rate, rate, 0.0);
        }
    }

    /// Mark `id` finished.
    ///
    /// A non-discarded download of the current variant contributes its rate:
    /// evaluated immediately unless time averaging is on and the rate does
    /// not undercut the last suggestion, in which case it joins the history
    /// averaged by the next tick.
    pub fn complete(&self, id: DownloadId, discard: bool, current_variant: bool) {
        if !self.is_running() {
            return;
        }
        let time_averaged = self.inner.options.time_averaged;
        let immediate = self.inner.with_state(|s| {
            s.tracker.complete(id);
            let mut immediate = None;
            if current_variant
                && !discard
                && let Some(rate) = s.tracker.update_running_rate(id)
            {
                if !time_averaged || rate < f64::from(s.policy.last_suggested()) {
                    immediate = Some(rate);
                } else {
                    s.history.push(rate);
                    s.policy.set_last_measured(to_bps(rate));
                }
            }
            s.tracker.cleanup();
            immediate
        });
        trace!(id = id.as_u64(), discard, current_variant, "download complete");

        if let Some(rate) = immediate {
            self.inner.notify(rate, rate, 0.0);
        }
    }

    /// Combined rate of `id` and every download overlapping it.
    #[must_use]
    pub fn calculate_rate(&self, id: DownloadId) -> f64 {
        self.inner.with_state(|s| s.tracker.calculate_rate(id))
    }

    /// Run one averaging step now. The timer thread calls this every
    /// notification interval.
    pub fn tick(&self) {
        self.inner.tick();
    }

    /// Evaluate `measured` and raise a suggestion if the decision changed.
    ///
    /// Returns the accepted suggestion, or `None` when the gate is closed
    /// (no handler, monitor disabled, consumer not playing), the decision is
    /// unchanged or the upshift was suppressed as volatile.
    pub fn notify_bitrate_change_if_needed(
        &self,
        measured: f64,
        last_measured: f64,
        std_dev: f64,
    ) -> Option<BitrateSuggestion> {
        self.inner.notify(measured, last_measured, std_dev)
    }

    /// Block until every dispatched suggestion has been delivered.
    ///
    /// Must not be called from inside a [`SuggestionHandler`].
    pub fn wait_notifications(&self) {
        self.inner.tasks.wait_all();
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.inner.tasks.in_flight()
    }

    pub fn set_suggestion_handler(&self, handler: Option<Arc<dyn SuggestionHandler>>) {
        *self.inner.handler.write() = handler;
    }

    #[must_use]
    pub fn has_suggestion_handler(&self) -> bool {
        self.inner.handler.read().is_some()
    }

    /// See [`BitratePolicy::set_bandwidth_range`].
    ///
    /// # Errors
    ///
    /// [`crate::AbrError::EmptyBitrateTable`] for an empty table.
    pub fn set_bandwidth_range(&self, bitrates: &[u32]) -> AbrResult<()> {
        self.inner.with_state(|s| s.policy.set_bandwidth_range(bitrates))
    }

    /// See [`BitratePolicy::set_bandwidth_bounds`].
    ///
    /// # Errors
    ///
    /// Propagates the policy's bound validation errors.
    pub fn set_bandwidth_bounds(&self, min: u32, max: u32) -> AbrResult<()> {
        self.inner.with_state(|s| s.policy.set_bandwidth_bounds(min, max))
    }

    #[must_use]
    pub fn bandwidth_bounds(&self) -> (u32, u32) {
        self.inner.with_state(|s| s.policy.bounds())
    }

    #[must_use]
    pub fn bandwidths(&self) -> Vec<u32> {
        self.inner.with_state(|s| s.policy.bandwidths().to_vec())
    }

    #[must_use]
    pub fn find_closest_bitrate(&self, value: u32, ignore_bounds: bool) -> u32 {
        self.inner
            .with_state(|s| s.policy.find_closest_bitrate(value, ignore_bounds))
    }

    #[must_use]
    pub fn find_next_lower_bitrate(&self, value: u32) -> u32 {
        self.inner.with_state(|s| s.policy.find_next_lower_bitrate(value))
    }

    #[must_use]
    pub fn find_next_higher_bitrate(&self, value: u32) -> u32 {
        self.inner.with_state(|s| s.policy.find_next_higher_bitrate(value))
    }

    #[must_use]
    pub fn last_suggested_bandwidth(&self) -> u32 {
        self.inner.with_state(|s| s.policy.last_suggested())
    }

    pub fn set_last_suggested_bandwidth(&self, bitrate: u32) {
        self.inner.with_state(|s| s.policy.set_last_suggested(bitrate));
    }

    #[must_use]
    pub fn last_measured_bandwidth(&self) -> u32 {
        self.inner.with_state(|s| s.policy.last_measured())
    }

    #[must_use]
    pub fn ignore_downshift_tolerance(&self) -> bool {
        self.inner.with_state(|s| s.policy.ignore_downshift_tolerance())
    }

    pub fn set_ignore_downshift_tolerance(&self, ignore: bool) {
        self.inner
            .with_state(|s| s.policy.set_ignore_downshift_tolerance(ignore));
    }

    /// Downloads currently kept for overlap computation.
    #[must_use]
    pub fn tracked_downloads(&self) -> usize {
        self.inner.with_state(|s| s.tracker.len())
    }

    #[must_use]
    pub fn options(&self) -> &AbrOptions {
        &self.inner.options
    }
}

impl Drop for BandwidthEstimator {
    fn drop(&mut self) {
        self.inner.running.store(false, Ordering::Release);
        let ticker = self.inner.ticker.lock().take();
        if let Some(mut ticker) = ticker {
            ticker.stop();
        }
        // Running deliveries may hold the last reference to the state.
        self.inner.tasks.cancel_all();
    }
}

impl fmt::Debug for BandwidthEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandwidthEstimator")
            .field("running", &self.is_running())
            .field("last_suggested", &self.last_suggested_bandwidth())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
