//! Adaptive session: turns estimator suggestions into per-stream switches.

use std::{fmt, sync::Arc};

use lyra_abr::{
    BandwidthEstimator, BitrateSuggestion, EstimatorContext, PlaybackState, PlaybackStateSource,
};
use lyra_events::{EventBus, HlsEvent, StreamKind};
use lyra_platform::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::{
    AppliedSwitch, HlsConfig, HlsError, HlsResult, MediaPlaylist, SwitchCoordinator, SwitchKind,
    VariantSet,
};

/// Application hook consulted before a suggested switch is scheduled.
///
/// Runs synchronously on the delivering thread; setting `cancel` vetoes the
/// switch.
pub trait SwitchApprover: Send + Sync {
    fn approve(&self, suggestion: &BitrateSuggestion, cancel: &mut bool);
}

impl<F> SwitchApprover for F
where
    F: Fn(&BitrateSuggestion, &mut bool) + Send + Sync,
{
    fn approve(&self, suggestion: &BitrateSuggestion, cancel: &mut bool) {
        self(suggestion, cancel);
    }
}

#[derive(Debug)]
struct SessionState {
    active_bps: u32,
    bitrate_locked: bool,
    playback_rate: f64,
    min_allowed: Option<u32>,
    max_allowed: Option<u32>,
}

struct SessionInner {
    config: HlsConfig,
    estimator: BandwidthEstimator,
    variants: VariantSet,
    video: SwitchCoordinator,
    audio: SwitchCoordinator,
    playback: Arc<dyn PlaybackStateSource>,
    events: EventBus,
    state: Mutex<SessionState>,
    /// Serializes operations spanning both streams.
    switch_lock: ReentrantMutex<()>,
    approver: RwLock<Option<Arc<dyn SwitchApprover>>>,
}

impl SessionInner {
    fn coordinator(&self, kind: StreamKind) -> &SwitchCoordinator {
        match kind {
            StreamKind::Audio => &self.audio,
            StreamKind::Video => &self.video,
        }
    }

    fn active_bitrate(&self) -> u32 {
        self.state.lock().active_bps
    }

    fn reanchor(&self, bitrate: u32) {
        if self.estimator.last_suggested_bandwidth() != bitrate {
            self.estimator.set_last_suggested_bandwidth(bitrate);
        }
    }

    fn handle_suggestion(&self, suggestion: &BitrateSuggestion, cancel: &mut bool) {
        let bandwidth = suggestion.to_bps;
        let (cur, locked, rate, min_allowed, max_allowed) = {
            let s = self.state.lock();
            (
                s.active_bps,
                s.bitrate_locked,
                s.playback_rate,
                s.min_allowed,
                s.max_allowed,
            )
        };

        let playback = self.playback.playback_state();
        if !playback.accepts_suggestions() {
            debug!(?playback, to_bps = bandwidth, "suggestion ignored while not playing");
            self.reanchor(cur);
            return;
        }
        if min_allowed.is_some_and(|min| bandwidth < min)
            || max_allowed.is_some_and(|max| bandwidth > max)
            || (rate - 1.0).abs() > f64::EPSILON
        {
            debug!(
                to_bps = bandwidth,
                ?min_allowed,
                ?max_allowed,
                playback_rate = rate,
                "suggestion outside allowed playback conditions"
            );
            self.reanchor(cur);
            return;
        }

        let _guard = self.switch_lock.lock();
        let pending_video = self.video.pending_bitrate_switch();
        let pending_audio = self.audio.pending_bitrate_switch();

        if let Some(pending) = pending_video.as_ref().or(pending_audio.as_ref()) {
            let pending_bps = pending.target_bps();
            let cancellable = pending_video
                .as_ref()
                .map_or(pending_audio.is_some(), |v| !v.partner_applied());

            // A pending upshift is dropped once throughput no longer supports it.
            if !locked && bandwidth <= cur && pending_bps > cur && cancellable {
                self.try_cancel_pending_bitrate_switch(true);
                if bandwidth == cur {
                    return;
                }
            }
            // A higher suggestion waits for the pending switch; the next one
            // steps further.
            if locked || (bandwidth > pending_bps && pending_bps != cur) {
                debug!(to_bps = bandwidth, pending_bps, locked, "pending switch kept");
                self.reanchor(pending_bps);
                return;
            }
        } else if locked {
            debug!(to_bps = bandwidth, "bitrate locked");
            self.reanchor(cur);
            return;
        }

        let Some(target) = self
            .variants
            .get(bandwidth)
            .filter(|_| bandwidth != cur)
            .cloned()
        else {
            debug!(to_bps = bandwidth, active_bps = cur, "no switch needed");
            self.reanchor(cur);
            return;
        };

        info!(
            from_bps = cur,
            to_bps = bandwidth,
            last_measured_bps = suggestion.last_measured_bps,
            "suggesting bitrate switch"
        );
        self.events.publish(HlsEvent::BitrateSwitchSuggested {
            from_bps: cur,
            to_bps: bandwidth,
            last_measured_bps: suggestion.last_measured_bps,
        });

        let approver = self.approver.read().clone();
        if let Some(approver) = approver {
            approver.approve(suggestion, cancel);
            if *cancel {
                debug!(to_bps = bandwidth, "switch vetoed by application");
                self.reanchor(cur);
                return;
            }
        }

        let ignore_buffer = playback == PlaybackState::Buffering;
        for coordinator in [&self.video, &self.audio] {
            if !coordinator.is_selected() {
                continue;
            }
            if coordinator.is_on_alternate_rendition() {
                Self::retarget_main_track_return(coordinator, &target);
            } else {
                coordinator.schedule_switch(Some(&target), SwitchKind::Bitrate, ignore_buffer);
            }
        }
        self.reanchor(bandwidth);
    }

    /// Point a pending return from an alternate rendition at `variant`, so
    /// the stream rejoins the main track where the other stream is headed.
    fn retarget_main_track_return(coordinator: &SwitchCoordinator, variant: &Arc<MediaPlaylist>) {
        let returning = coordinator
            .pending_rendition_switch()
            .and_then(|p| p.target())
            .is_some_and(|t| !t.is_alternate_rendition() && !Arc::ptr_eq(&t, variant));
        if returning {
            debug!(
                stream = %coordinator.stream(),
                to_bps = variant.bandwidth(),
                "main track return retargeted"
            );
            coordinator.schedule_switch(Some(variant), SwitchKind::Rendition, false);
        }
    }

    fn try_cancel_pending_bitrate_switch(&self, force: bool) -> bool {
        let _guard = self.switch_lock.lock();
        let video = self.video.pending_bitrate_switch();
        let audio = self.audio.pending_bitrate_switch();
        if video.is_none() && audio.is_none() {
            return true;
        }
        if !force && audio.as_ref().is_some_and(|a| a.partner_applied()) {
            debug!("bitrate switch half applied, not cancelling");
            return false;
        }

        let target_bps = video.as_ref().or(audio.as_ref()).map_or(0, |p| p.target_bps());
        if video.is_some() {
            self.video.schedule_switch(None, SwitchKind::Bitrate, false);
        }
        if audio.is_some() {
            self.audio.schedule_switch(None, SwitchKind::Bitrate, false);
        }
        let cur = self.active_bitrate();
        self.reanchor(cur);
        if let Some(variant) = self.variants.get(cur) {
            for coordinator in [&self.video, &self.audio] {
                Self::retarget_main_track_return(coordinator, variant);
            }
        }
        info!(from_bps = cur, to_bps = target_bps, force, "pending bitrate switch cancelled");

        let playback = self.playback.playback_state();
        if matches!(
            playback,
            PlaybackState::Started | PlaybackState::Buffering | PlaybackState::Seeking
        ) {
            self.state.lock().bitrate_locked = false;
            self.events.publish(HlsEvent::BitrateSwitchCancelled {
                from_bps: cur,
                to_bps: target_bps,
            });
        }
        true
    }

    fn cancel_pending_rendition_switch(&self) {
        let _guard = self.switch_lock.lock();
        for coordinator in [&self.video, &self.audio] {
            if coordinator.pending_rendition_switch().is_some() {
                coordinator.schedule_switch(None, SwitchKind::Rendition, false);
                debug!(stream = %coordinator.stream(), "rendition switch cancelled");
            }
        }
    }

    fn on_segment_boundary(&self, kind: StreamKind) -> Vec<AppliedSwitch> {
        let _guard = self.switch_lock.lock();
        let applied = self.coordinator(kind).apply();
        for switch in &applied {
            if let AppliedSwitch::Bitrate { to_bps, .. } = *switch {
                self.state.lock().active_bps = to_bps;
                self.estimator.set_ignore_downshift_tolerance(false);
                self.estimator.set_last_suggested_bandwidth(to_bps);
                if kind == StreamKind::Video {
                    self.audio.mark_partner_applied();
                }
            }
        }
        applied
    }
}

/// Switch glue between a [`BandwidthEstimator`] and the audio and video
/// streams of one presentation.
///
/// The session owns the variant playlists, registers itself as the
/// estimator's suggestion handler and decides whether each suggestion
/// becomes a pending switch. Streams report segment boundaries through
/// [`AdaptiveSession::on_segment_boundary`], where pending switches take
/// effect.
pub struct AdaptiveSession {
    inner: Arc<SessionInner>,
}

impl AdaptiveSession {
    /// Create a session over `variants`.
    ///
    /// The initial variant is the one closest to
    /// [`HlsConfig::start_bitrate`], or the lowest.
    ///
    /// # Errors
    ///
    /// [`HlsError::NoVariants`] for an empty set, and [`HlsError::Abr`] when
    /// the allowed bitrate window leaves no variant.
    pub fn new(
        config: HlsConfig,
        variants: VariantSet,
        playback: Arc<dyn PlaybackStateSource>,
    ) -> HlsResult<Self> {
        if variants.is_empty() {
            return Err(HlsError::NoVariants);
        }
        let events = config
            .events
            .clone()
            .unwrap_or_else(|| EventBus::new(config.events_channel_capacity));

        let mut context = EstimatorContext::new(Arc::clone(&playback))
            .with_thread_pool(config.thread_pool.clone())
            .with_events(events.clone());
        if let Some(ref clock) = config.clock {
            context = context.with_clock(Arc::clone(clock));
        }
        let estimator = BandwidthEstimator::new(config.abr.clone(), context);
        estimator.set_bandwidth_range(&variants.bitrates())?;
        if config.min_allowed_bitrate.is_some() || config.max_allowed_bitrate.is_some() {
            estimator.set_bandwidth_bounds(
                config.min_allowed_bitrate.unwrap_or(0),
                config.max_allowed_bitrate.unwrap_or(u32::MAX),
            )?;
        }

        let initial = config
            .start_bitrate
            .map(|b| estimator.find_closest_bitrate(b, true))
            .and_then(|b| variants.get(b))
            .or_else(|| variants.lowest())
            .cloned()
            .ok_or(HlsError::NoVariants)?;
        estimator.set_last_suggested_bandwidth(initial.bandwidth());

        let video = SwitchCoordinator::new(StreamKind::Video, &initial).with_events(events.clone());
        let audio = SwitchCoordinator::new(StreamKind::Audio, &initial).with_events(events.clone());

        let inner = Arc::new(SessionInner {
            state: Mutex::new(SessionState {
                active_bps: initial.bandwidth(),
                bitrate_locked: false,
                playback_rate: 1.0,
                min_allowed: config.min_allowed_bitrate,
                max_allowed: config.max_allowed_bitrate,
            }),
            config,
            estimator,
            variants,
            video,
            audio,
            playback,
            events,
            switch_lock: ReentrantMutex::new(()),
            approver: RwLock::new(None),
        });

        let weak = Arc::downgrade(&inner);
        inner.estimator.set_suggestion_handler(Some(Arc::new(
            move |suggestion: &BitrateSuggestion, cancel: &mut bool| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_suggestion(suggestion, cancel);
                } else {
                    trace!("suggestion after session drop");
                }
            },
        )));

        debug!(
            variants = inner.variants.len(),
            initial_bps = inner.active_bitrate(),
            "adaptive session created"
        );
        Ok(Self { inner })
    }

    /// Start bandwidth monitoring.
    ///
    /// # Errors
    ///
    /// [`HlsError::Abr`] when the averaging timer cannot be started.
    pub fn start(&self) -> HlsResult<()> {
        self.inner.estimator.start()?;
        info!(active_bps = self.active_bitrate(), "adaptive session started");
        Ok(())
    }

    /// Stop monitoring and drop every pending switch.
    ///
    /// Blocks until in-flight suggestion deliveries finish, so it must not be
    /// called from a [`SwitchApprover`].
    pub fn stop(&self) {
        self.inner.estimator.stop();
        self.inner.try_cancel_pending_bitrate_switch(true);
        self.inner.cancel_pending_rendition_switch();
        info!("adaptive session stopped");
    }

    /// Decide what to do with a suggestion. The estimator calls this for
    /// every suggestion it raises.
    pub fn handle_suggestion(&self, suggestion: &BitrateSuggestion, cancel: &mut bool) {
        self.inner.handle_suggestion(suggestion, cancel);
    }

    /// A stream is about to fetch its next segment: apply its pending
    /// rendition switch, then its pending bitrate switch.
    pub fn on_segment_boundary(&self, kind: StreamKind) -> Vec<AppliedSwitch> {
        self.inner.on_segment_boundary(kind)
    }

    /// Drop pending bitrate switches on both streams.
    ///
    /// Returns false without changes when the video half of a switch already
    /// applied and `force` is false.
    pub fn try_cancel_pending_bitrate_switch(&self, force: bool) -> bool {
        self.inner.try_cancel_pending_bitrate_switch(force)
    }

    pub fn cancel_pending_rendition_switch(&self) {
        self.inner.cancel_pending_rendition_switch();
    }

    /// Schedule a switch of `kind` to an alternate rendition, or back to the
    /// active variant's own track with `None`.
    ///
    /// # Errors
    ///
    /// [`HlsError::NotStarted`] unless playing, and the rendition validation
    /// errors for a playlist of the wrong kind or group, or one the session
    /// does not own.
    pub fn request_rendition_switch(
        &self,
        kind: StreamKind,
        rendition: Option<&MediaPlaylist>,
    ) -> HlsResult<()> {
        let inner = &self.inner;
        if inner.playback.playback_state() != PlaybackState::Started {
            return Err(HlsError::NotStarted);
        }
        let active_bps = inner.active_bitrate();
        let variant = inner
            .variants
            .get(active_bps)
            .cloned()
            .ok_or(HlsError::UnknownVariant(active_bps))?;
        let coordinator = inner.coordinator(kind);

        let target = match rendition {
            None => {
                if !coordinator.is_on_alternate_rendition() {
                    return Ok(());
                }
                variant
            }
            Some(playlist) => {
                let info = playlist
                    .rendition_info()
                    .ok_or_else(|| HlsError::NotARendition(playlist.uri().to_owned()))?;
                if info.kind != kind {
                    return Err(HlsError::RenditionKindMismatch {
                        expected: kind,
                        actual: info.kind,
                    });
                }
                let group = variant.rendition_group(kind);
                if group != Some(info.group_id.as_str()) {
                    return Err(HlsError::RenditionGroupMismatch {
                        expected: group.map(str::to_owned),
                        actual: info.group_id.clone(),
                    });
                }
                let owned = inner
                    .variants
                    .find_rendition_by_uri(playlist.uri())
                    .cloned()
                    .ok_or_else(|| HlsError::UnknownRendition(playlist.uri().to_owned()))?;
                if coordinator.active().is_some_and(|a| Arc::ptr_eq(&a, &owned)) {
                    return Ok(());
                }
                owned
            }
        };

        if !coordinator.is_selected() {
            debug!(stream = %kind, "rendition switch on deselected stream ignored");
            return Ok(());
        }
        let _guard = inner.switch_lock.lock();
        coordinator.schedule_switch(Some(&target), SwitchKind::Rendition, false);
        Ok(())
    }

    /// Count a failed segment fetch on the pending bitrate switch of `kind`.
    ///
    /// Returns true when the failure exceeded
    /// [`HlsConfig::segment_try_limit`] and the pending switch was cancelled.
    pub fn on_switch_segment_failed(&self, kind: StreamKind) -> bool {
        let inner = &self.inner;
        let limit = inner.config.segment_try_limit;
        let Some(count) = inner.coordinator(kind).record_failed_attempt() else {
            return false;
        };
        if limit == 0 || count <= limit {
            debug!(stream = %kind, count, limit, "switch target segment failed");
            return false;
        }
        warn!(stream = %kind, count, limit, "switch target keeps failing, cancelling switch");
        inner.try_cancel_pending_bitrate_switch(true)
    }

    /// Playback entered buffering from `previous`.
    ///
    /// Call after the playback state reports
    /// [`PlaybackState::Buffering`]: the downshift evaluation is gated on it.
    pub fn on_buffering_started(&self, previous: PlaybackState) {
        let inner = &self.inner;
        if inner.config.abr.downshift_tolerance > 0.0 && inner.estimator.is_running() {
            inner.estimator.set_ignore_downshift_tolerance(true);
        }
        if inner.config.downshift_on_buffering && previous == PlaybackState::Started {
            let active = f64::from(inner.active_bitrate());
            debug!(active_bps = active, "buffering, evaluating downshift");
            inner
                .estimator
                .notify_bitrate_change_if_needed(active, active, 0.0);
        }
    }

    /// Pin the current bitrate; pending switches still complete.
    pub fn set_bitrate_lock(&self, locked: bool) {
        self.inner.state.lock().bitrate_locked = locked;
    }

    #[must_use]
    pub fn is_bitrate_locked(&self) -> bool {
        self.inner.state.lock().bitrate_locked
    }

    /// Suggestions are ignored unless the rate is exactly 1.0.
    pub fn set_playback_rate(&self, rate: f64) {
        self.inner.state.lock().playback_rate = rate;
    }

    #[must_use]
    pub fn playback_rate(&self) -> f64 {
        self.inner.state.lock().playback_rate
    }

    /// Restrict switching to `[min, max]`; `None` leaves a side open.
    ///
    /// # Errors
    ///
    /// [`HlsError::Abr`] when the window leaves no variant.
    pub fn set_allowed_bitrates(&self, min: Option<u32>, max: Option<u32>) -> HlsResult<()> {
        self.inner
            .estimator
            .set_bandwidth_bounds(min.unwrap_or(0), max.unwrap_or(u32::MAX))?;
        let mut state = self.inner.state.lock();
        state.min_allowed = min;
        state.max_allowed = max;
        Ok(())
    }

    #[must_use]
    pub fn allowed_bitrates(&self) -> (Option<u32>, Option<u32>) {
        let state = self.inner.state.lock();
        (state.min_allowed, state.max_allowed)
    }

    pub fn set_approver(&self, approver: Option<Arc<dyn SwitchApprover>>) {
        *self.inner.approver.write() = approver;
    }

    #[must_use]
    pub fn active_bitrate(&self) -> u32 {
        self.inner.active_bitrate()
    }

    #[must_use]
    pub fn active_variant(&self) -> Option<Arc<MediaPlaylist>> {
        self.inner.variants.get(self.active_bitrate()).cloned()
    }

    #[must_use]
    pub fn estimator(&self) -> &BandwidthEstimator {
        &self.inner.estimator
    }

    #[must_use]
    pub fn coordinator(&self, kind: StreamKind) -> &SwitchCoordinator {
        self.inner.coordinator(kind)
    }

    #[must_use]
    pub fn variants(&self) -> &VariantSet {
        &self.inner.variants
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    #[must_use]
    pub fn config(&self) -> &HlsConfig {
        &self.inner.config
    }
}

impl fmt::Debug for AdaptiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveSession")
            .field("state", &*self.inner.state.lock())
            .field("video", &self.inner.video)
            .field("audio", &self.inner.audio)
            .finish_non_exhaustive()
    }
}
