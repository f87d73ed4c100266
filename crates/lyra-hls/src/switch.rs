//! Per-stream switch requests applied at segment boundaries.

use std::sync::{Arc, Weak};

use lyra_events::{EventBus, HlsEvent, StreamKind};
use lyra_platform::Mutex;
use tracing::{debug, info, warn};

use crate::MediaPlaylist;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwitchKind {
    Bitrate,
    Rendition,
}

/// Snapshot of a pending switch request.
///
/// Holds non-owning handles: a request never keeps a playlist alive.
#[derive(Clone, Debug)]
pub struct PendingSwitch {
    target: Weak<MediaPlaylist>,
    from: Weak<MediaPlaylist>,
    target_bps: u32,
    from_bps: u32,
    ignore_buffer: bool,
    try_count: u32,
    partner_applied: bool,
}

impl PendingSwitch {
    fn new(target: &Arc<MediaPlaylist>, from: &Weak<MediaPlaylist>, ignore_buffer: bool) -> Self {
        Self {
            target: Arc::downgrade(target),
            from: from.clone(),
            target_bps: target.bandwidth(),
            from_bps: from.upgrade().map_or(0, |p| p.bandwidth()),
            ignore_buffer,
            try_count: 0,
            partner_applied: false,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<Arc<MediaPlaylist>> {
        self.target.upgrade()
    }

    #[must_use]
    pub fn from(&self) -> Option<Arc<MediaPlaylist>> {
        self.from.upgrade()
    }

    #[must_use]
    pub fn target_bps(&self) -> u32 {
        self.target_bps
    }

    #[must_use]
    pub fn from_bps(&self) -> u32 {
        self.from_bps
    }

    /// Switch without waiting for buffered content of the old playlist.
    #[must_use]
    pub fn ignore_buffer(&self) -> bool {
        self.ignore_buffer
    }

    /// Failed segment fetches on the target so far.
    #[must_use]
    pub fn try_count(&self) -> u32 {
        self.try_count
    }

    /// The partner stream (video, for an audio request) already switched.
    #[must_use]
    pub fn partner_applied(&self) -> bool {
        self.partner_applied
    }
}

/// A switch that took effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AppliedSwitch {
    Rendition { name: String },
    Bitrate { from_bps: u32, to_bps: u32 },
}

#[derive(Debug)]
struct SwitchState {
    active: Weak<MediaPlaylist>,
    selected: bool,
    bitrate: Option<PendingSwitch>,
    rendition: Option<PendingSwitch>,
}

impl SwitchState {
    fn slot(&mut self, kind: SwitchKind) -> &mut Option<PendingSwitch> {
        match kind {
            SwitchKind::Bitrate => &mut self.bitrate,
            SwitchKind::Rendition => &mut self.rendition,
        }
    }

    fn apply_rendition(&mut self, stream: StreamKind) -> Option<AppliedSwitch> {
        let request = self.rendition.take()?;
        let target = request.target()?;
        self.active = Arc::downgrade(&target);
        // A bitrate request made for the main track is stale once the stream
        // leaves it; the return to the main track picks the variant anew.
        if target.is_alternate_rendition()
            && let Some(dropped) = self.bitrate.take()
        {
            debug!(
                %stream,
                to_bps = dropped.target_bps,
                "bitrate switch dropped on alternate rendition"
            );
        }
        Some(AppliedSwitch::Rendition {
            name: target.label().to_owned(),
        })
    }

    fn apply_bitrate(&mut self, stream: StreamKind) -> Option<AppliedSwitch> {
        if self.bitrate.is_none() {
            return None;
        }
        let active = self.active.upgrade();
        // Alternate renditions follow the main track's switch.
        if active.as_ref().is_some_and(|p| p.is_alternate_rendition()) {
            return None;
        }
        let request = self.bitrate.take()?;
        let Some(target) = request.target() else {
            warn!(%stream, to_bps = request.target_bps, "bitrate switch target dropped");
            return None;
        };
        let from_bps = active.map_or(request.from_bps, |p| p.bandwidth());
        self.active = Arc::downgrade(&target);
        Some(AppliedSwitch::Bitrate {
            from_bps,
            to_bps: target.bandwidth(),
        })
    }
}

/// Pending-switch bookkeeping for one elementary stream.
///
/// At most one request of each [`SwitchKind`] is pending; scheduling another
/// replaces it. Requests take effect when the stream reaches its next
/// segment boundary and calls [`SwitchCoordinator::apply`]. Scheduling and
/// applying are serialized by a single lock per stream.
#[derive(Debug)]
pub struct SwitchCoordinator {
    stream: StreamKind,
    events: Option<EventBus>,
    state: Mutex<SwitchState>,
}

impl SwitchCoordinator {
    /// A selected coordinator reading from `active`.
    #[must_use]
    pub fn new(stream: StreamKind, active: &Arc<MediaPlaylist>) -> Self {
        Self {
            stream,
            events: None,
            state: Mutex::new(SwitchState {
                active: Arc::downgrade(active),
                selected: true,
                bitrate: None,
                rendition: None,
            }),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn stream(&self) -> StreamKind {
        self.stream
    }

    #[must_use]
    pub fn is_selected(&self) -> bool {
        self.state.lock().selected
    }

    /// A deselected stream never receives scheduled switches.
    pub fn set_selected(&self, selected: bool) {
        self.state.lock().selected = selected;
    }

    #[must_use]
    pub fn active(&self) -> Option<Arc<MediaPlaylist>> {
        self.state.lock().active.upgrade()
    }

    /// Bandwidth of the active playlist; 0 once it is gone or for an
    /// alternate rendition.
    #[must_use]
    pub fn active_bandwidth(&self) -> u32 {
        self.active().map_or(0, |p| p.bandwidth())
    }

    #[must_use]
    pub fn is_on_alternate_rendition(&self) -> bool {
        self.active().is_some_and(|p| p.is_alternate_rendition())
    }

    /// Store a request for `target`, replacing any pending one of the same
    /// kind. `None` clears the pending request.
    pub fn schedule_switch(
        &self,
        target: Option<&Arc<MediaPlaylist>>,
        kind: SwitchKind,
        ignore_buffer: bool,
    ) {
        let scheduled = {
            let mut state = self.state.lock();
            let request = target.map(|t| PendingSwitch::new(t, &state.active, ignore_buffer));
            let scheduled = request.as_ref().map(|r| (r.from_bps, r.target_bps));
            let replaced = std::mem::replace(state.slot(kind), request);
            if let (Some(old), Some(_)) = (replaced, scheduled) {
                debug!(
                    stream = %self.stream,
                    ?kind,
                    replaced_bps = old.target_bps,
                    "pending switch replaced"
                );
            }
            scheduled
        };

        match (kind, scheduled) {
            (_, None) => debug!(stream = %self.stream, ?kind, "pending switch cleared"),
            (SwitchKind::Bitrate, Some((from_bps, to_bps))) => {
                debug!(
                    stream = %self.stream,
                    from_bps,
                    to_bps,
                    ignore_buffer,
                    "bitrate switch scheduled"
                );
                self.publish(HlsEvent::BitrateSwitchScheduled {
                    stream: self.stream,
                    from_bps,
                    to_bps,
                });
            }
            (SwitchKind::Rendition, Some(_)) => {
                debug!(stream = %self.stream, "rendition switch scheduled");
                self.publish(HlsEvent::RenditionSwitchScheduled {
                    stream: self.stream,
                });
            }
        }
    }

    #[must_use]
    pub fn pending(&self, kind: SwitchKind) -> Option<PendingSwitch> {
        self.state.lock().slot(kind).clone()
    }

    #[must_use]
    pub fn pending_bitrate_switch(&self) -> Option<PendingSwitch> {
        self.pending(SwitchKind::Bitrate)
    }

    #[must_use]
    pub fn pending_rendition_switch(&self) -> Option<PendingSwitch> {
        self.pending(SwitchKind::Rendition)
    }

    /// Flag the pending bitrate request as half done. Returns false when
    /// nothing is pending.
    pub fn mark_partner_applied(&self) -> bool {
        let mut state = self.state.lock();
        let Some(request) = state.bitrate.as_mut() else {
            return false;
        };
        request.partner_applied = true;
        true
    }

    /// Count a failed segment fetch against the pending bitrate request and
    /// return the new count.
    pub fn record_failed_attempt(&self) -> Option<u32> {
        let mut state = self.state.lock();
        let request = state.bitrate.as_mut()?;
        request.try_count += 1;
        Some(request.try_count)
    }

    /// Take a pending rendition switch. No-op without one.
    pub fn apply_rendition_switch(&self) -> Option<AppliedSwitch> {
        let applied = self.state.lock().apply_rendition(self.stream);
        self.announce(applied.as_ref());
        applied
    }

    /// Take a pending bitrate switch. No-op without one, and on a stream
    /// reading an alternate rendition.
    pub fn apply_bitrate_switch(&self) -> Option<AppliedSwitch> {
        let applied = self.state.lock().apply_bitrate(self.stream);
        self.announce(applied.as_ref());
        applied
    }

    /// Segment boundary: apply the pending rendition switch, then the
    /// pending bitrate switch.
    pub fn apply(&self) -> Vec<AppliedSwitch> {
        let applied: Vec<_> = {
            let mut state = self.state.lock();
            [
                state.apply_rendition(self.stream),
                state.apply_bitrate(self.stream),
            ]
                .into_iter()
                .flatten()
                .collect()
        };
        for switch in &applied {
            self.announce(Some(switch));
        }
        applied
    }

    fn announce(&self, applied: Option<&AppliedSwitch>) {
        match applied {
            Some(AppliedSwitch::Bitrate { from_bps, to_bps }) => {
                info!(stream = %self.stream, from_bps, to_bps, "bitrate switched");
                self.publish(HlsEvent::BitrateSwitched {
                    stream: self.stream,
                    from_bps: *from_bps,
                    to_bps: *to_bps,
                });
            }
            Some(AppliedSwitch::Rendition { name }) => {
                info!(stream = %self.stream, name, "rendition switched");
                self.publish(HlsEvent::RenditionSwitched {
                    stream: self.stream,
                    name: name.clone(),
                });
            }
            None => {}
        }
    }

    fn publish(&self, event: HlsEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }
}
