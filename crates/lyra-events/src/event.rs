#![forbid(unsafe_code)]

use crate::{AbrEvent, HlsEvent};

/// Unified event for the adaptive streaming engine.
///
/// Hierarchical: each subsystem has its own variant with a sub-enum.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Bandwidth estimator event.
    Abr(AbrEvent),
    /// Session / switch coordination event.
    Hls(HlsEvent),
}

impl From<AbrEvent> for Event {
    fn from(e: AbrEvent) -> Self {
        Self::Abr(e)
    }
}

impl From<HlsEvent> for Event {
    fn from(e: HlsEvent) -> Self {
        Self::Hls(e)
    }
}
