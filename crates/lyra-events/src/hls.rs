#![forbid(unsafe_code)]

use std::fmt;

/// Elementary stream a switch applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Audio,
    Video,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
        }
    }
}

/// Events emitted by an adaptive HLS session.
#[derive(Clone, Debug, PartialEq)]
pub enum HlsEvent {
    /// The session accepted a suggestion and is about to schedule it.
    BitrateSwitchSuggested {
        from_bps: u32,
        to_bps: u32,
        last_measured_bps: u32,
    },
    /// A bitrate switch is pending on a stream until its next segment boundary.
    BitrateSwitchScheduled {
        stream: StreamKind,
        from_bps: u32,
        to_bps: u32,
    },
    /// A pending bitrate switch took effect.
    BitrateSwitched {
        stream: StreamKind,
        from_bps: u32,
        to_bps: u32,
    },
    /// Pending bitrate switches were dropped before taking effect.
    BitrateSwitchCancelled { from_bps: u32, to_bps: u32 },
    /// A rendition switch is pending on a stream.
    RenditionSwitchScheduled { stream: StreamKind },
    /// A pending rendition switch took effect.
    RenditionSwitched { stream: StreamKind, name: String },
}
