//! Segment-boundary switching for adaptive HLS playback.
//!
//! An [`AdaptiveSession`] owns the [`VariantSet`] of one presentation and a
//! [`lyra_abr::BandwidthEstimator`]. Suggestions raised by the estimator are
//! filtered by the session (playback state, allowed bitrates, playback rate,
//! bitrate lock, pending switches, application approval) and become pending
//! switches on the audio and video [`SwitchCoordinator`]s. A stream applies
//! its pending switch when it reaches its next segment boundary.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lyra_abr::{PlaybackState, SharedPlaybackState};
//! use lyra_events::StreamKind;
//! use lyra_hls::{AdaptiveSession, HlsConfig, MediaPlaylist, VariantSet};
//!
//! let variants = VariantSet::new([
//!     MediaPlaylist::variant("low.m3u8", 800_000),
//!     MediaPlaylist::variant("high.m3u8", 3_000_000),
//! ])
//! .unwrap();
//! let playback = SharedPlaybackState::new(PlaybackState::Started);
//! let session = AdaptiveSession::new(HlsConfig::default(), variants, Arc::new(playback)).unwrap();
//! assert_eq!(session.active_bitrate(), 800_000);
//! assert!(session.on_segment_boundary(StreamKind::Video).is_empty());
//! ```

#![forbid(unsafe_code)]

mod config;
mod error;
mod playlist;
mod session;
mod switch;

pub use config::{AbrOptions, HlsConfig};
pub use error::{HlsError, HlsResult};
pub use playlist::{MediaPlaylist, RenditionInfo, VariantSet};
pub use session::{AdaptiveSession, SwitchApprover};
pub use switch::{AppliedSwitch, PendingSwitch, SwitchCoordinator, SwitchKind};
