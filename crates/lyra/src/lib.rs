#![forbid(unsafe_code)]

//! # Lyra
//!
//! Facade crate for the lyra adaptive bitrate engine.
//!
//! ## Quick start
//!
//! ```rust
//! # #[cfg(feature = "hls")]
//! # fn main() -> Result<(), lyra::hls::HlsError> {
//! use std::sync::Arc;
//!
//! use lyra::prelude::*;
//!
//! let variants = VariantSet::new([
//!     MediaPlaylist::variant("low.m3u8", 500_000),
//!     MediaPlaylist::variant("mid.m3u8", 1_500_000),
//!     MediaPlaylist::variant("high.m3u8", 4_000_000),
//! ])?;
//! let playback = SharedPlaybackState::new(PlaybackState::Starting);
//! let session = AdaptiveSession::new(
//!     HlsConfig::default().with_start_bitrate(1_500_000),
//!     variants,
//!     Arc::new(playback.clone()),
//! )?;
//! session.start()?;
//! playback.set(PlaybackState::Started);
//!
//! // The segment loader reports downloads to the estimator...
//! let id = session.estimator().begin_download(true);
//! session.estimator().progress(id, 512 * 1024, true);
//! session.estimator().complete(id, false, true);
//!
//! // ...and applies pending switches between segments.
//! let _applied = session.on_segment_boundary(StreamKind::Video);
//! session.stop();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "hls"))]
//! # fn main() {}
//! ```

// ── Re-export sub-crates ────────────────────────────────────────────────

pub mod abr {
    pub use lyra_abr::*;
}

pub mod platform {
    pub use lyra_platform::*;
}

#[cfg(feature = "hls")]
pub mod hls {
    pub use lyra_hls::*;
}

pub mod events;

// ── Prelude ─────────────────────────────────────────────────────────────

pub mod prelude {
    pub use lyra_abr::{
        AbrError, AbrOptions, BandwidthEstimator, BitrateSuggestion, EstimatorContext,
        PlaybackState, PlaybackStateSource, SharedPlaybackState, SuggestionDispatch,
        SuggestionHandler,
    };
    #[cfg(feature = "hls")]
    pub use lyra_hls::{
        AdaptiveSession, AppliedSwitch, HlsConfig, HlsError, MediaPlaylist, RenditionInfo,
        SwitchApprover, VariantSet,
    };

    #[cfg(feature = "hls")]
    pub use crate::events::{HlsEvent, StreamKind};
    pub use crate::events::{AbrEvent, Event, EventBus};
}
