//! Bandwidth estimation and bitrate decisions for adaptive streaming.
//!
//! The [`BandwidthEstimator`] measures the throughput of segment downloads,
//! including several downloads running at once, and maps it through a
//! [`BitratePolicy`] onto a table of available bitrates. When the decision
//! changes, the registered [`SuggestionHandler`] receives a
//! [`BitrateSuggestion`].
//!
//! ## Decision policy
//!
//! - Upshift only when the measurement exceeds the candidate padded by
//!   [`AbrOptions::upshift_padding`], either greedily or one step at a time.
//! - Downshift to the entry just below the highest padded entry the
//!   measurement still covers.
//! - Ignore dips inside a tolerance band below the current anchor unless the
//!   consumer is buffering.
//! - Suppress upshifts on volatile averaged measurements.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use lyra_abr::{
//!     AbrOptions, BandwidthEstimator, BitrateSuggestion, EstimatorContext, PlaybackState,
//!     SharedPlaybackState, SuggestionDispatch,
//! };
//!
//! let playback = SharedPlaybackState::new(PlaybackState::Started);
//! let estimator = BandwidthEstimator::new(
//!     AbrOptions::default().with_dispatch(SuggestionDispatch::Sync),
//!     EstimatorContext::new(Arc::new(playback)),
//! );
//! estimator
//!     .set_bandwidth_range(&[500_000, 1_000_000, 2_000_000, 4_000_000])
//!     .unwrap();
//! estimator.set_suggestion_handler(Some(Arc::new(
//!     |s: &BitrateSuggestion, _cancel: &mut bool| println!("switch to {}", s.to_bps),
//! )));
//!
//! let suggestion = estimator.notify_bitrate_change_if_needed(2_800_000.0, 2_800_000.0, 0.0);
//! assert_eq!(suggestion.map(|s| s.to_bps), Some(2_000_000));
//! ```

#![forbid(unsafe_code)]

mod clock;
mod error;
mod estimator;
mod history;
mod options;
mod playback;
mod policy;
mod suggestion;
mod tracker;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{AbrError, AbrResult};
pub use estimator::{BandwidthEstimator, EstimatorContext};
pub use history::{BitrateHistory, HistorySummary};
pub use options::{AbrOptions, SuggestionDispatch};
#[cfg(test)]
pub use playback::MockPlaybackStateSource;
pub use playback::{PlaybackState, PlaybackStateSource, SharedPlaybackState};
pub use policy::BitratePolicy;
pub use suggestion::{BitrateSuggestion, SuggestionHandler};
pub use tracker::{DownloadEntry, DownloadId, DownloadSample, DownloadTracker};
