#![forbid(unsafe_code)]

//! Re-export unified events from lyra-events.

#[cfg(feature = "hls")]
pub use lyra_events::{HlsEvent, StreamKind};
pub use lyra_events::{AbrEvent, Event, EventBus};
