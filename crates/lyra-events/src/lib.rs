#![forbid(unsafe_code)]

//! Unified event bus for the lyra adaptive streaming engine.

mod abr;
mod bus;
mod event;
mod hls;

pub use abr::AbrEvent;
pub use bus::EventBus;
pub use event::Event;
pub use hls::{HlsEvent, StreamKind};
