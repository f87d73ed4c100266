use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

#[cfg(test)]
use mockall::automock;

/// Consumer (media pipeline) state as seen by the estimator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    Opening,
    Starting,
    Started,
    Stopped,
    Paused,
    Buffering,
    Seeking,
    Error,
    #[default]
    Uninitialized,
}

impl PlaybackState {
    const ALL: [Self; 9] = [
        Self::Opening,
        Self::Starting,
        Self::Started,
        Self::Stopped,
        Self::Paused,
        Self::Buffering,
        Self::Seeking,
        Self::Error,
        Self::Uninitialized,
    ];

    /// Suggestions are only acted on while playing or rebuffering.
    #[must_use]
    pub fn accepts_suggestions(self) -> bool {
        matches!(self, Self::Started | Self::Buffering)
    }

    fn from_u8(raw: u8) -> Self {
        Self::ALL
            .get(usize::from(raw))
            .copied()
            .unwrap_or(Self::Uninitialized)
    }
}

/// Read-only view of the consumer state.
///
/// The engine never mutates playback state; it only gates on it.
#[cfg_attr(test, automock)]
pub trait PlaybackStateSource: Send + Sync {
    fn playback_state(&self) -> PlaybackState;
}

/// Lock-free shared playback state, for pipelines that push state changes.
#[derive(Clone, Debug)]
pub struct SharedPlaybackState {
    state: Arc<AtomicU8>,
}

impl SharedPlaybackState {
    #[must_use]
    pub fn new(initial: PlaybackState) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(initial as u8)),
        }
    }

    /// Store `state` and return the previous value.
    pub fn set(&self, state: PlaybackState) -> PlaybackState {
        PlaybackState::from_u8(self.state.swap(state as u8, Ordering::AcqRel))
    }

    #[must_use]
    pub fn get(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Default for SharedPlaybackState {
    fn default() -> Self {
        Self::new(PlaybackState::default())
    }
}

impl PlaybackStateSource for SharedPlaybackState {
    fn playback_state(&self) -> PlaybackState {
        self.get()
    }
}
