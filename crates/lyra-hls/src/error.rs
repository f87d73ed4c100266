#![forbid(unsafe_code)]

use lyra_abr::AbrError;
use lyra_events::StreamKind;
use thiserror::Error;

/// Adaptive session errors.
#[derive(Debug, Error)]
pub enum HlsError {
    #[error("ABR error: {0}")]
    Abr(#[from] AbrError),

    #[error("Variant set is empty")]
    NoVariants,

    #[error("Variant not found: {0} bps")]
    UnknownVariant(u32),

    #[error("Rendition not found: {0}")]
    UnknownRendition(String),

    #[error("Playlist is not an alternate rendition: {0}")]
    NotARendition(String),

    #[error("Rendition kind mismatch: requested {expected}, playlist is {actual}")]
    RenditionKindMismatch {
        expected: StreamKind,
        actual: StreamKind,
    },

    #[error("Rendition group {actual} does not belong to the active variant (expects {expected:?})")]
    RenditionGroupMismatch {
        expected: Option<String>,
        actual: String,
    },

    #[error("Session is not started")]
    NotStarted,
}

pub type HlsResult<T> = Result<T, HlsError>;
