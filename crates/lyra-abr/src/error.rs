use thiserror::Error;

/// Errors raised at the configuration boundary of the estimator.
///
/// Decisions themselves never fail: searches fall back to a playable bitrate.
#[derive(Debug, Error)]
pub enum AbrError {
    #[error("bitrate table is empty")]
    EmptyBitrateTable,

    #[error("invalid bandwidth bounds: min {min} is greater than max {max}")]
    InvalidBounds { min: u32, max: u32 },

    #[error("no bitrate in the table lies between {min} and {max}")]
    EmptyBoundsWindow { min: u32, max: u32 },

    #[error("failed to spawn the averaging timer: {0}")]
    Timer(#[from] std::io::Error),
}

pub type AbrResult<T> = Result<T, AbrError>;
