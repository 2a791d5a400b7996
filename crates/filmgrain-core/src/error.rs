//! Error taxonomy for the grain pipeline.

/// Errors reported by the film grain core.
///
/// Numeric overshoot in curves and blending is never an error: it is clamped
/// where it occurs. Only precondition failures and database loading reach
/// the caller.
#[derive(Debug, thiserror::Error)]
pub enum FilmGrainError {
    #[error("invalid image: {width}x{height}x{channels} with {len} bytes")]
    InvalidImage {
        width: u32,
        height: u32,
        channels: u8,
        len: usize,
    },
    #[error("invalid grain parameters: {0}")]
    InvalidParams(String),
    #[error("film stock not found: {0}")]
    StockNotFound(String),
    #[error("invalid film stock {id}: {reason}")]
    InvalidStock { id: String, reason: String },
    #[error("failed to parse film stock JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render cancelled")]
    Cancelled,
    #[error("render worker panicked")]
    WorkerPanicked,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FilmGrainError>;
