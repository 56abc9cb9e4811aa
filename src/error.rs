// Error types for the player library.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// yt-dlp produced no usable URL for a track the user asked to play.
    #[error("stream resolution failed for {id}: {reason}")]
    Resolve { id: String, reason: String },

    /// An in-flight resolution was canceled on purpose (e.g. closing the
    /// video overlay). Never surfaced to the user as a failure.
    #[error("stream resolution canceled")]
    Canceled,

    #[error("catalog request failed: {0}")]
    Catalog(String),

    /// The stream resolved but the sink could not start it (download,
    /// decode, or device failure).
    #[error("audio playback failed: {0}")]
    Audio(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("preference store: {0}")]
    Store(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
