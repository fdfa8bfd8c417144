//! Error types shared by the library.

use thiserror::Error;

/// Errors surfaced by loading, building and persisting marblie content.
///
/// Interactive conditions (missing plane hits, exhausted light pool,
/// unknown persisted track types) are not errors; they degrade in place.
#[derive(Debug, Error)]
pub enum MarblieError {
    #[error("asset `{name}` failed to load: {reason}")]
    Asset { name: String, reason: String },
    #[error("asset `{0}` was not preloaded")]
    MissingAsset(String),
    #[error("layout error: {0}")]
    Layout(#[from] serde_json::Error),
    #[error("geometry error: {0}")]
    Geometry(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid config: {0}")]
    Config(String),
}

pub type Result<T, E = MarblieError> = std::result::Result<T, E>;
