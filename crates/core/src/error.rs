//! Error types for SAAG runs

use thiserror::Error;

/// Run-level error taxonomy.
///
/// Per-scene fetch failures are not represented here: the loader absorbs them
/// as skipped acquisitions and the run carries on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid {field} '{value}': {reason}")]
    Configuration {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("catalog unavailable for query [{query}]: {reason}")]
    CatalogUnavailable { query: String, reason: String },

    #[error("no scenes found for query [{query}]")]
    NoScenesFound { query: String },

    #[error("none of the {attempted} scenes could be loaded ({})", reasons.join("; "))]
    NoUsableScenes {
        attempted: usize,
        reasons: Vec<String>,
    },

    #[error("no known RED/NIR band convention matches asset keys {observed:?}")]
    BandNotFound { observed: Vec<String> },

    #[error("series is empty after processing {scenes} scenes")]
    EmptySeries { scenes: usize },

    #[error("invalid series: {0}")]
    InvalidSeries(String),

    #[error("run cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] error.
    pub fn config(field: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Configuration {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller may substitute a synthetic series for this failure.
    ///
    /// Malformed input, unrecognized band vocabularies and empty post-processing
    /// results are always fatal.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::CatalogUnavailable { .. }
                | Error::NoScenesFound { .. }
                | Error::NoUsableScenes { .. }
        )
    }
}

/// Result type alias for SAAG operations
pub type Result<T> = std::result::Result<T, Error>;
