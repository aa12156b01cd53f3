//! Error types for toftof-core.

use thiserror::Error;

/// Result type alias for toftof operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for loading and calibrating a run.
#[derive(Error, Debug)]
pub enum Error {
    /// The counts array is not a non-degenerate 3-D array.
    #[error("invalid counts shape {shape:?}: {reason}")]
    DataShape { shape: Vec<usize>, reason: String },

    /// The reference (vanadium) run was not collected under the same conditions.
    #[error("reference and data were not collected in the same conditions: {0}")]
    IncompatibleReference(String),

    /// Physically invalid kinematic parameter.
    #[error("invalid kinematics: {0}")]
    InvalidKinematics(String),

    /// A required field is absent from the data source.
    #[error("missing field: {0}")]
    MissingField(String),

    /// A field exists but holds an unexpected type or value.
    #[error("invalid field {path}: {reason}")]
    InvalidField { path: String, reason: String },

    /// The instrument named in the file is not handled by this loader.
    #[error("the instrument {0} is not valid for this loader")]
    UnsupportedInstrument(String),

    /// Instrument geometry error.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidField`].
    pub fn invalid_field(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
