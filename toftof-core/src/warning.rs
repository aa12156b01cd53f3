//! Recoverable conditions raised while loading a run.

use crate::geometry::DetectorId;
use thiserror::Error;

/// A condition that was absorbed without aborting the run.
///
/// Every warning is also emitted through `log::warn!` where it is raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadWarning {
    /// Peak search degenerated; the declared position was used instead.
    #[error("no usable elastic peak found, assuming the declared position {declared}")]
    DegeneratePeak { declared: i64 },
    /// A masked detector identifier could not be resolved.
    #[error("cannot mask detector {id}: {reason}")]
    UnknownDetector { id: DetectorId, reason: String },
    /// The reference run was rejected and the primary peak kept.
    #[error("reference run ignored: {reason}")]
    ReferenceIgnored { reason: String },
    /// A reference workspace carried no `EPP` property.
    #[error("no EPP property in the reference workspace")]
    MissingReferencePeak,
    /// A timestamp could not be converted to ISO-8601.
    #[error("cannot parse {field} timestamp {value:?}")]
    UnparsableDate { field: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let warning = LoadWarning::UnknownDetector {
            id: DetectorId(99_999),
            reason: "not found".to_string(),
        };
        assert_eq!(warning.to_string(), "cannot mask detector 99999: not found");
        assert_eq!(
            LoadWarning::DegeneratePeak { declared: 7 }.to_string(),
            "no usable elastic peak found, assuming the declared position 7"
        );
    }
}
