//! Loader configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// What to do when a reference run does not match the data run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePolicy {
    /// Fail the whole load.
    #[default]
    Abort,
    /// Warn and continue with the data run's own peak.
    Skip,
}

/// Configuration for loading MLZ NeXus runs.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Instrument names accepted by the loader.
    pub supported_instruments: Vec<String>,
    /// Length of one raw time tick in microseconds.
    pub tof_tick_us: f64,
    pub reference_policy: ReferencePolicy,
    /// Counts dataset, relative to the entry.
    pub data_path: String,
    /// Masked detector list, relative to the entry.
    pub pixel_mask_path: String,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            supported_instruments: vec!["TOFTOF".to_string(), "DNS".to_string()],
            tof_tick_us: 50.0e-3,
            reference_policy: ReferencePolicy::Abort,
            data_path: "data/data".to_string(),
            pixel_mask_path: "instrument/detector/pixel_mask".to_string(),
        }
    }
}

impl LoadConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open {}: {e}", path.as_ref().display()))
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the JSON is malformed or invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if !(self.tof_tick_us.is_finite() && self.tof_tick_us > 0.0) {
            return Err(Error::Config(format!(
                "tof_tick_us must be positive, got {}",
                self.tof_tick_us
            )));
        }
        if self.supported_instruments.is_empty() {
            return Err(Error::Config(
                "supported_instruments must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true if the instrument name is accepted.
    #[must_use]
    pub fn supports(&self, instrument: &str) -> bool {
        self.supported_instruments.iter().any(|name| name == instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoadConfig::default();
        assert!(config.supports("TOFTOF"));
        assert!(config.supports("DNS"));
        assert!(!config.supports("IN5"));
        assert_eq!(config.reference_policy, ReferencePolicy::Abort);
    }

    #[test]
    fn test_partial_json() {
        let config = LoadConfig::from_json(r#"{ "reference_policy": "skip" }"#).unwrap();
        assert_eq!(config.reference_policy, ReferencePolicy::Skip);
        assert!((config.tof_tick_us - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.data_path, "data/data");
    }

    #[test]
    fn test_invalid_tick_rejected() {
        let err = LoadConfig::from_json(r#"{ "tof_tick_us": 0.0 }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
