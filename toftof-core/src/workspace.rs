//! Output workspace: per-pixel spectra plus run metadata.

use crate::geometry::DetectorId;
use crate::kinematics::BinEdges;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One row of the output workspace.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Shared time-of-flight bin edges (microseconds).
    pub x: BinEdges,
    /// Counts per channel.
    pub y: Vec<f64>,
    /// Statistical error per channel.
    pub e: Vec<f64>,
    /// Detectors contributing to this spectrum.
    pub detector_ids: Vec<DetectorId>,
    /// Set once the spectrum has been masked.
    pub masked: bool,
}

impl Spectrum {
    /// Zeroes Y and E and flags the spectrum as masked.
    pub fn mask(&mut self) {
        self.y.iter_mut().for_each(|v| *v = 0.0);
        self.e.iter_mut().for_each(|v| *v = 0.0);
        self.masked = true;
    }

    /// Sum of the counts.
    #[must_use]
    pub fn total_counts(&self) -> f64 {
        self.y.iter().sum()
    }
}

/// A run property value.
///
/// `Display` renders the value as stored in the metadata store: text as-is,
/// numbers as decimal text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl fmt::Display for LogValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogValue::Integer(v) => write!(f, "{v}"),
            LogValue::Number(v) => write!(f, "{v}"),
            LogValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for LogValue {
    fn from(value: i64) -> Self {
        LogValue::Integer(value)
    }
}

impl From<f64> for LogValue {
    fn from(value: f64) -> Self {
        LogValue::Number(value)
    }
}

impl From<String> for LogValue {
    fn from(value: String) -> Self {
        LogValue::Text(value)
    }
}

impl From<&str> for LogValue {
    fn from(value: &str) -> Self {
        LogValue::Text(value.to_string())
    }
}

/// Scalar run properties keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunProperties {
    values: BTreeMap<String, LogValue>,
}

impl RunProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or overwrites a property.
    pub fn add(&mut self, name: &str, value: impl Into<LogValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LogValue> {
        self.values.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Property rendered as text.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.values.get(name).map(ToString::to_string)
    }

    /// Property as an integer, parsing text values when needed.
    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            LogValue::Integer(v) => Some(*v),
            LogValue::Number(_) => None,
            LogValue::Text(v) => v.trim().parse().ok(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LogValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Time-binned dataset: one spectrum per detector pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    /// Edges shared by every spectrum.
    pub bin_edges: BinEdges,
    pub spectra: Vec<Spectrum>,
    pub run: RunProperties,
    pub title: String,
    pub sample_name: String,
    pub instrument_name: String,
    pub x_unit: String,
    pub y_unit_label: String,
}

impl Workspace {
    /// Creates a workspace around populated spectra.
    #[must_use]
    pub fn new(bin_edges: BinEdges, spectra: Vec<Spectrum>) -> Self {
        Self {
            bin_edges,
            spectra,
            run: RunProperties::new(),
            title: String::new(),
            sample_name: String::new(),
            instrument_name: String::new(),
            x_unit: "TOF".to_string(),
            y_unit_label: "Counts".to_string(),
        }
    }

    #[must_use]
    pub fn number_of_histograms(&self) -> usize {
        self.spectra.len()
    }

    /// Number of bins per spectrum.
    #[must_use]
    pub fn blocksize(&self) -> usize {
        self.bin_edges.bins()
    }

    /// Indices of masked spectra.
    #[must_use]
    pub fn masked_indices(&self) -> Vec<usize> {
        self.spectra
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.masked.then_some(i))
            .collect()
    }
}
