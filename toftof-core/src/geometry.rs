//! Instrument geometry collaborator.
//!
//! The loader only needs a narrow view of the instrument: flight paths,
//! detector lookup by identifier, a per-detector mask flag and the
//! spectrum-to-detector mapping. [`InstrumentGeometry`] captures that view;
//! [`TubeInstrument`] is a concrete tube-array implementation that can be
//! loaded from a small JSON definition.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Detector identifier as stored in the data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectorId(pub i32);

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a resolved geometry component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentId(pub usize);

/// Geometry queries used while loading a run.
pub trait InstrumentGeometry {
    /// Instrument name.
    fn name(&self) -> &str;

    /// Source to sample distance (m).
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] if the distance cannot be determined.
    fn l1(&self) -> Result<f64>;

    /// Named numeric instrument parameter.
    fn parameter(&self, name: &str) -> Option<f64>;

    /// Resolves a detector identifier to a component.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] if no detector carries the identifier.
    fn resolve_detector(&self, id: DetectorId) -> Result<ComponentId>;

    /// Sample to detector distance (m).
    fn detector_to_sample_distance(&self, component: ComponentId) -> f64;

    /// Sets the masked flag of a detector.
    fn set_masked(&mut self, component: ComponentId, masked: bool);

    /// Returns the masked flag of a detector.
    fn is_masked(&self, component: ComponentId) -> bool;

    /// Clears the masked flag of every detector.
    fn clear_masks(&mut self);

    /// Number of spectra the mapping describes.
    fn number_of_spectra(&self) -> usize;

    /// Detectors contributing to a spectrum. Empty when none are mapped.
    fn spectrum_detectors(&self, spectrum_index: usize) -> &[DetectorId];

    /// Returns true if at least one detector is mapped to the spectrum.
    fn has_detectors(&self, spectrum_index: usize) -> bool {
        !self.spectrum_detectors(spectrum_index).is_empty()
    }

    /// Returns true if the spectrum has detectors and every one is masked.
    fn all_detectors_masked(&self, spectrum_index: usize) -> bool {
        let ids = self.spectrum_detectors(spectrum_index);
        !ids.is_empty()
            && ids.iter().all(|&id| {
                self.resolve_detector(id)
                    .is_ok_and(|component| self.is_masked(component))
            })
    }
}

/// A single detector pixel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorDefinition {
    pub id: DetectorId,
    pub position: [f64; 3],
}

/// Regular tube array on a vertical cylinder centred on the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TubeLayout {
    pub tubes: usize,
    pub pixels_per_tube: usize,
    /// Sample to tube distance (m).
    pub radius: f64,
    /// Scattering angle of the first tube (degrees).
    pub start_angle_deg: f64,
    /// Angular step between tubes (degrees).
    pub step_angle_deg: f64,
    /// Vertical spacing between pixels (m).
    pub pixel_height: f64,
    pub first_id: i32,
}

impl Default for TubeLayout {
    fn default() -> Self {
        Self {
            tubes: 0,
            pixels_per_tube: 0,
            radius: 4.0,
            start_angle_deg: 7.5,
            step_angle_deg: 0.5,
            pixel_height: 0.0,
            first_id: 1,
        }
    }
}

impl TubeLayout {
    /// Detector positions, tube-major.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn detectors(&self) -> Vec<DetectorDefinition> {
        let mut detectors = Vec::with_capacity(self.tubes * self.pixels_per_tube);
        let centre = (self.pixels_per_tube as f64 - 1.0) / 2.0;
        for tube in 0..self.tubes {
            let angle = (self.start_angle_deg + self.step_angle_deg * tube as f64).to_radians();
            for pixel in 0..self.pixels_per_tube {
                let index = tube * self.pixels_per_tube + pixel;
                detectors.push(DetectorDefinition {
                    id: DetectorId(self.first_id + index as i32),
                    position: [
                        self.radius * angle.sin(),
                        (pixel as f64 - centre) * self.pixel_height,
                        self.radius * angle.cos(),
                    ],
                });
            }
        }
        detectors
    }
}

/// JSON instrument definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentDefinition {
    pub name: String,
    pub source: [f64; 3],
    pub sample: [f64; 3],
    pub parameters: BTreeMap<String, f64>,
    pub layout: Option<TubeLayout>,
    pub detectors: Vec<DetectorDefinition>,
    /// Spectrum to detector mapping; defaults to one detector per spectrum in
    /// definition order.
    pub spectra: Option<Vec<Vec<DetectorId>>>,
}

impl Default for InstrumentDefinition {
    fn default() -> Self {
        Self {
            name: "TOFTOF".to_string(),
            source: [0.0, 0.0, -10.0],
            sample: [0.0, 0.0, 0.0],
            parameters: BTreeMap::new(),
            layout: None,
            detectors: Vec::new(),
            spectra: None,
        }
    }
}

impl InstrumentDefinition {
    /// Load a definition from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::Config(format!("cannot open {}: {e}", path.as_ref().display()))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Load a definition from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Tube-array instrument with a detector-state table.
#[derive(Debug, Clone)]
pub struct TubeInstrument {
    name: String,
    source: [f64; 3],
    sample: [f64; 3],
    parameters: BTreeMap<String, f64>,
    detectors: Vec<DetectorDefinition>,
    index: HashMap<DetectorId, usize>,
    masked: Vec<bool>,
    spectra: Vec<Vec<DetectorId>>,
}

impl TubeInstrument {
    /// Builds the instrument, expanding the tube layout if present.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] on duplicate detector identifiers.
    pub fn from_definition(definition: InstrumentDefinition) -> Result<Self> {
        let mut detectors = definition
            .layout
            .as_ref()
            .map(TubeLayout::detectors)
            .unwrap_or_default();
        detectors.extend(definition.detectors);

        let mut index = HashMap::with_capacity(detectors.len());
        for (i, det) in detectors.iter().enumerate() {
            if index.insert(det.id, i).is_some() {
                return Err(Error::Geometry(format!("duplicate detector id {}", det.id)));
            }
        }

        let spectra = definition
            .spectra
            .unwrap_or_else(|| detectors.iter().map(|d| vec![d.id]).collect());

        Ok(Self {
            name: definition.name,
            source: definition.source,
            sample: definition.sample,
            parameters: definition.parameters,
            masked: vec![false; detectors.len()],
            detectors,
            index,
            spectra,
        })
    }

    /// Tube array with source at `-l1` on the beam axis and tubes at radius `l2`.
    ///
    /// # Errors
    /// Returns [`Error::Geometry`] if the layout is inconsistent.
    pub fn cylindrical(
        name: &str,
        l1: f64,
        l2: f64,
        tubes: usize,
        pixels_per_tube: usize,
    ) -> Result<Self> {
        Self::from_definition(InstrumentDefinition {
            name: name.to_string(),
            source: [0.0, 0.0, -l1],
            layout: Some(TubeLayout {
                tubes,
                pixels_per_tube,
                radius: l2,
                ..TubeLayout::default()
            }),
            ..InstrumentDefinition::default()
        })
    }

    /// Replaces the spectrum-to-detector mapping.
    #[must_use]
    pub fn with_spectrum_mapping(mut self, spectra: Vec<Vec<DetectorId>>) -> Self {
        self.spectra = spectra;
        self
    }

    /// Sets a named instrument parameter.
    pub fn set_parameter(&mut self, name: &str, value: f64) {
        self.parameters.insert(name.to_string(), value);
    }

    #[must_use]
    pub fn number_of_detectors(&self) -> usize {
        self.detectors.len()
    }

    /// Identifiers of masked detectors, in definition order.
    #[must_use]
    pub fn masked_detectors(&self) -> Vec<DetectorId> {
        self.detectors
            .iter()
            .zip(&self.masked)
            .filter_map(|(d, &m)| m.then_some(d.id))
            .collect()
    }
}

fn distance(a: [f64; 3], b: [f64; 3]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

impl InstrumentGeometry for TubeInstrument {
    fn name(&self) -> &str {
        &self.name
    }

    fn l1(&self) -> Result<f64> {
        let l1 = distance(self.source, self.sample);
        if l1 > 0.0 {
            Ok(l1)
        } else {
            Err(Error::Geometry("source and sample coincide".to_string()))
        }
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    fn resolve_detector(&self, id: DetectorId) -> Result<ComponentId> {
        self.index
            .get(&id)
            .map(|&i| ComponentId(i))
            .ok_or_else(|| Error::Geometry(format!("detector with id {id} not found")))
    }

    fn detector_to_sample_distance(&self, component: ComponentId) -> f64 {
        distance(self.detectors[component.0].position, self.sample)
    }

    fn set_masked(&mut self, component: ComponentId, masked: bool) {
        self.masked[component.0] = masked;
    }

    fn is_masked(&self, component: ComponentId) -> bool {
        self.masked[component.0]
    }

    fn clear_masks(&mut self) {
        self.masked.fill(false);
    }

    fn number_of_spectra(&self) -> usize {
        self.spectra.len()
    }

    fn spectrum_detectors(&self, spectrum_index: usize) -> &[DetectorId] {
        self.spectra.get(spectrum_index).map_or(&[][..], Vec::as_slice)
    }
}
