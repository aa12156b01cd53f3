//! Detector masking from the file's masked-pixel list.

use log::{debug, warn};
use toftof_core::{DataSource, DetectorId, Error, InstrumentGeometry, LoadWarning, Result, Workspace};

/// Detector identifiers flagged as masked in the data file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedDetectorSet {
    ids: Vec<DetectorId>,
}

impl MaskedDetectorSet {
    /// Creates a set from identifiers, kept in file order.
    #[must_use]
    pub fn new(ids: Vec<DetectorId>) -> Self {
        Self { ids }
    }

    /// Reads the masked-pixel list at `path`. A missing list is an empty set.
    ///
    /// # Errors
    /// Returns [`Error::InvalidField`] if the list exists but is
    /// not an integer array or holds identifiers outside the `i32` range.
    pub fn from_source(source: &dyn DataSource, path: &str) -> Result<Self> {
        if !source.contains(path) {
            debug!("no masked detector list at {path}");
            return Ok(Self::default());
        }
        let ids = source
            .read_int_array(path)?
            .into_iter()
            .map(|id| {
                i32::try_from(id)
                    .map(DetectorId)
                    .map_err(|_| Error::invalid_field(path, format!("detector id {id} out of range")))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!("number of masked detectors: {}", ids.len());
        Ok(Self { ids })
    }

    /// Identifiers in file order.
    pub fn iter(&self) -> impl Iterator<Item = DetectorId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no detector is listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Marks the listed detectors masked, then masks every spectrum whose
/// detectors are all masked.
///
/// Flags left on `geometry` by an earlier run are cleared first, so only `set`
/// decides which detectors end up masked. Unknown identifiers are skipped with
/// one warning each.
pub fn apply_detector_mask(
    set: &MaskedDetectorSet,
    geometry: &mut dyn InstrumentGeometry,
    workspace: &mut Workspace,
) -> Vec<LoadWarning> {
    let mut warnings = Vec::new();
    geometry.clear_masks();
    for id in set.iter() {
        match geometry.resolve_detector(id) {
            Ok(component) => geometry.set_masked(component, true),
            Err(err) => {
                let warning = LoadWarning::UnknownDetector {
                    id,
                    reason: err.to_string(),
                };
                warn!("{warning}");
                warnings.push(warning);
            }
        }
    }

    let mut masked = 0_usize;
    for (index, spectrum) in workspace.spectra.iter_mut().enumerate() {
        if geometry.all_detectors_masked(index) {
            spectrum.mask();
            masked += 1;
        }
    }
    debug!("masked {masked} spectra");
    warnings
}
