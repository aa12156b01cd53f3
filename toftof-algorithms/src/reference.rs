//! Reference (vanadium) run handling.
//!
//! A reference run recorded under the same conditions as the data run gives a
//! cleaner elastic peak. It is accepted only if the wavelength matches exactly
//! and the counts have the same (tubes, pixels, channels) shape.

use crate::peak::{locate_elastic_peak, PeakSearch};
use log::{debug, info};
use toftof_core::{CountsArray, CountsShape, DataSource, Error, Result, Workspace};

/// Acquisition conditions a reference run must reproduce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunShape {
    /// Incident wavelength (angstrom).
    pub wavelength: f64,
    /// Counts dimensions.
    pub shape: CountsShape,
}

/// Checks that a reference run was collected under the primary run's conditions.
///
/// # Errors
/// Returns [`Error::IncompatibleReference`] naming the first mismatch.
#[allow(clippy::float_cmp)]
pub fn check_compatibility(primary: &RunShape, reference: &RunShape) -> Result<()> {
    if primary.wavelength != reference.wavelength {
        return Err(Error::IncompatibleReference(format!(
            "wavelength {} differs from {}",
            reference.wavelength, primary.wavelength
        )));
    }
    if primary.shape != reference.shape {
        let (p, r) = (primary.shape, reference.shape);
        return Err(Error::IncompatibleReference(format!(
            "counts shape ({}, {}, {}) differs from ({}, {}, {})",
            r.tubes, r.pixels_per_tube, r.channels, p.tubes, p.pixels_per_tube, p.channels
        )));
    }
    Ok(())
}

/// Validates a reference run file and searches its elastic peak.
///
/// The wavelength and declared counts shape are compared before the counts
/// are loaded.
///
/// # Errors
/// Returns [`Error::IncompatibleReference`] on a condition mismatch, or the
/// source's error if a field cannot be read.
pub fn validate_reference(
    source: &dyn DataSource,
    primary: &RunShape,
    data_path: &str,
) -> Result<PeakSearch> {
    let wavelength = source.read_float("wavelength")?;
    let shape = CountsShape::from_dims(&source.counts_shape(data_path)?)?;
    check_compatibility(primary, &RunShape { wavelength, shape })?;

    info!("calculating the elastic peak position from the reference run");
    let counts = CountsArray::from_source(source, data_path)?;
    let search = locate_elastic_peak(&counts);
    debug!("reference peak search: {search:?}");
    Ok(search)
}

/// Elastic peak position stored on a previously loaded workspace, if any.
#[must_use]
pub fn peak_from_workspace(workspace: &Workspace) -> Option<i64> {
    workspace.run.integer("EPP")
}
