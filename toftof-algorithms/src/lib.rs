//! toftof-algorithms: Calibration steps of the time-of-flight loader.
//!
//! - **peak** - elastic peak search on the detector midline
//! - **reference** - vanadium compatibility check and peak override
//! - **binning** - calibrated bin edges from beam kinematics
//! - **populate** - X/Y/E spectra from raw counts
//! - **mask** - detector masking through the instrument geometry
//!
#![warn(missing_docs)]

mod binning;
mod mask;
mod peak;
mod populate;
mod reference;

pub use binning::compute_bin_edges;
pub use mask::{apply_detector_mask, MaskedDetectorSet};
pub use peak::{
    locate_elastic_peak, midline_pixel, resolve_peak, summed_midline_spectrum, tubes_to_remove,
    PeakSearch,
};
pub use populate::{assign_detectors, counting_error, populate_spectra};
pub use reference::{check_compatibility, peak_from_workspace, validate_reference, RunShape};
