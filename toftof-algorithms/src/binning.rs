//! Calibrated time-of-flight bin edges.

use log::info;
use toftof_core::{BinEdges, Error, KinematicParameters, PeakPosition, Result};

/// Computes the bin edges shared by every spectrum of a run.
///
/// The elastic peak channel is pinned to the theoretical elastic time of
/// flight over the secondary path:
///
/// `edge[i] = T_elastic + width * (i - peak) - width / 2`, for `i` in `0..=channels`.
///
/// The half-width shift centres the elastic peak inside its bin.
///
/// # Errors
/// Returns [`Error::InvalidKinematics`] for a non-positive channel width (or
/// wavelength / flight path) or a peak outside `[0, channels)`. No edge is
/// produced in that case.
#[allow(clippy::cast_precision_loss)]
pub fn compute_bin_edges(
    kinematics: &KinematicParameters,
    peak: PeakPosition,
    channels: usize,
) -> Result<BinEdges> {
    kinematics.validate()?;
    if peak.channel() >= channels {
        return Err(Error::InvalidKinematics(format!(
            "elastic peak position {} outside [0, {channels})",
            peak.channel()
        )));
    }

    let elastic_tof = kinematics.elastic_tof_us();
    let width = kinematics.channel_width;
    let peak_channel = peak.channel() as f64;

    let edges: Vec<f64> = (0..=channels)
        .map(|i| elastic_tof + width * (i as f64 - peak_channel) - width / 2.0)
        .collect();

    info!(
        "elastic TOF: theoretical = {elastic_tof} us, calculated bin = [{}, {}]",
        edges[peak.channel()],
        edges[peak.channel() + 1]
    );

    BinEdges::new(edges)
}
