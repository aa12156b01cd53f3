//! Materializes per-pixel spectra from raw counts.

use toftof_core::{
    BinEdges, CountsArray, Error, InstrumentGeometry, ProgressSink, Result, Spectrum, Workspace,
};

/// Statistical error of a channel: `sqrt(max(count, 1))`.
///
/// Empty channels get an error of one so no bin carries zero weight.
#[inline]
#[must_use]
pub fn counting_error(count: u32) -> f64 {
    f64::from(count.max(1)).sqrt()
}

/// Builds one spectrum per (tube, pixel), in spectrum-index order.
///
/// Every spectrum shares `edges`. The progress sink receives one tick per
/// spectrum out of `tubes * pixels_per_tube`.
///
/// # Errors
/// Returns [`Error::DataShape`] if the edges do not describe exactly one bin
/// per channel.
pub fn populate_spectra(
    counts: &CountsArray,
    edges: &BinEdges,
    progress: &dyn ProgressSink,
) -> Result<Vec<Spectrum>> {
    let shape = counts.shape();
    if edges.bins() != shape.channels {
        return Err(Error::DataShape {
            shape: vec![shape.tubes, shape.pixels_per_tube, shape.channels],
            reason: format!(
                "{} bin edges cannot describe {} channels",
                edges.len(),
                shape.channels
            ),
        });
    }

    let total = shape.spectra();
    let mut spectra = Vec::with_capacity(total);
    for spectrum in counts.spectra() {
        spectra.push(Spectrum {
            x: edges.clone(),
            y: spectrum.iter().map(|&c| f64::from(c)).collect(),
            e: spectrum.iter().map(|&c| counting_error(c)).collect(),
            detector_ids: Vec::new(),
            masked: false,
        });
        progress.report(spectra.len(), total);
    }
    Ok(spectra)
}

/// Copies the geometry's spectrum-to-detector mapping onto the workspace.
pub fn assign_detectors(workspace: &mut Workspace, geometry: &dyn InstrumentGeometry) {
    for (index, spectrum) in workspace.spectra.iter_mut().enumerate() {
        spectrum.detector_ids = geometry.spectrum_detectors(index).to_vec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::cell::RefCell;
    use toftof_core::{CountsShape, DetectorId, TubeInstrument};

    #[derive(Default)]
    struct RecordingProgress(RefCell<Vec<(usize, usize)>>);

    impl ProgressSink for RecordingProgress {
        fn report(&self, done: usize, total: usize) {
            self.0.borrow_mut().push((done, total));
        }
    }

    fn counts() -> CountsArray {
        let shape = CountsShape {
            tubes: 2,
            pixels_per_tube: 3,
            channels: 4,
        };
        CountsArray::from_fn(shape, |(t, p, c)| u32::try_from(t * 100 + p * 10 + c).unwrap())
            .unwrap()
    }

    #[test]
    fn test_error_model() {
        assert_relative_eq!(counting_error(0), 1.0);
        assert_relative_eq!(counting_error(1), 1.0);
        assert_relative_eq!(counting_error(16), 4.0);
    }

    #[test]
    fn test_spectra_layout_and_shared_edges() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let progress = RecordingProgress::default();
        let spectra = populate_spectra(&counts(), &edges, &progress).unwrap();

        assert_eq!(spectra.len(), 6);
        // spectrum index = tube * pixels + pixel
        assert_eq!(spectra[4].y, vec![110.0, 111.0, 112.0, 113.0]);
        assert_relative_eq!(spectra[0].e[0], 1.0);
        assert_relative_eq!(spectra[4].e[0], 110.0_f64.sqrt());
        assert!(spectra.iter().all(|s| s.x.ptr_eq(&edges)));

        let ticks = progress.0.borrow();
        assert_eq!(ticks.len(), 6);
        assert_eq!(ticks.last(), Some(&(6, 6)));
    }

    #[test]
    fn test_edge_count_mismatch() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let err = populate_spectra(&counts(), &edges, &toftof_core::NoProgress).unwrap_err();
        assert!(matches!(err, Error::DataShape { .. }));
    }

    #[test]
    fn test_assign_detectors() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        let spectra = populate_spectra(&counts(), &edges, &toftof_core::NoProgress).unwrap();
        let mut workspace = Workspace::new(edges, spectra);
        let geometry = TubeInstrument::cylindrical("TOFTOF", 10.0, 4.0, 2, 3).unwrap();
        assign_detectors(&mut workspace, &geometry);
        assert_eq!(workspace.spectra[5].detector_ids, vec![DetectorId(6)]);
    }
}
