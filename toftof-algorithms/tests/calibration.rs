use approx::assert_relative_eq;
use toftof_algorithms::{
    apply_detector_mask, assign_detectors, compute_bin_edges, locate_elastic_peak,
    populate_spectra, resolve_peak, MaskedDetectorSet, PeakSearch,
};
use toftof_core::{
    CountsArray, CountsShape, DetectorId, Error, KinematicParameters, NoProgress, PeakPosition,
    PeakSource, TubeInstrument, Workspace,
};

fn injected_peak_run() -> CountsArray {
    let shape = CountsShape {
        tubes: 21,
        pixels_per_tube: 2,
        channels: 10,
    };
    CountsArray::from_fn(shape, |(tube, _, channel)| {
        if tube == 10 && channel == 4 {
            500
        } else {
            5
        }
    })
    .unwrap()
}

fn kinematics() -> KinematicParameters {
    KinematicParameters {
        wavelength: 6.0,
        channel_width: 5.0,
        time_of_flight_delay: 0.0,
        l1: 10.0,
        l2: 4.0,
    }
}

#[test]
fn test_injected_peak_calibrates_bins() {
    let counts = injected_peak_run();
    let search = locate_elastic_peak(&counts);
    assert_eq!(search, PeakSearch::Found(4));

    let (peak, warning) = resolve_peak(search, 7, 10, PeakSource::Computed).unwrap();
    assert!(warning.is_none());
    assert_eq!(peak.channel(), 4);

    let kin = kinematics();
    let edges = compute_bin_edges(&kin, peak, 10).unwrap();
    let centre = 0.5 * (edges[4] + edges[5]);
    assert_relative_eq!(centre, kin.elastic_tof_us(), epsilon = 1e-9);

    let spectra = populate_spectra(&counts, &edges, &NoProgress).unwrap();
    assert_eq!(spectra.len(), 42);
    // tube 10 pixel 0 -> spectrum 20
    assert_relative_eq!(spectra[20].y[4], 500.0);
    assert_relative_eq!(spectra[20].e[4], 500.0_f64.sqrt());
    assert_relative_eq!(spectra[0].y[4], 5.0);
}

#[test]
fn test_zero_channel_width_fails_before_binning() {
    let kin = KinematicParameters {
        channel_width: 0.0,
        ..kinematics()
    };
    let peak = PeakPosition::new(4, 10, PeakSource::Computed).unwrap();
    let err = compute_bin_edges(&kin, peak, 10).unwrap_err();
    assert!(matches!(err, Error::InvalidKinematics(_)));
}

#[test]
fn test_mask_with_unknown_detector() {
    let counts = injected_peak_run();
    let peak = PeakPosition::new(4, 10, PeakSource::Computed).unwrap();
    let edges = compute_bin_edges(&kinematics(), peak, 10).unwrap();
    let spectra = populate_spectra(&counts, &edges, &NoProgress).unwrap();
    let mut workspace = Workspace::new(edges, spectra);

    let mut geometry = TubeInstrument::cylindrical("TOFTOF", 10.0, 4.0, 21, 2).unwrap();
    assign_detectors(&mut workspace, &geometry);

    let set = MaskedDetectorSet::new(vec![DetectorId(21), DetectorId(-4)]);
    let warnings = apply_detector_mask(&set, &mut geometry, &mut workspace);

    assert_eq!(warnings.len(), 1);
    assert_eq!(workspace.masked_indices(), vec![20]);
    assert_relative_eq!(workspace.spectra[20].total_counts(), 0.0);
    assert_eq!(workspace.spectra[20].x.len(), 11);
}

#[test]
fn test_pipeline_is_deterministic() {
    let run = || {
        let counts = injected_peak_run();
        let (peak, _) = resolve_peak(locate_elastic_peak(&counts), 7, 10, PeakSource::Computed)
            .unwrap();
        let edges = compute_bin_edges(&kinematics(), peak, 10).unwrap();
        let spectra = populate_spectra(&counts, &edges, &NoProgress).unwrap();
        Workspace::new(edges, spectra)
    };
    assert_eq!(run(), run());
}
