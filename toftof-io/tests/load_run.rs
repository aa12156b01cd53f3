use approx::assert_relative_eq;
use ndarray::{ArrayD, IxDyn};
use toftof_core::{
    BinEdges, DetectorId, Error as CoreError, InstrumentGeometry, LoadConfig, LoadWarning,
    LogValue, MemorySource, NoProgress, PeakSource, ReferencePolicy, TubeInstrument, Workspace,
};
use toftof_io::{Error, MlzLoader, Reference};

const TUBES: usize = 21;
const PIXELS: usize = 2;
const CHANNELS: usize = 10;

/// Uniform counts of 5 with a 500-count peak in tube 10, `peak_channel`.
fn counts(peak_channel: usize) -> ArrayD<i32> {
    let mut data = ArrayD::<i32>::from_elem(IxDyn(&[TUBES, PIXELS, CHANNELS]), 5);
    for pixel in 0..PIXELS {
        data[IxDyn(&[10, pixel, peak_channel])] = 500;
    }
    data
}

fn run_source() -> MemorySource {
    MemorySource::new()
        .with_group("TOFTOF", "NXinstrument")
        .with_text("TOFTOF/name", "TOFTOF")
        .with_float("wavelength", 6.0)
        .with_int("monitor/monitor_counts", 123_456)
        .with_int("monitor/elasticpeak", 7)
        .with_float_array("monitor/time_of_flight", vec![100.0, 10.0, 20.0])
        .with_counts("data/data", counts(4))
        .with_int("run_number", 3455)
        .with_text("start_time", "2013-07-28 10:32:19")
        .with_text("end_time", "2013-07-28 11:02:19")
        .with_float("duration", 1800.0)
        .with_text("mode", "Normal")
        .with_text("title", "Vanadium 300K")
        .with_text("experiment_title", "p1234")
        .with_float("sample/temperature", 294.5)
        .with_int_array("instrument/detector/pixel_mask", vec![21, 99_999])
}

fn geometry() -> TubeInstrument {
    TubeInstrument::cylindrical("TOFTOF", 10.0, 4.0, TUBES, PIXELS).unwrap()
}

#[test]
fn test_load_computes_peak_and_metadata() {
    let source = run_source();
    let mut geometry = geometry();
    let run = MlzLoader::default()
        .load(&source, &mut geometry, Reference::none(), &NoProgress)
        .unwrap();

    assert_eq!(run.peak.channel(), 4);
    assert_eq!(run.peak.source(), PeakSource::Computed);
    assert_eq!(run.declared_peak, 7);
    assert_relative_eq!(run.kinematics.channel_width, 5.0, epsilon = 1e-12);
    assert_relative_eq!(run.kinematics.time_of_flight_delay, 1.0, epsilon = 1e-12);
    assert_relative_eq!(run.kinematics.l2, 4.0, epsilon = 1e-12);

    let ws = &run.workspace;
    assert_eq!(ws.number_of_histograms(), TUBES * PIXELS);
    assert_eq!(ws.blocksize(), CHANNELS);
    assert_eq!(ws.x_unit, "TOF");
    assert_eq!(ws.y_unit_label, "Counts");
    assert_eq!(ws.title, "Vanadium 300K");
    assert_eq!(ws.sample_name, "p1234");
    assert_eq!(ws.instrument_name, "TOFTOF");
    assert!(ws.spectra.iter().all(|s| s.x.ptr_eq(&ws.bin_edges)));

    let centre = 0.5 * (ws.bin_edges[4] + ws.bin_edges[5]);
    assert_relative_eq!(centre, run.kinematics.elastic_tof_us(), epsilon = 1e-9);

    let props = &ws.run;
    assert_eq!(props.text("run_number").as_deref(), Some("3455"));
    assert_eq!(props.text("run_start").as_deref(), Some("2013-07-28T10:32:19"));
    assert_eq!(props.text("run_end").as_deref(), Some("2013-07-28T11:02:19"));
    assert_eq!(props.text("wavelength").as_deref(), Some("6"));
    assert_eq!(props.text("duration").as_deref(), Some("1800"));
    assert_eq!(props.text("mode").as_deref(), Some("Normal"));
    assert_eq!(props.text("temperature").as_deref(), Some("294.5"));
    assert_eq!(props.text("monitor_counts").as_deref(), Some("123456"));
    assert_eq!(props.get("EPP"), Some(&LogValue::Integer(4)));
    match props.get("Ei") {
        Some(LogValue::Number(ei)) => assert_relative_eq!(*ei, 2.2724, max_relative = 1e-3),
        other => panic!("unexpected Ei: {other:?}"),
    }

    // detector 21 is spectrum 20; 99999 does not exist
    assert_eq!(ws.masked_indices(), vec![20]);
    assert_eq!(ws.spectra[20].detector_ids, vec![DetectorId(21)]);
    assert_eq!(run.warnings.len(), 1);
    assert!(matches!(
        run.warnings[0],
        LoadWarning::UnknownDetector { id: DetectorId(99_999), .. }
    ));
    assert_eq!(geometry.masked_detectors(), vec![DetectorId(21)]);
}

#[test]
fn test_description_overrides_sample_name() {
    let source = run_source().with_text("sample/description", "Vanadium rod");
    let run = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::none(), &NoProgress)
        .unwrap();
    assert_eq!(run.workspace.sample_name, "Vanadium rod");
    assert_eq!(run.workspace.run.text("experiment_title").as_deref(), Some("p1234"));
}

#[test]
fn test_degenerate_counts_fall_back_to_declared_peak() {
    let mut source = run_source();
    source.insert(
        "data/data",
        toftof_core::source::Field::Counts(ArrayD::zeros(IxDyn(&[TUBES, PIXELS, CHANNELS]))),
    );
    let run = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::none(), &NoProgress)
        .unwrap();
    assert_eq!(run.peak.channel(), 7);
    assert_eq!(run.peak.source(), PeakSource::Declared);
    assert!(run
        .warnings
        .contains(&LoadWarning::DegeneratePeak { declared: 7 }));
}

#[test]
fn test_reference_file_overrides_peak() {
    let source = run_source();
    let vanadium = MemorySource::new()
        .with_float("wavelength", 6.0)
        .with_counts("data/data", counts(6));
    let run = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::source(&vanadium), &NoProgress)
        .unwrap();
    assert_eq!(run.peak.channel(), 6);
    assert_eq!(run.peak.source(), PeakSource::Reference);
    assert_eq!(run.workspace.run.integer("EPP"), Some(6));
}

#[test]
fn test_reference_workspace_epp_wins() {
    let source = run_source();
    let edges = BinEdges::new(vec![0.0, 1.0]).unwrap();
    let mut reference = Workspace::new(edges, Vec::new());
    reference.run.add("EPP", 3_i64);

    let vanadium = MemorySource::new()
        .with_float("wavelength", 6.0)
        .with_counts("data/data", counts(6));
    let run = MlzLoader::default()
        .load(
            &source,
            &mut geometry(),
            Reference::workspace(&reference).with_source(&vanadium),
            &NoProgress,
        )
        .unwrap();
    assert_eq!(run.peak.channel(), 3);
}

#[test]
fn test_reference_workspace_without_epp_uses_file() {
    let source = run_source();
    let reference = Workspace::new(BinEdges::new(vec![0.0, 1.0]).unwrap(), Vec::new());
    let vanadium = MemorySource::new()
        .with_float("wavelength", 6.0)
        .with_counts("data/data", counts(6));
    let run = MlzLoader::default()
        .load(
            &source,
            &mut geometry(),
            Reference::workspace(&reference).with_source(&vanadium),
            &NoProgress,
        )
        .unwrap();
    assert_eq!(run.peak.channel(), 6);
    assert!(run.warnings.contains(&LoadWarning::MissingReferencePeak));
}

#[test]
fn test_incompatible_reference_policy() {
    let source = run_source();
    let vanadium = MemorySource::new()
        .with_float("wavelength", 5.1)
        .with_counts("data/data", counts(6));

    let err = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::source(&vanadium), &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::IncompatibleReference(_))));

    let config = LoadConfig {
        reference_policy: ReferencePolicy::Skip,
        ..LoadConfig::default()
    };
    let run = MlzLoader::new(config)
        .load(&source, &mut geometry(), Reference::source(&vanadium), &NoProgress)
        .unwrap();
    assert_eq!(run.peak.channel(), 4);
    assert!(matches!(run.warnings[0], LoadWarning::ReferenceIgnored { .. }));
}

#[test]
fn test_malformed_reference_skipped() {
    let source = run_source();
    let flat = MemorySource::new()
        .with_float("wavelength", 6.0)
        .with_counts("data/data", ArrayD::<i32>::from_elem(IxDyn(&[TUBES, CHANNELS]), 1));
    let no_wavelength = MemorySource::new().with_counts("data/data", counts(6));

    let err = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::source(&flat), &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::DataShape { .. })));

    let loader = MlzLoader::new(LoadConfig {
        reference_policy: ReferencePolicy::Skip,
        ..LoadConfig::default()
    });
    for vanadium in [&flat, &no_wavelength] {
        let run = loader
            .load(&source, &mut geometry(), Reference::source(vanadium), &NoProgress)
            .unwrap();
        assert_eq!(run.peak.channel(), 4);
        assert!(matches!(run.warnings[0], LoadWarning::ReferenceIgnored { .. }));
    }
}

#[test]
fn test_reused_geometry_starts_unmasked() {
    let mut geometry = geometry();
    let loader = MlzLoader::default();

    let first = loader
        .load(&run_source(), &mut geometry, Reference::none(), &NoProgress)
        .unwrap();
    assert_eq!(first.workspace.masked_indices(), vec![20]);

    let mut unmasked = run_source();
    unmasked.remove("instrument/detector/pixel_mask");
    let second = loader
        .load(&unmasked, &mut geometry, Reference::none(), &NoProgress)
        .unwrap();
    assert!(second.workspace.masked_indices().is_empty());
    assert!(geometry.masked_detectors().is_empty());
}

#[test]
fn test_zero_channel_width_aborts() {
    let mut source = run_source();
    source.insert(
        "monitor/time_of_flight",
        toftof_core::source::Field::FloatArray(vec![0.0, 10.0, 20.0]),
    );
    let err = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::none(), &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::InvalidKinematics(_))));
}

#[test]
fn test_two_dimensional_counts_rejected() {
    let mut source = run_source();
    source.insert(
        "data/data",
        toftof_core::source::Field::Counts(ArrayD::zeros(IxDyn(&[TUBES, CHANNELS]))),
    );
    let err = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::none(), &NoProgress)
        .unwrap_err();
    assert!(matches!(err, Error::Core(CoreError::DataShape { .. })));
}

#[test]
fn test_l2_parameter_takes_precedence() {
    let source = run_source();
    let mut geometry = geometry();
    geometry.set_parameter("l2", 4.5);
    let run = MlzLoader::default()
        .load(&source, &mut geometry, Reference::none(), &NoProgress)
        .unwrap();
    assert_relative_eq!(run.kinematics.l2, 4.5);
    assert_eq!(geometry.name(), "TOFTOF");
}

#[test]
fn test_unparsable_date_is_kept_empty() {
    let source = run_source().with_text("end_time", "sometime");
    let run = MlzLoader::default()
        .load(&source, &mut geometry(), Reference::none(), &NoProgress)
        .unwrap();
    assert_eq!(run.workspace.run.text("run_end").as_deref(), Some(""));
    assert!(run
        .warnings
        .iter()
        .any(|w| matches!(w, LoadWarning::UnparsableDate { .. })));
}

#[test]
fn test_summary_serializes() {
    let run = MlzLoader::default()
        .load(&run_source(), &mut geometry(), Reference::none(), &NoProgress)
        .unwrap();
    let json = serde_json::to_value(run.summary()).unwrap();
    assert_eq!(json["instrument"], "TOFTOF");
    assert_eq!(json["masked_spectra"], 1);
    assert_eq!(json["properties"]["EPP"], 4);
}
