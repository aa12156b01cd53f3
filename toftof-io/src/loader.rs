//! Loader for MLZ NeXus time-of-flight runs (TOFTOF, DNS).
//!
//! The loader reads the instrument and timing metadata, loads the counts once,
//! settles the elastic peak position (own counts, reference run or declared
//! value), calibrates the time-of-flight axis and fills the workspace. Run
//! metadata is copied to the workspace's run properties and the detectors
//! listed in the file's pixel mask are masked last.

use crate::Result;
use chrono::{DateTime, NaiveDateTime};
use log::{debug, info, warn};
use serde::Serialize;
use toftof_algorithms::{
    apply_detector_mask, assign_detectors, compute_bin_edges, locate_elastic_peak,
    peak_from_workspace, populate_spectra, resolve_peak, validate_reference, MaskedDetectorSet,
    RunShape,
};
use toftof_core::kinematics::incident_energy_mev;
use toftof_core::{
    CountsArray, CountsShape, DataSource, Error, InstrumentGeometry, KinematicParameters,
    LoadConfig, LoadWarning, PeakPosition, PeakSource, ProgressSink, ReferencePolicy,
    RunProperties, Workspace,
};

/// Confidence reported for files carrying the MLZ-specific fields.
pub const MLZ_CONFIDENCE: u8 = 80;

const MONITOR_GROUPS: [&str; 2] = ["monitor", "Monitor"];

const DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

/// Optional reference (vanadium) run used to settle the elastic peak.
///
/// A processed workspace is consulted first: its `EPP` property is used as is.
/// Without one, a reference file is validated against the data run and its
/// own elastic peak is searched.
#[derive(Clone, Copy, Default)]
pub struct Reference<'a> {
    workspace: Option<&'a Workspace>,
    source: Option<&'a dyn DataSource>,
}

impl<'a> Reference<'a> {
    /// No reference: the data run's own peak is used.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Reference workspace loaded earlier.
    #[must_use]
    pub fn workspace(workspace: &'a Workspace) -> Self {
        Self {
            workspace: Some(workspace),
            source: None,
        }
    }

    /// Reference run file.
    #[must_use]
    pub fn source(source: &'a dyn DataSource) -> Self {
        Self {
            workspace: None,
            source: Some(source),
        }
    }

    /// Adds a reference file consulted when the workspace carries no `EPP`.
    #[must_use]
    pub fn with_source(mut self, source: &'a dyn DataSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns true if neither a workspace nor a file is set.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.workspace.is_none() && self.source.is_none()
    }
}

/// Timing metadata read from the monitor group.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeDetails {
    wavelength: f64,
    monitor_counts: i64,
    declared_peak: i64,
    channel_width: f64,
    time_of_flight_delay: f64,
}

/// Result of a successful load.
#[derive(Debug, Clone)]
pub struct LoadedRun {
    pub workspace: Workspace,
    pub shape: CountsShape,
    pub kinematics: KinematicParameters,
    /// Elastic peak used for the time-of-flight axis.
    pub peak: PeakPosition,
    /// Peak position stored in the monitor group.
    pub declared_peak: i64,
    /// Recoverable conditions met while loading, in order.
    pub warnings: Vec<LoadWarning>,
}

impl LoadedRun {
    /// Compact, serializable description of the run.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            instrument: self.workspace.instrument_name.clone(),
            title: self.workspace.title.clone(),
            sample: self.workspace.sample_name.clone(),
            shape: self.shape,
            kinematics: self.kinematics,
            elastic_tof_us: self.kinematics.elastic_tof_us(),
            peak: self.peak,
            declared_peak: self.declared_peak,
            first_edge_us: self.workspace.bin_edges.first().copied().unwrap_or_default(),
            last_edge_us: self.workspace.bin_edges.last().copied().unwrap_or_default(),
            masked_spectra: self.workspace.masked_indices().len(),
            warnings: self.warnings.iter().map(ToString::to_string).collect(),
            properties: self.workspace.run.clone(),
        }
    }
}

/// JSON-friendly run description.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub instrument: String,
    pub title: String,
    pub sample: String,
    pub shape: CountsShape,
    pub kinematics: KinematicParameters,
    pub elastic_tof_us: f64,
    pub peak: PeakPosition,
    pub declared_peak: i64,
    pub first_edge_us: f64,
    pub last_edge_us: f64,
    pub masked_spectra: usize,
    pub warnings: Vec<String>,
    pub properties: RunProperties,
}

/// Loader for MLZ NeXus runs.
#[derive(Debug, Clone, Default)]
pub struct MlzLoader {
    config: LoadConfig,
}

impl MlzLoader {
    /// Creates a loader. Configuration files are validated by `LoadConfig::from_file`.
    #[must_use]
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// How confident the loader is that it can read `source`.
    ///
    /// Only MLZ files carry `wavelength`, `experiment_title` and `mode` at the
    /// entry level.
    #[must_use]
    pub fn confidence(source: &dyn DataSource) -> u8 {
        if ["wavelength", "experiment_title", "mode"]
            .iter()
            .all(|path| source.contains(path))
        {
            MLZ_CONFIDENCE
        } else {
            0
        }
    }

    /// Reads the instrument name and checks it is supported.
    ///
    /// # Errors
    /// Returns [`Error::MissingField`] without an `NXinstrument` group and
    /// [`Error::UnsupportedInstrument`] for unknown names.
    pub fn instrument_name(&self, source: &dyn DataSource) -> Result<String> {
        let path = source
            .find_group_by_class("NXinstrument")
            .ok_or_else(|| Error::MissingField("NXinstrument group".to_string()))?;
        let name = source.read_string(&format!("{path}/name"))?;
        if !self.config.supports(&name) {
            return Err(Error::UnsupportedInstrument(name).into());
        }
        debug!("instrument name set to: {name}");
        Ok(name)
    }

    /// Declared counts shape, without loading the counts.
    ///
    /// # Errors
    /// Returns [`Error::DataShape`] for a malformed counts array.
    pub fn counts_shape(&self, source: &dyn DataSource) -> Result<CountsShape> {
        let dims = source.counts_shape(&self.config.data_path)?;
        Ok(CountsShape::from_dims(&dims)?)
    }

    /// Loads one run into a calibrated workspace.
    ///
    /// `geometry` must describe the instrument the run was recorded on; it
    /// receives the masked flags of the file's pixel mask.
    ///
    /// # Errors
    /// Fails on missing or malformed fields, unsupported instruments,
    /// invalid kinematics and (unless the policy is [`ReferencePolicy::Skip`])
    /// incompatible reference runs. No workspace is returned on error.
    pub fn load(
        &self,
        source: &dyn DataSource,
        geometry: &mut dyn InstrumentGeometry,
        reference: Reference<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<LoadedRun> {
        let mut warnings = Vec::new();

        let instrument = self.instrument_name(source)?;
        let time = self.time_details(source)?;
        let shape = self.counts_shape(source)?;
        debug!(
            "tubes: {}, pixels per tube: {}, channels: {}",
            shape.tubes, shape.pixels_per_tube, shape.channels
        );

        if geometry.name() != instrument {
            warn!("geometry {} used for a {instrument} run", geometry.name());
        }
        if geometry.number_of_spectra() != shape.spectra() {
            warn!(
                "geometry maps {} spectra, the run has {}",
                geometry.number_of_spectra(),
                shape.spectra()
            );
        }

        let l1 = geometry.l1()?;
        let l2 = secondary_flight_path(geometry)?;
        debug!("L1: {l1}, L2: {l2}");
        let kinematics = KinematicParameters {
            wavelength: time.wavelength,
            channel_width: time.channel_width,
            time_of_flight_delay: time.time_of_flight_delay,
            l1,
            l2,
        };
        kinematics.validate()?;

        let primary = RunShape {
            wavelength: time.wavelength,
            shape,
        };
        let reference_peak =
            self.reference_peak(reference, &primary, time.declared_peak, &mut warnings)?;

        let counts = CountsArray::from_source(source, &self.config.data_path)?;
        let peak = match reference_peak {
            Some(peak) => peak,
            None => {
                let (peak, warning) = resolve_peak(
                    locate_elastic_peak(&counts),
                    time.declared_peak,
                    shape.channels,
                    PeakSource::Computed,
                )?;
                warnings.extend(warning);
                peak
            }
        };

        let edges = compute_bin_edges(&kinematics, peak, shape.channels)?;
        let spectra = populate_spectra(&counts, &edges, progress)?;
        let mut workspace = Workspace::new(edges, spectra);
        workspace.instrument_name = instrument;
        assign_detectors(&mut workspace, geometry);
        workspace
            .run
            .add("EPP", i64::try_from(peak.channel()).unwrap_or(i64::MAX));

        self.run_details(source, &time, &mut workspace, &mut warnings)?;
        experiment_details(source, &mut workspace)?;

        let masked = MaskedDetectorSet::from_source(source, &self.config.pixel_mask_path)?;
        warnings.extend(apply_detector_mask(&masked, geometry, &mut workspace));

        info!(
            "loaded {} spectra x {} channels, elastic peak {} ({})",
            workspace.number_of_histograms(),
            workspace.blocksize(),
            peak.channel(),
            peak.source()
        );

        Ok(LoadedRun {
            workspace,
            shape,
            kinematics,
            peak,
            declared_peak: time.declared_peak,
            warnings,
        })
    }

    fn time_details(&self, source: &dyn DataSource) -> Result<TimeDetails> {
        let wavelength = source.read_float("wavelength")?;
        let monitor = MONITOR_GROUPS
            .iter()
            .find(|name| source.contains(name))
            .ok_or_else(|| Error::MissingField("monitor/Monitor".to_string()))?;

        let monitor_counts = source.read_int(&format!("{monitor}/monitor_counts"))?;
        let declared_peak = source.read_int(&format!("{monitor}/elasticpeak"))?;

        // [channel width, number of channels, delay], in raw ticks
        let tof_path = format!("{monitor}/time_of_flight");
        let tof = source.read_float_array(&tof_path)?;
        if tof.len() < 3 {
            return Err(Error::invalid_field(
                tof_path,
                format!("expected 3 values, found {}", tof.len()),
            )
            .into());
        }
        let tick = self.config.tof_tick_us;

        let time = TimeDetails {
            wavelength,
            monitor_counts,
            declared_peak,
            channel_width: tof[0] * tick,
            time_of_flight_delay: tof[2] * tick,
        };
        debug!("monitor counts: {monitor_counts}");
        debug!("channel width: {} us", time.channel_width);
        debug!("wavelength: {wavelength}");
        debug!("elastic peak position: {declared_peak}");
        debug!("time of flight delay: {} us", time.time_of_flight_delay);
        Ok(time)
    }

    fn reference_peak(
        &self,
        reference: Reference<'_>,
        primary: &RunShape,
        declared_peak: i64,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<Option<PeakPosition>> {
        let channels = primary.shape.channels;

        if let Some(workspace) = reference.workspace {
            if let Some(epp) = peak_from_workspace(workspace) {
                info!("using EPP from the reference workspace: {epp}");
                return Ok(Some(PeakPosition::new(epp, channels, PeakSource::Reference)?));
            }
            let warning = LoadWarning::MissingReferencePeak;
            warn!("{warning}");
            warnings.push(warning);
        }

        let Some(source) = reference.source else {
            return Ok(None);
        };
        match validate_reference(source, primary, &self.config.data_path) {
            Ok(search) => {
                let (peak, warning) =
                    resolve_peak(search, declared_peak, channels, PeakSource::Reference)?;
                warnings.extend(warning);
                Ok(Some(peak))
            }
            // every error here comes from the reference file, never the data run
            Err(err) if self.config.reference_policy == ReferencePolicy::Skip => {
                let reason = match err {
                    Error::IncompatibleReference(reason) => reason,
                    other => other.to_string(),
                };
                let warning = LoadWarning::ReferenceIgnored { reason };
                warn!("{warning}");
                warnings.push(warning);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn run_details(
        &self,
        source: &dyn DataSource,
        time: &TimeDetails,
        workspace: &mut Workspace,
        warnings: &mut Vec<LoadWarning>,
    ) -> Result<()> {
        let run = &mut workspace.run;

        run.add("run_number", source.read_int("run_number")?.to_string());
        for (field, property) in [("start_time", "run_start"), ("end_time", "run_end")] {
            let value = source.read_string(field)?;
            let iso = iso_datetime(&value).unwrap_or_else(|| {
                let warning = LoadWarning::UnparsableDate {
                    field: field.to_string(),
                    value: value.clone(),
                };
                warn!("{warning}");
                warnings.push(warning);
                String::new()
            });
            run.add(property, iso);
        }

        run.add("wavelength", time.wavelength.to_string());
        run.add("Ei", incident_energy_mev(time.wavelength));
        run.add("duration", source.read_float("duration")?.to_string());
        run.add("mode", source.read_string("mode")?);

        let title = source.read_string("title")?;
        run.add("title", title.as_str());

        let experiment_title = source.read_string("experiment_title")?;
        run.add("experiment_title", experiment_title.as_str());

        if source.contains("sample/temperature") {
            let temperature = source.read_float("sample/temperature")?;
            run.add("temperature", temperature.to_string());
        }
        run.add("monitor_counts", time.monitor_counts.to_string());

        workspace.title = title;
        workspace.sample_name = experiment_title;
        debug!("run properties: {}", workspace.run.len());
        Ok(())
    }
}

/// Sample name from `sample/description`, when the file has one.
fn experiment_details(source: &dyn DataSource, workspace: &mut Workspace) -> Result<()> {
    if source.contains("sample/description") {
        workspace.sample_name = source.read_string("sample/description")?;
    }
    Ok(())
}

/// L2 from the `l2` instrument parameter, else the distance from the sample to
/// the detector of the second spectrum (the first when there is only one).
fn secondary_flight_path(geometry: &dyn InstrumentGeometry) -> Result<f64> {
    if let Some(l2) = geometry.parameter("l2") {
        return Ok(l2);
    }
    debug!("calculating L2 from the instrument geometry");
    let index = usize::from(geometry.number_of_spectra() > 1);
    let id = geometry
        .spectrum_detectors(index)
        .first()
        .copied()
        .ok_or_else(|| Error::Geometry(format!("spectrum {index} has no detector")))?;
    let component = geometry.resolve_detector(id)?;
    Ok(geometry.detector_to_sample_distance(component))
}

/// Converts an instrument timestamp to ISO-8601 (`YYYY-MM-DDTHH:MM:SS`).
#[must_use]
pub fn iso_datetime(value: &str) -> Option<String> {
    let value = value.trim();
    let parsed = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toftof_core::MemorySource;

    #[test]
    fn test_iso_datetime() {
        assert_eq!(
            iso_datetime("2013-07-28 10:32:19").as_deref(),
            Some("2013-07-28T10:32:19")
        );
        assert_eq!(
            iso_datetime("28.07.2013 10:32:19").as_deref(),
            Some("2013-07-28T10:32:19")
        );
        assert_eq!(
            iso_datetime("28-Jul-2013 10:32:19").as_deref(),
            Some("2013-07-28T10:32:19")
        );
        assert_eq!(
            iso_datetime("2013-07-28T10:32:19+02:00").as_deref(),
            Some("2013-07-28T10:32:19")
        );
        assert_eq!(iso_datetime("yesterday"), None);
    }

    #[test]
    fn test_confidence() {
        let source = MemorySource::new()
            .with_float("wavelength", 6.0)
            .with_text("experiment_title", "p1234")
            .with_text("mode", "Normal");
        assert_eq!(MlzLoader::confidence(&source), MLZ_CONFIDENCE);

        let source = MemorySource::new().with_float("wavelength", 6.0);
        assert_eq!(MlzLoader::confidence(&source), 0);
    }

    #[test]
    fn test_unsupported_instrument() {
        let source = MemorySource::new()
            .with_group("IN5", "NXinstrument")
            .with_text("IN5/name", "IN5");
        let err = MlzLoader::default().instrument_name(&source).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Core(Error::UnsupportedInstrument(_))
        ));
    }

    #[test]
    fn test_missing_monitor() {
        let source = MemorySource::new().with_float("wavelength", 6.0);
        let err = MlzLoader::default().time_details(&source).unwrap_err();
        assert!(matches!(err, crate::Error::Core(Error::MissingField(_))));
    }

    #[test]
    fn test_time_details_in_ticks() {
        let source = MemorySource::new()
            .with_float("wavelength", 6.0)
            .with_int("Monitor/monitor_counts", 1000)
            .with_int("Monitor/elasticpeak", 578)
            .with_float_array("Monitor/time_of_flight", vec![100.0, 1024.0, 20.0]);
        let time = MlzLoader::default().time_details(&source).unwrap();
        assert!((time.channel_width - 5.0).abs() < 1e-12);
        assert!((time.time_of_flight_delay - 1.0).abs() < 1e-12);
        assert_eq!(time.declared_peak, 578);
    }
}
