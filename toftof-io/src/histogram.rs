//! Workspace persistence as an HDF5/NeXus `NXdata` group.
//!
//! Layout:
//!
//! ```text
//! /entry                       NXentry  (title, sample_name, instrument_name)
//! /entry/workspace             NXdata   signal = counts, axes = [spectrum, time_of_flight]
//!     counts          f64 [spectra, bins]
//!     errors          f64 [spectra, bins]
//!     time_of_flight  f64 [bins + 1]        bin edges, microsecond
//!     masked          u8  [spectra]
//!     detector_id     i32 [n]               flattened detector lists
//!     detector_index  u64 [spectra]         offset of each spectrum's list
//! /entry/run                   NXcollection one scalar dataset per run property
//! ```

use crate::hdf5_util::{
    create_fixed_dataset, read_attr_opt_string, read_dataset_vec, set_attr_str_file,
    set_attr_str_group, set_axes_attr, set_dataset_units, to_var_len_unicode,
};
use crate::{Error, Result};
use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{File, Group};
use log::debug;
use ndarray::Array2;
use std::path::Path;
use toftof_core::{BinEdges, DetectorId, LogValue, RunProperties, Spectrum, Workspace};

const WORKSPACE_AXES: [&str; 2] = ["spectrum", "time_of_flight"];

/// Histogram write configuration.
#[derive(Clone, Debug)]
pub struct HistogramWriteOptions {
    /// Spectra per chunk of the counts and errors datasets.
    pub chunk_spectra: Option<usize>,
    pub compression: Option<u8>,
    pub shuffle: bool,
}

impl Default for HistogramWriteOptions {
    fn default() -> Self {
        Self {
            chunk_spectra: Some(256),
            compression: Some(1),
            shuffle: true,
        }
    }
}

/// Writes a loaded workspace to an HDF5/NeXus file.
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the workspace has no spectra.
pub fn write_workspace_hdf5<P: AsRef<Path>>(
    path: P,
    workspace: &Workspace,
    options: &HistogramWriteOptions,
) -> Result<()> {
    validate_workspace(workspace)?;

    let file = File::create(path.as_ref())?;
    set_attr_str_file(&file, "toftof_format_version", "0.1")?;

    let entry = file.create_group("entry")?;
    set_attr_str_group(&entry, "NX_class", "NXentry")?;
    set_attr_str_group(&entry, "title", &workspace.title)?;
    set_attr_str_group(&entry, "sample_name", &workspace.sample_name)?;
    set_attr_str_group(&entry, "instrument_name", &workspace.instrument_name)?;

    let data = entry.create_group("workspace")?;
    set_attr_str_group(&data, "NX_class", "NXdata")?;
    set_attr_str_group(&data, "signal", "counts")?;
    set_axes_attr(&data, &WORKSPACE_AXES)?;
    set_attr_str_group(&data, "x_unit", &workspace.x_unit)?;
    set_attr_str_group(&data, "y_unit_label", &workspace.y_unit_label)?;
    write_spectra(&data, workspace, options)?;

    let run = entry.create_group("run")?;
    set_attr_str_group(&run, "NX_class", "NXcollection")?;
    write_run_properties(&run, &workspace.run)?;

    debug!(
        "wrote {} spectra x {} bins to {}",
        workspace.number_of_histograms(),
        workspace.blocksize(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads a workspace written by [`write_workspace_hdf5`].
///
/// # Errors
/// Returns an error if HDF5 I/O fails or the datasets are inconsistent.
pub fn read_workspace_hdf5<P: AsRef<Path>>(path: P) -> Result<Workspace> {
    let file = File::open(path)?;
    let entry = file.group("entry")?;
    let data = entry.group("workspace")?;

    let edges = BinEdges::new(read_dataset_vec::<f64>(&data, "time_of_flight")?)?;
    let bins = edges.bins();

    let counts_ds = data.dataset("counts")?;
    let shape = counts_ds.shape();
    if shape.len() != 2 || shape[1] != bins {
        return Err(Error::InvalidFormat(format!(
            "counts shape {shape:?} does not match {bins} bins"
        )));
    }
    let spectra_len = shape[0];

    let counts = counts_ds.read_raw::<f64>()?;
    let errors = read_dataset_vec::<f64>(&data, "errors")?;
    let masked = read_dataset_vec::<u8>(&data, "masked")?;
    let detector_id = read_dataset_vec::<i32>(&data, "detector_id")?;
    let detector_index = read_dataset_vec::<u64>(&data, "detector_index")?;
    if errors.len() != counts.len()
        || masked.len() != spectra_len
        || detector_index.len() != spectra_len
    {
        return Err(Error::InvalidFormat(
            "workspace datasets disagree on the number of spectra".to_string(),
        ));
    }

    let mut spectra = Vec::with_capacity(spectra_len);
    for row in 0..spectra_len {
        let start = offset(detector_index[row])?;
        let end = match detector_index.get(row + 1) {
            Some(&next) => offset(next)?,
            None => detector_id.len(),
        };
        let ids = detector_id.get(start..end).ok_or_else(|| {
            Error::InvalidFormat(format!("detector_index out of range at spectrum {row}"))
        })?;
        let span = row * bins..(row + 1) * bins;
        spectra.push(Spectrum {
            x: edges.clone(),
            y: counts[span.clone()].to_vec(),
            e: errors[span].to_vec(),
            detector_ids: ids.iter().copied().map(DetectorId).collect(),
            masked: masked[row] != 0,
        });
    }

    let mut workspace = Workspace::new(edges, spectra);
    workspace.title = read_attr_opt_string(&entry, "title")?.unwrap_or_default();
    workspace.sample_name = read_attr_opt_string(&entry, "sample_name")?.unwrap_or_default();
    workspace.instrument_name =
        read_attr_opt_string(&entry, "instrument_name")?.unwrap_or_default();
    if let Some(unit) = read_attr_opt_string(&data, "x_unit")? {
        workspace.x_unit = unit;
    }
    if let Some(label) = read_attr_opt_string(&data, "y_unit_label")? {
        workspace.y_unit_label = label;
    }
    workspace.run = read_run_properties(&entry.group("run")?)?;
    Ok(workspace)
}

fn validate_workspace(workspace: &Workspace) -> Result<()> {
    if workspace.spectra.is_empty() {
        return Err(Error::InvalidFormat("workspace has no spectra".to_string()));
    }
    let bins = workspace.blocksize();
    if let Some(index) = workspace
        .spectra
        .iter()
        .position(|s| s.y.len() != bins || s.e.len() != bins)
    {
        return Err(Error::InvalidFormat(format!(
            "spectrum {index} does not have {bins} bins"
        )));
    }
    Ok(())
}

fn write_spectra(
    group: &Group,
    workspace: &Workspace,
    options: &HistogramWriteOptions,
) -> Result<()> {
    let rows = workspace.number_of_histograms();
    let bins = workspace.blocksize();
    let chunk = options.chunk_spectra.map(|n| [n.clamp(1, rows), bins]);

    let counts = Array2::from_shape_fn((rows, bins), |(r, c)| workspace.spectra[r].y[c]);
    let counts_ds = create_fixed_dataset::<f64, _>(
        group,
        "counts",
        (rows, bins),
        chunk,
        options.compression,
        options.shuffle,
    )?;
    set_dataset_units(&counts_ds, "counts")?;
    counts_ds.write(&counts)?;

    let errors = Array2::from_shape_fn((rows, bins), |(r, c)| workspace.spectra[r].e[c]);
    let errors_ds = create_fixed_dataset::<f64, _>(
        group,
        "errors",
        (rows, bins),
        chunk,
        options.compression,
        options.shuffle,
    )?;
    errors_ds.write(&errors)?;

    let tof_ds = create_fixed_dataset::<f64, _>(
        group,
        "time_of_flight",
        (bins + 1,),
        None,
        None,
        false,
    )?;
    set_dataset_units(&tof_ds, "microsecond")?;
    tof_ds.write_raw(workspace.bin_edges.as_slice())?;

    let masked: Vec<u8> = workspace.spectra.iter().map(|s| u8::from(s.masked)).collect();
    group
        .new_dataset::<u8>()
        .shape((rows,))
        .create("masked")?
        .write_raw(&masked)?;

    let mut detector_id = Vec::new();
    let mut detector_index = Vec::with_capacity(rows);
    for spectrum in &workspace.spectra {
        detector_index.push(detector_id.len() as u64);
        detector_id.extend(spectrum.detector_ids.iter().map(|id| id.0));
    }
    group
        .new_dataset::<i32>()
        .shape((detector_id.len(),))
        .create("detector_id")?
        .write_raw(&detector_id)?;
    group
        .new_dataset::<u64>()
        .shape((rows,))
        .create("detector_index")?
        .write_raw(&detector_index)?;
    Ok(())
}

fn write_run_properties(group: &Group, run: &RunProperties) -> Result<()> {
    for (name, value) in run.iter() {
        match value {
            LogValue::Integer(v) => group.new_dataset::<i64>().create(name)?.write_scalar(v)?,
            LogValue::Number(v) => group.new_dataset::<f64>().create(name)?.write_scalar(v)?,
            LogValue::Text(v) => group
                .new_dataset::<VarLenUnicode>()
                .create(name)?
                .write_scalar(&to_var_len_unicode(v)?)?,
        }
    }
    Ok(())
}

fn read_run_properties(group: &Group) -> Result<RunProperties> {
    let mut run = RunProperties::new();
    for name in group.member_names()? {
        let dataset = group.dataset(&name)?;
        match dataset.dtype()?.to_descriptor()? {
            TypeDescriptor::Integer(_) | TypeDescriptor::Unsigned(_) => {
                run.add(&name, dataset.read_scalar::<i64>()?);
            }
            TypeDescriptor::Float(_) => run.add(&name, dataset.read_scalar::<f64>()?),
            _ => {
                let value: VarLenUnicode = dataset.read_scalar()?;
                run.add(&name, value.to_string());
            }
        }
    }
    Ok(run)
}

fn offset(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidFormat(format!("detector_index {value} exceeds usize")))
}
