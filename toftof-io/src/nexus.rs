//! HDF5-backed NeXus data source.
//!
//! [`NexusFile`] opens the first `NXentry` of a file and serves its fields
//! through [`DataSource`]. Paths are relative to that entry.

use crate::Result;
use hdf5::types::{FixedAscii, FixedUnicode, H5Type, VarLenAscii, VarLenUnicode};
use hdf5::{Dataset, File, Group};
use log::debug;
use ndarray::ArrayD;
use std::path::Path;
use toftof_core::{DataSource, Error as CoreError, Result as CoreResult};

/// Upper bound for fixed-length string fields.
const FIXED_STRING_LEN: usize = 1024;

/// One NeXus entry opened for reading.
pub struct NexusFile {
    _file: File,
    entry: Group,
    entry_name: String,
}

impl NexusFile {
    /// Opens `path` and selects its first entry.
    ///
    /// The first group tagged `NX_class = NXentry` wins; files without class
    /// attributes fall back to their first group.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or holds no group.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let names = file.member_names()?;

        let mut first_group = None;
        let mut entry_name = None;
        for name in names {
            let Ok(group) = file.group(&name) else {
                continue;
            };
            if nx_class(&group).as_deref() == Some("NXentry") {
                entry_name = Some(name);
                break;
            }
            first_group.get_or_insert(name);
        }

        let entry_name = entry_name.or(first_group).ok_or_else(|| {
            crate::Error::InvalidFormat(format!(
                "{} contains no entry group",
                path.as_ref().display()
            ))
        })?;
        let entry = file.group(&entry_name)?;
        debug!("opened entry /{entry_name} of {}", path.as_ref().display());

        Ok(Self {
            _file: file,
            entry,
            entry_name,
        })
    }

    /// Name of the selected entry.
    #[must_use]
    pub fn entry_name(&self) -> &str {
        &self.entry_name
    }

    fn dataset(&self, path: &str) -> CoreResult<Dataset> {
        if !self.contains(path) {
            return Err(CoreError::MissingField(path.to_string()));
        }
        self.entry
            .dataset(path)
            .map_err(|e| CoreError::invalid_field(path, e.to_string()))
    }

    fn first<T: H5Type + Clone>(&self, path: &str) -> CoreResult<T> {
        let values = self
            .dataset(path)?
            .read_raw::<T>()
            .map_err(|e| CoreError::invalid_field(path, e.to_string()))?;
        values
            .first()
            .cloned()
            .ok_or_else(|| CoreError::invalid_field(path, "empty dataset"))
    }
}

fn nx_class(group: &Group) -> Option<String> {
    let attr = group.attr("NX_class").ok()?;
    if let Ok(value) = attr.read_scalar::<VarLenUnicode>() {
        return Some(value.to_string());
    }
    if let Ok(value) = attr.read_scalar::<VarLenAscii>() {
        return Some(value.to_string());
    }
    attr.read_scalar::<FixedAscii<FIXED_STRING_LEN>>()
        .ok()
        .map(|value| value.to_string())
}

fn read_string_dataset(dataset: &Dataset) -> Option<String> {
    if let Ok(values) = dataset.read_raw::<VarLenUnicode>() {
        return values.first().map(ToString::to_string);
    }
    if let Ok(values) = dataset.read_raw::<VarLenAscii>() {
        return values.first().map(ToString::to_string);
    }
    if let Ok(values) = dataset.read_raw::<FixedAscii<FIXED_STRING_LEN>>() {
        return values.first().map(ToString::to_string);
    }
    dataset
        .read_raw::<FixedUnicode<FIXED_STRING_LEN>>()
        .ok()
        .and_then(|values| values.first().map(ToString::to_string))
}

impl DataSource for NexusFile {
    fn contains(&self, path: &str) -> bool {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            if !self.entry.link_exists(&current) {
                return false;
            }
        }
        !current.is_empty()
    }

    fn read_string(&self, path: &str) -> CoreResult<String> {
        let dataset = self.dataset(path)?;
        read_string_dataset(&dataset)
            .map(|value| value.trim_end_matches('\0').trim().to_string())
            .ok_or_else(|| CoreError::invalid_field(path, "not a string dataset"))
    }

    fn read_float(&self, path: &str) -> CoreResult<f64> {
        match self.first::<f64>(path) {
            Ok(value) => Ok(value),
            #[allow(clippy::cast_precision_loss)]
            Err(err) => self.first::<i64>(path).map(|v| v as f64).map_err(|_| err),
        }
    }

    fn read_int(&self, path: &str) -> CoreResult<i64> {
        self.first::<i64>(path)
    }

    fn read_float_array(&self, path: &str) -> CoreResult<Vec<f64>> {
        self.dataset(path)?
            .read_raw::<f64>()
            .map_err(|e| CoreError::invalid_field(path, e.to_string()))
    }

    fn read_int_array(&self, path: &str) -> CoreResult<Vec<i64>> {
        self.dataset(path)?
            .read_raw::<i64>()
            .map_err(|e| CoreError::invalid_field(path, e.to_string()))
    }

    fn counts_shape(&self, path: &str) -> CoreResult<Vec<usize>> {
        Ok(self.dataset(path)?.shape())
    }

    fn read_counts(&self, path: &str) -> CoreResult<ArrayD<i32>> {
        self.dataset(path)?
            .read_dyn::<i32>()
            .map_err(|e| CoreError::invalid_field(path, e.to_string()))
    }

    fn find_group_by_class(&self, class: &str) -> Option<String> {
        self.entry
            .member_names()
            .ok()?
            .into_iter()
            .find(|name| {
                self.entry
                    .group(name)
                    .is_ok_and(|group| nx_class(&group).as_deref() == Some(class))
            })
    }
}
