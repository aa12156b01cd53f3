//! Hierarchical data source abstraction.
//!
//! A [`DataSource`] exposes one run entry of a NeXus-like file: scalar and array
//! fields addressed by `/`-separated paths relative to the entry (for example
//! `monitor/elasticpeak` or `data/data`), plus group lookup by NeXus class.
//! The HDF5 implementation lives in `toftof-io`; [`MemorySource`] is the
//! in-memory implementation used by tests and synthetic runs.

use crate::{Error, Result};
use ndarray::{ArrayD, IxDyn};
use std::collections::BTreeMap;

/// Read access to the fields of one run entry.
pub trait DataSource {
    /// Returns true if a field or group exists at `path`.
    fn contains(&self, path: &str) -> bool;

    /// Reads a string field.
    fn read_string(&self, path: &str) -> Result<String>;

    /// Reads a floating point scalar.
    fn read_float(&self, path: &str) -> Result<f64>;

    /// Reads an integer scalar.
    fn read_int(&self, path: &str) -> Result<i64>;

    /// Reads a 1-D floating point array.
    fn read_float_array(&self, path: &str) -> Result<Vec<f64>>;

    /// Reads a 1-D integer array.
    fn read_int_array(&self, path: &str) -> Result<Vec<i64>>;

    /// Returns the declared shape of an integer array without loading it.
    fn counts_shape(&self, path: &str) -> Result<Vec<usize>>;

    /// Bulk-loads an n-D integer array.
    fn read_counts(&self, path: &str) -> Result<ArrayD<i32>>;

    /// Returns the path of the first group carrying the given NeXus class.
    fn find_group_by_class(&self, nx_class: &str) -> Option<String>;
}

/// A node stored in a [`MemorySource`].
#[derive(Clone, Debug)]
pub enum Field {
    Text(String),
    Float(f64),
    Int(i64),
    FloatArray(Vec<f64>),
    IntArray(Vec<i64>),
    Counts(ArrayD<i32>),
    Group { nx_class: String },
}

impl Field {
    fn kind(&self) -> &'static str {
        match self {
            Field::Text(_) => "string",
            Field::Float(_) => "float",
            Field::Int(_) => "int",
            Field::FloatArray(_) => "float array",
            Field::IntArray(_) => "int array",
            Field::Counts(_) => "counts array",
            Field::Group { .. } => "group",
        }
    }
}

/// In-memory data source keyed by path.
///
/// Parent groups are implicit: `contains("monitor")` is true as soon as any
/// field below `monitor/` exists.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    fields: BTreeMap<String, Field>,
}

impl MemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, path: impl Into<String>, field: Field) {
        self.fields.insert(normalize(&path.into()), field);
    }

    /// Removes a field, returning it if present.
    pub fn remove(&mut self, path: &str) -> Option<Field> {
        self.fields.remove(&normalize(path))
    }

    #[must_use]
    pub fn with_text(mut self, path: &str, value: &str) -> Self {
        self.insert(path, Field::Text(value.to_string()));
        self
    }

    #[must_use]
    pub fn with_float(mut self, path: &str, value: f64) -> Self {
        self.insert(path, Field::Float(value));
        self
    }

    #[must_use]
    pub fn with_int(mut self, path: &str, value: i64) -> Self {
        self.insert(path, Field::Int(value));
        self
    }

    #[must_use]
    pub fn with_float_array(mut self, path: &str, values: Vec<f64>) -> Self {
        self.insert(path, Field::FloatArray(values));
        self
    }

    #[must_use]
    pub fn with_int_array(mut self, path: &str, values: Vec<i64>) -> Self {
        self.insert(path, Field::IntArray(values));
        self
    }

    #[must_use]
    pub fn with_counts(mut self, path: &str, counts: ArrayD<i32>) -> Self {
        self.insert(path, Field::Counts(counts));
        self
    }

    #[must_use]
    pub fn with_group(mut self, path: &str, nx_class: &str) -> Self {
        self.insert(
            path,
            Field::Group {
                nx_class: nx_class.to_string(),
            },
        );
        self
    }

    fn get(&self, path: &str) -> Result<&Field> {
        self.fields
            .get(&normalize(path))
            .ok_or_else(|| Error::MissingField(path.to_string()))
    }
}

fn normalize(path: &str) -> String {
    path.trim_matches('/').to_string()
}

fn wrong_kind(path: &str, expected: &str, field: &Field) -> Error {
    Error::invalid_field(path, format!("expected {expected}, found {}", field.kind()))
}

#[allow(clippy::cast_precision_loss)]
impl DataSource for MemorySource {
    fn contains(&self, path: &str) -> bool {
        let key = normalize(path);
        if self.fields.contains_key(&key) {
            return true;
        }
        let prefix = format!("{key}/");
        self.fields.keys().any(|k| k.starts_with(&prefix))
    }

    fn read_string(&self, path: &str) -> Result<String> {
        match self.get(path)? {
            Field::Text(value) => Ok(value.clone()),
            other => Err(wrong_kind(path, "string", other)),
        }
    }

    fn read_float(&self, path: &str) -> Result<f64> {
        match self.get(path)? {
            Field::Float(value) => Ok(*value),
            Field::Int(value) => Ok(*value as f64),
            Field::FloatArray(values) if values.len() == 1 => Ok(values[0]),
            other => Err(wrong_kind(path, "float", other)),
        }
    }

    fn read_int(&self, path: &str) -> Result<i64> {
        match self.get(path)? {
            Field::Int(value) => Ok(*value),
            Field::IntArray(values) if values.len() == 1 => Ok(values[0]),
            other => Err(wrong_kind(path, "int", other)),
        }
    }

    fn read_float_array(&self, path: &str) -> Result<Vec<f64>> {
        match self.get(path)? {
            Field::FloatArray(values) => Ok(values.clone()),
            Field::IntArray(values) => Ok(values.iter().map(|&v| v as f64).collect()),
            Field::Float(value) => Ok(vec![*value]),
            other => Err(wrong_kind(path, "float array", other)),
        }
    }

    fn read_int_array(&self, path: &str) -> Result<Vec<i64>> {
        match self.get(path)? {
            Field::IntArray(values) => Ok(values.clone()),
            Field::Int(value) => Ok(vec![*value]),
            other => Err(wrong_kind(path, "int array", other)),
        }
    }

    fn counts_shape(&self, path: &str) -> Result<Vec<usize>> {
        match self.get(path)? {
            Field::Counts(values) => Ok(values.shape().to_vec()),
            Field::IntArray(values) => Ok(vec![values.len()]),
            other => Err(wrong_kind(path, "counts array", other)),
        }
    }

    fn read_counts(&self, path: &str) -> Result<ArrayD<i32>> {
        match self.get(path)? {
            Field::Counts(values) => Ok(values.clone()),
            Field::IntArray(values) => {
                let data = values
                    .iter()
                    .map(|&v| {
                        i32::try_from(v)
                            .map_err(|_| Error::invalid_field(path, "count exceeds i32 range"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                ArrayD::from_shape_vec(IxDyn(&[data.len()]), data)
                    .map_err(|e| Error::invalid_field(path, e.to_string()))
            }
            other => Err(wrong_kind(path, "counts array", other)),
        }
    }

    fn find_group_by_class(&self, nx_class: &str) -> Option<String> {
        self.fields.iter().find_map(|(path, field)| match field {
            Field::Group { nx_class: class } if class == nx_class => Some(path.clone()),
            _ => None,
        })
    }
}
