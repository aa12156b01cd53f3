//! Raw detector counts indexed by (tube, pixel, channel).

use crate::source::DataSource;
use crate::{Error, Result};
use ndarray::{Array3, ArrayD, ArrayView1, Ix3};
use serde::{Deserialize, Serialize};

/// Dimensions of a counts array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsShape {
    pub tubes: usize,
    pub pixels_per_tube: usize,
    pub channels: usize,
}

impl CountsShape {
    /// Validates a declared shape.
    ///
    /// # Errors
    /// Returns [`Error::DataShape`] unless the shape has exactly three
    /// non-zero dimensions.
    pub fn from_dims(dims: &[usize]) -> Result<Self> {
        if dims.len() != 3 {
            return Err(Error::DataShape {
                shape: dims.to_vec(),
                reason: format!("expected 3 dimensions, found {}", dims.len()),
            });
        }
        if dims.contains(&0) {
            return Err(Error::DataShape {
                shape: dims.to_vec(),
                reason: "zero-length dimension".to_string(),
            });
        }
        Ok(Self {
            tubes: dims[0],
            pixels_per_tube: dims[1],
            channels: dims[2],
        })
    }

    /// Number of spectra (tubes x pixels per tube).
    #[must_use]
    pub fn spectra(&self) -> usize {
        self.tubes * self.pixels_per_tube
    }

    /// Spectrum index of a (tube, pixel) pair.
    #[inline]
    #[must_use]
    pub fn spectrum_index(&self, tube: usize, pixel: usize) -> usize {
        tube * self.pixels_per_tube + pixel
    }
}

/// Immutable 3-D counts array, loaded once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct CountsArray {
    data: Array3<u32>,
}

impl CountsArray {
    /// Wraps an owned array after validating its shape.
    ///
    /// # Errors
    /// Returns [`Error::DataShape`] if any dimension is zero.
    pub fn new(data: Array3<u32>) -> Result<Self> {
        CountsShape::from_dims(data.shape())?;
        Ok(Self { data })
    }

    /// Builds an array from a shape and a generator, for synthetic runs.
    ///
    /// # Errors
    /// Returns [`Error::DataShape`] if any dimension is zero.
    pub fn from_fn<F>(shape: CountsShape, f: F) -> Result<Self>
    where
        F: FnMut((usize, usize, usize)) -> u32,
    {
        Self::new(Array3::from_shape_fn(
            (shape.tubes, shape.pixels_per_tube, shape.channels),
            f,
        ))
    }

    /// Converts signed file counts, rejecting malformed shapes and negative values.
    ///
    /// # Errors
    /// Returns [`Error::DataShape`] for a bad shape or [`Error::InvalidField`]
    /// for a negative count.
    pub fn from_signed(path: &str, raw: ArrayD<i32>) -> Result<Self> {
        CountsShape::from_dims(raw.shape())?;
        let raw = raw
            .into_dimensionality::<Ix3>()
            .map_err(|e| Error::invalid_field(path, e.to_string()))?;
        if raw.iter().any(|&v| v < 0) {
            return Err(Error::invalid_field(path, "negative detector count"));
        }
        #[allow(clippy::cast_sign_loss)]
        let data = raw.mapv(|v| v as u32);
        Ok(Self { data })
    }

    /// Loads the counts at `path` from a data source.
    ///
    /// The shape is checked before the bulk load.
    ///
    /// # Errors
    /// Propagates source errors and shape validation failures.
    pub fn from_source(source: &dyn DataSource, path: &str) -> Result<Self> {
        let dims = source.counts_shape(path)?;
        CountsShape::from_dims(&dims)?;
        let raw = source.read_counts(path)?;
        Self::from_signed(path, raw)
    }

    #[must_use]
    pub fn shape(&self) -> CountsShape {
        let dims = self.data.dim();
        CountsShape {
            tubes: dims.0,
            pixels_per_tube: dims.1,
            channels: dims.2,
        }
    }

    /// Time spectrum of one pixel.
    ///
    /// # Panics
    /// Panics if `tube` or `pixel` is out of range.
    #[must_use]
    pub fn spectrum(&self, tube: usize, pixel: usize) -> ArrayView1<'_, u32> {
        self.data.slice(ndarray::s![tube, pixel, ..])
    }

    /// Iterates spectra in spectrum-index order (tube-major).
    pub fn spectra(&self) -> impl Iterator<Item = ArrayView1<'_, u32>> {
        self.data.outer_iter().flat_map(|tube| tube.into_outer_iter())
    }

    #[must_use]
    pub fn as_array(&self) -> &Array3<u32> {
        &self.data
    }
}
