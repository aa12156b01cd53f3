//! Elastic peak search.
//!
//! The declared elastic peak position in the file metadata is occasionally
//! wrong, so the peak is located directly in the counts: the midline pixel of
//! every tube (except those near the beam stop) is summed channel-wise and the
//! channel of the maximum is taken.

use log::{debug, warn};
use toftof_core::{CountsArray, CountsShape, LoadWarning, PeakPosition, PeakSource, Result};

/// Outcome of a peak search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakSearch {
    /// Channel of the summed maximum.
    Found(usize),
    /// The sum was empty or peaked in channel 0; the declared position must be used.
    Degenerate,
}

/// Pixel index on the tube's geometric midline.
#[must_use]
pub fn midline_pixel(shape: CountsShape) -> usize {
    shape.pixels_per_tube / 2
}

/// Tubes skipped at each end of the tube range to avoid the beam stop.
#[must_use]
pub fn tubes_to_remove(tubes: usize) -> usize {
    tubes / 7
}

/// Channel-wise sum of the midline spectra of the included tubes.
#[must_use]
pub fn summed_midline_spectrum(counts: &CountsArray) -> Vec<u64> {
    let shape = counts.shape();
    let pixel = midline_pixel(shape);
    let skip = tubes_to_remove(shape.tubes);

    let mut sum = vec![0_u64; shape.channels];
    for tube in skip..shape.tubes - skip {
        for (acc, &count) in sum.iter_mut().zip(counts.spectrum(tube, pixel).iter()) {
            *acc += u64::from(count);
        }
    }
    sum
}

/// Locates the elastic peak channel.
///
/// Ties resolve to the lowest channel. A maximum in channel 0 is treated as
/// unreliable and reported as [`PeakSearch::Degenerate`].
#[must_use]
pub fn locate_elastic_peak(counts: &CountsArray) -> PeakSearch {
    let sum = summed_midline_spectrum(counts);

    let mut best: Option<(usize, u64)> = None;
    for (channel, &value) in sum.iter().enumerate() {
        if best.map_or(true, |(_, max)| value > max) {
            best = Some((channel, value));
        }
    }

    match best {
        Some((channel, _)) if channel > 0 => PeakSearch::Found(channel),
        _ => PeakSearch::Degenerate,
    }
}

/// Turns a search result into a peak position, falling back to the declared value.
///
/// `found_source` tags a successful search (computed on the run itself or on a
/// reference). A degenerate search yields the declared position and a warning.
///
/// # Errors
/// Returns `InvalidKinematics` if the chosen position lies outside `[0, channels)`.
pub fn resolve_peak(
    search: PeakSearch,
    declared: i64,
    channels: usize,
    found_source: PeakSource,
) -> Result<(PeakPosition, Option<LoadWarning>)> {
    match search {
        PeakSearch::Found(channel) => {
            debug!("located elastic peak: {channel} ({found_source}), declared: {declared}");
            let channel = i64::try_from(channel).unwrap_or(i64::MAX);
            Ok((PeakPosition::new(channel, channels, found_source)?, None))
        }
        PeakSearch::Degenerate => {
            let warning = LoadWarning::DegeneratePeak { declared };
            warn!("{warning}");
            let position = PeakPosition::new(declared, channels, PeakSource::Declared)?;
            Ok((position, Some(warning)))
        }
    }
}
