//! Beam kinematics, elastic peak positions and time-of-flight bin edges.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Planck constant (J s).
pub const PLANCK_J_S: f64 = 6.626_070_15e-34;
/// Neutron mass (kg).
pub const NEUTRON_MASS_KG: f64 = 1.674_927_498_04e-27;
/// One milli-electronvolt in joules.
pub const MEV_J: f64 = 1.602_176_634e-22;

/// Neutron velocity (m/s) for a wavelength in angstrom.
#[must_use]
pub fn neutron_velocity(wavelength_angstrom: f64) -> f64 {
    PLANCK_J_S / (NEUTRON_MASS_KG * wavelength_angstrom * 1e-10)
}

/// Time of flight (s) over `distance_m` for a wavelength in angstrom.
#[must_use]
pub fn time_of_flight_s(distance_m: f64, wavelength_angstrom: f64) -> f64 {
    distance_m / neutron_velocity(wavelength_angstrom)
}

/// Incident energy (meV) for a wavelength in angstrom.
#[must_use]
pub fn incident_energy_mev(wavelength_angstrom: f64) -> f64 {
    PLANCK_J_S * PLANCK_J_S
        / (2.0 * NEUTRON_MASS_KG * wavelength_angstrom * wavelength_angstrom * 1e-20)
        / MEV_J
}

/// Beam parameters of one run. Derived once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KinematicParameters {
    /// Incident wavelength (angstrom).
    pub wavelength: f64,
    /// Width of one time channel (microseconds).
    pub channel_width: f64,
    /// Time-of-flight delay (microseconds).
    pub time_of_flight_delay: f64,
    /// Source to sample distance (m).
    pub l1: f64,
    /// Sample to detector distance (m).
    pub l2: f64,
}

impl KinematicParameters {
    /// Theoretical elastic time of flight over the secondary flight path (microseconds).
    #[must_use]
    pub fn elastic_tof_us(&self) -> f64 {
        time_of_flight_s(self.l2, self.wavelength) * 1e6
    }

    /// Checks the parameters needed for binning.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKinematics`] for a non-positive or non-finite
    /// channel width, wavelength or secondary flight path.
    pub fn validate(&self) -> Result<()> {
        if !(self.channel_width.is_finite() && self.channel_width > 0.0) {
            return Err(Error::InvalidKinematics(format!(
                "channel width must be positive, got {}",
                self.channel_width
            )));
        }
        if !(self.wavelength.is_finite() && self.wavelength > 0.0) {
            return Err(Error::InvalidKinematics(format!(
                "wavelength must be positive, got {}",
                self.wavelength
            )));
        }
        if !(self.l2.is_finite() && self.l2 > 0.0) {
            return Err(Error::InvalidKinematics(format!(
                "secondary flight path must be positive, got {}",
                self.l2
            )));
        }
        Ok(())
    }
}

/// Where an elastic peak position came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakSource {
    /// Located in the run's own counts.
    Computed,
    /// Located in (or stored with) a reference run.
    Reference,
    /// Read from the file metadata.
    Declared,
}

impl fmt::Display for PeakSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PeakSource::Computed => "computed",
            PeakSource::Reference => "reference",
            PeakSource::Declared => "declared",
        };
        f.write_str(name)
    }
}

/// Elastic peak channel, always inside `[0, channels)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeakPosition {
    channel: usize,
    source: PeakSource,
}

impl PeakPosition {
    /// Creates a peak position checked against the channel count.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKinematics`] if `channel` is negative or not
    /// below `channels`.
    pub fn new(channel: i64, channels: usize, source: PeakSource) -> Result<Self> {
        match usize::try_from(channel) {
            Ok(channel) if channel < channels => Ok(Self { channel, source }),
            _ => Err(Error::InvalidKinematics(format!(
                "{source} elastic peak position {channel} outside [0, {channels})"
            ))),
        }
    }

    #[must_use]
    pub fn channel(&self) -> usize {
        self.channel
    }

    #[must_use]
    pub fn source(&self) -> PeakSource {
        self.source
    }
}

/// Time-of-flight bin edges shared by every spectrum of a run.
///
/// Cloning shares the allocation; the edges cannot be mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEdges(Arc<[f64]>);

impl BinEdges {
    /// Freezes a strictly increasing sequence of edges.
    ///
    /// # Errors
    /// Returns [`Error::InvalidKinematics`] if fewer than two edges are given
    /// or the sequence is not strictly increasing.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::InvalidKinematics(
                "at least two bin edges are required".to_string(),
            ));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::InvalidKinematics(
                "bin edges must be strictly increasing".to_string(),
            ));
        }
        Ok(Self(edges.into()))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of edges (channels + 1).
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of bins described by the edges.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Returns true if both handles point at the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::ops::Deref for BinEdges {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_velocity_and_energy() {
        // 6 angstrom neutrons: ~659.3 m/s, ~2.27 meV
        assert_relative_eq!(neutron_velocity(6.0), 659.33, max_relative = 1e-4);
        assert_relative_eq!(incident_energy_mev(6.0), 2.2724, max_relative = 1e-3);
        assert_relative_eq!(incident_energy_mev(1.0), 81.804, max_relative = 1e-4);
    }

    #[test]
    fn test_elastic_tof() {
        let kin = KinematicParameters {
            wavelength: 6.0,
            channel_width: 5.0,
            time_of_flight_delay: 0.0,
            l1: 10.0,
            l2: 4.0,
        };
        // 4 m / 659.33 m/s = 6066.8 us
        assert_relative_eq!(kin.elastic_tof_us(), 6066.8, max_relative = 1e-4);
    }

    #[test]
    fn test_validate_rejects_non_positive_width() {
        let mut kin = KinematicParameters {
            wavelength: 6.0,
            channel_width: 0.0,
            time_of_flight_delay: 0.0,
            l1: 10.0,
            l2: 4.0,
        };
        assert!(matches!(kin.validate(), Err(Error::InvalidKinematics(_))));
        kin.channel_width = -1.0;
        assert!(matches!(kin.validate(), Err(Error::InvalidKinematics(_))));
        kin.channel_width = f64::NAN;
        assert!(matches!(kin.validate(), Err(Error::InvalidKinematics(_))));
    }

    #[test]
    fn test_peak_position_bounds() {
        assert!(PeakPosition::new(0, 10, PeakSource::Declared).is_ok());
        assert!(PeakPosition::new(9, 10, PeakSource::Computed).is_ok());
        assert!(PeakPosition::new(10, 10, PeakSource::Declared).is_err());
        assert!(PeakPosition::new(-1, 10, PeakSource::Declared).is_err());
    }

    #[test]
    fn test_bin_edges_share_allocation() {
        let edges = BinEdges::new(vec![0.0, 1.0, 2.0]).unwrap();
        let copy = edges.clone();
        assert!(edges.ptr_eq(&copy));
        assert_eq!(edges.bins(), 2);
        assert!(BinEdges::new(vec![0.0, 0.0]).is_err());
    }
}
