//! toftof-io: Loading MLZ NeXus runs and persisting calibrated workspaces.
//!
//! The [`MlzLoader`] works on any [`toftof_core::DataSource`]. With the `hdf5`
//! feature, [`NexusFile`] reads real NeXus files and the histogram module
//! writes the resulting workspace back as an `NXdata` group.
//!

mod error;
#[cfg(feature = "hdf5")]
mod hdf5_util;
#[cfg(feature = "hdf5")]
pub mod histogram;
pub mod loader;
#[cfg(feature = "hdf5")]
pub mod nexus;

pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use histogram::{read_workspace_hdf5, write_workspace_hdf5, HistogramWriteOptions};
pub use loader::{iso_datetime, LoadedRun, MlzLoader, Reference, RunSummary, MLZ_CONFIDENCE};
#[cfg(feature = "hdf5")]
pub use nexus::NexusFile;
