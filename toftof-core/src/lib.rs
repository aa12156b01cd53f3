//! toftof-core: Core types and collaborator traits for time-of-flight loading.
//!
//! This crate holds the data model (counts, kinematics, bin edges, output
//! workspace) and the seams the loader talks through: the hierarchical
//! [`DataSource`], the [`InstrumentGeometry`] and the [`ProgressSink`].
//!

pub mod config;
pub mod counts;
pub mod error;
pub mod geometry;
pub mod kinematics;
pub mod progress;
pub mod source;
pub mod warning;
pub mod workspace;

pub use config::{LoadConfig, ReferencePolicy};
pub use counts::{CountsArray, CountsShape};
pub use error::{Error, Result};
pub use geometry::{
    ComponentId, DetectorId, InstrumentDefinition, InstrumentGeometry, TubeInstrument, TubeLayout,
};
pub use kinematics::{BinEdges, KinematicParameters, PeakPosition, PeakSource};
pub use progress::{LogProgress, NoProgress, ProgressSink};
pub use source::{DataSource, Field, MemorySource};
pub use warning::LoadWarning;
pub use workspace::{LogValue, RunProperties, Spectrum, Workspace};
