//! Point-in-time snapshot construction.
//!
//! A snapshot run archives each immediate subdirectory of a source directory
//! into a staging area, verifies that every subdirectory produced an archive,
//! assembles the staged archives into one master archive next to the source,
//! and removes the staging area. Delivery of the master archive is the
//! transfer crate's job; this crate only builds.
//!
//! Each run also appends to a durable, run-scoped [`EventLog`]
//! (`<parent>/<name>-<ts>.log`) — the operator-facing paper trail, separate
//! from `tracing` diagnostics.

mod build;
pub mod error;
mod event_log;
mod snapshot;

pub use crate::build::{Build, ChildFailure, CoverageReport, make};
pub use crate::event_log::{EventLog, Level};
pub use crate::snapshot::{Destinations, Snapshot};
