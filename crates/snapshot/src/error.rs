//! Snapshot Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A snapshot error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for snapshot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Only the staging directory and master assembly steps are fatal; individual
/// child-archive failures are carried in the
/// [`CoverageReport`](crate::CoverageReport) instead.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Snapshot source is not an absolute path to an existing directory, or
    /// sits at the filesystem root with no parent to stage into.
    #[display("invalid snapshot source: {}", _0.display())]
    InvalidSource(#[error(not(source))] PathBuf),
    /// The staging directory could not be created, or vanished immediately
    /// after creation.
    #[display("unable to create staging directory at {}", _0.display())]
    StagingDir(#[error(not(source))] PathBuf),
    /// Assembling the staged archives into the master archive failed.
    #[display("failed to assemble master archive")]
    Assemble,
    /// Underlying I/O error.
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
