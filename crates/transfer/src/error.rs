//! Transfer Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A transfer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Every variant is fatal for the run: the pipeline aborts on the first
/// failed destination and leaves the master archive on disk for manual
/// recovery. Orphaned-upload detection is a logged warning, not an error.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The master archive was never assembled, or vanished before transfer.
    #[display("master archive not found: {}", _0.display())]
    MasterMissing(#[error(not(source))] PathBuf),
    /// A local destination directory could not be prepared.
    #[display("unable to prepare destination directory: {}", _0.display())]
    Destination(#[error(not(source))] PathBuf),
    /// The copy reported success but the file is absent at the destination.
    #[display("master archive failed to arrive at destination: {}", _0.display())]
    Unverified(#[error(not(source))] PathBuf),
    /// Remote destinations are configured but no object-store client was
    /// provided.
    #[display("remote destinations configured but no object store settings provided")]
    MissingObjectStore,
    /// The bucket could not be resolved, created, or listed.
    #[display("bucket {_0} could not be resolved")]
    Bucket(#[error(not(source))] String),
    /// The multipart session could not be initiated, completed, or aborted.
    #[display("multipart session failed for bucket {_0}")]
    Session(#[error(not(source))] String),
    /// One part upload failed.
    #[display("upload of part {part_number} to bucket {bucket} failed")]
    Part { bucket: String, part_number: i32 },
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
        matches!(self, Self::Io(_) | Self::Session(_) | Self::Part { .. })
    }
}
