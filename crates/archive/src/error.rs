//! Archive Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An archiving error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archiving operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Source path does not exist or is not a directory.
    #[display("not an archivable directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Archive is corrupt or truncated. Don't retry with the same input.
    #[display("invalid or corrupted archive")]
    InvalidArchive,
    /// Underlying I/O failure while reading the tree or writing the archive.
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
