//! CLI Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A CLI error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for the CLI.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Configuration file missing, unreadable, or not valid JSON.
    #[display("could not load configuration from {}", _0.display())]
    Config(#[error(not(source))] PathBuf),
    /// Configuration loaded but failed validation.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// Snapshot construction failed.
    #[display("snapshot build failed")]
    Snapshot,
    /// Snapshot delivery failed.
    #[display("snapshot transfer failed")]
    Transfer,
}
