//! Per-run event log.
//!
//! Every snapshot run appends leveled events to its own log file next to the
//! source directory (`<name>-<ts>.log`). The file is opened, appended, and
//! closed on every call; there is no persistent handle and no rotation. The
//! pipeline only ever writes to it — it is a paper trail for the operator,
//! not state.

use derive_more::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Severity of a logged event.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum Level {
    #[display("info")]
    Info,
    #[display("warning")]
    Warning,
    #[display("error")]
    Error,
    #[display("fatal")]
    Fatal,
}

/// Append-only, run-scoped event log.
///
/// Writing is deliberately infallible from the caller's point of view: a
/// backup must never die because its diagnostic log is unwritable. Failures
/// are surfaced once per call on the primary output stream via `tracing`.
#[derive(Clone, Debug)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Where events are appended.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one `[level] epochSeconds message` line.
    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        let message = message.as_ref();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "[{level}] {now} {message}"));
        if let Err(err) = result {
            tracing::warn!(log = %self.path.display(), %err, "event log unwritable; entry dropped");
        }
    }
}
