//! The [`Snapshot`] run value and its derived paths.

use crate::error::{ErrorKind, Result};
use crate::event_log::EventLog;
use dirsnap_archive::archive_file_name;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Where a snapshot is delivered once built.
///
/// Partitioned into locally mountable directories and remote object-store
/// buckets. Either side may be empty; a snapshot with no destinations at all
/// is legal (build-only runs are useful for smoke tests).
#[derive(Clone, Debug, Default)]
pub struct Destinations {
    /// Local directories the master archive is copied into.
    pub local: Vec<PathBuf>,
    /// Object-store buckets the master archive is uploaded to.
    pub buckets: Vec<String>,
}

/// One backup execution.
///
/// All names derived from a snapshot carry the source directory's name plus
/// the construction timestamp, so two runs of the same source never collide
/// (assuming at most one run per second per source).
///
/// Lifecycle: constructed before [`make`](crate::make) runs; the master
/// archive path is populated during assembly; the staging directory exists
/// only inside `make`; the master archive file itself is removed by the
/// transfer stage after every destination has been attempted.
#[derive(Clone, Debug)]
pub struct Snapshot {
    source: PathBuf,
    /// Parent directory of `source`; staging, master archive, and run log all
    /// live here.
    source_root: PathBuf,
    source_name: String,
    timestamp: i64,
    destinations: Destinations,
    master_path: Option<PathBuf>,
}

impl Snapshot {
    /// Create a snapshot for `source`, stamped with the current time.
    ///
    /// # Errors
    /// Rejects sources that are not absolute paths to existing directories,
    /// and sources with no parent directory to stage into (`/` cannot be
    /// snapshotted — there is nowhere to put the artifacts).
    pub fn new(source: impl Into<PathBuf>, destinations: Destinations) -> Result<Self> {
        Self::at(source, destinations, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Create a snapshot with an explicit timestamp.
    ///
    /// Exists so tests (and hypothetical replay tooling) can pin the derived
    /// names; everything else should use [`Snapshot::new`].
    pub fn at(source: impl Into<PathBuf>, destinations: Destinations, timestamp: i64) -> Result<Self> {
        let source: PathBuf = source.into();
        if !source.is_absolute() || !source.is_dir() {
            exn::bail!(ErrorKind::InvalidSource(source));
        }
        let Some(source_root) = source.parent().map(Path::to_path_buf) else {
            exn::bail!(ErrorKind::InvalidSource(source));
        };
        let Some(source_name) = source.file_name().and_then(|n| n.to_str()).map(str::to_owned) else {
            // A non-UTF-8 source directory name can't form archive/log names.
            exn::bail!(ErrorKind::InvalidSource(source));
        };
        Ok(Self {
            source,
            source_root,
            source_name,
            timestamp,
            destinations,
            master_path: None,
        })
    }

    /// Absolute path of the directory being backed up.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Parent directory of the source; all run artifacts are created here.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Name of the source directory.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Construction time, unix seconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn destinations(&self) -> &Destinations {
        &self.destinations
    }

    /// `<name>-<ts>`, the stem every run artifact shares.
    pub fn run_name(&self) -> String {
        format!("{}-{}", self.source_name, self.timestamp)
    }

    /// Transient directory the per-subdirectory archives are staged in.
    pub fn staging_path(&self) -> PathBuf {
        self.source_root.join(self.run_name())
    }

    /// File name of the assembled master archive.
    pub fn master_file_name(&self) -> String {
        archive_file_name(&format!("{}-master", self.run_name()))
    }

    /// Absolute path the master archive is assembled at.
    pub fn master_target_path(&self) -> PathBuf {
        self.source_root.join(self.master_file_name())
    }

    /// Path of the assembled master archive; `None` until assembly succeeds.
    pub fn master_path(&self) -> Option<&Path> {
        self.master_path.as_deref()
    }

    pub(crate) fn set_master_path(&mut self, path: PathBuf) {
        self.master_path = Some(path);
    }

    /// The durable per-run log file, `<parent>/<name>-<ts>.log`.
    pub fn event_log(&self) -> EventLog {
        EventLog::new(self.source_root.join(format!("{}.log", self.run_name())))
    }
}
