//! Snapshot construction.
//!
//! [`make`] drives one build: create the staging directory, archive every
//! immediate subdirectory of the source into it, verify coverage, then roll
//! the staged archives into a single master archive and remove the staging
//! directory.
//!
//! Only two steps can abort a build — staging-directory creation and master
//! assembly. A child directory that fails to archive is recorded in the
//! [`CoverageReport`] and logged as a warning; the build carries on with
//! whatever it managed to archive. Callers wanting strict semantics can check
//! [`CoverageReport::is_complete`] and refuse to transfer.

use crate::error::{ErrorKind, Result};
use crate::event_log::{EventLog, Level};
use crate::snapshot::{Destinations, Snapshot};
use dirsnap_archive::{archive_file_name, pack_contents, pack_subdir};
use exn::ResultExt;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::instrument;

/// A finished build: the snapshot (master archive assembled) plus the
/// coverage report for the archiving phase.
#[derive(Debug)]
pub struct Build {
    pub snapshot: Snapshot,
    pub coverage: CoverageReport,
}

/// One child directory that failed to archive, with the reason.
#[derive(Debug)]
pub struct ChildFailure {
    pub name: String,
    pub error: dirsnap_archive::error::Error,
}

/// Outcome of the archiving phase: which subdirectories were required, which
/// produced archives, and which went missing (with errors where captured).
#[derive(Debug, Default)]
pub struct CoverageReport {
    /// Immediate subdirectory names of the source, in listing order.
    pub required: Vec<String>,
    /// Names that have a corresponding archive in the staging directory.
    pub produced: Vec<String>,
    /// `required` minus `produced`, order preserved, duplicates ignored.
    pub missing: Vec<String>,
    /// Archiving attempts that returned an error.
    pub failed: Vec<ChildFailure>,
}

impl CoverageReport {
    /// `true` when every required subdirectory produced an archive.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Build a snapshot of `source`.
///
/// On success the returned [`Snapshot`] has its master archive assembled at
/// `<parent>/<name>-<ts>-master.tar.gz` and the staging directory is gone.
/// A source with zero subdirectories is a valid (if empty) snapshot.
///
/// # Errors
/// Fatal only on an invalid source, an uncreatable staging directory, a
/// failed master assembly, or an unreadable source listing.
#[instrument(skip_all, fields(source = %source.as_ref().display()))]
pub fn make(source: impl AsRef<Path>, destinations: Destinations) -> Result<Build> {
    let mut snapshot = Snapshot::new(source.as_ref(), destinations)?;
    let log = snapshot.event_log();

    log.log(
        Level::Info,
        format!(
            "Backup from {} to {:?} with staging path at {}",
            snapshot.source().display(),
            snapshot.destinations(),
            snapshot.staging_path().display(),
        ),
    );
    log.log(Level::Info, format!("Starting backup {}", snapshot.run_name()));

    make_staging_dir(&snapshot, &log)?;
    let failed = archive_children(&snapshot, &log)?;
    let coverage = verify_coverage(&snapshot, &log, failed)?;
    assemble_master(&mut snapshot, &log)?;

    Ok(Build { snapshot, coverage })
}

fn make_staging_dir(snapshot: &Snapshot, log: &EventLog) -> Result<()> {
    let staging = snapshot.staging_path();
    let created = fs::create_dir(&staging);
    // Re-check even after a reported success; a staging path that isn't a
    // usable directory invalidates the whole run.
    if created.is_err() || !staging.is_dir() {
        log.log(Level::Fatal, format!("Unable to create staging directory at {}", staging.display()));
        match created {
            Err(err) => return Err(err).or_raise(|| ErrorKind::StagingDir(staging)),
            Ok(()) => exn::bail!(ErrorKind::StagingDir(staging)),
        }
    }
    Ok(())
}

fn archive_children(snapshot: &Snapshot, log: &EventLog) -> Result<Vec<ChildFailure>> {
    let staging = snapshot.staging_path();
    let mut failed = Vec::new();
    for (index, name) in subdir_names(snapshot.source())?.into_iter().enumerate() {
        log.log(Level::Info, format!("Archiving directory #{}: {name}", index + 1));
        let dest = staging.join(archive_file_name(&name));
        match pack_subdir(snapshot.source(), &name, &dest) {
            Ok(bytes) => tracing::debug!(%name, bytes, "child directory archived"),
            Err(error) => {
                log.log(Level::Warning, format!("Archiving {name} failed: {error}"));
                tracing::warn!(%name, %error, "child directory failed to archive");
                failed.push(ChildFailure { name, error });
            },
        }
    }
    Ok(failed)
}

fn verify_coverage(snapshot: &Snapshot, log: &EventLog, failed: Vec<ChildFailure>) -> Result<CoverageReport> {
    // Recompute the requirements from a fresh listing rather than trusting
    // the archiving loop; directories added mid-run show up as missing.
    let required = subdir_names(snapshot.source())?;
    let staging = snapshot.staging_path();
    let produced: Vec<String> =
        required.iter().filter(|name| staging.join(archive_file_name(name)).is_file()).cloned().collect();
    let missing = diff(&required, &produced);

    if missing.is_empty() {
        log.log(Level::Info, "All sources archived successfully");
    } else {
        log.log(Level::Warning, "Source to archive count mismatch, some directories are missing");
        log.log(Level::Warning, format!("The following archives are missing: {missing:?}"));
        tracing::warn!(?missing, "snapshot coverage incomplete");
    }

    Ok(CoverageReport { required, produced, missing, failed })
}

fn assemble_master(snapshot: &mut Snapshot, log: &EventLog) -> Result<()> {
    let staging = snapshot.staging_path();
    let master = snapshot.master_target_path();
    log.log(Level::Info, "Creating master archive");
    if let Err(err) = pack_contents(&staging, &master) {
        log.log(Level::Fatal, format!("Creating master archive failed: {err}"));
        return Err(err).or_raise(|| ErrorKind::Assemble);
    }
    log.log(Level::Info, "Removing staging directory");
    fs::remove_dir_all(&staging).map_err(ErrorKind::Io)?;
    log.log(Level::Info, "Master archive created successfully");
    snapshot.set_master_path(master);
    Ok(())
}

/// Immediate subdirectory names of `dir`, in the order the filesystem yields
/// them. Plain files are skipped — only first-level directories are archived.
fn subdir_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(ErrorKind::Io)? {
        let entry = entry.map_err(ErrorKind::Io)?;
        if entry.file_type().map_err(ErrorKind::Io)?.is_dir() {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                // Coverage works on strings; a non-UTF-8 directory name can't
                // name an archive, so it surfaces lossily and stays missing.
                Err(raw) => names.push(raw.to_string_lossy().into_owned()),
            }
        }
    }
    Ok(names)
}

/// Order-preserving set difference: everything in `required` that is absent
/// from `produced`, first occurrence only.
fn diff(required: &[String], produced: &[String]) -> Vec<String> {
    let produced: HashSet<&str> = produced.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    required
        .iter()
        .filter(|name| !produced.contains(name.as_str()) && seen.insert(name.as_str()))
        .cloned()
        .collect()
}
