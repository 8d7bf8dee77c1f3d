//! Local filesystem delivery.
//!
//! Copies the master archive into each configured destination directory via
//! `tokio::fs`. Destinations are created on demand and each copy is verified
//! by re-statting the expected destination path — existence is the sole
//! correctness check; there is no checksum comparison.

use crate::error::{ErrorKind, Result};
use dirsnap_snapshot::{EventLog, Level};
use exn::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::instrument;

/// Copy the master archive into every local destination, sequentially.
///
/// Destinations are independent, but processing is abort-on-first-failure:
/// a destination that cannot be prepared or verified stops the remaining
/// local transfers.
#[instrument(skip_all, fields(master = %master.display()))]
pub async fn transfer_local(master: &Path, destinations: &[PathBuf], log: &EventLog) -> Result<()> {
    for dest in destinations {
        deliver_to(master, dest, log).await?;
    }
    Ok(())
}

async fn deliver_to(master: &Path, dest: &Path, log: &EventLog) -> Result<()> {
    // create_dir_all tolerates the directory already existing (and the
    // create/create race); everything else is fatal for the run.
    fs::create_dir_all(dest).await.or_raise(|| ErrorKind::Destination(dest.to_path_buf()))?;

    log.log(Level::Info, format!("Transferring master archive to destination {}", dest.display()));
    let file_name = master.file_name().ok_or_raise(|| ErrorKind::MasterMissing(master.to_path_buf()))?;
    let target = dest.join(file_name);
    fs::copy(master, &target).await.map_err(ErrorKind::Io)?;
    preserve_mtime(master, &target);

    // The sole correctness check for local delivery: the file must be there.
    match fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => {},
        _ => {
            log.log(Level::Error, format!("Error transferring master archive to destination {}", dest.display()));
            exn::bail!(ErrorKind::Unverified(dest.to_path_buf()));
        },
    }

    log.log(Level::Info, format!("Transfer to {} completed successfully", dest.display()));
    Ok(())
}

/// `fs::copy` carries permissions but not timestamps; re-apply the source
/// mtime so destination copies sort like the original. Best-effort, and a
/// cheap enough metadata call to do synchronously.
fn preserve_mtime(master: &Path, target: &Path) {
    let applied = std::fs::metadata(master)
        .and_then(|meta| meta.modified())
        .and_then(|modified| std::fs::File::options().write(true).open(target)?.set_modified(modified));
    if let Err(err) = applied {
        tracing::debug!(%err, "could not preserve mtime on destination copy");
    }
}
