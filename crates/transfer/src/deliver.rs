//! Snapshot delivery orchestration.
//!
//! Runs the local phase, then the remote phase, then deletes the master
//! archive. Deletion happens only after both phases have run to completion:
//! a fatal failure partway through either phase leaves the master archive on
//! disk for manual recovery, while destinations that already received their
//! copy remain valid.

use crate::error::{ErrorKind, Result};
use crate::local::transfer_local;
use crate::remote::ObjectStoreTransfer;
use dirsnap_snapshot::{Level, Snapshot};
use exn::{OptionExt, ResultExt};
use tracing::instrument;

/// Deliver a built snapshot to every configured destination, then remove the
/// master archive.
///
/// `store` may be `None` when the snapshot has no bucket destinations; a
/// snapshot that *does* name buckets without an object-store client is a
/// configuration error.
#[instrument(skip_all, fields(run = %snapshot.run_name()))]
pub async fn deliver(snapshot: &Snapshot, store: Option<&ObjectStoreTransfer>) -> Result<()> {
    let log = snapshot.event_log();
    let master = snapshot
        .master_path()
        .ok_or_raise(|| ErrorKind::MasterMissing(snapshot.master_target_path()))?;

    let destinations = snapshot.destinations();
    transfer_local(master, &destinations.local, &log).await?;
    match (store, destinations.buckets.is_empty()) {
        (_, true) => {},
        (Some(store), false) => store.transfer(master, &destinations.buckets, &log).await?,
        (None, false) => exn::bail!(ErrorKind::MissingObjectStore),
    }

    log.log(Level::Info, "Removing master archive");
    tokio::fs::remove_file(master).await.or_raise(|| ErrorKind::MasterMissing(master.to_path_buf()))?;
    Ok(())
}
