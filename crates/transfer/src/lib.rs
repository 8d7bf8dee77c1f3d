//! Master archive delivery.
//!
//! Takes a built [`Snapshot`](dirsnap_snapshot::Snapshot) and replicates its
//! master archive to the configured destinations:
//!
//! - **Local** — copy into each destination directory (created on demand),
//!   verified by re-statting the landed file.
//! - **Remote** — chunked multipart upload to each S3-compatible bucket,
//!   with bucket auto-creation, leftover-upload detection, and
//!   abort-on-failure so broken runs don't strand partial uploads.
//!
//! Both phases are sequential and abort-on-first-failure; the master archive
//! is deleted only after every destination has been attempted.

mod chunk;
mod deliver;
pub mod error;
mod local;
mod remote;

pub use crate::chunk::{Chunk, ChunkPlan, DEFAULT_CHUNK_SIZE};
pub use crate::deliver::deliver;
pub use crate::local::transfer_local;
pub use crate::remote::{ObjectStoreSettings, ObjectStoreTransfer, SessionState, UploadSession};
