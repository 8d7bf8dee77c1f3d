//! Recursive directory archiving into gzip-compressed tarballs.
//!
//! This crate is the archiving utility behind the snapshot pipeline, built
//! on `tar` + `flate2` rather than shelling out to an external binary:
//!
//! - **Relative entries** — archives are built as if from within the source
//!   directory, so no absolute paths leak into the artifact
//!   ([`pack_subdir`]).
//! - **Whole-directory assembly** — the contents of a directory can be rolled
//!   into a single archive with no leading path component
//!   ([`pack_contents`]).
//! - **Inspection** — [`unpack`] and [`list_top_level`] exist for verifying
//!   artifacts; the pipeline itself only ever writes.
//!
//! All archives use the highest gzip level, prioritizing storage space over
//! speed.

pub mod error;
mod ops;

pub use crate::ops::{list_top_level, pack_contents, pack_subdir, unpack};

/// File name suffix of every archive this crate produces.
pub const ARCHIVE_SUFFIX: &str = "tar.gz";

/// The archive file name for a directory (or archive stem) called `stem`.
#[must_use]
pub fn archive_file_name(stem: &str) -> String {
    format!("{stem}.{ARCHIVE_SUFFIX}")
}

/// The stem of an archive file name, if it carries this crate's suffix.
///
/// ```
/// use dirsnap_archive::archive_stem;
/// assert_eq!(archive_stem("photos.tar.gz"), Some("photos"));
/// assert_eq!(archive_stem("photos.zip"), None);
/// ```
#[must_use]
pub fn archive_stem(file_name: &str) -> Option<&str> {
    file_name.strip_suffix(ARCHIVE_SUFFIX).and_then(|s| s.strip_suffix('.'))
}
