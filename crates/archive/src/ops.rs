//! Archiving Operations

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use flate2::Compression as GzCompression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::path::Path;
use tar::{Archive, Builder};
use tracing::instrument;

// Highest available level; snapshots are written once and shipped over the
// network many times, so storage space wins over speed.
const GZIP_LEVEL: GzCompression = GzCompression::best();

/// Archive one immediate subdirectory of `source_root` into `dest`.
///
/// Entry paths inside the archive are relative, rooted at `name` — the
/// equivalent of archiving from within `source_root` so that no absolute
/// paths leak into the artifact.
///
/// Returns the byte size of the finished archive.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// # fn example() -> dirsnap_archive::error::Result<()> {
/// let bytes = dirsnap_archive::pack_subdir(Path::new("/srv/data"), "photos", Path::new("/tmp/photos.tar.gz"))?;
/// println!("wrote {bytes} bytes");
/// # Ok(())
/// # }
/// ```
#[instrument(skip(source_root, dest), fields(root = %source_root.as_ref().display()))]
pub fn pack_subdir(source_root: impl AsRef<Path>, name: &str, dest: impl AsRef<Path>) -> Result<u64> {
    let subdir = source_root.as_ref().join(name);
    if !subdir.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(subdir));
    }
    write_archive(dest.as_ref(), |builder| builder.append_dir_all(name, &subdir))
}

/// Archive the entire *contents* of `dir` into `dest`.
///
/// Entries are stored relative to `dir` itself, with no leading directory
/// component. Used to assemble the staged per-subdirectory archives into one
/// master archive.
///
/// Returns the byte size of the finished archive. An empty `dir` produces a
/// valid, (almost) empty archive.
#[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
pub fn pack_contents(dir: impl AsRef<Path>, dest: impl AsRef<Path>) -> Result<u64> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        exn::bail!(ErrorKind::NotADirectory(dir.to_path_buf()));
    }
    write_archive(dest.as_ref(), |builder| builder.append_dir_all("", dir))
}

/// Extract an archive produced by [`pack_subdir`] or [`pack_contents`] into
/// `into`.
///
/// Mostly useful for spot-checking a snapshot by hand; the pipeline itself
/// never reads archives back.
pub fn unpack(archive: impl AsRef<Path>, into: impl AsRef<Path>) -> Result<()> {
    let file = File::open(archive.as_ref()).map_err(ErrorKind::Io)?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    tarball.unpack(into.as_ref()).or_raise(|| ErrorKind::InvalidArchive)?;
    Ok(())
}

/// List the top-level entry names of an archive, in archive order.
pub fn list_top_level(archive: impl AsRef<Path>) -> Result<Vec<String>> {
    let file = File::open(archive.as_ref()).map_err(ErrorKind::Io)?;
    let mut tarball = Archive::new(GzDecoder::new(file));
    let mut names = Vec::new();
    for entry in tarball.entries().or_raise(|| ErrorKind::InvalidArchive)? {
        let entry = entry.or_raise(|| ErrorKind::InvalidArchive)?;
        let path = entry.path().or_raise(|| ErrorKind::InvalidArchive)?;
        if let Some(first) = path.components().next() {
            let first = first.as_os_str().to_string_lossy().into_owned();
            if !names.contains(&first) {
                names.push(first);
            }
        }
    }
    Ok(names)
}

fn write_archive(
    dest: &Path,
    append: impl FnOnce(&mut Builder<GzEncoder<File>>) -> std::io::Result<()>,
) -> Result<u64> {
    let file = File::create(dest).map_err(ErrorKind::Io)?;
    let encoder = GzEncoder::new(file, GZIP_LEVEL);
    let mut builder = Builder::new(encoder);
    // Symlinks are archived as links, not followed; a link pointing outside
    // the source tree must not pull foreign files into the snapshot.
    builder.follow_symlinks(false);
    append(&mut builder).map_err(ErrorKind::Io)?;
    let encoder = builder.into_inner().map_err(ErrorKind::Io)?;
    let file = encoder.finish().map_err(ErrorKind::Io)?;
    file.sync_all().map_err(ErrorKind::Io)?;
    let size = file.metadata().map_err(ErrorKind::Io)?.len();
    tracing::debug!(dest = %dest.display(), size, "archive written");
    Ok(size)
}
