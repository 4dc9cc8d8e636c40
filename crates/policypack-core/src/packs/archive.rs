//! Gzip tarball helpers for the pack wire format: one top-level folder
//! (`package`) wrapping the pack contents.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use tar::{Archive, Builder, HeaderMode};
use walkdir::{DirEntry, WalkDir};

/// Entries skipped when archiving a directory.
pub const DEFAULT_EXCLUDES: &[&str] = &[".git", ".hg", "node_modules", "__pycache__"];

/// Archive `dir` so every entry lives under `prefix/`.
pub fn tar_gz_directory(dir: &Path, prefix: &str, excludes: &[&str]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.mode(HeaderMode::Deterministic);
    builder
        .append_dir(prefix, dir)
        .with_context(|| format!("failed to add {} to archive", dir.display()))?;

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry, excludes));
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} escaped {}", entry.path().display(), dir.display()))?;
        let name = Path::new(prefix).join(relative);
        if entry.file_type().is_dir() {
            builder
                .append_dir(&name, entry.path())
                .with_context(|| format!("failed to add {} to archive", entry.path().display()))?;
        } else {
            builder
                .append_path_with_name(entry.path(), &name)
                .with_context(|| format!("failed to add {} to archive", entry.path().display()))?;
        }
    }

    let encoder = builder.into_inner().context("failed to finish tar stream")?;
    encoder.finish().context("failed to finish gzip stream")
}

fn is_excluded(entry: &DirEntry, excludes: &[&str]) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| excludes.contains(&name))
        .unwrap_or(false)
}

/// Unpack a gzip tarball into `dest`.
///
/// Entries that would land outside `dest` are skipped by the tar reader.
pub fn unpack_tar_gz(bytes: &[u8], dest: &Path) -> io::Result<()> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    #[cfg(unix)]
    archive.set_unpack_xattrs(false);
    archive.unpack(dest)
}

/// Hex SHA-256 of an archive, for logs.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
