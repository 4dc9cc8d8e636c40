use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use tempfile::NamedTempFile;
use url::Url;

use crate::packs::sanitize_segment;

use super::{PackMetadata, PolicyClient};

/// Directory-backed registry: `<root>/<org>/<name>/<version>.tgz`.
///
/// Useful offline and in tests. Downloads accept `fs://` locators as well as
/// plain paths.
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locator that [`PolicyClient::download`] resolves back to the archive.
    pub fn location_for(&self, org: &str, name: &str, version: &str) -> String {
        self.archive_path(org, name, version).display().to_string()
    }

    fn pack_dir(&self, org: &str, name: &str) -> PathBuf {
        self.root
            .join(sanitize_segment(org))
            .join(sanitize_segment(name))
    }

    fn archive_path(&self, org: &str, name: &str, version: &str) -> PathBuf {
        self.pack_dir(org, name)
            .join(format!("{}.tgz", sanitize_segment(version)))
    }

    fn next_version(dir: &Path) -> Result<u64> {
        let mut latest = 0;
        for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("tgz") {
                continue;
            }
            if let Some(version) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                latest = latest.max(version);
            }
        }
        Ok(latest + 1)
    }

    fn parse_location(location: &str) -> Result<PathBuf> {
        if let Some(stripped) = location.strip_prefix("fs://") {
            if stripped.starts_with('/') || stripped.starts_with("./") || stripped.starts_with("../")
            {
                return Ok(PathBuf::from(stripped));
            }
            let file_url = format!("file://{stripped}");
            let url = Url::parse(&file_url).context("failed to parse fs:// locator as file URL")?;
            return url
                .to_file_path()
                .map_err(|_| anyhow!("fs locator {location} cannot be represented as a path"));
        }
        if location.starts_with("file://") {
            let url = Url::parse(location).context("invalid file:// locator")?;
            return url
                .to_file_path()
                .map_err(|_| anyhow!("file locator {location} cannot be represented as a path"));
        }
        Ok(PathBuf::from(location))
    }
}

impl PolicyClient for LocalRegistry {
    fn publish(&self, org: &str, metadata: &PackMetadata, archive: &[u8]) -> Result<String> {
        let dir = self.pack_dir(org, &metadata.name);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create registry dir {}", dir.display()))?;

        let version = if metadata.version_tag.is_empty() {
            Self::next_version(&dir)?.to_string()
        } else {
            metadata.version_tag.clone()
        };
        let dest = self.archive_path(org, &metadata.name, &version);
        if dest.exists() {
            bail!(
                "{org}/{} version {version} is already published at {}",
                metadata.name,
                dest.display()
            );
        }

        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to stage archive in {}", dir.display()))?;
        tmp.write_all(archive)
            .context("failed to write archive contents")?;
        tmp.persist_noclobber(&dest)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to place archive at {}", dest.display()))?;

        tracing::debug!(org, name = %metadata.name, %version, path = %dest.display(), "archive stored");
        Ok(version)
    }

    fn download(&self, location: &str) -> Result<Vec<u8>> {
        let path = Self::parse_location(location)?;
        fs::read(&path).with_context(|| format!("local registry: failed to read {}", path.display()))
    }
}
