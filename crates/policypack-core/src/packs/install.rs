use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::env::{PackLayout, PolicyConfig};
use crate::error::{PolicyPackError, Result};

use super::archive;
use super::{
    Bootstrapper, CommandRunner, Manifest, PolicyClient, RequiredPolicy, ensure_not_cancelled,
    install_path,
};

/// How an install call reached its final path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The pack was already on disk; nothing was fetched.
    CacheHit,
    /// This call's rename placed the pack.
    Installed,
    /// Another installer placed the same version first.
    RaceLost,
}

/// Downloads required policy packs and places them under the install root.
///
/// Placement is a single directory rename from a staging directory that
/// shares the destination's parent, so a pack is either fully visible or not
/// visible at all. Concurrent installers of the same version need no lock:
/// whichever rename lands first wins and the others keep its content.
pub struct Installer {
    root: PathBuf,
    layout: PackLayout,
    client: Arc<dyn PolicyClient>,
    bootstrapper: Bootstrapper,
}

impl Installer {
    pub fn new(
        cfg: &PolicyConfig,
        client: Arc<dyn PolicyClient>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            root: cfg.install_root.clone(),
            layout: cfg.layout.clone(),
            client,
            bootstrapper: Bootstrapper::new(cfg, runner),
        }
    }

    pub fn install_path(&self, org: &str, policy: &RequiredPolicy) -> Result<PathBuf> {
        install_path(&self.root, org, &policy.name, &policy.version_label())
    }

    /// Make `policy` available on disk and return its directory.
    pub fn install(
        &self,
        org: &str,
        policy: &RequiredPolicy,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.install_with_outcome(org, policy, cancel)
            .map(|(path, _)| path)
    }

    pub fn install_with_outcome(
        &self,
        org: &str,
        policy: &RequiredPolicy,
        cancel: &CancellationToken,
    ) -> Result<(PathBuf, InstallOutcome)> {
        let version = policy.version_label();
        let final_dir = self.install_path(org, policy)?;
        if final_dir.exists() {
            tracing::debug!(org, name = %policy.name, %version, path = %final_dir.display(), "policy pack already installed");
            return Ok((final_dir, InstallOutcome::CacheHit));
        }

        tracing::info!(org, name = %policy.name, %version, "Installing policy pack");

        ensure_not_cancelled(cancel, "download")?;
        let tarball = self
            .client
            .download(&policy.pack_location)
            .map_err(|source| PolicyPackError::network("download", source))?;
        tracing::debug!(
            location = %policy.pack_location,
            bytes = tarball.len(),
            sha256 = %archive::sha256_hex(&tarball),
            "downloaded policy pack"
        );

        let outcome = self.place(&final_dir, &tarball, cancel)?;
        self.bootstrap(&final_dir, cancel)?;

        tracing::info!(org, name = %policy.name, %version, path = %final_dir.display(), "Finished installing policy pack");
        Ok((final_dir, outcome))
    }

    /// Load the placed manifest and install the pack's runtime dependencies.
    fn bootstrap(&self, final_dir: &Path, cancel: &CancellationToken) -> Result<()> {
        ensure_not_cancelled(cancel, "bootstrap")?;
        let manifest_path = self.layout.manifest_path(final_dir);
        let manifest = Manifest::load(&manifest_path)
            .map_err(|source| PolicyPackError::manifest_load(final_dir, source))?;
        self.bootstrapper
            .bootstrap(final_dir, &manifest_path, manifest)?;
        Ok(())
    }

    /// Unpack `tarball` next to `final_dir` and rename it into place.
    ///
    /// The staging directory is owned by a `TempDir` and removed however this
    /// returns.
    fn place(
        &self,
        final_dir: &Path,
        tarball: &[u8],
        cancel: &CancellationToken,
    ) -> Result<InstallOutcome> {
        let parent = final_dir.parent().unwrap_or(self.root.as_path());
        fs::create_dir_all(parent)
            .map_err(|err| PolicyPackError::staging("creating policy pack root", parent, err))?;

        let base = final_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = tempfile::Builder::new()
            .prefix(&format!("{base}.tmp"))
            .tempdir_in(parent)
            .map_err(|err| PolicyPackError::staging("creating staging directory in", parent, err))?;

        // Archives keep their files under a single `package` folder.
        let staged_package = staging.path().join(&self.layout.package_dir);
        fs::create_dir_all(&staged_package).map_err(|err| {
            PolicyPackError::staging("creating staging directory", &staged_package, err)
        })?;

        ensure_not_cancelled(cancel, "extraction")?;
        archive::unpack_tar_gz(tarball, staging.path()).map_err(|err| {
            PolicyPackError::staging("extracting policy pack into", staging.path(), err)
        })?;

        tracing::debug!(staging = %staging.path().display(), dest = %final_dir.display(), "unpacking policy pack");

        let outcome = match fs::rename(&staged_package, final_dir) {
            Ok(()) => InstallOutcome::Installed,
            Err(err) if placed_by_another(&err, final_dir) => {
                tracing::debug!(dest = %final_dir.display(), "policy pack placed by a concurrent installer");
                InstallOutcome::RaceLost
            }
            Err(err) => {
                return Err(PolicyPackError::staging(
                    "moving policy pack into",
                    final_dir,
                    err,
                ));
            }
        };

        if let Err(err) = staging.close() {
            tracing::warn!(error = %err, "failed to remove policy pack staging directory");
        }
        Ok(outcome)
    }
}

fn placed_by_another(err: &io::Error, final_dir: &Path) -> bool {
    match err.kind() {
        ErrorKind::AlreadyExists | ErrorKind::DirectoryNotEmpty => true,
        // Windows refuses to rename over a directory with access denied.
        ErrorKind::PermissionDenied if cfg!(windows) => final_dir.is_dir(),
        _ => false,
    }
}
