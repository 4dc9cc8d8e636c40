use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio_util::sync::CancellationToken;

use crate::env::{PackLayout, PolicyConfig, ToolCommands};
use crate::error::{PolicyPackError, Result};

use super::archive::{self, DEFAULT_EXCLUDES};
use super::{
    CommandRunner, CommandSpec, Manifest, PackIdentity, PackMetadata, PolicyClient, Runtime,
    ensure_not_cancelled,
};

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPack {
    /// Identity with the published name and version tag filled in.
    pub identity: PackIdentity,
    pub permalink: String,
}

/// Packages a local policy pack directory and uploads it.
pub struct Publisher {
    client: Arc<dyn PolicyClient>,
    runner: Arc<dyn CommandRunner>,
    layout: PackLayout,
    tools: ToolCommands,
    console_url: String,
}

impl Publisher {
    pub fn new(
        cfg: &PolicyConfig,
        client: Arc<dyn PolicyClient>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            client,
            runner,
            layout: cfg.layout.clone(),
            tools: cfg.tools.clone(),
            console_url: cfg.console_url.clone(),
        }
    }

    /// Publish the pack in `dir` under `identity`'s organization.
    ///
    /// The runtime, name and version tag come from the directory's manifest;
    /// `identity.name` is only used when the manifest has no name.
    pub fn publish(
        &self,
        identity: &PackIdentity,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PublishedPack> {
        let manifest_path = self.layout.manifest_path(dir);
        let manifest = Manifest::load(&manifest_path)
            .map_err(|source| PolicyPackError::manifest_load(dir, source))?;
        let runtime = manifest.runtime();

        ensure_not_cancelled(cancel, "packaging")?;
        tracing::info!(pack = %identity, %runtime, path = %dir.display(), "Compressing policy pack");
        let tarball = self.package(dir, &runtime)?;

        let name = manifest.name.clone().unwrap_or_else(|| identity.name.clone());
        let metadata = PackMetadata {
            display_name: name.clone(),
            name,
            version_tag: manifest.version.clone().unwrap_or_default(),
            runtime: runtime.name().to_string(),
        };

        ensure_not_cancelled(cancel, "upload")?;
        tracing::info!(
            org = %identity.org,
            name = %metadata.name,
            bytes = tarball.len(),
            sha256 = %archive::sha256_hex(&tarball),
            "Uploading policy pack"
        );
        let version_tag = self
            .client
            .publish(&identity.org, &metadata, &tarball)
            .map_err(|source| PolicyPackError::network("publish", source))?;

        let published = PackIdentity::new(identity.org.clone(), metadata.name)
            .with_version_tag(version_tag);
        let permalink = published.permalink(&self.console_url, &published.version_tag);
        tracing::info!(%permalink, "Published policy pack");
        Ok(PublishedPack {
            identity: published,
            permalink,
        })
    }

    /// Build the archive for `dir` using the runtime's packaging convention.
    pub fn package(&self, dir: &Path, runtime: &Runtime) -> Result<Vec<u8>> {
        match runtime {
            Runtime::NodeJs => self
                .npm_pack(dir)
                .map_err(|source| PolicyPackError::Packaging {
                    activity: "running npm pack",
                    source,
                }),
            Runtime::Python => {
                let mut excludes: Vec<&str> = DEFAULT_EXCLUDES.to_vec();
                excludes.push(self.layout.virtualenv_dir.as_str());
                archive::tar_gz_directory(dir, &self.layout.package_dir, &excludes).map_err(
                    |source| PolicyPackError::Packaging {
                        activity: "creating the .tgz",
                        source,
                    },
                )
            }
            Runtime::Unsupported(name) => Err(PolicyPackError::UnsupportedRuntime {
                runtime: name.clone(),
                manifest: self.layout.manifest_file.clone(),
            }),
        }
    }

    /// `npm pack` writes `<name>-<version>.tgz` into the directory and prints
    /// its file name last; read it back and remove it.
    fn npm_pack(&self, dir: &Path) -> anyhow::Result<Vec<u8>> {
        let command = CommandSpec::new(&self.tools.npm, ["pack"], dir);
        let output = self.runner.run(&command)?;
        let stdout = output.stdout_lossy();
        let file_name = stdout
            .lines()
            .map(str::trim)
            .rev()
            .find(|line| !line.is_empty())
            .ok_or_else(|| anyhow!("`{command}` did not report a tarball name"))?;

        let tarball = dir.join(file_name);
        let bytes = fs::read(&tarball)
            .with_context(|| format!("failed to read {}", tarball.display()))?;
        fs::remove_file(&tarball)
            .with_context(|| format!("failed to remove {}", tarball.display()))?;
        Ok(bytes)
    }
}
