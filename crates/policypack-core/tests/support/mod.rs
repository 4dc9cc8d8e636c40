#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};

use anyhow::{Result, anyhow, bail};
use policypack_core::packs::archive::{DEFAULT_EXCLUDES, tar_gz_directory};
use policypack_core::packs::{CommandOutput, CommandRunner, CommandSpec};
use policypack_core::{PackMetadata, PolicyClient, RequiredPolicy};
use tokio_util::sync::CancellationToken;

/// In-memory policy service keyed by `<org>/<name>/<version>` locations.
#[derive(Default)]
pub struct FakeClient {
    archives: Mutex<HashMap<String, Vec<u8>>>,
    downloads: AtomicUsize,
    uploads: AtomicUsize,
    barrier: Option<Barrier>,
    cancel_on_download: Option<CancellationToken>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every download waits until `parties` downloads are in flight.
    pub fn with_barrier(parties: usize) -> Self {
        Self {
            barrier: Some(Barrier::new(parties)),
            ..Self::default()
        }
    }

    /// Cancel `token` once a download has been served.
    pub fn cancelling(token: CancellationToken) -> Self {
        Self {
            cancel_on_download: Some(token),
            ..Self::default()
        }
    }

    pub fn insert(&self, location: &str, archive: Vec<u8>) {
        self.archives
            .lock()
            .unwrap()
            .insert(location.to_string(), archive);
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn location(org: &str, name: &str, version: &str) -> String {
        format!("{org}/{name}/{version}")
    }
}

impl PolicyClient for FakeClient {
    fn publish(&self, org: &str, metadata: &PackMetadata, archive: &[u8]) -> Result<String> {
        let version = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        let version = if metadata.version_tag.is_empty() {
            version.to_string()
        } else {
            metadata.version_tag.clone()
        };
        self.insert(
            &Self::location(org, &metadata.name, &version),
            archive.to_vec(),
        );
        Ok(version)
    }

    fn download(&self, location: &str) -> Result<Vec<u8>> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait();
        }
        let archive = self
            .archives
            .lock()
            .unwrap()
            .get(location)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {location}"));
        if let Some(token) = &self.cancel_on_download {
            token.cancel();
        }
        archive
    }
}

/// Records every tool call. `npm pack` behaves like the real tool: it writes
/// a `package/` tarball of the working directory and prints its name.
#[derive(Default)]
pub struct FakeRunner {
    commands: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(command: &str) -> Self {
        Self {
            fail_on: Some(command.to_string()),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let rendered = command.to_string();
        self.commands.lock().unwrap().push(rendered.clone());
        if self.fail_on.as_deref() == Some(rendered.as_str()) {
            bail!("`{rendered}` exited with exit status: 1");
        }
        if command.args == ["pack"] {
            let bytes = tar_gz_directory(&command.cwd, "package", DEFAULT_EXCLUDES)?;
            let file_name = "policy-pack-1.0.0.tgz";
            fs::write(command.cwd.join(file_name), bytes)?;
            return Ok(CommandOutput {
                stdout: format!("{file_name}\n").into_bytes(),
            });
        }
        Ok(CommandOutput::default())
    }
}

pub fn write_pack(dir: &Path, manifest: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("PulumiPolicy.yaml"), manifest).unwrap();
    fs::write(dir.join("index.js"), "module.exports = [];\n").unwrap();
}

/// Archive of a pack with the given manifest, in the shared wire format.
pub fn pack_archive(manifest: &str) -> Vec<u8> {
    let src = tempfile::tempdir().unwrap();
    write_pack(src.path(), manifest);
    tar_gz_directory(src.path(), "package", DEFAULT_EXCLUDES).unwrap()
}

pub fn required_policy(name: &str, version_tag: &str, location: &str) -> RequiredPolicy {
    RequiredPolicy {
        name: name.to_string(),
        version: 1,
        version_tag: version_tag.to_string(),
        config: Default::default(),
        pack_location: location.to_string(),
    }
}

/// Entries in `dir` that look like staging directories.
pub fn staging_leftovers(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(".tmp"))
        })
        .collect()
}
