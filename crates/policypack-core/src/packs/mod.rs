use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{PolicyPackError, Result};

pub use bootstrap::Bootstrapper;
pub use client::{HttpPolicyClient, LocalRegistry, PackMetadata, PolicyClient};
pub use command::{CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use identity::{PackIdentity, install_path};
pub use install::{InstallOutcome, Installer};
pub use manifest::{Manifest, RuntimeInfo, VIRTUALENV_OPTION};
pub use publish::{PublishedPack, Publisher};
pub use runtime::Runtime;

pub mod archive;
mod bootstrap;
pub mod client;
mod command;
mod identity;
mod install;
mod manifest;
mod publish;
mod runtime;

/// A policy pack the service requires for a deployment, pinned to one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredPolicy {
    pub name: String,
    pub version: u64,
    #[serde(default)]
    pub version_tag: String,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
    pub pack_location: String,
}

impl RequiredPolicy {
    /// Version component of the install path.
    ///
    /// Packs published before version tags existed only carry the numeric
    /// version, so that is used when the tag is empty.
    pub fn version_label(&self) -> String {
        if self.version_tag.is_empty() {
            self.version.to_string()
        } else {
            self.version_tag.clone()
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken, step: &'static str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(PolicyPackError::Cancelled { step });
    }
    Ok(())
}

fn sanitize_segment(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' => '_',
            other => other,
        })
        .collect()
}
