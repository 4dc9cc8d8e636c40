//! Error taxonomy shared by publishing and installation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyPackError {
    #[error(
        "could not parse policy pack name '{input}'; must be of the form <org-name>/<policy-pack-name>"
    )]
    IdentityParse { input: String },

    #[error("failed to publish policies because {manifest} specifies an unsupported runtime {runtime}")]
    UnsupportedRuntime { runtime: String, manifest: String },

    #[error("policy service {operation} failed: {source}")]
    Network {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("could not publish policies because of error {activity}: {source}")]
    Packaging {
        activity: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("{action} {}: {source}", .path.display())]
    Staging {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to load policy project at {}: {source}", .path.display())]
    ManifestLoad {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("saving project at {}: {source}", .path.display())]
    ManifestSave {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "failed to install dependencies of policy pack; you may need to re-run `{command}` in {:?} before this policy pack works",
        .dir
    )]
    Bootstrap {
        dir: PathBuf,
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("policy pack operation cancelled before {step}")]
    Cancelled { step: &'static str },
}

impl PolicyPackError {
    pub fn identity(input: impl Into<String>) -> Self {
        Self::IdentityParse {
            input: input.into(),
        }
    }

    pub fn network(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Network { operation, source }
    }

    pub fn staging(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Staging {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn manifest_load(path: impl Into<PathBuf>, source: anyhow::Error) -> Self {
        Self::ManifestLoad {
            path: path.into(),
            source,
        }
    }

    pub fn bootstrap(
        dir: impl Into<PathBuf>,
        command: impl Into<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Bootstrap {
            dir: dir.into(),
            command: command.into(),
            source,
        }
    }
}

/// Result alias for policy pack operations.
pub type Result<T> = std::result::Result<T, PolicyPackError>;
