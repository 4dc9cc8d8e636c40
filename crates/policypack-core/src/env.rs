use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use url::Url;

const DEFAULT_CONSOLE_URL: &str = "https://app.pulumi.com";
const DEFAULT_API_URL: &str = "https://api.pulumi.com";

/// Environment-driven configuration for publishing and installing policy packs.
#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub install_root: PathBuf,
    pub default_org: String,
    pub console_url: String,
    pub api_url: Url,
    pub access_token: Option<String>,
    pub layout: PackLayout,
    pub tools: ToolCommands,
}

impl PolicyConfig {
    /// Build a [`PolicyConfig`] by reading the documented POLICY_* variables.
    pub fn from_env() -> Result<Self> {
        let install_root = env::var("POLICY_PACK_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".policies"));

        let default_org = env::var("POLICY_DEFAULT_ORG").unwrap_or_default();

        let console_url = env::var("POLICY_CONSOLE_URL")
            .unwrap_or_else(|_| DEFAULT_CONSOLE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let api_raw = env::var("POLICY_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_url = Url::parse(&api_raw).context("POLICY_API_URL is not a valid URL")?;

        let access_token = env::var("POLICY_ACCESS_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());

        let mut tools = ToolCommands::default();
        if let Ok(npm) = env::var("POLICY_NPM_CMD") {
            tools.npm = npm;
        }
        if let Ok(python) = env::var("POLICY_PYTHON_CMD") {
            tools.python = python;
        }

        Ok(Self {
            install_root,
            default_org,
            console_url,
            api_url,
            access_token,
            layout: PackLayout::default(),
            tools,
        })
    }

    /// Configuration rooted at `root` with every other value at its default.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: root.into(),
            default_org: String::new(),
            console_url: DEFAULT_CONSOLE_URL.to_string(),
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            access_token: None,
            layout: PackLayout::default(),
            tools: ToolCommands::default(),
        }
    }
}

/// Fixed names inside a pack directory and its archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackLayout {
    /// Single top-level folder of every pack archive.
    pub package_dir: String,
    /// Manifest file relative to the pack root.
    pub manifest_file: String,
    /// Environment directory created by the python bootstrap.
    pub virtualenv_dir: String,
}

impl PackLayout {
    pub fn manifest_path(&self, pack_dir: &Path) -> PathBuf {
        pack_dir.join(&self.manifest_file)
    }
}

impl Default for PackLayout {
    fn default() -> Self {
        Self {
            package_dir: "package".into(),
            manifest_file: "PulumiPolicy.yaml".into(),
            virtualenv_dir: "venv".into(),
        }
    }
}

/// Executables used for packaging and dependency installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommands {
    pub npm: String,
    pub python: String,
}

impl Default for ToolCommands {
    fn default() -> Self {
        let python = if cfg!(windows) { "python" } else { "python3" };
        Self {
            npm: "npm".into(),
            python: python.into(),
        }
    }
}
