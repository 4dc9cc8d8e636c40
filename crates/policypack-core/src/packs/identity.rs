use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{PolicyPackError, Result};

use super::sanitize_segment;

/// Organization, name and optional version tag of a policy pack.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackIdentity {
    pub org: String,
    pub name: String,
    /// Empty means the latest version.
    pub version_tag: String,
}

impl PackIdentity {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
            version_tag: String::new(),
        }
    }

    pub fn with_version_tag(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }

    /// Parse the canonical `<org>/<name>` form.
    ///
    /// An empty organization segment falls back to `default_org`.
    pub fn parse(input: &str, default_org: &str) -> Result<Self> {
        let segments: Vec<&str> = input.split('/').collect();
        match segments.as_slice() {
            [org, name] => Self::from_segments(input, org, name, "", default_org),
            _ => Err(PolicyPackError::identity(input)),
        }
    }

    /// Like [`PackIdentity::parse`] but also accepts `<org>/<name>/<version-tag>`.
    pub fn parse_versioned(input: &str, default_org: &str) -> Result<Self> {
        let segments: Vec<&str> = input.split('/').collect();
        match segments.as_slice() {
            [org, name] => Self::from_segments(input, org, name, "", default_org),
            [org, name, version] => Self::from_segments(input, org, name, version, default_org),
            _ => Err(PolicyPackError::identity(input)),
        }
    }

    fn from_segments(
        input: &str,
        org: &str,
        name: &str,
        version_tag: &str,
        default_org: &str,
    ) -> Result<Self> {
        let org = if org.is_empty() { default_org } else { org };
        let relative = |segment: &str| segment == "." || segment == "..";
        if org.is_empty() || name.is_empty() || [org, name, version_tag].into_iter().any(relative)
        {
            return Err(PolicyPackError::identity(input));
        }
        Ok(Self::new(org, name).with_version_tag(version_tag))
    }

    pub fn is_latest(&self) -> bool {
        self.version_tag.is_empty()
    }

    /// Console page of the pack, e.g. `https://app.example/acme/policypacks/secure`.
    pub fn url(&self, console_url: &str) -> String {
        format!(
            "{}/{}/policypacks/{}",
            console_url.trim_end_matches('/'),
            self.org,
            self.name
        )
    }

    /// Console page of one published version.
    pub fn permalink(&self, console_url: &str, version_tag: &str) -> String {
        format!("{}/{}", self.url(console_url), version_tag)
    }

    pub fn install_path(&self, root: &Path, version: &str) -> Result<PathBuf> {
        install_path(root, &self.org, &self.name, version)
    }
}

impl fmt::Display for PackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// Directory an installed pack lives in.
///
/// Pure function of its inputs so independent installers agree on the
/// destination without coordinating. Segments that are empty or name the
/// current or parent directory are rejected, so the result always stays
/// three levels below `root`.
pub fn install_path(root: &Path, org: &str, name: &str, version: &str) -> Result<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in [org, name, version] {
        let segment = sanitize_segment(segment);
        if matches!(segment.as_str(), "" | "." | "..") {
            return Err(PolicyPackError::identity(format!("{org}/{name}/{version}")));
        }
        path.push(segment);
    }
    Ok(path)
}
