//! Transport collaborators that move pack archives to and from the policy
//! service.

use anyhow::Result;
use serde::Serialize;

mod http;
mod local;

pub use http::HttpPolicyClient;
pub use local::LocalRegistry;

/// Metadata sent along with an uploaded archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMetadata {
    pub name: String,
    pub display_name: String,
    /// Empty lets the service assign the next version.
    pub version_tag: String,
    pub runtime: String,
}

/// Upload and download of pack archives.
///
/// Both calls block the caller. Failures are passed through untouched; retry
/// decisions belong to the caller.
pub trait PolicyClient: Send + Sync {
    /// Upload an archive and return the version tag it was published under.
    fn publish(&self, org: &str, metadata: &PackMetadata, archive: &[u8]) -> Result<String>;

    /// Fetch the archive stored at `location`.
    fn download(&self, location: &str) -> Result<Vec<u8>>;
}
