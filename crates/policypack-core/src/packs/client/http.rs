use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::Deserialize;
use url::Url;

use crate::env::PolicyConfig;

use super::{PackMetadata, PolicyClient};

/// Talks to the policy service REST API.
///
/// Publishing is a three step exchange: register the version, upload the
/// archive to the returned URI, then mark the version complete.
pub struct HttpPolicyClient {
    api_url: Url,
    token: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePolicyPackResponse {
    version: u64,
    #[serde(rename = "uploadURI")]
    upload_uri: String,
    #[serde(default)]
    required_headers: HashMap<String, String>,
}

impl HttpPolicyClient {
    pub fn new(api_url: Url, token: Option<String>) -> Result<Self> {
        Ok(Self {
            api_url,
            token,
            client: Client::builder()
                .build()
                .context("failed to build policy service client")?,
        })
    }

    pub fn from_config(cfg: &PolicyConfig) -> Result<Self> {
        Self::new(cfg.api_url.clone(), cfg.access_token.clone())
    }

    /// API URL with `segments` appended, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("policy service URL {} cannot be a base", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }
}

impl PolicyClient for HttpPolicyClient {
    fn publish(&self, org: &str, metadata: &PackMetadata, archive: &[u8]) -> Result<String> {
        let create_url = self.endpoint(&["api", "orgs", org, "policypacks"])?;
        let created: CreatePolicyPackResponse = self
            .authorized(self.client.post(create_url.clone()))
            .json(metadata)
            .send()
            .with_context(|| format!("failed to register policy pack at {create_url}"))?
            .error_for_status()
            .with_context(|| format!("policy pack registration rejected by {create_url}"))?
            .json()
            .context("policy pack registration response is not valid JSON")?;

        let mut upload = self.client.put(&created.upload_uri).body(archive.to_vec());
        for (name, value) in &created.required_headers {
            upload = upload.header(name.as_str(), value.as_str());
        }
        upload
            .send()
            .context("failed to upload policy pack archive")?
            .error_for_status()
            .context("policy pack archive upload failed")?;

        let version = created.version.to_string();
        let complete_url = self.endpoint(&[
            "api",
            "orgs",
            org,
            "policypacks",
            metadata.name.as_str(),
            "versions",
            version.as_str(),
            "complete",
        ])?;
        self.authorized(self.client.post(complete_url.clone()))
            .send()
            .with_context(|| format!("failed to complete publish at {complete_url}"))?
            .error_for_status()
            .with_context(|| format!("publish completion rejected by {complete_url}"))?;

        tracing::debug!(org, name = %metadata.name, %version, "policy pack registered");
        Ok(version)
    }

    fn download(&self, location: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(location)
            .header(ACCEPT, "application/x-gzip")
            .send()
            .with_context(|| format!("failed to download {location}"))?
            .error_for_status()
            .with_context(|| format!("download failed {location}"))?;
        let bytes = response
            .bytes()
            .context("failed to read policy pack archive body")?;
        Ok(bytes.to_vec())
    }
}
