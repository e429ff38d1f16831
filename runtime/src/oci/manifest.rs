//! Manifest resolution.
//!
//! Requests the schema 2 manifest for a tag or digest. When the registry
//! refuses it, the manifest list is requested instead; a successful list
//! ends the pull with the platform candidates the user can choose from.

use docker_pull_core::error::{PlatformCandidate, PullError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::auth::AuthNegotiator;
use super::progress::PullObserver;
use super::reference::ImageReference;

/// Docker image manifest, schema version 2.
pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Docker manifest list (multi-platform), schema version 2.
pub const MANIFEST_LIST_V2: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Content descriptor of the image config blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDescriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// Content descriptor of one filesystem layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
    /// Direct download locations, for layers not served by the registry
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Image manifest: config blob plus layers, bottom layer first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub config: ConfigDescriptor,
    pub layers: Vec<LayerDescriptor>,
}

impl Manifest {
    pub fn config_digest(&self) -> &str {
        &self.config.digest
    }
}

#[derive(Debug, Deserialize)]
struct ManifestList {
    manifests: Vec<ManifestListEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestListEntry {
    digest: String,
    #[serde(default)]
    platform: serde_json::Map<String, serde_json::Value>,
}

impl From<ManifestListEntry> for PlatformCandidate {
    fn from(entry: ManifestListEntry) -> Self {
        let platform = entry
            .platform
            .into_iter()
            .map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (key, value)
            })
            .collect();
        PlatformCandidate {
            digest: entry.digest,
            platform,
        }
    }
}

/// Parse a manifest list body into platform candidates, in document order.
pub fn parse_manifest_list(body: &[u8]) -> Result<Vec<PlatformCandidate>> {
    let list: ManifestList = serde_json::from_slice(body)?;
    Ok(list.manifests.into_iter().map(PlatformCandidate::from).collect())
}

/// Fetches manifests from one registry.
pub struct ManifestResolver {
    http: reqwest::Client,
    base_url: String,
}

impl ManifestResolver {
    /// `base_url` is the registry API root, e.g. `https://host/v2`.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    pub fn manifest_url(&self, reference: &ImageReference) -> String {
        format!(
            "{}/{}/manifests/{}",
            self.base_url,
            reference.repository(),
            reference.tag_or_digest()
        )
    }

    /// Resolve the schema 2 manifest of `reference`.
    ///
    /// # Errors
    ///
    /// - [`PullError::ManifestListFound`] when only a manifest list exists
    /// - [`PullError::ManifestError`] when both requests fail
    pub async fn resolve(
        &self,
        reference: &ImageReference,
        negotiator: &AuthNegotiator,
        observer: &mut dyn PullObserver,
    ) -> Result<Manifest> {
        let repository = reference.repository();
        let url = self.manifest_url(reference);

        let (status, body) = self.get(&url, negotiator, MANIFEST_V2).await?;
        if status == StatusCode::OK {
            let manifest: Manifest = serde_json::from_slice(&body)?;
            tracing::info!(
                repository = %repository,
                reference = %reference.tag_or_digest(),
                config = %manifest.config.digest,
                layers = manifest.layers.len(),
                "Manifest resolved"
            );
            return Ok(manifest);
        }

        let body = String::from_utf8_lossy(&body).into_owned();
        tracing::warn!(
            repository = %repository,
            status = status.as_u16(),
            "Cannot fetch manifest, trying manifest list"
        );
        observer.manifest_rejected(status.as_u16(), &body);

        let (list_status, list_body) = self.get(&url, negotiator, MANIFEST_LIST_V2).await?;
        if list_status == StatusCode::OK {
            let candidates = parse_manifest_list(&list_body)?;
            tracing::info!(
                repository = %repository,
                platforms = candidates.len(),
                "Tag resolves to a manifest list"
            );
            return Err(PullError::ManifestListFound {
                repository,
                candidates,
            });
        }

        Err(PullError::ManifestError {
            repository,
            status: status.as_u16(),
            body,
            list_status: list_status.as_u16(),
            list_body: String::from_utf8_lossy(&list_body).into_owned(),
        })
    }

    async fn get(
        &self,
        url: &str,
        negotiator: &AuthNegotiator,
        accept_type: &str,
    ) -> Result<(StatusCode, Vec<u8>)> {
        let headers = negotiator.authorize(accept_type).await?;
        tracing::debug!(url = %url, accept = %accept_type, "Fetching manifest");
        let resp = self.http.get(url).headers(headers).send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        Ok((status, body.to_vec()))
    }
}
