//! Control-plane metadata resolution.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use nozzle_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Ownership metadata attached to envelopes for human-readable routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub workload_name: String,
    pub org_name: String,
    pub org_id: String,
    pub space_name: String,
    pub space_id: String,
}

/// Resolves workload identifiers to ownership metadata.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Looks up one workload. `Ok(None)` means confirmed missing; an error
    /// means the lookup itself failed and may succeed on retry.
    async fn resolve(&self, workload_id: &str) -> Result<Option<Ownership>>;

    /// Bulk listing of every known workload, for refresh-mode caching.
    async fn list_all(&self) -> Result<HashMap<String, Ownership>>;
}

/// JSON shape of a single workload from the control-plane API.
#[derive(Debug, Deserialize)]
struct WorkloadResponse {
    guid: String,
    name: String,
    organization: NamedRef,
    space: NamedRef,
}

#[derive(Debug, Deserialize)]
struct NamedRef {
    guid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct WorkloadListResponse {
    resources: Vec<WorkloadResponse>,
}

impl From<WorkloadResponse> for Ownership {
    fn from(w: WorkloadResponse) -> Self {
        Self {
            workload_name: w.name,
            org_name: w.organization.name,
            org_id: w.organization.guid,
            space_name: w.space.name,
            space_id: w.space.guid,
        }
    }
}

/// Resolver backed by the control-plane HTTP API.
///
/// `GET {base}/v3/workloads/{id}` for single lookups (404 means confirmed
/// missing), `GET {base}/v3/workloads` for the bulk listing.
pub struct HttpResolver {
    base_url: String,
    http: reqwest::Client,
}

impl HttpResolver {
    pub fn new(base_url: impl Into<String>, skip_ssl_verify: bool) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(skip_ssl_verify)
            .build()
            .map_err(|e| Error::transport(e.to_string()))?;
        Ok(Self { base_url, http })
    }
}

#[async_trait]
impl MetadataResolver for HttpResolver {
    async fn resolve(&self, workload_id: &str) -> Result<Option<Ownership>> {
        let url = format!("{}/v3/workloads/{}", self.base_url, workload_id);
        debug!(url = %url, "Resolving workload metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::resolver(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Metadata lookup returned error");
            return Err(Error::resolver(format!(
                "metadata endpoint returned {status}: {body}"
            )));
        }

        let workload: WorkloadResponse = response
            .json()
            .await
            .map_err(|e| Error::resolver(format!("invalid metadata response: {e}")))?;
        Ok(Some(workload.into()))
    }

    async fn list_all(&self) -> Result<HashMap<String, Ownership>> {
        let url = format!("{}/v3/workloads", self.base_url);
        debug!(url = %url, "Listing workload metadata");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::resolver(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::resolver(format!(
                "metadata listing returned {status}"
            )));
        }

        let listing: WorkloadListResponse = response
            .json()
            .await
            .map_err(|e| Error::resolver(format!("invalid metadata listing: {e}")))?;

        Ok(listing
            .resources
            .into_iter()
            .map(|w| (w.guid.clone(), w.into()))
            .collect())
    }
}
