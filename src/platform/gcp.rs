//! Google Cloud detection through the compute metadata server.

use super::{bounded, deadline, metadata_client, Platform, PlatformError, PlatformProbe};
use crate::context::Context;
use crate::env::env_opt;
use async_trait::async_trait;
use tokio::time::Instant;

/// Overrides the metadata server host. When set, the process is assumed to
/// run on GCP.
pub const GCE_METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Default metadata server address.
pub const GCE_METADATA_IP: &str = "169.254.169.254";

const FLAVOR_HEADER: &str = "Metadata-Flavor";
const FLAVOR_GOOGLE: &str = "Google";
const PROJECT_ID_PATH: &str = "project/project-id";
const INSTANCE_NAME_PATH: &str = "instance/name";

/// Reports [`Platform::Gcp`] when the metadata server answers.
///
/// Project id and instance name are best effort: a failed lookup leaves the
/// field empty.
#[derive(Debug, Clone)]
pub struct GcpProbe {
    client: reqwest::Client,
    host: String,
    host_from_env: bool,
}

impl Default for GcpProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl GcpProbe {
    pub fn new() -> Self {
        match env_opt(GCE_METADATA_HOST_ENV) {
            Some(host) => Self {
                host_from_env: true,
                ..Self::with_host(host)
            },
            None => Self::with_host(GCE_METADATA_IP),
        }
    }

    /// Probe against `host` (`host[:port]`, no scheme).
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            client: metadata_client(),
            host: host.into(),
            host_from_env: false,
        }
    }

    /// Whether the metadata server identifies itself as Google's.
    pub async fn on_gce(&self) -> bool {
        self.on_gce_by(deadline()).await
    }

    async fn on_gce_by(&self, deadline: Instant) -> bool {
        if self.host_from_env {
            return true;
        }
        let check = self.client.get(format!("http://{}", self.host)).send();
        let resp = match bounded(deadline, check).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "gce metadata server unreachable");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "gce metadata server unreachable");
                return false;
            }
        };
        resp.headers()
            .get(FLAVOR_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == FLAVOR_GOOGLE)
            .unwrap_or(false)
    }

    async fn get(&self, path: &str, deadline: Instant) -> Result<String, PlatformError> {
        let url = format!("http://{}/computeMetadata/v1/{}", self.host, path);
        let resp = bounded(
            deadline,
            self.client
                .get(url)
                .header(FLAVOR_HEADER, FLAVOR_GOOGLE)
                .send(),
        )
        .await??;

        if !resp.status().is_success() {
            return Err(PlatformError::Status(resp.status().as_u16()));
        }
        Ok(bounded(deadline, resp.text()).await??.trim().to_string())
    }

    pub async fn project_id(&self) -> Result<String, PlatformError> {
        self.get(PROJECT_ID_PATH, deadline()).await
    }

    pub async fn instance_name(&self) -> Result<String, PlatformError> {
        self.get(INSTANCE_NAME_PATH, deadline()).await
    }
}

fn or_empty(field: &str, res: Result<String, PlatformError>) -> String {
    res.unwrap_or_else(|e| {
        tracing::debug!(error = %e, field, "gce metadata lookup failed");
        String::new()
    })
}

#[async_trait]
impl PlatformProbe for GcpProbe {
    fn name(&self) -> &'static str {
        "gcp"
    }

    async fn probe(&self, _ctx: &Context) -> Option<Platform> {
        let deadline = deadline();
        if !self.on_gce_by(deadline).await {
            return None;
        }
        let (project_id, instance_name) = tokio::join!(
            self.get(PROJECT_ID_PATH, deadline),
            self.get(INSTANCE_NAME_PATH, deadline)
        );
        Some(Platform::Gcp {
            project_id: or_empty("project_id", project_id),
            instance_name: or_empty("instance_name", instance_name),
        })
    }
}
