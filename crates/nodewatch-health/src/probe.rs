//! Probe client: one gRPC-Web version call per node.
//!
//! A probe never fails: every outcome, including misconfiguration and
//! timeouts, is folded into a [`HealthResult`].

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use nodewatch_state::{HealthResult, NodeId, NodeStatus, epoch_millis};

use crate::error::ProbeError;
use crate::grpc_web;
use crate::transport::{HttpRequest, Transport};

/// Default per-probe timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fully qualified path of the version RPC.
pub const DEFAULT_SERVICE_PATH: &str = "xmtp.xmtpv4.metadata_api.MetadataApi/GetVersion";

/// Version reported for nodes that answered without a decodable version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Issues health probes through a [`Transport`].
#[derive(Clone)]
pub struct ProbeClient {
    transport: Arc<dyn Transport>,
    service_path: String,
    timeout: Duration,
}

impl ProbeClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            service_path: DEFAULT_SERVICE_PATH.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_service_path(mut self, service_path: impl Into<String>) -> Self {
        self.service_path = service_path.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Probe a node with the client's default timeout.
    pub async fn probe(&self, node_id: NodeId, http_endpoint: &str) -> HealthResult {
        self.probe_with_timeout(node_id, http_endpoint, self.timeout)
            .await
    }

    /// Probe a node, giving up after `timeout`.
    ///
    /// An empty endpoint returns `unknown` without touching the network.
    /// Every other path records the elapsed time as latency.
    pub async fn probe_with_timeout(
        &self,
        node_id: NodeId,
        http_endpoint: &str,
        timeout: Duration,
    ) -> HealthResult {
        if http_endpoint.trim().is_empty() {
            debug!(node_id, "node has no http endpoint");
            return HealthResult {
                node_id,
                http_endpoint: String::new(),
                status: NodeStatus::Unknown,
                version: None,
                latency_ms: None,
                last_checked: epoch_millis(),
                error: Some(ProbeError::Configuration.to_string()),
            };
        }

        let url = probe_url(http_endpoint, &self.service_path);
        debug!(node_id, %url, "probing node");

        let start = Instant::now();
        let outcome = match tokio::time::timeout(timeout, self.call(&url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout),
        };
        let latency_ms = u32::try_from(start.elapsed().as_millis()).unwrap_or(u32::MAX);

        let result = match outcome {
            Ok(version) => HealthResult {
                node_id,
                http_endpoint: http_endpoint.to_string(),
                status: NodeStatus::Online,
                version: Some(version.unwrap_or_else(|| UNKNOWN_VERSION.to_string())),
                latency_ms: Some(latency_ms),
                last_checked: epoch_millis(),
                error: None,
            },
            Err(e) => HealthResult {
                node_id,
                http_endpoint: http_endpoint.to_string(),
                status: e.status(),
                version: None,
                latency_ms: Some(latency_ms),
                last_checked: epoch_millis(),
                error: Some(e.to_string()),
            },
        };

        debug!(
            node_id,
            status = %result.status,
            latency_ms,
            version = result.version.as_deref().unwrap_or("-"),
            "probe complete"
        );
        result
    }

    /// Send the version request. `Ok(None)` means the node answered but
    /// the payload carried no readable version.
    async fn call(&self, url: &str) -> Result<Option<String>, ProbeError> {
        let request = HttpRequest::post(url, grpc_web::empty_request())
            .header("content-type", grpc_web::CONTENT_TYPE)
            .header("accept", grpc_web::CONTENT_TYPE);

        let response = self.transport.execute(request).await?;
        if !response.status.is_success() {
            return Err(ProbeError::Protocol {
                code: response.status.as_u16(),
                reason: response
                    .status
                    .canonical_reason()
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(grpc_web::decode_version(&response.body))
    }
}

/// Trim, default to `https://`, and drop one trailing slash.
pub fn normalize_endpoint(http_endpoint: &str) -> String {
    let trimmed = http_endpoint.trim();
    let mut base = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    if base.ends_with('/') {
        base.pop();
    }
    base
}

/// Full URL of the version RPC on a node.
pub fn probe_url(http_endpoint: &str, service_path: &str) -> String {
    format!(
        "{}/{}",
        normalize_endpoint(http_endpoint),
        service_path.trim_start_matches('/')
    )
}
