//! Metadata fetcher: token URI → JSON document, cached with a TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use nodewatch_state::{MetadataStore, NodeId, NodeMetadata};

use crate::batch::DEFAULT_CONCURRENCY;
use crate::error::MetadataError;
use crate::registry::Registry;
use crate::transport::{HttpRequest, Transport};

/// Gateway that `ipfs://` URIs are rewritten to.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves node metadata through the registry and caches it in the store.
#[derive(Clone)]
pub struct MetadataFetcher {
    registry: Arc<dyn Registry>,
    transport: Arc<dyn Transport>,
    store: MetadataStore,
    ipfs_gateway: String,
    timeout: Duration,
    concurrency: usize,
}

impl MetadataFetcher {
    pub fn new(
        registry: Arc<dyn Registry>,
        transport: Arc<dyn Transport>,
        store: MetadataStore,
    ) -> Self {
        Self {
            registry,
            transport,
            store,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_ipfs_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.ipfs_gateway = gateway.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Metadata for one node.
    ///
    /// Unless `force` is set, a valid cached document is returned without
    /// any network access. A registry failure is returned and nothing is
    /// cached; every other failure is cached as "no metadata".
    pub async fn fetch(
        &self,
        node_id: NodeId,
        force: bool,
    ) -> Result<Option<NodeMetadata>, MetadataError> {
        if !force && self.store.is_valid(node_id)? {
            if let Some(cached) = self.store.get(node_id)? {
                debug!(node_id, "metadata cache hit");
                return Ok(Some(cached));
            }
        }

        let uri = self.registry.metadata_uri(node_id).await?;
        let metadata = self.resolve(node_id, uri).await;
        self.store.set(node_id, metadata.clone())?;
        Ok(metadata)
    }

    /// Metadata for many nodes, fetching only stale entries unless `force`.
    ///
    /// Any per-node failure, registry included, is cached as "no metadata".
    pub async fn fetch_all(
        &self,
        node_ids: &[NodeId],
        force: bool,
    ) -> Result<HashMap<NodeId, Option<NodeMetadata>>, MetadataError> {
        let mut stale = Vec::new();
        for &node_id in node_ids {
            if force || !self.store.is_valid(node_id)? {
                stale.push(node_id);
            }
        }
        debug!(requested = node_ids.len(), stale = stale.len(), force, "fetching metadata");

        for chunk in stale.chunks(self.concurrency) {
            let mut set = JoinSet::new();
            for &node_id in chunk {
                let fetcher = self.clone();
                set.spawn(async move {
                    let metadata = match fetcher.registry.metadata_uri(node_id).await {
                        Ok(uri) => fetcher.resolve(node_id, uri).await,
                        Err(e) => {
                            warn!(node_id, error = %e, "metadata uri lookup failed");
                            None
                        }
                    };
                    (node_id, metadata)
                });
            }
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((node_id, metadata)) => self.store.set(node_id, metadata)?,
                    Err(e) => warn!(error = %e, "metadata task failed"),
                }
            }
        }

        let mut map = HashMap::with_capacity(node_ids.len());
        for &node_id in node_ids {
            map.insert(node_id, self.store.get(node_id)?);
        }
        Ok(map)
    }

    /// Fetch the document behind `uri`, logging and swallowing failures.
    async fn resolve(&self, node_id: NodeId, uri: Option<String>) -> Option<NodeMetadata> {
        let Some(uri) = uri.filter(|u| !u.trim().is_empty()) else {
            debug!(node_id, "node has no metadata uri");
            return None;
        };
        match self.fetch_document(&uri).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!(node_id, %uri, error = %e, "metadata fetch failed");
                None
            }
        }
    }

    async fn fetch_document(&self, uri: &str) -> Result<NodeMetadata, MetadataError> {
        let url = resolve_uri(uri, &self.ipfs_gateway);
        let request = HttpRequest::get(url).header("accept", "application/json");

        let response = tokio::time::timeout(self.timeout, self.transport.execute(request))
            .await
            .map_err(|_| MetadataError::Timeout)??;
        if !response.status.is_success() {
            return Err(MetadataError::Status(response.status.as_u16()));
        }
        parse_document(&response.body)
    }
}

/// Rewrite `ipfs://` URIs onto an HTTP gateway.
pub fn resolve_uri(uri: &str, ipfs_gateway: &str) -> String {
    match uri.trim().strip_prefix("ipfs://") {
        Some(path) => format!("{}/{}", ipfs_gateway.trim_end_matches('/'), path),
        None => uri.trim().to_string(),
    }
}

/// Parse a metadata document. A missing or empty `description` is invalid.
pub fn parse_document(body: &[u8]) -> Result<NodeMetadata, MetadataError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| MetadataError::Document(e.to_string()))?;
    match value.get("description").and_then(|d| d.as_str()) {
        Some(description) if !description.is_empty() => {}
        _ => return Err(MetadataError::Document("missing description".to_string())),
    }
    serde_json::from_value(value).map_err(|e| MetadataError::Document(e.to_string()))
}
