//! Registry backed by the `[[nodes]]` section of the config file.

use std::path::PathBuf;

use nodewatch_health::{Registry, RegistryError, RegistryFuture};
use nodewatch_state::{Node, NodeId};

use crate::config::NodewatchConfig;

/// Re-reads the config file on every call, so edits change the node set
/// seen by a running monitor.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    path: PathBuf,
}

impl FileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<NodewatchConfig, RegistryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{}: {e}", self.path.display())))?;
        NodewatchConfig::parse(&content)
            .map_err(|e| RegistryError::Unavailable(format!("{}: {e:#}", self.path.display())))
    }
}

impl Registry for FileRegistry {
    fn list_nodes(&self) -> RegistryFuture<'_, Vec<Node>> {
        Box::pin(async move { Ok(self.load().await?.nodes()) })
    }

    fn metadata_uri(&self, node_id: NodeId) -> RegistryFuture<'_, Option<String>> {
        Box::pin(async move {
            let config = self.load().await?;
            let entry = config
                .node(node_id)
                .ok_or(RegistryError::UnknownNode(node_id))?;
            Ok(entry.metadata_uri.clone())
        })
    }
}
