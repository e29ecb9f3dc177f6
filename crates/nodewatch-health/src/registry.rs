//! Node registry collaborator.
//!
//! The registry is the source of truth for which nodes exist. The engine
//! only reads from it.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use nodewatch_state::{Node, NodeId};

use crate::error::RegistryError;

/// Boxed future returned by [`Registry`] methods.
pub type RegistryFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RegistryError>> + Send + 'a>>;

/// Read access to the node registry.
pub trait Registry: Send + Sync {
    /// All registered nodes.
    fn list_nodes(&self) -> RegistryFuture<'_, Vec<Node>>;

    /// The metadata document URI for a node, if the owner published one.
    fn metadata_uri(&self, node_id: NodeId) -> RegistryFuture<'_, Option<String>>;
}

/// A registry over a fixed node list.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    nodes: Vec<Node>,
    metadata_uris: HashMap<NodeId, String>,
}

impl StaticRegistry {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            metadata_uris: HashMap::new(),
        }
    }

    pub fn with_metadata_uri(mut self, node_id: NodeId, uri: impl Into<String>) -> Self {
        self.metadata_uris.insert(node_id, uri.into());
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

impl Registry for StaticRegistry {
    fn list_nodes(&self) -> RegistryFuture<'_, Vec<Node>> {
        let nodes = self.nodes.clone();
        Box::pin(async move { Ok(nodes) })
    }

    fn metadata_uri(&self, node_id: NodeId) -> RegistryFuture<'_, Option<String>> {
        let result = if self.nodes.iter().any(|n| n.id == node_id) {
            Ok(self.metadata_uris.get(&node_id).cloned())
        } else {
            Err(RegistryError::UnknownNode(node_id))
        };
        Box::pin(async move { result })
    }
}
