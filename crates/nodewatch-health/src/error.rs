//! Error types for the health engine.

use nodewatch_state::{NodeId, NodeStatus};

/// Failure of a single HTTP exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("invalid request: {0}")]
    Request(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("HTTP exchange failed: {0}")]
    Http(String),
}

impl TransportError {
    /// Network-level failures mean the node is unreachable rather than misconfigured.
    pub fn is_network(&self) -> bool {
        !matches!(
            self,
            TransportError::InvalidEndpoint { .. } | TransportError::Request(_)
        )
    }
}

/// Why a probe did not produce an online result.
///
/// Never returned to callers of [`ProbeClient::probe`](crate::ProbeClient::probe);
/// it is folded into the [`HealthResult`](nodewatch_state::HealthResult).
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("No HTTP address configured")]
    Configuration,

    #[error("{0}")]
    Transport(#[from] TransportError),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP {code}: {reason}")]
    Protocol { code: u16, reason: String },
}

impl ProbeError {
    /// Node status this failure maps to.
    pub fn status(&self) -> NodeStatus {
        match self {
            ProbeError::Configuration => NodeStatus::Unknown,
            ProbeError::Transport(e) if e.is_network() => NodeStatus::Offline,
            ProbeError::Transport(_) => NodeStatus::Error,
            ProbeError::Timeout => NodeStatus::Offline,
            ProbeError::Protocol { .. } => NodeStatus::Error,
        }
    }
}

/// Failure of the external node registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),
}

/// Failure while resolving node metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("metadata request timed out")]
    Timeout,

    #[error("metadata request returned HTTP {0}")]
    Status(u16),

    #[error("invalid metadata document: {0}")]
    Document(String),

    #[error(transparent)]
    Store(#[from] nodewatch_state::StateError),
}
