//! Domain types for the node health monitor.
//!
//! Nodes are supplied by the registry and never mutated here. Health
//! results are produced by probes; network status is derived from both and
//! never stored.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Registry-assigned node identifier.
pub type NodeId = u32;

/// Unix epoch in milliseconds.
pub type Timestamp = u64;

// ── Node ──────────────────────────────────────────────────────────

/// A network participant as read from the registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// HTTP endpoint, with or without scheme. May be empty.
    pub http_endpoint: String,
    /// Canonical (core) nodes drive the network status; the rest are community nodes.
    pub is_canonical: bool,
    /// Owner address of the node, if the registry reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Node {
    pub fn new(id: NodeId, http_endpoint: impl Into<String>, is_canonical: bool) -> Self {
        Self {
            id,
            http_endpoint: http_endpoint.into(),
            is_canonical,
            owner: None,
        }
    }

    /// Display name derived from the node id.
    pub fn display_name(&self) -> String {
        format!("Node #{}", self.id)
    }
}

// ── Health ────────────────────────────────────────────────────────

/// Outcome of the most recent probe of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Online,
    Offline,
    Error,
    Unknown,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Offline => "offline",
            NodeStatus::Error => "error",
            NodeStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of a single probe. Always replaced whole, never patched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResult {
    pub node_id: NodeId,
    /// Endpoint as supplied to the probe (empty when none was configured).
    pub http_endpoint: String,
    pub status: NodeStatus,
    /// Node software version; `"unknown"` when the node answered but the
    /// payload could not be decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Wall-clock time from probe start to classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u32>,
    pub last_checked: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthResult {
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }
}

// ── Metadata ──────────────────────────────────────────────────────

/// Operator-supplied metadata resolved from a node's token URI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeMetadata {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<SocialLinks>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convos: Option<String>,
}

/// A metadata cache slot. `value == None` records that the node has no
/// usable metadata, which is still a valid (cacheable) answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetadataCacheEntry {
    pub value: Option<NodeMetadata>,
    pub fetched_at: Timestamp,
}

impl MetadataCacheEntry {
    /// Valid iff `now - fetched_at <= ttl_ms`.
    pub fn is_valid_at(&self, now: Timestamp, ttl_ms: u64) -> bool {
        now.saturating_sub(self.fetched_at) <= ttl_ms
    }
}

// ── Network status ────────────────────────────────────────────────

/// Network-wide classification derived from the canonical online ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkStatus {
    /// ≥80% of canonical nodes online.
    Operational,
    /// 50–79%.
    Degraded,
    /// 1–49%.
    MajorOutage,
    /// 0%, or no canonical nodes at all.
    Outage,
}

impl NetworkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkStatus::Operational => "operational",
            NetworkStatus::Degraded => "degraded",
            NetworkStatus::MajorOutage => "major-outage",
            NetworkStatus::Outage => "outage",
        }
    }

    /// Human-readable banner text.
    pub fn label(&self) -> &'static str {
        match self {
            NetworkStatus::Operational => "All Systems Operational",
            NetworkStatus::Degraded => "Degraded Performance",
            NetworkStatus::MajorOutage => "Major Outage",
            NetworkStatus::Outage => "Outage",
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Aggregated view of the network. Recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkStatusInfo {
    pub status: NetworkStatus,
    pub canonical_online: u32,
    pub canonical_total: u32,
    pub community_online: u32,
    pub community_total: u32,
    pub average_latency_ms: Option<u32>,
    pub last_checked: Option<Timestamp>,
}

// ── Preferences ───────────────────────────────────────────────────

/// Node list filter, persisted across restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeFilter {
    #[default]
    All,
    Canonical,
    Community,
}

impl NodeFilter {
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodeFilter::All => true,
            NodeFilter::Canonical => node.is_canonical,
            NodeFilter::Community => !node.is_canonical,
        }
    }
}

impl std::str::FromStr for NodeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(NodeFilter::All),
            "canonical" => Ok(NodeFilter::Canonical),
            "community" => Ok(NodeFilter::Community),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
