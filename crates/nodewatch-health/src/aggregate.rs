//! Network status aggregation.
//!
//! Everything here is a pure function of a node list and a health map, so
//! it can be recomputed after every check without coordination.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use nodewatch_state::{
    HealthResult, NetworkStatus, NetworkStatusInfo, Node, NodeId, NodeStatus, Timestamp,
};

/// Classify the network from the canonical online ratio.
///
/// Thresholds are percentages: ≥80 operational, ≥50 degraded, ≥1 major
/// outage, otherwise outage. No canonical nodes at all is an outage.
pub fn classify(canonical_online: u32, canonical_total: u32) -> NetworkStatus {
    if canonical_total == 0 {
        return NetworkStatus::Outage;
    }
    // online / total >= p / 100, in integers.
    let scaled = u64::from(canonical_online) * 100;
    let total = u64::from(canonical_total);
    if scaled >= 80 * total {
        NetworkStatus::Operational
    } else if scaled >= 50 * total {
        NetworkStatus::Degraded
    } else if scaled >= total {
        NetworkStatus::MajorOutage
    } else {
        NetworkStatus::Outage
    }
}

/// Reduce a node set and its latest health results into one network status.
///
/// Results for ids outside `nodes` are ignored. Latency is averaged over
/// every online node that reported one, canonical or not.
pub fn aggregate(nodes: &[Node], health: &HashMap<NodeId, HealthResult>) -> NetworkStatusInfo {
    let mut canonical_online = 0u32;
    let mut canonical_total = 0u32;
    let mut community_online = 0u32;
    let mut community_total = 0u32;
    let mut latency_sum = 0u64;
    let mut latency_count = 0u64;
    let mut last_checked: Option<Timestamp> = None;

    for node in nodes {
        if node.is_canonical {
            canonical_total += 1;
        } else {
            community_total += 1;
        }

        let Some(result) = health.get(&node.id) else {
            continue;
        };

        if result.is_online() {
            if node.is_canonical {
                canonical_online += 1;
            } else {
                community_online += 1;
            }
            if let Some(latency) = result.latency_ms {
                latency_sum += u64::from(latency);
                latency_count += 1;
            }
        }

        last_checked = last_checked.max(Some(result.last_checked));
    }

    NetworkStatusInfo {
        status: classify(canonical_online, canonical_total),
        canonical_online,
        canonical_total,
        community_online,
        community_total,
        average_latency_ms: rounded_mean(latency_sum, latency_count),
        last_checked,
    }
}

/// Mean rounded half-up to the nearest integer.
fn rounded_mean(sum: u64, count: u64) -> Option<u32> {
    if count == 0 {
        return None;
    }
    let mean = (2 * sum + count) / (2 * count);
    Some(u32::try_from(mean).unwrap_or(u32::MAX))
}

/// Per-status node counts over the current node set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub online: u32,
    pub offline: u32,
    pub error: u32,
    pub unknown: u32,
}

impl StatusCounts {
    /// Count each node once by its cached status; nodes never probed are unknown.
    pub fn from_nodes(nodes: &[Node], health: &HashMap<NodeId, HealthResult>) -> Self {
        let mut counts = Self::default();
        for node in nodes {
            match health.get(&node.id).map(|r| r.status) {
                Some(NodeStatus::Online) => counts.online += 1,
                Some(NodeStatus::Offline) => counts.offline += 1,
                Some(NodeStatus::Error) => counts.error += 1,
                Some(NodeStatus::Unknown) | None => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> u32 {
        self.online + self.offline + self.error + self.unknown
    }
}

/// Human-readable age of a timestamp, e.g. "3 minutes ago".
pub fn format_relative_time(timestamp: Option<Timestamp>, now: Timestamp) -> String {
    let Some(timestamp) = timestamp else {
        return "Never".to_string();
    };
    let seconds = now.saturating_sub(timestamp) / 1000;
    if seconds < 5 {
        "Just now".to_string()
    } else if seconds < 60 {
        format!("{seconds} seconds ago")
    } else if seconds < 3600 {
        let minutes = seconds / 60;
        format!("{minutes} minute{} ago", plural(minutes))
    } else {
        let hours = seconds / 3600;
        format!("{hours} hour{} ago", plural(hours))
    }
}

fn plural(n: u64) -> &'static str {
    if n == 1 { "" } else { "s" }
}
