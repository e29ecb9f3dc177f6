//! Terminal and JSON rendering for CLI commands.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use nodewatch_health::{StatusCounts, format_relative_time};
use nodewatch_state::{HealthResult, NetworkStatusInfo, Node, NodeId, NodeMetadata, Timestamp};

/// Machine-readable result of a `check` run.
#[derive(Debug, Serialize)]
pub struct CheckReport<'a> {
    pub network: &'a NetworkStatusInfo,
    pub counts: StatusCounts,
    pub results: Vec<&'a HealthResult>,
}

/// One line per health result.
pub fn format_result(result: &HealthResult, label: &str, now: Timestamp) -> String {
    let mut line = format!(
        "{:<12} {:<8} {:<12} {:>7}  {}",
        label,
        result.status,
        result.version.as_deref().unwrap_or("-"),
        result
            .latency_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string()),
        if result.http_endpoint.is_empty() {
            "-"
        } else {
            result.http_endpoint.as_str()
        },
    );
    let _ = write!(line, "  ({})", format_relative_time(Some(result.last_checked), now));
    if let Some(error) = &result.error {
        let _ = write!(line, "  {error}");
    }
    line
}

/// Display label for a node: operator name when known, else "Node #id".
pub fn node_label(node: &Node, metadata: Option<&NodeMetadata>) -> String {
    metadata
        .and_then(|m| m.operator_name.clone())
        .unwrap_or_else(|| node.display_name())
}

/// The per-node table for `nodes`, in the order given.
pub fn format_table(
    nodes: &[Node],
    health: &HashMap<NodeId, HealthResult>,
    metadata: &HashMap<NodeId, NodeMetadata>,
    now: Timestamp,
) -> String {
    let mut out = String::new();
    for node in nodes {
        let label = node_label(node, metadata.get(&node.id));
        match health.get(&node.id) {
            Some(result) => {
                let _ = writeln!(out, "{}", format_result(result, &label, now));
            }
            None => {
                let _ = writeln!(out, "{label:<12} unknown  (not checked)");
            }
        }
    }
    out
}

/// Summary block for the network status.
pub fn format_network(info: &NetworkStatusInfo, counts: &StatusCounts, now: Timestamp) -> String {
    let latency = info
        .average_latency_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{}\n  canonical: {}/{} online\n  community: {}/{} online\n  \
         counts: {} online, {} offline, {} error, {} unknown\n  \
         average latency: {}\n  last checked: {}\n",
        info.status.label(),
        info.canonical_online,
        info.canonical_total,
        info.community_online,
        info.community_total,
        counts.online,
        counts.offline,
        counts.error,
        counts.unknown,
        latency,
        format_relative_time(info.last_checked, now),
    )
}

/// One line per node for the `metadata` command.
pub fn format_metadata(node: &Node, metadata: Option<&NodeMetadata>) -> String {
    match metadata {
        Some(m) => format!(
            "{:<12} {:<20} {:<12} {}",
            node.display_name(),
            m.operator_name.as_deref().unwrap_or("-"),
            m.region.as_deref().unwrap_or("-"),
            m.description
        ),
        None => format!("{:<12} (no metadata)", node.display_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodewatch_state::{NetworkStatus, NodeStatus};

    fn result(status: NodeStatus, error: Option<&str>) -> HealthResult {
        HealthResult {
            node_id: 100,
            http_endpoint: "grpc.example.org".to_string(),
            status,
            version: Some("v1.2.0".to_string()),
            latency_ms: Some(42),
            last_checked: 1_000_000,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn result_line_contains_fields() {
        let line = format_result(&result(NodeStatus::Online, None), "Node #100", 1_010_000);
        assert!(line.starts_with("Node #100"));
        assert!(line.contains("online"));
        assert!(line.contains("v1.2.0"));
        assert!(line.contains("42ms"));
        assert!(line.contains("grpc.example.org"));
        assert!(line.contains("(10 seconds ago)"));
    }

    #[test]
    fn result_line_includes_error() {
        let line = format_result(
            &result(NodeStatus::Error, Some("HTTP 503: Service Unavailable")),
            "Node #100",
            1_000_000,
        );
        assert!(line.contains("Just now"));
        assert!(line.ends_with("HTTP 503: Service Unavailable"));
    }

    #[test]
    fn label_prefers_operator_name() {
        let node = Node::new(100, "a.example", true);
        assert_eq!(node_label(&node, None), "Node #100");
        let metadata = NodeMetadata {
            description: "d".to_string(),
            image: None,
            external_url: None,
            operator_name: Some("Acme".to_string()),
            region: None,
            social: None,
        };
        assert_eq!(node_label(&node, Some(&metadata)), "Acme");
    }

    #[test]
    fn metadata_lines() {
        let node = Node::new(7, "n.example", false);
        assert_eq!(format_metadata(&node, None), "Node #7      (no metadata)");
        let metadata = NodeMetadata {
            description: "local operator".to_string(),
            image: None,
            external_url: None,
            operator_name: None,
            region: Some("EU".to_string()),
            social: None,
        };
        let line = format_metadata(&node, Some(&metadata));
        assert!(line.contains(" EU "));
        assert!(line.ends_with("local operator"));
    }

    #[test]
    fn table_marks_unchecked_nodes() {
        let nodes = vec![Node::new(100, "a.example", true), Node::new(200, "", false)];
        let mut health = HashMap::new();
        health.insert(100, result(NodeStatus::Online, None));
        let table = format_table(&nodes, &health, &HashMap::new(), 1_000_000);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("not checked"));
    }

    #[test]
    fn network_summary() {
        let info = NetworkStatusInfo {
            status: NetworkStatus::Degraded,
            canonical_online: 5,
            canonical_total: 10,
            community_online: 1,
            community_total: 2,
            average_latency_ms: Some(37),
            last_checked: None,
        };
        let counts = StatusCounts {
            online: 6,
            offline: 5,
            error: 1,
            unknown: 0,
        };
        let text = format_network(&info, &counts, 0);
        assert!(text.starts_with("Degraded Performance\n"));
        assert!(text.contains("canonical: 5/10 online"));
        assert!(text.contains("average latency: 37ms"));
        assert!(text.contains("last checked: Never"));
    }

    #[test]
    fn report_serializes() {
        let info = NetworkStatusInfo {
            status: NetworkStatus::Outage,
            canonical_online: 0,
            canonical_total: 0,
            community_online: 0,
            community_total: 0,
            average_latency_ms: None,
            last_checked: None,
        };
        let health = result(NodeStatus::Offline, Some("Request timeout"));
        let report = CheckReport {
            network: &info,
            counts: StatusCounts::default(),
            results: vec![&health],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["network"]["status"], "outage");
        assert_eq!(json["results"][0]["status"], "offline");
    }
}
