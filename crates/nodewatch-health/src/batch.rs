//! Batch prober: bounded fan-out over a node set.
//!
//! Nodes are probed in sequential chunks of `concurrency`. Every probe in a
//! chunk runs as its own task and the chunk is joined before the next one
//! starts, so one slow node holds up only its chunk, and only until the
//! probe timeout.

use std::collections::HashMap;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use nodewatch_state::{HealthResult, Node, NodeId, NodeStatus, epoch_millis};

use crate::probe::ProbeClient;

/// Default number of probes in flight.
pub const DEFAULT_CONCURRENCY: usize = 5;

impl ProbeClient {
    /// Probe every node, at most `concurrency` at a time.
    ///
    /// Returns exactly one result per input node, in input order.
    pub async fn probe_all(&self, nodes: &[Node], concurrency: usize) -> Vec<HealthResult> {
        let concurrency = concurrency.max(1);
        debug!(nodes = nodes.len(), concurrency, "batch probe starting");

        let mut results = Vec::with_capacity(nodes.len());
        for chunk in nodes.chunks(concurrency) {
            let mut set = JoinSet::new();
            for (index, node) in chunk.iter().enumerate() {
                let client = self.clone();
                let node_id = node.id;
                let endpoint = node.http_endpoint.clone();
                set.spawn(async move { (index, client.probe(node_id, &endpoint).await) });
            }

            let mut slots: Vec<Option<HealthResult>> = vec![None; chunk.len()];
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, result)) => slots[index] = Some(result),
                    Err(e) => warn!(error = %e, "probe task failed"),
                }
            }

            // A panicked task still yields a result for its node.
            for (slot, node) in slots.into_iter().zip(chunk) {
                results.push(slot.unwrap_or_else(|| failed_result(node)));
            }
        }

        let online = results.iter().filter(|r| r.is_online()).count();
        debug!(probed = results.len(), online, "batch probe finished");
        results
    }
}

fn failed_result(node: &Node) -> HealthResult {
    HealthResult {
        node_id: node.id,
        http_endpoint: node.http_endpoint.clone(),
        status: NodeStatus::Error,
        version: None,
        latency_ms: None,
        last_checked: epoch_millis(),
        error: Some("probe task failed".to_string()),
    }
}

/// Index results by node id. Later results for the same id win.
pub fn health_result_map(
    results: impl IntoIterator<Item = HealthResult>,
) -> HashMap<NodeId, HealthResult> {
    results.into_iter().map(|r| (r.node_id, r)).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;
    use crate::transport::mock::{MockTransport, response};

    fn nodes(count: u32) -> Vec<Node> {
        (1..=count)
            .map(|i| Node::new(i, format!("node{i}.example"), i % 2 == 0))
            .collect()
    }

    #[tokio::test]
    async fn one_result_per_node_in_order() {
        let transport = Arc::new(MockTransport::respond(200, b""));
        let client = ProbeClient::new(transport.clone());
        let nodes = nodes(12);

        let results = client.probe_all(&nodes, 5).await;
        assert_eq!(results.len(), 12);
        let ids: Vec<NodeId> = results.iter().map(|r| r.node_id).collect();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert_eq!(transport.calls(), 12);
    }

    #[tokio::test]
    async fn failures_are_results_not_errors() {
        let transport = MockTransport::new(|req| {
            let result = if req.url.contains("node2.") {
                Err(TransportError::Connect("refused".into()))
            } else if req.url.contains("node3.") {
                Ok(response(500, b""))
            } else {
                Ok(response(200, b""))
            };
            (Duration::ZERO, result)
        });
        let client = ProbeClient::new(Arc::new(transport));
        let mut nodes = nodes(3);
        nodes.push(Node::new(4, "", true));

        let results = client.probe_all(&nodes, 2).await;
        let statuses: Vec<NodeStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                NodeStatus::Online,
                NodeStatus::Offline,
                NodeStatus::Error,
                NodeStatus::Unknown
            ]
        );
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        let transport = Arc::new(MockTransport::respond(200, b""));
        let client = ProbeClient::new(transport.clone());
        assert!(client.probe_all(&[], 5).await.is_empty());
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let transport = Arc::new(MockTransport::new(|_| {
            (Duration::from_millis(100), Ok(response(200, b"")))
        }));
        let client = ProbeClient::new(transport.clone());

        let results = client.probe_all(&nodes(11), 3).await;
        assert_eq!(results.len(), 11);
        assert_eq!(transport.max_in_flight(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_run_sequentially() {
        let transport = Arc::new(MockTransport::new(|_| {
            (Duration::from_secs(1), Ok(response(200, b"")))
        }));
        let client = ProbeClient::new(transport);

        let start = tokio::time::Instant::now();
        client.probe_all(&nodes(10), 5).await;
        let elapsed = start.elapsed();
        // Two chunks of one second each.
        assert!(elapsed >= Duration::from_secs(2), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_node_bounded_by_timeout() {
        let transport = MockTransport::new(|req| {
            let delay = if req.url.contains("node1.") {
                Duration::from_secs(3600)
            } else {
                Duration::ZERO
            };
            (delay, Ok(response(200, b"")))
        });
        let client = ProbeClient::new(Arc::new(transport)).with_timeout(Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        let results = client.probe_all(&nodes(4), 2).await;
        assert!(start.elapsed() < Duration::from_secs(6));
        assert_eq!(results[0].status, NodeStatus::Offline);
        assert_eq!(results[0].error.as_deref(), Some("Request timeout"));
        assert!(results[1..].iter().all(|r| r.is_online()));
    }

    #[tokio::test]
    async fn zero_concurrency_is_treated_as_one() {
        let transport = Arc::new(MockTransport::respond(200, b""));
        let client = ProbeClient::new(transport.clone());
        assert_eq!(client.probe_all(&nodes(3), 0).await.len(), 3);
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn result_map_has_one_entry_per_id() {
        let transport = MockTransport::new(|req| {
            let status = if req.url.contains("offline") { 500 } else { 200 };
            (Duration::ZERO, Ok(response(status, b"")))
        });
        let client = ProbeClient::new(Arc::new(transport));
        let nodes = vec![
            Node::new(1, "a.example", true),
            Node::new(2, "b.example", true),
            Node::new(1, "offline.example", true),
        ];

        let map = health_result_map(client.probe_all(&nodes, 5).await);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1].status, NodeStatus::Error);
        assert_eq!(map[&2].status, NodeStatus::Online);
    }
}
