//! One-shot CLI commands: `check`, `probe` and `metadata`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, info};

use nodewatch_health::{
    MetadataFetcher, ProbeClient, Registry, StatusCounts, Transport, aggregate, health_result_map,
};
use nodewatch_state::{MetadataStore, Node, NodeFilter, NodeId, epoch_millis};

use crate::config::NodewatchConfig;
use crate::output::{self, CheckReport};
use crate::registry::FileRegistry;

/// File name of the metadata database inside the data directory.
pub const DB_FILE: &str = "nodewatch.redb";

pub fn open_store(data_dir: &Path) -> anyhow::Result<MetadataStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let path = data_dir.join(DB_FILE);
    let store = MetadataStore::open(&path)?;
    debug!(path = %path.display(), "metadata store opened");
    Ok(store)
}

pub fn build_client(
    config: &NodewatchConfig,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<ProbeClient> {
    Ok(ProbeClient::new(transport)
        .with_timeout(config.probe_timeout()?)
        .with_service_path(config.probe.service_path.clone()))
}

pub fn build_fetcher(
    config: &NodewatchConfig,
    registry: Arc<dyn Registry>,
    transport: Arc<dyn Transport>,
    store: MetadataStore,
) -> anyhow::Result<MetadataFetcher> {
    Ok(MetadataFetcher::new(registry, transport, store)
        .with_ipfs_gateway(config.metadata.ipfs_gateway.clone())
        .with_timeout(config.metadata_timeout()?)
        .with_concurrency(config.poll.concurrency))
}

/// Probe every registered node once and print the network status.
///
/// A given filter is persisted and becomes the default for later runs.
/// The filter only narrows the printed table; the network status always
/// covers every node.
pub async fn check(
    config_path: &Path,
    data_dir: &Path,
    filter: Option<NodeFilter>,
    transport: Arc<dyn Transport>,
    json: bool,
) -> anyhow::Result<()> {
    let config = NodewatchConfig::from_file(config_path)?;
    let store = open_store(data_dir)?;
    let filter = match filter {
        Some(filter) => {
            store.set_filter(filter)?;
            info!(?filter, "node filter saved");
            filter
        }
        None => store.filter()?,
    };

    let nodes = FileRegistry::new(config_path).list_nodes().await?;
    let client = build_client(&config, transport)?;
    let results = client
        .probe_all(&nodes, config.poller_config()?.concurrency)
        .await;
    let health = health_result_map(results);

    let network = aggregate(&nodes, &health);
    let counts = StatusCounts::from_nodes(&nodes, &health);
    let shown: Vec<Node> = nodes.into_iter().filter(|n| filter.matches(n)).collect();

    if json {
        let report = CheckReport {
            network: &network,
            counts,
            results: shown.iter().filter_map(|n| health.get(&n.id)).collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let mut metadata = HashMap::new();
    for node in &shown {
        if let Some(m) = store.get(node.id)? {
            metadata.insert(node.id, m);
        }
    }
    let now = epoch_millis();
    print!("{}", output::format_table(&shown, &health, &metadata, now));
    println!();
    print!("{}", output::format_network(&network, &counts, now));
    Ok(())
}

/// Probe a single endpoint, outside the registry.
pub async fn probe(
    config_path: &Path,
    endpoint: &str,
    node_id: NodeId,
    timeout: Option<Duration>,
    transport: Arc<dyn Transport>,
    json: bool,
) -> anyhow::Result<()> {
    let config = NodewatchConfig::load_or_default(config_path)?;
    let mut client = build_client(&config, transport)?;
    if let Some(timeout) = timeout {
        client = client.with_timeout(timeout);
    }

    let result = client.probe(node_id, endpoint).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let label = Node::new(node_id, endpoint, false).display_name();
        println!("{}", output::format_result(&result, &label, epoch_millis()));
    }
    Ok(())
}

/// Show cached metadata, fetching stale entries, or clear the cache.
pub async fn metadata(
    config_path: &Path,
    data_dir: &Path,
    refresh: bool,
    clear: bool,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;
    if clear {
        let removed = store.clear()?;
        println!("cleared {removed} cached metadata entries");
        return Ok(());
    }

    let config = NodewatchConfig::from_file(config_path)?;
    let registry = Arc::new(FileRegistry::new(config_path));
    let nodes = registry.list_nodes().await?;
    let fetcher = build_fetcher(&config, registry, transport, store)?;

    let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
    let fetched = fetcher.fetch_all(&ids, refresh).await?;
    for node in &nodes {
        let metadata = fetched.get(&node.id).and_then(Option::as_ref);
        println!("{}", output::format_metadata(node, metadata));
    }
    Ok(())
}
