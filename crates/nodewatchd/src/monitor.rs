//! Long-running monitor mode.
//!
//! Loads the node set from the config file, prefetches operator metadata,
//! starts the poller and logs the network status after every check. The
//! node set is re-read once per poll interval so config edits take effect
//! without a restart. On unix, SIGUSR1 pauses and resumes periodic polling.

use std::path::Path;
use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use nodewatch_health::{Poller, Registry, Transport};
use nodewatch_state::{NodeId, StatusCache};

use crate::commands::{build_client, build_fetcher, open_store};
use crate::config::NodewatchConfig;
use crate::registry::FileRegistry;

pub async fn run_monitor(
    config_path: &Path,
    data_dir: &Path,
    transport: Arc<dyn Transport>,
) -> anyhow::Result<()> {
    info!(config = %config_path.display(), "nodewatch monitor starting");

    let config = NodewatchConfig::from_file(config_path)?;
    let poll = config.poller_config()?;
    let store = open_store(data_dir)?;
    let registry = Arc::new(FileRegistry::new(config_path));
    let nodes = registry.list_nodes().await?;
    info!(nodes = nodes.len(), "node set loaded");

    // ── Metadata prefetch ────────────────────────────────────────
    let fetcher = build_fetcher(&config, registry.clone(), transport.clone(), store)?;
    let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
    let prefetch = tokio::spawn(async move {
        match fetcher.fetch_all(&ids, false).await {
            Ok(fetched) => info!(
                nodes = fetched.len(),
                with_metadata = fetched.values().filter(|m| m.is_some()).count(),
                "metadata prefetched"
            ),
            Err(e) => warn!(error = %e, "metadata prefetch failed"),
        }
    });

    // ── Poller ───────────────────────────────────────────────────
    let client = build_client(&config, transport)?;
    let poller = Poller::start(client, StatusCache::new(), nodes, poll);
    let mut checks = poller.subscribe();

    let mut relist = tokio::time::interval(poll.interval);
    relist.set_missed_tick_behavior(MissedTickBehavior::Skip);
    relist.tick().await;

    let mut pause = PauseSignal::new()?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // ── Event loop ───────────────────────────────────────────────
    loop {
        tokio::select! {
            changed = checks.changed() => {
                if changed.is_err() {
                    break;
                }
                log_status(&poller);
            }
            _ = relist.tick() => match registry.list_nodes().await {
                Ok(nodes) => {
                    let count = nodes.len();
                    if poller.set_nodes(nodes) {
                        info!(nodes = count, "node set changed");
                    }
                }
                Err(e) => warn!(error = %e, "failed to reload node set"),
            },
            _ = pause.recv() => {
                let visible = !poller.is_visible();
                poller.set_visible(visible);
                info!(polling = visible, "periodic polling toggled");
            }
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!(error = %e, "ctrl-c handler failed");
                }
                info!("shutdown signal received");
                break;
            }
        }
    }

    poller.shutdown();
    prefetch.abort();
    info!("nodewatch monitor stopped");
    Ok(())
}

fn log_status(poller: &Poller) {
    let info = poller.network_status();
    let counts = poller.status_counts();
    info!(
        status = info.status.label(),
        canonical = format_args!("{}/{}", info.canonical_online, info.canonical_total),
        community = format_args!("{}/{}", info.community_online, info.community_total),
        average_latency_ms = ?info.average_latency_ms,
        online = counts.online,
        offline = counts.offline,
        error = counts.error,
        unknown = counts.unknown,
        "network status"
    );
}

/// SIGUSR1 listener. Never fires on other platforms.
struct PauseSignal {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl PauseSignal {
    #[cfg(unix)]
    fn new() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            signal: Some(signal(SignalKind::user_defined1())?),
        })
    }

    #[cfg(not(unix))]
    fn new() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return;
            }
            debug!("SIGUSR1 stream closed");
            self.signal = None;
        }
        std::future::pending::<()>().await
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}
