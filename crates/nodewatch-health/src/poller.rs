//! Polling scheduler: drives batch probes into the status cache.
//!
//! A background task owns the timer. Checks start on mount, on node-set
//! change, on manual refresh, when the consumer becomes visible, and on
//! every timer tick while visible. Only one check runs at a time; a
//! trigger that arrives while one is running is dropped, never queued.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use nodewatch_state::{NetworkStatusInfo, Node, StatusCache};

use crate::aggregate::{StatusCounts, aggregate};
use crate::batch::DEFAULT_CONCURRENCY;
use crate::probe::ProbeClient;

/// Default time between timer-driven checks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    pub interval: Duration,
    pub concurrency: usize,
    /// Timer ticks on/off. Other triggers run either way.
    pub enabled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            concurrency: DEFAULT_CONCURRENCY,
            enabled: true,
        }
    }
}

/// Why a check did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another check was already running.
    InProgress,
    /// The node set is empty.
    NoNodes,
    /// The scheduler has been shut down.
    Stopped,
}

/// Result of asking for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Completed { probed: usize },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Mount,
    NodesChanged,
    Manual,
    Visible,
    Tick,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Mount => "mount",
            Trigger::NodesChanged => "nodes-changed",
            Trigger::Manual => "manual",
            Trigger::Visible => "visible",
            Trigger::Tick => "tick",
        }
    }
}

/// State shared between the handle, the timer loop, and check tasks.
struct Shared {
    client: ProbeClient,
    cache: StatusCache,
    nodes: RwLock<Arc<Vec<Node>>>,
    concurrency: usize,
    /// Held for the duration of a check.
    checking: tokio::sync::Mutex<()>,
    /// Set on shutdown. Cache writes happen under this lock.
    stopped: Mutex<bool>,
    generation: watch::Sender<u64>,
}

impl Shared {
    fn nodes(&self) -> Arc<Vec<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_check(&self, trigger: Trigger) -> CheckOutcome {
        if self.is_stopped() {
            return CheckOutcome::Skipped(SkipReason::Stopped);
        }
        let Ok(_guard) = self.checking.try_lock() else {
            debug!(trigger = trigger.as_str(), "check in progress, trigger ignored");
            return CheckOutcome::Skipped(SkipReason::InProgress);
        };
        let nodes = self.nodes();
        if nodes.is_empty() {
            debug!(trigger = trigger.as_str(), "no nodes to check");
            return CheckOutcome::Skipped(SkipReason::NoNodes);
        }

        let started = Instant::now();
        let results = self.client.probe_all(&nodes, self.concurrency).await;
        let probed = results.len();
        let online = results.iter().filter(|r| r.is_online()).count();

        {
            let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
            if *stopped {
                debug!(probed, "scheduler stopped, discarding results");
                return CheckOutcome::Skipped(SkipReason::Stopped);
            }
            self.cache.set_many(results);
        }
        self.generation.send_modify(|g| *g += 1);

        info!(
            trigger = trigger.as_str(),
            probed,
            online,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "health check complete"
        );
        CheckOutcome::Completed { probed }
    }
}

fn spawn_check(shared: &Arc<Shared>, trigger: Trigger) {
    let shared = shared.clone();
    tokio::spawn(async move {
        shared.run_check(trigger).await;
    });
}

/// Handle to a running polling scheduler.
///
/// Dropping the handle shuts the scheduler down.
pub struct Poller {
    shared: Arc<Shared>,
    visible_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    /// Start the scheduler and run the initial check.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        client: ProbeClient,
        cache: StatusCache,
        nodes: Vec<Node>,
        config: PollerConfig,
    ) -> Self {
        let (generation, _) = watch::channel(0u64);
        let shared = Arc::new(Shared {
            client,
            cache,
            nodes: RwLock::new(Arc::new(nodes)),
            concurrency: config.concurrency.max(1),
            checking: tokio::sync::Mutex::new(()),
            stopped: Mutex::new(false),
            generation,
        });
        let (visible_tx, visible_rx) = watch::channel(true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        spawn_check(&shared, Trigger::Mount);

        let loop_shared = shared.clone();
        let handle = tokio::spawn(async move {
            run_timer_loop(loop_shared, config, visible_rx, shutdown_rx).await;
        });

        info!(
            interval_ms = config.interval.as_millis() as u64,
            concurrency = config.concurrency,
            enabled = config.enabled,
            "poller started"
        );

        Self {
            shared,
            visible_tx,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Run a check now, in the caller's task.
    pub async fn refresh(&self) -> CheckOutcome {
        self.shared.run_check(Trigger::Manual).await
    }

    /// Replace the node set. A changed, non-empty set triggers a check.
    ///
    /// Returns whether the set changed.
    pub fn set_nodes(&self, nodes: Vec<Node>) -> bool {
        if self.shared.is_stopped() {
            return false;
        }
        {
            let mut current = self
                .shared
                .nodes
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if **current == nodes {
                return false;
            }
            *current = Arc::new(nodes);
        }
        let count = self.shared.nodes().len();
        debug!(nodes = count, "node set changed");
        if count > 0 {
            spawn_check(&self.shared, Trigger::NodesChanged);
        }
        true
    }

    /// Suspend (hidden) or resume (visible) timer ticks.
    ///
    /// Becoming visible runs one check immediately and restarts the timer.
    pub fn set_visible(&self, visible: bool) {
        self.visible_tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    pub fn is_visible(&self) -> bool {
        *self.visible_tx.borrow()
    }

    /// Whether a check is running right now.
    pub fn is_checking(&self) -> bool {
        self.shared.checking.try_lock().is_err()
    }

    /// Completed-check counter; changes after every check that wrote results.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.generation.subscribe()
    }

    pub fn nodes(&self) -> Arc<Vec<Node>> {
        self.shared.nodes()
    }

    pub fn cache(&self) -> &StatusCache {
        &self.shared.cache
    }

    /// Network status over the current node set and cache snapshot.
    pub fn network_status(&self) -> NetworkStatusInfo {
        aggregate(&self.shared.nodes(), &self.shared.cache.snapshot())
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_nodes(&self.shared.nodes(), &self.shared.cache.snapshot())
    }

    /// Stop the timer. Results of checks still in flight are discarded.
    pub fn shutdown(&self) {
        {
            let mut stopped = self
                .shared
                .stopped
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *stopped {
                return;
            }
            *stopped = true;
        }
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        info!("poller stopped");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Timer loop. Ticks are only polled while enabled and visible, so none
/// accumulate while hidden.
async fn run_timer_loop(
    shared: Arc<Shared>,
    config: PollerConfig,
    mut visible_rx: watch::Receiver<bool>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut visible = *visible_rx.borrow_and_update();

    loop {
        tokio::select! {
            _ = ticker.tick(), if config.enabled && visible => {
                spawn_check(&shared, Trigger::Tick);
            }
            changed = visible_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let now_visible = *visible_rx.borrow_and_update();
                if now_visible && !visible {
                    debug!("consumer visible, resuming");
                    ticker.reset();
                    spawn_check(&shared, Trigger::Visible);
                } else if !now_visible && visible {
                    debug!("consumer hidden, suspending timer");
                }
                visible = now_visible;
            }
            _ = shutdown.changed() => {
                debug!("poller loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, response};
    use nodewatch_state::{NetworkStatus, NodeStatus};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn nodes(count: u32) -> Vec<Node> {
        (1..=count)
            .map(|i| Node::new(i, format!("node{i}.example"), true))
            .collect()
    }

    fn quick(delay: Duration) -> Arc<MockTransport> {
        Arc::new(MockTransport::new(move |_| (delay, Ok(response(200, b"")))))
    }

    fn start(transport: &Arc<MockTransport>, nodes: Vec<Node>, config: PollerConfig) -> Poller {
        let client = ProbeClient::new(transport.clone());
        Poller::start(client, StatusCache::new(), nodes, config)
    }

    async fn next_generation(rx: &mut watch::Receiver<u64>) -> u64 {
        rx.changed().await.unwrap();
        *rx.borrow_and_update()
    }

    #[tokio::test(start_paused = true)]
    async fn mount_runs_initial_check() {
        let transport = quick(Duration::ZERO);
        let poller = start(&transport, nodes(3), PollerConfig::default());
        let mut rx = poller.subscribe();

        assert_eq!(next_generation(&mut rx).await, 1);
        assert_eq!(transport.calls(), 3);
        assert_eq!(poller.cache().len(), 3);
        assert_eq!(poller.network_status().status, NetworkStatus::Operational);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_ticks_every_interval() {
        let transport = quick(Duration::ZERO);
        let start_at = Instant::now();
        let poller = start(&transport, nodes(2), PollerConfig::default());
        let mut rx = poller.subscribe();

        assert_eq!(next_generation(&mut rx).await, 1);
        assert_eq!(next_generation(&mut rx).await, 2);
        assert!(start_at.elapsed() >= DEFAULT_INTERVAL);
        assert_eq!(next_generation(&mut rx).await, 3);
        assert!(start_at.elapsed() >= DEFAULT_INTERVAL * 2);
        assert_eq!(transport.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_while_checking_is_a_no_op() {
        let transport = quick(Duration::from_secs(1));
        let config = PollerConfig {
            enabled: false,
            ..PollerConfig::default()
        };
        let poller = start(&transport, nodes(2), config);
        let mut rx = poller.subscribe();

        // Let the mount check start and block on the slow transport.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(poller.is_checking());
        assert_eq!(poller.refresh().await, CheckOutcome::Skipped(SkipReason::InProgress));
        assert_eq!(transport.calls(), 2);

        assert_eq!(next_generation(&mut rx).await, 1);
        assert_eq!(transport.calls(), 2);
        assert_eq!(poller.refresh().await, CheckOutcome::Completed { probed: 2 });
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timer_still_allows_manual_refresh() {
        let transport = quick(Duration::ZERO);
        let config = PollerConfig {
            enabled: false,
            ..PollerConfig::default()
        };
        let poller = start(&transport, nodes(2), config);
        let mut rx = poller.subscribe();
        assert_eq!(next_generation(&mut rx).await, 1);

        tokio::time::sleep(DEFAULT_INTERVAL * 5).await;
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(transport.calls(), 2);

        assert_eq!(poller.refresh().await, CheckOutcome::Completed { probed: 2 });
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_consumer_suspends_ticks_without_backlog() {
        let transport = quick(Duration::ZERO);
        let poller = start(&transport, nodes(1), PollerConfig::default());
        let mut rx = poller.subscribe();
        poller.set_visible(false);
        assert_eq!(next_generation(&mut rx).await, 1);

        tokio::time::sleep(DEFAULT_INTERVAL * 4).await;
        assert_eq!(*rx.borrow(), 1);
        assert_eq!(transport.calls(), 1);

        // Becoming visible runs exactly one check.
        poller.set_visible(true);
        assert_eq!(next_generation(&mut rx).await, 2);
        tokio::time::sleep(DEFAULT_INTERVAL - Duration::from_secs(1)).await;
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(transport.calls(), 2);

        // Then the timer resumes on its regular period.
        assert_eq!(next_generation(&mut rx).await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_visibility_is_ignored() {
        let transport = quick(Duration::ZERO);
        let poller = start(&transport, nodes(1), PollerConfig::default());
        let mut rx = poller.subscribe();
        assert_eq!(next_generation(&mut rx).await, 1);

        poller.set_visible(true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*rx.borrow(), 1);
        assert!(poller.is_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn node_set_change_triggers_check() {
        let transport = quick(Duration::ZERO);
        let config = PollerConfig {
            enabled: false,
            ..PollerConfig::default()
        };
        let poller = start(&transport, nodes(1), config);
        let mut rx = poller.subscribe();
        assert_eq!(next_generation(&mut rx).await, 1);

        assert!(!poller.set_nodes(nodes(1)));
        assert!(poller.set_nodes(nodes(3)));
        assert_eq!(next_generation(&mut rx).await, 2);
        assert_eq!(transport.calls(), 4);
        assert_eq!(poller.status_counts().online, 3);

        // An empty set changes the nodes but does not probe.
        assert!(poller.set_nodes(Vec::new()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*rx.borrow(), 2);
        assert_eq!(poller.refresh().await, CheckOutcome::Skipped(SkipReason::NoNodes));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_mount_does_not_probe() {
        let transport = quick(Duration::ZERO);
        let poller = start(&transport, Vec::new(), PollerConfig::default());
        tokio::time::sleep(DEFAULT_INTERVAL * 2).await;
        assert_eq!(transport.calls(), 0);
        assert!(poller.cache().is_empty());
        assert_eq!(poller.network_status().status, NetworkStatus::Outage);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_discards_in_flight_results() {
        let transport = quick(Duration::from_secs(1));
        let poller = start(&transport, nodes(2), PollerConfig::default());
        let rx = poller.subscribe();

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(poller.is_checking());
        poller.shutdown();

        tokio::time::sleep(DEFAULT_INTERVAL * 3).await;
        assert!(poller.cache().is_empty());
        assert_eq!(*rx.borrow(), 0);
        assert_eq!(transport.calls(), 2);
        assert_eq!(poller.refresh().await, CheckOutcome::Skipped(SkipReason::Stopped));
        assert!(!poller.set_nodes(nodes(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn results_overwrite_previous_status() {
        let flaky = Arc::new(AtomicBool::new(false));
        let flag = flaky.clone();
        let transport = Arc::new(MockTransport::new(move |_| {
            let status = if flag.load(Ordering::SeqCst) { 500 } else { 200 };
            (Duration::ZERO, Ok(response(status, b"")))
        }));
        let config = PollerConfig {
            enabled: false,
            ..PollerConfig::default()
        };
        let poller = start(&transport, nodes(1), config);
        let mut rx = poller.subscribe();
        assert_eq!(next_generation(&mut rx).await, 1);
        assert_eq!(poller.cache().get(1).unwrap().status, NodeStatus::Online);

        flaky.store(true, Ordering::SeqCst);
        poller.refresh().await;
        assert_eq!(poller.cache().get(1).unwrap().status, NodeStatus::Error);
        assert_eq!(poller.cache().len(), 1);
    }
}
