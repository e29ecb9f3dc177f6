//! nodewatch.toml configuration parser.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodewatch_health::{DEFAULT_IPFS_GATEWAY, DEFAULT_SERVICE_PATH, PollerConfig};
use nodewatch_state::Node;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodewatchConfig {
    pub probe: ProbeConfig,
    pub poll: PollConfig,
    pub metadata: MetadataConfig,
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub timeout: String,
    pub service_path: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: "5s".to_string(),
            service_path: DEFAULT_SERVICE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval: String,
    pub concurrency: usize,
    pub enabled: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            concurrency: 5,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub ipfs_gateway: String,
    pub timeout: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            timeout: "10s".to_string(),
        }
    }
}

/// One `[[nodes]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: u32,
    #[serde(default)]
    pub http_endpoint: String,
    #[serde(default)]
    pub canonical: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_uri: Option<String>,
}

impl NodeEntry {
    pub fn to_node(&self) -> Node {
        Node {
            id: self.id,
            http_endpoint: self.http_endpoint.clone(),
            is_canonical: self.canonical,
            owner: self.owner.clone(),
        }
    }
}

impl NodewatchConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: NodewatchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.probe_timeout()?;
        self.metadata_timeout()?;
        self.poller_config()?;

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                bail!("duplicate node id {}", node.id);
            }
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> anyhow::Result<Duration> {
        positive_duration("probe.timeout", &self.probe.timeout)
    }

    pub fn metadata_timeout(&self) -> anyhow::Result<Duration> {
        positive_duration("metadata.timeout", &self.metadata.timeout)
    }

    pub fn poller_config(&self) -> anyhow::Result<PollerConfig> {
        if self.poll.concurrency == 0 {
            bail!("poll.concurrency must be at least 1");
        }
        Ok(PollerConfig {
            interval: positive_duration("poll.interval", &self.poll.interval)?,
            concurrency: self.poll.concurrency,
            enabled: self.poll.enabled,
        })
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(NodeEntry::to_node).collect()
    }

    pub fn node(&self, id: u32) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

fn positive_duration(field: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("{field} must be greater than zero"),
        None => bail!("{field}: invalid duration {value:?}"),
    }
}

/// Parse a duration string like "500ms", "5s", "2m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .map(|m| Duration::from_secs(m * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        hours
            .trim()
            .parse::<u64>()
            .ok()
            .map(|h| Duration::from_secs(h * 3600))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
