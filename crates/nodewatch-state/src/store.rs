//! MetadataStore: redb-backed durable cache for node metadata.
//!
//! Entries carry their fetch time and are checked against the TTL on every
//! read; nothing is evicted in the background. An expired entry is a cache
//! miss even though it is still on disk. The store also keeps the last
//! chosen node filter so it survives restarts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// How long fetched metadata stays valid.
pub const METADATA_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe metadata store backed by redb.
#[derive(Clone)]
pub struct MetadataStore {
    db: Arc<Database>,
    ttl: Duration,
}

impl MetadataStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            ttl: METADATA_TTL,
        };
        store.ensure_tables()?;
        debug!(?path, "metadata store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            ttl: METADATA_TTL,
        };
        store.ensure_tables()?;
        debug!("in-memory metadata store opened");
        Ok(store)
    }

    /// Override the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(METADATA).map_err(map_err!(Table))?;
        txn.open_table(PREFERENCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    // ── Metadata ───────────────────────────────────────────────────

    /// Cached metadata for a node, or `None` if absent, expired, or cached as empty.
    pub fn get(&self, node_id: NodeId) -> StateResult<Option<NodeMetadata>> {
        self.get_at(node_id, epoch_millis())
    }

    /// Like [`get`](Self::get), evaluated at an explicit time.
    pub fn get_at(&self, node_id: NodeId, now: Timestamp) -> StateResult<Option<NodeMetadata>> {
        Ok(self
            .entry(node_id)?
            .filter(|entry| entry.is_valid_at(now, self.ttl_ms()))
            .and_then(|entry| entry.value))
    }

    /// Whether a non-expired entry exists for the node.
    pub fn is_valid(&self, node_id: NodeId) -> StateResult<bool> {
        self.is_valid_at(node_id, epoch_millis())
    }

    pub fn is_valid_at(&self, node_id: NodeId, now: Timestamp) -> StateResult<bool> {
        Ok(self
            .entry(node_id)?
            .is_some_and(|entry| entry.is_valid_at(now, self.ttl_ms())))
    }

    /// The raw stored entry, ignoring the TTL.
    pub fn entry(&self, node_id: NodeId) -> StateResult<Option<MetadataCacheEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
        match table.get(node_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let entry: MetadataCacheEntry =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Cache metadata (or the lack of it) for a node, stamped with the current time.
    pub fn set(&self, node_id: NodeId, value: Option<NodeMetadata>) -> StateResult<()> {
        self.set_at(node_id, value, epoch_millis())
    }

    pub fn set_at(
        &self,
        node_id: NodeId,
        value: Option<NodeMetadata>,
        fetched_at: Timestamp,
    ) -> StateResult<()> {
        let entry = MetadataCacheEntry { value, fetched_at };
        let bytes = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            table
                .insert(node_id, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(node_id, has_value = entry.value.is_some(), "metadata cached");
        Ok(())
    }

    /// Node ids with a stored entry, valid or not.
    pub fn cached_ids(&self) -> StateResult<Vec<NodeId>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(METADATA).map_err(map_err!(Table))?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, _) = entry.map_err(map_err!(Read))?;
            ids.push(key.value());
        }
        Ok(ids)
    }

    /// Drop every metadata entry. Returns the number removed.
    pub fn clear(&self) -> StateResult<u32> {
        let ids = self.cached_ids()?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(METADATA).map_err(map_err!(Table))?;
            for id in &ids {
                table.remove(*id).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(removed = ids.len(), "metadata cache cleared");
        Ok(ids.len() as u32)
    }

    // ── Preferences ────────────────────────────────────────────────

    /// Last chosen node filter, `All` if never set.
    pub fn filter(&self) -> StateResult<NodeFilter> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PREFERENCES).map_err(map_err!(Table))?;
        match table.get(FILTER_KEY).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Ok(NodeFilter::default()),
        }
    }

    pub fn set_filter(&self, filter: NodeFilter) -> StateResult<()> {
        let bytes = serde_json::to_vec(&filter).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PREFERENCES).map_err(map_err!(Table))?;
            table
                .insert(FILTER_KEY, bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(?filter, "filter preference stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: u64 = 60 * 60 * 1000;

    fn test_store() -> MetadataStore {
        MetadataStore::open_in_memory().unwrap()
    }

    fn test_metadata(description: &str) -> NodeMetadata {
        NodeMetadata {
            description: description.to_string(),
            image: None,
            external_url: Some("https://operator.example".to_string()),
            operator_name: Some("Operator".to_string()),
            region: Some("US-East".to_string()),
            social: None,
        }
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let store = test_store();
        assert!(store.get(100).unwrap().is_none());
        assert!(!store.is_valid(100).unwrap());
        assert!(store.entry(100).unwrap().is_none());
    }

    #[test]
    fn set_and_get() {
        let store = test_store();
        store.set(100, Some(test_metadata("node one"))).unwrap();

        assert!(store.is_valid(100).unwrap());
        assert_eq!(store.get(100).unwrap().unwrap().description, "node one");
    }

    #[test]
    fn entry_older_than_ttl_is_invalid() {
        let store = test_store();
        let now = 1_000 * HOUR_MS;
        store
            .set_at(100, Some(test_metadata("stale")), now - 25 * HOUR_MS)
            .unwrap();

        assert!(!store.is_valid_at(100, now).unwrap());
        assert!(store.get_at(100, now).unwrap().is_none());
        // Still physically present.
        assert!(store.entry(100).unwrap().is_some());
    }

    #[test]
    fn entry_younger_than_ttl_is_valid() {
        let store = test_store();
        let now = 1_000 * HOUR_MS;
        store
            .set_at(100, Some(test_metadata("fresh")), now - 23 * HOUR_MS)
            .unwrap();

        assert!(store.is_valid_at(100, now).unwrap());
        assert_eq!(store.get_at(100, now).unwrap().unwrap().description, "fresh");
    }

    #[test]
    fn ttl_boundary_is_inclusive() {
        let store = test_store();
        let now = 1_000 * HOUR_MS;
        store.set_at(100, None, now - 24 * HOUR_MS).unwrap();
        assert!(store.is_valid_at(100, now).unwrap());
        assert!(!store.is_valid_at(100, now + 1).unwrap());
    }

    #[test]
    fn empty_value_is_valid_but_yields_nothing() {
        let store = test_store();
        store.set(100, None).unwrap();

        assert!(store.is_valid(100).unwrap());
        assert!(store.get(100).unwrap().is_none());
    }

    #[test]
    fn overwrite_replaces_entry() {
        let store = test_store();
        store.set_at(100, Some(test_metadata("old")), 1).unwrap();
        store.set_at(100, Some(test_metadata("new")), 2).unwrap();

        let entry = store.entry(100).unwrap().unwrap();
        assert_eq!(entry.fetched_at, 2);
        assert_eq!(entry.value.unwrap().description, "new");
    }

    #[test]
    fn custom_ttl() {
        let store = test_store().with_ttl(Duration::from_secs(60));
        store.set_at(100, None, 0).unwrap();
        assert!(store.is_valid_at(100, 60_000).unwrap());
        assert!(!store.is_valid_at(100, 60_001).unwrap());
    }

    #[test]
    fn clear_removes_all_entries() {
        let store = test_store();
        store.set(100, Some(test_metadata("a"))).unwrap();
        store.set(200, None).unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.cached_ids().unwrap().is_empty());
        assert!(!store.is_valid(100).unwrap());
    }

    #[test]
    fn clear_keeps_filter_preference() {
        let store = test_store();
        store.set_filter(NodeFilter::Community).unwrap();
        store.set(100, None).unwrap();
        store.clear().unwrap();
        assert_eq!(store.filter().unwrap(), NodeFilter::Community);
    }

    #[test]
    fn filter_defaults_to_all() {
        let store = test_store();
        assert_eq!(store.filter().unwrap(), NodeFilter::All);
        store.set_filter(NodeFilter::Canonical).unwrap();
        assert_eq!(store.filter().unwrap(), NodeFilter::Canonical);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodewatch.redb");

        {
            let store = MetadataStore::open(&path).unwrap();
            store.set(100, Some(test_metadata("persisted"))).unwrap();
            store.set_filter(NodeFilter::Canonical).unwrap();
        }

        let store = MetadataStore::open(&path).unwrap();
        assert_eq!(store.get(100).unwrap().unwrap().description, "persisted");
        assert_eq!(store.filter().unwrap(), NodeFilter::Canonical);
    }
}
