//! redb table definitions for the metadata store.
//!
//! Values are JSON-serialized domain types. Only durable state lives here;
//! live node status is never written to disk.

use redb::TableDefinition;

/// Cached node metadata keyed by node id.
pub const METADATA: TableDefinition<u32, &[u8]> = TableDefinition::new("metadata");

/// User preferences keyed by name (e.g. `filter`).
pub const PREFERENCES: TableDefinition<&str, &[u8]> = TableDefinition::new("preferences");

/// Preference key for the last chosen node filter.
pub const FILTER_KEY: &str = "filter";
