//! nodewatch-state: shared state for the node health monitor.
//!
//! Two caches with different lifecycles live here:
//!
//! - [`StatusCache`]: in-memory map of node id → latest [`HealthResult`].
//!   Last write wins, no expiry, never persisted. A fresh process always
//!   starts with an empty status cache.
//! - [`MetadataStore`]: durable node metadata backed by
//!   [redb](https://docs.rs/redb), with a 24h TTL evaluated at read time,
//!   plus the persisted node-list filter preference.
//!
//! Both are `Clone` + `Send` + `Sync` and can be shared across tasks.

pub mod error;
pub mod status;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use status::StatusCache;
pub use store::{METADATA_TTL, MetadataStore};
pub use types::*;
