//! nodewatch-health: liveness probing and network status for nodewatch.
//!
//! Probes speak a minimal gRPC-Web call to each node's version RPC and
//! classify the outcome. A polling scheduler runs batch probes on a timer
//! and writes results into the shared status cache, from which the
//! network status is recomputed on demand.
//!
//! # Architecture
//!
//! ```text
//! Poller (timer loop, single-flight guard)
//!   └── ProbeClient::probe_all (chunked fan-out, JoinSet per chunk)
//!         └── ProbeClient::probe → Transport (HTTP/1.1, TCP or rustls)
//!               └── grpc_web::decode_version
//!   └── StatusCache::set_many
//!
//! aggregate(nodes, cache snapshot) → NetworkStatusInfo
//!
//! MetadataFetcher
//!   ├── Registry::metadata_uri
//!   ├── Transport (GET, JSON)
//!   └── MetadataStore (24h TTL)
//! ```
//!
//! # Classification
//!
//! | Outcome                         | Status    |
//! |---------------------------------|-----------|
//! | empty endpoint                  | `unknown` |
//! | non-2xx response                | `error`   |
//! | 2xx response                    | `online`  |
//! | timeout                         | `offline` |
//! | connect/TLS/HTTP failure        | `offline` |
//! | malformed endpoint              | `error`   |

pub mod aggregate;
pub mod batch;
pub mod error;
pub mod grpc_web;
pub mod metadata;
pub mod poller;
pub mod probe;
pub mod registry;
pub mod transport;

pub use aggregate::{StatusCounts, aggregate, classify, format_relative_time};
pub use batch::{DEFAULT_CONCURRENCY, health_result_map};
pub use error::{MetadataError, ProbeError, RegistryError, TransportError};
pub use metadata::{DEFAULT_IPFS_GATEWAY, MetadataFetcher};
pub use poller::{CheckOutcome, Poller, PollerConfig, SkipReason};
pub use probe::{DEFAULT_SERVICE_PATH, DEFAULT_TIMEOUT, ProbeClient};
pub use registry::{Registry, RegistryFuture, StaticRegistry};
pub use transport::{HttpRequest, HttpResponse, HyperTransport, Transport, TransportFuture};
