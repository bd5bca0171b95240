//! kadnode Core - Shared identifiers, configuration and constants
//!
//! This crate provides the types every layer of a kadnode DHT node agrees
//! on: the 160-bit node identifier, the network address of a node, the
//! Kademlia system parameters and the node configuration.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BootstrapNode, Options, Timing};
pub use error::{Error, Result};
pub use types::*;

use std::time::Duration;

/// Length of a node identifier in bytes
pub const ID_LENGTH: usize = 20;

/// Size of identifiers in bits, and number of buckets in the routing table (`b`)
pub const ID_BITS: usize = ID_LENGTH * 8;

/// Maximum number of contacts stored in a bucket (`k`)
pub const K: usize = 20;

/// Degree of parallelism in network calls (`alpha`)
pub const ALPHA: usize = 3;

/// Time after which a key/value pair expires (TTL from original publication)
pub const T_EXPIRE: Duration = Duration::from_secs(86_410);

/// Time after which an otherwise unaccessed bucket must be refreshed
pub const T_REFRESH: Duration = Duration::from_secs(3_600);

/// Interval between replication events, when a node publishes its entire database
pub const T_REPLICATE: Duration = Duration::from_secs(3_600);

/// Time after which the original publisher must republish a key/value pair
pub const T_REPUBLISH: Duration = Duration::from_secs(86_400);
