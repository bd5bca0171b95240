//! kadnode DHT - Kademlia routing table
//!
//! This crate holds the part of a Kademlia node that decides who it knows:
//! the XOR distance metric, the k-bucket routing table and the shortlist
//! used to answer closest-contact queries. Transport, iterative lookups and
//! the key/value store live above it and talk to it through
//! [`RoutingTable::add_node`] and [`RoutingTable::closest_contacts`].

pub mod distance;
pub mod routing;
pub mod shortlist;

pub use distance::{bucket_index, bucket_index_of, probe_order, xor_distance};
pub use routing::{Contact, InsertOutcome, KBucket, RoutingTable};
pub use shortlist::ShortList;

use kadnode_core::{ALPHA, K};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DhtError {
    #[error("Bucket index {0} out of range")]
    BucketOutOfRange(usize),

    #[error("Configuration error: {0}")]
    Config(#[from] kadnode_core::Error),
}

pub type Result<T> = std::result::Result<T, DhtError>;

/// Routing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DhtConfig {
    /// Number of nodes per k-bucket
    pub k: usize,
    /// Parallelism factor for lookups
    ///
    /// The table itself never reads this; the lookup driver uses it as the
    /// `count` for each round of `closest_contacts`.
    pub alpha: usize,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self { k: K, alpha: ALPHA }
    }
}
