//! Kademlia routing table implementation
//!
//! The table is a fixed array of [`ID_BITS`] k-buckets, bucket `i` holding
//! contacts at XOR distance `[2^i, 2^(i+1))` from the local node. All state
//! sits behind one mutex, every public operation holds it for its whole
//! duration, so a query never observes a half-applied insertion.
//!
//! When a bucket is full a newly seen contact is dropped and the existing
//! ones are kept. Full Kademlia would first ping the least recently seen
//! contact and only evict it if it fails to answer; that probe needs the
//! transport and is left to the layer above (see [`RoutingTable::remove_node`]).

use crate::distance::{bucket_index_of, probe_order};
use crate::shortlist::ShortList;
use crate::{DhtConfig, DhtError, Result};
use bitvec::prelude::*;
use kadnode_core::{generate_random_node_id, id_to_hex, NetworkNode, NodeId, Options, ID_BITS};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A node known to the routing table
///
/// Two contacts are equal when their IDs are equal, whatever address they
/// claim.
#[derive(Debug, Clone, Copy)]
pub struct Contact {
    pub node: NetworkNode,
    /// When we last heard from this node
    pub last_seen: Instant,
}

impl Contact {
    pub fn new(node: NetworkNode) -> Self {
        Self {
            node,
            last_seen: Instant::now(),
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.node.id
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id
    }
}

impl Eq for Contact {}

impl From<NetworkNode> for Contact {
    fn from(node: NetworkNode) -> Self {
        Self::new(node)
    }
}

/// Result of offering a contact to a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Appended to the bucket
    Added,
    /// A contact with this ID was already present, nothing changed
    Exists,
    /// The bucket was full and the contact was dropped
    Full,
    /// The contact is our own node, which is never stored
    Local,
}

/// A k-bucket in the routing table
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Maximum number of nodes in this bucket
    k: usize,
    /// Nodes in this bucket, oldest at the front
    nodes: VecDeque<Contact>,
    /// Last time a contact was added or seen
    touched: Instant,
}

impl KBucket {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            nodes: VecDeque::with_capacity(k + 1),
            touched: Instant::now(),
        }
    }

    /// Append a contact unless its ID is already known
    ///
    /// An existing entry is left untouched, address included. If appending
    /// overflows the bucket the new contact is removed again, so the oldest
    /// `k` contacts always survive.
    pub fn insert(&mut self, contact: Contact) -> InsertOutcome {
        if self.contains(contact.id()) {
            return InsertOutcome::Exists;
        }

        self.nodes.push_back(contact);
        if self.nodes.len() > self.k {
            self.nodes.pop_back();
            return InsertOutcome::Full;
        }

        self.touched = Instant::now();
        InsertOutcome::Added
    }

    /// Remove a node by ID
    pub fn remove(&mut self, id: &NodeId) -> Option<Contact> {
        let pos = self.position(id)?;
        self.nodes.remove(pos)
    }

    /// Record that we heard from a node, moving it to the back (most recently seen)
    /// Returns false if the node is not in this bucket
    pub fn mark_seen(&mut self, id: &NodeId) -> bool {
        let Some(mut contact) = self.remove(id) else {
            return false;
        };
        contact.last_seen = Instant::now();
        self.nodes.push_back(contact);
        self.touched = contact.last_seen;
        true
    }

    pub fn get(&self, id: &NodeId) -> Option<&Contact> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.position(id).is_some()
    }

    /// Get all nodes in the bucket
    pub fn nodes(&self) -> impl Iterator<Item = &Contact> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check if bucket is full
    pub fn is_full(&self) -> bool {
        self.nodes.len() >= self.k
    }

    /// Last time a contact was added or seen in this bucket
    pub fn touched(&self) -> Instant {
        self.touched
    }

    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }

    fn position(&self, id: &NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }
}

struct Inner {
    /// Our node
    local: NetworkNode,
    /// K-buckets (160 buckets for 160-bit IDs)
    buckets: Vec<KBucket>,
}

impl Inner {
    fn bucket_for(&self, id: &NodeId) -> usize {
        bucket_index_of(&self.local.id, id)
    }
}

/// Kademlia routing table
///
/// Shared between tasks as `Arc<RoutingTable>`; all methods take `&self`.
pub struct RoutingTable {
    inner: Mutex<Inner>,
    config: DhtConfig,
}

impl RoutingTable {
    pub fn new(local: NetworkNode) -> Self {
        Self::with_config(local, DhtConfig::default())
    }

    pub fn with_config(local: NetworkNode, config: DhtConfig) -> Self {
        tracing::info!(
            "Routing table for {} ({} buckets, k={})",
            local,
            ID_BITS,
            config.k
        );

        Self {
            inner: Mutex::new(Inner {
                local,
                buckets: (0..ID_BITS).map(|_| KBucket::new(config.k)).collect(),
            }),
            config,
        }
    }

    /// Build the table for the node described by `options`
    ///
    /// Fails if the IP or port is missing or malformed. Panics if no ID is
    /// configured and the secure random source is unavailable.
    pub fn from_options(options: &Options) -> Result<Self> {
        let local = options.network_node()?;
        Ok(Self::new(local))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the buckets consistent, so a panic
        // on another thread does not invalidate them.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> DhtConfig {
        self.config
    }

    /// Our own node
    pub fn self_node(&self) -> NetworkNode {
        self.lock().local
    }

    /// Add a node we heard from
    ///
    /// Known IDs keep their first recorded address. A node landing in a full
    /// bucket is dropped. Our own ID is never stored.
    pub fn add_node(&self, node: NetworkNode) -> InsertOutcome {
        let mut inner = self.lock();
        if node.id == inner.local.id {
            tracing::trace!("Ignoring own node {}", node);
            return InsertOutcome::Local;
        }

        let index = inner.bucket_for(&node.id);
        let outcome = inner.buckets[index].insert(Contact::new(node));

        match outcome {
            InsertOutcome::Added => tracing::debug!("Added {} to bucket {}", node, index),
            InsertOutcome::Exists => tracing::trace!("{} already in bucket {}", node, index),
            InsertOutcome::Full => tracing::debug!("Bucket {} full, dropping {}", index, node),
            InsertOutcome::Local => {}
        }
        outcome
    }

    /// Find up to `count` contacts closest to `target`
    ///
    /// Buckets are visited outward from the target's own bucket, alternating
    /// above and below it, until `count` contacts have been collected. The
    /// result is sorted by XOR distance to `target` and never contains a
    /// node listed in `ignored`.
    pub fn closest_contacts(&self, count: usize, target: &NodeId, ignored: &[NodeId]) -> ShortList {
        let inner = self.lock();
        let mut list = ShortList::new(*target);

        if count > 0 {
            let home = inner.bucket_for(target);
            'buckets: for index in probe_order(home, ID_BITS) {
                for contact in inner.buckets[index].nodes() {
                    if ignored.contains(contact.id()) {
                        continue;
                    }
                    list.push_unique(*contact);
                    if list.len() >= count {
                        break 'buckets;
                    }
                }
            }
        }

        list.sort();
        tracing::trace!(
            "Found {}/{} contacts close to {}",
            list.len(),
            count,
            id_to_hex(target)
        );
        list
    }

    /// Remove a node, typically one that stopped answering
    /// Returns true if it was present
    pub fn remove_node(&self, id: &NodeId) -> bool {
        let mut inner = self.lock();
        let index = inner.bucket_for(id);
        let removed = inner.buckets[index].remove(id).is_some();
        if removed {
            tracing::debug!("Removed {} from bucket {}", id_to_hex(id), index);
        }
        removed
    }

    /// Record that we heard from a known node
    /// Returns false if the node is unknown
    pub fn mark_seen(&self, id: &NodeId) -> bool {
        let mut inner = self.lock();
        let index = inner.bucket_for(id);
        inner.buckets[index].mark_seen(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        let inner = self.lock();
        let index = inner.bucket_for(id);
        inner.buckets[index].contains(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<Contact> {
        let inner = self.lock();
        let index = inner.bucket_for(id);
        inner.buckets[index].get(id).copied()
    }

    /// Total number of contacts
    pub fn len(&self) -> usize {
        self.lock().buckets.iter().map(KBucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bucket_len(&self, index: usize) -> Result<usize> {
        let inner = self.lock();
        let bucket = inner
            .buckets
            .get(index)
            .ok_or(DhtError::BucketOutOfRange(index))?;
        Ok(bucket.len())
    }

    /// Snapshot of the contacts in a bucket, oldest first
    pub fn bucket_contacts(&self, index: usize) -> Result<Vec<Contact>> {
        let inner = self.lock();
        let bucket = inner
            .buckets
            .get(index)
            .ok_or(DhtError::BucketOutOfRange(index))?;
        Ok(bucket.nodes().copied().collect())
    }

    /// Indices of buckets not touched for at least `threshold`
    pub fn stale_buckets(&self, threshold: Duration) -> Vec<usize> {
        let inner = self.lock();
        inner
            .buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.touched().elapsed() >= threshold)
            .map(|(i, _)| i)
            .collect()
    }

    /// Reset a bucket's refresh timer, after a refresh lookup has run for it
    pub fn touch_bucket(&self, index: usize) -> Result<()> {
        let mut inner = self.lock();
        inner
            .buckets
            .get_mut(index)
            .ok_or(DhtError::BucketOutOfRange(index))?
            .touch();
        Ok(())
    }

    /// A random ID that falls into bucket `index` relative to our node
    ///
    /// Used as the target of a refresh lookup for a stale bucket.
    pub fn random_id_in_bucket(&self, index: usize) -> Result<NodeId> {
        if index >= ID_BITS {
            return Err(DhtError::BucketOutOfRange(index));
        }
        let mut id = self.lock().local.id;
        let random = generate_random_node_id();

        // Keep the shared prefix, flip the first differing bit, randomise the rest
        let bit = ID_BITS - 1 - index;
        let bits = id.view_bits_mut::<Msb0>();
        let flipped = !bits[bit];
        bits.set(bit, flipped);
        bits[bit + 1..].copy_from_bitslice(&random.view_bits::<Msb0>()[bit + 1..]);

        Ok(id)
    }
}
