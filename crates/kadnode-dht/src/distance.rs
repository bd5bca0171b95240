//! XOR distance metric
//!
//! Bucket `i` holds contacts whose XOR distance from the local node lies in
//! `[2^i, 2^(i+1))`. The index is derived from the position of the first set
//! bit of the distance, scanning from the most significant bit of byte 0.

use bitvec::prelude::*;
use kadnode_core::{NodeId, ID_BITS, ID_LENGTH};

/// XOR distance between two node IDs
pub fn xor_distance(a: &NodeId, b: &NodeId) -> NodeId {
    let mut result = [0u8; ID_LENGTH];
    for i in 0..ID_LENGTH {
        result[i] = a[i] ^ b[i];
    }
    result
}

/// Bucket index for a distance
///
/// A zero distance (identical IDs) maps to bucket 0.
pub fn bucket_index(distance: &NodeId) -> usize {
    match distance.view_bits::<Msb0>().first_one() {
        Some(bit) => ID_BITS - 1 - bit,
        None => 0,
    }
}

/// Bucket that `b` belongs in, from the point of view of `a`
pub fn bucket_index_of(a: &NodeId, b: &NodeId) -> usize {
    bucket_index(&xor_distance(a, b))
}

/// Order in which buckets are visited when searching outward from `home`:
/// `home, home+1, home-1, home+2, home-2, ...`, skipping indices outside
/// `0..buckets`. Every index appears exactly once.
pub fn probe_order(home: usize, buckets: usize) -> Vec<usize> {
    assert!(home < buckets, "home bucket {home} out of range");

    let mut order = Vec::with_capacity(buckets);
    order.push(home);
    for step in 1..buckets {
        if home + step < buckets {
            order.push(home + step);
        }
        if step <= home {
            order.push(home - step);
        }
    }
    order
}
