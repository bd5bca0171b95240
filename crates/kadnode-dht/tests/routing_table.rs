//! Integration tests for the routing table
//!
//! These drive the table only through its public API, the way the transport
//! layer and the lookup driver do.

use kadnode_core::{
    generate_random_node_id, Error, NetworkNode, NodeId, Options, ID_BITS, ID_LENGTH, K,
};
use kadnode_dht::{bucket_index_of, xor_distance, DhtError, InsertOutcome, RoutingTable};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

fn node(id: NodeId, port: u16) -> NetworkNode {
    NetworkNode::new(id, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), port)
}

/// ID with the given low 16 bits and everything else zero
fn low_id(value: u16) -> NodeId {
    let mut id = [0u8; ID_LENGTH];
    id[ID_LENGTH - 2..].copy_from_slice(&value.to_be_bytes());
    id
}

fn zero_table() -> RoutingTable {
    RoutingTable::from_options(&Options::new("127.0.0.1", "3000").with_id(&[0u8; ID_LENGTH]))
        .unwrap()
}

fn assert_invariants(table: &RoutingTable) {
    let local = table.self_node().id;
    let mut seen = HashSet::new();
    let mut total = 0;

    for index in 0..ID_BITS {
        let contacts = table.bucket_contacts(index).unwrap();
        assert!(contacts.len() <= K, "bucket {index} over capacity");
        for c in contacts {
            assert_ne!(c.node.id, local, "self stored in table");
            assert_eq!(bucket_index_of(&local, &c.node.id), index);
            assert!(seen.insert(c.node.id), "duplicate id in table");
            total += 1;
        }
    }
    assert_eq!(table.len(), total);
}

/// 25 contacts sharing all but their low bits land in one bucket; only the
/// first 20 are kept
#[test]
fn test_full_bucket_keeps_oldest() {
    let table = zero_table();

    let ids: Vec<NodeId> = (0..25u8)
        .map(|n| {
            let mut id = [0u8; ID_LENGTH];
            id[0] = 0x80;
            id[ID_LENGTH - 1] = n;
            id
        })
        .collect();

    for (i, id) in ids.iter().enumerate() {
        let expected = if i < K {
            InsertOutcome::Added
        } else {
            InsertOutcome::Full
        };
        assert_eq!(table.add_node(node(*id, i as u16)), expected);
    }

    let bucket: Vec<NodeId> = table
        .bucket_contacts(ID_BITS - 1)
        .unwrap()
        .into_iter()
        .map(|c| c.node.id)
        .collect();
    assert_eq!(bucket, ids[..K].to_vec());
    for id in &ids[K..] {
        assert!(!table.contains(id));
    }
    assert_invariants(&table);
}

/// Contacts only in buckets 0, 5 and 10; buckets are probed 5, 6, 4, 7, 3,
/// ... so bucket 10 is reached before bucket 0
#[test]
fn test_closest_widening_probe() {
    let table = zero_table();

    let b0 = low_id(0b1);
    let b5a = low_id(32);
    let b5b = low_id(33);
    let b10a = low_id(1 << 10);
    let b10b = low_id((1 << 10) | 1);
    for (i, id) in [b0, b5a, b5b, b10a, b10b].iter().enumerate() {
        table.add_node(node(*id, i as u16));
    }
    assert_eq!(table.bucket_len(0).unwrap(), 1);
    assert_eq!(table.bucket_len(5).unwrap(), 2);
    assert_eq!(table.bucket_len(10).unwrap(), 2);

    let target = low_id(40);
    assert_eq!(bucket_index_of(&[0u8; ID_LENGTH], &target), 5);

    let ids = |count| -> Vec<NodeId> {
        table
            .closest_contacts(count, &target, &[])
            .into_iter()
            .map(|c| c.node.id)
            .collect()
    };

    assert_eq!(ids(2), vec![b5a, b5b]);
    assert_eq!(ids(3), vec![b5a, b5b, b10a]);
    assert_eq!(ids(4), vec![b5a, b5b, b10a, b10b]);

    // Bucket 0 is reached last but sorts ahead of bucket 10
    assert_eq!(ids(5), vec![b5a, b5b, b0, b10a, b10b]);
    assert_eq!(ids(50), ids(5));
}

#[test]
fn test_closest_zero_count() {
    let table = zero_table();
    table.add_node(node(low_id(7), 1));

    let found = table.closest_contacts(0, &low_id(7), &[]);
    assert!(found.is_empty());
}

#[test]
fn test_closest_on_empty_table() {
    let table = zero_table();
    let found = table.closest_contacts(K, &generate_random_node_id(), &[]);
    assert!(found.is_empty());
}

#[test]
fn test_missing_port_is_config_error() {
    let options = Options {
        ip: Some("127.0.0.1".to_string()),
        ..Default::default()
    };
    let result = RoutingTable::from_options(&options);
    assert!(matches!(
        result,
        Err(DhtError::Config(Error::MissingField("port")))
    ));
}

#[test]
fn test_random_id_when_not_configured() {
    let table = RoutingTable::from_options(&Options::new("127.0.0.1", "3000")).unwrap();
    assert_ne!(table.self_node().id, [0u8; ID_LENGTH]);
    assert_eq!(table.self_node().port, 3000);
}

#[test]
fn test_random_insertions_hold_invariants() {
    let table = RoutingTable::new(node(generate_random_node_id(), 1));

    for i in 0..2000u16 {
        table.add_node(node(generate_random_node_id(), i));
    }
    // Re-offer everything already stored with a different address
    for index in 0..ID_BITS {
        for c in table.bucket_contacts(index).unwrap() {
            assert_eq!(
                table.add_node(node(c.node.id, c.node.port.wrapping_add(1))),
                InsertOutcome::Exists
            );
            assert_eq!(table.get(&c.node.id).unwrap().node.port, c.node.port);
        }
    }

    assert_invariants(&table);
    // Half of all random IDs land in the top bucket
    assert_eq!(table.bucket_len(ID_BITS - 1).unwrap(), K);
}

#[test]
fn test_closest_sorted_and_growing() {
    let table = RoutingTable::new(node(generate_random_node_id(), 1));
    for i in 0..500u16 {
        table.add_node(node(generate_random_node_id(), i));
    }

    let target = generate_random_node_id();
    let mut previous: Vec<NodeId> = Vec::new();
    for count in 1..=K {
        let found: Vec<NodeId> = table
            .closest_contacts(count, &target, &[])
            .into_iter()
            .map(|c| c.node.id)
            .collect();
        assert_eq!(found.len(), count);

        for pair in found.windows(2) {
            assert!(xor_distance(&pair[0], &target) <= xor_distance(&pair[1], &target));
        }
        for id in &previous {
            assert!(found.contains(id));
        }
        previous = found;
    }
}

#[test]
fn test_closest_excludes_ignored() {
    let table = RoutingTable::new(node(generate_random_node_id(), 1));
    for i in 0..200u16 {
        table.add_node(node(generate_random_node_id(), i));
    }

    let target = generate_random_node_id();
    let first: Vec<NodeId> = table
        .closest_contacts(5, &target, &[])
        .into_iter()
        .map(|c| c.node.id)
        .collect();

    let found = table.closest_contacts(K, &target, &first);
    for id in &first {
        assert!(!found.contains(id));
    }
    assert!(!found.is_empty());
}

#[test]
fn test_remove_frees_slot() {
    let table = zero_table();
    let ids: Vec<NodeId> = (0..=K as u8)
        .map(|n| {
            let mut id = [0u8; ID_LENGTH];
            id[0] = 0xc0;
            id[ID_LENGTH - 1] = n;
            id
        })
        .collect();

    for id in &ids {
        table.add_node(node(*id, 1));
    }
    assert!(!table.contains(&ids[K]));

    assert!(table.remove_node(&ids[0]));
    assert_eq!(table.add_node(node(ids[K], 1)), InsertOutcome::Added);
    assert_eq!(table.bucket_len(ID_BITS - 1).unwrap(), K);
}

/// Inbound handlers and lookups hitting the table from many tasks at once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access() {
    let table = Arc::new(RoutingTable::new(node(generate_random_node_id(), 1)));

    let mut handles = Vec::new();
    for task in 0..8u16 {
        let table = Arc::clone(&table);
        handles.push(tokio::spawn(async move {
            for i in 0..100u16 {
                let id = generate_random_node_id();
                table.add_node(node(id, task * 100 + i));
                let found = table.closest_contacts(kadnode_core::ALPHA, &id, &[]);
                assert!(found.len() <= kadnode_core::ALPHA);
                assert!(!found.is_empty());
                tokio::task::yield_now().await;
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_invariants(&table);
    assert!(table.len() <= ID_BITS * K);
}
