//! Core data types for kadnode

use crate::{Error, Result, ID_LENGTH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// A 160-bit node (or key) identifier
pub type NodeId = [u8; ID_LENGTH];

/// A network-reachable node: identifier plus the address it can be reached at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkNode {
    /// Identifier of the node
    #[serde(with = "hex_id")]
    pub id: NodeId,
    /// IP address of the node
    pub ip: IpAddr,
    /// UDP/TCP port of the node
    pub port: u16,
}

impl NetworkNode {
    pub fn new(id: NodeId, ip: IpAddr, port: u16) -> Self {
        Self { id, ip, port }
    }

    /// Socket address this node is reachable at
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for NetworkNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", id_to_hex(&self.id), self.addr())
    }
}

/// Generate a cryptographically random node ID
///
/// Panics if the operating system's secure random source is unavailable,
/// there is no way to bring a node up without an identity.
pub fn generate_random_node_id() -> NodeId {
    let mut node_id = [0u8; ID_LENGTH];
    getrandom::getrandom(&mut node_id).expect("Failed to generate random bytes");
    node_id
}

/// Helper to format a node ID as hex string
pub fn id_to_hex(id: &NodeId) -> String {
    hex::encode(id)
}

/// Helper to parse a hex string into a node ID
pub fn hex_to_id(s: &str) -> Result<NodeId> {
    let bytes = hex::decode(s).map_err(|e| Error::InvalidNodeId(format!("{s}: {e}")))?;
    id_from_slice(&bytes)
}

/// Copy a byte slice into a node ID, rejecting anything that is not exactly
/// [`ID_LENGTH`] bytes long
pub fn id_from_slice(bytes: &[u8]) -> Result<NodeId> {
    if bytes.len() != ID_LENGTH {
        return Err(Error::InvalidNodeId(format!(
            "expected {} bytes, got {}",
            ID_LENGTH,
            bytes.len()
        )));
    }
    let mut id = [0u8; ID_LENGTH];
    id.copy_from_slice(bytes);
    Ok(id)
}

/// Serde adapter storing a [`NodeId`] as a hex string
pub mod hex_id {
    use super::{hex_to_id, id_to_hex, NodeId};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &NodeId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id_to_hex(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NodeId, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex_to_id(&s).map_err(serde::de::Error::custom)
    }
}
