//! Node configuration

use crate::types::{generate_random_node_id, hex_to_id, NetworkNode, NodeId};
use crate::{Error, Result, T_EXPIRE, T_REFRESH, T_REPLICATE, T_REPUBLISH};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Options a node is created from
///
/// `ip` and `port` are required; they are optional here so that a missing
/// value is reported as a configuration error instead of a parse failure.
/// `port` is kept as a string for the same reason.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Options {
    /// Fixed node ID (hex), a random one is generated when absent
    #[serde(default)]
    pub id: Option<String>,

    /// IP address this node listens on
    #[serde(default)]
    pub ip: Option<String>,

    /// Port this node listens on
    #[serde(default)]
    pub port: Option<String>,

    /// Contacts known before joining the network
    #[serde(default)]
    pub bootstrap: Vec<BootstrapNode>,

    /// Store timing parameters
    #[serde(default)]
    pub timing: Timing,
}

/// A contact known ahead of time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapNode {
    /// Node ID (hex)
    pub id: String,
    /// IP address
    pub ip: String,
    /// Port
    pub port: String,
}

/// Timing parameters of the store layer
///
/// The routing table itself does not use these, they are carried so that the
/// surrounding node reads its whole configuration from one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// TTL of a key/value pair from its original publication
    #[serde(with = "secs")]
    pub expire: Duration,
    /// Age after which an unaccessed bucket is refreshed
    #[serde(with = "secs")]
    pub refresh: Duration,
    /// Interval between replication events
    #[serde(with = "secs")]
    pub replicate: Duration,
    /// Age after which the original publisher republishes
    #[serde(with = "secs")]
    pub republish: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            expire: T_EXPIRE,
            refresh: T_REFRESH,
            replicate: T_REPLICATE,
            republish: T_REPUBLISH,
        }
    }
}

impl Options {
    /// Options for a node at `ip:port` with a random ID
    pub fn new(ip: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            port: Some(port.into()),
            ..Default::default()
        }
    }

    /// Use a fixed node ID instead of a random one
    pub fn with_id(mut self, id: &NodeId) -> Self {
        self.id = Some(hex::encode(id));
        self
    }

    /// Parse options from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a TOML file
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// The configured node ID, or a freshly generated random one
    pub fn node_id(&self) -> Result<NodeId> {
        match &self.id {
            Some(id) => hex_to_id(id),
            None => Ok(generate_random_node_id()),
        }
    }

    /// Validate the options and build the local node
    pub fn network_node(&self) -> Result<NetworkNode> {
        let id = self.node_id()?;

        let ip = match self.ip.as_deref() {
            Some(ip) if !ip.is_empty() => ip,
            _ => return Err(Error::MissingField("ip")),
        };
        let port = match self.port.as_deref() {
            Some(port) if !port.is_empty() => port,
            _ => return Err(Error::MissingField("port")),
        };

        let ip: IpAddr = ip
            .parse()
            .map_err(|_| Error::InvalidAddress(ip.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidPort(port.to_string()))?;

        Ok(NetworkNode::new(id, ip, port))
    }

    /// Parse the bootstrap contacts
    pub fn bootstrap_nodes(&self) -> Result<Vec<NetworkNode>> {
        self.bootstrap
            .iter()
            .map(|b| {
                let id = hex_to_id(&b.id)?;
                let ip: IpAddr = b
                    .ip
                    .parse()
                    .map_err(|_| Error::InvalidAddress(b.ip.clone()))?;
                let port: u16 = b
                    .port
                    .parse()
                    .map_err(|_| Error::InvalidPort(b.port.clone()))?;
                Ok(NetworkNode::new(id, ip, port))
            })
            .collect()
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
