use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Canonical textual node address ("10.0.0.1", "aa:bb:cc:dd:ee:ff", ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeRecord {
    pub address: Address,
    #[serde(default)]
    pub name: String,
    /// Small-integer device id (DPID); 0 when the node has none.
    #[serde(default)]
    pub device_id: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub up: bool,
    #[serde(default)]
    pub layer: String,
}

/// Directed link identity. `(a, b)` and `(b, a)` are different links.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    pub source: Address,
    pub target: Address,
}

impl LinkKey {
    pub fn new(source: Address, target: Address) -> Self {
        Self { source, target }
    }

    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRecord {
    pub source: Address,
    pub target: Address,
    #[serde(default = "default_true")]
    pub up: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bits per second.
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default)]
    pub utilization: f32,
    /// Positions into the flow list of the frame this link was assigned in.
    /// Rebuilt from scratch by every assignment pass.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<usize>,
}

impl LinkRecord {
    pub fn new(source: impl Into<Address>, target: impl Into<Address>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            up: true,
            enabled: true,
            bandwidth: 0,
            utilization: 0.0,
            flows: Vec::new(),
        }
    }

    pub fn key(&self) -> LinkKey {
        LinkKey::new(self.source.clone(), self.target.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowRecord {
    pub src: Address,
    pub dst: Address,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: u8,
    /// Raw node identifiers in traversal order, exactly as sampled.
    #[serde(default, deserialize_with = "de_path")]
    pub path: Vec<String>,
    /// Instantaneous send rate (bytes per second).
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub first_seen: Timestamp,
    #[serde(default)]
    pub last_seen: Timestamp,
}

impl FlowRecord {
    pub fn new(
        src: impl Into<Address>,
        dst: impl Into<Address>,
        src_port: u16,
        dst_port: u16,
        protocol: u8,
    ) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            src_port,
            dst_port,
            protocol,
            path: Vec::new(),
            rate: 0.0,
            first_seen: 0,
            last_seen: 0,
        }
    }

    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// A flow needs at least two hops to cross any link.
    pub fn is_assignable(&self) -> bool {
        self.path.len() >= 2
    }
}

/// One topology sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// One flow sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowSnapshot {
    pub timestamp: Timestamp,
    #[serde(default)]
    pub flows: Vec<FlowRecord>,
}

pub trait Timestamped {
    fn timestamp(&self) -> Timestamp;
}

impl Timestamped for Snapshot {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl Timestamped for FlowSnapshot {
    fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

fn default_true() -> bool {
    true
}

// collectors emit hops as strings or bare integers
#[derive(Deserialize)]
#[serde(untagged)]
enum RawHop {
    Text(String),
    Number(u64),
}

fn de_path<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let hops = Vec::<RawHop>::deserialize(d)?;
    Ok(hops
        .into_iter()
        .map(|hop| match hop {
            RawHop::Text(s) => s,
            RawHop::Number(n) => n.to_string(),
        })
        .collect())
}
