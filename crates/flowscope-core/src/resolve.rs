use crate::model::{Address, NodeRecord};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Numeric identifiers below this are device ids, not packed addresses.
pub const DEVICE_ID_LIMIT: u64 = 1000;

const LOW_32: u64 = 0xFFFF_FFFF;
const HW_ADDR_LIMIT: u64 = 1 << 48;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("empty node identifier")]
    Empty,
    #[error("node identifier {0:?} is neither an address nor an unsigned integer")]
    Invalid(String),
    #[error("node identifier resolves to the all-zero address")]
    ZeroAddress,
}

/// A node identifier classified at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeIdentifier {
    DeviceId(u32),
    PackedAddress(u64),
    Canonical(String),
}

impl NodeIdentifier {
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ResolveError::Empty);
        }
        if raw.contains(|c: char| c == '.' || c == ':') {
            return Ok(Self::Canonical(raw.to_string()));
        }
        let value: u64 = raw
            .parse()
            .map_err(|_| ResolveError::Invalid(raw.to_string()))?;
        if value < DEVICE_ID_LIMIT {
            // < 1000 always fits
            Ok(Self::DeviceId(value as u32))
        } else {
            Ok(Self::PackedAddress(value))
        }
    }
}

/// Which rule produced a resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressOrigin {
    Canonical,
    DeviceTable,
    /// Device id missing from the table; formatted as a packed address.
    DeviceFallback,
    Packed,
    /// Low 32 bits of a 48-bit hardware address.
    HardwarePseudo,
    /// Low 32 bits of a value wider than 48 bits.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub address: Address,
    pub origin: AddressOrigin,
}

impl Resolved {
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self.origin,
            AddressOrigin::HardwarePseudo | AddressOrigin::Truncated
        )
    }
}

/// Device id -> canonical address, rebuilt from every topology snapshot.
#[derive(Debug, Clone, Default)]
pub struct DeviceTable {
    by_id: HashMap<u32, Address>,
}

impl DeviceTable {
    pub fn from_nodes(nodes: &[NodeRecord]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if node.device_id == 0 {
                continue;
            }
            if let Some(existing) = by_id.get(&node.device_id) {
                tracing::warn!(
                    device_id = node.device_id,
                    kept = %existing,
                    ignored = %node.address,
                    "duplicate device id in topology"
                );
                continue;
            }
            by_id.insert(node.device_id, node.address.clone());
        }
        Self { by_id }
    }

    pub fn get(&self, device_id: u32) -> Option<&Address> {
        self.by_id.get(&device_id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NodeIdentityResolver {
    devices: DeviceTable,
}

impl NodeIdentityResolver {
    pub fn new(devices: DeviceTable) -> Self {
        Self { devices }
    }

    pub fn from_nodes(nodes: &[NodeRecord]) -> Self {
        Self::new(DeviceTable::from_nodes(nodes))
    }

    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    pub fn resolve_raw(&self, raw: &str) -> Result<Resolved, ResolveError> {
        self.resolve(&NodeIdentifier::parse(raw)?)
    }

    pub fn resolve(&self, id: &NodeIdentifier) -> Result<Resolved, ResolveError> {
        match id {
            NodeIdentifier::Canonical(s) => {
                if s == "0.0.0.0" {
                    return Err(ResolveError::ZeroAddress);
                }
                Ok(Resolved {
                    address: Address(s.clone()),
                    origin: AddressOrigin::Canonical,
                })
            }
            NodeIdentifier::DeviceId(device_id) => match self.devices.get(*device_id) {
                Some(address) => Ok(Resolved {
                    address: address.clone(),
                    origin: AddressOrigin::DeviceTable,
                }),
                None => {
                    tracing::debug!(
                        device_id,
                        "device id not in topology; treating as packed address"
                    );
                    let (address, _) = unpack(u64::from(*device_id))?;
                    Ok(Resolved {
                        address,
                        origin: AddressOrigin::DeviceFallback,
                    })
                }
            },
            NodeIdentifier::PackedAddress(value) => {
                let (address, origin) = unpack(*value)?;
                Ok(Resolved { address, origin })
            }
        }
    }
}

fn unpack(value: u64) -> Result<(Address, AddressOrigin), ResolveError> {
    let low = (value & LOW_32) as u32;
    let origin = if value <= LOW_32 {
        AddressOrigin::Packed
    } else if value < HW_ADDR_LIMIT {
        AddressOrigin::HardwarePseudo
    } else {
        tracing::warn!(value, "identifier wider than 48 bits; keeping low 32 bits");
        AddressOrigin::Truncated
    };
    if low == 0 {
        return Err(ResolveError::ZeroAddress);
    }
    Ok((format_packed(low), origin))
}

/// Big-endian dotted quad, most significant octet first.
pub fn format_packed(value: u32) -> Address {
    Address(Ipv4Addr::from(value).to_string())
}
