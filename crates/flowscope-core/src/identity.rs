use crate::model::FlowRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

pub const DEFAULT_PALETTE_SIZE: u32 = 64;

/// Five-tuple identity of a flow: `src|dst|sport|dport|proto`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowKey(String);

impl FlowKey {
    pub fn of(flow: &FlowRecord) -> Self {
        Self(format!(
            "{}|{}|{}|{}|{}",
            flow.src, flow.dst, flow.src_port, flow.dst_port, flow.protocol
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn stable_u32(s: &str) -> u32 {
    let mut h = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut h);
    (h.finish() & 0xFFFF_FFFF) as u32
}

/// Grow-only binding of flow keys to palette slots.
///
/// Once a key has a slot it keeps it for the life of the store, even if the
/// palette size were to change. Two keys may share a slot.
#[derive(Debug, Clone)]
pub struct FlowIdentityStore {
    palette_size: u32,
    slots: HashMap<FlowKey, u32>,
}

impl Default for FlowIdentityStore {
    fn default() -> Self {
        Self::new(DEFAULT_PALETTE_SIZE)
    }
}

impl FlowIdentityStore {
    pub fn new(palette_size: u32) -> Self {
        Self {
            palette_size: palette_size.max(1),
            slots: HashMap::new(),
        }
    }

    pub fn palette_size(&self) -> u32 {
        self.palette_size
    }

    pub fn key_of(flow: &FlowRecord) -> FlowKey {
        FlowKey::of(flow)
    }

    pub fn color_slot(&mut self, key: &FlowKey) -> u32 {
        if let Some(slot) = self.slots.get(key) {
            return *slot;
        }
        let slot = stable_u32(key.as_str()) % self.palette_size;
        self.slots.insert(key.clone(), slot);
        slot
    }

    pub fn color_slot_for(&mut self, flow: &FlowRecord) -> u32 {
        self.color_slot(&FlowKey::of(flow))
    }

    /// Slot already bound to `key`, without binding a new one.
    pub fn peek(&self, key: &FlowKey) -> Option<u32> {
        self.slots.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
