use anyhow::{Context, Result};
use flowscope_core::{stable_u32, Address};
use std::collections::HashMap;
use std::f32::consts::TAU;
use std::path::Path;

const RING_RADIUS: f32 = 10.0;

/// Initial node positions: saved coordinates where the overlay has them,
/// otherwise a point on a ring picked by hashing the address.
#[derive(Debug, Clone, Default)]
pub struct PositionOverlay {
    saved: HashMap<Address, [f32; 2]>,
}

impl PositionOverlay {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read position overlay {}", path.display()))?;
        let saved: HashMap<Address, [f32; 2]> = serde_json::from_str(&data)
            .with_context(|| format!("decode position overlay {}", path.display()))?;
        tracing::info!(path = %path.display(), nodes = saved.len(), "position overlay loaded");
        Ok(Self { saved })
    }

    pub fn position_of(&self, address: &Address) -> [f32; 2] {
        self.saved
            .get(address)
            .copied()
            .unwrap_or_else(|| ring_position(address))
    }
}

pub fn ring_position(address: &Address) -> [f32; 2] {
    let turn = stable_u32(address.as_str()) as f32 / u32::MAX as f32;
    let angle = turn * TAU;
    [RING_RADIUS * angle.cos(), RING_RADIUS * angle.sin()]
}
