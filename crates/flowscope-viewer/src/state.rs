use crate::layout::PositionOverlay;
use crate::styling::StyledFrame;
use flowscope_core::{Address, LinkKey, ProcessedFrame, Timestamp};
use std::collections::HashMap;
use std::sync::Arc;

/// What the presentation layer draws for one link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkView {
    pub key: LinkKey,
    pub up: bool,
    pub utilization: f32,
    /// Visible assigned flows as (flow position, colour slot).
    pub flows: Vec<(usize, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameSummary {
    pub timestamp: Timestamp,
    pub flow_timestamp: Option<Timestamp>,
    pub nodes: usize,
    pub links: usize,
    pub busy_links: usize,
    pub flows: usize,
    pub visible_flows: usize,
    pub unassignable_flows: usize,
    pub unresolved_segments: usize,
    pub fallback: bool,
}

/// Presentation-thread view of the latest styled frame.
///
/// Frames arrive whole from the handoff with colours and visibility already
/// computed; only node placement happens here.
pub struct PresentationState {
    overlay: PositionOverlay,
    positions: HashMap<Address, [f32; 2]>,
    current: Option<StyledFrame>,
    frames_applied: u64,
}

impl PresentationState {
    pub fn new(overlay: PositionOverlay) -> Self {
        Self {
            overlay,
            positions: HashMap::new(),
            current: None,
            frames_applied: 0,
        }
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }

    pub fn frame(&self) -> Option<&Arc<ProcessedFrame>> {
        self.current.as_ref().map(|s| &s.frame)
    }

    /// The k the current frame was filtered with, or `None` when every flow
    /// is shown.
    pub fn top_k(&self) -> Option<usize> {
        self.current.as_ref().and_then(|s| s.top_k)
    }

    pub fn filtered(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| !s.visibility.is_all())
    }

    pub fn position_of(&self, address: &Address) -> Option<[f32; 2]> {
        self.positions.get(address).copied()
    }

    pub fn apply(&mut self, styled: StyledFrame) {
        let frame = &styled.frame;
        let endpoints = frame
            .links
            .iter()
            .flat_map(|l| [&l.source, &l.target])
            .chain(frame.nodes.iter().map(|n| &n.address));

        let mut positions = HashMap::with_capacity(self.positions.len());
        for address in endpoints {
            if !positions.contains_key(address) {
                let at = self
                    .positions
                    .get(address)
                    .copied()
                    .unwrap_or_else(|| self.overlay.position_of(address));
                positions.insert(address.clone(), at);
            }
        }
        self.positions = positions;

        self.current = Some(styled);
        self.frames_applied += 1;
    }

    pub fn link_views(&self) -> Vec<LinkView> {
        let Some(styled) = &self.current else {
            return Vec::new();
        };
        styled
            .frame
            .links
            .iter()
            .map(|link| LinkView {
                key: link.key(),
                up: link.up,
                utilization: link.utilization,
                flows: link
                    .flows
                    .iter()
                    .copied()
                    .filter(|&pos| styled.visibility.contains(pos))
                    .filter_map(|pos| Some((pos, styled.slot(pos)?)))
                    .collect(),
            })
            .collect()
    }

    pub fn summary(&self) -> FrameSummary {
        let Some(styled) = &self.current else {
            return FrameSummary::default();
        };
        let frame = &styled.frame;
        FrameSummary {
            timestamp: frame.timestamp,
            flow_timestamp: frame.flow_timestamp,
            nodes: frame.nodes.len(),
            links: frame.links.len(),
            busy_links: frame.busy_links(),
            flows: frame.flows.len(),
            visible_flows: styled.visibility.visible_count(frame.flows.len()),
            unassignable_flows: frame.stats.unassignable_flows,
            unresolved_segments: frame.stats.unresolved_segments,
            fallback: frame.stats.fallback,
        }
    }
}
