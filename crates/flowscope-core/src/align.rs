use crate::model::{FlowSnapshot, Snapshot, Timestamp};
use crate::store::{StoreError, TimeIndexedStore};

pub const DEFAULT_STEP_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentState {
    Unaligned,
    /// `zero` is the topology position paired with the first flow sample.
    Established { zero: usize },
}

/// Store positions chosen for one target timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramePosition {
    pub topology: Option<usize>,
    pub flow: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub target: Timestamp,
    pub position: FramePosition,
    pub topology: Snapshot,
    /// Oldest first; the last entry is the one paired with `topology`.
    pub flows: Vec<FlowSnapshot>,
}

impl Frame {
    pub fn latest_flows(&self) -> Option<&FlowSnapshot> {
        self.flows.last()
    }

    pub fn is_empty(&self) -> bool {
        self.position.topology.is_none() && self.flows.is_empty()
    }
}

/// Pairs topology and flow samples taken on independent clocks.
///
/// The first topology sample at or after the first flow sample becomes the
/// zero point for both sequences, fixed for the life of the engine. A target
/// timestamp picks a topology position from the zero point onward and the
/// flow position at the same distance from the start of the flow source,
/// clamped to its end. Both positions are monotone in the target.
pub struct TimeAlignmentEngine<T, F> {
    topology: T,
    flows: F,
    state: AlignmentState,
    flow_window: usize,
}

impl<T, F> TimeAlignmentEngine<T, F>
where
    T: TimeIndexedStore<Record = Snapshot>,
    F: TimeIndexedStore<Record = FlowSnapshot>,
{
    pub fn new(topology: T, flows: F) -> Self {
        Self {
            topology,
            flows,
            state: AlignmentState::Unaligned,
            flow_window: 1,
        }
    }

    pub fn with_flow_window(mut self, flow_window: usize) -> Self {
        self.flow_window = flow_window.max(1);
        self
    }

    pub fn state(&self) -> AlignmentState {
        self.state
    }

    pub fn topology_store(&self) -> &T {
        &self.topology
    }

    pub fn flow_store(&self) -> &F {
        &self.flows
    }

    /// Computes the zero point on first use; `None` while either source is
    /// empty.
    pub fn establish(&mut self) -> Option<usize> {
        if let AlignmentState::Established { zero } = self.state {
            return Some(zero);
        }
        let first_flow = self.flows.timestamp_at(0)?;
        if self.topology.is_empty() {
            return None;
        }
        let zero = self
            .topology
            .position_at_or_after(first_flow)
            .unwrap_or(self.topology.len() - 1);
        tracing::info!(
            zero,
            first_flow,
            topology_ts = self.topology.timestamp_at(zero),
            "time alignment established"
        );
        self.state = AlignmentState::Established { zero };
        Some(zero)
    }

    /// Store positions for `target` without reading any records.
    pub fn locate(&mut self, target: Timestamp) -> FramePosition {
        if self.topology.is_empty() {
            return FramePosition::default();
        }
        let Some(zero) = self.establish() else {
            // no flow data: plain topology lookup
            let topology = self.topology.position_at_or_before(target, 0).unwrap_or(0);
            return FramePosition {
                topology: Some(topology),
                flow: None,
            };
        };

        let topology = self
            .topology
            .position_at_or_before(target, zero)
            .unwrap_or(zero);
        let relative = topology.saturating_sub(zero);
        let flow = relative.min(self.flows.len() - 1);
        FramePosition {
            topology: Some(topology),
            flow: Some(flow),
        }
    }

    pub fn get_frame(&mut self, target: Timestamp) -> Result<Frame, StoreError> {
        let position = self.locate(target);
        let topology = match position.topology {
            Some(pos) => self.topology.read_position(pos)?,
            None => Snapshot::default(),
        };
        let mut flows = Vec::new();
        if let Some(last) = position.flow {
            let first = (last + 1).saturating_sub(self.flow_window);
            for pos in first..=last {
                flows.push(self.flows.read_position(pos)?);
            }
        }
        Ok(Frame {
            target,
            position,
            topology,
            flows,
        })
    }

    /// Average interval between topology samples.
    pub fn step_hint(&self) -> u64 {
        let entries = self.topology.entries();
        match (entries.first(), entries.last()) {
            (Some(first), Some(last)) if entries.len() >= 2 => {
                ((last.timestamp - first.timestamp) / (entries.len() as u64 - 1)).max(1)
            }
            _ => DEFAULT_STEP_MS,
        }
    }

    /// Target range that playback should cover.
    pub fn playback_range(&mut self) -> Option<(Timestamp, Timestamp)> {
        let end = self.topology.entries().last()?.timestamp;
        let start = match self.establish() {
            Some(zero) => self.topology.timestamp_at(zero)?,
            None => self.topology.timestamp_at(0)?,
        };
        Some((start, end))
    }
}
