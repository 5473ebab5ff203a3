use crate::align::Frame;
use crate::assign::{connection, AssignStats, Connection, LinkFlowAssigner};
use crate::model::{Address, FlowRecord, FlowSnapshot, LinkRecord, NodeRecord, Snapshot, Timestamp};
use crate::resolve::NodeIdentityResolver;

/// Result of one assignment cycle, ready to hand to presentation.
///
/// Built whole on a worker and never mutated after it leaves.
#[derive(Debug, Clone, Default)]
pub struct ProcessedFrame {
    pub timestamp: Timestamp,
    pub flow_timestamp: Option<Timestamp>,
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<LinkRecord>,
    pub flows: Vec<FlowRecord>,
    pub stats: AssignStats,
}

impl ProcessedFrame {
    pub fn connection(&self, a: &Address, b: &Address) -> Connection<'_> {
        connection(&self.links, a, b)
    }

    pub fn busy_links(&self) -> usize {
        self.links.iter().filter(|l| !l.flows.is_empty()).count()
    }
}

/// Runs resolution and link assignment for one topology/flow pair.
pub fn process(
    topology: Snapshot,
    flows: Option<FlowSnapshot>,
    assigner: &LinkFlowAssigner,
) -> ProcessedFrame {
    let resolver = NodeIdentityResolver::from_nodes(&topology.nodes);
    let (flow_timestamp, flows) = match flows {
        Some(snap) => (Some(snap.timestamp), snap.flows),
        None => (None, Vec::new()),
    };

    let mut links = topology.links;
    let stats = assigner.assign(&resolver, &flows, &mut links);

    ProcessedFrame {
        timestamp: topology.timestamp,
        flow_timestamp,
        nodes: topology.nodes,
        links,
        flows,
        stats,
    }
}

/// Processes an aligned playback frame using its most recent flow sample.
pub fn process_frame(frame: Frame, assigner: &LinkFlowAssigner) -> ProcessedFrame {
    let Frame {
        topology, mut flows, ..
    } = frame;
    process(topology, flows.pop(), assigner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::TimeAlignmentEngine;
    use crate::store::MemoryStore;

    fn node(address: &str, device_id: u32) -> NodeRecord {
        NodeRecord {
            address: Address::from(address),
            name: format!("dev{device_id}"),
            device_id,
            enabled: true,
            up: true,
            layer: "switch".into(),
        }
    }

    fn topology(ts: Timestamp) -> Snapshot {
        Snapshot {
            timestamp: ts,
            nodes: vec![node("10.0.0.1", 1), node("10.0.0.2", 2), node("10.0.0.3", 3)],
            links: vec![
                LinkRecord::new("10.0.0.1", "10.0.0.2"),
                LinkRecord::new("10.0.0.2", "10.0.0.3"),
                LinkRecord::new("10.0.0.3", "10.0.0.2"),
            ],
        }
    }

    #[test]
    fn process_assigns_device_id_paths() {
        let flows = FlowSnapshot {
            timestamp: 7,
            flows: vec![
                FlowRecord::new("10.0.0.1", "10.0.0.3", 1, 2, 6).with_path(["1", "2", "3"]),
                FlowRecord::new("10.0.0.3", "10.0.0.2", 3, 4, 17).with_path(["3", "2"]),
                FlowRecord::new("10.0.0.9", "10.0.0.8", 5, 6, 6),
            ],
        };

        let out = process(topology(5), Some(flows), &LinkFlowAssigner::default());

        assert_eq!(out.timestamp, 5);
        assert_eq!(out.flow_timestamp, Some(7));
        assert_eq!(out.flows.len(), 3);
        assert_eq!(out.stats.assigned_flows, 2);
        assert_eq!(out.stats.unassignable_flows, 1);
        let c = out.connection(&Address::from("10.0.0.2"), &Address::from("10.0.0.3"));
        assert_eq!(c.forward, &[0]);
        assert_eq!(c.reverse, &[1]);
        assert_eq!(out.busy_links(), 3);
    }

    #[test]
    fn process_without_flows_clears_links() {
        let mut topo = topology(1);
        topo.links[0].flows = vec![3];

        let out = process(topo, None, &LinkFlowAssigner::default());

        assert_eq!(out.flow_timestamp, None);
        assert_eq!(out.busy_links(), 0);
    }

    #[test]
    fn playback_frame_uses_latest_flow_sample() {
        let old = FlowSnapshot {
            timestamp: 0,
            flows: Vec::new(),
        };
        let new = FlowSnapshot {
            timestamp: 10,
            flows: vec![FlowRecord::new("10.0.0.1", "10.0.0.2", 1, 2, 6)
                .with_path(["10.0.0.1", "10.0.0.2"])],
        };
        let mut engine = TimeAlignmentEngine::new(
            MemoryStore::new(vec![topology(0), topology(10)]),
            MemoryStore::new(vec![old, new]),
        )
        .with_flow_window(2);

        let frame = engine.get_frame(10).expect("frame");
        let out = process_frame(frame, &LinkFlowAssigner::default());

        assert_eq!(out.flow_timestamp, Some(10));
        assert_eq!(out.stats.assigned_flows, 1);
    }
}
