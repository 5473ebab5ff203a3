use crate::model::{Address, FlowRecord, LinkKey, LinkRecord};
use crate::path::PathDecomposer;
use crate::resolve::NodeIdentityResolver;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Upper bound on flows placed on links when no flow carries a path.
pub const FALLBACK_FLOW_CAP: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssignStats {
    pub assigned_flows: usize,
    pub unassignable_flows: usize,
    pub unmatched_segments: usize,
    pub unresolved_segments: usize,
    pub fallback: bool,
}

/// Forward and reverse flow lists of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection<'a> {
    pub forward: &'a [usize],
    pub reverse: &'a [usize],
}

#[derive(Debug, Clone)]
pub struct LinkFlowAssigner {
    fallback_cap: usize,
}

impl Default for LinkFlowAssigner {
    fn default() -> Self {
        Self {
            fallback_cap: FALLBACK_FLOW_CAP,
        }
    }
}

impl LinkFlowAssigner {
    pub fn with_fallback_cap(fallback_cap: usize) -> Self {
        Self { fallback_cap }
    }

    /// Rebuilds every link's flow list from `flows`.
    ///
    /// Lookups are strictly directional: segment `(a, b)` only ever lands on
    /// link `(a, b)`, never on `(b, a)`.
    pub fn assign(
        &self,
        resolver: &NodeIdentityResolver,
        flows: &[FlowRecord],
        links: &mut [LinkRecord],
    ) -> AssignStats {
        for link in links.iter_mut() {
            link.flows.clear();
        }

        let mut index: HashMap<LinkKey, usize> = HashMap::with_capacity(links.len());
        for (i, link) in links.iter().enumerate() {
            index.entry(link.key()).or_insert(i);
        }

        if !flows.is_empty() && flows.iter().all(|f| f.path.is_empty()) {
            return self.assign_by_endpoints(flows, links, &index);
        }

        let decomposer = PathDecomposer::new(resolver);
        let mut stats = AssignStats::default();

        for (pos, flow) in flows.iter().enumerate() {
            let Some(decomposition) = decomposer.decompose(&flow.path) else {
                stats.unassignable_flows += 1;
                continue;
            };
            stats.unresolved_segments += decomposition.unresolved;

            let mut placed = false;
            for (a, b) in decomposition.segments {
                match index.get(&LinkKey::new(a, b)) {
                    Some(&li) => {
                        // flows are visited in order, so a repeat shows up last
                        let list = &mut links[li].flows;
                        if list.last() != Some(&pos) {
                            list.push(pos);
                        }
                        placed = true;
                    }
                    None => stats.unmatched_segments += 1,
                }
            }
            if placed {
                stats.assigned_flows += 1;
            }
        }

        if stats.unmatched_segments > 0 || stats.unresolved_segments > 0 {
            tracing::debug!(
                unmatched = stats.unmatched_segments,
                unresolved = stats.unresolved_segments,
                "some flow segments did not map to links"
            );
        }
        stats
    }

    fn assign_by_endpoints(
        &self,
        flows: &[FlowRecord],
        links: &mut [LinkRecord],
        index: &HashMap<LinkKey, usize>,
    ) -> AssignStats {
        let mut stats = AssignStats {
            fallback: true,
            ..AssignStats::default()
        };

        let mut ranked: Vec<usize> = (0..flows.len()).collect();
        ranked.sort_by(|&a, &b| by_rate_desc(&flows[a], &flows[b]));

        for pos in ranked {
            if stats.assigned_flows >= self.fallback_cap {
                break;
            }
            let flow = &flows[pos];
            match index.get(&LinkKey::new(flow.src.clone(), flow.dst.clone())) {
                Some(&li) => {
                    links[li].flows.push(pos);
                    stats.assigned_flows += 1;
                }
                None => stats.unmatched_segments += 1,
            }
        }

        tracing::debug!(
            assigned = stats.assigned_flows,
            cap = self.fallback_cap,
            "no flow paths available; assigned by endpoints"
        );
        stats
    }
}

/// Descending by rate; NaN rates sort last.
pub(crate) fn by_rate_desc(a: &FlowRecord, b: &FlowRecord) -> Ordering {
    match (a.rate.is_nan(), b.rate.is_nan()) {
        (false, false) => b.rate.total_cmp(&a.rate),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
}

/// Looks up both directions of the connection between `a` and `b`.
pub fn connection<'a>(links: &'a [LinkRecord], a: &Address, b: &Address) -> Connection<'a> {
    let find = |s: &Address, t: &Address| {
        links
            .iter()
            .find(|l| &l.source == s && &l.target == t)
            .map(|l| l.flows.as_slice())
            .unwrap_or(&[])
    };
    Connection {
        forward: find(a, b),
        reverse: find(b, a),
    }
}
