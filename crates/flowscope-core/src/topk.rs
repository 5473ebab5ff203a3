use crate::assign::by_rate_desc;
use crate::identity::FlowKey;
use crate::model::FlowRecord;
use std::collections::{BTreeSet, HashSet};

/// Positions in the current flow list that should be drawn.
///
/// Only meaningful for the list it was computed from; recompute after every
/// replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibilitySet {
    All,
    Only(BTreeSet<usize>),
}

impl VisibilitySet {
    pub fn contains(&self, pos: usize) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&pos),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn visible_count(&self, total: usize) -> usize {
        match self {
            Self::All => total,
            Self::Only(set) => set.iter().filter(|&&p| p < total).count(),
        }
    }
}

impl Default for VisibilitySet {
    fn default() -> Self {
        Self::All
    }
}

/// "Top K by rate" filter that survives wholesale flow list replacement.
///
/// Selection is remembered as five-tuple keys, never as positions or
/// references, and positions are rebuilt by matching keys against whatever
/// list is current. Distinct flows sharing a five-tuple are indistinguishable
/// here and are shown or hidden together.
#[derive(Debug, Clone, Default)]
pub struct TopKSelector {
    enabled: bool,
    k: usize,
    selected: HashSet<FlowKey>,
}

impl TopKSelector {
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn selected_keys(&self) -> &HashSet<FlowKey> {
        &self.selected
    }

    /// Enables the filter with `k`, unless `k` would show everything anyway
    /// (`k == 0` or `k >= flows.len()`), in which case the filter is turned
    /// off.
    pub fn select(&mut self, flows: &[FlowRecord], k: usize) -> VisibilitySet {
        if k == 0 || k >= flows.len() {
            self.disable();
            return VisibilitySet::All;
        }
        self.enabled = true;
        self.k = k;
        self.rank(flows)
    }

    /// Re-ranks a replacement flow list with the configured `k`.
    ///
    /// Never changes `enabled` or `k`; an empty list yields an empty set and
    /// keeps the previous selection.
    pub fn reapply(&mut self, flows: &[FlowRecord]) -> VisibilitySet {
        if !self.enabled {
            return VisibilitySet::All;
        }
        if flows.is_empty() {
            return VisibilitySet::Only(BTreeSet::new());
        }
        self.rank(flows)
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        self.k = 0;
        self.selected.clear();
    }

    /// Positions in `flows` whose five-tuple is currently selected.
    pub fn matching(&self, flows: &[FlowRecord]) -> BTreeSet<usize> {
        flows
            .iter()
            .enumerate()
            .filter(|(_, f)| self.selected.contains(&FlowKey::of(f)))
            .map(|(pos, _)| pos)
            .collect()
    }

    fn rank(&mut self, flows: &[FlowRecord]) -> VisibilitySet {
        let mut order: Vec<usize> = (0..flows.len()).collect();
        order.sort_by(|&a, &b| by_rate_desc(&flows[a], &flows[b]));
        self.selected = order
            .iter()
            .take(self.k)
            .map(|&pos| FlowKey::of(&flows[pos]))
            .collect();
        VisibilitySet::Only(self.matching(flows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flows_with_rates(rates: &[f64]) -> Vec<FlowRecord> {
        rates
            .iter()
            .enumerate()
            .map(|(i, &rate)| {
                FlowRecord::new("10.0.0.1", "10.0.0.2", 1000 + i as u16, 80, 6).with_rate(rate)
            })
            .collect()
    }

    #[test]
    fn selects_three_fastest_of_ten() {
        let flows = flows_with_rates(&[5.0, 90.0, 1.0, 40.0, 7.0, 80.0, 3.0, 2.0, 8.0, 6.0]);
        let mut sel = TopKSelector::default();

        let vis = sel.select(&flows, 3);

        assert_eq!(vis, VisibilitySet::Only([1, 3, 5].into_iter().collect()));
        assert!(sel.is_enabled());
        assert_eq!(sel.k(), 3);
        assert_eq!(vis.visible_count(flows.len()), 3);
    }

    #[test]
    fn k_equal_to_flow_count_disables() {
        let flows = flows_with_rates(&[1.0, 2.0, 3.0]);
        let mut sel = TopKSelector::default();
        sel.select(&flows, 2);
        assert!(sel.is_enabled());

        let vis = sel.select(&flows, 3);

        assert!(vis.is_all());
        assert!(!sel.is_enabled());
        assert!(sel.selected_keys().is_empty());
    }

    #[test]
    fn k_zero_means_show_all() {
        let flows = flows_with_rates(&[1.0, 2.0, 3.0]);
        let mut sel = TopKSelector::default();
        assert!(sel.select(&flows, 0).is_all());
        assert!(!sel.is_enabled());
    }

    #[test]
    fn reapply_matches_by_five_tuple_after_replacement() {
        let flows = flows_with_rates(&[10.0, 50.0, 30.0, 20.0]);
        let mut sel = TopKSelector::default();
        sel.select(&flows, 2);

        // same flows, fresh records, reversed order, rates unchanged
        let mut replaced: Vec<FlowRecord> = flows.iter().cloned().rev().collect();
        for f in &mut replaced {
            f.path = vec!["10.0.0.1".into(), "10.0.0.2".into()];
        }
        let vis = sel.reapply(&replaced);

        // ports 1001 (50.0) and 1002 (30.0) now sit at positions 2 and 1
        assert_eq!(vis, VisibilitySet::Only([1, 2].into_iter().collect()));
    }

    #[test]
    fn reapply_follows_rate_changes() {
        let mut sel = TopKSelector::default();
        sel.select(&flows_with_rates(&[10.0, 50.0, 30.0]), 1);

        let vis = sel.reapply(&flows_with_rates(&[99.0, 50.0, 30.0]));

        assert_eq!(vis, VisibilitySet::Only([0].into_iter().collect()));
        assert_eq!(sel.k(), 1);
    }

    #[test]
    fn reapply_on_empty_list_keeps_settings() {
        let flows = flows_with_rates(&[10.0, 50.0, 30.0]);
        let mut sel = TopKSelector::default();
        sel.select(&flows, 1);

        let vis = sel.reapply(&[]);

        assert_eq!(vis, VisibilitySet::Only(BTreeSet::new()));
        assert!(sel.is_enabled());
        assert_eq!(sel.k(), 1);
        assert_eq!(sel.selected_keys().len(), 1);

        let vis = sel.reapply(&flows);
        assert_eq!(vis, VisibilitySet::Only([1].into_iter().collect()));
    }

    #[test]
    fn reapply_keeps_filter_when_list_shrinks_below_k() {
        let mut sel = TopKSelector::default();
        sel.select(&flows_with_rates(&[1.0, 2.0, 3.0, 4.0]), 3);

        let vis = sel.reapply(&flows_with_rates(&[1.0, 2.0]));

        assert!(sel.is_enabled());
        assert_eq!(vis, VisibilitySet::Only([0, 1].into_iter().collect()));
    }

    #[test]
    fn disabled_filter_shows_everything() {
        let mut sel = TopKSelector::default();
        assert!(sel.reapply(&flows_with_rates(&[1.0])).is_all());
    }

    #[test]
    fn duplicate_five_tuples_are_shown_together() {
        let mut flows = flows_with_rates(&[100.0, 1.0, 2.0]);
        let mut twin = flows[0].clone();
        twin.rate = 0.5;
        flows.push(twin);
        let mut sel = TopKSelector::default();

        let vis = sel.select(&flows, 1);

        assert_eq!(vis, VisibilitySet::Only([0, 3].into_iter().collect()));
    }
}
