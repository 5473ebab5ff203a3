use crate::handoff::Handoff;
use flowscope_core::{FlowIdentityStore, ProcessedFrame, TopKSelector, VisibilitySet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A processed frame with everything presentation needs precomputed: the
/// visible flow positions and a colour slot per flow.
#[derive(Debug, Clone)]
pub struct StyledFrame {
    pub frame: Arc<ProcessedFrame>,
    pub visibility: VisibilitySet,
    /// Colour slot for each entry of `frame.flows`, by position.
    pub slots: Vec<u32>,
    pub top_k: Option<usize>,
}

impl StyledFrame {
    pub fn slot(&self, pos: usize) -> Option<u32> {
        self.slots.get(pos).copied()
    }
}

struct Tables {
    identity: FlowIdentityStore,
    topk: TopKSelector,
}

/// Colour identities and the top-K filter, applied by whichever background
/// thread produced the frame.
///
/// The requested k is a plain atomic so the presentation thread can change
/// it without waiting on a styling pass in progress.
pub struct FrameStyler {
    wanted_k: AtomicUsize,
    tables: Mutex<Tables>,
}

impl FrameStyler {
    pub fn new(palette_size: u32, top_k: usize) -> Self {
        Self {
            wanted_k: AtomicUsize::new(top_k),
            tables: Mutex::new(Tables {
                identity: FlowIdentityStore::new(palette_size),
                topk: TopKSelector::default(),
            }),
        }
    }

    /// `None` (or `Some(0)`) shows every flow. Takes effect on the next
    /// styled frame.
    pub fn set_top_k(&self, k: Option<usize>) {
        self.wanted_k.store(k.unwrap_or(0), Ordering::Release);
    }

    pub fn top_k(&self) -> Option<usize> {
        let k = self.wanted_k.load(Ordering::Acquire);
        (k > 0).then_some(k)
    }

    pub fn style(&self, frame: Arc<ProcessedFrame>) -> StyledFrame {
        let k = self.wanted_k.load(Ordering::Acquire);
        let mut guard = self.tables.lock().unwrap_or_else(PoisonError::into_inner);
        let tables = &mut *guard;

        let slots = frame
            .flows
            .iter()
            .map(|flow| tables.identity.color_slot_for(flow))
            .collect();

        // a changed k is a fresh selection, not a reapply
        if tables.topk.is_enabled() && tables.topk.k() != k {
            tables.topk.disable();
        }
        let visibility = if tables.topk.is_enabled() {
            tables.topk.reapply(&frame.flows)
        } else if k > 0 {
            tables.topk.select(&frame.flows, k)
        } else {
            VisibilitySet::All
        };

        StyledFrame {
            frame,
            visibility,
            slots,
            top_k: (k > 0).then_some(k),
        }
    }
}

/// Styles finished frames and drops them into the presentation handoff.
#[derive(Clone)]
pub struct Publisher {
    styler: Arc<FrameStyler>,
    handoff: Arc<Handoff<StyledFrame>>,
}

impl Publisher {
    pub fn new(styler: Arc<FrameStyler>, handoff: Arc<Handoff<StyledFrame>>) -> Self {
        Self { styler, handoff }
    }

    /// False when the result belongs to a mode that is no longer active.
    pub fn publish(&self, epoch: u64, frame: Arc<ProcessedFrame>) -> bool {
        if !self.handoff.accepts(epoch) {
            return false;
        }
        self.handoff.publish(epoch, self.styler.style(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::{Mode, ModeSwitch};
    use flowscope_core::{process, FlowRecord, FlowSnapshot, LinkFlowAssigner, LinkRecord, Snapshot};

    fn frame(rates: &[f64]) -> Arc<ProcessedFrame> {
        let topology = Snapshot {
            timestamp: 1_000,
            nodes: Vec::new(),
            links: vec![LinkRecord::new("10.0.0.1", "10.0.0.2")],
        };
        let flows = rates
            .iter()
            .enumerate()
            .map(|(i, &rate)| {
                FlowRecord::new("10.0.0.1", "10.0.0.2", 1_000 + i as u16, 80, 6)
                    .with_path(["10.0.0.1", "10.0.0.2"])
                    .with_rate(rate)
            })
            .collect();
        Arc::new(process(
            topology,
            Some(FlowSnapshot {
                timestamp: 1_000,
                flows,
            }),
            &LinkFlowAssigner::default(),
        ))
    }

    fn visible(styled: &StyledFrame) -> Vec<usize> {
        (0..styled.frame.flows.len())
            .filter(|&pos| styled.visibility.contains(pos))
            .collect()
    }

    #[test]
    fn top_k_limits_visibility_until_turned_off() {
        let styler = FrameStyler::new(64, 2);
        let styled = styler.style(frame(&[1.0, 9.0, 5.0, 3.0]));
        assert_eq!(visible(&styled), vec![1, 2]);
        assert_eq!(styled.top_k, Some(2));

        styler.set_top_k(None);
        let styled = styler.style(frame(&[1.0, 9.0, 5.0, 3.0]));
        assert!(styled.visibility.is_all());
        assert_eq!(styled.top_k, None);
    }

    #[test]
    fn top_k_follows_replacement_frames() {
        let styler = FrameStyler::new(64, 1);
        assert_eq!(visible(&styler.style(frame(&[1.0, 9.0]))), vec![1]);
        assert_eq!(visible(&styler.style(frame(&[8.0, 2.0]))), vec![0]);
    }

    #[test]
    fn changing_k_reselects() {
        let styler = FrameStyler::new(64, 1);
        styler.style(frame(&[1.0, 9.0, 5.0]));
        styler.set_top_k(Some(2));
        assert_eq!(visible(&styler.style(frame(&[1.0, 9.0, 5.0]))), vec![1, 2]);
    }

    #[test]
    fn colour_slots_survive_frame_replacement() {
        let styler = FrameStyler::new(64, 0);
        let before = styler.style(frame(&[1.0, 2.0])).slots;
        let after = styler.style(frame(&[7.0, 3.0])).slots;
        assert_eq!(before, after);
        assert!(before.iter().all(|&slot| slot < 64));
    }

    #[test]
    fn publisher_skips_stale_epochs() {
        let modes = Arc::new(ModeSwitch::new(Mode::Live));
        let handoff = Arc::new(Handoff::new(Arc::clone(&modes)));
        let publisher = Publisher::new(Arc::new(FrameStyler::new(64, 0)), Arc::clone(&handoff));

        let old = modes.epoch();
        modes.switch(Mode::Playback);
        assert!(!publisher.publish(old, frame(&[1.0])));
        assert!(publisher.publish(modes.epoch(), frame(&[1.0])));
        assert_eq!(handoff.take().map(|s| s.slots.len()), Some(1));
    }
}
