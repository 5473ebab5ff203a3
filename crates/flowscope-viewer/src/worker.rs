use crate::mode::ModeSwitch;
use crate::styling::Publisher;
use crossbeam_channel::Receiver;
use flowscope_core::{process, FlowSnapshot, LinkFlowAssigner, ProcessedFrame, Snapshot};
use std::sync::Arc;
use std::thread::JoinHandle;

pub type LiveSample = (Snapshot, FlowSnapshot);

pub enum Job {
    /// Fresh topology and flows from the agent.
    Live(LiveSample),
    /// Re-run styling on an already assigned frame, e.g. after top-K changed.
    Restyle {
        epoch: u64,
        frame: Arc<ProcessedFrame>,
    },
}

/// Runs link assignment for live samples off the presentation thread.
///
/// Jobs that queue up while a cycle is running are collapsed: only the
/// newest live sample is assigned, and a pending restyle is skipped when a
/// live sample will produce a fresher frame anyway. The worker exits when
/// the sender side is dropped.
pub fn spawn_assigner(
    rx: Receiver<Job>,
    publisher: Publisher,
    modes: Arc<ModeSwitch>,
    assigner: LinkFlowAssigner,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while let Ok(first) = rx.recv() {
            let mut live = None;
            let mut restyle = None;
            for job in std::iter::once(first).chain(rx.try_iter()) {
                match job {
                    Job::Live(sample) => live = Some(sample),
                    Job::Restyle { epoch, frame } => restyle = Some((epoch, frame)),
                }
            }

            if let Some((topology, flows)) = live {
                // mode and epoch come from one load; a later switch makes
                // the publish below fail
                if let Some(epoch) = modes.live_epoch() {
                    let frame = process(topology, Some(flows), &assigner);
                    if frame.stats.unresolved_segments > 0 || frame.stats.unmatched_segments > 0 {
                        tracing::debug!(
                            unresolved = frame.stats.unresolved_segments,
                            unmatched = frame.stats.unmatched_segments,
                            "segments skipped during assignment"
                        );
                    }
                    publisher.publish(epoch, Arc::new(frame));
                    continue;
                }
            }
            if let Some((epoch, frame)) = restyle {
                publisher.publish(epoch, frame);
            }
        }
        tracing::debug!("assignment worker stopped");
    })
}
