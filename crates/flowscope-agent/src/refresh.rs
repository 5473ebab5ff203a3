use crate::source::{DirSource, Sample};
use flowscope_core::{FlowSnapshot, Msg, Snapshot, Timestamp};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub fn now_ms() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as Timestamp)
        .unwrap_or(0)
}

pub fn split_sample(sample: Sample, ts: Timestamp) -> (Snapshot, FlowSnapshot) {
    (
        Snapshot {
            timestamp: ts,
            nodes: sample.nodes,
            links: sample.links,
        },
        FlowSnapshot {
            timestamp: ts,
            flows: sample.flows,
        },
    )
}

/// Periodic fetch → record → broadcast.
pub fn spawn(
    source: DirSource,
    interval: Duration,
    bus: broadcast::Sender<Msg>,
    recorder: Option<mpsc::Sender<(Snapshot, FlowSnapshot)>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tick.tick().await;

            let sample = match source.fetch().await {
                Ok(sample) => {
                    if consecutive_failures > 0 {
                        tracing::info!(consecutive_failures, "source recovered");
                    }
                    consecutive_failures = 0;
                    sample
                }
                Err(err) => {
                    consecutive_failures += 1;
                    if consecutive_failures == 1 {
                        tracing::warn!(
                            dir = %source.dir().display(),
                            error = %format!("{err:#}"),
                            "fetch failed"
                        );
                    }
                    continue;
                }
            };

            let (topology, flows) = split_sample(sample, now_ms());
            tracing::debug!(
                ts = topology.timestamp,
                nodes = topology.nodes.len(),
                links = topology.links.len(),
                flows = flows.flows.len(),
                "sample"
            );

            if let Some(rec) = &recorder {
                if rec.try_send((topology.clone(), flows.clone())).is_err() {
                    tracing::warn!("recorder backlog full; dropping sample");
                }
            }

            // no subscribers is fine
            let _ = bus.send(Msg::Frame { topology, flows });
        }
    })
}
