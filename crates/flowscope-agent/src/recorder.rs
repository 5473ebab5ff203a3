use anyhow::{Context, Result};
use flowscope_core::store::{FLOWS_FILE, TOPOLOGY_FILE};
use flowscope_core::{FlowSnapshot, JsonlWriter, Snapshot};
use std::path::Path;
use tokio::sync::mpsc;

/// Appends every sample to a recording directory for later playback.
pub struct Recorder {
    topology: JsonlWriter<Snapshot>,
    flows: JsonlWriter<FlowSnapshot>,
}

impl Recorder {
    pub fn open(dir: &Path) -> Result<Self> {
        let topology = JsonlWriter::create(dir.join(TOPOLOGY_FILE))
            .with_context(|| format!("open topology recording in {}", dir.display()))?;
        let flows = JsonlWriter::create(dir.join(FLOWS_FILE))
            .with_context(|| format!("open flow recording in {}", dir.display()))?;
        Ok(Self { topology, flows })
    }

    pub fn record(&mut self, topology: &Snapshot, flows: &FlowSnapshot) -> Result<()> {
        self.topology
            .append(topology)
            .context("append topology sample")?;
        self.flows.append(flows).context("append flow sample")?;
        Ok(())
    }
}

/// Moves the recorder onto its own thread so file writes never stall the
/// refresh task.
pub fn spawn(mut recorder: Recorder) -> mpsc::Sender<(Snapshot, FlowSnapshot)> {
    let (tx, mut rx) = mpsc::channel::<(Snapshot, FlowSnapshot)>(64);
    std::thread::spawn(move || {
        let mut failures = 0u64;
        while let Some((topology, flows)) = rx.blocking_recv() {
            if let Err(err) = recorder.record(&topology, &flows) {
                failures += 1;
                if failures == 1 || failures % 100 == 0 {
                    tracing::warn!(error = %err, failures, "recording failed");
                }
            }
        }
        tracing::debug!("recorder stopped");
    });
    tx
}
