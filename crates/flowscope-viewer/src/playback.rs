use crate::mode::ModeSwitch;
use crate::styling::Publisher;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use flowscope_core::{
    open_recording, process_frame, FlowSnapshot, LinkFlowAssigner, Snapshot, StoreError,
    TimeAlignmentEngine, TimeIndexedStore, Timestamp,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const MIN_TICK: Duration = Duration::from_millis(10);

enum Request {
    Play { epoch: u64 },
    Pause,
    Step { epoch: u64 },
    Seek { epoch: u64, target: Timestamp },
    Redraw { epoch: u64 },
    Shutdown,
}

/// State the driver thread reports back to the handle.
struct Status {
    position: AtomicU64,
    running: AtomicBool,
    speed_bits: AtomicU64,
}

impl Status {
    fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Acquire))
    }
}

/// Drives an aligned recording forward in time on its own thread.
///
/// The thread owns the alignment engine; every read from the recording and
/// every assignment pass happens there, and the handle only sends requests.
/// Each tick renders the frame at the current target, then moves the target
/// by the average topology sample interval. Ticks are spaced by that same
/// interval divided by the speed multiplier. Reaching the end of the
/// recording stops the driver; `play` and `pause` are idempotent and
/// playing again resumes from wherever the target was left.
pub struct Playback {
    requests: Sender<Request>,
    status: Arc<Status>,
    modes: Arc<ModeSwitch>,
    range: Option<(Timestamp, Timestamp)>,
    step: u64,
    handle: Option<JoinHandle<()>>,
}

impl Playback {
    pub fn new<T, F>(
        mut engine: TimeAlignmentEngine<T, F>,
        publisher: Publisher,
        modes: Arc<ModeSwitch>,
        assigner: LinkFlowAssigner,
        speed: f64,
    ) -> Self
    where
        T: TimeIndexedStore<Record = Snapshot> + Send + 'static,
        F: TimeIndexedStore<Record = FlowSnapshot> + Send + 'static,
    {
        let range = engine.playback_range();
        let step = engine.step_hint();
        let target = range.map(|(start, _)| start).unwrap_or(0);
        let status = Arc::new(Status {
            position: AtomicU64::new(target),
            running: AtomicBool::new(false),
            speed_bits: AtomicU64::new(valid_speed(speed).unwrap_or(1.0).to_bits()),
        });
        let (requests, rx) = crossbeam_channel::unbounded();
        let driver = Driver {
            engine,
            target,
            range,
            step,
            status: Arc::clone(&status),
            modes: Arc::clone(&modes),
            publisher,
            assigner,
        };
        let handle = std::thread::spawn(move || driver.run(rx));
        Self {
            requests,
            status,
            modes,
            range,
            step,
            handle: Some(handle),
        }
    }

    pub fn open(
        dir: &Path,
        flow_window: usize,
        publisher: Publisher,
        modes: Arc<ModeSwitch>,
        assigner: LinkFlowAssigner,
        speed: f64,
    ) -> Result<Self, StoreError> {
        let (topology, flows) = open_recording(dir)?;
        tracing::info!(
            dir = %dir.display(),
            topology = topology.len(),
            flows = flows.len(),
            "recording opened"
        );
        let engine = TimeAlignmentEngine::new(topology, flows).with_flow_window(flow_window);
        Ok(Self::new(engine, publisher, modes, assigner, speed))
    }

    pub fn range(&self) -> Option<(Timestamp, Timestamp)> {
        self.range
    }

    pub fn step_ms(&self) -> u64 {
        self.step
    }

    pub fn position(&self) -> Timestamp {
        self.status.position.load(Ordering::Acquire)
    }

    pub fn speed(&self) -> f64 {
        self.status.speed()
    }

    pub fn is_running(&self) -> bool {
        self.status.running.load(Ordering::Acquire)
    }

    /// Ignores non-positive or non-finite multipliers.
    pub fn set_speed(&self, speed: f64) -> bool {
        let Some(speed) = valid_speed(speed) else {
            return false;
        };
        self.status.speed_bits.store(speed.to_bits(), Ordering::Release);
        true
    }

    /// Moves the target, clamped to the recording, and renders it once.
    /// Returns the clamped target.
    pub fn seek(&self, target: Timestamp) -> Timestamp {
        let Some((start, end)) = self.range else {
            return target;
        };
        let target = target.clamp(start, end);
        self.send(Request::Seek {
            epoch: self.modes.epoch(),
            target,
        });
        target
    }

    /// Pauses, renders the current target and advances by one step.
    pub fn step_once(&self) {
        self.status.running.store(false, Ordering::Release);
        self.send(Request::Step {
            epoch: self.modes.epoch(),
        });
    }

    /// Renders the current target again without moving it.
    pub fn redraw(&self) {
        self.send(Request::Redraw {
            epoch: self.modes.epoch(),
        });
    }

    pub fn play(&self) -> bool {
        if self.range.is_none() {
            tracing::warn!("recording is empty; nothing to play");
            return false;
        }
        self.status.running.store(true, Ordering::Release);
        self.send(Request::Play {
            epoch: self.modes.epoch(),
        });
        true
    }

    pub fn pause(&self) {
        self.status.running.store(false, Ordering::Release);
        self.send(Request::Pause);
    }

    fn send(&self, request: Request) {
        if self.requests.send(request).is_err() {
            tracing::warn!("playback thread gone");
        }
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        let _ = self.requests.send(Request::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("playback thread panicked");
            }
        }
    }
}

struct Driver<T, F> {
    engine: TimeAlignmentEngine<T, F>,
    target: Timestamp,
    range: Option<(Timestamp, Timestamp)>,
    step: u64,
    status: Arc<Status>,
    modes: Arc<ModeSwitch>,
    publisher: Publisher,
    assigner: LinkFlowAssigner,
}

impl<T, F> Driver<T, F>
where
    T: TimeIndexedStore<Record = Snapshot>,
    F: TimeIndexedStore<Record = FlowSnapshot>,
{
    fn run(mut self, requests: Receiver<Request>) {
        // epoch the current run was started under
        let mut playing: Option<u64> = None;
        let mut due = Instant::now();
        loop {
            let request = match playing {
                Some(_) => match requests.recv_deadline(due) {
                    Ok(request) => Some(request),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match requests.recv() {
                    Ok(request) => Some(request),
                    Err(_) => break,
                },
            };

            match request {
                None => {
                    if let Some(epoch) = playing {
                        if !self.modes.is_current(epoch) {
                            tracing::debug!(epoch, "playback cancelled by mode switch");
                            playing = self.stop();
                        } else if !self.advance(epoch) {
                            playing = self.stop();
                        }
                        due = Instant::now() + self.tick();
                    }
                }
                Some(Request::Play { epoch }) => {
                    if playing.is_some() {
                        continue;
                    }
                    if !self.modes.is_current(epoch) {
                        playing = self.stop();
                        continue;
                    }
                    if let Some((start, end)) = self.range {
                        if self.target >= end {
                            self.move_to(start);
                        }
                    }
                    tracing::info!(
                        from = self.target,
                        speed = self.status.speed(),
                        "playback started"
                    );
                    self.status.running.store(true, Ordering::Release);
                    playing = Some(epoch);
                    due = Instant::now();
                }
                Some(Request::Pause) => {
                    if playing.is_some() {
                        tracing::info!(at = self.target, "playback paused");
                    }
                    playing = self.stop();
                }
                Some(Request::Step { epoch }) => {
                    playing = self.stop();
                    self.advance(epoch);
                }
                Some(Request::Seek { epoch, target }) => {
                    self.move_to(target);
                    self.render(epoch, target);
                }
                Some(Request::Redraw { epoch }) => {
                    self.render(epoch, self.target);
                }
                Some(Request::Shutdown) => break,
            }
        }
        self.stop();
    }

    fn stop(&self) -> Option<u64> {
        self.status.running.store(false, Ordering::Release);
        None
    }

    fn move_to(&mut self, target: Timestamp) {
        self.target = target;
        self.status.position.store(target, Ordering::Release);
    }

    fn tick(&self) -> Duration {
        let ms = self.step as f64 / self.status.speed();
        Duration::try_from_secs_f64(ms / 1000.0)
            .unwrap_or(Duration::MAX)
            .max(MIN_TICK)
    }

    fn render(&mut self, epoch: u64, target: Timestamp) -> bool {
        let frame = match self.engine.get_frame(target) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(ts = target, %err, "failed to read recording");
                return false;
            }
        };
        self.publisher
            .publish(epoch, Arc::new(process_frame(frame, &self.assigner)))
    }

    /// False once the end of the recording has been rendered.
    fn advance(&mut self, epoch: u64) -> bool {
        let Some((_, end)) = self.range else {
            return false;
        };
        let target = self.target;
        if !self.render(epoch, target) {
            return false;
        }
        if target >= end {
            tracing::info!(end, "playback reached end of recording");
            return false;
        }
        self.move_to(target.saturating_add(self.step).min(end));
        true
    }
}

fn valid_speed(speed: f64) -> Option<f64> {
    (speed.is_finite() && speed > 0.0).then_some(speed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::Handoff;
    use crate::mode::Mode;
    use crate::styling::{FrameStyler, StyledFrame};
    use flowscope_core::MemoryStore;

    fn topology(stamps: &[u64]) -> MemoryStore<Snapshot> {
        MemoryStore::new(
            stamps
                .iter()
                .map(|&timestamp| Snapshot {
                    timestamp,
                    ..Snapshot::default()
                })
                .collect(),
        )
    }

    fn flows(stamps: &[u64]) -> MemoryStore<FlowSnapshot> {
        MemoryStore::new(
            stamps
                .iter()
                .map(|&timestamp| FlowSnapshot {
                    timestamp,
                    flows: Vec::new(),
                })
                .collect(),
        )
    }

    fn setup_with(
        mode: Mode,
        topo: &[u64],
        flow: &[u64],
    ) -> (Arc<ModeSwitch>, Arc<Handoff<StyledFrame>>, Playback) {
        let modes = Arc::new(ModeSwitch::new(mode));
        let handoff = Arc::new(Handoff::new(Arc::clone(&modes)));
        let publisher = Publisher::new(Arc::new(FrameStyler::new(64, 0)), Arc::clone(&handoff));
        let playback = Playback::new(
            TimeAlignmentEngine::new(topology(topo), flows(flow)),
            publisher,
            Arc::clone(&modes),
            LinkFlowAssigner::default(),
            1.0,
        );
        (modes, handoff, playback)
    }

    fn setup(mode: Mode) -> (Arc<ModeSwitch>, Arc<Handoff<StyledFrame>>, Playback) {
        setup_with(mode, &[0, 100, 200, 300], &[150, 250, 350])
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn next_frame(handoff: &Handoff<StyledFrame>) -> Option<StyledFrame> {
        let mut frame = None;
        wait_until(|| {
            frame = handoff.take();
            frame.is_some()
        });
        frame
    }

    #[test]
    fn range_starts_at_alignment_zero() {
        let (_, _, playback) = setup(Mode::Playback);
        assert_eq!(playback.range(), Some((200, 300)));
        assert_eq!(playback.step_ms(), 100);
        assert_eq!(playback.position(), 200);
    }

    #[test]
    fn stepping_renders_then_advances_until_the_end() {
        let (_, handoff, playback) = setup(Mode::Playback);

        playback.step_once();
        let first = next_frame(&handoff).expect("first frame");
        assert_eq!(first.frame.timestamp, 200);
        assert!(wait_until(|| playback.position() == 300));

        playback.step_once();
        let last = next_frame(&handoff).expect("final frame");
        assert_eq!(last.frame.timestamp, 300);
        assert_eq!(last.frame.flow_timestamp, Some(250));
        assert_eq!(playback.position(), 300);
    }

    #[test]
    fn seek_clamps_and_renders() {
        let (_, handoff, playback) = setup(Mode::Playback);
        assert_eq!(playback.seek(10_000), 300);
        assert_eq!(next_frame(&handoff).map(|f| f.frame.timestamp), Some(300));
        assert_eq!(playback.position(), 300);
        assert_eq!(playback.seek(0), 200);
        assert!(wait_until(|| playback.position() == 200));
    }

    #[test]
    fn rejects_bad_speed() {
        let (_, _, playback) = setup(Mode::Playback);
        assert!(!playback.set_speed(0.0));
        assert!(!playback.set_speed(f64::NAN));
        assert!(playback.set_speed(4.0));
        assert_eq!(playback.speed(), 4.0);
    }

    #[test]
    fn play_runs_to_the_end_and_stops() {
        let (_, handoff, playback) = setup(Mode::Playback);
        playback.set_speed(1_000.0);

        assert!(playback.play());
        assert!(playback.play());
        assert!(wait_until(|| !playback.is_running()));

        assert_eq!(playback.position(), 300);
        assert_eq!(handoff.take().map(|f| f.frame.timestamp), Some(300));
        playback.pause();
        playback.pause();
    }

    #[test]
    fn mode_switch_cancels_playback() {
        let stamps: Vec<u64> = (0..=20).map(|i| i * 100).collect();
        let (modes, handoff, playback) = setup_with(Mode::Playback, &stamps, &stamps);

        assert!(playback.play());
        modes.switch(Mode::Live);
        assert!(wait_until(|| !playback.is_running()));

        assert!(handoff.take().is_none());
        assert!(playback.position() < 2_000);
    }

    #[test]
    fn resumes_from_paused_position() {
        let stamps: Vec<u64> = (0..=20).map(|i| i * 100).collect();
        let (_, handoff, playback) = setup_with(Mode::Playback, &stamps, &stamps);
        assert_eq!(playback.range(), Some((0, 2_000)));

        // 100 ms step at 4x: one tick every 25 ms
        playback.set_speed(4.0);
        assert!(playback.play());
        assert!(wait_until(|| playback.position() >= 300));
        playback.pause();
        assert!(wait_until(|| !playback.is_running()));
        let paused_at = playback.position();
        handoff.take();

        assert!(playback.play());
        let resumed = next_frame(&handoff).expect("frame after resume");
        playback.pause();

        assert!(resumed.frame.timestamp >= paused_at);
        assert_ne!(resumed.frame.timestamp, 0);
    }
}
