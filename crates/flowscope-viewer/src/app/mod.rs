use crate::commands::Command;
use crate::handoff::Handoff;
use crate::mode::{Mode, ModeSwitch};
use crate::net::{Incoming, IncomingKind};
use crate::playback::Playback;
use crate::state::PresentationState;
use crate::styling::{FrameStyler, StyledFrame};
use crate::util::config::{self, ViewerConfig};
use crate::worker::Job;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;

/// Presentation-loop side of the viewer: routes network input and user
/// commands, and applies finished frames taken from the handoff.
///
/// Nothing here reads recordings or runs assignment; those requests go to
/// the worker or the playback thread.
pub struct App {
    cfg: ViewerConfig,
    modes: Arc<ModeSwitch>,
    handoff: Arc<Handoff<StyledFrame>>,
    styler: Arc<FrameStyler>,
    jobs: Sender<Job>,
    playback: Option<Playback>,
    state: PresentationState,
}

impl App {
    pub fn new(
        cfg: ViewerConfig,
        modes: Arc<ModeSwitch>,
        handoff: Arc<Handoff<StyledFrame>>,
        styler: Arc<FrameStyler>,
        jobs: Sender<Job>,
        playback: Option<Playback>,
        state: PresentationState,
    ) -> Self {
        Self {
            cfg,
            modes,
            handoff,
            styler,
            jobs,
            playback,
            state,
        }
    }

    pub fn state(&self) -> &PresentationState {
        &self.state
    }

    pub fn pump_network(&mut self, rx: &Receiver<Incoming>) {
        for inc in rx.try_iter().take(1_000) {
            self.on_incoming(inc);
        }
    }

    pub fn on_incoming(&mut self, inc: Incoming) {
        match inc.kind {
            IncomingKind::Frame { topology, flows } => {
                if self.modes.mode() != Mode::Live {
                    return;
                }
                self.submit(Job::Live((topology, flows)));
            }
            IncomingKind::Hello { version, host } => {
                tracing::info!(stream = %inc.stream, %version, %host, "agent hello");
            }
            IncomingKind::Connected => tracing::info!(stream = %inc.stream, "connected"),
            IncomingKind::Disconnected => tracing::info!(stream = %inc.stream, "disconnected"),
            IncomingKind::Pong => tracing::trace!(stream = %inc.stream, "pong"),
            IncomingKind::Error(err) => tracing::warn!(stream = %inc.stream, %err, "agent stream"),
        }
    }

    /// Returns false when the viewer should exit.
    pub fn on_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Live => self.enter_live(),
            Command::Playback => {
                self.enter_playback();
            }
            Command::Play => {
                if self.enter_playback() {
                    if let Some(pb) = &self.playback {
                        pb.play();
                    }
                }
            }
            Command::Pause => {
                if let Some(pb) = &self.playback {
                    pb.pause();
                }
            }
            Command::Step => {
                if self.enter_playback() {
                    if let Some(pb) = &self.playback {
                        pb.step_once();
                    }
                }
            }
            Command::Speed(speed) => {
                self.cfg.playback_speed = speed;
                if let Some(pb) = &self.playback {
                    pb.set_speed(speed);
                }
                tracing::info!(speed, "playback speed");
            }
            Command::Seek(ts) => {
                if self.enter_playback() {
                    if let Some(pb) = &self.playback {
                        let at = pb.seek(ts);
                        tracing::info!(requested = ts, at, "seek");
                    }
                }
            }
            Command::TopK(k) => {
                self.cfg.top_k = k.unwrap_or(0);
                self.styler.set_top_k(k);
                tracing::info!(top_k = ?self.styler.top_k(), "top-k filter");
                if let Some(frame) = self.state.frame() {
                    let frame = Arc::clone(frame);
                    self.submit(Job::Restyle {
                        epoch: self.modes.epoch(),
                        frame,
                    });
                }
            }
            Command::Status => {
                if let Some(pb) = &self.playback {
                    tracing::info!(
                        position = pb.position(),
                        range = ?pb.range(),
                        step_ms = pb.step_ms(),
                        running = pb.is_running(),
                        speed = pb.speed(),
                        "playback"
                    );
                }
                self.log_summary();
            }
            Command::Save => {
                match config::save_preferences(self.cfg.top_k, self.cfg.playback_speed) {
                    Ok(()) => tracing::info!("viewer preferences saved"),
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "saving viewer config")
                    }
                }
            }
            Command::Quit => return false,
        }
        true
    }

    /// Applies the pending frame, if any. Returns true when one was applied.
    pub fn present(&mut self) -> bool {
        let Some(frame) = self.handoff.take() else {
            return false;
        };
        self.state.apply(frame);
        self.log_summary();
        for view in self.state.link_views() {
            if !view.flows.is_empty() {
                tracing::debug!(
                    link = %format!("{}->{}", view.key.source, view.key.target),
                    from = ?self.state.position_of(&view.key.source),
                    to = ?self.state.position_of(&view.key.target),
                    up = view.up,
                    utilization = view.utilization,
                    flows = ?view.flows,
                    "link"
                );
            }
        }
        true
    }

    fn submit(&self, job: Job) {
        match self.jobs.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("assignment worker busy; job dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("assignment worker gone");
            }
        }
    }

    fn enter_live(&mut self) {
        if let Some(pb) = &self.playback {
            pb.pause();
        }
        self.modes.switch(Mode::Live);
    }

    fn enter_playback(&mut self) -> bool {
        let Some(pb) = &self.playback else {
            tracing::warn!("no recording loaded; playback unavailable");
            return false;
        };
        if self.modes.mode() != Mode::Playback {
            self.modes.switch(Mode::Playback);
            pb.redraw();
        }
        true
    }

    fn log_summary(&self) {
        let s = self.state.summary();
        tracing::info!(
            mode = ?self.modes.mode(),
            ts = s.timestamp,
            flow_ts = ?s.flow_timestamp,
            nodes = s.nodes,
            links = s.links,
            busy_links = s.busy_links,
            flows = s.flows,
            visible = s.visible_flows,
            top_k = ?self.state.top_k(),
            filtered = self.state.filtered(),
            unassignable = s.unassignable_flows,
            unresolved = s.unresolved_segments,
            fallback = s.fallback,
            "frame"
        );
    }
}
