mod app;
mod commands;
mod handoff;
mod layout;
mod mode;
mod net;
mod playback;
mod state;
mod styling;
mod util;
mod worker;

use anyhow::Result;
use app::App;
use flowscope_core::LinkFlowAssigner;
use handoff::Handoff;
use layout::PositionOverlay;
use mode::{Mode, ModeSwitch};
use playback::Playback;
use state::PresentationState;
use std::sync::Arc;
use styling::{FrameStyler, Publisher};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use util::config::{self, StartMode};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cfg = config::apply_args(config::load_or_default())?;

    let overlay = match &cfg.positions_file {
        Some(path) => PositionOverlay::load(path).unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "using ring layout only");
            PositionOverlay::default()
        }),
        None => PositionOverlay::default(),
    };

    let start = match cfg.start_mode {
        StartMode::Live => Mode::Live,
        StartMode::Playback => Mode::Playback,
    };
    let modes = Arc::new(ModeSwitch::new(start));
    let handoff = Arc::new(Handoff::new(Arc::clone(&modes)));
    let styler = Arc::new(FrameStyler::new(cfg.palette_size, cfg.top_k));
    let publisher = Publisher::new(Arc::clone(&styler), Arc::clone(&handoff));
    let assigner = LinkFlowAssigner::with_fallback_cap(cfg.fallback_flow_cap);

    let playback = cfg.recording_dir.as_deref().and_then(|dir| {
        Playback::open(
            dir,
            cfg.flow_window,
            publisher.clone(),
            Arc::clone(&modes),
            assigner.clone(),
            cfg.playback_speed,
        )
        .map_err(|err| {
            tracing::warn!(dir = %dir.display(), %err, "playback unavailable");
        })
        .ok()
    });

    match (modes.mode(), &playback) {
        (Mode::Playback, Some(pb)) => {
            pb.play();
        }
        (Mode::Playback, None) => {
            modes.switch(Mode::Live);
        }
        (Mode::Live, _) => {}
    }

    let (net_tx, net_rx) = crossbeam_channel::unbounded();
    net::spawn_reader(cfg.socket_path.clone(), net_tx);

    let (jobs_tx, jobs_rx) = crossbeam_channel::bounded(4);
    let _worker = worker::spawn_assigner(jobs_rx, publisher, Arc::clone(&modes), assigner);

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    commands::spawn_stdin(cmd_tx);

    let tick = crossbeam_channel::tick(Duration::from_millis(cfg.frame_interval_ms.max(10)));
    let state = PresentationState::new(overlay);
    let mut app = App::new(cfg, modes, handoff, styler, jobs_tx, playback, state);

    tracing::info!("flowscope-viewer running; commands on stdin");
    loop {
        crossbeam_channel::select! {
            recv(tick) -> _ => {
                app.pump_network(&net_rx);
                app.present();
            }
            recv(cmd_rx) -> cmd => {
                let Ok(cmd) = cmd else { break };
                if !app.on_command(cmd) {
                    break;
                }
            }
        }
    }

    tracing::info!(frames = app.state().frames_applied(), "flowscope-viewer exiting");
    Ok(())
}
