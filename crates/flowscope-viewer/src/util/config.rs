use anyhow::Context;
use directories::ProjectDirs;
use flowscope_core::identity::DEFAULT_PALETTE_SIZE;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartMode {
    Live,
    Playback,
}

impl Default for StartMode {
    fn default() -> Self {
        Self::Live
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub socket_path: String,
    pub start_mode: StartMode,
    pub palette_size: u32,
    /// 0 shows every flow.
    pub top_k: usize,
    pub playback_speed: f64,
    pub flow_window: usize,
    pub frame_interval_ms: u64,
    pub fallback_flow_cap: usize,
    pub positions_file: Option<PathBuf>,
    pub recording_dir: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_uds_path(),
            start_mode: StartMode::Live,
            palette_size: DEFAULT_PALETTE_SIZE,
            top_k: 0,
            playback_speed: 1.0,
            flow_window: 1,
            frame_interval_ms: 100,
            fallback_flow_cap: flowscope_core::FALLBACK_FLOW_CAP,
            positions_file: None,
            recording_dir: None,
        }
    }
}

fn default_uds_path() -> String {
    static CACHED: OnceLock<String> = OnceLock::new();
    CACHED
        .get_or_init(|| {
            if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
                format!("{dir}/flowscope.sock")
            } else {
                "/tmp/flowscope.sock".to_string()
            }
        })
        .clone()
}

fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "flowscope")?;
    Some(proj.config_dir().join("viewer.toml"))
}

pub fn load_or_default() -> ViewerConfig {
    let Some(path) = config_file_path() else {
        return ViewerConfig::default();
    };
    load_or_default_from_path(&path)
}

fn load_or_default_from_path(path: &Path) -> ViewerConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return ViewerConfig::default();
    };
    match toml::from_str(&contents) {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::warn!(path = %path.display(), %err, "ignoring malformed viewer config");
            ViewerConfig::default()
        }
    }
}

/// Persists the interactive preferences (top-K and playback speed) into the
/// stored config. Everything else in the file, and any command line
/// overrides of this run, are left as they were.
pub fn save_preferences(top_k: usize, playback_speed: f64) -> anyhow::Result<()> {
    let Some(path) = config_file_path() else {
        return Err(anyhow::anyhow!("no config directory available"));
    };
    save_preferences_to_path(&path, top_k, playback_speed)
}

fn save_preferences_to_path(
    path: &Path,
    top_k: usize,
    playback_speed: f64,
) -> anyhow::Result<()> {
    let mut stored = load_or_default_from_path(path);
    stored.top_k = top_k;
    stored.playback_speed = playback_speed;
    save_to_path(&stored, path)
}

fn save_to_path(cfg: &ViewerConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize viewer config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write viewer config {}", path.display()))?;
    Ok(())
}

/// Applies command line overrides on top of the stored config.
pub fn apply_args(cfg: ViewerConfig) -> anyhow::Result<ViewerConfig> {
    apply_args_from(cfg, std::env::args_os().skip(1))
}

fn apply_args_from<I>(mut cfg: ViewerConfig, args: I) -> anyhow::Result<ViewerConfig>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--socket" {
            let Some(path) = args.next() else {
                anyhow::bail!("--socket expects a path");
            };
            cfg.socket_path = path.to_string_lossy().into_owned();
        } else if arg == "--playback" {
            let Some(dir) = args.next() else {
                anyhow::bail!("--playback expects a recording directory");
            };
            cfg.recording_dir = Some(PathBuf::from(dir));
            cfg.start_mode = StartMode::Playback;
        } else if arg == "--topk" {
            let Some(value) = args.next() else {
                anyhow::bail!("--topk expects a number");
            };
            let value = value.to_string_lossy();
            cfg.top_k = value
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid top-k: {value}"))?;
        } else if arg == "--speed" {
            let Some(value) = args.next() else {
                anyhow::bail!("--speed expects a multiplier");
            };
            let value = value.to_string_lossy();
            let speed: f64 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid speed: {value}"))?;
            if !(speed.is_finite() && speed > 0.0) {
                anyhow::bail!("--speed must be positive");
            }
            cfg.playback_speed = speed;
        } else {
            anyhow::bail!("unknown argument: {:?}", arg);
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn viewer_config_roundtrip_save_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        let cfg = ViewerConfig {
            top_k: 5,
            positions_file: Some(PathBuf::from("/srv/positions.json")),
            ..ViewerConfig::default()
        };

        save_to_path(&cfg, &path).expect("save config");
        let loaded = load_or_default_from_path(&path);

        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        fs::write(&path, "top_k = 3\nstart_mode = \"playback\"\n").expect("write");

        let loaded = load_or_default_from_path(&path);

        assert_eq!(loaded.top_k, 3);
        assert_eq!(loaded.start_mode, StartMode::Playback);
        assert_eq!(loaded.palette_size, DEFAULT_PALETTE_SIZE);
    }

    #[test]
    fn malformed_config_falls_back_to_default() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        fs::write(&path, "top_k = \"many\"").expect("write");

        assert_eq!(load_or_default_from_path(&path), ViewerConfig::default());
    }

    #[test]
    fn args_override_config() {
        let cfg = apply_args_from(
            ViewerConfig::default(),
            args(&[
                "--socket",
                "/tmp/a.sock",
                "--playback",
                "/rec",
                "--topk",
                "4",
                "--speed",
                "2.5",
            ]),
        )
        .expect("args parsed");

        assert_eq!(cfg.socket_path, "/tmp/a.sock");
        assert_eq!(cfg.recording_dir, Some(PathBuf::from("/rec")));
        assert_eq!(cfg.start_mode, StartMode::Playback);
        assert_eq!(cfg.top_k, 4);
        assert_eq!(cfg.playback_speed, 2.5);
    }

    #[test]
    fn saving_preferences_keeps_run_overrides_out_of_the_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        let stored = ViewerConfig {
            positions_file: Some(PathBuf::from("/srv/positions.json")),
            ..ViewerConfig::default()
        };
        save_to_path(&stored, &path).expect("save config");

        let running = apply_args_from(
            load_or_default_from_path(&path),
            args(&["--playback", "/rec", "--socket", "/tmp/b.sock"]),
        )
        .expect("args parsed");
        save_preferences_to_path(&path, 7, running.playback_speed * 2.0).expect("save prefs");

        let loaded = load_or_default_from_path(&path);
        assert_eq!(loaded.top_k, 7);
        assert_eq!(loaded.playback_speed, 2.0);
        assert_eq!(loaded.start_mode, StartMode::Live);
        assert_eq!(loaded.recording_dir, None);
        assert_eq!(loaded.socket_path, stored.socket_path);
        assert_eq!(loaded.positions_file, stored.positions_file);
    }

    #[test]
    fn args_reject_bad_values() {
        assert!(apply_args_from(ViewerConfig::default(), args(&["--speed", "0"])).is_err());
        assert!(apply_args_from(ViewerConfig::default(), args(&["--topk", "x"])).is_err());
        assert!(apply_args_from(ViewerConfig::default(), args(&["--zoom"])).is_err());
    }
}
