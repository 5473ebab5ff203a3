use anyhow::Result;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const MIN_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub source_dir: PathBuf,
    pub record_dir: Option<PathBuf>,
    pub socket: String,
    pub interval: Duration,
}

pub fn default_socket_path() -> String {
    // Wayland-friendly: prefer XDG_RUNTIME_DIR
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        format!("{dir}/flowscope.sock")
    } else {
        "/tmp/flowscope.sock".to_string()
    }
}

pub fn parse_args() -> Result<AgentConfig> {
    parse_args_from(std::env::args_os().skip(1))
}

fn parse_args_from<I>(args: I) -> Result<AgentConfig>
where
    I: IntoIterator<Item = OsString>,
{
    let mut source_dir = None;
    let mut record_dir = None;
    let mut socket = None;
    let mut interval = DEFAULT_INTERVAL;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        if arg == "--source" {
            let Some(path) = args.next() else {
                anyhow::bail!("--source expects a directory");
            };
            source_dir = Some(PathBuf::from(path));
        } else if arg == "--record" {
            let Some(path) = args.next() else {
                anyhow::bail!("--record expects a directory");
            };
            record_dir = Some(PathBuf::from(path));
        } else if arg == "--socket" {
            let Some(path) = args.next() else {
                anyhow::bail!("--socket expects a path");
            };
            socket = Some(path.to_string_lossy().into_owned());
        } else if arg == "--interval-ms" {
            let Some(value) = args.next() else {
                anyhow::bail!("--interval-ms expects a number");
            };
            let value = value.to_string_lossy();
            let ms: u64 = value
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid interval: {value}"))?;
            if ms < MIN_INTERVAL_MS {
                anyhow::bail!("--interval-ms must be at least {MIN_INTERVAL_MS}");
            }
            interval = Duration::from_millis(ms);
        } else {
            anyhow::bail!("unknown argument: {:?}", arg);
        }
    }

    let Some(source_dir) = source_dir else {
        anyhow::bail!("--source is required");
    };

    Ok(AgentConfig {
        source_dir,
        record_dir,
        socket: socket.unwrap_or_else(default_socket_path),
        interval,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn parses_all_flags() {
        let config = parse_args_from(args(&[
            "--source",
            "/srv/topo",
            "--record",
            "/var/lib/flowscope",
            "--socket",
            "/tmp/x.sock",
            "--interval-ms",
            "250",
        ]))
        .expect("config parsed");
        assert_eq!(config.source_dir, PathBuf::from("/srv/topo"));
        assert_eq!(config.record_dir, Some(PathBuf::from("/var/lib/flowscope")));
        assert_eq!(config.socket, "/tmp/x.sock");
        assert_eq!(config.interval, Duration::from_millis(250));
    }

    #[test]
    fn defaults_interval_and_recording() {
        let config = parse_args_from(args(&["--source", "/srv/topo"])).expect("config parsed");
        assert_eq!(config.interval, DEFAULT_INTERVAL);
        assert!(config.record_dir.is_none());
        assert!(config.socket.ends_with("flowscope.sock"));
    }

    #[test]
    fn source_is_required() {
        assert!(parse_args_from(args(&["--interval-ms", "500"])).is_err());
    }

    #[test]
    fn rejects_tiny_or_bad_intervals() {
        assert!(parse_args_from(args(&["--source", "d", "--interval-ms", "5"])).is_err());
        assert!(parse_args_from(args(&["--source", "d", "--interval-ms", "soon"])).is_err());
    }

    #[test]
    fn rejects_unknown_flags() {
        assert!(parse_args_from(args(&["--source", "d", "--mode", "user"])).is_err());
    }
}
