use anyhow::{bail, Result};
use crossbeam_channel::Sender;
use flowscope_core::Timestamp;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Live,
    Playback,
    Play,
    Pause,
    Step,
    Speed(f64),
    Seek(Timestamp),
    TopK(Option<usize>),
    Status,
    Save,
    Quit,
}

pub fn parse(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let arg = words.next();
    if words.next().is_some() {
        bail!("too many arguments to {verb}");
    }

    let cmd = match (verb, arg) {
        ("live", None) => Command::Live,
        ("playback", None) => Command::Playback,
        ("play", None) => Command::Play,
        ("pause", None) => Command::Pause,
        ("step", None) => Command::Step,
        ("status", None) => Command::Status,
        ("save", None) => Command::Save,
        ("quit" | "exit", None) => Command::Quit,
        ("speed", Some(x)) => {
            let speed: f64 = x.parse().map_err(|_| anyhow::anyhow!("invalid speed: {x}"))?;
            if !(speed.is_finite() && speed > 0.0) {
                bail!("speed must be positive");
            }
            Command::Speed(speed)
        }
        ("seek", Some(ms)) => Command::Seek(
            ms.parse()
                .map_err(|_| anyhow::anyhow!("invalid timestamp: {ms}"))?,
        ),
        ("topk", Some("off")) => Command::TopK(None),
        ("topk", Some(k)) => {
            let k: usize = k.parse().map_err(|_| anyhow::anyhow!("invalid k: {k}"))?;
            Command::TopK((k > 0).then_some(k))
        }
        (verb, _) => bail!("unknown command: {verb}"),
    };
    Ok(cmd)
}

/// Reads commands from stdin, one per line, until EOF or `quit`.
pub fn spawn_stdin(tx: Sender<Command>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse(&line) {
                Ok(cmd) => {
                    let quit = cmd == Command::Quit;
                    if tx.send(cmd).is_err() || quit {
                        return;
                    }
                }
                Err(err) => tracing::warn!(%err, "ignoring command"),
            }
        }
        let _ = tx.send(Command::Quit);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_verb() {
        assert_eq!(parse("live").ok(), Some(Command::Live));
        assert_eq!(parse("playback").ok(), Some(Command::Playback));
        assert_eq!(parse("  play ").ok(), Some(Command::Play));
        assert_eq!(parse("pause").ok(), Some(Command::Pause));
        assert_eq!(parse("step").ok(), Some(Command::Step));
        assert_eq!(parse("speed 2.5").ok(), Some(Command::Speed(2.5)));
        assert_eq!(parse("seek 1200").ok(), Some(Command::Seek(1200)));
        assert_eq!(parse("topk 5").ok(), Some(Command::TopK(Some(5))));
        assert_eq!(parse("topk 0").ok(), Some(Command::TopK(None)));
        assert_eq!(parse("topk off").ok(), Some(Command::TopK(None)));
        assert_eq!(parse("status").ok(), Some(Command::Status));
        assert_eq!(parse("save").ok(), Some(Command::Save));
        assert_eq!(parse("quit").ok(), Some(Command::Quit));
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse("").is_err());
        assert!(parse("speed").is_err());
        assert!(parse("speed -1").is_err());
        assert!(parse("seek later").is_err());
        assert!(parse("topk many").is_err());
        assert!(parse("play now").is_err());
        assert!(parse("zoom 3").is_err());
    }
}
