use crate::net::Incoming;
use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use flowscope_core::{Msg, PROTOCOL_VERSION};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::UnixStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const PING_INTERVAL: Duration = Duration::from_secs(15);

/// Reads agent frames on a dedicated thread, reconnecting until the
/// receiving side goes away.
pub fn spawn_reader(sock_path: String, tx: Sender<Incoming>) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                let _ = tx.send(Incoming::error(sock_path, format!("tokio runtime: {e}")));
                return;
            }
        };
        rt.block_on(async move {
            loop {
                if let Err(e) = run(&sock_path, &tx).await {
                    let sent = tx.send(Incoming::error(sock_path.clone(), format!("{e:#}")));
                    if sent.is_err() {
                        break;
                    }
                }
                if tx.send(Incoming::disconnected(sock_path.clone())).is_err() {
                    break;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            tracing::debug!(sock_path, "reader stopped");
        });
    });
}

async fn run(sock_path: &str, tx: &Sender<Incoming>) -> Result<()> {
    let stream = UnixStream::connect(sock_path)
        .await
        .with_context(|| format!("connect UDS {sock_path}"))?;

    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    let _ = tx.send(Incoming::connected(sock_path.to_string()));

    let hello = Msg::Hello {
        version: PROTOCOL_VERSION.into(),
        host: "viewer".into(),
    };
    framed.send(Bytes::from(serde_json::to_vec(&hello)?)).await?;

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await;

    loop {
        tokio::select! {
            _ = ping.tick() => {
                framed.send(Bytes::from(serde_json::to_vec(&Msg::Ping)?)).await?;
            }
            frame = framed.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                let bytes = frame?;
                let inc = match serde_json::from_slice::<Msg>(&bytes) {
                    Ok(Msg::Hello { version, host }) => {
                        Incoming::hello(sock_path.to_string(), version, host)
                    }
                    Ok(Msg::Frame { topology, flows }) => {
                        Incoming::frame(sock_path.to_string(), topology, flows)
                    }
                    Ok(Msg::Pong) => Incoming::pong(sock_path.to_string()),
                    Ok(Msg::Ping) => continue,
                    Err(e) => Incoming::error(sock_path.to_string(), format!("decode error: {e}")),
                };
                if tx.send(inc).is_err() {
                    return Ok(());
                }
            }
        }
    }
}
