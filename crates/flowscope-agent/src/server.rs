use anyhow::{Context, Result};
use flowscope_core::Msg;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

pub async fn run(sock_path: &str, hello: Msg, bus: broadcast::Sender<Msg>) -> Result<()> {
    let listener =
        UnixListener::bind(sock_path).with_context(|| format!("bind UDS {sock_path}"))?;
    tracing::info!(sock_path, "flowscope-agent listening");
    serve(listener, hello, bus).await
}

pub async fn serve(listener: UnixListener, hello: Msg, bus: broadcast::Sender<Msg>) -> Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let hello = hello.clone();
        let rx = bus.subscribe();
        tokio::spawn(async move {
            if let Err(err) = handle_viewer(stream, hello, rx).await {
                tracing::debug!(error = %err, "viewer connection ended with error");
            }
        });
    }
}

async fn handle_viewer(
    stream: UnixStream,
    hello: Msg,
    mut rx: broadcast::Receiver<Msg>,
) -> Result<()> {
    tracing::info!("viewer connected");
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    // Expect Hello first
    if let Some(frame) = framed.next().await {
        let msg: Msg = serde_json::from_slice(&frame?)?;
        if let Msg::Hello { version, host } = &msg {
            tracing::info!(%version, %host, "viewer hello");
        }
    }
    framed.send(Bytes::from(serde_json::to_vec(&hello)?)).await?;

    loop {
        tokio::select! {
            out = rx.recv() => match out {
                Ok(msg) => framed.send(Bytes::from(serde_json::to_vec(&msg)?)).await?,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // viewers only care about the latest frame
                    tracing::debug!(skipped, "viewer lagging; frames skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = framed.next() => match incoming {
                Some(Ok(bytes)) => {
                    if let Ok(Msg::Ping) = serde_json::from_slice::<Msg>(&bytes) {
                        framed.send(Bytes::from(serde_json::to_vec(&Msg::Pong)?)).await?;
                    }
                }
                Some(Err(err)) => return Err(err.into()),
                None => break,
            },
        }
    }

    tracing::info!("viewer disconnected");
    Ok(())
}
