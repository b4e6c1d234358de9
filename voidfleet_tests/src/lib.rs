//! Helpers shared by the integration tests: a server running in the
//! background and a bare WebSocket peer speaking the JSON protocol.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame, MaybeTlsStream, WebSocketStream};
use voidfleet_server::{ConnectionManager, GameServer};
use voidfleet_shared::{config::ServerConfig, net, protocol::Message};

pub type Peer = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for a frame before giving up.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server ticking in a background task. Dropping it stops the server.
pub struct RunningServer {
    pub url: String,
    pub manager: Arc<ConnectionManager>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl RunningServer {
    /// Binds `cfg` on an ephemeral port and starts the tick loop.
    pub async fn start(cfg: ServerConfig) -> anyhow::Result<Self> {
        let cfg = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            ..cfg
        };
        let server = GameServer::bind(cfg).await?;
        let url = format!("ws://{}", server.local_addr());
        let manager = server.manager().clone();
        let task = tokio::spawn(server.run());
        Ok(Self { url, manager, task })
    }

    /// Waits until `connected_count` equals `n`.
    pub async fn wait_for_connections(&self, n: usize) -> anyhow::Result<()> {
        let manager = self.manager.clone();
        tokio::time::timeout(RECV_TIMEOUT, async move {
            while manager.connected_count() != n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .with_context(|| format!("waiting for {n} connections"))
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Test config: fast ticks, no asteroids.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        tick_hz: 60,
        asteroids: 0,
        ..ServerConfig::default()
    }
}

pub async fn connect(url: &str) -> anyhow::Result<Peer> {
    let (ws, _response) = connect_async(url).await.with_context(|| format!("connect {url}"))?;
    Ok(ws)
}

pub async fn send(ws: &mut Peer, msg: &Message) -> anyhow::Result<()> {
    ws.send(net::to_frame(msg)?).await.context("send")
}

pub async fn send_text(ws: &mut Peer, text: &str) -> anyhow::Result<()> {
    ws.send(Frame::text(text)).await.context("send")
}

/// Next raw frame, control frames included.
pub async fn next_frame(ws: &mut Peer) -> anyhow::Result<Option<Frame>> {
    match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
        Err(_) => anyhow::bail!("no frame within {RECV_TIMEOUT:?}"),
        Ok(None) => Ok(None),
        Ok(Some(frame)) => Ok(Some(frame.context("receive")?)),
    }
}

/// Next protocol message, skipping control frames.
pub async fn recv(ws: &mut Peer) -> anyhow::Result<Message> {
    loop {
        let frame = next_frame(ws).await?.context("connection closed")?;
        if let Frame::Close(close) = frame {
            anyhow::bail!("connection closed: {close:?}");
        }
        if let Some(msg) = net::from_frame(&frame)? {
            return Ok(msg);
        }
    }
}

/// Receives messages until one matches, returning it and everything before it.
pub async fn recv_until(
    ws: &mut Peer,
    mut pred: impl FnMut(&Message) -> bool,
) -> anyhow::Result<(Message, Vec<Message>)> {
    let mut skipped = Vec::new();
    loop {
        let msg = recv(ws).await?;
        if pred(&msg) {
            return Ok((msg, skipped));
        }
        skipped.push(msg);
    }
}
