//! Client implementation.
//!
//! The client maintains:
//! - A WebSocket session to the server (JSON text frames)
//! - A mirrored world fed by `SPAWN` / `UPDATE` / `DESPAWN` / `EFFECT`
//! - Deduplicated `INPUT` sending
//! - A render pass per frame through a `RenderBackend`

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpStream, time::Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use voidfleet_shared::{
    config::ClientConfig,
    ecs::{EntityId, World},
    error::ProtocolError,
    net,
    protocol::{Hello, Message},
};

use crate::{
    input::{InputSender, InputState},
    render::RenderBackend,
    systems::{self, Inbox, LocalPlayer, ReplicaIndex},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long `connect` waits for `WELCOME`.
pub const WELCOME_TIMEOUT: Duration = Duration::from_secs(5);

/// Client connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Handshake sent, no `WELCOME` yet.
    Connecting,
    /// Controlling an entity.
    Joined,
    /// The server closed the session.
    Disconnected,
}

/// High-level game client.
pub struct GameClient {
    pub state: ClientState,
    pub world: World,
    ws: Socket,
    input: InputSender,
    started: Instant,
    last_frame: Option<Instant>,
}

impl GameClient {
    /// Connects, sends `HELLO` and waits for `WELCOME`.
    pub async fn connect(cfg: &ClientConfig, renderer: Box<dyn RenderBackend>) -> anyhow::Result<Self> {
        info!(server = %cfg.server_url, name = %cfg.player_name, "Connecting to server");
        let (ws, _response) = connect_async(cfg.server_url.as_str())
            .await
            .with_context(|| format!("connect {}", cfg.server_url))?;

        let mut client = Self {
            state: ClientState::Connecting,
            world: systems::build_world(renderer),
            ws,
            input: InputSender::default(),
            started: Instant::now(),
            last_frame: None,
        };

        client
            .send(&Message::Hello(Hello {
                name: cfg.player_name.clone(),
            }))
            .await?;

        let deadline = Instant::now() + WELCOME_TIMEOUT;
        while client.state == ClientState::Connecting {
            let remaining = deadline.saturating_duration_since(Instant::now());
            anyhow::ensure!(!remaining.is_zero(), "no WELCOME within {WELCOME_TIMEOUT:?}");
            client.pump(remaining).await?;
            anyhow::ensure!(
                client.state != ClientState::Disconnected,
                "server closed the connection before WELCOME"
            );
        }
        // Apply WELCOME (and anything queued with it) so the player is bound on return.
        client.frame();
        Ok(client)
    }

    pub async fn send(&mut self, msg: &Message) -> anyhow::Result<()> {
        let frame = net::to_frame(msg)?;
        self.ws.send(frame).await.context("send")?;
        Ok(())
    }

    /// Sends `INPUT` if the sampled state changed since the last call.
    pub async fn send_input(&mut self, state: InputState) -> anyhow::Result<bool> {
        match self.input.poll(state) {
            Some(msg) => {
                self.send(&msg).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reads frames for up to `wait`, queueing decoded messages for the next
    /// frame. Returns once the socket goes quiet. Returns the number queued.
    pub async fn pump(&mut self, wait: Duration) -> anyhow::Result<usize> {
        let mut queued = 0;
        let mut wait = wait;
        loop {
            let frame = match tokio::time::timeout(wait, self.ws.next()).await {
                Err(_) => break,
                Ok(None) => {
                    self.state = ClientState::Disconnected;
                    break;
                }
                Ok(Some(frame)) => frame.context("receive")?,
            };
            // After the first frame, only drain what is already buffered.
            wait = Duration::from_millis(1);

            if let Frame::Close(close) = &frame {
                info!(?close, "server closed the connection");
                self.state = ClientState::Disconnected;
                break;
            }
            match net::from_frame(&frame) {
                Ok(Some(msg)) => {
                    if let Message::Welcome(_) = msg {
                        self.state = ClientState::Joined;
                    }
                    self.enqueue(msg);
                    queued += 1;
                }
                Ok(None) => {}
                Err(ProtocolError::UnrecognizedMessage(kind)) => debug!(%kind, "unrecognized message dropped"),
                Err(e) => warn!(error = %e, "malformed message dropped"),
            }
        }
        Ok(queued)
    }

    fn enqueue(&mut self, msg: Message) {
        match self.world.resources.get_mut::<Inbox>() {
            Some(inbox) => inbox.messages.push_back(msg),
            None => {
                let mut inbox = Inbox::default();
                inbox.messages.push_back(msg);
                self.world.resources.insert(inbox);
            }
        }
    }

    /// Applies queued messages and renders one frame.
    pub fn frame(&mut self) {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map_or(Duration::ZERO, |last| now.duration_since(last));
        self.last_frame = Some(now);
        let t = now.duration_since(self.started).as_secs_f64();
        self.world.execute(delta.as_secs_f32(), t);
    }

    /// Seconds since `connect`.
    pub fn elapsed(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Server id of the entity this client controls.
    pub fn player(&self) -> Option<EntityId> {
        self.world.resources.get::<LocalPlayer>().and_then(|p| p.server_id)
    }

    /// Local mirror of the controlled entity, once spawned.
    pub fn player_entity(&self) -> Option<EntityId> {
        let player = self.world.resources.get::<LocalPlayer>()?;
        player.entity(self.world.resources.get::<ReplicaIndex>()?)
    }

    /// Number of mirrored entities.
    pub fn replicated_count(&self) -> usize {
        self.world.resources.get::<ReplicaIndex>().map_or(0, |index| index.local.len())
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await.context("close")?;
        Ok(())
    }
}
