//! WebSocket transport.
//!
//! One tokio task per socket. The task only moves frames: inbound data frames
//! are decoded and queued for the simulation, outbound frames are written as
//! they arrive. Any inbound frame, pongs included, counts as a heartbeat.
//! A peer that cannot take a frame within the write timeout is dropped.

use std::{future::Future, io, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message as Frame,
    },
    WebSocketStream,
};
use tracing::{debug, info, warn};
use voidfleet_shared::{error::NetError, net};

use crate::connection::{ConnectionManager, DisconnectReason, Outbound, SocketSide};

/// Pause after a failed `accept`, e.g. when out of file descriptors.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Source of incoming TCP connections.
trait Acceptor {
    fn next_peer(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn next_peer(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        self.accept()
    }
}

/// Accepts sockets forever. Failed accepts are logged and retried.
pub async fn serve(listener: TcpListener, manager: Arc<ConnectionManager>, write_timeout: Duration) -> anyhow::Result<()> {
    let local = listener.local_addr().context("listener address")?;
    info!(%local, "accepting websocket connections");
    accept_loop(listener, manager, write_timeout).await;
    Ok(())
}

async fn accept_loop<A: Acceptor>(mut acceptor: A, manager: Arc<ConnectionManager>, write_timeout: Duration) {
    loop {
        let (stream, peer) = match acceptor.next_peer().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        let _ = stream.set_nodelay(true);
        tokio::spawn(handle_socket(stream, peer, manager.clone(), write_timeout));
    }
}

/// Runs `sweep` every `interval`. Runs until aborted.
pub async fn heartbeat(manager: Arc<ConnectionManager>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so new peers get a full period.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let evicted = manager.sweep();
        debug!(evicted, connected = manager.connected_count(), "heartbeat");
    }
}

async fn handle_socket(stream: TcpStream, peer: SocketAddr, manager: Arc<ConnectionManager>, write_timeout: Duration) {
    let mut ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };

    let side = match manager.accept(peer) {
        Ok(side) => side,
        Err(e) => {
            let frame = CloseFrame {
                code: CloseCode::Again,
                reason: e.to_string().into(),
            };
            let _ = ws.close(Some(frame)).await;
            return;
        }
    };

    let id = side.id;
    let reason = pump(ws, side, write_timeout).await;
    manager.remove(id, reason);
}

async fn pump(ws: WebSocketStream<TcpStream>, mut side: SocketSide, write_timeout: Duration) -> DisconnectReason {
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let frame = match incoming {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => return lost(e.to_string()),
                    None => return DisconnectReason::Closed,
                };
                side.heartbeat.touch();
                if let Frame::Close(_) = frame {
                    return DisconnectReason::Closed;
                }
                if let Some(inbound) = net::from_frame(&frame).transpose() {
                    if side.inbound.send(inbound).is_err() {
                        return DisconnectReason::Shutdown;
                    }
                }
            }
            outgoing = side.outbound.recv() => {
                let frame = match outgoing {
                    Some(Outbound::Frame(frame)) => frame,
                    Some(Outbound::Ping) => Frame::Ping(Bytes::new()),
                    Some(Outbound::Close) | None => {
                        let _ = tokio::time::timeout(write_timeout, sink.send(Frame::Close(None))).await;
                        return DisconnectReason::Shutdown;
                    }
                };
                match tokio::time::timeout(write_timeout, sink.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return lost(e.to_string()),
                    Err(_) => return lost(format!("write stalled for {write_timeout:?}")),
                }
            }
        }
    }
}

fn lost(detail: String) -> DisconnectReason {
    DisconnectReason::Error(NetError::ConnectionLost(detail))
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::connect_async;
    use voidfleet_shared::{
        components::EntityKind,
        ecs::EntityId,
        math::{Quat, Vec3},
        protocol::{EntitySpawn, Message, Spawn},
    };

    use super::*;

    /// Fails a fixed number of times before handing out real connections.
    struct Flaky {
        failures: usize,
        listener: TcpListener,
    }

    impl Acceptor for Flaky {
        fn next_peer(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
            async move {
                if self.failures > 0 {
                    self.failures -= 1;
                    return Err(io::Error::from(io::ErrorKind::ConnectionAborted));
                }
                self.listener.accept().await
            }
        }
    }

    #[tokio::test]
    async fn accept_errors_do_not_stop_the_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (manager, _events) = ConnectionManager::new(2);
        let acceptor = Flaky { failures: 3, listener };
        let task = tokio::spawn(accept_loop(acceptor, manager.clone(), Duration::from_secs(1)));

        let (_ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.connected_count() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("connection accepted after transient failures");
        task.abort();
    }

    #[tokio::test]
    async fn stalled_peer_is_dropped_after_write_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move { connect_async(format!("ws://{addr}")).await.unwrap().0 });
        let (stream, peer) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        // Connected but never read from.
        let _stalled = client.await.unwrap();

        let (manager, _events) = ConnectionManager::new(1);
        let side = manager.accept(peer).unwrap();
        let id = side.id;
        let task = tokio::spawn(pump(ws, side, Duration::from_millis(200)));

        let pose = EntitySpawn {
            id: EntityId::new(0, 0),
            kind: EntityKind::Asteroid,
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        };
        let big = Message::Spawn(Spawn {
            entities: vec![pose; 20_000],
        });
        for _ in 0..12 {
            assert!(manager.send(id, &big));
        }

        let reason = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("socket task gave up on the stalled peer")
            .unwrap();
        assert!(matches!(reason, DisconnectReason::Error(NetError::ConnectionLost(_))));
    }
}
