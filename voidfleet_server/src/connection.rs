//! Connection slots and liveness.
//!
//! The manager owns a fixed table of `max_clients` slots. Socket tasks claim a
//! slot with `accept` and release it with `remove`; the heartbeat task calls
//! `sweep`. The simulation never touches the table directly: it learns about
//! arrivals and departures through `ConnectionEvent`s, drained once per tick.

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, info, warn};
use voidfleet_shared::{
    error::{NetError, ProtocolError},
    net,
    protocol::Message,
};

/// Slot index plus a serial, so a handle to a freed slot never addresses the
/// next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    slot: usize,
    serial: u64,
}

impl ConnectionId {
    pub fn slot(self) -> usize {
        self.slot
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.slot, self.serial)
    }
}

/// Why a connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the socket.
    Closed,
    /// No traffic during a whole heartbeat interval.
    HeartbeatTimeout,
    /// Transport failure.
    Error(NetError),
    /// The server is shutting down or dropped the connection.
    Shutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => f.write_str("closed by peer"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::Error(e) => write!(f, "{e}"),
            Self::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Frames queued for a socket task.
#[derive(Debug, Clone)]
pub enum Outbound {
    Frame(Frame),
    Ping,
    /// Send a close frame and stop.
    Close,
}

/// Inbound payloads, decoded by the socket task and judged by the simulation.
pub type Inbound = Result<Message, ProtocolError>;

/// Liveness flag. Set on any inbound traffic, cleared by every sweep.
#[derive(Debug)]
pub struct Heartbeat(AtomicBool);

impl Heartbeat {
    fn new() -> Self {
        Self(AtomicBool::new(true))
    }

    pub fn touch(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns whether the peer was heard from, and clears the flag.
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// What the socket task gets back from a successful `accept`.
pub struct SocketSide {
    pub id: ConnectionId,
    pub outbound: UnboundedReceiver<Outbound>,
    pub inbound: UnboundedSender<Inbound>,
    pub heartbeat: Arc<Heartbeat>,
}

/// What the simulation gets: the id and the per-connection inbox.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub inbound: UnboundedReceiver<Inbound>,
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected {
        handle: ConnectionHandle,
        peer: SocketAddr,
    },
    Disconnected {
        id: ConnectionId,
        reason: DisconnectReason,
    },
}

struct Slot {
    id: ConnectionId,
    peer: SocketAddr,
    outbound: UnboundedSender<Outbound>,
    heartbeat: Arc<Heartbeat>,
}

struct Table {
    slots: Vec<Option<Slot>>,
    connected: usize,
    next_serial: u64,
}

/// Fixed-capacity connection table. Shared as `Arc<ConnectionManager>`.
pub struct ConnectionManager {
    table: Mutex<Table>,
    events: UnboundedSender<ConnectionEvent>,
    max_clients: usize,
}

impl ConnectionManager {
    /// Creates the manager and the event stream the simulation drains.
    pub fn new(max_clients: usize) -> (Arc<Self>, UnboundedReceiver<ConnectionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let manager = Self {
            table: Mutex::new(Table {
                slots: (0..max_clients).map(|_| None).collect(),
                connected: 0,
                next_serial: 0,
            }),
            events,
            max_clients,
        };
        (Arc::new(manager), rx)
    }

    // A panic while holding the lock cannot leave the table half-updated:
    // every mutation is a single slot swap plus the counter.
    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Claims the lowest free slot, or rejects the peer if none is left.
    pub fn accept(&self, peer: SocketAddr) -> Result<SocketSide, NetError> {
        let mut table = self.lock();
        let Some(slot) = table.slots.iter().position(Option::is_none) else {
            warn!(%peer, max_clients = self.max_clients, "connection rejected, table full");
            return Err(NetError::ConnectionRejected {
                max_clients: self.max_clients,
            });
        };

        let id = ConnectionId {
            slot,
            serial: table.next_serial,
        };
        table.next_serial += 1;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let heartbeat = Arc::new(Heartbeat::new());

        table.slots[slot] = Some(Slot {
            id,
            peer,
            outbound: out_tx,
            heartbeat: heartbeat.clone(),
        });
        table.connected += 1;
        info!(connection = %id, %peer, connected = table.connected, "client connected");

        let _ = self.events.send(ConnectionEvent::Connected {
            handle: ConnectionHandle { id, inbound: in_rx },
            peer,
        });

        Ok(SocketSide {
            id,
            outbound: out_rx,
            inbound: in_tx,
            heartbeat,
        })
    }

    /// Frees the slot held by `id`. Returns false if it was already gone, so
    /// concurrent callers agree on exactly one removal.
    pub fn remove(&self, id: ConnectionId, reason: DisconnectReason) -> bool {
        let mut table = self.lock();
        self.remove_locked(&mut table, id, reason)
    }

    fn remove_locked(&self, table: &mut Table, id: ConnectionId, reason: DisconnectReason) -> bool {
        let Some(entry) = table.slots.get_mut(id.slot) else {
            return false;
        };
        if entry.as_ref().map(|s| s.id) != Some(id) {
            return false;
        }
        let Some(slot) = entry.take() else {
            return false;
        };
        table.connected -= 1;

        // The socket task may be gone already; nothing to close then.
        let _ = slot.outbound.send(Outbound::Close);
        info!(connection = %id, peer = %slot.peer, %reason, connected = table.connected, "client disconnected");
        let _ = self.events.send(ConnectionEvent::Disconnected { id, reason });
        true
    }

    /// Evicts every connection that stayed silent since the previous sweep and
    /// pings the rest. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let mut table = self.lock();
        let mut silent = Vec::new();
        for slot in table.slots.iter().flatten() {
            if slot.heartbeat.take() {
                let _ = slot.outbound.send(Outbound::Ping);
            } else {
                silent.push(slot.id);
            }
        }
        let evicted = silent
            .into_iter()
            .filter(|id| self.remove_locked(&mut table, *id, DisconnectReason::HeartbeatTimeout))
            .count();
        if evicted > 0 {
            debug!(evicted, "heartbeat sweep");
        }
        evicted
    }

    /// Visits every live connection in slot order.
    pub fn for_each(&self, mut f: impl FnMut(ConnectionId, SocketAddr)) {
        let table = self.lock();
        for slot in table.slots.iter().flatten() {
            f(slot.id, slot.peer);
        }
    }

    pub fn connected_count(&self) -> usize {
        self.lock().connected
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.lock()
            .slots
            .get(id.slot)
            .and_then(Option::as_ref)
            .is_some_and(|slot| slot.id == id)
    }

    /// Queues a message for one connection. Returns false if it is gone.
    pub fn send(&self, id: ConnectionId, msg: &Message) -> bool {
        let Some(frame) = encode(msg) else {
            return false;
        };
        let table = self.lock();
        match table.slots.get(id.slot).and_then(Option::as_ref) {
            Some(slot) if slot.id == id => slot.outbound.send(Outbound::Frame(frame)).is_ok(),
            _ => false,
        }
    }

    /// Queues a message for every connection. Returns how many accepted it.
    pub fn broadcast(&self, msg: &Message) -> usize {
        let Some(frame) = encode(msg) else {
            return 0;
        };
        let table = self.lock();
        table
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.outbound.send(Outbound::Frame(frame.clone())).is_ok())
            .count()
    }

    /// Queues one message for several connections, encoding it once.
    pub fn multicast(&self, ids: &[ConnectionId], msg: &Message) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let Some(frame) = encode(msg) else {
            return 0;
        };
        let table = self.lock();
        ids.iter()
            .filter_map(|id| table.slots.get(id.slot)?.as_ref().filter(|slot| slot.id == *id))
            .filter(|slot| slot.outbound.send(Outbound::Frame(frame.clone())).is_ok())
            .count()
    }

    /// Closes every connection.
    pub fn close_all(&self) {
        let mut table = self.lock();
        let ids: Vec<_> = table.slots.iter().flatten().map(|slot| slot.id).collect();
        for id in ids {
            self.remove_locked(&mut table, id, DisconnectReason::Shutdown);
        }
    }
}

fn encode(msg: &Message) -> Option<Frame> {
    match net::to_frame(msg) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(kind = msg.kind(), error = %e, "failed to encode message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voidfleet_shared::protocol::Hello;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn occupied(manager: &ConnectionManager) -> usize {
        let mut n = 0;
        manager.for_each(|_, _| n += 1);
        n
    }

    #[test]
    fn full_table_rejects_immediately() {
        let (manager, _events) = ConnectionManager::new(2);
        let _a = manager.accept(peer(1)).unwrap();
        let _b = manager.accept(peer(2)).unwrap();
        let err = manager.accept(peer(3)).err();
        assert_eq!(err, Some(NetError::ConnectionRejected { max_clients: 2 }));
        assert_eq!(manager.connected_count(), 2);
    }

    #[test]
    fn count_matches_occupied_slots_and_slots_are_distinct() {
        let (manager, _events) = ConnectionManager::new(4);
        let sides: Vec<_> = (0..4).map(|i| manager.accept(peer(i)).unwrap()).collect();
        let mut slots: Vec<_> = sides.iter().map(|s| s.id.slot()).collect();
        slots.dedup();
        assert_eq!(slots, vec![0, 1, 2, 3]);

        assert!(manager.remove(sides[1].id, DisconnectReason::Closed));
        assert_eq!(manager.connected_count(), 3);
        assert_eq!(occupied(&manager), 3);

        let reused = manager.accept(peer(9)).unwrap();
        assert_eq!(reused.id.slot(), 1);
        assert_ne!(reused.id, sides[1].id);
        assert_eq!(manager.connected_count(), occupied(&manager));
    }

    #[test]
    fn remove_is_idempotent_and_emits_one_event() {
        let (manager, mut events) = ConnectionManager::new(1);
        let side = manager.accept(peer(1)).unwrap();
        assert!(matches!(events.try_recv(), Ok(ConnectionEvent::Connected { .. })));

        assert!(manager.remove(side.id, DisconnectReason::Closed));
        assert!(!manager.remove(side.id, DisconnectReason::Closed));
        assert!(!manager.remove(side.id, DisconnectReason::HeartbeatTimeout));

        assert!(matches!(
            events.try_recv(),
            Ok(ConnectionEvent::Disconnected { reason: DisconnectReason::Closed, .. })
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(manager.connected_count(), 0);
    }

    #[test]
    fn stale_id_does_not_remove_new_occupant() {
        let (manager, _events) = ConnectionManager::new(1);
        let old = manager.accept(peer(1)).unwrap();
        manager.remove(old.id, DisconnectReason::Closed);
        let new = manager.accept(peer(2)).unwrap();

        assert!(!manager.remove(old.id, DisconnectReason::Closed));
        assert!(manager.is_connected(new.id));
        assert!(!manager.send(old.id, &Message::Hello(Hello { name: "x".into() })));
    }

    #[test]
    fn silent_connection_is_evicted_exactly_once_and_slot_reused() {
        let (manager, mut events) = ConnectionManager::new(1);
        let mut side = manager.accept(peer(1)).unwrap();
        let _ = events.try_recv();

        // Fresh connections count as alive for the first sweep.
        assert_eq!(manager.sweep(), 0);
        assert!(matches!(side.outbound.try_recv(), Ok(Outbound::Ping)));

        assert_eq!(manager.sweep(), 1);
        assert_eq!(manager.sweep(), 0);
        assert!(matches!(side.outbound.try_recv(), Ok(Outbound::Close)));

        let mut disconnects = 0;
        while let Ok(ev) = events.try_recv() {
            if let ConnectionEvent::Disconnected { reason, .. } = ev {
                assert_eq!(reason, DisconnectReason::HeartbeatTimeout);
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
        assert_eq!(manager.connected_count(), 0);
        assert!(manager.accept(peer(2)).is_ok());
    }

    #[test]
    fn traffic_keeps_connection_alive() {
        let (manager, _events) = ConnectionManager::new(1);
        let side = manager.accept(peer(1)).unwrap();
        for _ in 0..5 {
            side.heartbeat.touch();
            assert_eq!(manager.sweep(), 0);
        }
        assert!(manager.is_connected(side.id));
    }

    #[test]
    fn broadcast_reaches_every_connection() {
        let (manager, _events) = ConnectionManager::new(3);
        let mut a = manager.accept(peer(1)).unwrap();
        let mut b = manager.accept(peer(2)).unwrap();
        let sent = manager.broadcast(&Message::Hello(Hello { name: "x".into() }));
        assert_eq!(sent, 2);
        assert!(matches!(a.outbound.try_recv(), Ok(Outbound::Frame(f)) if f.is_text()));
        assert!(matches!(b.outbound.try_recv(), Ok(Outbound::Frame(_))));
    }
}
