//! In-process room fan-out for awareness traffic.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each peer gets an independent receiver that buffers up to `capacity`
//! envelopes; a peer that falls further behind lags and must resync.
//!
//! Every envelope reaches every subscriber, including its sender;
//! filtering on `origin` is the receiver's job.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Name of the room that carries workspace-wide presence.
pub const GLOBAL_AWARENESS_ROOM: &str = "global-awareness";

/// One relayed message.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Hub peer that published the payload.
    pub origin: Uuid,
    /// Framed relay message (see [`crate::protocol::MessageType`]).
    pub payload: Arc<Vec<u8>>,
}

/// Room configuration.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Envelopes buffered per receiver before it lags.
    pub capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}

/// Statistics for monitoring room health.
#[derive(Debug, Clone, Default)]
pub struct RoomStats {
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub active_peers: usize,
}

struct AtomicRoomStats {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

/// A broadcast room shared by every peer of one workspace.
pub struct Room {
    sender: broadcast::Sender<Envelope>,
    peers: Arc<RwLock<HashSet<Uuid>>>,
    capacity: usize,
    atomic_stats: Arc<AtomicRoomStats>,
}

impl Room {
    pub fn new(config: &RoomConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashSet::new())),
            capacity: config.capacity,
            atomic_stats: Arc::new(AtomicRoomStats {
                messages_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
            }),
        }
    }

    /// Add a peer; returns its receiver.
    pub async fn join(&self, peer_id: Uuid) -> broadcast::Receiver<Envelope> {
        self.peers.write().await.insert(peer_id);
        self.sender.subscribe()
    }

    /// Remove a peer. Returns `false` if it was not in the room.
    pub async fn leave(&self, peer_id: &Uuid) -> bool {
        self.peers.write().await.remove(peer_id)
    }

    /// Publish a payload to every subscriber.
    ///
    /// Returns the number of receivers reached. Lock-free.
    pub fn publish(&self, origin: Uuid, payload: Vec<u8>) -> usize {
        let len = payload.len() as u64;
        let count = self
            .sender
            .send(Envelope { origin, payload: Arc::new(payload) })
            .unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.atomic_stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
        count
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().await.contains(peer_id)
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.atomic_stats.bytes_sent.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Room manager: maps room names to rooms.
pub struct RoomManager {
    rooms: Arc<RwLock<HashMap<String, Arc<Room>>>>,
    config: RoomConfig,
}

impl RoomManager {
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Get or create the room with the given name.
    pub async fn get_or_create(&self, name: &str) -> Arc<Room> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(name) {
                return room.clone();
            }
        }

        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(room) = rooms.get(name) {
            return room.clone();
        }
        let room = Arc::new(Room::new(&self.config));
        rooms.insert(name.to_string(), room.clone());
        log::debug!("Created room {name}");
        room
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(name).cloned()
    }

    /// Remove a room once its last peer left.
    pub async fn remove_if_empty(&self, name: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(name) {
            if room.peer_count().await == 0 {
                rooms.remove(name);
                log::debug!("Closed empty room {name}");
                return true;
            }
        }
        false
    }

    /// Move a room to a new name; connected peers keep their receivers.
    ///
    /// Fails if `from` does not exist or `to` is taken.
    pub async fn rename(&self, from: &str, to: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(to) {
            return false;
        }
        match rooms.remove(from) {
            Some(room) => {
                rooms.insert(to.to_string(), room);
                log::info!("Renamed room {from} -> {to}");
                true
            }
            None => false,
        }
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_names(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new(RoomConfig::default())
    }
}
