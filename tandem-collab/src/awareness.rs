//! Awareness store: the shared presence map.
//!
//! Every peer owns exactly one entry (its `client_id`) and reads all the
//! others. Entries carry a per-client clock; an incoming entry only wins if
//! its clock is newer, so out-of-order or duplicated deliveries are harmless.
//!
//! ## Data flow
//!
//! ```text
//! set_local_field("layout", …)          relay / hub
//!       │                                    │
//!       ▼                                    ▼
//! Awareness (states + clocks) ◄──── apply_update(bytes, Remote)
//!       │
//!       ▼   broadcast::Sender<AwarenessEvent>
//! subscribers (roster, link)
//! ```
//!
//! An event is emitted for every accepted update. Consumers interested in
//! real changes only check [`AwarenessChanges::is_change`].

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::protocol::{AwarenessEntry, AwarenessUpdate, ClientId, ProtocolError};

/// Remote entries not refreshed within this window are dropped.
pub const OUTDATED_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffered events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Where an awareness mutation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// This peer changed its own entry.
    Local,
    /// An update received from another peer.
    Remote,
    /// Entries expired by [`Awareness::remove_outdated`].
    Timeout,
}

/// Client ids touched by one accepted update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwarenessChanges {
    pub added: Vec<ClientId>,
    /// Every accepted non-removal update of a known client.
    pub updated: Vec<ClientId>,
    /// Subset of `updated` whose state actually differs.
    pub filtered_updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
}

impl AwarenessChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }

    /// True when an entry was added, removed, or its content changed.
    pub fn is_change(&self) -> bool {
        !self.added.is_empty() || !self.filtered_updated.is_empty() || !self.removed.is_empty()
    }

    /// All client ids that must be re-sent to propagate this update.
    pub fn touched(&self) -> Vec<ClientId> {
        self.added
            .iter()
            .chain(&self.updated)
            .chain(&self.removed)
            .copied()
            .collect()
    }
}

/// Notification fired on every accepted awareness update.
#[derive(Debug, Clone)]
pub struct AwarenessEvent {
    pub changes: AwarenessChanges,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy)]
struct ClientMeta {
    clock: u64,
    last_updated: Instant,
}

#[derive(Default)]
struct Inner {
    states: HashMap<ClientId, Value>,
    meta: HashMap<ClientId, ClientMeta>,
}

/// Thread-safe awareness state for one peer.
pub struct Awareness {
    client_id: ClientId,
    inner: RwLock<Inner>,
    events: broadcast::Sender<AwarenessEvent>,
}

impl Awareness {
    /// Create a store with a random client id.
    ///
    /// Ids are kept below 2^53 so browser peers can hold them as numbers.
    pub fn new() -> Self {
        let id = (Uuid::new_v4().as_u128() & ((1u128 << 53) - 1)) as ClientId;
        Self::with_client_id(id)
    }

    /// Create with an explicit client id (for testing).
    pub fn with_client_id(client_id: ClientId) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client_id,
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// Subscribe to awareness events.
    pub fn subscribe(&self) -> broadcast::Receiver<AwarenessEvent> {
        self.events.subscribe()
    }

    /// This peer's own state, if any.
    pub fn local_state(&self) -> Option<Value> {
        self.read().states.get(&self.client_id).cloned()
    }

    /// Replace the local state. `None` announces that this peer went away.
    pub fn set_local_state(&self, state: Option<Value>) -> AwarenessChanges {
        self.update_local(|_| Some(state)).unwrap_or_default()
    }

    /// Set one field of the local state object, keeping the others.
    pub fn set_local_field(&self, field: &str, value: Value) -> AwarenessChanges {
        self.update_local(|prev| {
            let mut state = match prev {
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            state.insert(field.to_string(), value);
            Some(Some(Value::Object(state)))
        })
        .unwrap_or_default()
    }

    /// Re-announce the local state with a bumped clock (heartbeat).
    pub fn renew_local_state(&self) -> Option<AwarenessChanges> {
        self.update_local(|prev| prev.cloned().map(Some))
    }

    /// Read-modify-write of the local entry under one write lock, so
    /// concurrent writers never overwrite each other with a stale copy.
    /// `f` returns `None` to leave the entry (and its clock) untouched.
    fn update_local(
        &self,
        f: impl FnOnce(Option<&Value>) -> Option<Option<Value>>,
    ) -> Option<AwarenessChanges> {
        let id = self.client_id;
        let changes = {
            let mut inner = self.write();
            let prev = inner.states.get(&id).cloned();
            let state = f(prev.as_ref())?;
            let clock = inner.meta.get(&id).map_or(0, |m| m.clock + 1);

            match &state {
                Some(value) => {
                    inner.states.insert(id, value.clone());
                }
                None => {
                    inner.states.remove(&id);
                }
            }
            inner.meta.insert(id, ClientMeta { clock, last_updated: Instant::now() });

            let mut changes = AwarenessChanges::default();
            match (prev, state) {
                (None, Some(_)) => changes.added.push(id),
                (Some(_), None) => changes.removed.push(id),
                (Some(prev), Some(next)) => {
                    if prev != next {
                        changes.filtered_updated.push(id);
                    }
                    changes.updated.push(id);
                }
                (None, None) => {}
            }
            changes
        };

        self.emit(&changes, Origin::Local);
        Some(changes)
    }

    /// Snapshot of every known state, ordered by client id.
    pub fn states(&self) -> BTreeMap<ClientId, Value> {
        self.read()
            .states
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect()
    }

    pub fn state(&self, client_id: ClientId) -> Option<Value> {
        self.read().states.get(&client_id).cloned()
    }

    /// Last accepted clock for a client.
    pub fn clock(&self, client_id: ClientId) -> Option<u64> {
        self.read().meta.get(&client_id).map(|m| m.clock)
    }

    /// Number of clients with a live state (including this one).
    pub fn client_count(&self) -> usize {
        self.read().states.len()
    }

    /// Encode the current entries of `clients` for the wire.
    pub fn encode_update(&self, clients: &[ClientId]) -> AwarenessUpdate {
        let inner = self.read();
        let entries = clients
            .iter()
            .map(|id| AwarenessEntry {
                client_id: *id,
                clock: inner.meta.get(id).map_or(0, |m| m.clock),
                state: inner.states.get(id).cloned(),
            })
            .collect();
        AwarenessUpdate::new(entries)
    }

    /// Encode every client this peer knows about.
    pub fn encode_all(&self) -> AwarenessUpdate {
        let clients: Vec<ClientId> = self.read().meta.keys().copied().collect();
        self.encode_update(&clients)
    }

    /// Decode and merge an encoded update.
    pub fn apply_update(&self, bytes: &[u8], origin: Origin) -> Result<AwarenessChanges, ProtocolError> {
        let update = AwarenessUpdate::decode(bytes)?;
        Ok(self.apply_entries(update.entries, origin))
    }

    /// Merge already-decoded entries.
    ///
    /// An entry is accepted iff the client is unknown, its clock is newer
    /// than the recorded one, or equal and it removes a state we still hold. A remote attempt to remove
    /// our own live state is answered by bumping our clock instead.
    pub fn apply_entries(&self, entries: Vec<AwarenessEntry>, origin: Origin) -> AwarenessChanges {
        let now = Instant::now();
        let mut changes = AwarenessChanges::default();
        {
            let mut inner = self.write();
            for AwarenessEntry { client_id, mut clock, state } in entries {
                let known = inner.meta.get(&client_id).copied();
                let current_clock = known.map_or(0, |m| m.clock);
                let present = inner.states.contains_key(&client_id);

                let accept = known.is_none()
                    || current_clock < clock
                    || (current_clock == clock && state.is_none() && present);
                if !accept {
                    continue;
                }

                let prev = inner.states.get(&client_id).cloned();
                match &state {
                    None if client_id == self.client_id && present => {
                        clock = current_clock.max(clock) + 1;
                    }
                    None => {
                        inner.states.remove(&client_id);
                    }
                    Some(value) => {
                        inner.states.insert(client_id, value.clone());
                    }
                }
                inner.meta.insert(client_id, ClientMeta { clock, last_updated: now });

                match (known, state) {
                    (None, Some(_)) => changes.added.push(client_id),
                    (Some(_), None) => changes.removed.push(client_id),
                    (_, Some(next)) => {
                        if prev.as_ref() != Some(&next) {
                            changes.filtered_updated.push(client_id);
                        }
                        changes.updated.push(client_id);
                    }
                    (None, None) => {}
                }
            }
        }

        if !changes.is_empty() {
            log::trace!(
                "Awareness {}: +{} ~{} -{} ({origin:?})",
                self.client_id,
                changes.added.len(),
                changes.filtered_updated.len(),
                changes.removed.len()
            );
        }
        self.emit(&changes, origin);
        changes
    }

    /// Drop entries of clients that disconnected.
    pub fn remove_states(&self, clients: &[ClientId], origin: Origin) -> AwarenessChanges {
        let now = Instant::now();
        let mut changes = AwarenessChanges::default();
        {
            let mut inner = self.write();
            for id in clients {
                if inner.states.remove(id).is_none() {
                    continue;
                }
                if *id == self.client_id {
                    let clock = inner.meta.get(id).map_or(0, |m| m.clock + 1);
                    inner.meta.insert(*id, ClientMeta { clock, last_updated: now });
                }
                changes.removed.push(*id);
            }
        }
        self.emit(&changes, origin);
        changes
    }

    /// Expire remote entries that have not been refreshed within `timeout`.
    pub fn remove_outdated(&self, timeout: Duration) -> Vec<ClientId> {
        let stale: Vec<ClientId> = {
            let inner = self.read();
            inner
                .meta
                .iter()
                .filter(|(id, meta)| {
                    **id != self.client_id
                        && inner.states.contains_key(*id)
                        && meta.last_updated.elapsed() >= timeout
                })
                .map(|(id, _)| *id)
                .collect()
        };

        if stale.is_empty() {
            return stale;
        }
        log::debug!("Awareness {}: expiring {} idle peers", self.client_id, stale.len());
        self.remove_states(&stale, Origin::Timeout).removed
    }

    fn emit(&self, changes: &AwarenessChanges, origin: Origin) {
        if changes.is_empty() {
            return;
        }
        // No subscribers is fine.
        let _ = self.events.send(AwarenessEvent { changes: changes.clone(), origin });
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Awareness {
    fn default() -> Self {
        Self::new()
    }
}

// ===================================================================
// Tests
// ===================================================================
