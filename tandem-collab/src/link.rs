//! Binds an [`Awareness`] store to a hub [`Room`].
//!
//! ```text
//!  Awareness ──(Local events)──► encode_update ──► Room::publish
//!      ▲                                              │
//!      └──── apply_entries(Remote) ◄── unframe ◄──────┘ (other origins)
//! ```
//!
//! The link also runs the awareness heartbeat: the local state is renewed
//! every half `OUTDATED_TIMEOUT` and silent peers are expired.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::awareness::{Awareness, AwarenessEvent, Origin, OUTDATED_TIMEOUT};
use crate::hub::{Envelope, Room};
use crate::protocol::{AwarenessUpdate, ClientId, ProtocolError};

/// Connection between one awareness store and one room.
pub struct AwarenessLink {
    peer_id: Uuid,
    awareness: Arc<Awareness>,
    room: Arc<Room>,
    inbound: broadcast::Receiver<Envelope>,
    local: broadcast::Receiver<AwarenessEvent>,
    outdated_timeout: Duration,
}

impl AwarenessLink {
    /// Join `room` and announce the local state to the peers already there.
    pub async fn join(awareness: Arc<Awareness>, room: Arc<Room>) -> Result<Self, ProtocolError> {
        let peer_id = Uuid::new_v4();
        let inbound = room.join(peer_id).await;
        let local = awareness.subscribe();
        let link = Self {
            peer_id,
            awareness,
            room,
            inbound,
            local,
            outdated_timeout: OUTDATED_TIMEOUT,
        };
        link.announce()?;
        log::debug!(
            "Awareness client {} joined room as {}",
            link.awareness.client_id(),
            link.peer_id
        );
        Ok(link)
    }

    /// Override the expiry window (heartbeat runs at half of it).
    pub fn with_outdated_timeout(mut self, timeout: Duration) -> Self {
        self.outdated_timeout = timeout;
        self
    }

    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    /// Publish our own entry.
    pub fn announce(&self) -> Result<usize, ProtocolError> {
        self.publish(&[self.awareness.client_id()])
    }

    fn publish(&self, clients: &[ClientId]) -> Result<usize, ProtocolError> {
        let framed = self.awareness.encode_update(clients).frame()?;
        Ok(self.room.publish(self.peer_id, framed))
    }

    fn handle_inbound(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        if envelope.origin == self.peer_id {
            return Ok(());
        }
        let update = match AwarenessUpdate::unframe(&envelope.payload) {
            Ok(update) => update,
            Err(e) => {
                log::warn!("Dropping malformed awareness message from {}: {e}", envelope.origin);
                return Ok(());
            }
        };

        let own = self.awareness.client_id();
        let changes = self.awareness.apply_entries(update.entries, Origin::Remote);
        // Newcomers only learn about us when we speak; a remote removal of our
        // entry was re-asserted locally and has to go back out.
        if !changes.added.is_empty() || changes.removed.contains(&own) {
            self.announce()?;
        }
        Ok(())
    }

    fn handle_local(&self, event: AwarenessEvent) -> Result<(), ProtocolError> {
        if event.origin != Origin::Local {
            return Ok(());
        }
        self.publish(&event.changes.touched())?;
        Ok(())
    }

    fn heartbeat(&self) {
        self.awareness.renew_local_state();
        self.awareness.remove_outdated(self.outdated_timeout);
    }

    /// Pump messages until shutdown is requested or the room closes.
    ///
    /// On shutdown the local state is withdrawn and the departure is
    /// published before leaving the room.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), ProtocolError> {
        let period = (self.outdated_timeout / 2).max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                inbound = self.inbound.recv() => match inbound {
                    Ok(envelope) => self.handle_inbound(envelope)?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Awareness link {} lagged by {n} messages", self.peer_id);
                        self.announce()?;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                local = self.local.recv() => match local {
                    Ok(event) => self.handle_local(event)?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("Awareness link {} skipped {n} local events", self.peer_id);
                        self.announce()?;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => self.heartbeat(),
            }
        }

        self.depart().await
    }

    async fn depart(self) -> Result<(), ProtocolError> {
        self.awareness.set_local_state(None);
        self.announce()?;
        self.room.leave(&self.peer_id).await;
        log::debug!("Awareness link {} left room", self.peer_id);
        Ok(())
    }

    /// Run the link on the tokio runtime.
    pub fn spawn(self) -> LinkHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let peer_id = self.peer_id;
        let task = tokio::spawn(self.run(shutdown_rx));
        LinkHandle { peer_id, shutdown: Some(shutdown_tx), task }
    }
}

/// Handle to a spawned [`AwarenessLink`].
pub struct LinkHandle {
    peer_id: Uuid,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), ProtocolError>>,
}

impl LinkHandle {
    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    /// Withdraw the local state, leave the room and wait for the task.
    pub async fn close(mut self) -> Result<(), ProtocolError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Awareness link {} task failed: {e}", self.peer_id);
                Ok(())
            }
        }
    }
}
