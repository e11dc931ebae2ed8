//! The presence channel seam.
//!
//! The core only needs three things from the transport: a snapshot of the
//! whole map, a way to write a field of its own entry, and change
//! notifications. [`Awareness`] provides all of them.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tandem_collab::{Awareness, AwarenessEvent, ClientId};
use tokio::sync::broadcast;

/// Shared, eventually-consistent presence map.
pub trait PresenceChannel {
    /// Snapshot of every peer's entry, keyed and ordered by client id.
    fn states(&self) -> BTreeMap<ClientId, Value>;

    /// Set one field of the local entry.
    fn set_local_field(&self, field: &str, value: Value);

    /// Change notifications.
    fn subscribe(&self) -> broadcast::Receiver<AwarenessEvent>;
}

impl PresenceChannel for Awareness {
    fn states(&self) -> BTreeMap<ClientId, Value> {
        Awareness::states(self)
    }

    fn set_local_field(&self, field: &str, value: Value) {
        Awareness::set_local_field(self, field, value);
    }

    fn subscribe(&self) -> broadcast::Receiver<AwarenessEvent> {
        Awareness::subscribe(self)
    }
}

impl<T: PresenceChannel + ?Sized> PresenceChannel for Arc<T> {
    fn states(&self) -> BTreeMap<ClientId, Value> {
        (**self).states()
    }

    fn set_local_field(&self, field: &str, value: Value) {
        (**self).set_local_field(field, value)
    }

    fn subscribe(&self) -> broadcast::Receiver<AwarenessEvent> {
        (**self).subscribe()
    }
}
