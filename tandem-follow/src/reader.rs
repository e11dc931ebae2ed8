//! Presence snapshot reader.
//!
//! Turns the raw `client id → JSON` map into [`PresenceRecord`]s for every
//! remote collaborator. Malformed entries degrade instead of failing: an
//! entry without a usable identity is skipped, a bad location or layout is
//! dropped from an otherwise valid record.

use log::{debug, trace};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use tandem_collab::ClientId;

use crate::config::FollowConfig;
use crate::identity::Identity;
use crate::record::{Locator, PresenceRecord, WorkspaceLayout, LAYOUT_VERSION};

/// Read every remote record from a presence snapshot.
///
/// Entries whose identity name equals `local_name` are excluded. When two
/// entries claim the same name (the same user in two windows), the one with
/// the lowest client id wins.
pub fn read_snapshot(
    states: &BTreeMap<ClientId, Value>,
    local_name: &str,
    config: &FollowConfig,
) -> Vec<PresenceRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(states.len());

    for (client_id, state) in states {
        let Some(record) = parse_record(*client_id, state, config) else {
            continue;
        };
        if record.identity.name == local_name {
            continue;
        }
        if !seen.insert(record.identity.name.clone()) {
            trace!("Presence {client_id}: duplicate name {:?}, ignored", record.identity.name);
            continue;
        }
        records.push(record);
    }
    records
}

/// Parse a single presence entry. `None` when it has no usable identity.
pub fn parse_record(client_id: ClientId, state: &Value, config: &FollowConfig) -> Option<PresenceRecord> {
    let identity = match state.get(&config.identity_field) {
        Some(raw) => match lenient_identity(raw) {
            Some(identity) => identity,
            None => {
                debug!("Presence {client_id}: unrecognised identity, skipped");
                return None;
            }
        },
        None => {
            trace!("Presence {client_id}: no identity yet, skipped");
            return None;
        }
    };

    let location = state
        .get(&config.location_field)
        .and_then(Value::as_str)
        .and_then(Locator::parse);

    let layout = state
        .get(&config.layout_field)
        .filter(|raw| !raw.is_null())
        .and_then(|raw| parse_layout(client_id, raw));

    Some(PresenceRecord { client_id, identity, location, layout })
}

fn parse_layout(client_id: ClientId, raw: &Value) -> Option<WorkspaceLayout> {
    let layout: WorkspaceLayout = match serde_json::from_value(raw.clone()) {
        Ok(layout) => layout,
        Err(e) => {
            debug!("Presence {client_id}: malformed layout ignored: {e}");
            return None;
        }
    };
    if layout.freshness_token.as_str().is_empty() {
        debug!("Presence {client_id}: layout without freshness token ignored");
        return None;
    }
    if layout.version > LAYOUT_VERSION {
        debug!(
            "Presence {client_id}: layout version {} newer than {LAYOUT_VERSION}, ignored",
            layout.version
        );
        return None;
    }
    Some(layout)
}

/// Accept an identity object with a non-empty string `name`.
fn lenient_identity(raw: &Value) -> Option<Identity> {
    let identity: Identity = serde_json::from_value(raw.clone()).ok()?;
    (!identity.name.is_empty()).then_some(identity)
}
