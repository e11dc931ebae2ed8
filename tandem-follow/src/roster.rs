//! Roster model: the current remote records plus follow state.
//!
//! Recomputed from scratch on every presence notification. Decides whether
//! the followed peer's layout needs replaying; the replay itself happens
//! elsewhere and reports back through [`Roster::mark_attempted`] and, once
//! geometry landed, [`Roster::mark_applied`]. A snapshot is replayed at most
//! once per follow, whether or not that replay completed.

use log::{debug, trace};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tandem_collab::ClientId;

use crate::config::FollowConfig;
use crate::follow::{FollowController, FollowEvent, FollowState};
use crate::identity::Identity;
use crate::reader::read_snapshot;
use crate::record::{FreshnessToken, Locator, PresenceRecord, WorkspaceLayout};

/// A layout that should be replayed now.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReplay {
    pub peer: String,
    pub layout: WorkspaceLayout,
}

impl PendingReplay {
    pub fn token(&self) -> &FreshnessToken {
        &self.layout.freshness_token
    }
}

/// One roster row for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub identity: Identity,
    pub location: Option<String>,
    pub followed: bool,
    pub has_layout: bool,
}

/// Read model handed to the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterView {
    pub entries: Vec<RosterEntry>,
    pub follow: FollowState,
}

impl RosterView {
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.identity.name.as_str()).collect()
    }
}

#[derive(Debug, Default)]
pub struct Roster {
    records: Vec<PresenceRecord>,
    local_name: String,
    follow: FollowController,
    /// Last (peer, token) handed to the replay engine in this follow.
    attempted: Option<(String, FreshnessToken)>,
    recomputes: u64,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the record list from a full presence snapshot.
    pub fn recompute(
        &mut self,
        states: &BTreeMap<ClientId, Value>,
        local_name: &str,
        config: &FollowConfig,
    ) {
        self.records = read_snapshot(states, local_name, config);
        if self.local_name != local_name {
            self.local_name = local_name.to_string();
        }
        self.recomputes += 1;
        trace!(
            "Roster #{}: {} remote peers (local {:?})",
            self.recomputes,
            self.records.len(),
            self.local_name
        );
    }

    pub fn records(&self) -> &[PresenceRecord] {
        &self.records
    }

    pub fn record(&self, name: &str) -> Option<&PresenceRecord> {
        self.records.iter().find(|r| r.identity.name == name)
    }

    pub fn follow_state(&self) -> &FollowState {
        self.follow.state()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Number of recomputes so far.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    pub fn start_follow(&mut self, peer: &str) -> Option<FollowEvent> {
        let event = self.follow.start_follow(peer, &self.local_name);
        if event.is_some() {
            self.attempted = None;
        }
        event
    }

    pub fn stop_follow(&mut self) -> Option<FollowEvent> {
        let event = self.follow.stop_follow();
        if event.is_some() {
            self.attempted = None;
        }
        event
    }

    /// The followed peer's layout, if it has one we have neither applied nor
    /// already tried in this follow.
    ///
    /// A followed peer that is absent from the roster yields nothing; the
    /// follow stays active until the user ends it.
    pub fn pending_replay(&self) -> Option<PendingReplay> {
        let FollowState::Following { peer, last_applied } = self.follow.state() else {
            return None;
        };
        if peer == &self.local_name {
            return None;
        }
        let Some(record) = self.record(peer) else {
            debug!("Followed peer {peer} is not present");
            return None;
        };
        let layout = record.layout.as_ref()?;
        if last_applied.as_ref() == Some(&layout.freshness_token) {
            return None;
        }
        if let Some((tried_peer, tried)) = &self.attempted {
            if tried_peer == peer && tried == &layout.freshness_token {
                trace!("Layout {tried} from {peer} already replayed partially");
                return None;
            }
        }
        Some(PendingReplay { peer: peer.clone(), layout: layout.clone() })
    }

    /// Record that a replay of `token` ran, complete or not. Ignored if the
    /// follow target changed in the meantime.
    pub fn mark_attempted(&mut self, peer: &str, token: FreshnessToken) -> bool {
        if peer.is_empty() || self.follow.state().followed_name() != peer {
            return false;
        }
        self.attempted = Some((peer.to_string(), token));
        true
    }

    /// Record a completed replay. Ignored if the follow target changed in
    /// the meantime.
    pub fn mark_applied(&mut self, peer: &str, token: FreshnessToken) -> bool {
        self.follow.record_applied(peer, token)
    }

    pub fn view(&self) -> RosterView {
        let followed = self.follow.state().followed_name();
        RosterView {
            entries: self
                .records
                .iter()
                .map(|r| RosterEntry {
                    identity: r.identity.clone(),
                    location: r.location.as_ref().map(Locator::to_string),
                    followed: !followed.is_empty() && r.identity.name == followed,
                    has_layout: r.layout.is_some(),
                })
                .collect(),
            follow: self.follow.state().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(name: &str, token: Option<&str>) -> Value {
        let mut state = json!({ "user": { "name": name }, "current": "editor:x.py" });
        if let Some(token) = token {
            state["layout"] = json!({
                "freshnessToken": token,
                "currentKey": "k1",
                "openDocuments": { "k1": { "path": "x.py", "factory": "editor" } },
            });
        }
        state
    }

    fn roster_with(entries: Vec<(ClientId, Value)>) -> Roster {
        let mut roster = Roster::new();
        roster.recompute(&entries.into_iter().collect(), "alice", &FollowConfig::default());
        roster
    }

    #[test]
    fn test_recompute_replaces_records() {
        let config = FollowConfig::default();
        let mut roster = Roster::new();
        roster.recompute(&[(2, state("bob", None))].into_iter().collect(), "alice", &config);
        assert_eq!(roster.records().len(), 1);

        roster.recompute(&[(3, state("carol", None))].into_iter().collect(), "alice", &config);
        assert!(roster.record("bob").is_none());
        assert!(roster.record("carol").is_some());
        assert_eq!(roster.recomputes(), 2);
    }

    #[test]
    fn test_no_replay_when_idle() {
        let roster = roster_with(vec![(2, state("bob", Some("t1")))]);
        assert!(roster.pending_replay().is_none());
    }

    #[test]
    fn test_pending_replay_gated_by_token() {
        let mut roster = roster_with(vec![(2, state("bob", Some("t1")))]);
        roster.start_follow("bob");

        let pending = roster.pending_replay().unwrap();
        assert_eq!(pending.peer, "bob");
        assert_eq!(pending.token().as_str(), "t1");

        assert!(roster.mark_applied("bob", pending.token().clone()));
        assert!(roster.pending_replay().is_none());

        roster.recompute(
            &[(2, state("bob", Some("t2")))].into_iter().collect(),
            "alice",
            &FollowConfig::default(),
        );
        assert_eq!(roster.pending_replay().unwrap().token().as_str(), "t2");
    }

    #[test]
    fn test_attempted_snapshot_not_offered_again() {
        let mut roster = roster_with(vec![(2, state("bob", Some("t1")))]);
        roster.start_follow("bob");

        let pending = roster.pending_replay().unwrap();
        assert!(roster.mark_attempted("bob", pending.token().clone()));
        assert!(roster.pending_replay().is_none());
        assert!(roster.follow_state().last_applied().is_none());

        // A new snapshot is offered; a new follow starts over.
        roster.recompute(
            &[(2, state("bob", Some("t2")))].into_iter().collect(),
            "alice",
            &FollowConfig::default(),
        );
        assert_eq!(roster.pending_replay().unwrap().token().as_str(), "t2");
        roster.mark_attempted("bob", "t2".into());
        roster.start_follow("bob");
        assert_eq!(roster.pending_replay().unwrap().token().as_str(), "t2");

        assert!(!roster.mark_attempted("carol", "t2".into()));
    }

    #[test]
    fn test_absent_peer_keeps_follow() {
        let mut roster = roster_with(vec![(2, state("bob", Some("t1")))]);
        roster.start_follow("bob");
        roster.recompute(&BTreeMap::new(), "alice", &FollowConfig::default());

        assert!(roster.pending_replay().is_none());
        assert_eq!(roster.follow_state().followed_name(), "bob");

        // Reappearing peer is replayed again.
        roster.recompute(
            &[(5, state("bob", Some("t1")))].into_iter().collect(),
            "alice",
            &FollowConfig::default(),
        );
        assert!(roster.pending_replay().is_some());
    }

    #[test]
    fn test_peer_without_layout() {
        let mut roster = roster_with(vec![(2, state("bob", None))]);
        roster.start_follow("bob");
        assert!(roster.pending_replay().is_none());
    }

    #[test]
    fn test_cannot_follow_self() {
        let mut roster = roster_with(vec![(2, state("bob", None))]);
        assert!(roster.start_follow("alice").is_none());
        assert!(!roster.follow_state().is_following());
    }

    #[test]
    fn test_identity_rename_blocks_self_replay() {
        let mut roster = roster_with(vec![(2, state("bob", Some("t1")))]);
        roster.start_follow("bob");

        // We became "bob": the entry is now ours and never replayed.
        roster.recompute(
            &[(2, state("bob", Some("t1")))].into_iter().collect(),
            "bob",
            &FollowConfig::default(),
        );
        assert!(roster.pending_replay().is_none());
    }

    #[test]
    fn test_view_marks_followed_peer() {
        let mut roster = roster_with(vec![(2, state("bob", Some("t1"))), (3, state("carol", None))]);
        roster.start_follow("carol");

        let view = roster.view();
        assert_eq!(view.names(), ["bob", "carol"]);
        assert!(!view.entries[0].followed);
        assert!(view.entries[0].has_layout);
        assert!(view.entries[1].followed);
        assert_eq!(view.entries[1].location.as_deref(), Some("editor:x.py"));
        assert_eq!(view.follow.followed_name(), "carol");
    }
}
