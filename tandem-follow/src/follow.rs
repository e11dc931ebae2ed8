//! Follow controller: `Idle ⇄ Following(peer)`.
//!
//! Transitions happen only on explicit user action. Replay outcomes may
//! record the last applied token, nothing else.

use log::info;
use serde::Serialize;

use crate::record::FreshnessToken;

/// Who we are following and which of their snapshots we last applied.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum FollowState {
    #[default]
    Idle,
    #[serde(rename_all = "camelCase")]
    Following {
        peer: String,
        last_applied: Option<FreshnessToken>,
    },
}

impl FollowState {
    /// Followed peer name, or `""` when idle.
    pub fn followed_name(&self) -> &str {
        match self {
            FollowState::Idle => "",
            FollowState::Following { peer, .. } => peer,
        }
    }

    pub fn is_following(&self) -> bool {
        matches!(self, FollowState::Following { .. })
    }

    pub fn last_applied(&self) -> Option<&FreshnessToken> {
        match self {
            FollowState::Idle => None,
            FollowState::Following { last_applied, .. } => last_applied.as_ref(),
        }
    }
}

/// Emitted on every follow transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowEvent {
    Started { peer: String, previous: Option<String> },
    Stopped { peer: String },
}

#[derive(Debug, Default)]
pub struct FollowController {
    state: FollowState,
}

impl FollowController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FollowState {
        &self.state
    }

    /// Follow `peer`, replacing any current target. Always forgets the last
    /// applied token, even when re-following the same peer.
    ///
    /// Following nobody (`""`) or ourselves is ignored.
    pub fn start_follow(&mut self, peer: &str, local_name: &str) -> Option<FollowEvent> {
        if peer.is_empty() || peer == local_name {
            info!("Ignoring request to follow {peer:?}");
            return None;
        }
        let previous = match std::mem::take(&mut self.state) {
            FollowState::Idle => None,
            FollowState::Following { peer, .. } => Some(peer),
        };
        self.state = FollowState::Following { peer: peer.to_string(), last_applied: None };
        info!("Following {peer} (was {})", previous.as_deref().unwrap_or("idle"));
        Some(FollowEvent::Started { peer: peer.to_string(), previous })
    }

    /// Stop following. No-op when idle.
    pub fn stop_follow(&mut self) -> Option<FollowEvent> {
        match std::mem::take(&mut self.state) {
            FollowState::Idle => None,
            FollowState::Following { peer, .. } => {
                info!("Stopped following {peer}");
                Some(FollowEvent::Stopped { peer })
            }
        }
    }

    /// Record `token` as applied if we are still following `peer`.
    pub fn record_applied(&mut self, peer: &str, token: FreshnessToken) -> bool {
        match &mut self.state {
            FollowState::Following { peer: current, last_applied } if current == peer => {
                *last_applied = Some(token);
                true
            }
            _ => false,
        }
    }
}
