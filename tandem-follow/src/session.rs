//! Follow session: wires the roster, follow controller, publisher and
//! replay engine to a presence channel and a workbench.
//!
//! Reactions are handled one at a time: a replay is awaited to the end
//! before the next notification or command is looked at. Notifications that
//! arrive meanwhile queue up in the channel; since the roster is rebuilt
//! from scratch, they collapse into the next recompute.
//!
//! The session is not `Send` when the workbench futures are not. Hosts
//! await [`FollowSession::run`] on their own task, usually joined with
//! whatever feeds it commands.

use log::{debug, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};

use crate::channel::PresenceChannel;
use crate::config::FollowConfig;
use crate::error::FollowError;
use crate::follow::{FollowEvent, FollowState};
use crate::identity::{Identity, IdentityHandle};
use crate::publisher::{LayoutPublisher, WorkspaceShape};
use crate::record::WorkspaceLayout;
use crate::replay::{ReplayEngine, ReplayOutcome, ReplayStats, Workbench};
use crate::roster::{Roster, RosterView};

/// Host requests handled by [`FollowSession::run`].
#[derive(Debug, Clone)]
pub enum SessionCommand {
    Follow(String),
    Unfollow,
    /// The local workspace changed; publish its shape.
    Publish(WorkspaceShape),
    Shutdown,
}

pub struct FollowSession<C, W> {
    channel: C,
    workbench: W,
    identity: IdentityHandle,
    config: FollowConfig,
    roster: Roster,
    engine: ReplayEngine,
    publisher: LayoutPublisher,
    view_tx: watch::Sender<RosterView>,
}

impl<C: PresenceChannel, W: Workbench> FollowSession<C, W> {
    pub fn new(channel: C, workbench: W, identity: IdentityHandle, config: FollowConfig) -> Self {
        let publisher = LayoutPublisher::new(&config);
        let (view_tx, _) = watch::channel(RosterView::default());
        Self {
            channel,
            workbench,
            identity,
            config,
            roster: Roster::new(),
            engine: ReplayEngine::new(),
            publisher,
            view_tx,
        }
    }

    /// Current roster read model.
    pub fn roster(&self) -> RosterView {
        self.roster.view()
    }

    /// Roster updates, one per recompute or follow transition.
    pub fn watch_roster(&self) -> watch::Receiver<RosterView> {
        self.view_tx.subscribe()
    }

    pub fn follow_state(&self) -> &FollowState {
        self.roster.follow_state()
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.engine.stats()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn workbench(&self) -> &W {
        &self.workbench
    }

    pub fn workbench_mut(&mut self) -> &mut W {
        &mut self.workbench
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    /// React to one presence change: recompute the roster and, if the
    /// followed peer has an unapplied layout, replay it.
    pub async fn handle_change(&mut self) -> Option<ReplayOutcome> {
        let local_name = self.identity.name();
        self.roster.recompute(&self.channel.states(), &local_name, &self.config);
        let outcome = self.replay_pending().await;
        self.notify_view();
        outcome
    }

    /// Follow `peer`. With `replay_on_follow`, the peer's current layout is
    /// replayed right away.
    pub async fn start_follow(&mut self, peer: &str) -> Option<ReplayOutcome> {
        // Pick up an identity that became ready since the last recompute.
        let local_name = self.identity.name();
        if local_name != self.roster.local_name() {
            self.roster.recompute(&self.channel.states(), &local_name, &self.config);
        }

        let event = self.roster.start_follow(peer);
        self.notify_view();
        match event {
            Some(FollowEvent::Started { .. }) if self.config.replay_on_follow => {
                self.handle_change().await
            }
            _ => None,
        }
    }

    /// Stop following. Returns whether we were following anyone.
    pub fn stop_follow(&mut self) -> bool {
        let stopped = self.roster.stop_follow().is_some();
        if stopped {
            self.notify_view();
        }
        stopped
    }

    /// Publish the local workspace shape now.
    pub fn publish_layout(&mut self, shape: &WorkspaceShape) -> Result<WorkspaceLayout, FollowError> {
        self.publisher.publish(&self.channel, shape)
    }

    /// Write the local identity into presence, if it is ready.
    pub fn publish_identity(&self) -> Result<Option<Identity>, FollowError> {
        let Some(identity) = self.identity.now() else {
            return Ok(None);
        };
        let value =
            serde_json::to_value(&identity).map_err(|e| FollowError::Serialize(e.to_string()))?;
        self.channel.set_local_field(&self.config.identity_field, value);
        Ok(Some(identity))
    }

    /// Drive the session until `Shutdown`, the command channel closing, or
    /// the presence channel closing. Returns the session for inspection.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
    ) -> Result<Self, FollowError> {
        let mut events = self.channel.subscribe();
        let mut identity = self.identity.clone();
        let mut identity_open = true;

        self.publish_identity()?;
        self.handle_change().await;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) if event.changes.is_change() => {
                        self.handle_change().await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Presence receiver lagged by {missed} events, recomputing");
                        self.handle_change().await;
                    }
                    Err(RecvError::Closed) => return Err(FollowError::ChannelClosed),
                },
                changed = identity.changed(), if identity_open => match changed {
                    Ok(_) => {
                        debug!("Local identity changed");
                        self.publish_identity()?;
                        self.handle_change().await;
                    }
                    Err(_) => identity_open = false,
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Follow(peer)) => {
                        self.start_follow(&peer).await;
                    }
                    Some(SessionCommand::Unfollow) => {
                        self.stop_follow();
                    }
                    Some(SessionCommand::Publish(shape)) => {
                        if let Err(e) = self.publish_layout(&shape) {
                            warn!("Layout not published: {e}");
                        }
                    }
                    Some(SessionCommand::Shutdown) | None => break,
                },
            }
        }

        info!("Follow session for {:?} stopped", self.identity.name());
        Ok(self)
    }

    async fn replay_pending(&mut self) -> Option<ReplayOutcome> {
        let pending = self.roster.pending_replay()?;
        let outcome = self.engine.replay(&mut self.workbench, &pending.layout).await;
        let token = pending.layout.freshness_token.clone();
        self.roster.mark_attempted(&pending.peer, token.clone());
        if outcome.is_complete() {
            self.roster.mark_applied(&pending.peer, token);
        } else {
            debug!(
                "Layout {token} from {} only partially applied; waiting for a new snapshot",
                pending.peer
            );
        }
        Some(outcome)
    }

    fn notify_view(&self) {
        self.view_tx.send_replace(self.roster.view());
    }
}
