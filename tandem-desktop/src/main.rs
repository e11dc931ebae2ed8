//! Tandem Desktop: scripted follow-mode session.
//!
//! Two peers share one awareness room on an in-process hub. Bob opens and
//! rearranges documents and publishes his layout; Alice follows him and
//! her in-memory workspace is replayed to match. Run with `RUST_LOG=debug`
//! to see every reconciliation step.

mod presence;
mod workspace;

use log::{info, warn};
use std::sync::Arc;
use tandem_collab::{Awareness, AwarenessLink, RoomConfig, RoomManager, GLOBAL_AWARENESS_ROOM};
use tandem_follow::{
    fixed_identity, FollowConfig, FollowSession, GeometryMode, Identity, LayoutPublisher,
    SessionCommand,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use presence::RosterPanel;
use workspace::DemoWorkspace;

const STEP: Duration = Duration::from_millis(50);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Tandem Desktop...");

    let config = FollowConfig::default().with_env_overrides()?;
    let manager = RoomManager::new(RoomConfig::default());
    let room = manager.get_or_create(GLOBAL_AWARENESS_ROOM).await;

    let alice = Arc::new(Awareness::new());
    let bob = Arc::new(Awareness::new());
    let alice_link = AwarenessLink::join(alice.clone(), room.clone())
        .await?
        .with_outdated_timeout(config.outdated_timeout)
        .spawn();
    let bob_link = AwarenessLink::join(bob.clone(), room.clone())
        .await?
        .with_outdated_timeout(config.outdated_timeout)
        .spawn();

    let (_alice_identity, identity) = fixed_identity(Identity::anonymous("alice", "Alice Liddell"));
    let session = FollowSession::new(
        alice.clone(),
        DemoWorkspace::new().with_missing(&["scratch/tmp.py"]),
        identity,
        config.clone(),
    );
    let mut panel = RosterPanel::new(session.watch_roster());
    let (commands, rx) = mpsc::channel(16);

    // Workbench futures are not `Send`; the session runs on this task,
    // joined with the script that drives it.
    let script = async move {
        let bob_identity = Identity::anonymous("bob", "Bob Marley");
        bob.set_local_field(&config.identity_field, serde_json::to_value(&bob_identity)?);
        let mut bob_ws = DemoWorkspace::new();
        let mut publisher = LayoutPublisher::new(&config);

        bob_ws.open_local("analysis/load.ipynb", "notebook");
        bob_ws.open_local("analysis/model.ipynb", "notebook");
        publisher.publish(&bob, &bob_ws.shape())?;
        sleep(STEP).await;
        show(&mut panel);

        commands.send(SessionCommand::Follow("bob".into())).await?;
        sleep(STEP).await;
        show(&mut panel);

        bob_ws.open_local("scratch/tmp.py", "editor");
        bob_ws.open_local("README.md", "markdown");
        bob_ws.set_mode(GeometryMode::SingleDocument);
        publisher.publish(&bob, &bob_ws.shape())?;
        sleep(STEP).await;

        commands.send(SessionCommand::Unfollow).await?;
        sleep(STEP).await;
        bob_ws.open_local("notes.md", "markdown");
        publisher.publish(&bob, &bob_ws.shape())?;
        sleep(STEP).await;
        show(&mut panel);

        commands.send(SessionCommand::Shutdown).await?;
        Ok::<_, Box<dyn std::error::Error>>(())
    };

    let (session, script) = tokio::join!(session.run(rx), script);
    script?;
    let session = session?;

    let ws = session.workbench();
    let stats = session.replay_stats();
    info!(
        "Alice's workspace: {:?}, focus {:?}, mode {}",
        ws.open_paths(),
        ws.focused(),
        ws.mode()
    );
    info!(
        "Replays: {} ({} complete), {} documents opened, {} failed",
        stats.replays, stats.completed, stats.documents_opened, stats.open_failures
    );

    for link in [alice_link, bob_link] {
        if let Err(e) = link.close().await {
            warn!("Link close failed: {e}");
        }
    }
    if manager.remove_if_empty(GLOBAL_AWARENESS_ROOM).await {
        info!("Room {GLOBAL_AWARENESS_ROOM} closed");
    }
    Ok(())
}

fn show(panel: &mut RosterPanel) {
    if panel.refresh() {
        for row in panel.rows() {
            info!("  {row}");
        }
    }
}
