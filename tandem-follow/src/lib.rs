//! # tandem-follow: Follow mode for collaborative workspaces
//!
//! Derives a roster of remote collaborators from the shared presence map,
//! lets the local user follow one of them, and replays the followed peer's
//! published workspace layout onto the local workbench.
//!
//! ## Architecture
//!
//! ```text
//!  presence change ──► reader ──► Roster ──► ReplayEngine ──► Workbench
//!                                   ▲
//!  start/stop follow ───────────────┘
//!
//!  workspace change ──► LayoutPublisher ──► local presence entry
//! ```
//!
//! [`FollowSession`] wires these to a [`PresenceChannel`] and drives them
//! from channel notifications and host commands.
//!
//! ## Modules
//!
//! - [`record`]: presence records and the published layout
//! - [`identity`]: local identity with readiness notifications
//! - [`channel`]: the presence channel seam
//! - [`reader`]: raw presence map → typed records
//! - [`follow`]: `Idle ⇄ Following` state machine
//! - [`roster`]: current records plus follow state
//! - [`publisher`]: local workspace shape → presence
//! - [`replay`]: layout → workbench calls
//! - [`session`]: event loop tying it together

pub mod channel;
pub mod config;
pub mod error;
pub mod follow;
pub mod identity;
pub mod publisher;
pub mod reader;
pub mod record;
pub mod replay;
pub mod roster;
pub mod session;

pub use channel::PresenceChannel;
pub use config::FollowConfig;
pub use error::{FollowError, WorkbenchError};
pub use follow::{FollowController, FollowEvent, FollowState};
pub use identity::{fixed_identity, identity_channel, Identity, IdentityHandle, IdentitySender};
pub use publisher::{LayoutPublisher, WorkspaceShape};
pub use reader::read_snapshot;
pub use record::{
    DocumentEntry, FreshnessToken, GeometryMode, Locator, PresenceRecord, WorkspaceLayout,
    LAYOUT_VERSION,
};
pub use replay::{ReplayEngine, ReplayOutcome, ReplayStats, Workbench};
pub use roster::{PendingReplay, Roster, RosterEntry, RosterView};
pub use session::{FollowSession, SessionCommand};
