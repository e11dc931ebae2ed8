//! # tandem-collab: Presence channel substrate for Tandem
//!
//! Provides the shared, eventually-consistent presence map that peers of a
//! workspace read and write, plus an in-process relay to connect them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   framed updates   ┌─────────────┐
//! │ Awareness   │ ◄────────────────► │ Room        │
//! │ (per peer)  │   AwarenessLink    │ (fan-out)   │
//! └──────┬──────┘                    └──────┬──────┘
//!        │ AwarenessEvent                   │
//!        ▼                                  ▼
//! ┌─────────────┐                    ┌─────────────┐
//! │ subscribers │                    │ other peers │
//! └─────────────┘                    └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: var-uint awareness update codec and relay framing
//! - [`awareness`]: per-client states with clocks and change events
//! - [`hub`]: room-based fan-out with backpressure
//! - [`link`]: pumps one awareness store through one room

pub mod awareness;
pub mod hub;
pub mod link;
pub mod protocol;

// Re-exports for convenience
pub use awareness::{Awareness, AwarenessChanges, AwarenessEvent, Origin, OUTDATED_TIMEOUT};
pub use hub::{Envelope, Room, RoomConfig, RoomManager, RoomStats, GLOBAL_AWARENESS_ROOM};
pub use link::{AwarenessLink, LinkHandle};
pub use protocol::{AwarenessEntry, AwarenessUpdate, ClientId, MessageType, ProtocolError};
