use thiserror::Error;

/// Errors surfaced to the host of a follow session.
///
/// Presence and replay degradations never show up here; they are logged and
/// absorbed.
#[derive(Debug, Error)]
pub enum FollowError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Invalid value for {var}: {value}")]
    ConfigValue { var: &'static str, value: String },
    #[error("Presence layout could not be serialized: {0}")]
    Serialize(String),
    #[error("Presence channel closed")]
    ChannelClosed,
    #[error("Local identity is not available")]
    IdentityUnavailable,
}

/// Failure of one workbench primitive during a replay.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkbenchError {
    #[error("Failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("Invalid serialized geometry: {0}")]
    InvalidGeometry(String),
    #[error("Failed to apply layout: {0}")]
    ApplyFailed(String),
}
