//! Follow session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::FollowError;

/// Configuration for a [`FollowSession`](crate::session::FollowSession).
///
/// Field names must match what every peer of the workspace publishes, so
/// they are usually left at their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FollowConfig {
    /// Presence field holding the peer identity.
    pub identity_field: String,
    /// Presence field holding the focused `<viewer>:<path>` locator.
    pub location_field: String,
    /// Presence field holding the published workspace layout.
    pub layout_field: String,
    /// Replay the new target's current layout right away on `start_follow`
    /// instead of waiting for its next publication.
    pub replay_on_follow: bool,
    /// Remote entries not refreshed within this window are dropped.
    #[serde(with = "duration_millis")]
    pub outdated_timeout: Duration,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            identity_field: "user".to_string(),
            location_field: "current".to_string(),
            layout_field: "layout".to_string(),
            replay_on_follow: true,
            outdated_timeout: tandem_collab::OUTDATED_TIMEOUT,
        }
    }
}

impl FollowConfig {
    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, FollowError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply `TANDEM_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, FollowError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, FollowError> {
        if let Some(v) = lookup("TANDEM_IDENTITY_FIELD").filter(|v| !v.is_empty()) {
            self.identity_field = v;
        }
        if let Some(v) = lookup("TANDEM_LOCATION_FIELD").filter(|v| !v.is_empty()) {
            self.location_field = v;
        }
        if let Some(v) = lookup("TANDEM_LAYOUT_FIELD").filter(|v| !v.is_empty()) {
            self.layout_field = v;
        }
        if let Some(v) = lookup("TANDEM_REPLAY_ON_FOLLOW") {
            self.replay_on_follow = match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(FollowError::ConfigValue { var: "TANDEM_REPLAY_ON_FOLLOW", value: v }),
            };
        }
        if let Some(v) = lookup("TANDEM_OUTDATED_TIMEOUT_MS") {
            let ms: u64 = v.parse().map_err(|_| FollowError::ConfigValue {
                var: "TANDEM_OUTDATED_TIMEOUT_MS",
                value: v.clone(),
            })?;
            self.outdated_timeout = Duration::from_millis(ms);
        }
        Ok(self)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
