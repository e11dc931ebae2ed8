//! Local identity: "who am I" with readiness and change notifications.
//!
//! The host owns an [`IdentitySender`] and pushes the identity once it is
//! known (and again whenever it changes). The session holds the matching
//! [`IdentityHandle`].

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::FollowError;

/// A collaborator's identity as published in presence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable unique key.
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// CSS color, e.g. `#4f8fd6`.
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub initials: String,
}

impl Identity {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
        initials: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            color: color.into(),
            initials: initials.into(),
        }
    }

    /// Build an identity whose color and initials are derived from the names.
    ///
    /// The color is stable for a given `name`.
    pub fn anonymous(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let name = name.into();
        let display_name = display_name.into();
        let initials = initials_for(if display_name.is_empty() { &name } else { &display_name });
        let color = color_for(&name);
        Self { name, display_name, color, initials }
    }

    /// Name to show in a roster: display name, falling back to the key.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// First letter of the first and last word, upper-cased.
fn initials_for(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let first = words.first().and_then(|w| w.chars().next());
    let last = if words.len() > 1 {
        words.last().and_then(|w| w.chars().next())
    } else {
        None
    };
    first
        .into_iter()
        .chain(last)
        .flat_map(char::to_uppercase)
        .collect()
}

/// Stable, vivid color from a name hash (FNV-1a → hue).
fn color_for(name: &str) -> String {
    let hash = name
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3));
    let hue = (hash % 360) as f32 / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.6);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8
    )
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 { t += 1.0; }
    if t > 1.0 { t -= 1.0; }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

/// Host side: publishes the local identity.
#[derive(Debug)]
pub struct IdentitySender {
    tx: watch::Sender<Option<Identity>>,
}

impl IdentitySender {
    /// Publish (or replace) the local identity. Unchanged values are not
    /// re-notified.
    pub fn set(&self, identity: Identity) {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&identity) {
                false
            } else {
                *current = Some(identity);
                true
            }
        });
    }

    pub fn subscribe(&self) -> IdentityHandle {
        IdentityHandle { rx: self.tx.subscribe() }
    }
}

/// Session side: reads the local identity.
#[derive(Debug, Clone)]
pub struct IdentityHandle {
    rx: watch::Receiver<Option<Identity>>,
}

impl IdentityHandle {
    /// The identity right now, if it is ready.
    pub fn now(&self) -> Option<Identity> {
        self.rx.borrow().clone()
    }

    /// Name of the local identity, or `""` before it is ready.
    pub fn name(&self) -> String {
        self.rx.borrow().as_ref().map(|i| i.name.clone()).unwrap_or_default()
    }

    /// Wait until an identity is available.
    pub async fn ready(&mut self) -> Result<Identity, FollowError> {
        let guard = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| FollowError::IdentityUnavailable)?;
        guard.clone().ok_or(FollowError::IdentityUnavailable)
    }

    /// Wait for the next identity change.
    pub async fn changed(&mut self) -> Result<Option<Identity>, FollowError> {
        self.rx.changed().await.map_err(|_| FollowError::IdentityUnavailable)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}

/// Create a connected identity sender/handle pair, initially not ready.
pub fn identity_channel() -> (IdentitySender, IdentityHandle) {
    let (tx, rx) = watch::channel(None);
    (IdentitySender { tx }, IdentityHandle { rx })
}

/// Pair that is ready immediately.
pub fn fixed_identity(identity: Identity) -> (IdentitySender, IdentityHandle) {
    let (tx, rx) = watch::channel(Some(identity));
    (IdentitySender { tx }, IdentityHandle { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initials() {
        assert_eq!(initials_for("Ada Lovelace"), "AL");
        assert_eq!(initials_for("grace brewster hopper"), "GH");
        assert_eq!(initials_for("linus"), "L");
        assert_eq!(initials_for("   "), "");
    }

    #[test]
    fn test_anonymous_identity() {
        let id = Identity::anonymous("ada", "Ada Lovelace");
        assert_eq!(id.initials, "AL");
        assert!(id.color.starts_with('#'));
        assert_eq!(id.color.len(), 7);
        assert_eq!(id.label(), "Ada Lovelace");

        // Color depends on the key only.
        assert_eq!(Identity::anonymous("ada", "Someone Else").color, id.color);

        let bare = Identity::anonymous("bob", "");
        assert_eq!(bare.initials, "B");
        assert_eq!(bare.label(), "bob");
    }

    #[test]
    fn test_hsl_red() {
        let (r, g, b) = hsl_to_rgb(0.0, 1.0, 0.5);
        assert!((r - 1.0).abs() < 0.01);
        assert!(g.abs() < 0.01);
        assert!(b.abs() < 0.01);
    }

    #[test]
    fn test_identity_json_shape() {
        let id: Identity = serde_json::from_value(serde_json::json!({
            "name": "ada",
            "displayName": "Ada",
            "color": "#fff",
            "initials": "A",
            "avatar_url": null,
        }))
        .unwrap();
        assert_eq!(id.display_name, "Ada");

        // Only the key is mandatory.
        let minimal: Identity = serde_json::from_value(serde_json::json!({ "name": "x" })).unwrap();
        assert_eq!(minimal.display_name, "");
    }

    #[tokio::test]
    async fn test_ready_waits_for_identity() {
        let (sender, mut handle) = identity_channel();
        assert!(handle.now().is_none());
        assert_eq!(handle.name(), "");

        let waiter = tokio::spawn(async move { handle.ready().await });
        sender.set(Identity::anonymous("ada", "Ada"));

        let identity = waiter.await.unwrap().unwrap();
        assert_eq!(identity.name, "ada");
    }

    #[tokio::test]
    async fn test_changed_notifies_once_per_distinct_value() {
        let (sender, mut handle) = fixed_identity(Identity::anonymous("ada", "Ada"));
        assert_eq!(handle.ready().await.unwrap().name, "ada");

        // Same value: no notification.
        sender.set(Identity::anonymous("ada", "Ada"));
        sender.set(Identity::anonymous("ada", "Ada L."));

        let changed = handle.changed().await.unwrap().unwrap();
        assert_eq!(changed.display_name, "Ada L.");
    }

    #[tokio::test]
    async fn test_dropped_sender_is_unavailable() {
        let (sender, mut handle) = identity_channel();
        drop(sender);
        assert!(matches!(handle.ready().await, Err(FollowError::IdentityUnavailable)));
    }
}
