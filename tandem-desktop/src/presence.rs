//! Desktop presence panel: turns roster updates into display rows.
//!
//! ```text
//!  FollowSession ──watch──► RosterPanel::refresh() ──► rows()
//! ```

use tandem_follow::RosterView;
use tokio::sync::watch;

/// Caches the rendered roster and tracks whether it changed.
pub struct RosterPanel {
    updates: watch::Receiver<RosterView>,
    rows: Vec<String>,
    dirty: bool,
}

impl RosterPanel {
    pub fn new(updates: watch::Receiver<RosterView>) -> Self {
        Self { updates, rows: Vec::new(), dirty: true }
    }

    /// Re-render if the roster changed. Returns `true` when it did.
    pub fn refresh(&mut self) -> bool {
        let changed = self.updates.has_changed().unwrap_or(false);
        if changed || self.dirty {
            let view = self.updates.borrow_and_update().clone();
            self.rows = render(&view);
            self.dirty = false;
            return true;
        }
        false
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }
}

fn render(view: &RosterView) -> Vec<String> {
    view.entries
        .iter()
        .map(|entry| {
            let mut row = format!("[{}] {}", entry.identity.initials, entry.identity.label());
            if let Some(location) = &entry.location {
                row.push_str(" @ ");
                row.push_str(location);
            }
            if entry.followed {
                row.push_str(" (following)");
            }
            row
        })
        .collect()
}
