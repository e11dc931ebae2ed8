//! Layout publisher: writes the local workspace shape into presence.

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value;

use crate::channel::PresenceChannel;
use crate::config::FollowConfig;
use crate::error::FollowError;
use crate::record::{DocumentEntry, FreshnessToken, GeometryMode, WorkspaceLayout, LAYOUT_VERSION};

/// What the local workbench looks like right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceShape {
    /// Open documents in open order.
    pub open_documents: IndexMap<String, DocumentEntry>,
    pub current_key: Option<String>,
    pub geometry_mode: GeometryMode,
    /// Serialized geometry from the workbench.
    pub geometry: Value,
}

impl WorkspaceShape {
    pub fn new(geometry_mode: GeometryMode) -> Self {
        Self { geometry_mode, ..Self::default() }
    }

    /// Append a document (or move an existing key's entry in place).
    pub fn open(mut self, key: impl Into<String>, document: DocumentEntry) -> Self {
        self.open_documents.insert(key.into(), document);
        self
    }

    pub fn focus(mut self, key: impl Into<String>) -> Self {
        self.current_key = Some(key.into());
        self
    }

    pub fn with_geometry(mut self, geometry: Value) -> Self {
        self.geometry = geometry;
        self
    }
}

/// Builds and publishes [`WorkspaceLayout`]s for the local peer.
#[derive(Debug)]
pub struct LayoutPublisher {
    layout_field: String,
    location_field: String,
    published: u64,
    last_token: Option<FreshnessToken>,
}

impl LayoutPublisher {
    pub fn new(config: &FollowConfig) -> Self {
        Self {
            layout_field: config.layout_field.clone(),
            location_field: config.location_field.clone(),
            published: 0,
            last_token: None,
        }
    }

    /// Build a layout with a fresh token. A current key that is not among
    /// the open documents is cleared.
    pub fn build(&self, shape: &WorkspaceShape) -> WorkspaceLayout {
        let current_key = match shape.current_key.as_deref() {
            Some(key) if shape.open_documents.contains_key(key) => key.to_string(),
            Some(key) => {
                warn!("Current document {key:?} is not open; publishing without focus");
                String::new()
            }
            None => String::new(),
        };
        WorkspaceLayout {
            version: LAYOUT_VERSION,
            freshness_token: FreshnessToken::generate(),
            current_key,
            open_documents: shape.open_documents.clone(),
            geometry_mode: shape.geometry_mode,
            raw_geometry: shape.geometry.clone(),
        }
    }

    /// Build a layout and write it, together with the focused locator, into
    /// the local presence entry.
    pub fn publish<C: PresenceChannel + ?Sized>(
        &mut self,
        channel: &C,
        shape: &WorkspaceShape,
    ) -> Result<WorkspaceLayout, FollowError> {
        let layout = self.build(shape);
        let value =
            serde_json::to_value(&layout).map_err(|e| FollowError::Serialize(e.to_string()))?;

        let location = layout
            .current_document()
            .map(|(_, doc)| Value::String(doc.locator().to_string()))
            .unwrap_or(Value::Null);

        channel.set_local_field(&self.layout_field, value);
        channel.set_local_field(&self.location_field, location);

        self.published += 1;
        self.last_token = Some(layout.freshness_token.clone());
        debug!(
            "Published layout {} ({} documents, current {:?})",
            layout.freshness_token,
            layout.open_documents.len(),
            layout.current_key
        );
        Ok(layout)
    }

    /// Number of layouts published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn last_token(&self) -> Option<&FreshnessToken> {
        self.last_token.as_ref()
    }
}
