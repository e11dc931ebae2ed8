//! Presence records and the workspace layout a peer publishes.
//!
//! Everything here is plain data. Records are rebuilt from the raw presence
//! map on every notification and never mutated afterwards.

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tandem_collab::ClientId;
use uuid::Uuid;

use crate::identity::Identity;

/// Current layout record format. Layouts with a newer version are ignored.
pub const LAYOUT_VERSION: u32 = 1;

/// Where a document is shown: `<viewer-kind>:<path>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locator {
    pub kind: String,
    pub path: String,
}

impl Locator {
    pub fn new(kind: impl Into<String>, path: impl Into<String>) -> Self {
        Self { kind: kind.into(), path: path.into() }
    }

    /// Split at the first `:`. The kind must be non-empty; the path may
    /// itself contain colons.
    pub fn parse(text: &str) -> Option<Self> {
        let (kind, path) = text.split_once(':')?;
        if kind.is_empty() {
            return None;
        }
        Some(Self::new(kind, path))
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path)
    }
}

/// Opaque snapshot identifier. Equal tokens mean the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FreshnessToken(String);

impl FreshnessToken {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FreshnessToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for FreshnessToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for FreshnessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One open document: its path and the viewer (factory) showing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEntry {
    pub path: String,
    /// Empty means the workbench's default viewer for the path.
    #[serde(default)]
    pub factory: String,
}

impl DocumentEntry {
    pub fn new(path: impl Into<String>, factory: impl Into<String>) -> Self {
        Self { path: path.into(), factory: factory.into() }
    }

    pub fn locator(&self) -> Locator {
        Locator::new(self.factory.clone(), self.path.clone())
    }
}

/// How the workbench arranges documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeometryMode {
    #[default]
    MultipleDocument,
    SingleDocument,
}

impl GeometryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GeometryMode::MultipleDocument => "multiple-document",
            GeometryMode::SingleDocument => "single-document",
        }
    }
}

impl fmt::Display for GeometryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn layout_version() -> u32 {
    LAYOUT_VERSION
}

/// A malformed document entry drops only itself, not the whole layout.
fn lenient_documents<'de, D>(deserializer: D) -> Result<IndexMap<String, DocumentEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match serde_json::from_value(value) {
            Ok(doc) => Some((key, doc)),
            Err(e) => {
                debug!("Skipping open document {key:?}: {e}");
                None
            }
        })
        .collect())
}

/// A published snapshot of one peer's workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceLayout {
    #[serde(default = "layout_version")]
    pub version: u32,
    pub freshness_token: FreshnessToken,
    /// Key into `open_documents`, or empty.
    #[serde(default)]
    pub current_key: String,
    /// Insertion order is open order.
    #[serde(default, deserialize_with = "lenient_documents")]
    pub open_documents: IndexMap<String, DocumentEntry>,
    #[serde(default)]
    pub geometry_mode: GeometryMode,
    /// Passed through to the workbench untouched.
    #[serde(default)]
    pub raw_geometry: Value,
}

impl WorkspaceLayout {
    /// The focused document, if `current_key` resolves. A dangling key
    /// counts as no current document.
    pub fn current_document(&self) -> Option<(&str, &DocumentEntry)> {
        if self.current_key.is_empty() {
            return None;
        }
        self.open_documents
            .get_key_value(&self.current_key)
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// One remote collaborator as seen in the presence map.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceRecord {
    pub client_id: ClientId,
    pub identity: Identity,
    pub location: Option<Locator>,
    pub layout: Option<WorkspaceLayout>,
}

impl PresenceRecord {
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn layout_token(&self) -> Option<&FreshnessToken> {
        self.layout.as_ref().map(|l| &l.freshness_token)
    }
}
