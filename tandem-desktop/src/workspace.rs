//! In-memory workbench: stands in for a real editor shell.
//!
//! Keeps the open documents in open order, the focused one, and the dock
//! geometry. Paths listed as missing fail to open, which exercises the
//! replay engine's per-document isolation.

use indexmap::IndexMap;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use tandem_follow::{DocumentEntry, GeometryMode, Locator, Workbench, WorkbenchError, WorkspaceShape};

/// Dock geometry as the demo shell serializes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DockGeometry {
    /// Tab order of the main area.
    #[serde(default)]
    pub main: Vec<String>,
    #[serde(default)]
    pub left_collapsed: bool,
}

#[derive(Debug, Default)]
pub struct DemoWorkspace {
    documents: IndexMap<String, DocumentEntry>,
    focused: Option<String>,
    mode: GeometryMode,
    geometry: DockGeometry,
    missing: HashSet<String>,
}

impl DemoWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths that do not exist on this machine.
    pub fn with_missing(mut self, paths: &[&str]) -> Self {
        self.missing.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    /// Open a document as the local user would. Returns its key.
    pub fn open_local(&mut self, path: &str, factory: &str) -> String {
        let doc = DocumentEntry::new(path, factory);
        let key = doc.locator().to_string();
        self.documents.entry(key.clone()).or_insert(doc);
        self.focused = Some(key.clone());
        self.geometry.main = self.documents.keys().cloned().collect();
        key
    }

    pub fn set_mode(&mut self, mode: GeometryMode) {
        self.mode = mode;
    }

    /// Current shape, ready to publish.
    pub fn shape(&self) -> WorkspaceShape {
        WorkspaceShape {
            open_documents: self.documents.clone(),
            current_key: self.focused.clone(),
            geometry_mode: self.mode,
            geometry: serde_json::to_value(&self.geometry).unwrap_or(Value::Null),
        }
    }

    pub fn open_paths(&self) -> Vec<&str> {
        self.documents.values().map(|d| d.path.as_str()).collect()
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    pub fn mode(&self) -> GeometryMode {
        self.mode
    }

    pub fn geometry(&self) -> &DockGeometry {
        &self.geometry
    }
}

impl Workbench for DemoWorkspace {
    type Layout = DockGeometry;

    async fn open_document(&mut self, locator: &Locator) -> Result<(), WorkbenchError> {
        if self.missing.contains(&locator.path) {
            return Err(WorkbenchError::OpenFailed {
                path: locator.path.clone(),
                reason: "no such file".into(),
            });
        }
        let key = locator.to_string();
        if !self.documents.contains_key(&key) {
            info!("Opening {locator}");
            self.documents
                .insert(key.clone(), DocumentEntry::new(locator.path.clone(), locator.kind.clone()));
        }
        self.focused = Some(key);
        Ok(())
    }

    fn layout_from_serialized(&self, raw: &Value) -> Result<DockGeometry, WorkbenchError> {
        serde_json::from_value(raw.clone()).map_err(|e| WorkbenchError::InvalidGeometry(e.to_string()))
    }

    async fn apply_layout(&mut self, mode: GeometryMode, layout: DockGeometry) -> Result<(), WorkbenchError> {
        info!("Applying {mode} layout with {} tabs", layout.main.len());
        self.mode = mode;
        self.geometry = layout;
        Ok(())
    }
}
