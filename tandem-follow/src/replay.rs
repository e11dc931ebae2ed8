//! Layout replay engine.
//!
//! Replays one [`WorkspaceLayout`] onto a [`Workbench`] in a fixed order:
//!
//! 1. open every document in recorded order,
//! 2. open the current document again to focus it,
//! 3. apply the recorded geometry.
//!
//! Steps 2 and 3 run only if the current key resolves. Failed opens are
//! logged and skipped, never retried, and never abort the rest.

use log::{debug, info, warn};
use serde_json::Value;

use crate::error::WorkbenchError;
use crate::record::{GeometryMode, Locator, WorkspaceLayout};

/// Document and layout primitives of the local workbench.
#[allow(async_fn_in_trait)]
pub trait Workbench {
    /// Workbench-native geometry decoded from a layout's raw blob.
    type Layout;

    /// Open (or reveal and focus) a document.
    async fn open_document(&mut self, locator: &Locator) -> Result<(), WorkbenchError>;

    fn layout_from_serialized(&self, raw: &Value) -> Result<Self::Layout, WorkbenchError>;

    async fn apply_layout(
        &mut self,
        mode: GeometryMode,
        layout: Self::Layout,
    ) -> Result<(), WorkbenchError>;
}

/// What one replay did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayOutcome {
    /// Keys opened successfully, in order.
    pub opened: Vec<String>,
    pub failed: Vec<(String, WorkbenchError)>,
    /// Focused key, if the current document resolved and its open succeeded.
    pub focused: Option<String>,
    pub geometry_applied: bool,
}

impl ReplayOutcome {
    /// Complete replays are the only ones whose token gets recorded.
    pub fn is_complete(&self) -> bool {
        self.geometry_applied
    }
}

/// Replay counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub replays: u64,
    pub completed: u64,
    pub documents_opened: u64,
    pub open_failures: u64,
    pub geometry_failures: u64,
}

#[derive(Debug, Default)]
pub struct ReplayEngine {
    stats: ReplayStats,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReplayStats {
        self.stats
    }

    /// Replay `layout` onto `workbench`.
    pub async fn replay<W: Workbench>(
        &mut self,
        workbench: &mut W,
        layout: &WorkspaceLayout,
    ) -> ReplayOutcome {
        let mut outcome = ReplayOutcome::default();
        self.stats.replays += 1;

        for (key, doc) in &layout.open_documents {
            match workbench.open_document(&doc.locator()).await {
                Ok(()) => {
                    self.stats.documents_opened += 1;
                    outcome.opened.push(key.clone());
                }
                Err(e) => {
                    warn!("Replay {}: {e}", layout.freshness_token);
                    self.stats.open_failures += 1;
                    outcome.failed.push((key.clone(), e));
                }
            }
        }

        let Some((current_key, current)) = layout.current_document() else {
            if !layout.current_key.is_empty() {
                debug!(
                    "Replay {}: current document {:?} is not in the layout, skipping geometry",
                    layout.freshness_token, layout.current_key
                );
            }
            self.finish(layout, &outcome);
            return outcome;
        };

        match workbench.open_document(&current.locator()).await {
            Ok(()) => outcome.focused = Some(current_key.to_string()),
            Err(e) => {
                warn!("Replay {}: focusing {current_key}: {e}", layout.freshness_token);
                self.stats.open_failures += 1;
            }
        }

        let applied = match workbench.layout_from_serialized(&layout.raw_geometry) {
            Ok(geometry) => workbench.apply_layout(layout.geometry_mode, geometry).await,
            Err(e) => Err(e),
        };
        match applied {
            Ok(()) => outcome.geometry_applied = true,
            Err(e) => {
                warn!("Replay {}: {e}", layout.freshness_token);
                self.stats.geometry_failures += 1;
            }
        }

        self.finish(layout, &outcome);
        outcome
    }

    fn finish(&mut self, layout: &WorkspaceLayout, outcome: &ReplayOutcome) {
        if outcome.is_complete() {
            self.stats.completed += 1;
        }
        info!(
            "Replayed {}: {} opened, {} failed, focus {:?}, geometry {}",
            layout.freshness_token,
            outcome.opened.len(),
            outcome.failed.len(),
            outcome.focused,
            if outcome.geometry_applied { "applied" } else { "skipped" }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocumentEntry, FreshnessToken, LAYOUT_VERSION};
    use indexmap::IndexMap;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Open(String),
        Apply(GeometryMode, Value),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
        fail_paths: Vec<String>,
        fail_apply: bool,
    }

    impl Workbench for Recorder {
        type Layout = Value;

        async fn open_document(&mut self, locator: &Locator) -> Result<(), WorkbenchError> {
            self.calls.push(Call::Open(locator.to_string()));
            if self.fail_paths.contains(&locator.path) {
                return Err(WorkbenchError::OpenFailed {
                    path: locator.path.clone(),
                    reason: "denied".into(),
                });
            }
            Ok(())
        }

        fn layout_from_serialized(&self, raw: &Value) -> Result<Value, WorkbenchError> {
            if raw.is_object() {
                Ok(raw.clone())
            } else {
                Err(WorkbenchError::InvalidGeometry(raw.to_string()))
            }
        }

        async fn apply_layout(&mut self, mode: GeometryMode, layout: Value) -> Result<(), WorkbenchError> {
            self.calls.push(Call::Apply(mode, layout));
            if self.fail_apply {
                return Err(WorkbenchError::ApplyFailed("boom".into()));
            }
            Ok(())
        }
    }

    fn layout(current: &str, docs: &[(&str, &str)], geometry: Value) -> WorkspaceLayout {
        let open_documents: IndexMap<_, _> = docs
            .iter()
            .map(|(k, p)| (k.to_string(), DocumentEntry::new(*p, "notebook")))
            .collect();
        WorkspaceLayout {
            version: LAYOUT_VERSION,
            freshness_token: FreshnessToken::from("t"),
            current_key: current.to_string(),
            open_documents,
            geometry_mode: GeometryMode::MultipleDocument,
            raw_geometry: geometry,
        }
    }

    #[tokio::test]
    async fn test_opens_in_order_then_focuses() {
        let mut bench = Recorder::default();
        let mut engine = ReplayEngine::new();
        let layout = layout("kB", &[("kA", "a"), ("kB", "b"), ("kC", "c")], json!({ "g": 1 }));

        let outcome = engine.replay(&mut bench, &layout).await;

        assert_eq!(
            bench.calls,
            vec![
                Call::Open("notebook:a".into()),
                Call::Open("notebook:b".into()),
                Call::Open("notebook:c".into()),
                Call::Open("notebook:b".into()),
                Call::Apply(GeometryMode::MultipleDocument, json!({ "g": 1 })),
            ]
        );
        assert!(outcome.is_complete());
        assert_eq!(outcome.focused.as_deref(), Some("kB"));
        assert_eq!(engine.stats().completed, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_isolated() {
        let mut bench = Recorder { fail_paths: vec!["b".into()], ..Recorder::default() };
        let mut engine = ReplayEngine::new();
        let layout = layout("kC", &[("kA", "a"), ("kB", "b"), ("kC", "c")], json!({}));

        let outcome = engine.replay(&mut bench, &layout).await;

        assert_eq!(outcome.opened, ["kA", "kC"]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "kB");
        assert!(outcome.geometry_applied);
        // "b" attempted exactly once.
        let b_opens = bench.calls.iter().filter(|c| **c == Call::Open("notebook:b".into())).count();
        assert_eq!(b_opens, 1);
        assert_eq!(engine.stats().open_failures, 1);
    }

    #[tokio::test]
    async fn test_unresolved_current_key_skips_geometry() {
        let mut bench = Recorder::default();
        let mut engine = ReplayEngine::new();
        let layout = layout("missing", &[("k9", "nine")], json!({}));

        let outcome = engine.replay(&mut bench, &layout).await;

        assert_eq!(bench.calls, vec![Call::Open("notebook:nine".into())]);
        assert!(!outcome.is_complete());
        assert!(outcome.focused.is_none());
    }

    #[tokio::test]
    async fn test_empty_current_key_opens_only() {
        let mut bench = Recorder::default();
        let mut engine = ReplayEngine::new();
        let outcome = engine.replay(&mut bench, &layout("", &[("k1", "x")], json!({}))).await;
        assert_eq!(bench.calls.len(), 1);
        assert!(!outcome.geometry_applied);
    }

    #[tokio::test]
    async fn test_bad_geometry_is_incomplete() {
        let mut bench = Recorder::default();
        let mut engine = ReplayEngine::new();
        let outcome = engine.replay(&mut bench, &layout("k1", &[("k1", "x")], json!("garbage"))).await;

        // Both opens happen, apply never does.
        assert_eq!(bench.calls.len(), 2);
        assert!(!outcome.is_complete());
        assert_eq!(engine.stats().geometry_failures, 1);
    }

    #[tokio::test]
    async fn test_apply_failure_is_incomplete() {
        let mut bench = Recorder { fail_apply: true, ..Recorder::default() };
        let mut engine = ReplayEngine::new();
        let outcome = engine.replay(&mut bench, &layout("k1", &[("k1", "x")], json!({}))).await;
        assert!(!outcome.is_complete());
        assert_eq!(engine.stats().completed, 0);
        assert_eq!(engine.stats().replays, 1);
    }
}
