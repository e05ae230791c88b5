use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ExecutionConfig;
use crate::core::progress::{FanOut, LogProgress, ProgressSink};
use crate::core::property::PropertyValue;
use crate::core::registry::AlgorithmRegistry;
use crate::workspace::WorkspaceStore;

/// Everything one execution may touch besides its own properties.
///
/// Cloning shares the configuration, workspaces and registry.
#[derive(Clone)]
pub struct ExecutionContext {
    config: Arc<ExecutionConfig>,
    store: WorkspaceStore,
    registry: Arc<AlgorithmRegistry>,
    progress: Option<Arc<dyn ProgressSink>>,
    depth: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(AlgorithmRegistry::new()))
    }
}

impl ExecutionContext {
    pub fn new(registry: Arc<AlgorithmRegistry>) -> Self {
        Self {
            config: Arc::new(ExecutionConfig::default()),
            store: WorkspaceStore::new(),
            registry,
            progress: None,
            depth: 0,
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_store(mut self, store: WorkspaceStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn store(&self) -> &WorkspaceStore {
        &self.store
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Nesting level: 0 for a top-level execution.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_child(&self) -> bool {
        self.depth > 0
    }

    /// Context for an algorithm run as a step of the current one.
    ///
    /// Children share workspaces and configuration but do not report to the host's
    /// progress sink.
    pub fn child(&self) -> Self {
        Self {
            progress: None,
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// The sink progress events go to, including the log when `log_progress` is on.
    pub fn progress_sink(&self) -> Option<Arc<dyn ProgressSink>> {
        match (&self.progress, self.config.log_progress) {
            (Some(sink), true) => Some(Arc::new(FanOut::new(vec![
                Arc::clone(sink),
                Arc::new(LogProgress),
            ]))),
            (Some(sink), false) => Some(Arc::clone(sink)),
            (None, true) => Some(Arc::new(LogProgress)),
            (None, false) => None,
        }
    }

    /// Appends `entry` to the script log, if one is configured.
    ///
    /// Child records are skipped unless `record_child_history` is set. Failures are
    /// logged and otherwise ignored.
    pub fn record_history(&self, entry: &HistoryEntry) {
        if entry.child && !self.config.record_child_history {
            return;
        }
        let Some(path) = &self.config.script_log else {
            return;
        };

        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Could not serialize history for {}: {e}", entry.algorithm);
                return;
            }
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(e) = written {
            log::warn!("Could not write history to {}: {e}", path.display());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

/// One line of the script log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub execution_id: Uuid,
    pub algorithm: String,
    pub version: u32,
    pub child: bool,
    pub started: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
    pub properties: BTreeMap<String, PropertyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::MemoryProgress;

    fn entry(child: bool) -> HistoryEntry {
        let mut properties = BTreeMap::new();
        properties.insert("Factor".to_string(), PropertyValue::Float(2.0));
        HistoryEntry {
            execution_id: Uuid::new_v4(),
            algorithm: "Scale".to_string(),
            version: 1,
            child,
            started: Utc::now(),
            duration_ms: 3,
            status: ExecutionStatus::Succeeded,
            properties,
        }
    }

    #[test]
    fn test_history_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("history.jsonl");
        let ctx = ExecutionContext::default()
            .with_config(ExecutionConfig::default().with_script_log(&log_path));

        ctx.record_history(&entry(false));
        ctx.record_history(&entry(true));
        ctx.record_history(&entry(false));

        let text = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<HistoryEntry> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].properties.get("Factor"), Some(&PropertyValue::Float(2.0)));
        assert!(lines.iter().all(|e| !e.child));
    }

    #[test]
    fn test_history_write_failure_is_not_fatal() {
        let ctx = ExecutionContext::default().with_config(
            ExecutionConfig::default().with_script_log("/no/such/dir/history.jsonl"),
        );
        ctx.record_history(&entry(false));
    }

    #[test]
    fn test_child_context_shares_store_but_not_progress() {
        let ctx = ExecutionContext::default().with_progress(Arc::new(MemoryProgress::new()));
        let child = ctx.child();

        assert!(child.is_child());
        assert!(child.progress_sink().is_none());
        assert!(ctx.progress_sink().is_some());

        let spectrum = crate::workspace::Spectrum::histogram(vec![0.0, 1.0], vec![1.0], vec![1.0]).unwrap();
        child
            .store()
            .add("from_child", crate::workspace::Workspace::new(vec![spectrum]));
        assert!(ctx.store().contains("from_child"));
    }

    #[test]
    fn test_log_progress_adds_a_sink() {
        let ctx = ExecutionContext::default()
            .with_config(ExecutionConfig::default().with_log_progress(true));
        assert!(ctx.progress_sink().is_some());
    }
}
