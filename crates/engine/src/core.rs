// stackfreeze - Freeze-the-world stack snapshots
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Core capture workflow.
//!
//! This module provides the [`Engine`] that freezes the calling thread's stack into a
//! snapshot artifact and its companion notebook.
//!
//! # Workflow Overview
//!
//! 1. **Configuration**: Resolve the output directory; nothing is inspected before it
//!    is known to exist
//! 2. **Enumeration**: Capture the backtrace and merge it with the registered scopes
//! 3. **Filtering**: Drop toolchain, dependency and stackfreeze frames
//! 4. **Building**: Sanitize locals and read source context per frame
//! 5. **Persistence**: Write `<id>.json`, then `<id>.ipynb` next to it
//!
//! Steps 2 to 4 run while the scope registry is borrowed, so every lent local is still
//! alive while it is inspected. Nothing read from a frame outlives the capture call
//! except the sanitized values.

use std::{fs, path::PathBuf};

use stackfreeze_common::Snapshot;
use tracing::{debug, info, warn};

use crate::{
    build_notebook, build_snapshot,
    context::DEFAULT_CONTEXT_LINES,
    enumerate_frames,
    filter::FrameFilter,
    new_artifact_id,
    output::resolve_output_dir,
    persist,
    registry::with_scopes,
    sanitize::{SanitizerRules, DEFAULT_RECEIVER_NAMES},
    search_path_from_env, write_notebook, CaptureError, CaptureReport,
};

/// Configuration of a capture.
///
/// Every setting has a default that reads the environment at capture time.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory for the artifacts; `STACKFREEZE_NOTEBOOKS_PATH` when unset
    pub output_dir: Option<PathBuf>,
    /// Crate directories loaded by the notebook; `STACKFREEZE_PATH` and the running
    /// package's manifest directory when unset
    pub search_path: Option<Vec<PathBuf>>,
    /// Path patterns dropped in addition to the built-in ones and `STACKFREEZE_IGNORE`
    pub ignore_patterns: Vec<String>,
    /// Local names treated as method receivers
    pub receiver_names: Vec<String>,
    /// Source lines shown before and after each active line
    pub context_lines: usize,
    /// Whether the notebook repeats the imports of the captured source files
    pub aggregate_imports: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            search_path: None,
            ignore_patterns: Vec::new(),
            receiver_names: DEFAULT_RECEIVER_NAMES.iter().map(|name| name.to_string()).collect(),
            context_lines: DEFAULT_CONTEXT_LINES,
            aggregate_imports: true,
        }
    }
}

impl CaptureConfig {
    /// Write artifacts into `dir`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Use exactly these crate directories in the notebook's setup cell
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = Some(search_path);
        self
    }

    /// Drop frames whose source path contains `pattern`
    pub fn with_ignore_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.ignore_patterns.push(pattern.into());
        self
    }

    /// Treat these local names as method receivers
    pub fn with_receiver_names(
        mut self,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.receiver_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Show `lines` source lines around each active line
    pub fn with_context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Enable or disable import aggregation in the notebook
    pub fn with_import_aggregation(mut self, enabled: bool) -> Self {
        self.aggregate_imports = enabled;
        self
    }
}

/// Result of a successful capture
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    /// Persisted snapshot artifact
    pub snapshot_path: PathBuf,
    /// Companion notebook
    pub notebook_path: PathBuf,
    /// The persisted snapshot
    pub snapshot: Snapshot,
    /// What could not be captured
    pub report: CaptureReport,
}

/// The capture engine
#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: CaptureConfig,
}

impl Engine {
    /// Create a new Engine instance from configuration
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Freeze the calling thread's stack
    ///
    /// Configuration errors are returned before the stack is touched. Variables and
    /// source files that cannot be captured are listed in the outcome's report.
    pub fn capture(&self) -> Result<CaptureOutcome, CaptureError> {
        // Step 1: Resolve the output directory
        let dir = resolve_output_dir(self.config.output_dir.clone())?;

        let filter = FrameFilter::from_env(self.config.ignore_patterns.iter().cloned());
        let rules = SanitizerRules::new(self.config.receiver_names.iter().cloned());
        let id = new_artifact_id();
        info!(%id, dir = %dir.display(), "Capturing stack");

        // Steps 2-4: Enumerate, filter and build while the scopes are registered
        let (snapshot, report) = with_scopes(|scopes| {
            let frames = enumerate_frames(scopes);
            let total = frames.len();
            let frames = filter.retain(frames);
            debug!(total, kept = frames.len(), "filtered frames");
            build_snapshot(id, &frames, &rules, self.config.context_lines)
        });

        // Step 5: Persist the snapshot, then its notebook
        let snapshot_path = persist(&snapshot, &dir)?;

        let search_path = self.config.search_path.clone().unwrap_or_else(search_path_from_env);
        let notebook =
            build_notebook(&snapshot, &snapshot_path, &search_path, self.config.aggregate_imports);
        let notebook_path = match write_notebook(&notebook, &dir, &snapshot.id) {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "notebook not written, removing snapshot");
                let _ = fs::remove_file(&snapshot_path);
                return Err(err);
            }
        };

        info!(
            snapshot = %snapshot_path.display(),
            notebook = %notebook_path.display(),
            rows = snapshot.len(),
            skipped = report.skipped.len(),
            "Capture complete"
        );

        Ok(CaptureOutcome { snapshot_path, notebook_path, snapshot, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_output_dir_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone");
        let engine = Engine::new(CaptureConfig::default().with_output_dir(&gone));

        let err = engine.capture().unwrap_err();

        assert!(err.is_config());
        assert!(!gone.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
