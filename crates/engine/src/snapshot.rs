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

//! Snapshot building and persistence
//!
//! Turns the filtered frames of a capture into [`SnapshotRow`]s and writes the
//! resulting [`Snapshot`] as `<id>.json`. Rows keep the frame order, innermost
//! first, and are never reordered afterwards.

use std::{
    fs,
    path::{Path, PathBuf},
};

use stackfreeze_common::{ContextBlock, Snapshot, SnapshotRow};
use tracing::{debug, warn};

use crate::{context::read_context, frames::RawFrame, sanitize::SanitizerRules, CaptureError};

/// File extension of persisted snapshots
pub const SNAPSHOT_EXTENSION: &str = "json";

/// A fresh random artifact id: 32 lowercase hex characters
pub fn new_artifact_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// What a capture could not preserve
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    /// Variables that could not be persisted, deduplicated, in first-seen order
    pub skipped: Vec<String>,
    /// Source files whose context could not be read
    pub missing_sources: Vec<PathBuf>,
}

impl CaptureReport {
    /// Whether everything was captured
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.missing_sources.is_empty()
    }

    fn skip(&mut self, name: String) {
        if !self.skipped.contains(&name) {
            self.skipped.push(name);
        }
    }

    fn missing(&mut self, file: &Path) {
        if !self.missing_sources.iter().any(|known| known == file) {
            self.missing_sources.push(file.to_path_buf());
        }
    }
}

/// Build the snapshot of the given frames, innermost first
pub fn build_snapshot(
    id: impl Into<String>,
    frames: &[RawFrame<'_>],
    rules: &SanitizerRules,
    context_lines: usize,
) -> (Snapshot, CaptureReport) {
    let mut report = CaptureReport::default();

    let rows = frames
        .iter()
        .map(|frame| {
            let sanitized = frame
                .namespace
                .map(|scope| rules.sanitize(scope.locals()))
                .unwrap_or_default();
            for name in sanitized.skipped {
                report.skip(name);
            }

            let context = match read_context(&frame.file, frame.line, context_lines) {
                Ok(context) => context,
                Err(err) => {
                    warn!(file = %frame.file.display(), %err, "source unavailable, context left empty");
                    report.missing(&frame.file);
                    ContextBlock::empty(&frame.file)
                }
            };

            SnapshotRow::new(
                frame.file.clone(),
                frame.function.clone(),
                frame.line,
                sanitized.locals,
                context,
            )
        })
        .collect();

    if !report.skipped.is_empty() {
        warn!(variables = ?report.skipped, "some variables could not be captured");
    }

    let snapshot = Snapshot::new(id, rows);
    debug!(id = %snapshot.id, rows = snapshot.len(), "built snapshot");
    (snapshot, report)
}

/// Write `<id>.json` into `dir`
///
/// The file appears complete or not at all.
pub fn persist(snapshot: &Snapshot, dir: &Path) -> Result<PathBuf, CaptureError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let path = dir.join(format!("{}.{SNAPSHOT_EXTENSION}", snapshot.id));
    write_atomic(&path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "persisted snapshot");
    Ok(path)
}

/// Write through a temporary sibling and rename it into place
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CaptureError> {
    let temp_file = path.with_extension("tmp");
    let result = fs::write(&temp_file, bytes).and_then(|()| fs::rename(&temp_file, path));
    if let Err(source) = result {
        let _ = fs::remove_file(&temp_file);
        return Err(CaptureError::Persist { path: path.to_path_buf(), source });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{with_scopes, Scope};
    use stackfreeze_common::Inspect;

    fn frame_in(file: &Path, line: u32) -> RawFrame<'static> {
        RawFrame { file: file.to_path_buf(), function: "app::step".into(), line, namespace: None }
    }

    #[test]
    fn test_artifact_ids_are_random_hex() {
        let first = new_artifact_id();
        let second = new_artifact_id();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_rows_follow_frame_order_and_carry_locals() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.rs");
        fs::write(&source, "fn a() {}\nfn b() {}\nfn c() {}\n").unwrap();

        let quantity = 3u32;
        let sink = std::io::stdout();
        Scope::new("app::restock").local("quantity", &quantity).local("sink", &sink).run(|| {
            with_scopes(|scopes| {
                let mut inner = frame_in(&source, 2);
                inner.namespace = Some(scopes[0]);
                let frames = vec![inner, frame_in(&source, 3)];

                let (snapshot, report) =
                    build_snapshot("abc", &frames, &SanitizerRules::default(), 2);

                assert_eq!(snapshot.len(), 2);
                assert_eq!(snapshot[0].lineno, 2);
                assert_eq!(snapshot[0].locals_names, vec!["quantity"]);
                assert_eq!(snapshot.local(0, "quantity"), Some(&quantity.inspect()));
                assert!(snapshot[1].locals.is_empty());
                assert_eq!(snapshot[1].context.lines.len(), 3);
                assert_eq!(report.skipped, vec!["sink"]);
                assert!(report.missing_sources.is_empty());
            })
        });
    }

    #[test]
    fn test_missing_source_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("gone.rs");
        let frames = vec![frame_in(&gone, 4), frame_in(&gone, 9)];

        let (snapshot, report) = build_snapshot("abc", &frames, &SanitizerRules::default(), 2);

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].context.is_empty());
        assert_eq!(snapshot[1].context.file, gone);
        assert_eq!(report.missing_sources, vec![gone]);
    }

    #[test]
    fn test_persist_writes_json_named_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = Snapshot::new("feedface", vec![]);

        let path = persist(&snapshot, dir.path()).unwrap();

        assert_eq!(path, dir.path().join("feedface.json"));
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
        assert!(!dir.path().join("feedface.tmp").exists());
    }

    #[test]
    fn test_persist_into_missing_dir_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let snapshot = Snapshot::new("feedface", vec![]);

        let err = persist(&snapshot, &missing).unwrap_err();
        assert!(matches!(err, CaptureError::Persist { .. }));
        assert!(!err.is_config());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
