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

//! Persisted snapshot records
//!
//! A [`Snapshot`] is the only artifact a capture persists: one [`SnapshotRow`] per
//! retained frame, innermost frame first. Notebook cells address rows by position, so
//! the row order must never change after creation.

use std::{
    fmt, fs,
    ops::Index,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::types::{FieldMap, Value};

/// Sanitized locals of one frame, in the order they were found
pub type Locals = FieldMap;

/// One source line of a [`ContextBlock`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    /// Zero-based absolute line index within the file
    pub index: usize,
    /// Raw line text without the trailing newline
    pub text: String,
}

/// Source lines around a frame's active line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBlock {
    /// Source file the lines were read from
    pub file: PathBuf,
    /// Lines in file order
    pub lines: Vec<ContextLine>,
}

impl ContextBlock {
    /// Create a block from already selected lines
    pub fn new(file: impl Into<PathBuf>, lines: Vec<ContextLine>) -> Self {
        Self { file: file.into(), lines }
    }

    /// A block for a source file that could not be read
    pub fn empty(file: impl Into<PathBuf>) -> Self {
        Self::new(file, Vec::new())
    }

    /// Whether no lines are available
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for ContextBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        for line in &self.lines {
            write!(f, "\n{}: {}", line.index, line.text)?;
        }
        Ok(())
    }
}

/// Render a context block as the file path followed by numbered lines
pub fn format_context(context: &ContextBlock) -> String {
    context.to_string()
}

/// Print a context block to stdout
///
/// Called from generated notebook cells; the signature is part of the notebook contract.
pub fn print_context(context: &ContextBlock) {
    println!("{context}");
}

/// The persisted record of one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    /// Source file of the frame
    pub file_path: PathBuf,
    /// Enclosing function
    pub function: String,
    /// Active line, one-based
    pub lineno: u32,
    /// Names of the captured locals, in capture order
    pub locals_names: Vec<String>,
    /// Captured locals
    pub locals: Locals,
    /// Source lines around `lineno`
    pub context: ContextBlock,
}

impl SnapshotRow {
    /// Create a row; `locals_names` is derived from `locals`
    pub fn new(
        file_path: impl Into<PathBuf>,
        function: impl Into<String>,
        lineno: u32,
        locals: Locals,
        context: ContextBlock,
    ) -> Self {
        let locals_names = locals.keys().map(str::to_string).collect();
        Self {
            file_path: file_path.into(),
            function: function.into(),
            lineno,
            locals_names,
            locals,
            context,
        }
    }
}

/// Ordered frame records of one capture, innermost frame first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Random artifact base name shared by the snapshot and its notebook
    pub id: String,
    /// When the capture happened
    pub created_at: DateTime<Utc>,
    rows: Vec<SnapshotRow>,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(id: impl Into<String>, rows: Vec<SnapshotRow>) -> Self {
        Self { id: id.into(), created_at: Utc::now(), rows }
    }

    /// Load a persisted snapshot
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).wrap_err_with(|| format!("failed to read {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .wrap_err_with(|| format!("{} is not a stackfreeze snapshot", path.display()))
    }

    /// All rows
    pub fn rows(&self) -> &[SnapshotRow] {
        &self.rows
    }

    /// Rows innermost first
    pub fn iter(&self) -> std::slice::Iter<'_, SnapshotRow> {
        self.rows.iter()
    }

    /// Row at `index`
    pub fn row(&self, index: usize) -> Option<&SnapshotRow> {
        self.rows.get(index)
    }

    /// A captured local of the row at `index`
    pub fn local(&self, index: usize, name: &str) -> Option<&Value> {
        self.row(index)?.locals.get(name)
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no frame was retained
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The file path / function / line / locals overview shown after a reload
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            rows: self
                .rows
                .iter()
                .enumerate()
                .map(|(index, row)| SummaryRow {
                    index,
                    file_path: row.file_path.clone(),
                    function: row.function.clone(),
                    lineno: row.lineno,
                    locals_names: row.locals_names.clone(),
                })
                .collect(),
        }
    }
}

impl Index<usize> for Snapshot {
    type Output = SnapshotRow;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a SnapshotRow;
    type IntoIter = std::slice::Iter<'a, SnapshotRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Tabular overview of a snapshot
#[derive(Clone, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// One entry per snapshot row
    pub rows: Vec<SummaryRow>,
}

/// One line of a [`SnapshotSummary`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    /// Row position in the snapshot
    pub index: usize,
    /// Source file of the frame
    pub file_path: PathBuf,
    /// Enclosing function
    pub function: String,
    /// Active line
    pub lineno: u32,
    /// Captured local names
    pub locals_names: Vec<String>,
}

impl fmt::Display for SnapshotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3}  {:<40}  {:>6}  {:<48}  locals", "#", "function", "lineno", "file_path")?;
        for row in &self.rows {
            write!(
                f,
                "\n{:>3}  {:<40}  {:>6}  {:<48}  [{}]",
                row.index,
                row.function,
                row.lineno,
                row.file_path.display(),
                row.locals_names.join(", ")
            )?;
        }
        Ok(())
    }
}

// Notebook kernels render the last expression of a cell with `Debug`.
impl fmt::Debug for SnapshotSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let mut locals = Locals::new();
        locals.insert("total", Value::UInt(42));
        locals.insert("label", Value::Str("restock".into()));

        let context = ContextBlock::new(
            "/work/app/src/lib.rs",
            vec![
                ContextLine { index: 8, text: "    let total = 42;".into() },
                ContextLine { index: 9, text: "    freeze()?;".into() },
            ],
        );
        let row = SnapshotRow::new("/work/app/src/lib.rs", "app::audit", 10, locals, context);
        Snapshot::new("0123456789abcdef0123456789abcdef", vec![row])
    }

    #[test]
    fn test_context_display_numbers_lines() {
        let snapshot = sample_snapshot();
        assert_eq!(
            format_context(&snapshot[0].context),
            "/work/app/src/lib.rs\n8:     let total = 42;\n9:     freeze()?;"
        );
    }

    #[test]
    fn test_empty_context_renders_path_only() {
        let context = ContextBlock::empty("/gone.rs");
        assert!(context.is_empty());
        assert_eq!(format_context(&context), "/gone.rs");
    }

    #[test]
    fn test_iter_walks_rows_innermost_first() {
        let inner = SnapshotRow::new(
            "/work/app/src/lib.rs",
            "app::audit",
            10,
            Locals::new(),
            ContextBlock::empty("/work/app/src/lib.rs"),
        );
        let outer = SnapshotRow::new(
            "/work/app/src/main.rs",
            "app::main",
            3,
            Locals::new(),
            ContextBlock::empty("/work/app/src/main.rs"),
        );
        let snapshot = Snapshot::new("0123456789abcdef0123456789abcdef", vec![inner, outer]);

        let functions: Vec<_> = snapshot.iter().map(|row| row.function.as_str()).collect();
        assert_eq!(functions, vec!["app::audit", "app::main"]);
        assert!(snapshot.iter().eq(snapshot.rows()));
        assert_eq!(snapshot.iter().count(), snapshot.len());
    }

    #[test]
    fn test_row_derives_local_names() {
        let snapshot = sample_snapshot();
        assert_eq!(snapshot[0].locals_names, vec!["total", "label"]);
        assert_eq!(snapshot.local(0, "total"), Some(&Value::UInt(42)));
        assert_eq!(snapshot.local(0, "missing"), None);
        assert_eq!(snapshot.local(3, "total"), None);
    }

    #[test]
    fn test_reserialization_is_byte_identical() {
        let snapshot = sample_snapshot();
        let first = serde_json::to_vec(&snapshot).unwrap();
        let reloaded: Snapshot = serde_json::from_slice(&first).unwrap();
        let second = serde_json::to_vec(&reloaded).unwrap();

        assert_eq!(reloaded, snapshot);
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let snapshot = sample_snapshot();
        fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);
        assert!(Snapshot::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_summary_lists_every_row() {
        let rendered = sample_snapshot().summary().to_string();
        assert!(rendered.contains("app::audit"));
        assert!(rendered.contains("[total, label]"));
        assert_eq!(rendered.lines().count(), 2);
    }
}
