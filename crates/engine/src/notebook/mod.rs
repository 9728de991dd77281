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

//! Companion notebook emission
//!
//! Every snapshot gets an nbformat v4 notebook for the evcxr Rust kernel that reloads
//! it and walks through its rows. The cell layout is fixed:
//!
//! 1. a markdown title,
//! 2. `:dep` lines for the search path,
//! 3. the stackfreeze dependency and its imports,
//! 4. the imports found in the captured source files (possibly empty),
//! 5. the snapshot reload followed by its summary,
//! 6. per row: the context display, the locals, and one binding per local.
//!
//! Rows are addressed by position, so the notebook is only valid next to the snapshot
//! it was generated for.

/// Import aggregation over captured source files
pub mod imports;
/// Notebook search path and `:dep` lines
pub mod search_path;

pub use imports::aggregate_imports;
pub use search_path::{crate_name, dep_line, search_path_from_env};

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use stackfreeze_common::Snapshot;
use tracing::debug;

use crate::{snapshot::write_atomic, CaptureError};

/// File extension of companion notebooks
pub const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Title of the first cell
pub const NOTEBOOK_TITLE: &str = "# Generated by stackfreeze";

/// Imports every notebook starts from
pub const FIXED_IMPORTS: &[&str] = &["use stackfreeze::{print_context, Snapshot};"];

/// Cells before the per-row cells
pub const HEADER_CELLS: usize = 5;

/// Cells emitted for each snapshot row
pub const CELLS_PER_ROW: usize = 3;

/// An nbformat v4 notebook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Cells in display order
    pub cells: Vec<Cell>,
    /// Kernel and language information
    pub metadata: NotebookMetadata,
    /// Major format version
    pub nbformat: u32,
    /// Minor format version
    pub nbformat_minor: u32,
}

impl Notebook {
    /// An empty notebook for the evcxr kernel
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells, metadata: NotebookMetadata::default(), nbformat: 4, nbformat_minor: 4 }
    }
}

/// Notebook-level metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookMetadata {
    /// Kernel to start
    pub kernelspec: KernelSpec,
    /// Language of the code cells
    pub language_info: LanguageInfo,
}

impl Default for NotebookMetadata {
    fn default() -> Self {
        Self {
            kernelspec: KernelSpec {
                display_name: "Rust".into(),
                language: "rust".into(),
                name: "rust".into(),
            },
            language_info: LanguageInfo {
                codemirror_mode: "rust".into(),
                file_extension: ".rs".into(),
                mimetype: "text/rust".into(),
                name: "Rust".into(),
                pygment_lexer: "rust".into(),
                version: String::new(),
            },
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub display_name: String,
    pub language: String,
    pub name: String,
}

#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub codemirror_mode: String,
    pub file_extension: String,
    pub mimetype: String,
    pub name: String,
    pub pygment_lexer: String,
    pub version: String,
}

/// A notebook cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    /// Rendered text
    Markdown {
        /// Cell metadata
        metadata: Map<String, JsonValue>,
        /// Source lines, each but the last ending in a newline
        source: Vec<String>,
    },
    /// Code run by the kernel
    Code {
        /// Always unset for generated cells
        execution_count: Option<u32>,
        /// Cell metadata
        metadata: Map<String, JsonValue>,
        /// Always empty for generated cells
        outputs: Vec<JsonValue>,
        /// Source lines, each but the last ending in a newline
        source: Vec<String>,
    },
}

impl Cell {
    /// A markdown cell
    pub fn markdown(text: &str) -> Self {
        Self::Markdown { metadata: Map::new(), source: split_source(text) }
    }

    /// A code cell
    pub fn code(text: &str) -> Self {
        Self::Code {
            execution_count: None,
            metadata: Map::new(),
            outputs: Vec::new(),
            source: split_source(text),
        }
    }

    /// Whether this is a code cell
    pub fn is_code(&self) -> bool {
        matches!(self, Self::Code { .. })
    }

    /// The cell's source as one string
    pub fn text(&self) -> String {
        match self {
            Self::Markdown { source, .. } | Self::Code { source, .. } => source.concat(),
        }
    }
}

fn split_source(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}

const RESERVED_PATH_SEGMENTS: &[&str] = &["self", "Self", "super", "crate"];

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "do",
    "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl", "in",
    "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "static", "struct", "trait", "true", "try", "type", "typeof", "unsafe", "unsized",
    "use", "virtual", "where", "while", "yield",
];

/// A valid Rust binding name for a captured local
///
/// `self` becomes `self_`, keywords become raw identifiers, other characters that
/// cannot appear in an identifier become `_`.
pub fn binding_ident(name: &str) -> String {
    if RESERVED_PATH_SEGMENTS.contains(&name) {
        return format!("{name}_");
    }
    if KEYWORDS.contains(&name) {
        return format!("r#{name}");
    }

    let mut ident: String =
        name.chars().map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }).collect();
    if ident.chars().all(|c| c == '_') {
        ident.push_str("var");
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Binding names for the locals of one row, in order and pairwise distinct
///
/// Names that map to an identifier already taken get a `_2`, `_3`, ... suffix.
pub fn binding_idents<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(names.len());
    names
        .iter()
        .map(|name| {
            let ident = binding_ident(name.as_ref());
            let mut candidate = ident.clone();
            let mut suffix = 2;
            while taken.contains(&candidate) {
                // Raw identifiers stop being keywords once suffixed
                candidate = format!("{}_{suffix}", ident.trim_start_matches("r#"));
                suffix += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}

/// Build the companion notebook of `snapshot`, persisted as `snapshot_file`
///
/// Source files of the rows are scanned for imports unless `aggregate` is false, in
/// which case the imports cell stays empty.
pub fn build_notebook(
    snapshot: &Snapshot,
    snapshot_file: &Path,
    search_path: &[PathBuf],
    aggregate: bool,
) -> Notebook {
    let mut cells = Vec::with_capacity(HEADER_CELLS + CELLS_PER_ROW * snapshot.len());

    cells.push(Cell::markdown(NOTEBOOK_TITLE));

    let deps: Vec<String> = search_path.iter().map(|dir| dep_line(dir)).collect();
    cells.push(Cell::code(&deps.join("\n")));

    let mut fixed = vec![format!(":dep stackfreeze = {{ version = \"{}\" }}", env!("CARGO_PKG_VERSION"))];
    fixed.extend(FIXED_IMPORTS.iter().map(|import| import.to_string()));
    cells.push(Cell::code(&fixed.join("\n")));

    let user_imports = if aggregate {
        aggregate_imports(snapshot.rows().iter().map(|row| row.file_path.as_path()), FIXED_IMPORTS)
    } else {
        Vec::new()
    };
    cells.push(Cell::code(&user_imports.join("\n")));

    // The notebook sits next to the snapshot, so the file name is enough
    let file_name = snapshot_file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| snapshot_file.to_string_lossy().into_owned());
    cells.push(Cell::code(&format!(
        "let snapshot = Snapshot::load({file_name:?}).expect(\"snapshot is readable\");\nsnapshot.summary()"
    )));

    for (index, row) in snapshot.rows().iter().enumerate() {
        cells.push(Cell::code(&format!("print_context(&snapshot[{index}].context);")));
        cells.push(Cell::code(&format!("snapshot[{index}].locals.clone()")));

        let bindings: Vec<String> = row
            .locals_names
            .iter()
            .zip(binding_idents(&row.locals_names))
            .map(|(name, ident)| {
                format!("let {ident} = snapshot.local({index}, {name:?}).cloned().unwrap_or_default();")
            })
            .collect();
        let bindings = if bindings.is_empty() {
            format!("// no locals captured in {}", row.function)
        } else {
            bindings.join("\n")
        };
        cells.push(Cell::code(&bindings));
    }

    debug!(cells = cells.len(), rows = snapshot.len(), "built notebook");
    Notebook::new(cells)
}

/// Write `<id>.ipynb` into `dir`
pub fn write_notebook(notebook: &Notebook, dir: &Path, id: &str) -> Result<PathBuf, CaptureError> {
    let bytes = serde_json::to_vec_pretty(notebook)?;
    let path = dir.join(format!("{id}.{NOTEBOOK_EXTENSION}"));
    write_atomic(&path, &bytes)?;
    debug!(path = %path.display(), "wrote notebook");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use stackfreeze_common::{ContextBlock, Locals, SnapshotRow, Value};

    fn row(file: &Path, function: &str, locals: &[(&str, Value)]) -> SnapshotRow {
        let locals: Locals = locals.iter().cloned().collect();
        SnapshotRow::new(file, function, 1, locals, ContextBlock::empty(file))
    }

    fn three_row_snapshot(dir: &Path) -> Snapshot {
        let source = dir.join("app.rs");
        fs::write(&source, "use std::fs;\nuse crate::x;\nfn main() {}\n").unwrap();
        Snapshot::new(
            "0123456789abcdef0123456789abcdef",
            vec![
                row(&source, "app::audit", &[("total", Value::UInt(3)), ("self", Value::Null)]),
                row(&source, "app::restock", &[("type", Value::Bool(true))]),
                row(&source, "app::main", &[]),
            ],
        )
    }

    #[test]
    fn test_cell_layout() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = three_row_snapshot(dir.path());
        let file = dir.path().join(format!("{}.json", snapshot.id));

        let notebook = build_notebook(&snapshot, &file, &[dir.path().to_path_buf()], true);

        assert_eq!(notebook.cells.len(), HEADER_CELLS + CELLS_PER_ROW * 3);
        assert!(!notebook.cells[0].is_code());
        assert_eq!(notebook.cells[0].text(), NOTEBOOK_TITLE);
        assert!(notebook.cells[1].text().starts_with(":dep "));
        assert!(notebook.cells[2].text().ends_with(FIXED_IMPORTS[0]));
        assert_eq!(notebook.cells[3].text(), "use std::fs;");
        assert_eq!(
            notebook.cells[4].text(),
            "let snapshot = Snapshot::load(\"0123456789abcdef0123456789abcdef.json\")\
             .expect(\"snapshot is readable\");\nsnapshot.summary()"
        );

        for index in 0..3 {
            let base = HEADER_CELLS + CELLS_PER_ROW * index;
            assert_eq!(
                notebook.cells[base].text(),
                format!("print_context(&snapshot[{index}].context);")
            );
            assert_eq!(notebook.cells[base + 1].text(), format!("snapshot[{index}].locals.clone()"));
        }
        assert_eq!(
            notebook.cells[7].text(),
            "let total = snapshot.local(0, \"total\").cloned().unwrap_or_default();\n\
             let self_ = snapshot.local(0, \"self\").cloned().unwrap_or_default();"
        );
        assert!(notebook.cells[10].text().starts_with("let r#type = "));
        assert!(notebook.cells[13].text().starts_with("//"));
    }

    #[test]
    fn test_imports_cell_is_present_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = three_row_snapshot(dir.path());
        let notebook = build_notebook(&snapshot, Path::new("x.json"), &[], false);

        assert_eq!(notebook.cells.len(), HEADER_CELLS + CELLS_PER_ROW * 3);
        assert_eq!(notebook.cells[1].text(), "");
        assert_eq!(notebook.cells[3].text(), "");
    }

    #[test]
    fn test_binding_ident() {
        assert_eq!(binding_ident("total"), "total");
        assert_eq!(binding_ident("self"), "self_");
        assert_eq!(binding_ident("Self"), "Self_");
        assert_eq!(binding_ident("match"), "r#match");
        assert_eq!(binding_ident("2fa"), "_2fa");
        assert_eq!(binding_ident("a-b.c"), "a_b_c");
        assert_eq!(binding_ident("$"), "_var");
    }

    #[test]
    fn test_colliding_locals_get_distinct_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("app.rs");
        let snapshot = Snapshot::new(
            "0123456789abcdef0123456789abcdef",
            vec![row(
                &source,
                "app::Cart::merge",
                &[
                    ("self", Value::Null),
                    ("self_", Value::Null),
                    ("a-b", Value::UInt(1)),
                    ("a_b", Value::UInt(2)),
                    ("type", Value::Bool(true)),
                ],
            )],
        );

        let notebook = build_notebook(&snapshot, Path::new("s.json"), &[], false);

        assert_eq!(
            notebook.cells[HEADER_CELLS + 2].text(),
            "let self_ = snapshot.local(0, \"self\").cloned().unwrap_or_default();\n\
             let self__2 = snapshot.local(0, \"self_\").cloned().unwrap_or_default();\n\
             let a_b = snapshot.local(0, \"a-b\").cloned().unwrap_or_default();\n\
             let a_b_2 = snapshot.local(0, \"a_b\").cloned().unwrap_or_default();\n\
             let r#type = snapshot.local(0, \"type\").cloned().unwrap_or_default();"
        );
        assert_eq!(binding_idents(&["type", "r#type", "type"]), vec!["r#type", "r_type", "type_2"]);
    }

    #[test]
    fn test_write_notebook_is_nbformat_v4() {
        let dir = tempfile::tempdir().unwrap();
        let snapshot = three_row_snapshot(dir.path());
        let notebook = build_notebook(&snapshot, Path::new("s.json"), &[], true);

        let path = write_notebook(&notebook, dir.path(), &snapshot.id).unwrap();
        assert_eq!(path.extension().unwrap(), NOTEBOOK_EXTENSION);

        let json: JsonValue = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(json["nbformat"], 4);
        assert_eq!(json["metadata"]["kernelspec"]["name"], "rust");
        assert_eq!(json["cells"][0]["cell_type"], "markdown");
        assert_eq!(json["cells"][1]["cell_type"], "code");
        assert!(json["cells"][1]["execution_count"].is_null());

        let reloaded: Notebook = serde_json::from_value(json).unwrap();
        assert_eq!(reloaded, notebook);
    }
}
