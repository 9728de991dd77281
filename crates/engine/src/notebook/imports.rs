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

//! Import aggregation
//!
//! Collects the single-line `use` and `extern crate` statements of the captured source
//! files so the notebook can name the same types. Crate-relative paths are left out:
//! they only resolve inside the crate that declared them.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:pub(?:\([^)]*\))?\s+)?((?:use|extern\s+crate)\s+[^;{}]*(?:\{[^;]*\})?[^;{}]*;)\s*$")
        .expect("valid import pattern")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

const LOCAL_PREFIXES: &[&str] = &["crate::", "self::", "super::", "crate", "self", "super"];

/// Single-line imports of one source text, normalized
pub fn imports_in(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| IMPORT_LINE.captures(line))
        .map(|caps| WHITESPACE.replace_all(&caps[1], " ").into_owned())
        .filter(|statement| !is_local(statement))
        .collect()
}

/// Whether an import only resolves inside its own crate
fn is_local(statement: &str) -> bool {
    let path = statement
        .strip_prefix("use ")
        .or_else(|| statement.strip_prefix("extern crate "))
        .unwrap_or(statement)
        .trim_start_matches("::");
    LOCAL_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix).is_some_and(|rest| {
            prefix.ends_with("::") || rest.starts_with([';', ' ', ':', '{'])
        })
    })
}

/// Distinct imports of all `files`, sorted, minus `exclude`
///
/// Files that cannot be read are skipped.
pub fn aggregate_imports<'a>(
    files: impl IntoIterator<Item = &'a Path>,
    exclude: &[&str],
) -> Vec<String> {
    let files: BTreeSet<PathBuf> = files.into_iter().map(Path::to_path_buf).collect();
    let mut imports = BTreeSet::new();

    for file in &files {
        match fs::read(file) {
            Ok(bytes) => imports.extend(imports_in(&String::from_utf8_lossy(&bytes))),
            Err(err) => debug!(file = %file.display(), %err, "skipping imports of unreadable file"),
        }
    }

    imports.into_iter().filter(|statement| !exclude.contains(&statement.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_imports_are_collected() {
        let source = "\
use std::collections::HashMap;
pub use serde::{Deserialize, Serialize};
pub(crate) use   tracing::info;
extern crate alloc;
use std::{
    fs,
};
fn main() { use std::io; }
";
        assert_eq!(
            imports_in(source),
            vec![
                "use std::collections::HashMap;",
                "use serde::{Deserialize, Serialize};",
                "use tracing::info;",
                "extern crate alloc;",
            ]
        );
    }

    #[test]
    fn test_crate_relative_imports_are_dropped() {
        let source = "\
use crate::orders::Order;
use self::inner::Helper;
use super::*;
use ::std::fmt;
use selfish::Thing;
use crate_utils::x;
";
        assert_eq!(
            imports_in(source),
            vec!["use ::std::fmt;", "use selfish::Thing;", "use crate_utils::x;"]
        );
    }

    #[test]
    fn test_aggregate_dedups_sorts_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.rs");
        fs::write(&a, "use std::fs;\nuse stackfreeze::{print_context, Snapshot};\n").unwrap();
        fs::write(&b, "use std::fs;\nuse anyhow::Result;\n").unwrap();
        let gone = dir.path().join("gone.rs");

        let imports = aggregate_imports(
            [a.as_path(), b.as_path(), gone.as_path(), a.as_path()],
            &["use stackfreeze::{print_context, Snapshot};"],
        );

        assert_eq!(imports, vec!["use anyhow::Result;", "use std::fs;"]);
    }
}
