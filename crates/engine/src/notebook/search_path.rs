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

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use stackfreeze_common::env::{CARGO_MANIFEST_DIR, STACKFREEZE_PATH};
use tracing::debug;

/// Search path from the environment
///
/// Entries of [`STACKFREEZE_PATH`] in order, then [`CARGO_MANIFEST_DIR`] when set and
/// not already listed.
pub fn search_path_from_env() -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = env::var_os(STACKFREEZE_PATH)
        .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default();

    if let Some(manifest_dir) = env::var_os(CARGO_MANIFEST_DIR).filter(|v| !v.is_empty()) {
        let manifest_dir = PathBuf::from(manifest_dir);
        if !entries.contains(&manifest_dir) {
            entries.push(manifest_dir);
        }
    }

    entries
}

/// Package name of the crate at `dir`, falling back to the directory name
pub fn crate_name(dir: &Path) -> String {
    package_name(dir).unwrap_or_else(|| {
        dir.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string())
    })
}

fn package_name(dir: &Path) -> Option<String> {
    let manifest = dir.join("Cargo.toml");
    let content = fs::read_to_string(&manifest).ok()?;
    let table: toml::Table = match toml::from_str(&content) {
        Ok(table) => table,
        Err(err) => {
            debug!(manifest = %manifest.display(), %err, "unparsable manifest");
            return None;
        }
    };
    table.get("package")?.get("name")?.as_str().map(str::to_string)
}

/// `:dep` line loading the crate at `dir` into the notebook kernel
pub fn dep_line(dir: &Path) -> String {
    let path = toml::Value::String(dir.to_string_lossy().into_owned());
    format!(":dep {} = {{ path = {path} }}", crate_name(dir))
}
