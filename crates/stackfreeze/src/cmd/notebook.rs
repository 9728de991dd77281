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

use std::path::{Path, PathBuf};

use eyre::Result;
use stackfreeze::Snapshot;
use stackfreeze_engine::{build_notebook, search_path_from_env, write_notebook};
use tracing::info;

/// Rebuild the notebook of `artifact` and write it next to the artifact
pub fn run(artifact: &Path, search_path: Vec<PathBuf>, aggregate: bool) -> Result<()> {
    let snapshot = Snapshot::load(artifact)?;
    let search_path = if search_path.is_empty() { search_path_from_env() } else { search_path };

    let dir = match artifact.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let notebook = build_notebook(&snapshot, artifact, &search_path, aggregate);
    let path = write_notebook(&notebook, &dir, &snapshot.id)?;
    info!(cells = notebook.cells.len(), "regenerated notebook");

    println!("notebook: {}", path.display());
    Ok(())
}
