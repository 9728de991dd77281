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

//! Subcommand implementations

use std::path::Path;

use eyre::{eyre, Result};
use stackfreeze::{Snapshot, SnapshotRow};

pub mod context;
pub mod demo;
pub mod locals;
pub mod notebook;
pub mod show;

/// Row `index` of `snapshot`, or an error naming the valid range
pub fn row_at<'a>(snapshot: &'a Snapshot, artifact: &Path, index: usize) -> Result<&'a SnapshotRow> {
    snapshot.row(index).ok_or_else(|| {
        eyre!(
            "{} has {} rows, no row {index}",
            artifact.display(),
            snapshot.len()
        )
    })
}
