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

use std::path::Path;

use eyre::Result;
use stackfreeze::{print_context, Snapshot};

use super::row_at;

/// Print the source context of one row
pub fn run(artifact: &Path, row: usize) -> Result<()> {
    let snapshot = Snapshot::load(artifact)?;
    let row = row_at(&snapshot, artifact, row)?;

    println!("{} line {}", row.function, row.lineno);
    if row.context.is_empty() {
        println!("{} (source unavailable)", row.context.file.display());
    } else {
        print_context(&row.context);
    }
    Ok(())
}
