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

//! Output directory resolution

use std::{env, path::PathBuf};

use stackfreeze_common::env::STACKFREEZE_NOTEBOOKS_PATH;
use tracing::debug;

use crate::CaptureError;

/// Resolve the directory a capture writes into
///
/// An explicit directory wins over [`STACKFREEZE_NOTEBOOKS_PATH`]. An empty variable
/// counts as unset. The directory must already exist; it is never created.
pub fn resolve_output_dir(explicit: Option<PathBuf>) -> Result<PathBuf, CaptureError> {
    let dir = match explicit {
        Some(dir) => dir,
        None => match env::var_os(STACKFREEZE_NOTEBOOKS_PATH) {
            Some(value) if !value.is_empty() => PathBuf::from(value),
            _ => return Err(CaptureError::MissingOutputDir),
        },
    };

    if !dir.is_dir() {
        return Err(CaptureError::OutputDirNotFound(dir));
    }

    debug!(dir = %dir.display(), "resolved output directory");
    Ok(dir)
}
