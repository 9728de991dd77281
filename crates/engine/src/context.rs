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

//! Source context around the active line of a frame
//!
//! Files are read fresh at capture time and decoded lossily, so a source that is not
//! valid UTF-8 still yields a window. Callers decide what an unreadable file means.

use std::{fs, io, path::Path};

use stackfreeze_common::{ContextBlock, ContextLine};

/// Lines shown before and after the active line
pub const DEFAULT_CONTEXT_LINES: usize = 2;

/// Read the source lines around `lineno`
///
/// `lineno` is one-based; the returned lines carry zero-based indices. The window
/// covers `context_lines` lines before the active line and `context_lines` after it,
/// clipped to the file.
pub fn read_context(file: &Path, lineno: u32, context_lines: usize) -> io::Result<ContextBlock> {
    let bytes = fs::read(file)?;
    let source = String::from_utf8_lossy(&bytes);

    let lines: Vec<&str> = source.lines().collect();
    let (start, end) = window(lineno as usize, context_lines, lines.len());

    let lines = (start..end)
        .map(|index| ContextLine { index, text: lines[index].to_string() })
        .collect();
    Ok(ContextBlock::new(file, lines))
}

/// Zero-based half-open line range around a one-based `lineno`
fn window(lineno: usize, context_lines: usize, len: usize) -> (usize, usize) {
    let start = lineno.saturating_sub(context_lines.saturating_add(1));
    let end = lineno.saturating_add(context_lines).min(len);
    (start, end.max(start))
}
