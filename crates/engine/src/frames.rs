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

//! Frame enumeration
//!
//! The real call stack decides which frames exist, where they live and which line is
//! active. Registered scopes decide which of those frames carry locals. The two are
//! merged innermost-first: a scope claims the first remaining frame whose source path
//! ends with the scope's `file!()` and whose function name matches. A scope with no
//! such frame (inlined away, no debug info) is kept as a synthesized frame, located at
//! the line the scope was opened on. It is placed just inside the next claimed frame,
//! or after the last located frame when no outer scope is claimed, so it never shows
//! up inner to frames it may have called.

use std::{collections::HashSet, path::Path, path::PathBuf};

use tracing::{debug, trace};

use crate::{
    backtrace::{self, resolve_source_path, BacktraceFrame},
    registry::ScopeView,
};

/// Frames following a matched closure frame that may still belong to its function
const ABSORB_LOOKAHEAD: usize = 8;

/// One frame of the live call stack
///
/// Borrows the registered scope, so it never outlives the capture call.
#[derive(Debug, Clone)]
pub struct RawFrame<'s> {
    /// Source file of the frame
    pub file: PathBuf,
    /// Enclosing function
    pub function: String,
    /// Active line, one-based
    pub line: u32,
    /// Locals lent by a registered scope, if any
    pub namespace: Option<ScopeView<'s>>,
}

impl<'s> RawFrame<'s> {
    fn from_scope(scope: ScopeView<'s>) -> Self {
        Self {
            file: resolve_source_path(scope.file()),
            function: scope.function().to_string(),
            line: scope.line(),
            namespace: Some(scope),
        }
    }
}

/// Enumerate the current call stack, innermost frame first
pub fn enumerate_frames<'s>(scopes: &[ScopeView<'s>]) -> Vec<RawFrame<'s>> {
    merge(backtrace::capture(), scopes)
}

/// Merge backtrace symbols with registered scopes
pub fn merge<'s>(symbols: Vec<BacktraceFrame>, scopes: &[ScopeView<'s>]) -> Vec<RawFrame<'s>> {
    let located: Vec<(PathBuf, String, u32)> = symbols
        .into_iter()
        .filter_map(|symbol| match (symbol.file, symbol.line) {
            (Some(file), Some(line)) => Some((resolve_source_path(&file), symbol.function, line)),
            _ => None,
        })
        .collect();

    if located.is_empty() {
        debug!(scopes = scopes.len(), "no located frames, using registered scopes only");
        return scopes.iter().copied().map(RawFrame::from_scope).collect();
    }

    let mut frames = Vec::with_capacity(located.len() + scopes.len());
    let mut absorbed = HashSet::new();
    let mut pending = Vec::new();
    let mut cursor = 0;

    let plain = |index: usize, frames: &mut Vec<RawFrame<'s>>, absorbed: &HashSet<usize>| {
        if !absorbed.contains(&index) {
            let (file, function, line) = &located[index];
            frames.push(RawFrame {
                file: file.clone(),
                function: function.clone(),
                line: *line,
                namespace: None,
            });
        }
    };

    for scope in scopes {
        let found = (cursor..located.len()).find(|&index| {
            !absorbed.contains(&index) && {
                let (file, function, _) = &located[index];
                claims(file, function, scope)
            }
        });

        // An unmatched scope sits somewhere between the previous claim and the next one
        let Some(index) = found else {
            trace!(function = scope.function(), "scope has no backtrace frame, synthesizing");
            pending.push(*scope);
            continue;
        };

        for skipped in cursor..index {
            plain(skipped, &mut frames, &absorbed);
        }
        frames.extend(pending.drain(..).map(RawFrame::from_scope));

        let (file, function, line) = &located[index];
        frames.push(RawFrame {
            file: file.clone(),
            function: scope.function().to_string(),
            line: *line,
            namespace: Some(*scope),
        });

        // The scope body runs in a closure; the named function's own frame follows it
        if is_closure(function) {
            let owner = base_name(function);
            let end = (index + 1 + ABSORB_LOOKAHEAD).min(located.len());
            if let Some(outer) = (index + 1..end).find(|&candidate| {
                let (other_file, other_function, _) = &located[candidate];
                other_file == file && base_name(other_function) == owner
            }) {
                absorbed.insert(outer);
            }
        }

        cursor = index + 1;
    }

    for index in cursor..located.len() {
        plain(index, &mut frames, &absorbed);
    }
    frames.extend(pending.into_iter().map(RawFrame::from_scope));

    debug!(frames = frames.len(), scopes = scopes.len(), "enumerated frames");
    frames
}

/// Whether a backtrace frame belongs to `scope`
fn claims(file: &Path, function: &str, scope: &ScopeView<'_>) -> bool {
    file.ends_with(scope.file()) && last_segment(base_name(function)) == last_segment(scope.function())
}

fn is_closure(function: &str) -> bool {
    function.ends_with("::{{closure}}")
}

/// Function path without trailing closure segments
fn base_name(function: &str) -> &str {
    let mut name = function;
    while let Some(outer) = name.strip_suffix("::{{closure}}") {
        name = outer;
    }
    name
}

/// Last path segment, ignoring `::` inside `<..>` qualifiers
fn last_segment(path: &str) -> &str {
    let mut depth = 0usize;
    let bytes = path.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && bytes.get(i + 1) == Some(&b':') => {
                start = i + 2;
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    &path[start..]
}
