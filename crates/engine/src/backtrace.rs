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

//! Parsing of the standard library's backtrace rendering
//!
//! `std::backtrace::Backtrace` exposes frames only through its `Display` output. The
//! full (`{:#}`) form looks like this:
//!
//! ```text
//! stack backtrace:
//!    0:     0x55d4c1a2b3c4 - app::audit::h0123456789abcdef
//!                                at /work/app/src/main.rs:41:9
//!                            app::restock::{{closure}}
//!                                at /work/app/src/main.rs:30:13
//!    1:     0x55d4c1a2b400 - std::rt::lang_start::h89abcdef01234567
//! ```
//!
//! Each numbered entry is a physical frame; unnumbered symbol lines are frames inlined
//! into it. Symbols without an `at` line have no debug info.

use std::{
    backtrace::Backtrace,
    env,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

static SYMBOL_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+):\s+(?:0x[0-9a-fA-F]+ - )?(.+)$").expect("valid symbol pattern")
});

static SYMBOL_HASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("valid hash pattern"));

/// One symbol of a rendered backtrace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktraceFrame {
    /// Demangled symbol without the trailing hash
    pub function: String,
    /// Source file as printed
    pub file: Option<String>,
    /// One-based line
    pub line: Option<u32>,
    /// Whether the symbol was inlined into the preceding numbered frame
    pub inlined: bool,
}

impl BacktraceFrame {
    /// Whether the symbol has a usable source location
    pub fn is_located(&self) -> bool {
        self.file.is_some() && self.line.is_some()
    }
}

/// Capture the current thread's backtrace, innermost symbol first
pub fn capture() -> Vec<BacktraceFrame> {
    let rendered = format!("{:#}", Backtrace::force_capture());
    let frames = parse(&rendered);
    debug!(symbols = frames.len(), "captured backtrace");
    frames
}

/// Parse the full rendering of a `std::backtrace::Backtrace`
pub fn parse(rendered: &str) -> Vec<BacktraceFrame> {
    let mut frames: Vec<BacktraceFrame> = Vec::new();

    for line in rendered.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed == "stack backtrace:" {
            continue;
        }

        if let Some(location) = trimmed.strip_prefix("at ") {
            match (frames.last_mut(), split_location(location)) {
                (Some(frame), Some((file, line))) if frame.file.is_none() => {
                    frame.file = Some(file.to_string());
                    frame.line = Some(line);
                }
                _ => trace!(line = trimmed, "ignoring location line"),
            }
            continue;
        }

        let (function, inlined) = match SYMBOL_LINE.captures(line) {
            Some(caps) => (caps[2].to_string(), false),
            // Notes such as "note: Some details are omitted" end the trace
            None if trimmed.starts_with("note:") => break,
            None => (trimmed.to_string(), true),
        };
        let function = SYMBOL_HASH.replace(function.trim(), "").into_owned();
        frames.push(BacktraceFrame { function, file: None, line: None, inlined });
    }

    frames
}

/// Split `path:line[:col]`, parsing from the right so drive letters survive
fn split_location(location: &str) -> Option<(&str, u32)> {
    let (head, last) = location.rsplit_once(':')?;
    let last: u32 = last.parse().ok()?;
    match head.rsplit_once(':') {
        Some((path, line)) if !path.is_empty() => match line.parse::<u32>() {
            Ok(line) => Some((path, line)),
            Err(_) => Some((head, last)),
        },
        _ => Some((head, last)),
    }
}

/// Turn a printed source path into an absolute one where possible
///
/// Paths printed relative to the working directory (`./src/main.rs`) are joined with
/// it. Other relative paths, as recorded by rustc for workspace members, are looked
/// up against each ancestor of the working directory. Anything not found is kept
/// as printed.
pub fn resolve_source_path(printed: &str) -> PathBuf {
    resolve_source_path_from(printed, env::current_dir().ok().as_deref())
}

pub(crate) fn resolve_source_path_from(printed: &str, cwd: Option<&Path>) -> PathBuf {
    let path = Path::new(printed);
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let Some(cwd) = cwd else {
        return path.to_path_buf();
    };

    if let Some(rest) = printed.strip_prefix("./").or_else(|| printed.strip_prefix(".\\")) {
        return cwd.join(rest);
    }

    cwd.ancestors()
        .map(|ancestor| ancestor.join(path))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| path.to_path_buf())
}
