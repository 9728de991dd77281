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

//! Frame filtering by source path
//!
//! A frame is dropped when its path contains any pattern. Defaults cover the capture
//! crates and the toolchain and dependency caches; callers and `STACKFREEZE_IGNORE`
//! can add more.

use std::{env, path::Path};

use stackfreeze_common::env::STACKFREEZE_IGNORE;
use tracing::trace;

use crate::frames::RawFrame;

/// Toolchain, dependency and tooling locations that never hold user frames
pub const DEFAULT_PATTERNS: &[&str] = &[
    "/rustc/",
    "/.rustup/",
    "\\.rustup\\",
    "/.cargo/registry/",
    "\\.cargo\\registry\\",
    "/.cargo/git/",
    "\\.cargo\\git\\",
    "evcxr",
    "lldb_",
    "/gdb/",
];

/// Source directory of a crate, derived from a `file!()` path inside its `src/`
///
/// `crates/engine/src/filter.rs` becomes `crates/engine/src/` with the separator the
/// path itself uses.
pub fn source_dir_pattern(file: &str) -> String {
    let separator = if file.contains('\\') && !file.contains('/') { '\\' } else { '/' };
    let marker = format!("{separator}src{separator}");
    match file.rfind(&marker) {
        Some(index) => file[..index + marker.len()].to_string(),
        None => match file.strip_prefix(&marker[1..]) {
            Some(_) => marker[1..].to_string(),
            None => file.to_string(),
        },
    }
}

/// Case-sensitive substring filter over frame source paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameFilter {
    patterns: Vec<String>,
}

impl Default for FrameFilter {
    fn default() -> Self {
        let mut patterns: Vec<String> = vec![
            source_dir_pattern(file!()),
            source_dir_pattern(stackfreeze_common::SOURCE_FILE),
        ];
        patterns.extend(DEFAULT_PATTERNS.iter().map(|p| p.to_string()));
        Self { patterns }
    }
}

impl FrameFilter {
    /// A filter with exactly the given patterns
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { patterns: patterns.into_iter().map(Into::into).collect() }
    }

    /// Default patterns, the given extras and those from [`STACKFREEZE_IGNORE`]
    pub fn from_env(extra: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let mut filter = Self::default().with_patterns(extra);
        if let Ok(value) = env::var(STACKFREEZE_IGNORE) {
            filter = filter.with_patterns(
                value.split(',').map(str::trim).filter(|p| !p.is_empty()).map(str::to_string),
            );
        }
        filter
    }

    /// Add patterns
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for pattern in patterns {
            let pattern = pattern.into();
            if !pattern.is_empty() && !self.patterns.contains(&pattern) {
                self.patterns.push(pattern);
            }
        }
        self
    }

    /// Active patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether a source path belongs to tooling rather than user code
    pub fn is_noise(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        self.patterns.iter().any(|pattern| path.contains(pattern.as_str()))
    }

    /// Drop noise frames, keeping the order of the rest
    pub fn retain<'s>(&self, frames: Vec<RawFrame<'s>>) -> Vec<RawFrame<'s>> {
        frames
            .into_iter()
            .filter(|frame| {
                let noise = self.is_noise(&frame.file);
                if noise {
                    trace!(file = %frame.file.display(), function = %frame.function, "filtered frame");
                }
                !noise
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use serial_test::serial;

    fn frame(file: &str) -> RawFrame<'static> {
        RawFrame { file: PathBuf::from(file), function: "f".into(), line: 1, namespace: None }
    }

    #[test]
    fn test_source_dir_pattern() {
        assert_eq!(source_dir_pattern("crates/engine/src/filter.rs"), "crates/engine/src/");
        assert_eq!(source_dir_pattern("src/lib.rs"), "src/");
        assert_eq!(
            source_dir_pattern("/home/u/.cargo/registry/src/x/stackfreeze-engine-0.1/src/a/b.rs"),
            "/home/u/.cargo/registry/src/x/stackfreeze-engine-0.1/src/"
        );
        assert_eq!(source_dir_pattern("crates\\engine\\src\\filter.rs"), "crates\\engine\\src\\");
    }

    #[test]
    fn test_default_patterns_drop_tooling() {
        let filter = FrameFilter::default();
        assert!(filter.is_noise(Path::new("/rustc/abc/library/std/src/rt.rs")));
        assert!(filter.is_noise(Path::new("/home/u/.cargo/registry/src/index/serde-1.0/src/de.rs")));
        assert!(filter.is_noise(Path::new("C:\\Users\\u\\.cargo\\registry\\src\\x.rs")));
        assert!(filter.is_noise(Path::new("/home/u/.cargo/git/checkouts/dep/src/lib.rs")));
        assert!(filter.is_noise(Path::new("/tmp/evcxr_build/src/lib.rs")));
        assert!(filter.is_noise(Path::new("/work/stackfreeze/crates/engine/src/core.rs")));
        assert!(!filter.is_noise(Path::new("/work/app/src/main.rs")));
        assert!(!filter.is_noise(Path::new("/work/stackfreeze/crates/engine/tests/capture.rs")));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let filter = FrameFilter::new(["/Vendor/"]);
        assert!(filter.is_noise(Path::new("/w/Vendor/a.rs")));
        assert!(!filter.is_noise(Path::new("/w/vendor/a.rs")));
    }

    #[test]
    fn test_retain_keeps_order_and_is_pure() {
        let filter = FrameFilter::new(["/skip/"]);
        let frames = vec![frame("/a.rs"), frame("/skip/b.rs"), frame("/c.rs")];
        let first: Vec<_> = filter.retain(frames.clone()).into_iter().map(|f| f.file).collect();
        let second: Vec<_> = filter.retain(frames).into_iter().map(|f| f.file).collect();
        assert_eq!(first, vec![PathBuf::from("/a.rs"), PathBuf::from("/c.rs")]);
        assert_eq!(first, second);
    }

    #[test]
    #[serial]
    fn test_env_patterns_are_added() {
        env::set_var(STACKFREEZE_IGNORE, " /generated/ ,,/vendor/");
        let filter = FrameFilter::from_env(["/extra/"]);
        env::remove_var(STACKFREEZE_IGNORE);

        assert!(filter.is_noise(Path::new("/w/generated/a.rs")));
        assert!(filter.is_noise(Path::new("/w/vendor/a.rs")));
        assert!(filter.is_noise(Path::new("/w/extra/a.rs")));
        assert!(!filter.patterns().iter().any(|p| p.is_empty()));
    }
}
