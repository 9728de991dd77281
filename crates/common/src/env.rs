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

//! Environment variable name constants for stackfreeze configuration.
//!
//! This module provides constant string names for all environment variables read by
//! stackfreeze. These constants ensure consistency across the codebase and provide a
//! single source of truth for environment variable names.
//!
//! # Environment Variables
//!
//! ## Capture Configuration
//! - [`STACKFREEZE_NOTEBOOKS_PATH`] - Default output directory for snapshots and notebooks
//! - [`STACKFREEZE_PATH`] - Crate directories the companion notebook should load
//! - [`STACKFREEZE_IGNORE`] - Extra path patterns for frames that should never be captured
//!
//! ## Process Information
//! - [`CARGO_MANIFEST_DIR`] - Set by cargo for `cargo run` / `cargo test` processes

/// Environment variable supplying the default output directory.
///
/// A capture writes two files into this directory: the snapshot artifact
/// (`<id>.json`) and the companion notebook (`<id>.ipynb`).
///
/// # Default
///
/// There is no default. When the caller does not pass an output directory and this
/// variable is unset, the capture fails with a configuration error before touching the
/// stack.
///
/// # Examples
///
/// ```bash
/// STACKFREEZE_NOTEBOOKS_PATH=$HOME/frozen cargo run
/// ```
pub const STACKFREEZE_NOTEBOOKS_PATH: &str = "STACKFREEZE_NOTEBOOKS_PATH";

/// Environment variable listing crate directories for the companion notebook.
///
/// Uses the platform path-list syntax (`:` on Unix, `;` on Windows). Every entry
/// becomes a `:dep` line in the notebook's setup cell, in order, so that the notebook
/// kernel resolves the same crates the captured program used.
///
/// # Examples
///
/// ```bash
/// STACKFREEZE_PATH=/work/app:/work/app-core cargo run
/// ```
pub const STACKFREEZE_PATH: &str = "STACKFREEZE_PATH";

/// Environment variable adding frame filter patterns.
///
/// Comma separated, case-sensitive substrings. Frames whose source path contains any
/// of them are dropped from the snapshot, in addition to the built-in patterns.
///
/// # Examples
///
/// ```bash
/// STACKFREEZE_IGNORE=/vendor/,generated.rs cargo test
/// ```
pub const STACKFREEZE_IGNORE: &str = "STACKFREEZE_IGNORE";

/// Manifest directory of the running package, set by cargo at run time.
///
/// When present it is appended to the notebook search path after the
/// [`STACKFREEZE_PATH`] entries.
pub const CARGO_MANIFEST_DIR: &str = "CARGO_MANIFEST_DIR";
