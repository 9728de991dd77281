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

// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! stackfreeze Common - Shared functionality for stackfreeze components
//!
//! This crate provides the pieces shared by the capture engine, the facade
//! library and the `stackfreeze` binary: the captured value model, the
//! snapshot data model, environment variable names and logging setup.

/// Captured values and snapshot records persisted by a capture
pub mod types;

/// Environment variable name constants
pub mod env;
/// Logging setup and utilities for consistent logging across stackfreeze components
pub mod logging;

pub use types::*;

/// Path of this file as recorded by the compiler, locating the crate's sources
#[doc(hidden)]
pub const SOURCE_FILE: &str = file!();
