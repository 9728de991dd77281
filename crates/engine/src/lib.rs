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

//! stackfreeze Engine - stack capture, sanitization and notebook emission
//!
//! The engine freezes the calling thread's stack: it enumerates frames, filters out
//! tooling frames, sanitizes the locals lent by registered scopes, reads source context
//! and persists a snapshot with a companion notebook. See [`Engine::capture`].

pub mod backtrace;

pub mod context;
pub use context::*;

pub mod core;
pub use core::*;

pub mod error;
pub use error::*;

pub mod filter;
pub use filter::*;

pub mod frames;
pub use frames::*;

pub mod notebook;
pub use notebook::*;

pub mod output;
pub use output::*;

pub mod registry;
pub use registry::{with_scopes, Scope, ScopeView};

pub mod sanitize;
pub use sanitize::*;

pub mod snapshot;
pub use snapshot::*;
