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

//! stackfreeze - freeze the call stack into a snapshot and a companion notebook
//!
//! Wrap the interesting regions of a program in [`scope!`] to lend their locals, then
//! call [`freeze`] wherever the state should be preserved:
//!
//! ```rust,no_run
//! use stackfreeze::{freeze, inspect_fields, scope};
//!
//! struct Order {
//!     id: u64,
//!     lines: Vec<String>,
//! }
//!
//! inspect_fields!(Order { id, lines });
//!
//! impl Order {
//!     fn total(&self, discount: u8) -> u64 {
//!         scope!(self, discount => {
//!             if discount > 50 {
//!                 freeze().ok();
//!             }
//!             self.lines.len() as u64
//!         })
//!     }
//! }
//! ```
//!
//! Each capture writes `<id>.json` and `<id>.ipynb` into the output directory. The
//! notebook runs on the evcxr Jupyter kernel and reloads the snapshot with
//! [`Snapshot::load`].

use std::path::PathBuf;

pub use stackfreeze_common::{
    env, format_context, inspect_fields, print_context, ContextBlock, ContextLine, FieldMap,
    Inspect, Snapshot, SnapshotRow, SnapshotSummary, TypeOf, Value,
};
pub use stackfreeze_engine::{
    function_name, scope, CaptureConfig, CaptureError, CaptureOutcome, CaptureReport, Engine,
    Scope,
};

/// Capture configuration whose filter also drops this file's frames
fn facade_config() -> CaptureConfig {
    CaptureConfig::default().with_ignore_pattern(file!())
}

/// Freeze the calling thread's stack into `STACKFREEZE_NOTEBOOKS_PATH`
///
/// # Errors
///
/// [`CaptureError::MissingOutputDir`] when the variable is unset, and
/// [`CaptureError::OutputDirNotFound`] when it names a missing directory. Neither
/// writes anything.
pub fn freeze() -> Result<CaptureOutcome, CaptureError> {
    Engine::new(facade_config()).capture()
}

/// Freeze the calling thread's stack into `dir`
pub fn freeze_into(dir: impl Into<PathBuf>) -> Result<CaptureOutcome, CaptureError> {
    Engine::new(facade_config().with_output_dir(dir)).capture()
}

/// Freeze with a custom configuration
///
/// The facade's own frames are filtered in addition to whatever `config` asks for.
pub fn freeze_with(config: CaptureConfig) -> Result<CaptureOutcome, CaptureError> {
    Engine::new(config.with_ignore_pattern(file!())).capture()
}
