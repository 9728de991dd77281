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

//! Errors of a capture and of the serialization check
//!
//! [`CaptureError`] is what callers of a capture see. [`ProbeError`] stays inside the
//! sanitizer, which turns it into a skipped variable.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors surfaced by a capture
///
/// Configuration errors are raised before any frame is inspected or any file is written.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Neither an explicit output directory nor
    /// [`STACKFREEZE_NOTEBOOKS_PATH`](stackfreeze_common::env::STACKFREEZE_NOTEBOOKS_PATH)
    /// is set
    #[error("no output directory: pass one explicitly or set STACKFREEZE_NOTEBOOKS_PATH")]
    MissingOutputDir,

    /// The configured output directory does not exist
    #[error("output directory {} does not exist", .0.display())]
    OutputDirNotFound(PathBuf),

    /// The snapshot could not be encoded
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    /// An artifact could not be written
    #[error("failed to write {}: {source}", .path.display())]
    Persist {
        /// Artifact that failed
        path: PathBuf,
        /// Underlying I/O error
        source: io::Error,
    },
}

impl CaptureError {
    /// Whether the error comes from configuration rather than from writing artifacts
    pub fn is_config(&self) -> bool {
        matches!(self, Self::MissingOutputDir | Self::OutputDirNotFound(_))
    }
}

/// Why a value failed the serialization probe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The value could not be encoded at all
    #[error("{0}")]
    Encode(serde_json::Error),

    /// The encoded form could not be decoded again
    #[error("encoded form does not decode: {0}")]
    Decode(serde_json::Error),

    /// The decoded value differs from the original
    #[error("value changes when reloaded")]
    NotRoundTrip,
}
