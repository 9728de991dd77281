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

//! A warehouse audit that freezes itself halfway through.
//!
//! The receiver holds a live stdout handle and one frame lends a function pointer, so
//! the captured snapshot shows both the receiver copy and the exclusion rules at work.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use eyre::Result;
use stackfreeze::{freeze, freeze_into, inspect_fields, scope, CaptureOutcome};
use tracing::info;

struct Inventory {
    warehouse: String,
    stock: BTreeMap<String, u32>,
    sink: io::Stdout,
}

inspect_fields!(Inventory { warehouse, stock, sink });

impl Inventory {
    fn audit(&self, dir: Option<&Path>) -> Result<CaptureOutcome> {
        let total: u32 = self.stock.values().sum();
        scope!(self, total => {
            self.restock(dir, "gasket", total / 4)
        })
    }

    fn restock(&self, dir: Option<&Path>, item: &str, quantity: u32) -> Result<CaptureOutcome> {
        let reorder: fn(u32) -> u32 = reorder_level;
        let threshold = reorder(quantity);
        scope!(item, quantity, threshold, reorder => {
            let outcome = match dir {
                Some(dir) => freeze_into(dir)?,
                None => freeze()?,
            };
            Ok(outcome)
        })
    }
}

fn reorder_level(quantity: u32) -> u32 {
    quantity.saturating_mul(2)
}

/// Run the audit and report the artifacts it wrote
pub fn run(dir: Option<PathBuf>) -> Result<()> {
    let inventory = Inventory {
        warehouse: "north".to_string(),
        stock: BTreeMap::from([("bolt".to_string(), 120), ("gasket".to_string(), 8)]),
        sink: io::stdout(),
    };

    let outcome = inventory.audit(dir.as_deref())?;
    info!(rows = outcome.snapshot.len(), "demo captured");
    if !outcome.report.is_clean() {
        info!(skipped = ?outcome.report.skipped, "some locals were not captured");
    }

    println!("snapshot: {}", outcome.snapshot_path.display());
    println!("notebook: {}", outcome.notebook_path.display());
    Ok(())
}
