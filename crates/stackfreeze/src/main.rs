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

//! stackfreeze - inspect frozen stacks offline
//!
//! Reads the snapshot artifacts written by a capture and regenerates their notebooks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use stackfreeze_common::logging;
use tracing::Level;

mod cmd;

/// Command-line interface for stackfreeze
#[derive(Debug, Parser)]
#[command(name = "stackfreeze")]
#[command(about = "Inspect frozen stack snapshots and regenerate their notebooks")]
#[command(version)]
pub struct Cli {
    /// Print log lines to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Also write logs to a daily rolling file under the system temp dir
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the frames of a snapshot
    Show {
        /// Snapshot artifact (`<id>.json`)
        artifact: PathBuf,
    },
    /// Print the source context of one frame
    Context {
        /// Snapshot artifact (`<id>.json`)
        artifact: PathBuf,
        /// Row index, 0 is the innermost frame
        row: usize,
    },
    /// Print the locals of one frame as JSON
    Locals {
        /// Snapshot artifact (`<id>.json`)
        artifact: PathBuf,
        /// Row index, 0 is the innermost frame
        row: usize,
    },
    /// Regenerate the companion notebook next to a snapshot
    Notebook {
        /// Snapshot artifact (`<id>.json`)
        artifact: PathBuf,
        /// Crate directory to load in the notebook; repeatable. Defaults to STACKFREEZE_PATH
        #[arg(long = "search-path")]
        search_path: Vec<PathBuf>,
        /// Leave the imports cell empty
        #[arg(long)]
        no_imports: bool,
    },
    /// Run a small program that freezes itself
    Demo {
        /// Output directory. Defaults to STACKFREEZE_NOTEBOOKS_PATH
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    if cli.log_file {
        logging::init_logging("stackfreeze", true)?;
    } else if cli.verbose {
        logging::init_simple_logging(Level::DEBUG)?;
    }

    match cli.command {
        Commands::Show { artifact } => cmd::show::run(&artifact),
        Commands::Context { artifact, row } => cmd::context::run(&artifact, row),
        Commands::Locals { artifact, row } => cmd::locals::run(&artifact, row),
        Commands::Notebook { artifact, search_path, no_imports } => {
            cmd::notebook::run(&artifact, search_path, !no_imports)
        }
        Commands::Demo { dir } => cmd::demo::run(dir),
    }
}
