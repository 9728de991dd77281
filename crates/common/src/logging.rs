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

//! Logging setup for stackfreeze
//!
//! Captures run inside the host program, so the library never installs a subscriber
//! on its own. Hosts pick one of:
//! - [`init_logging`]: timestamped console output on stderr, plus an optional daily
//!   rolling file under the system temp dir that also records engine internals
//! - [`init_simple_logging`]: compact stderr output, as used by the CLI
//! - [`ensure_test_logging`]: idempotent setup for tests
//!
//! `RUST_LOG` overrides the default level in every variant.

use std::{env, fs, io, path::PathBuf, sync::Once};

use eyre::{eyre, Result, WrapErr};
use tracing::{info, Level, Subscriber};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::LocalTime},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Directory below the system temp dir that holds rolling log files
pub const LOG_DIR_NAME: &str = "stackfreeze-logs";

/// Directive added to the file log so capture internals are always recorded there
const FILE_DIRECTIVE: &str = "stackfreeze_engine=debug";

/// Where the rolling log files of `component` are written
pub fn log_directory(component: &str) -> PathBuf {
    env::temp_dir().join(LOG_DIR_NAME).join(component)
}

/// Initialize logging for a host program
///
/// Console lines go to stderr so they never mix with what the host prints. With
/// `enable_file_logging`, a daily rolling `<component>.log` is written into
/// [`log_directory`].
///
/// # Examples
/// ```rust,no_run
/// use stackfreeze_common::logging;
///
/// fn main() -> eyre::Result<()> {
///     logging::init_logging("inventory-service", true)?;
///     tracing::info!("service started");
///     Ok(())
/// }
/// ```
pub fn init_logging(component: &str, enable_file_logging: bool) -> Result<()> {
    let console = fmt::layer()
        .with_target(true)
        .with_timer(LocalTime::rfc_3339())
        .with_writer(io::stderr)
        .with_filter(level_filter(Level::INFO)?);

    let file = if enable_file_logging { Some(file_layer(component)?) } else { None };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .wrap_err("a tracing subscriber is already installed")?;

    info!(component, file_logging = enable_file_logging, "logging initialized");
    Ok(())
}

/// Initialize compact stderr logging at `level`
pub fn init_simple_logging(level: Level) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(level_filter(level)?)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| eyre!("a tracing subscriber is already installed: {err}"))
}

static TEST_LOGGING_INIT: Once = Once::new();

/// Logging for tests; safe to call from every test
///
/// Only the first call in a test binary installs a subscriber. `default_level` is
/// INFO when `None`.
pub fn ensure_test_logging(default_level: Option<Level>) {
    TEST_LOGGING_INIT.call_once(|| {
        // Another harness may have installed a subscriber already
        let _ = init_simple_logging(default_level.unwrap_or(Level::INFO));
    });
}

/// `RUST_LOG` when set and non-empty, `default` otherwise
fn level_filter(default: Level) -> Result<EnvFilter> {
    match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => {
            EnvFilter::try_new(&directives).wrap_err_with(|| format!("invalid RUST_LOG: {directives}"))
        }
        _ => Ok(EnvFilter::new(default.as_str())),
    }
}

fn file_filter() -> Result<EnvFilter> {
    Ok(level_filter(Level::INFO)?.add_directive(FILE_DIRECTIVE.parse()?))
}

fn file_layer<S>(component: &str) -> Result<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let dir = log_directory(component);
    fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("cannot create log directory {}", dir.display()))?;

    let (writer, guard) = non_blocking(rolling::daily(&dir, format!("{component}.log")));
    // The worker thread has to keep flushing until the process exits
    std::mem::forget(guard);

    Ok(fmt::layer()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_timer(LocalTime::rfc_3339())
        .with_writer(writer)
        .with_filter(file_filter()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, warn};

    #[test]
    fn test_logging_macros_after_setup() {
        ensure_test_logging(None);
        ensure_test_logging(Some(Level::DEBUG));

        info!("info after setup");
        warn!("warn after setup");
        debug!("debug after setup");
    }

    #[test]
    fn test_log_directory_is_per_component() {
        let dir = log_directory("inventory");
        assert!(dir.starts_with(env::temp_dir()));
        assert!(dir.ends_with(PathBuf::from(LOG_DIR_NAME).join("inventory")));
    }

    #[test]
    fn test_file_filter_records_engine_internals() {
        let filter = file_filter().unwrap();
        assert!(filter.to_string().contains(FILE_DIRECTIVE));
    }

    #[test]
    fn test_second_initialization_is_an_error() {
        ensure_test_logging(None);

        assert!(init_simple_logging(Level::INFO).is_err());
        assert!(init_logging("stackfreeze-test", false).is_err());
    }
}
