use std::{fs, path::Path, thread};

use serial_test::serial;
use stackfreeze_common::{env::STACKFREEZE_IGNORE, inspect_fields, Snapshot, SnapshotRow, Value};
use stackfreeze_engine::{
    scope, CaptureConfig, CaptureError, CaptureOutcome, Engine, CELLS_PER_ROW, HEADER_CELLS,
};
use tracing::info;

struct Cart {
    items: Vec<String>,
    owner: String,
    log: std::io::Stderr,
}

inspect_fields!(Cart { items, owner, log });

impl Cart {
    fn checkout(&self, dir: &Path, coupon: &str) -> Result<CaptureOutcome, CaptureError> {
        let discount = 15u8;
        scope!(self, coupon, discount => {
            apply_discount(dir, discount)
        })
    }
}

fn apply_discount(dir: &Path, discount: u8) -> Result<CaptureOutcome, CaptureError> {
    let label = format!("-{discount}%");
    let handle = std::io::stdout();
    scope!(label, handle => {
        capture_into(dir)
    })
}

fn capture_into(dir: &Path) -> Result<CaptureOutcome, CaptureError> {
    Engine::new(CaptureConfig::default().with_output_dir(dir).with_search_path(vec![])).capture()
}

fn row_of<'a>(snapshot: &'a Snapshot, function: &str) -> (usize, &'a SnapshotRow) {
    snapshot
        .rows()
        .iter()
        .enumerate()
        .find(|(_, row)| row.function.ends_with(function))
        .unwrap_or_else(|| panic!("no row for {function}: {:?}", snapshot.summary()))
}

#[test]
#[serial]
fn test_capture_nested_scopes() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let cart = Cart {
        items: vec!["bolt".into(), "nut".into()],
        owner: "ada".into(),
        log: std::io::stderr(),
    };

    let outcome = cart.checkout(dir.path(), "SPRING").unwrap();
    let snapshot = &outcome.snapshot;

    let (inner_index, inner) = row_of(snapshot, "apply_discount");
    let (outer_index, outer) = row_of(snapshot, "Cart::checkout");
    assert!(inner_index < outer_index, "rows must be innermost first");

    assert_eq!(inner.locals_names, vec!["label"]);
    assert_eq!(inner.locals["label"], Value::Str("-15%".into()));

    assert_eq!(outer.locals_names, vec!["self", "coupon", "discount"]);
    let receiver = outer.locals["self"].attrs().unwrap();
    assert_eq!(receiver.keys().collect::<Vec<_>>(), vec!["items", "owner"]);
    assert_eq!(outer.locals["discount"], Value::UInt(15));

    assert_eq!(outcome.report.skipped, vec!["handle".to_string()]);
    assert!(outcome.report.missing_sources.is_empty());
}

#[test]
#[serial]
fn test_capture_excludes_library_frames() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    let outcome = capture_into(dir.path()).unwrap();

    assert!(!outcome.snapshot.is_empty());
    for row in &outcome.snapshot {
        let path = row.file_path.to_string_lossy();
        assert!(!path.contains("/rustc/"), "toolchain frame kept: {path}");
        assert!(!path.contains("engine/src/"), "engine frame kept: {path}");
    }
    assert!(outcome.snapshot[0].function.ends_with("capture_into"));
}

#[test]
#[serial]
fn test_rows_carry_context_around_active_line() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();

    let outcome = capture_into(dir.path()).unwrap();

    for row in &outcome.snapshot {
        let active = row.lineno as usize - 1;
        assert!(row.context.lines.iter().any(|line| line.index == active));
        assert!(row.context.lines.len() <= 5);
    }
}

#[test]
#[serial]
fn test_artifacts_reload_and_match() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let cart = Cart { items: vec![], owner: "bo".into(), log: std::io::stderr() };

    let outcome = cart.checkout(dir.path(), "NONE").unwrap();

    let id = &outcome.snapshot.id;
    assert_eq!(id.len(), 32);
    assert_eq!(outcome.snapshot_path, dir.path().join(format!("{id}.json")));
    assert_eq!(outcome.notebook_path, dir.path().join(format!("{id}.ipynb")));

    let reloaded = Snapshot::load(&outcome.snapshot_path).unwrap();
    assert_eq!(reloaded, outcome.snapshot);

    let notebook: serde_json::Value =
        serde_json::from_slice(&fs::read(&outcome.notebook_path).unwrap()).unwrap();
    let cells = notebook["cells"].as_array().unwrap();
    assert_eq!(cells.len(), HEADER_CELLS + CELLS_PER_ROW * reloaded.len());
}

#[test]
#[serial]
fn test_ignore_env_can_filter_everything() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var(STACKFREEZE_IGNORE, "capture_tests");

    let outcome = capture_into(dir.path());
    std::env::remove_var(STACKFREEZE_IGNORE);

    let outcome = outcome.unwrap();
    assert!(outcome.snapshot.iter().all(|row| !row.file_path.ends_with("capture_tests.rs")));
}

#[test]
#[serial]
fn test_scopes_are_per_thread() {
    stackfreeze_common::logging::ensure_test_logging(None);
    info!("Running test");
    let dir = tempfile::tempdir().unwrap();
    let secret = 42u32;

    let outcome = scope!(secret => {
        let path = dir.path().to_path_buf();
        thread::spawn(move || {
            let visible = 7u32;
            scope!(visible => { capture_into(&path) })
        })
        .join()
        .unwrap()
    })
    .unwrap();

    let names: Vec<&String> =
        outcome.snapshot.iter().flat_map(|row| row.locals_names.iter()).collect();
    assert!(names.iter().any(|name| *name == "visible"));
    assert!(!names.iter().any(|name| *name == "secret"));
}
