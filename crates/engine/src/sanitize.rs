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

//! Variable sanitization
//!
//! Decides which locals of a frame are persisted. A local is kept when its name is not
//! shell or debugger bookkeeping, its value is not code (module, function, type), and
//! its value survives a serialization probe. A method receiver that fails the probe
//! gets a second chance as a partial copy without the attributes that fail on their
//! own.

use once_cell::sync::Lazy;
use regex::Regex;
use stackfreeze_common::{Inspect, Locals, Value};
use tracing::debug;

use crate::ProbeError;

/// Names the notebook shell and its kernel bind for their own bookkeeping
pub const DENYLIST: &[&str] = &[
    "__name__",
    "__doc__",
    "__package__",
    "__loader__",
    "__spec__",
    "__file__",
    "__builtins__",
    "__builtin__",
    "_ih",
    "_oh",
    "_dh",
    "In",
    "Out",
    "get_ipython",
    "exit",
    "quit",
    "_",
    "__",
    "___",
    "_i",
    "_ii",
    "_iii",
    "_evcxr_ctx",
];

/// Receiver names retried through a partial copy
pub const DEFAULT_RECEIVER_NAMES: &[&str] = &["self"];

static HISTORY_COUNTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_i[0-9]+$").expect("valid history pattern"));

static NUMERIC_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_[0-9]+$").expect("valid suffix pattern"));

/// Whether `name` is bookkeeping of a shell, kernel or debugger
pub fn is_excluded_name(name: &str) -> bool {
    HISTORY_COUNTER.is_match(name)
        || DENYLIST.contains(&name)
        || name.contains("__py_debug_temp_var")
        || name.starts_with("__lldb_")
        || name.starts_with('$')
        || NUMERIC_SUFFIX.is_match(name)
}

/// Encode `value`, decode it again and require the result to be equal
///
/// Returns the encoded bytes on success.
pub fn probe(value: &Value) -> Result<Vec<u8>, ProbeError> {
    let bytes = serde_json::to_vec(value).map_err(ProbeError::Encode)?;
    let decoded: Value = serde_json::from_slice(&bytes).map_err(ProbeError::Decode)?;
    if decoded != *value {
        return Err(ProbeError::NotRoundTrip);
    }
    Ok(bytes)
}

/// Copy of an object receiver without the attributes that fail the probe on their own
///
/// Returns `None` when `value` is not an object or the copy still fails.
pub fn strip_unserializable(value: &Value) -> Option<Value> {
    let Value::Object { type_name, attrs } = value else {
        return None;
    };

    let mut attrs = attrs.clone();
    attrs.retain(|name, attr| match probe(attr) {
        Ok(_) => true,
        Err(err) => {
            debug!(type_name, attribute = name, %err, "dropping receiver attribute");
            false
        }
    });

    let copy = Value::Object { type_name: type_name.clone(), attrs };
    probe(&copy).ok().map(|_| copy)
}

/// Locals of one frame after sanitization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sanitized {
    /// Kept locals, in namespace order
    pub locals: Locals,
    /// Names that were eligible but could not be persisted
    pub skipped: Vec<String>,
}

/// Sanitization settings
#[derive(Debug, Clone)]
pub struct SanitizerRules {
    receiver_names: Vec<String>,
}

impl Default for SanitizerRules {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVER_NAMES.iter().copied())
    }
}

impl SanitizerRules {
    /// Rules treating `receiver_names` as method receivers
    pub fn new(receiver_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { receiver_names: receiver_names.into_iter().map(Into::into).collect() }
    }

    /// Whether `name` gets the partial-copy retry
    pub fn is_receiver(&self, name: &str) -> bool {
        self.receiver_names.iter().any(|receiver| receiver == name)
    }

    /// Sanitize one frame's namespace
    ///
    /// Excluded names are never inspected.
    pub fn sanitize<'a>(
        &self,
        namespace: impl IntoIterator<Item = (&'a str, &'a dyn Inspect)>,
    ) -> Sanitized {
        let mut sanitized = Sanitized::default();

        for (name, handle) in namespace {
            if is_excluded_name(name) {
                debug!(name, "excluded by name");
                continue;
            }

            let value = handle.inspect();
            if value.is_code_like() {
                debug!(name, kind = value.kind(), "excluded code value");
                continue;
            }

            match probe(&value) {
                Ok(_) => sanitized.locals.insert(name, value),
                Err(err) => {
                    let retried = self
                        .is_receiver(name)
                        .then(|| strip_unserializable(&value))
                        .flatten();
                    match retried {
                        Some(copy) => {
                            debug!(name, "kept partial copy of receiver");
                            sanitized.locals.insert(name, copy);
                        }
                        None => {
                            debug!(name, kind = value.kind(), %err, "cannot persist variable");
                            sanitized.skipped.push(name.to_string());
                        }
                    }
                }
            }
        }

        sanitized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackfreeze_common::TypeOf;

    struct Ledger {
        name: String,
        entries: Vec<u32>,
        sink: std::io::Stdout,
    }

    stackfreeze_common::inspect_fields!(Ledger { name, entries, sink });

    #[test]
    fn test_name_rules() {
        for name in [
            "_i12",
            "__name__",
            "_",
            "_ii",
            "In",
            "x__py_debug_temp_var",
            "__lldb_tmp",
            "$0",
            "tmp_3",
            "_evcxr_ctx",
        ] {
            assert!(is_excluded_name(name), "{name} should be excluded");
        }
        for name in ["item", "v_2d", "_ignored", "self", "total", "i", "_io"] {
            assert!(!is_excluded_name(name), "{name} should be kept");
        }
    }

    #[test]
    fn test_probe_rejects_opaque_and_non_finite() {
        assert!(probe(&Value::UInt(3)).is_ok());
        assert!(probe(&Value::Float(0.1)).is_ok());
        assert!(matches!(probe(&std::io::stdout().inspect()), Err(ProbeError::Encode(_))));
        assert!(probe(&Value::Float(f64::NAN)).is_err());
        assert!(probe(&Value::List(vec![Value::Float(f64::INFINITY)])).is_err());
    }

    #[test]
    fn test_receiver_keeps_partial_copy() {
        let ledger = Ledger { name: "main".into(), entries: vec![1, 2], sink: std::io::stdout() };
        let locals: [(&str, &dyn Inspect); 1] = [("self", &ledger)];

        let sanitized = SanitizerRules::default().sanitize(locals);

        assert!(sanitized.skipped.is_empty());
        let attrs = sanitized.locals["self"].attrs().unwrap();
        assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["name", "entries"]);
        assert!(!attrs.contains_key("sink"));
    }

    #[test]
    fn test_non_receiver_is_skipped_and_reported() {
        let ledger = Ledger { name: "main".into(), entries: vec![], sink: std::io::stdout() };
        let total = 12u64;
        let locals: [(&str, &dyn Inspect); 2] = [("ledger", &ledger), ("total", &total)];

        let sanitized = SanitizerRules::default().sanitize(locals);

        assert_eq!(sanitized.skipped, vec!["ledger"]);
        assert_eq!(sanitized.locals.keys().collect::<Vec<_>>(), vec!["total"]);
    }

    #[test]
    fn test_code_values_and_bookkeeping_are_dropped_silently() {
        let kind = TypeOf::<Ledger>::new();
        let helper: fn(u32) -> u32 = |x| x + 1;
        let counter = 4u8;
        let history = "x";
        let locals: [(&str, &dyn Inspect); 4] =
            [("kind", &kind), ("helper", &helper), ("counter", &counter), ("_i3", &history)];

        let sanitized = SanitizerRules::default().sanitize(locals);

        assert!(sanitized.skipped.is_empty());
        assert_eq!(sanitized.locals.keys().collect::<Vec<_>>(), vec!["counter"]);
    }

    #[test]
    fn test_custom_receiver_names() {
        let ledger = Ledger { name: "n".into(), entries: vec![], sink: std::io::stdout() };
        let locals: [(&str, &dyn Inspect); 1] = [("this", &ledger)];

        let rules = SanitizerRules::new(["this"]);
        assert!(rules.sanitize(locals).locals.contains_key("this"));
        assert!(SanitizerRules::default().sanitize(locals).locals.is_empty());
    }

    #[test]
    fn test_strip_unserializable_needs_an_object() {
        assert!(strip_unserializable(&std::io::stdout().inspect()).is_none());
        assert!(strip_unserializable(&Value::UInt(1)).is_none());
    }
}
