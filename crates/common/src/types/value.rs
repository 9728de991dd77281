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

//! Captured values
//!
//! A frame local is turned into a [`Value`] exactly once, at the moment of capture,
//! through the [`Inspect`] trait. `Value` is a closed tagged union: plain data
//! (scalars, strings, sequences, mappings and objects with named attributes), code-like
//! values that are never worth persisting (modules, functions, types) and [`Value::Opaque`]
//! for live handles such as open files, sockets or a lock held elsewhere.
//!
//! `Opaque` refuses to serialize. Whether a value can be persisted is therefore decided
//! by actually serializing it, not by inspecting its shape.

use std::{
    any::type_name,
    borrow::Cow,
    cell::{Cell, RefCell},
    collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque},
    fmt,
    marker::PhantomData,
    ops::Index,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{Arc, Mutex, RwLock, TryLockError},
};

use serde::{
    de::{MapAccess, Visitor},
    ser::{Error as _, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};

/// A captured value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value (`None`, `()`)
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Floating point number
    Float(f64),
    /// Single character
    Char(char),
    /// UTF-8 string
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Ordered sequence
    List(Vec<Value>),
    /// Mapping with arbitrary keys, in iteration order
    Map(Vec<(Value, Value)>),
    /// Structured value with named attributes
    Object {
        /// Rust type name of the inspected value
        type_name: String,
        /// Attributes in declaration order
        attrs: FieldMap,
    },
    /// A module or loaded library
    Module {
        /// Module path
        name: String,
    },
    /// A function or other callable
    Function {
        /// Function path or signature
        name: String,
    },
    /// A type object
    Type {
        /// Type name
        name: String,
    },
    /// A live handle that cannot be persisted
    #[serde(serialize_with = "refuse_opaque")]
    Opaque {
        /// Rust type name of the handle
        type_name: String,
        /// Why the handle cannot be persisted
        reason: String,
    },
}

fn refuse_opaque<S: Serializer>(
    type_name: &str,
    reason: &str,
    _serializer: S,
) -> Result<S::Ok, S::Error> {
    Err(S::Error::custom(format!("{type_name} cannot be persisted: {reason}")))
}

impl Value {
    /// Start building an [`Value::Object`]
    pub fn object(type_name: impl Into<String>) -> ObjectBuilder {
        ObjectBuilder { type_name: type_name.into(), attrs: FieldMap::new() }
    }

    /// A module value
    pub fn module(name: impl Into<String>) -> Self {
        Self::Module { name: name.into() }
    }

    /// A function value
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { name: name.into() }
    }

    /// The type object of `T`
    pub fn type_of<T: ?Sized>() -> Self {
        Self::Type { name: type_name::<T>().to_string() }
    }

    /// An opaque handle of type `T`
    pub fn opaque_of<T: ?Sized>(reason: impl Into<String>) -> Self {
        Self::Opaque { type_name: type_name::<T>().to_string(), reason: reason.into() }
    }

    /// Whether this is a module, function or type value
    pub fn is_code_like(&self) -> bool {
        matches!(self, Self::Module { .. } | Self::Function { .. } | Self::Type { .. })
    }

    /// Whether this value or anything nested inside it is opaque
    pub fn contains_opaque(&self) -> bool {
        match self {
            Self::Opaque { .. } => true,
            Self::List(items) => items.iter().any(Self::contains_opaque),
            Self::Map(entries) => {
                entries.iter().any(|(k, v)| k.contains_opaque() || v.contains_opaque())
            }
            Self::Object { attrs, .. } => attrs.values().any(Self::contains_opaque),
            _ => false,
        }
    }

    /// Attributes of an object value
    pub fn attrs(&self) -> Option<&FieldMap> {
        match self {
            Self::Object { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    /// Short label of the value's kind, used in reports
    pub fn kind(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) | Self::UInt(_) => "integer",
            Self::Float(_) => "float",
            Self::Char(_) => "char",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object { type_name, .. } => type_name,
            Self::Module { .. } => "module",
            Self::Function { .. } => "function",
            Self::Type { .. } => "type",
            Self::Opaque { type_name, .. } => type_name,
        }
    }
}

/// Builder for [`Value::Object`]
#[derive(Debug)]
pub struct ObjectBuilder {
    type_name: String,
    attrs: FieldMap,
}

impl ObjectBuilder {
    /// Add an attribute by inspecting `value`
    pub fn field<T: Inspect + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        self.attrs.insert(name, value.inspect());
        self
    }

    /// Add an already captured attribute
    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(name, value);
        self
    }

    /// Finish the object
    pub fn build(self) -> Value {
        Value::Object { type_name: self.type_name, attrs: self.attrs }
    }
}

/// Insertion-ordered map from names to values
///
/// Serialized as a JSON object; the key order survives a reload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldMap {
    entries: Vec<(String, Value)>,
}

impl FieldMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing an existing entry in place
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Look up a value by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(key, _)| key == name).map(|(_, value)| value)
    }

    /// Remove an entry, returning its value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(position).1)
    }

    /// Whether an entry with this name exists
    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Keep only the entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.entries.retain(|(key, value)| keep(key, value));
    }

    /// Names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Values in insertion order
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Index<&str> for FieldMap {
    type Output = Value;

    fn index(&self, name: &str) -> &Self::Output {
        self.get(name).unwrap_or_else(|| panic!("no field named `{name}`"))
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

impl IntoIterator for FieldMap {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for FieldMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of field names to values")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut map = FieldMap::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

/// Conversion of a live value into a [`Value`] at capture time
///
/// Implemented for the standard scalar, string, collection, smart-pointer and
/// interior-mutability types. Live handles (files, sockets, processes, standard streams)
/// inspect to [`Value::Opaque`]. User types usually implement it with
/// [`inspect_fields!`](crate::inspect_fields) or [`Value::object`].
pub trait Inspect {
    /// Capture the current state of `self`
    fn inspect(&self) -> Value;
}

/// Implement [`Inspect`] for a struct by listing the fields to capture
///
/// ```rust
/// use stackfreeze_common::{inspect_fields, Inspect, Value};
///
/// struct Order {
///     id: u64,
///     note: String,
/// }
///
/// inspect_fields!(Order { id, note });
///
/// let order = Order { id: 7, note: "rush".into() };
/// assert_eq!(order.inspect().attrs().unwrap()["id"], Value::UInt(7));
/// ```
#[macro_export]
macro_rules! inspect_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::types::Inspect for $ty {
            fn inspect(&self) -> $crate::types::Value {
                $crate::types::Value::object(::std::any::type_name::<$ty>())
                    $(.field(stringify!($field), &self.$field))*
                    .build()
            }
        }
    };
}

impl Inspect for Value {
    fn inspect(&self) -> Value {
        self.clone()
    }
}

macro_rules! inspect_signed {
    ($($ty:ty),*) => {
        $(impl Inspect for $ty {
            fn inspect(&self) -> Value {
                Value::Int(*self as i64)
            }
        })*
    };
}

macro_rules! inspect_unsigned {
    ($($ty:ty),*) => {
        $(impl Inspect for $ty {
            fn inspect(&self) -> Value {
                Value::UInt(*self as u64)
            }
        })*
    };
}

macro_rules! inspect_opaque {
    ($($ty:ty => $reason:literal),* $(,)?) => {
        $(impl Inspect for $ty {
            fn inspect(&self) -> Value {
                Value::opaque_of::<$ty>($reason)
            }
        })*
    };
}

inspect_signed!(i8, i16, i32, i64, isize);
inspect_unsigned!(u8, u16, u32, u64, usize);

inspect_opaque!(
    std::fs::File => "open file handle",
    std::net::TcpStream => "live network socket",
    std::net::TcpListener => "live network socket",
    std::net::UdpSocket => "live network socket",
    std::process::Child => "running child process",
    std::io::Stdin => "standard stream handle",
    std::io::Stdout => "standard stream handle",
    std::io::Stderr => "standard stream handle",
);

impl Inspect for i128 {
    fn inspect(&self) -> Value {
        i64::try_from(*self).map(Value::Int).unwrap_or_else(|_| Value::Str(self.to_string()))
    }
}

impl Inspect for u128 {
    fn inspect(&self) -> Value {
        u64::try_from(*self).map(Value::UInt).unwrap_or_else(|_| Value::Str(self.to_string()))
    }
}

impl Inspect for f32 {
    fn inspect(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl Inspect for f64 {
    fn inspect(&self) -> Value {
        Value::Float(*self)
    }
}

impl Inspect for bool {
    fn inspect(&self) -> Value {
        Value::Bool(*self)
    }
}

impl Inspect for char {
    fn inspect(&self) -> Value {
        Value::Char(*self)
    }
}

impl Inspect for () {
    fn inspect(&self) -> Value {
        Value::Null
    }
}

impl Inspect for str {
    fn inspect(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl Inspect for String {
    fn inspect(&self) -> Value {
        Value::Str(self.clone())
    }
}

impl Inspect for Cow<'_, str> {
    fn inspect(&self) -> Value {
        Value::Str(self.to_string())
    }
}

impl Inspect for Path {
    fn inspect(&self) -> Value {
        Value::Str(self.to_string_lossy().into_owned())
    }
}

impl Inspect for PathBuf {
    fn inspect(&self) -> Value {
        self.as_path().inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for &T {
    fn inspect(&self) -> Value {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for &mut T {
    fn inspect(&self) -> Value {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Box<T> {
    fn inspect(&self) -> Value {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Rc<T> {
    fn inspect(&self) -> Value {
        (**self).inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for Arc<T> {
    fn inspect(&self) -> Value {
        (**self).inspect()
    }
}

impl<T: Inspect> Inspect for Option<T> {
    fn inspect(&self) -> Value {
        self.as_ref().map(Inspect::inspect).unwrap_or(Value::Null)
    }
}

impl<T: Inspect> Inspect for [T] {
    fn inspect(&self) -> Value {
        Value::List(self.iter().map(Inspect::inspect).collect())
    }
}

impl<T: Inspect, const N: usize> Inspect for [T; N] {
    fn inspect(&self) -> Value {
        self.as_slice().inspect()
    }
}

impl<T: Inspect> Inspect for Vec<T> {
    fn inspect(&self) -> Value {
        self.as_slice().inspect()
    }
}

impl<T: Inspect> Inspect for VecDeque<T> {
    fn inspect(&self) -> Value {
        Value::List(self.iter().map(Inspect::inspect).collect())
    }
}

impl<T: Inspect, S> Inspect for HashSet<T, S> {
    fn inspect(&self) -> Value {
        Value::List(self.iter().map(Inspect::inspect).collect())
    }
}

impl<T: Inspect> Inspect for BTreeSet<T> {
    fn inspect(&self) -> Value {
        Value::List(self.iter().map(Inspect::inspect).collect())
    }
}

impl<K: Inspect, V: Inspect, S> Inspect for HashMap<K, V, S> {
    fn inspect(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.inspect(), v.inspect())).collect())
    }
}

impl<K: Inspect, V: Inspect> Inspect for BTreeMap<K, V> {
    fn inspect(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.inspect(), v.inspect())).collect())
    }
}

impl<A: Inspect, B: Inspect> Inspect for (A, B) {
    fn inspect(&self) -> Value {
        Value::List(vec![self.0.inspect(), self.1.inspect()])
    }
}

impl<A: Inspect, B: Inspect, C: Inspect> Inspect for (A, B, C) {
    fn inspect(&self) -> Value {
        Value::List(vec![self.0.inspect(), self.1.inspect(), self.2.inspect()])
    }
}

impl<T: Inspect + Copy> Inspect for Cell<T> {
    fn inspect(&self) -> Value {
        self.get().inspect()
    }
}

impl<T: Inspect + ?Sized> Inspect for RefCell<T> {
    fn inspect(&self) -> Value {
        match self.try_borrow() {
            Ok(inner) => inner.inspect(),
            Err(_) => Value::opaque_of::<Self>("mutably borrowed at capture time"),
        }
    }
}

impl<T: Inspect + ?Sized> Inspect for Mutex<T> {
    fn inspect(&self) -> Value {
        match self.try_lock() {
            Ok(guard) => guard.inspect(),
            Err(TryLockError::WouldBlock) => Value::opaque_of::<Self>("locked at capture time"),
            Err(TryLockError::Poisoned(_)) => Value::opaque_of::<Self>("poisoned lock"),
        }
    }
}

impl<T: Inspect + ?Sized> Inspect for RwLock<T> {
    fn inspect(&self) -> Value {
        match self.try_read() {
            Ok(guard) => guard.inspect(),
            Err(TryLockError::WouldBlock) => {
                Value::opaque_of::<Self>("write-locked at capture time")
            }
            Err(TryLockError::Poisoned(_)) => Value::opaque_of::<Self>("poisoned lock"),
        }
    }
}

impl<R> Inspect for fn() -> R {
    fn inspect(&self) -> Value {
        Value::function(type_name::<Self>())
    }
}

impl<A, R> Inspect for fn(A) -> R {
    fn inspect(&self) -> Value {
        Value::function(type_name::<Self>())
    }
}

impl<A, B, R> Inspect for fn(A, B) -> R {
    fn inspect(&self) -> Value {
        Value::function(type_name::<Self>())
    }
}

/// Marker standing for the type `T` itself, inspected as [`Value::Type`]
pub struct TypeOf<T: ?Sized>(PhantomData<T>);

impl<T: ?Sized> TypeOf<T> {
    /// Create the marker
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: ?Sized> Default for TypeOf<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Inspect for TypeOf<T> {
    fn inspect(&self) -> Value {
        Value::type_of::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Account {
        owner: String,
        balance: i64,
        statement: std::io::Stdout,
    }

    inspect_fields!(Account { owner, balance, statement });

    #[test]
    fn test_object_fields_keep_declaration_order() {
        let account =
            Account { owner: "ada".into(), balance: -3, statement: std::io::stdout() };
        let value = account.inspect();

        let attrs = value.attrs().unwrap();
        assert_eq!(attrs.keys().collect::<Vec<_>>(), vec!["owner", "balance", "statement"]);
        assert_eq!(attrs["balance"], Value::Int(-3));
        assert!(value.contains_opaque());
    }

    #[test]
    fn test_opaque_refuses_to_serialize() {
        let value = Value::List(vec![Value::Int(1), Value::opaque_of::<std::fs::File>("open")]);
        let err = serde_json::to_vec(&value).unwrap_err();
        assert!(err.to_string().contains("cannot be persisted"));
    }

    #[test]
    fn test_field_map_reload_preserves_order() {
        let map: FieldMap =
            [("zeta", Value::Int(1)), ("alpha", Value::Bool(true)), ("mid", Value::Null)]
                .into_iter()
                .collect();

        let json = serde_json::to_string(&map).unwrap();
        let reloaded: FieldMap = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded, map);
        assert_eq!(reloaded.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_field_map_insert_replaces_in_place() {
        let mut map = FieldMap::new();
        map.insert("a", Value::Int(1));
        map.insert("b", Value::Int(2));
        map.insert("a", Value::Int(3));

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(map["a"], Value::Int(3));
        assert_eq!(map.remove("a"), Some(Value::Int(3)));
        assert!(!map.contains_key("a"));
    }

    #[test]
    fn test_interior_mutability() {
        let cell = RefCell::new(5u8);
        assert_eq!(cell.inspect(), Value::UInt(5));

        let _borrow = cell.borrow_mut();
        assert!(matches!(cell.inspect(), Value::Opaque { .. }));

        let lock = Mutex::new(String::from("x"));
        let _guard = lock.lock().unwrap();
        assert!(matches!(lock.inspect(), Value::Opaque { .. }));
    }

    #[test]
    fn test_code_like_values() {
        let handler: fn(u32) -> u32 = |x| x + 1;
        assert!(handler.inspect().is_code_like());
        assert!(TypeOf::<Account>::new().inspect().is_code_like());
        assert!(Value::module("std::fs").is_code_like());
        assert!(!Value::Str("fs".into()).is_code_like());
    }

    #[test]
    fn test_wide_integers_fall_back_to_strings() {
        assert_eq!(5i128.inspect(), Value::Int(5));
        assert_eq!(u128::MAX.inspect(), Value::Str(u128::MAX.to_string()));
    }

    #[test]
    fn test_maps_and_options() {
        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), Some(1u32));
        scores.insert("b".to_string(), None);

        assert_eq!(
            scores.inspect(),
            Value::Map(vec![
                (Value::Str("a".into()), Value::UInt(1)),
                (Value::Str("b".into()), Value::Null),
            ])
        );
    }
}
