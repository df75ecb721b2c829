//! Dynamic Values
//!
//! Reactive wrappers observe structured data whose shape is only known at
//! runtime: objects with named properties, arrays, maps and sets. This module
//! defines that data model.
//!
//! - [`Value`] is the tagged union stored in every slot.
//! - [`Target`] is a shared, lockable structured value. Targets have identity:
//!   two targets are equal only if they are the same allocation.
//! - [`Key`] addresses one slot of a target. Keys are normalized to the
//!   target's kind before use, so `Key::Name("0")` and `Key::Index(0)` read
//!   the same array slot.
//!
//! # Equality
//!
//! `==` compares numbers with SameValueZero semantics: `NaN` equals `NaN` and
//! `-0` equals `0`. Structured values compare by target identity, and a
//! reactive wrapper compares equal to the raw target it wraps. This makes
//! `Value` usable as a map key and as a set element.
//!
//! Change detection is stricter: [`Value::same_value`] also tells `-0` from
//! `0`, so writing `-0` over `0` is a change.
//!
//! # Arrays
//!
//! Arrays are dense. A write may replace an item or append right after the
//! last one; a write further out is rejected instead of padding the gap.
//! The `length` key reads the item count and, when written, truncates.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::ReactivityError;

use super::ids::SourceId;
use super::proxy::Reactive;

/// The array property holding the item count.
pub(crate) const LENGTH_KEY: &str = "length";

/// Internal markers every reactive wrapper answers without tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactiveFlag {
    /// `true` for any wrapper.
    IsReactive,
    /// `true` for readonly wrappers.
    IsReadonly,
    /// The raw target behind the wrapper.
    Raw,
}

impl ReactiveFlag {
    fn as_str(&self) -> &'static str {
        match self {
            ReactiveFlag::IsReactive => "__v_isReactive",
            ReactiveFlag::IsReadonly => "__v_isReadonly",
            ReactiveFlag::Raw => "__v_raw",
        }
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// A raw structured value.
    Object(Target),
    /// A structured value seen through a reactive wrapper.
    Reactive(Reactive),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Object(target) => target.kind().name(),
            Value::Reactive(reactive) => reactive.to_raw().kind().name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The reactive wrapper, if this value was read through one.
    pub fn as_reactive(&self) -> Option<&Reactive> {
        match self {
            Value::Reactive(reactive) => Some(reactive),
            _ => None,
        }
    }

    /// The raw target of a structured value, unwrapping reactive wrappers.
    pub fn as_target(&self) -> Option<Target> {
        match self {
            Value::Object(target) => Some(target.clone()),
            Value::Reactive(reactive) => Some(reactive.to_raw()),
            _ => None,
        }
    }

    /// Whether the value is an object, array, map or set.
    pub fn is_structured(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Reactive(_))
    }

    /// The raw form: reactive wrappers are replaced by their targets.
    pub fn into_raw(self) -> Value {
        match self {
            Value::Reactive(reactive) => Value::Object(reactive.to_raw()),
            other => other,
        }
    }

    /// Convert to JSON. Cycles are cut with `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<SourceId>) -> serde_json::Value {
        use serde_json::Value as Json;

        let target = match self {
            Value::Null => return Json::Null,
            Value::Bool(b) => return Json::Bool(*b),
            Value::Number(n) => {
                return serde_json::Number::from_f64(*n)
                    .map(Json::Number)
                    .unwrap_or(Json::Null)
            }
            Value::Str(s) => return Json::String(s.to_string()),
            Value::Object(target) => target.clone(),
            Value::Reactive(reactive) => reactive.to_raw(),
        };

        if !seen.insert(target.id()) {
            return Json::Null;
        }
        let json = match &*target.read() {
            TargetData::Object(props) => Json::Object(
                props
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_json_inner(seen)))
                    .collect(),
            ),
            TargetData::Array(items) => {
                Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
            TargetData::Map(entries) => Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| Json::Array(vec![k.to_json_inner(seen), v.to_json_inner(seen)]))
                    .collect(),
            ),
            TargetData::Set(items) => {
                Json::Array(items.iter().map(|v| v.to_json_inner(seen)).collect())
            }
        };
        seen.remove(&target.id());
        json
    }

    /// Identity used for change detection. Like `==`, except that `-0` and
    /// `0` are different values.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => {
                a.to_bits() == b.to_bits() || (a.is_nan() && b.is_nan())
            }
            _ => self == other,
        }
    }

    fn structured_id(&self) -> Option<SourceId> {
        match self {
            Value::Object(target) => Some(target.id()),
            Value::Reactive(reactive) => Some(reactive.id()),
            _ => None,
        }
    }
}

fn normalize_number(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0.0f64.to_bits()
    } else {
        n.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => match (self.structured_id(), other.structured_id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Number(n) => {
                2u8.hash(state);
                normalize_number(*n).hash(state);
            }
            Value::Str(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Value::Object(_) | Value::Reactive(_) => {
                4u8.hash(state);
                self.structured_id().hash(state);
            }
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(target) => write!(f, "Object({target:?})"),
            Value::Reactive(reactive) => write!(f, "Reactive({:?})", reactive.to_raw()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(_) | Value::Reactive(_) => write!(f, "{}", self.to_json()),
        }
    }
}

macro_rules! value_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

value_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(target: Target) -> Self {
        Value::Object(target)
    }
}

impl From<Reactive> for Value {
    fn from(reactive: Reactive) -> Self {
        Value::Reactive(reactive)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            Json::String(s) => Value::from(s),
            Json::Array(items) => Value::Object(Target::array_from(items.into_iter().map(Value::from))),
            Json::Object(props) => Value::Object(Target::object_from(
                props.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

// ----------------------------------------------------------------------------
// Targets
// ----------------------------------------------------------------------------

/// The shape of a structured target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
}

impl TargetKind {
    pub fn name(&self) -> &'static str {
        match self {
            TargetKind::Object => "object",
            TargetKind::Array => "array",
            TargetKind::Map => "map",
            TargetKind::Set => "set",
        }
    }
}

/// The contents of a structured target.
#[derive(Debug, Clone)]
pub enum TargetData {
    Object(IndexMap<Arc<str>, Value>),
    Array(Vec<Value>),
    Map(IndexMap<Value, Value>),
    Set(IndexSet<Value>),
}

impl TargetData {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetData::Object(_) => TargetKind::Object,
            TargetData::Array(_) => TargetKind::Array,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TargetData::Object(props) => props.len(),
            TargetData::Array(items) => items.len(),
            TargetData::Map(entries) => entries.len(),
            TargetData::Set(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read one slot. `key` must already be normalized for this kind.
    pub fn get(&self, key: &Key) -> Option<Value> {
        match (self, key) {
            (TargetData::Object(props), Key::Name(name)) => props.get(name).cloned(),
            (TargetData::Array(items), Key::Index(i)) => items.get(*i).cloned(),
            (TargetData::Array(items), Key::Name(name)) if name.as_ref() == LENGTH_KEY => {
                Some(Value::from(items.len()))
            }
            (TargetData::Map(entries), Key::Entry(k)) => entries.get(k).cloned(),
            (TargetData::Set(items), Key::Entry(k)) => items.get(k).cloned(),
            _ => None,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match (self, key) {
            (TargetData::Object(props), Key::Name(name)) => props.contains_key(name),
            (TargetData::Array(items), Key::Index(i)) => *i < items.len(),
            (TargetData::Map(entries), Key::Entry(k)) => entries.contains_key(k),
            (TargetData::Set(items), Key::Entry(k)) => items.contains(k),
            _ => false,
        }
    }

    /// Write one slot, returning the previous value.
    ///
    /// Array writes past the end fail with [`ReactivityError::ArrayGap`] and
    /// named array keys with [`ReactivityError::InvalidKey`]. Sets have no
    /// slots to write: the value is added and the key is ignored.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<Option<Value>, ReactivityError> {
        match (self, key) {
            (TargetData::Object(props), Key::Name(name)) => Ok(props.insert(name, value)),
            (TargetData::Array(items), Key::Index(i)) => match i.cmp(&items.len()) {
                Ordering::Less => Ok(Some(std::mem::replace(&mut items[i], value))),
                Ordering::Equal => {
                    items.push(value);
                    Ok(None)
                }
                Ordering::Greater => Err(ReactivityError::ArrayGap {
                    index: i,
                    len: items.len(),
                }),
            },
            (TargetData::Map(entries), Key::Entry(k)) => Ok(entries.insert(k, value)),
            (TargetData::Set(items), _) => {
                if items.insert(value.clone()) {
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
            (data, key) => Err(ReactivityError::InvalidKey {
                key: key.to_string(),
                kind: data.kind().name(),
            }),
        }
    }

    /// Shorten an array to `len` items, returning the removed tail. Growing
    /// would leave a gap and fails like an out-of-range write.
    pub fn truncate(&mut self, len: usize) -> Result<Vec<Value>, ReactivityError> {
        match self {
            TargetData::Array(items) if len <= items.len() => Ok(items.split_off(len)),
            TargetData::Array(items) => Err(ReactivityError::ArrayGap {
                index: len - 1,
                len: items.len(),
            }),
            other => Err(ReactivityError::Unsupported {
                op: "truncate",
                kind: other.kind().name(),
            }),
        }
    }

    /// Remove one slot. Array removal shifts the following items down.
    pub fn remove(&mut self, key: &Key) -> Option<Value> {
        match (self, key) {
            (TargetData::Object(props), Key::Name(name)) => props.shift_remove(name),
            (TargetData::Array(items), Key::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            (TargetData::Map(entries), Key::Entry(k)) => entries.shift_remove(k),
            (TargetData::Set(items), Key::Entry(k)) => items.shift_take(k),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        match self {
            TargetData::Object(props) => props.clear(),
            TargetData::Array(items) => items.clear(),
            TargetData::Map(entries) => entries.clear(),
            TargetData::Set(items) => items.clear(),
        }
    }

    pub fn keys(&self) -> Vec<Key> {
        match self {
            TargetData::Object(props) => props.keys().map(|k| Key::Name(k.clone())).collect(),
            TargetData::Array(items) => (0..items.len()).map(Key::Index).collect(),
            TargetData::Map(entries) => entries.keys().map(|k| Key::Entry(k.clone())).collect(),
            TargetData::Set(items) => items.iter().map(|k| Key::Entry(k.clone())).collect(),
        }
    }

    pub fn values(&self) -> Vec<Value> {
        match self {
            TargetData::Object(props) => props.values().cloned().collect(),
            TargetData::Array(items) => items.clone(),
            TargetData::Map(entries) => entries.values().cloned().collect(),
            TargetData::Set(items) => items.iter().cloned().collect(),
        }
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.keys().into_iter().zip(self.values()).collect()
    }
}

struct TargetCell {
    id: SourceId,
    data: RwLock<TargetData>,
}

/// A shared structured value with identity.
///
/// Cloning a `Target` clones the handle, not the data. Mutating a target
/// directly (through [`write`](Self::write)) bypasses change detection; go
/// through a [`Reactive`] wrapper for observable writes.
#[derive(Clone)]
pub struct Target {
    cell: Arc<TargetCell>,
}

impl Target {
    pub fn new(data: TargetData) -> Self {
        Self {
            cell: Arc::new(TargetCell {
                id: SourceId::new(),
                data: RwLock::new(data),
            }),
        }
    }

    /// An empty object.
    pub fn object() -> Self {
        Self::new(TargetData::Object(IndexMap::new()))
    }

    /// An empty array.
    pub fn array() -> Self {
        Self::new(TargetData::Array(Vec::new()))
    }

    /// An empty map.
    pub fn map() -> Self {
        Self::new(TargetData::Map(IndexMap::new()))
    }

    /// An empty set.
    pub fn set() -> Self {
        Self::new(TargetData::Set(IndexSet::new()))
    }

    pub fn object_from<K, I>(props: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::new(TargetData::Object(
            props
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_raw()))
                .collect(),
        ))
    }

    pub fn array_from<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::new(TargetData::Array(
            items.into_iter().map(Value::into_raw).collect(),
        ))
    }

    pub fn map_from<I: IntoIterator<Item = (Value, Value)>>(entries: I) -> Self {
        Self::new(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into_raw(), v.into_raw()))
                .collect(),
        ))
    }

    pub fn set_from<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Self::new(TargetData::Set(
            items.into_iter().map(Value::into_raw).collect(),
        ))
    }

    /// The identity of this target, shared by every wrapper around it.
    pub fn id(&self) -> SourceId {
        self.cell.id
    }

    pub fn kind(&self) -> TargetKind {
        self.cell.data.read().kind()
    }

    /// Lock the data for reading. No change tracking happens.
    pub fn read(&self) -> RwLockReadGuard<'_, TargetData> {
        self.cell.data.read()
    }

    /// Lock the data for writing. No change notification happens.
    pub fn write(&self) -> RwLockWriteGuard<'_, TargetData> {
        self.cell.data.write()
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Target {}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // try_read: Debug may run while a writer holds the lock.
        match self.cell.data.try_read() {
            Some(data) => write!(f, "{}#{}(len={})", data.kind().name(), self.id().raw(), data.len()),
            None => write!(f, "target#{}", self.id().raw()),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Target {
    fn from(props: serde_json::Map<String, serde_json::Value>) -> Self {
        Target::object_from(props.into_iter().map(|(k, v)| (k, Value::from(v))))
    }
}

// ----------------------------------------------------------------------------
// Keys
// ----------------------------------------------------------------------------

/// Addresses one slot of a target.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Object property.
    Name(Arc<str>),
    /// Array index.
    Index(usize),
    /// Map key or set element (always in raw form).
    Entry(Value),
    /// Wrapper marker; never tracked.
    Flag(ReactiveFlag),
}

impl Key {
    /// Convert to the key form used by targets of `kind`.
    pub fn normalize(self, kind: TargetKind) -> Key {
        match (kind, self) {
            (_, Key::Flag(flag)) => Key::Flag(flag),
            (TargetKind::Object, Key::Name(name)) => Key::Name(name),
            (TargetKind::Object, Key::Index(i)) => Key::Name(Arc::from(i.to_string())),
            (TargetKind::Object, Key::Entry(value)) => Key::Name(Arc::from(value.to_string())),
            (TargetKind::Array, Key::Index(i)) => Key::Index(i),
            (TargetKind::Array, Key::Name(name)) => match name.parse::<usize>() {
                Ok(i) => Key::Index(i),
                Err(_) => Key::Name(name),
            },
            (TargetKind::Array, Key::Entry(value)) => match value.as_f64() {
                Some(n) if n >= 0.0 && n.fract() == 0.0 => Key::Index(n as usize),
                _ => Key::Name(Arc::from(value.to_string())),
            },
            (TargetKind::Map | TargetKind::Set, Key::Entry(value)) => Key::Entry(value.into_raw()),
            (TargetKind::Map | TargetKind::Set, Key::Name(name)) => Key::Entry(Value::Str(name)),
            (TargetKind::Map | TargetKind::Set, Key::Index(i)) => Key::Entry(Value::from(i)),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name:?}"),
            Key::Index(i) => write!(f, "[{i}]"),
            Key::Entry(value) => write!(f, "<{value:?}>"),
            Key::Flag(flag) => write!(f, "{}", flag.as_str()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(i) => write!(f, "{i}"),
            Key::Entry(value) => write!(f, "{value}"),
            Key::Flag(flag) => write!(f, "{}", flag.as_str()),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Arc::from(name))
    }
}

impl From<Arc<str>> for Key {
    fn from(name: Arc<str>) -> Self {
        Key::Name(name)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        match usize::try_from(i) {
            Ok(i) => Key::Index(i),
            Err(_) => Key::Entry(Value::from(i)),
        }
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Entry(value)
    }
}

impl From<ReactiveFlag> for Key {
    fn from(flag: ReactiveFlag) -> Self {
        Key::Flag(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(value: &Value) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn numbers_use_same_value_zero() {
        assert_eq!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_eq!(hash_of(&Value::from(0.0)), hash_of(&Value::from(-0.0)));
        assert_ne!(Value::from(1), Value::from("1"));
    }

    #[test]
    fn same_value_separates_signed_zeros() {
        assert!(Value::from(f64::NAN).same_value(&Value::from(f64::NAN)));
        assert!(!Value::from(0.0).same_value(&Value::from(-0.0)));
        assert!(Value::from(2).same_value(&Value::from(2.0)));
        assert!(!Value::from(1).same_value(&Value::from("1")));
    }

    #[test]
    fn structured_values_compare_by_identity() {
        let a = Target::object();
        let b = Target::object();

        assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
        assert_ne!(Value::from(a), Value::from(b));
    }

    #[test]
    fn keys_normalize_per_kind() {
        assert_eq!(Key::from("2").normalize(TargetKind::Array), Key::Index(2));
        assert_eq!(Key::from(2usize).normalize(TargetKind::Object), Key::from("2"));
        assert_eq!(
            Key::from("a").normalize(TargetKind::Map),
            Key::Entry(Value::from("a"))
        );
    }

    #[test]
    fn array_insert_stays_dense() {
        let mut data = TargetData::Array(vec![Value::from(1)]);
        assert_eq!(data.insert(Key::Index(1), Value::from(2)), Ok(None));
        assert_eq!(
            data.insert(Key::Index(3), Value::from(4)),
            Err(ReactivityError::ArrayGap { index: 3, len: 2 })
        );
        assert!(data.insert(Key::Index(usize::MAX), Value::from(4)).is_err());
        assert!(matches!(
            data.insert(Key::from("name"), Value::from(4)),
            Err(ReactivityError::InvalidKey { kind: "array", .. })
        ));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn array_length_reads_and_truncates() {
        let mut data = TargetData::Array(vec![Value::from(1), Value::from(2), Value::from(3)]);
        assert_eq!(data.get(&Key::from(LENGTH_KEY)), Some(Value::from(3)));

        assert_eq!(data.truncate(1), Ok(vec![Value::from(2), Value::from(3)]));
        assert_eq!(data.len(), 1);
        assert!(data.truncate(4).is_err());
        assert_eq!(data.len(), 1);
    }

    #[test]
    fn converts_from_json() {
        let value = Value::from(serde_json::json!({ "list": [1, 2], "name": "x" }));
        let target = value.as_target().unwrap();
        assert_eq!(target.kind(), TargetKind::Object);
        assert_eq!(value.to_json(), serde_json::json!({ "list": [1.0, 2.0], "name": "x" }));
    }

    #[test]
    fn display_formats_integers_without_fraction() {
        assert_eq!(Value::from(3).to_string(), "3");
        assert_eq!(Value::from(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
