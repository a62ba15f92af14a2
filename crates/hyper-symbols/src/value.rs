//! Runtime values and their class-only counterparts.

use crate::class::{Class, ClassKey};
use crate::derived;
use crate::engine;
use crate::primitives;
use chrono::{DateTime, SecondsFormat, Utc};
use hyper_types::{ErrorCode, InterpreterError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A class paired with runtime data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    String(String),
    Number(f64),
    Double(f64),
    Float(f64),
    Int(i64),
    DateTime(DateTime<Utc>),
    Error(ErrorValue),
    Array(ArrayValue),
    Record(RecordValue),
    Optional(OptionalValue),
    Enum(EnumValue),
}

impl Value {
    pub fn class(&self) -> Class {
        match self {
            Value::Nil => primitives::nil(),
            Value::Bool(_) => primitives::boolean(),
            Value::String(_) => primitives::string(),
            Value::Number(_) => primitives::number(),
            Value::Double(_) => primitives::double(),
            Value::Float(_) => primitives::float(),
            Value::Int(_) => primitives::int(),
            Value::DateTime(_) => primitives::date_time(),
            Value::Error(_) => primitives::error(),
            Value::Array(array) => array.class.clone(),
            Value::Record(record) => record.class.clone(),
            Value::Optional(optional) => optional.class.clone(),
            Value::Enum(item) => item.class.clone(),
        }
    }

    /// An absent value of the optional class `optional`.
    pub fn absent(optional: &Class) -> Value {
        Value::Optional(OptionalValue {
            class: optional.clone(),
            inner: None,
        })
    }

    /// Wrap `value` into the optional class `optional`; nested optionals flatten.
    pub fn wrap(optional: &Class, value: Value) -> Value {
        let inner = match value {
            Value::Optional(nested) => nested.inner,
            Value::Nil => None,
            other => Some(Box::new(other)),
        };
        Value::Optional(OptionalValue {
            class: optional.clone(),
            inner,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any member of the numeric family as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) | Value::Double(n) | Value::Float(n) => Some(*n),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Native representation handed to hosts.
    pub fn export(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Nil => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::String(s) => Json::String(s.clone()),
            Value::Number(n) | Value::Double(n) | Value::Float(n) => export_float(*n),
            Value::Int(i) => Json::from(*i),
            Value::DateTime(dt) => {
                serde_json::json!({ "$date": dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
            }
            Value::Error(err) => serde_json::json!({ "name": err.name, "message": err.message }),
            Value::Array(array) => Json::Array(array.items().iter().map(Value::export).collect()),
            Value::Record(record) => Json::Object(
                record
                    .fields()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.export()))
                    .collect(),
            ),
            Value::Optional(optional) => optional
                .inner
                .as_deref()
                .map_or(Json::Null, Value::export),
            Value::Enum(item) => Json::String(item.value.clone()),
        }
    }

    /// Import a native JSON value.
    ///
    /// Integers become `Int`, other numbers `Float`, objects open records,
    /// `{"$date": ...}` a `DateTime`. Array items are constructed into the
    /// narrowest class covering all of them: mixed numbers widen to
    /// `Number`, `null` items make the class Optional and records with
    /// different fields merge, fields missing on one side becoming Optional.
    /// Items with no common class fail with cannot-unmarshal.
    pub fn from_json(json: &serde_json::Value) -> Result<Value> {
        use serde_json::Value as Json;
        match json {
            Json::Null => Ok(Value::Nil),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Value::Int(i)),
                (None, Some(f)) => Ok(Value::Float(f)),
                (None, None) => Err(unmarshal(format!("cannot unmarshal number {n}"))),
            },
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(items) => {
                let items = items.iter().map(Value::from_json).collect::<Result<Vec<_>>>()?;
                let mut classes = items.iter().map(Value::class);
                let item_class = match classes.next() {
                    Some(first) => classes.try_fold(first, |wide, class| {
                        widen(&wide, &class).ok_or_else(|| {
                            unmarshal(format!(
                                "cannot unmarshal array with mixed items {wide} and {class}"
                            ))
                        })
                    })?,
                    None => derived::open_record(BTreeMap::new()),
                };
                let items = items
                    .into_iter()
                    .map(|item| engine::construct(&item_class, item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Array(ArrayValue::new(derived::array(&item_class), items)))
            }
            Json::Object(map) => {
                if let (1, Some(Json::String(date))) = (map.len(), map.get("$date")) {
                    return primitives::parse_date_time(date).map(Value::DateTime);
                }
                let mut fields = BTreeMap::new();
                for (key, value) in map {
                    fields.insert(key.clone(), Value::from_json(value)?);
                }
                let class = derived::open_record(
                    fields.iter().map(|(k, v)| (k.clone(), v.class())).collect(),
                );
                Ok(Value::Record(RecordValue::new(class, fields)))
            }
        }
    }
}

fn unmarshal(message: String) -> InterpreterError {
    InterpreterError::new(ErrorCode::CANNOT_UNMARSHAL, message)
}

/// Integral floats export as JSON integers while they are exact.
fn export_float(n: f64) -> serde_json::Value {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Value::from(n)
    }
}

fn is_numeric(key: &ClassKey) -> bool {
    matches!(
        key,
        ClassKey::Number | ClassKey::Double | ClassKey::Float | ClassKey::Int
    )
}

fn record_fields(class: &Class) -> BTreeMap<String, Class> {
    class
        .descriptors()
        .properties
        .iter()
        .flatten()
        .map(|(name, property)| (name.clone(), property.class.clone()))
        .collect()
}

/// Narrowest class two imported classes both construct into.
fn widen(a: &Class, b: &Class) -> Option<Class> {
    if a == b {
        return Some(a.clone());
    }
    let present = |class: &Class| {
        if class.is_optional() {
            class.inner().cloned()
        } else {
            Some(class.clone())
        }
    };
    match (a.key(), b.key()) {
        (ClassKey::Nil, _) => Some(derived::optional(b)),
        (_, ClassKey::Nil) => Some(derived::optional(a)),
        (ClassKey::Optional(_), _) | (_, ClassKey::Optional(_)) => {
            widen(&present(a)?, &present(b)?).map(|class| derived::optional(&class))
        }
        (left, right) if is_numeric(left) && is_numeric(right) => Some(primitives::number()),
        (ClassKey::Array(_), ClassKey::Array(_)) => {
            widen(a.inner()?, b.inner()?).map(|item| derived::array(&item))
        }
        (ClassKey::Record(_), ClassKey::Record(_)) => {
            let mut left = record_fields(a);
            let right = record_fields(b);
            let mut fields = BTreeMap::new();
            for (name, class) in right {
                let merged = match left.remove(&name) {
                    Some(other) => widen(&other, &class)?,
                    None => derived::optional(&class),
                };
                fields.insert(name, merged);
            }
            for (name, class) in left {
                fields.insert(name, derived::optional(&class));
            }
            Some(derived::open_record(fields))
        }
        _ => None,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => f.write_str(s),
            Value::Number(n) | Value::Double(n) | Value::Float(n) => write!(f, "{n}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Error(err) => write!(f, "{}: {}", err.name, err.message),
            Value::Array(array) => {
                f.write_str("[")?;
                for (i, item) in array.items().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Record(record) => {
                f.write_str("{")?;
                for (i, (key, value)) in record.fields().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Optional(optional) => match optional.inner.as_deref() {
                Some(inner) => write!(f, "{inner}"),
                None => f.write_str("nil"),
            },
            Value::Enum(item) => f.write_str(&item.value),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Compound values
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<&InterpreterError> for ErrorValue {
    fn from(err: &InterpreterError) -> Self {
        ErrorValue::new(err.name(), err.message.clone())
    }
}

/// Shared, ordered storage of an array class.
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub class: Class,
    items: Arc<RwLock<Vec<Value>>>,
}

impl ArrayValue {
    pub fn new(class: Class, items: Vec<Value>) -> Self {
        Self {
            class,
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Snapshot of the current items.
    pub fn items(&self) -> Vec<Value> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.read().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.write().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Value) {
        self.items.write().push(value);
    }

    /// Copy of `[start, end)` in fresh storage.
    pub fn slice(&self, start: usize, end: usize) -> ArrayValue {
        let items = self.items.read()[start..end].to_vec();
        ArrayValue::new(self.class.clone(), items)
    }

    /// Replace `[start, end)` with `replacement`.
    pub fn splice(&self, start: usize, end: usize, replacement: Vec<Value>) {
        self.items.write().splice(start..end, replacement);
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.items, &other.items) {
            return self.class == other.class;
        }
        self.class == other.class && *self.items.read() == *other.items.read()
    }
}

/// Shared field storage of a record class.
#[derive(Debug, Clone)]
pub struct RecordValue {
    pub class: Class,
    fields: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl RecordValue {
    pub fn new(class: Class, fields: BTreeMap<String, Value>) -> Self {
        Self {
            class,
            fields: Arc::new(RwLock::new(fields)),
        }
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        self.fields.read().get(field).cloned()
    }

    pub fn set(&self, field: &str, value: Value) {
        self.fields.write().insert(field.to_string(), value);
    }

    /// Snapshot of the current fields.
    pub fn fields(&self) -> BTreeMap<String, Value> {
        self.fields.read().clone()
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.fields, &other.fields) {
            return self.class == other.class;
        }
        self.class == other.class && *self.fields.read() == *other.fields.read()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalValue {
    pub class: Class,
    pub inner: Option<Box<Value>>,
}

impl OptionalValue {
    pub fn is_present(&self) -> bool {
        self.inner.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub class: Class,
    pub item: String,
    pub value: String,
}

/// A class standing in for a value during type-checking.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedValue {
    pub class: Class,
}

impl ExpectedValue {
    pub fn new(class: Class) -> Self {
        Self { class }
    }
}
