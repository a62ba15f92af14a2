//! Classes derived from other classes: `T?`, `Partial<T>`, `[]T`, open
//! records and enums.

use crate::class::{Class, ClassKey, Descriptors, Enumerable, Property, RecordContract, Setter};
use crate::native::Method;
use crate::primitives;
use crate::table::Binding;
use crate::value::{ArrayValue, EnumValue, RecordValue, Value};
use hyper_types::ast::Operator;
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

fn cannot_operate_nil(what: impl std::fmt::Display) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::CANNOT_OPERATE_NIL_VALUE,
        format!("cannot {what} on nil value"),
    )
}

fn present(value: &Value) -> Option<&Value> {
    match value {
        Value::Optional(optional) => optional.inner.as_deref(),
        Value::Nil => None,
        other => Some(other),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Optional
// ══════════════════════════════════════════════════════════════════════════════

/// `T?`. Wrapping an optional class returns it unchanged.
pub fn optional(inner: &Class) -> Class {
    if inner.is_optional() {
        return inner.clone();
    }
    let key = ClassKey::Optional(Box::new(inner.key().clone()));
    let name = format!("{inner}?");
    let source = inner.descriptors();
    let mut d = Descriptors {
        inner: Some(inner.clone()),
        ..Descriptors::default()
    };

    for ((op, right), handler) in source.operators.iter() {
        let (op, handler) = (*op, handler.clone());
        d.operators.insert(
            op,
            right.clone(),
            Arc::new(move |left, right| match present(left) {
                Some(value) => handler(value, right),
                None => Err(cannot_operate_nil(format!("apply {op}"))),
            }),
        );
    }
    for ((op, right), handler) in source.comparators.iter() {
        let (op, handler) = (*op, handler.clone());
        d.comparators.insert(
            op,
            right.clone(),
            Arc::new(move |left, right| match present(left) {
                Some(value) => handler(value, right),
                None if op == Operator::Eq => Ok(false),
                None if op == Operator::NotEq => Ok(true),
                None => Err(cannot_operate_nil(format!("compare with {op}"))),
            }),
        );
    }
    let equal = source.comparators.get(Operator::Eq, inner.key()).cloned();
    for op in [Operator::Eq, Operator::NotEq] {
        d.comparators.insert(
            op,
            ClassKey::Nil,
            Arc::new(move |left, _| Ok(present(left).is_none() == (op == Operator::Eq))),
        );
        let equal = equal.clone();
        d.comparators.insert(
            op,
            key.clone(),
            Arc::new(move |left, right| {
                let same = match (present(left), present(right)) {
                    (None, None) => true,
                    (Some(a), Some(b)) => match &equal {
                        Some(eq) => eq(a, b)?,
                        None => a == b,
                    },
                    _ => false,
                };
                Ok(same == (op == Operator::Eq))
            }),
        );
    }

    if let Some(properties) = &source.properties {
        let mut wrapped = BTreeMap::new();
        for (name, property) in properties {
            wrapped.insert(name.clone(), optional_property(property));
        }
        d.properties = Some(wrapped);
    }

    for (name, method) in &source.methods {
        let forward = method.clone();
        let label = name.clone();
        d.methods.insert(
            name.clone(),
            Method::new(
                method.arguments.clone(),
                method.returns.clone(),
                move |receiver, args| match present(receiver) {
                    Some(value) => forward.invoke(value, args),
                    None => Err(cannot_operate_nil(format!("call {label}"))),
                },
            ),
        );
    }

    Class::new(key, name, d)
}

fn optional_property(property: &Property) -> Property {
    let class = optional(&property.class);
    let getter = property.getter.clone();
    let wrapped_class = class.clone();
    let setter = property.setter.clone().map(|setter| -> Setter {
        Arc::new(move |target, value| match target {
            Value::Optional(optional) => match optional.inner.as_deref_mut() {
                Some(inner) => setter(inner, value),
                None => Err(cannot_operate_nil("set property")),
            },
            other => setter(other, value),
        })
    });
    Property {
        class,
        getter: Arc::new(move |target| match present(target) {
            Some(value) => Ok(Value::wrap(&wrapped_class, getter(value)?)),
            None => Ok(Value::absent(&wrapped_class)),
        }),
        setter,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Partial
// ══════════════════════════════════════════════════════════════════════════════

/// `Partial<T>`: T's properties, every one optional when constructing.
pub fn partial(inner: &Class) -> Result<Class> {
    if matches!(inner.key(), ClassKey::Partial(_)) {
        return Ok(inner.clone());
    }
    let source = inner.descriptors();
    let (Some(properties), Some(_)) = (&source.properties, source.record) else {
        return Err(InterpreterError::new(
            ErrorCode::INVALID_CLASS,
            format!("cannot create Partial<{inner}>: {inner} is not a record class"),
        ));
    };
    let d = Descriptors {
        properties: Some(properties.clone()),
        record: Some(RecordContract { all_optional: true }),
        inner: Some(inner.clone()),
        ..Descriptors::default()
    };
    Ok(Class::new(
        ClassKey::Partial(Box::new(inner.key().clone())),
        format!("Partial<{inner}>"),
        d,
    ))
}

// ══════════════════════════════════════════════════════════════════════════════
// Array
// ══════════════════════════════════════════════════════════════════════════════

/// `[]T` over shared ordered storage.
pub fn array(item: &Class) -> Class {
    let d = Descriptors {
        enumerable: Some(array_enumerable(item)),
        methods: array_methods(item),
        inner: Some(item.clone()),
        ..Descriptors::default()
    };
    Class::new(
        ClassKey::Array(Box::new(item.key().clone())),
        format!("[]{item}"),
        d,
    )
}

fn as_array(value: &Value) -> Result<&ArrayValue> {
    match value {
        Value::Array(array) => Ok(array),
        other => Err(InterpreterError::new(
            ErrorCode::CANNOT_ENUMERATE,
            format!("cannot enumerate {}", other.class()),
        )),
    }
}

fn checked_index(index: i64, len: usize) -> Result<usize> {
    usize::try_from(index)
        .ok()
        .filter(|i| *i < len)
        .ok_or_else(|| {
            InterpreterError::new(
                ErrorCode::INDEX_OUT_OF_RANGE,
                format!("index {index} out of range for length {len}"),
            )
        })
}

fn checked_range(start: i64, end: i64, len: usize) -> Result<(usize, usize)> {
    if start > end {
        return Err(InterpreterError::new(
            ErrorCode::INVALID_RANGE_INDICES,
            format!("invalid range {start}:{end}"),
        ));
    }
    let bound = |i: i64| usize::try_from(i).ok().filter(|i| *i <= len);
    match (bound(start), bound(end)) {
        (Some(s), Some(e)) => Ok((s, e)),
        _ => Err(InterpreterError::new(
            ErrorCode::INDEX_OUT_OF_RANGE,
            format!("range {start}:{end} out of range for length {len}"),
        )),
    }
}

fn array_enumerable(item: &Class) -> Enumerable {
    Enumerable {
        item: item.clone(),
        length: Arc::new(|value| Ok(as_array(value)?.len())),
        get_index: Arc::new(|value, index| {
            let array = as_array(value)?;
            let i = checked_index(index, array.len())?;
            array.get(i).ok_or_else(|| {
                InterpreterError::new(ErrorCode::INDEX_OUT_OF_RANGE, format!("index {index} out of range"))
            })
        }),
        set_index: Some(Arc::new(|value, index, item| {
            let array = as_array(value)?;
            let i = checked_index(index, array.len())?;
            array.set(i, item);
            Ok(())
        })),
        get_range: Arc::new(|value, start, end| {
            let array = as_array(value)?;
            let (s, e) = checked_range(start, end, array.len())?;
            Ok(Value::Array(array.slice(s, e)))
        }),
        set_range: Some(Arc::new(|value, start, end, replacement| {
            let array = as_array(value)?;
            let (s, e) = checked_range(start, end, array.len())?;
            let items = as_array(&replacement)?.items();
            array.splice(s, e, items);
            Ok(())
        })),
    }
}

fn array_methods(item: &Class) -> BTreeMap<String, Method> {
    let mut methods = BTreeMap::new();
    methods.insert(
        "append".to_string(),
        Method::new(vec![item.clone()], None, |receiver, args| {
            let array = as_array(receiver)?;
            for value in args {
                array.push(value);
            }
            Ok(Value::Nil)
        }),
    );
    methods.insert(
        "length".to_string(),
        Method::new(vec![], Some(primitives::int()), |receiver, _| {
            Ok(Value::Int(as_array(receiver)?.len() as i64))
        }),
    );
    methods
}

// ══════════════════════════════════════════════════════════════════════════════
// Records
// ══════════════════════════════════════════════════════════════════════════════

/// Property stored as a field of a record value.
pub fn record_property(name: &str, class: &Class) -> Property {
    let field = name.to_string();
    let read = field.clone();
    Property {
        class: class.clone(),
        getter: Arc::new(move |target| match target {
            Value::Record(record) => record.get(&read).ok_or_else(|| {
                InterpreterError::new(ErrorCode::UNSET_PROPERTY, format!("property {read} is not set"))
            }),
            other => Err(InterpreterError::new(
                ErrorCode::CANNOT_ACCESS_PROPERTY,
                format!("cannot read property {read} of {}", other.class()),
            )),
        }),
        setter: Some(Arc::new(move |target, value| match target {
            Value::Record(record) => {
                record.set(&field, value);
                Ok(())
            }
            other => Err(InterpreterError::new(
                ErrorCode::CANNOT_SET_PROPERTY,
                format!("cannot set property {field} of {}", other.class()),
            )),
        })),
    }
}

pub(crate) fn record_descriptors(fields: &BTreeMap<String, Class>) -> Descriptors {
    Descriptors {
        properties: Some(
            fields
                .iter()
                .map(|(name, class)| (name.clone(), record_property(name, class)))
                .collect(),
        ),
        record: Some(RecordContract { all_optional: false }),
        ..Descriptors::default()
    }
}

/// Untyped structural record, as built by an object pattern.
pub fn open_record(fields: BTreeMap<String, Class>) -> Class {
    let key = ClassKey::Record(
        fields
            .iter()
            .map(|(name, class)| (name.clone(), class.key().clone()))
            .collect(),
    );
    let name = format!(
        "{{{}}}",
        fields
            .iter()
            .map(|(field, class)| format!("{field}: {class}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    Class::new(key, name, record_descriptors(&fields))
}

/// Build a record value of `class` from already constructed fields.
pub fn record_value(class: &Class, fields: BTreeMap<String, Value>) -> Value {
    Value::Record(RecordValue::new(class.clone(), fields))
}

// ══════════════════════════════════════════════════════════════════════════════
// Enums
// ══════════════════════════════════════════════════════════════════════════════

/// An enum whose items are `(name, value)` pairs, exposed as static members.
///
/// Values are constructible from `String`, matching either the item value or
/// its name.
pub fn enumeration(name: &str, items: Vec<(String, String)>) -> Class {
    let key = ClassKey::Enum {
        name: name.to_string(),
        items: items.iter().map(|(item, _)| item.clone()).collect(),
    };
    let label = name.to_string();
    Class::new_cyclic(key.clone(), name, move |this| {
        let mut d = Descriptors::default();
        for (item, value) in &items {
            d.statics.insert(
                item.clone(),
                Binding::Value(Value::Enum(EnumValue {
                    class: this.clone(),
                    item: item.clone(),
                    value: value.clone(),
                })),
            );
        }
        let this_class = this.clone();
        d.constructors.insert(
            ClassKey::String,
            Arc::new(move |source| {
                let text = source.as_str().unwrap_or_default();
                items
                    .iter()
                    .find(|(item, value)| value == text || item == text)
                    .map(|(item, value)| {
                        Value::Enum(EnumValue {
                            class: this_class.clone(),
                            item: item.clone(),
                            value: value.clone(),
                        })
                    })
                    .ok_or_else(|| {
                        InterpreterError::new(
                            ErrorCode::CANNOT_UNMARSHAL,
                            format!("{text:?} is not a valid {label}"),
                        )
                    })
            }),
        );
        for op in [Operator::Eq, Operator::NotEq] {
            let is_eq = op == Operator::Eq;
            d.comparators.insert(
                op,
                key.clone(),
                Arc::new(move |left, right| match (left, right) {
                    (Value::Enum(a), Value::Enum(b)) => Ok((a.item == b.item) == is_eq),
                    _ => Ok(!is_eq),
                }),
            );
            d.comparators.insert(
                op,
                ClassKey::String,
                Arc::new(move |left, right| match (left, right) {
                    (Value::Enum(a), Value::String(b)) => Ok((&a.value == b) == is_eq),
                    _ => Ok(!is_eq),
                }),
            );
        }
        let mut properties = BTreeMap::new();
        properties.insert(
            "value".to_string(),
            Property {
                class: primitives::string(),
                getter: Arc::new(|target| match target {
                    Value::Enum(item) => Ok(Value::String(item.value.clone())),
                    other => Ok(Value::String(other.to_string())),
                }),
                setter: None,
            },
        );
        d.properties = Some(properties);
        d
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine;

    #[test]
    fn test_optional_is_idempotent() {
        let once = optional(&primitives::string());
        let twice = optional(&once);
        assert_eq!(once, twice);
        assert_eq!(twice.name(), "String?");
    }

    #[test]
    fn test_optional_compares_with_nil() {
        let class = optional(&primitives::int());
        let absent = Value::absent(&class);
        let some = Value::wrap(&class, Value::Int(1));
        assert!(engine::compare(Operator::Eq, &absent, &Value::Nil).unwrap());
        assert!(engine::compare(Operator::NotEq, &some, &Value::Nil).unwrap());
        assert!(engine::compare(Operator::Eq, &some, &Value::Int(1)).unwrap());
        assert!(!engine::compare(Operator::Eq, &absent, &Value::Int(1)).unwrap());
    }

    #[test]
    fn test_optional_operate_on_absent_fails() {
        let class = optional(&primitives::int());
        let err = engine::operate(Operator::Add, &Value::absent(&class), &Value::Int(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_OPERATE_NIL_VALUE);
    }

    #[test]
    fn test_partial_requires_record() {
        let err = partial(&primitives::string()).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_CLASS);

        let foo = open_record(BTreeMap::from([("a".to_string(), primitives::string())]));
        let partial_foo = partial(&foo).unwrap();
        assert_eq!(partial_foo.name(), "Partial<{a: String}>");
        assert_eq!(partial(&partial_foo).unwrap(), partial_foo);
    }

    #[test]
    fn test_array_range_errors() {
        let class = array(&primitives::int());
        let value = Value::Array(ArrayValue::new(class.clone(), vec![Value::Int(1), Value::Int(2)]));
        let enumerable = class.enumerable().unwrap();
        assert_eq!((enumerable.get_index)(&value, 1).unwrap(), Value::Int(2));
        assert_eq!(
            (enumerable.get_index)(&value, 2).unwrap_err().code,
            ErrorCode::INDEX_OUT_OF_RANGE
        );
        assert_eq!(
            (enumerable.get_range)(&value, 2, 1).unwrap_err().code,
            ErrorCode::INVALID_RANGE_INDICES
        );
        assert_eq!(
            (enumerable.get_range)(&value, 0, 3).unwrap_err().code,
            ErrorCode::INDEX_OUT_OF_RANGE
        );
        let head = (enumerable.get_range)(&value, 0, 1).unwrap();
        assert_eq!(head.class(), class);
    }

    #[test]
    fn test_enum_items_and_constructor() {
        let role = enumeration(
            "Role",
            vec![("Admin".into(), "admin".into()), ("User".into(), "user".into())],
        );
        let admin = engine::construct(&role, Value::String("admin".into())).unwrap();
        match role.static_member("Admin") {
            Some(Binding::Value(item)) => {
                assert!(engine::compare(Operator::Eq, &admin, item).unwrap())
            }
            _ => panic!("expected enum item"),
        }
        let by_name = engine::construct(&role, Value::String("User".into())).unwrap();
        assert_eq!(by_name.export(), serde_json::json!("user"));
        let err = engine::construct(&role, Value::String("guest".into())).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_UNMARSHAL);
    }
}
