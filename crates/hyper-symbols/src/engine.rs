//! Construct, Compare and Operate, with their value-free predicates.
//!
//! Every `should_*` predicate accepts exactly the class pairs its runtime
//! counterpart accepts. The type-check interpreter leans on that to
//! predict the class of every expression without running anything.

use crate::class::{Class, ClassKey, DispatchTable, RecordContract};
use crate::derived;
use crate::primitives;
use crate::value::{ArrayValue, Value};
use hyper_types::ast::Operator;
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::collections::BTreeMap;

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

pub(crate) fn cannot_construct(target: &Class, source: &Class) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::CANNOT_CONSTRUCT,
        format!("cannot construct {target} from {source}"),
    )
}

fn unknown_property(target: &Class, name: &str) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::UNKNOWN_PROPERTY,
        format!("{target} has no property {name}"),
    )
}

fn missing_property(target: &Class, name: &str) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::MISSING_PROPERTY,
        format!("missing property {name} for {target}"),
    )
}

fn undefined_operator(op: Operator, left: &Class, right: &Class) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::UNDEFINED_OPERATOR,
        format!("{op} operator not defined between {left} and {right}"),
    )
}

fn invalid_operator(op: Operator, expected: &str) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::INVALID_OPERATOR,
        format!("{op} is not {expected}"),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Construct
// ══════════════════════════════════════════════════════════════════════════════

/// Turn `source` into a value of `target`.
///
/// Tried in order: exact class, registered constructor (or item-wise array
/// conversion), open record into a record class, optional wrapping, and
/// finally coercion of an object class into an open record.
pub fn construct(target: &Class, source: Value) -> Result<Value> {
    let source_class = source.class();
    if *target == source_class || *target.key() == ClassKey::Any {
        return Ok(source);
    }
    let descriptors = target.descriptors();

    if let Some(constructor) = descriptors.constructors.get(source_class.key()) {
        return constructor(&source);
    }
    if let (Some(item), Value::Array(array)) = (array_item(target), &source) {
        let items = array
            .items()
            .into_iter()
            .map(|value| construct(&item, value))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Array(ArrayValue::new(target.clone(), items)));
    }

    if let (Some(contract), Value::Record(record)) = (descriptors.record, &source) {
        if source_class.is_open_record() {
            return construct_record(target, contract, record.fields());
        }
    }

    if let Some(inner) = optional_inner(target) {
        return match source {
            Value::Nil => Ok(Value::absent(target)),
            Value::Optional(optional) => match optional.inner {
                Some(value) => Ok(Value::wrap(target, construct(&inner, *value)?)),
                None => {
                    should_construct(target, &source_class)?;
                    Ok(Value::absent(target))
                }
            },
            other => Ok(Value::wrap(target, construct(&inner, other)?)),
        };
    }

    if accepts_records(target) {
        if let Some(coerced) = coerced_class(&source_class) {
            tracing::trace!(class = %target, from = %source_class, "constructing through record coercion");
            let record = coerce(&source, &source_class, &coerced)?;
            return construct(target, record);
        }
    }

    Err(cannot_construct(target, &source_class))
}

/// Class-level twin of [`construct`].
pub fn should_construct(target: &Class, source: &Class) -> Result<()> {
    if target == source || *target.key() == ClassKey::Any {
        return Ok(());
    }
    let descriptors = target.descriptors();

    if descriptors.constructors.contains_key(source.key()) {
        return Ok(());
    }
    if let (Some(item), Some(source_item)) = (array_item(target), array_item(source)) {
        return should_construct(&item, &source_item);
    }

    if let Some(contract) = descriptors.record {
        if source.is_open_record() {
            return should_construct_record(target, contract, source);
        }
    }

    if let Some(inner) = optional_inner(target) {
        return match source.key() {
            ClassKey::Nil => Ok(()),
            ClassKey::Optional(_) => match source.inner() {
                Some(source_inner) => should_construct(&inner, source_inner),
                None => Err(cannot_construct(target, source)),
            },
            _ => should_construct(&inner, source),
        };
    }

    if accepts_records(target) {
        if let Some(coerced) = coerced_class(source) {
            return should_construct(target, &coerced);
        }
    }

    Err(cannot_construct(target, source))
}

fn construct_record(
    target: &Class,
    contract: RecordContract,
    mut fields: BTreeMap<String, Value>,
) -> Result<Value> {
    let empty = BTreeMap::new();
    let properties = target.descriptors().properties.as_ref().unwrap_or(&empty);
    if let Some(extra) = fields.keys().find(|key| !properties.contains_key(*key)) {
        return Err(unknown_property(target, extra));
    }
    let mut out = BTreeMap::new();
    for (name, property) in properties {
        match fields.remove(name) {
            Some(value) => {
                out.insert(name.clone(), construct(&property.class, value)?);
            }
            None if property.class.is_optional() => {
                out.insert(name.clone(), Value::absent(&property.class));
            }
            None if contract.all_optional => {}
            None => return Err(missing_property(target, name)),
        }
    }
    Ok(derived::record_value(target, out))
}

fn should_construct_record(target: &Class, contract: RecordContract, source: &Class) -> Result<()> {
    let empty = BTreeMap::new();
    let properties = target.descriptors().properties.as_ref().unwrap_or(&empty);
    let fields = source.descriptors().properties.as_ref().unwrap_or(&empty);
    if let Some(extra) = fields.keys().find(|key| !properties.contains_key(*key)) {
        return Err(unknown_property(target, extra));
    }
    for (name, property) in properties {
        match fields.get(name) {
            Some(field) => should_construct(&property.class, &field.class)?,
            None if property.class.is_optional() || contract.all_optional => {}
            None => return Err(missing_property(target, name)),
        }
    }
    Ok(())
}

fn array_item(class: &Class) -> Option<Class> {
    class.is_array().then(|| class.inner().cloned()).flatten()
}

fn optional_inner(class: &Class) -> Option<Class> {
    class.is_optional().then(|| class.inner().cloned()).flatten()
}

/// Whether an open record could ever be constructed into `target`.
fn accepts_records(target: &Class) -> bool {
    let descriptors = target.descriptors();
    descriptors.record.is_some()
        || descriptors
            .constructors
            .keys()
            .any(|key| matches!(key, ClassKey::Record(_)))
        || optional_inner(target).is_some_and(|inner| accepts_records(&inner))
}

// ══════════════════════════════════════════════════════════════════════════════
// Record coercion
// ══════════════════════════════════════════════════════════════════════════════

/// The open record class an object class coerces to, if it has properties.
///
/// Fields of a `Partial<T>` source become optional.
pub fn coerced_class(source: &Class) -> Option<Class> {
    if source.is_optional() || source.is_open_record() {
        return None;
    }
    let properties = source.descriptors().properties.as_ref()?;
    let partial = source.descriptors().record.is_some_and(|r| r.all_optional);
    let fields = properties
        .iter()
        .map(|(name, property)| {
            let class = if partial {
                derived::optional(&property.class)
            } else {
                property.class.clone()
            };
            (name.clone(), class)
        })
        .collect();
    Some(derived::open_record(fields))
}

fn coerce(source: &Value, source_class: &Class, coerced: &Class) -> Result<Value> {
    let partial = source_class.descriptors().record.is_some_and(|r| r.all_optional);
    let mut fields = BTreeMap::new();
    if let Some(properties) = source_class.descriptors().properties.as_ref() {
        for (name, property) in properties {
            let value = if partial {
                let stored = match source {
                    Value::Record(record) => record.get(name),
                    _ => None,
                };
                let class = coerced
                    .property(name)
                    .map(|p| p.class.clone())
                    .unwrap_or_else(|| derived::optional(&property.class));
                Value::wrap(&class, stored.unwrap_or(Value::Nil))
            } else {
                (property.getter)(source)?
            };
            fields.insert(name.clone(), value);
        }
    }
    Ok(derived::record_value(coerced, fields))
}

fn spread_error(class: &Class) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::INVALID_SPREAD_TARGET,
        format!("cannot spread value without properties: {class}"),
    )
}

/// Fields contributed by `...value` in an object pattern.
pub fn spread_fields(value: &Value) -> Result<BTreeMap<String, Value>> {
    let class = value.class();
    if class.is_open_record() {
        if let Value::Record(record) = value {
            return Ok(record.fields());
        }
    }
    let coerced = coerced_class(&class).ok_or_else(|| spread_error(&class))?;
    match coerce(value, &class, &coerced)? {
        Value::Record(record) => Ok(record.fields()),
        _ => Err(spread_error(&class)),
    }
}

/// Field classes contributed by spreading a value of `class`.
pub fn spread_classes(class: &Class) -> Result<BTreeMap<String, Class>> {
    let record = if class.is_open_record() {
        class.clone()
    } else {
        coerced_class(class).ok_or_else(|| spread_error(class))?
    };
    Ok(record
        .descriptors()
        .properties
        .as_ref()
        .map(|properties| {
            properties
                .iter()
                .map(|(name, property)| (name.clone(), property.class.clone()))
                .collect()
        })
        .unwrap_or_default())
}

// ══════════════════════════════════════════════════════════════════════════════
// Operate / Compare
// ══════════════════════════════════════════════════════════════════════════════

/// Find the handler for `right`, unwrapping an optional right operand.
fn dispatch<'a, F>(
    table: &'a DispatchTable<F>,
    op: Operator,
    left: &Class,
    right: &Value,
) -> Result<(&'a F, Value)> {
    let right_class = right.class();
    if let Some(handler) = table.get(op, right_class.key()) {
        return Ok((handler, right.clone()));
    }
    if let Value::Optional(optional) = right {
        let unwrapped = optional.inner.as_deref().cloned().unwrap_or(Value::Nil);
        if let Some(handler) = table.get(op, unwrapped.class().key()) {
            return Ok((handler, unwrapped));
        }
        if optional.inner.is_none() {
            return Err(InterpreterError::new(
                ErrorCode::CANNOT_OPERATE_NIL_VALUE,
                format!("cannot apply {op} to {left} and nil"),
            ));
        }
    }
    Err(undefined_operator(op, left, &right_class))
}

fn should_dispatch<F>(table: &DispatchTable<F>, op: Operator, left: &Class, right: &Class) -> Result<()> {
    if table.contains(op, right.key()) {
        return Ok(());
    }
    if let Some(inner) = optional_inner(right) {
        if table.contains(op, inner.key()) {
            return Ok(());
        }
    }
    Err(undefined_operator(op, left, right))
}

/// Apply an arithmetic operator; the result is constructed into the left class.
pub fn operate(op: Operator, left: &Value, right: &Value) -> Result<Value> {
    if !op.is_arithmetic() {
        return Err(invalid_operator(op, "an arithmetic operator"));
    }
    let left_class = left.class();
    let (handler, right) = dispatch(&left_class.descriptors().operators, op, &left_class, right)?;
    let out = handler(left, &right)?;
    construct(&left_class, out)
}

/// Class-level twin of [`operate`]; yields the result class.
pub fn should_operate(op: Operator, left: &Class, right: &Class) -> Result<Class> {
    if !op.is_arithmetic() {
        return Err(invalid_operator(op, "an arithmetic operator"));
    }
    should_dispatch(&left.descriptors().operators, op, left, right)?;
    Ok(left.clone())
}

pub fn compare(op: Operator, left: &Value, right: &Value) -> Result<bool> {
    if !op.is_comparator() {
        return Err(invalid_operator(op, "a comparator"));
    }
    let left_class = left.class();
    let (handler, right) = dispatch(&left_class.descriptors().comparators, op, &left_class, right)?;
    handler(left, &right)
}

/// Class-level twin of [`compare`]; yields `Bool`.
pub fn should_compare(op: Operator, left: &Class, right: &Class) -> Result<Class> {
    if !op.is_comparator() {
        return Err(invalid_operator(op, "a comparator"));
    }
    should_dispatch(&left.descriptors().comparators, op, left, right)?;
    Ok(primitives::boolean())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use crate::value::{ErrorValue, RecordValue};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn foo() -> Class {
        ClassBuilder::record(
            "Foo",
            [
                ("a".to_string(), primitives::string()),
                ("b".to_string(), primitives::int()),
            ],
        )
        .build()
    }

    fn record(fields: Vec<(&str, Value)>) -> Value {
        let fields: BTreeMap<String, Value> =
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        let class = derived::open_record(fields.iter().map(|(k, v)| (k.clone(), v.class())).collect());
        Value::Record(RecordValue::new(class, fields))
    }

    #[test]
    fn test_exact_match_returns_source() {
        let value = Value::String("abc".into());
        assert_eq!(construct(&primitives::string(), value.clone()).unwrap(), value);
        should_construct(&primitives::string(), &primitives::string()).unwrap();
    }

    #[test]
    fn test_numeric_constructors() {
        assert_eq!(construct(&primitives::int(), Value::Float(2.9)).unwrap(), Value::Int(2));
        assert_eq!(construct(&primitives::number(), Value::Int(2)).unwrap(), Value::Number(2.0));
        assert_eq!(
            construct(&primitives::string(), Value::Int(42)).unwrap(),
            Value::String("42".into())
        );
    }

    #[test]
    fn test_bool_into_number_fails_both_ways() {
        let err = construct(&primitives::number(), Value::Bool(true)).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_CONSTRUCT);
        assert_eq!(err.message, "cannot construct Number from Bool");
        let err = should_construct(&primitives::number(), &primitives::boolean()).unwrap_err();
        assert_eq!(err.message, "cannot construct Number from Bool");
    }

    #[test]
    fn test_record_construction() {
        let source = record(vec![("a", Value::String("abc".into())), ("b", Value::Int(0))]);
        let out = construct(&foo(), source.clone()).unwrap();
        assert_eq!(out.class(), foo());
        assert_eq!(out.export(), serde_json::json!({ "a": "abc", "b": 0 }));
        should_construct(&foo(), &source.class()).unwrap();
    }

    #[test]
    fn test_record_field_errors() {
        let extra = record(vec![
            ("a", Value::String("abc".into())),
            ("b", Value::Int(0)),
            ("c", Value::Bool(true)),
        ]);
        assert_eq!(construct(&foo(), extra.clone()).unwrap_err().code, ErrorCode::UNKNOWN_PROPERTY);
        assert_eq!(
            should_construct(&foo(), &extra.class()).unwrap_err().code,
            ErrorCode::UNKNOWN_PROPERTY
        );

        let missing = record(vec![("a", Value::String("abc".into()))]);
        assert_eq!(construct(&foo(), missing.clone()).unwrap_err().code, ErrorCode::MISSING_PROPERTY);
        assert_eq!(
            should_construct(&foo(), &missing.class()).unwrap_err().code,
            ErrorCode::MISSING_PROPERTY
        );
    }

    #[test]
    fn test_optional_field_may_be_omitted() {
        let class = ClassBuilder::record(
            "Bar",
            [("note".to_string(), derived::optional(&primitives::string()))],
        )
        .build();
        let out = construct(&class, record(vec![])).unwrap();
        assert_eq!(out.export(), serde_json::json!({ "note": null }));
    }

    #[test]
    fn test_partial_allows_missing_fields() {
        let partial = derived::partial(&foo()).unwrap();
        let out = construct(&partial, record(vec![("b", Value::Int(1))])).unwrap();
        assert_eq!(out.export(), serde_json::json!({ "b": 1 }));
    }

    #[test]
    fn test_string_from_record_fails() {
        let source = record(vec![("a", Value::String("abc".into())), ("b", Value::Int(0))]);
        let err = construct(&primitives::string(), source.clone()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_CONSTRUCT);
        let err = should_construct(&primitives::string(), &source.class()).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_CONSTRUCT);
    }

    #[test]
    fn test_object_coerces_into_other_record_class() {
        let value = construct(
            &foo(),
            record(vec![("a", Value::String("x".into())), ("b", Value::Int(1))]),
        )
        .unwrap();
        let shape = derived::open_record(BTreeMap::from([
            ("a".to_string(), primitives::string()),
            ("b".to_string(), primitives::number()),
        ]));
        let out = construct(&shape, value).unwrap();
        assert_eq!(out.class(), shape);
        should_construct(&shape, &foo()).unwrap();
    }

    #[test]
    fn test_error_from_record() {
        let source = record(vec![("message", Value::String("boom".into()))]);
        let out = construct(&primitives::error(), source).unwrap();
        assert_eq!(out, Value::Error(ErrorValue::new("Error", "boom")));
    }

    #[test]
    fn test_optional_wrapping() {
        let class = derived::optional(&primitives::number());
        assert_eq!(construct(&class, Value::Nil).unwrap(), Value::absent(&class));
        let out = construct(&class, Value::Int(1)).unwrap();
        assert_eq!(out, Value::wrap(&class, Value::Number(1.0)));
        should_construct(&class, &primitives::int()).unwrap();
        should_construct(&class, &primitives::nil()).unwrap();
        assert!(should_construct(&primitives::number(), &class).is_err());
    }

    #[test]
    fn test_array_item_conversion() {
        let ints = derived::array(&primitives::int());
        let numbers = derived::array(&primitives::number());
        let source = Value::Array(ArrayValue::new(ints.clone(), vec![Value::Int(1)]));
        let out = construct(&numbers, source).unwrap();
        assert_eq!(out.class(), numbers);
        should_construct(&numbers, &ints).unwrap();
        assert!(should_construct(&numbers, &derived::array(&primitives::boolean())).is_err());
    }

    #[test]
    fn test_operate_constructs_into_left_class() {
        let out = operate(Operator::Add, &Value::Int(1), &Value::Float(1.5)).unwrap();
        assert_eq!(out, Value::Int(2));
        assert_eq!(
            should_operate(Operator::Add, &primitives::int(), &primitives::float()).unwrap(),
            primitives::int()
        );
    }

    #[test]
    fn test_operator_kind_mismatch() {
        let err = operate(Operator::Eq, &Value::Int(1), &Value::Int(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_OPERATOR);
        let err = compare(Operator::Add, &Value::Int(1), &Value::Int(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_OPERATOR);
    }

    #[test]
    fn test_undefined_operator() {
        let err = operate(Operator::Sub, &Value::String("a".into()), &Value::String("b".into()))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UNDEFINED_OPERATOR);
        assert_eq!(err.message, "- operator not defined between String and String");
        let err = should_compare(Operator::Lt, &primitives::boolean(), &primitives::boolean())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UNDEFINED_OPERATOR);
    }

    #[test]
    fn test_optional_right_operand() {
        let class = derived::optional(&primitives::int());
        let present = Value::wrap(&class, Value::Int(2));
        assert_eq!(operate(Operator::Mul, &Value::Int(3), &present).unwrap(), Value::Int(6));
        let err = operate(Operator::Mul, &Value::Int(3), &Value::absent(&class)).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_OPERATE_NIL_VALUE);
        should_operate(Operator::Mul, &primitives::int(), &class).unwrap();
    }

    #[test]
    fn test_spread_of_object_and_error() {
        let fields = spread_fields(&Value::Error(ErrorValue::new("E", "m"))).unwrap();
        assert_eq!(fields.get("message"), Some(&Value::String("m".into())));
        let err = spread_fields(&Value::Int(1)).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_SPREAD_TARGET);
        assert_eq!(
            spread_classes(&primitives::int()).unwrap_err().code,
            ErrorCode::INVALID_SPREAD_TARGET
        );
    }

    #[test]
    fn test_absent_optional_needs_compatible_inner() {
        let ints = derived::optional(&primitives::int());
        let bools = derived::optional(&primitives::boolean());
        let err = construct(&ints, Value::absent(&bools)).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_CONSTRUCT);
        assert!(should_construct(&ints, &bools).is_err());

        let numbers = derived::optional(&primitives::number());
        assert_eq!(construct(&numbers, Value::absent(&ints)).unwrap(), Value::absent(&numbers));
    }

    proptest! {
        #[test]
        fn prop_construct_is_idempotent(n in any::<i64>(), f in -1.0e9f64..1.0e9) {
            for target in [primitives::int(), primitives::number(), primitives::float(), primitives::string()] {
                for source in [Value::Int(n), Value::Float(f)] {
                    let once = construct(&target, source).unwrap();
                    let twice = construct(&target, once.clone()).unwrap();
                    prop_assert_eq!(once, twice);
                }
            }
        }

        #[test]
        fn prop_should_construct_agrees_with_construct(n in any::<i64>(), b in any::<bool>()) {
            let classes = [
                primitives::int(),
                primitives::number(),
                primitives::string(),
                primitives::boolean(),
                primitives::date_time(),
            ];
            for target in &classes {
                for source in [Value::Int(n), Value::Bool(b)] {
                    let predicted = should_construct(target, &source.class()).is_ok();
                    let actual = construct(target, source);
                    prop_assert_eq!(predicted, actual.is_ok());
                }
            }
        }

        #[test]
        fn prop_should_construct_agrees_on_optionals(
            n in any::<i64>(),
            b in any::<bool>(),
            present in any::<bool>(),
        ) {
            let ints = derived::optional(&primitives::int());
            let bools = derived::optional(&primitives::boolean());
            let optional = |class: &Class, value: Value| {
                if present {
                    Value::wrap(class, value)
                } else {
                    Value::absent(class)
                }
            };
            let targets = [
                primitives::int(),
                primitives::string(),
                ints.clone(),
                bools.clone(),
                derived::optional(&primitives::number()),
            ];
            for target in &targets {
                let sources = [
                    Value::Nil,
                    Value::Int(n),
                    optional(&ints, Value::Int(n)),
                    optional(&bools, Value::Bool(b)),
                ];
                for source in sources {
                    let predicted = should_construct(target, &source.class()).is_ok();
                    let actual = construct(target, source);
                    prop_assert_eq!(predicted, actual.is_ok());
                }
            }
        }
    }
}
