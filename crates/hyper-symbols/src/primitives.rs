//! Primitive class singletons.

use crate::class::{Class, ClassKey, Descriptors, Property};
use crate::native::{Function, Method};
use crate::table::Binding;
use crate::value::{ErrorValue, Value};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use hyper_types::ast::Operator;
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

static NIL: LazyLock<Class> = LazyLock::new(|| Class::new(ClassKey::Nil, "Nil", nil_descriptors()));
static ANY: LazyLock<Class> = LazyLock::new(|| Class::new(ClassKey::Any, "Any", Descriptors::default()));
static BOOL: LazyLock<Class> = LazyLock::new(|| Class::new(ClassKey::Bool, "Bool", bool_descriptors()));
static STRING: LazyLock<Class> =
    LazyLock::new(|| Class::new_cyclic(ClassKey::String, "String", string_descriptors));
static NUMBER: LazyLock<Class> = LazyLock::new(|| numeric_class(ClassKey::Number, "Number"));
static DOUBLE: LazyLock<Class> = LazyLock::new(|| numeric_class(ClassKey::Double, "Double"));
static FLOAT: LazyLock<Class> = LazyLock::new(|| numeric_class(ClassKey::Float, "Float"));
static INT: LazyLock<Class> = LazyLock::new(|| numeric_class(ClassKey::Int, "Int"));
static DATE_TIME: LazyLock<Class> =
    LazyLock::new(|| Class::new_cyclic(ClassKey::DateTime, "DateTime", date_time_descriptors));
static ERROR: LazyLock<Class> = LazyLock::new(|| Class::new(ClassKey::Error, "Error", error_descriptors()));

pub fn nil() -> Class {
    NIL.clone()
}

/// Accepts every value; only meaningful as an argument class.
pub fn any() -> Class {
    ANY.clone()
}

pub fn boolean() -> Class {
    BOOL.clone()
}

pub fn string() -> Class {
    STRING.clone()
}

pub fn number() -> Class {
    NUMBER.clone()
}

pub fn double() -> Class {
    DOUBLE.clone()
}

pub fn float() -> Class {
    FLOAT.clone()
}

pub fn int() -> Class {
    INT.clone()
}

pub fn date_time() -> Class {
    DATE_TIME.clone()
}

pub fn error() -> Class {
    ERROR.clone()
}

const NUMERIC: [ClassKey; 4] = [ClassKey::Number, ClassKey::Double, ClassKey::Float, ClassKey::Int];

pub(crate) fn parse_date_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            InterpreterError::new(
                ErrorCode::CANNOT_UNMARSHAL,
                format!("cannot unmarshal {text:?} as DateTime: {err}"),
            )
        })
}

fn mismatch(class: &str, value: &Value) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::CANNOT_CONSTRUCT,
        format!("cannot construct {class} from {}", value.class()),
    )
}

fn invalid_operator(op: Operator) -> InterpreterError {
    InterpreterError::new(ErrorCode::INVALID_OPERATOR, format!("{op} is not an operator"))
}

// ── Nil ──────────────────────────────────────────────────────────────────────

fn nil_descriptors() -> Descriptors {
    let mut d = Descriptors::default();
    d.comparators
        .insert(Operator::Eq, ClassKey::Nil, Arc::new(|_, _| Ok(true)));
    d.comparators
        .insert(Operator::NotEq, ClassKey::Nil, Arc::new(|_, _| Ok(false)));
    d
}

// ── Bool ─────────────────────────────────────────────────────────────────────

fn bool_descriptors() -> Descriptors {
    let mut d = Descriptors::default();
    for op in [Operator::Eq, Operator::NotEq, Operator::And, Operator::Or] {
        d.comparators.insert(
            op,
            ClassKey::Bool,
            Arc::new(move |left, right| {
                let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) else {
                    return Err(mismatch("Bool", right));
                };
                match op {
                    Operator::Eq => Ok(a == b),
                    Operator::NotEq => Ok(a != b),
                    Operator::And => Ok(a && b),
                    Operator::Or => Ok(a || b),
                    _ => Err(invalid_operator(op)),
                }
            }),
        );
    }
    d
}

// ── String ───────────────────────────────────────────────────────────────────

fn string_descriptors(this: &Class) -> Descriptors {
    let mut d = Descriptors::default();
    for source in NUMERIC.into_iter().chain([ClassKey::Bool, ClassKey::DateTime]) {
        d.constructors
            .insert(source, Arc::new(|value| Ok(Value::String(value.to_string()))));
    }
    d.operators.insert(
        Operator::Add,
        ClassKey::String,
        Arc::new(|left, right| match (left, right) {
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            _ => Err(mismatch("String", right)),
        }),
    );
    for op in Operator::ORDERING {
        d.comparators.insert(
            op,
            ClassKey::String,
            Arc::new(move |left, right| {
                let (Some(a), Some(b)) = (left.as_str(), right.as_str()) else {
                    return Err(mismatch("String", right));
                };
                Ok(ordered(op, a.cmp(b)))
            }),
        );
    }
    d.methods.insert(
        "lower".into(),
        Method::new(vec![], Some(this.clone()), |receiver, _| {
            Ok(Value::String(receiver.as_str().unwrap_or_default().to_lowercase()))
        }),
    );
    d.methods.insert(
        "upper".into(),
        Method::new(vec![], Some(this.clone()), |receiver, _| {
            Ok(Value::String(receiver.as_str().unwrap_or_default().to_uppercase()))
        }),
    );
    d.methods.insert(
        "length".into(),
        Method::new(vec![], Some(int()), |receiver, _| {
            let count = receiver.as_str().unwrap_or_default().chars().count();
            Ok(Value::Int(count as i64))
        }),
    );
    d
}

fn ordered(op: Operator, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Operator::Eq => ordering == Equal,
        Operator::NotEq => ordering != Equal,
        Operator::Lt => ordering == Less,
        Operator::Gt => ordering == Greater,
        Operator::LtEq => ordering != Greater,
        Operator::GtEq => ordering != Less,
        _ => false,
    }
}

// ── Numeric family ───────────────────────────────────────────────────────────

fn numeric_class(key: ClassKey, name: &'static str) -> Class {
    let mut d = Descriptors::default();
    for source in NUMERIC.into_iter().filter(|source| *source != key) {
        let target = key.clone();
        d.constructors.insert(
            source,
            Arc::new(move |value| {
                let n = value.as_f64().ok_or_else(|| mismatch(name, value))?;
                Ok(numeric_value(&target, n, value.as_int()))
            }),
        );
    }
    let target = key.clone();
    d.constructors.insert(
        ClassKey::String,
        Arc::new(move |value| {
            let text = value.as_str().unwrap_or_default().trim();
            if let (ClassKey::Int, Ok(i)) = (&target, text.parse::<i64>()) {
                return Ok(Value::Int(i));
            }
            text.parse::<f64>()
                .map(|n| numeric_value(&target, n, None))
                .map_err(|_| {
                    InterpreterError::new(
                        ErrorCode::CANNOT_UNMARSHAL,
                        format!("cannot unmarshal {text:?} as {name}"),
                    )
                })
        }),
    );
    for right in NUMERIC {
        for op in Operator::ARITHMETIC {
            d.operators
                .insert(op, right.clone(), Arc::new(move |l, r| arithmetic(op, l, r)));
        }
        for op in Operator::ORDERING {
            d.comparators
                .insert(op, right.clone(), Arc::new(move |l, r| compare_numbers(op, l, r)));
        }
    }
    Class::new(key, name, d)
}

fn numeric_value(target: &ClassKey, n: f64, exact: Option<i64>) -> Value {
    match target {
        ClassKey::Int => Value::Int(exact.unwrap_or(n.trunc() as i64)),
        ClassKey::Double => Value::Double(n),
        ClassKey::Float => Value::Float(n),
        _ => Value::Number(n),
    }
}

fn arithmetic(op: Operator, left: &Value, right: &Value) -> Result<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return int_arithmetic(op, *a, *b);
    }
    let a = left.as_f64().ok_or_else(|| mismatch("Number", left))?;
    let b = right.as_f64().ok_or_else(|| mismatch("Number", right))?;
    let n = match op {
        Operator::Add => a + b,
        Operator::Sub => a - b,
        Operator::Mul => a * b,
        Operator::Div => a / b,
        Operator::Mod => a % b,
        Operator::Pow => a.powf(b),
        _ => return Err(invalid_operator(op)),
    };
    Ok(Value::Number(n))
}

fn int_arithmetic(op: Operator, a: i64, b: i64) -> Result<Value> {
    let overflow = || {
        InterpreterError::new(
            ErrorCode::ARITHMETIC_ERROR,
            format!("integer overflow evaluating {a} {op} {b}"),
        )
    };
    if matches!(op, Operator::Div | Operator::Mod) && b == 0 {
        return Err(InterpreterError::new(
            ErrorCode::ARITHMETIC_ERROR,
            format!("division by zero evaluating {a} {op} {b}"),
        ));
    }
    let result = match op {
        Operator::Add => a.checked_add(b),
        Operator::Sub => a.checked_sub(b),
        Operator::Mul => a.checked_mul(b),
        Operator::Div => a.checked_div(b),
        Operator::Mod => a.checked_rem(b),
        Operator::Pow if b < 0 => return Ok(Value::Number((a as f64).powf(b as f64))),
        Operator::Pow => u32::try_from(b).ok().and_then(|exp| a.checked_pow(exp)),
        _ => return Err(invalid_operator(op)),
    };
    result.map(Value::Int).ok_or_else(overflow)
}

fn compare_numbers(op: Operator, left: &Value, right: &Value) -> Result<bool> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        return Ok(ordered(op, a.cmp(b)));
    }
    let a = left.as_f64().ok_or_else(|| mismatch("Number", left))?;
    let b = right.as_f64().ok_or_else(|| mismatch("Number", right))?;
    Ok(match a.partial_cmp(&b) {
        Some(ordering) => ordered(op, ordering),
        None => op == Operator::NotEq,
    })
}

// ── DateTime ─────────────────────────────────────────────────────────────────

fn date_time_descriptors(this: &Class) -> Descriptors {
    let mut d = Descriptors::default();
    d.constructors.insert(
        ClassKey::String,
        Arc::new(|value| parse_date_time(value.as_str().unwrap_or_default()).map(Value::DateTime)),
    );
    for op in Operator::ORDERING {
        d.comparators.insert(
            op,
            ClassKey::DateTime,
            Arc::new(move |left, right| match (left, right) {
                (Value::DateTime(a), Value::DateTime(b)) => Ok(ordered(op, a.cmp(b))),
                _ => Err(mismatch("DateTime", right)),
            }),
        );
    }
    d.methods.insert(
        "format".into(),
        Method::new(vec![string()], Some(string()), |receiver, args| {
            let (Value::DateTime(dt), Some(layout)) = (receiver, args.first().and_then(Value::as_str))
            else {
                return Err(mismatch("DateTime", receiver));
            };
            let items: Vec<Item<'_>> = StrftimeItems::new(layout).collect();
            if items.iter().any(|item| matches!(item, Item::Error)) {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_ARGUMENT,
                    format!("invalid DateTime layout {layout:?}"),
                ));
            }
            Ok(Value::String(dt.format_with_items(items.into_iter()).to_string()))
        }),
    );
    d.methods.insert(
        "unix".into(),
        Method::new(vec![], Some(int()), |receiver, _| match receiver {
            Value::DateTime(dt) => Ok(Value::Int(dt.timestamp())),
            other => Err(mismatch("DateTime", other)),
        }),
    );
    d.statics.insert(
        "now".into(),
        Binding::Callable(Function::new(vec![], Some(this.clone()), |_| {
            Ok(Value::DateTime(Utc::now()))
        })),
    );
    d
}

// ── Error ────────────────────────────────────────────────────────────────────

fn error_descriptors() -> Descriptors {
    let mut d = Descriptors::default();
    d.constructors.insert(
        ClassKey::String,
        Arc::new(|value| {
            Ok(Value::Error(ErrorValue::new(
                "Error",
                value.as_str().unwrap_or_default(),
            )))
        }),
    );
    let message_only = ClassKey::Record(BTreeMap::from([("message".to_string(), ClassKey::String)]));
    let named = ClassKey::Record(BTreeMap::from([
        ("message".to_string(), ClassKey::String),
        ("name".to_string(), ClassKey::String),
    ]));
    for key in [message_only, named] {
        d.constructors.insert(
            key,
            Arc::new(|value| {
                let Value::Record(record) = value else {
                    return Err(mismatch("Error", value));
                };
                let field = |name: &str| {
                    record
                        .get(name)
                        .and_then(|v| v.as_str().map(str::to_string))
                };
                Ok(Value::Error(ErrorValue::new(
                    field("name").unwrap_or_else(|| "Error".to_string()),
                    field("message").unwrap_or_default(),
                )))
            }),
        );
    }
    let mut properties = BTreeMap::new();
    properties.insert(
        "name".to_string(),
        error_property(|err| err.name.clone()),
    );
    properties.insert(
        "message".to_string(),
        error_property(|err| err.message.clone()),
    );
    d.properties = Some(properties);
    d
}

fn error_property(read: fn(&ErrorValue) -> String) -> Property {
    Property {
        class: string(),
        getter: Arc::new(move |value| match value {
            Value::Error(err) => Ok(Value::String(read(err))),
            other => Err(mismatch("Error", other)),
        }),
        setter: None,
    }
}
