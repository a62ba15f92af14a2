//! Immutable bindings present in every symbol table.
//!
//! Besides the primitive classes, `print` and `len`, two packages are bound
//! as lookup objects: `math` and `errors`.

use crate::config::Console;
use crate::native::Function;
use crate::primitives;
use crate::table::{Binding, Object};
use crate::value::{ErrorValue, Value};
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A named group of functions reached through member access.
struct Package {
    members: BTreeMap<&'static str, Function>,
}

impl Package {
    fn new(members: impl IntoIterator<Item = (&'static str, Function)>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }
}

impl Object for Package {
    fn get(&self, key: &str) -> Result<Option<Binding>> {
        Ok(self.members.get(key).cloned().map(Binding::Callable))
    }
}

fn arithmetic(message: String) -> InterpreterError {
    InterpreterError::new(ErrorCode::ARITHMETIC_ERROR, message)
}

/// Integral result of a rounding function.
fn integral(what: &str, x: f64) -> Result<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if !x.is_finite() || x >= LIMIT || x < -LIMIT {
        return Err(arithmetic(format!("{what} of {x} does not fit in Int")));
    }
    Ok(x as i64)
}

fn math() -> Package {
    Package::new([
        ("Ceil", Function::from_fn1(|x: f64| integral("Ceil", x.ceil()))),
        ("Floor", Function::from_fn1(|x: f64| integral("Floor", x.floor()))),
        ("Round", Function::from_fn1(|x: f64| integral("Round", x.round()))),
        (
            "Log",
            Function::from_fn1(|x: f64| {
                if x <= 0.0 {
                    return Err(arithmetic(format!("Log of non-positive {x}")));
                }
                Ok(x.ln())
            }),
        ),
        ("Max", Function::from_fn2(|x: f64, y: f64| Ok(x.max(y)))),
        ("Min", Function::from_fn2(|x: f64, y: f64| Ok(x.min(y)))),
    ])
}

fn named_error(name: &'static str) -> Function {
    Function::from_fn1(move |message: String| Ok(ErrorValue::new(name, message)))
}

fn errors() -> Package {
    Package::new([
        (
            "New",
            Function::from_fn2(|name: String, message: String| Ok(ErrorValue::new(name, message))),
        ),
        ("BadRequest", named_error("BadRequest")),
        ("NotFound", named_error("NotFound")),
        ("Unauthorized", named_error("Unauthorized")),
        ("InternalError", named_error("InternalError")),
    ])
}

pub(crate) fn bindings(console: &Arc<Console>) -> HashMap<String, Binding> {
    let mut map = HashMap::new();
    for class in [
        primitives::string(),
        primitives::number(),
        primitives::double(),
        primitives::float(),
        primitives::int(),
        primitives::boolean(),
        primitives::date_time(),
        primitives::error(),
    ] {
        map.insert(class.name().to_string(), Binding::Class(class));
    }

    let console = console.clone();
    map.insert(
        "print".to_string(),
        Binding::Callable(Function::from_fn1(move |value: Value| {
            console.write(&value.to_string());
            Ok(())
        })),
    );
    map.insert("len".to_string(), Binding::Callable(Function::from_fn1(len)));
    map.insert("math".to_string(), Binding::Object(Arc::new(math())));
    map.insert("errors".to_string(), Binding::Object(Arc::new(errors())));
    map
}

/// Item count of an enumerable, or character count of a string.
fn len(value: Value) -> Result<i64> {
    if let Value::String(text) = &value {
        return Ok(text.chars().count() as i64);
    }
    let class = value.class();
    match class.enumerable() {
        Some(enumerable) => Ok((enumerable.length)(&value)? as i64),
        None => Err(InterpreterError::new(
            ErrorCode::INVALID_ARGUMENT,
            format!("len is not defined for {class}"),
        )),
    }
}
