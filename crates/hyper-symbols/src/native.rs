//! Callable values: functions and receiver-bound methods.

use crate::class::Class;
use crate::engine;
use crate::primitives;
use crate::value::{ErrorValue, Value};
use chrono::{DateTime, Utc};
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::fmt;
use std::sync::Arc;

pub type Handler = Arc<dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync>;
pub type MethodHandler = Arc<dyn Fn(&Value, Vec<Value>) -> Result<Value> + Send + Sync>;

pub(crate) fn check_arity(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(InterpreterError::new(
            ErrorCode::INVALID_ARGUMENT_LENGTH,
            format!("expected {expected} arguments, got {got}"),
        ));
    }
    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// Function
// ══════════════════════════════════════════════════════════════════════════════

/// A callable with declared argument classes and an optional return class.
#[derive(Clone)]
pub struct Function {
    arguments: Vec<Class>,
    returns: Option<Class>,
    handler: Handler,
}

impl Function {
    pub fn new(
        arguments: Vec<Class>,
        returns: Option<Class>,
        handler: impl Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            arguments,
            returns,
            handler: Arc::new(handler),
        }
    }

    pub fn arguments(&self) -> &[Class] {
        &self.arguments
    }

    pub fn returns(&self) -> Option<&Class> {
        self.returns.as_ref()
    }

    /// Construct each argument into its declared class, run the handler and
    /// construct the result into the return class. Without a return class
    /// the call yields `nil`.
    #[tracing::instrument(level = "trace", skip_all, fields(arguments = args.len()))]
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        check_arity(self.arguments.len(), args.len())?;
        let args = self
            .arguments
            .iter()
            .zip(args)
            .map(|(class, arg)| engine::construct(class, arg))
            .collect::<Result<Vec<_>>>()?;
        let out = (self.handler)(args)?;
        match &self.returns {
            Some(class) => engine::construct(class, out),
            None => Ok(Value::Nil),
        }
    }

    /// Build from a closure taking no arguments.
    pub fn from_fn0<R, F>(f: F) -> Self
    where
        R: IntoValue,
        F: Fn() -> Result<R> + Send + Sync + 'static,
    {
        Self::new(vec![], <R as IntoValue>::class(), move |_| f().map(IntoValue::into_value))
    }

    /// Build from a closure taking one typed argument.
    pub fn from_fn1<A, R, F>(f: F) -> Self
    where
        A: FromValue,
        R: IntoValue,
        F: Fn(A) -> Result<R> + Send + Sync + 'static,
    {
        Self::new(vec![<A as FromValue>::class()], <R as IntoValue>::class(), move |args| {
            let mut args = args.into_iter();
            let a = A::from_value(next_arg(&mut args)?)?;
            f(a).map(IntoValue::into_value)
        })
    }

    /// Build from a closure taking two typed arguments.
    pub fn from_fn2<A, B, R, F>(f: F) -> Self
    where
        A: FromValue,
        B: FromValue,
        R: IntoValue,
        F: Fn(A, B) -> Result<R> + Send + Sync + 'static,
    {
        let arguments = vec![<A as FromValue>::class(), <B as FromValue>::class()];
        Self::new(arguments, <R as IntoValue>::class(), move |args| {
            let mut args = args.into_iter();
            let a = A::from_value(next_arg(&mut args)?)?;
            let b = B::from_value(next_arg(&mut args)?)?;
            f(a, b).map(IntoValue::into_value)
        })
    }

    /// Build from a closure taking three typed arguments.
    pub fn from_fn3<A, B, C, R, F>(f: F) -> Self
    where
        A: FromValue,
        B: FromValue,
        C: FromValue,
        R: IntoValue,
        F: Fn(A, B, C) -> Result<R> + Send + Sync + 'static,
    {
        let arguments = vec![
            <A as FromValue>::class(),
            <B as FromValue>::class(),
            <C as FromValue>::class(),
        ];
        Self::new(arguments, <R as IntoValue>::class(), move |args| {
            let mut args = args.into_iter();
            let a = A::from_value(next_arg(&mut args)?)?;
            let b = B::from_value(next_arg(&mut args)?)?;
            let c = C::from_value(next_arg(&mut args)?)?;
            f(a, b, c).map(IntoValue::into_value)
        })
    }
}

fn next_arg(args: &mut impl Iterator<Item = Value>) -> Result<Value> {
    args.next().ok_or_else(|| {
        InterpreterError::new(ErrorCode::INVALID_ARGUMENT_LENGTH, "missing argument")
    })
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.arguments.iter().map(Class::name).collect();
        match &self.returns {
            Some(returns) => write!(f, "Function({}) {returns}", args.join(", ")),
            None => write!(f, "Function({})", args.join(", ")),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Method
// ══════════════════════════════════════════════════════════════════════════════

/// An instance method; bound to a receiver it becomes a [`Function`].
#[derive(Clone)]
pub struct Method {
    pub arguments: Vec<Class>,
    pub returns: Option<Class>,
    handler: MethodHandler,
}

impl Method {
    pub fn new(
        arguments: Vec<Class>,
        returns: Option<Class>,
        handler: impl Fn(&Value, Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            arguments,
            returns,
            handler: Arc::new(handler),
        }
    }

    /// Run the handler directly; arguments must already match.
    pub fn invoke(&self, receiver: &Value, args: Vec<Value>) -> Result<Value> {
        (self.handler)(receiver, args)
    }

    pub fn bind(&self, receiver: Value) -> Function {
        let handler = self.handler.clone();
        Function::new(self.arguments.clone(), self.returns.clone(), move |args| {
            handler(&receiver, args)
        })
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.arguments.iter().map(Class::name).collect();
        write!(f, "Method({})", args.join(", "))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Typed conversions
// ══════════════════════════════════════════════════════════════════════════════

/// A Rust type usable as a native argument.
pub trait FromValue: Sized {
    fn class() -> Class;
    fn from_value(value: Value) -> Result<Self>;
}

/// A Rust type usable as a native return value. `None` class means no result.
pub trait IntoValue {
    fn class() -> Option<Class>;
    fn into_value(self) -> Value;
}

fn unexpected(class: &str, value: &Value) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::CANNOT_CONSTRUCT,
        format!("cannot construct {class} from {}", value.class()),
    )
}

/// Any value, unconverted.
impl FromValue for Value {
    fn class() -> Class {
        primitives::any()
    }

    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn class() -> Class {
        primitives::boolean()
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| unexpected("Bool", &value))
    }
}

impl FromValue for String {
    fn class() -> Class {
        primitives::string()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(unexpected("String", &other)),
        }
    }
}

impl FromValue for i64 {
    fn class() -> Class {
        primitives::int()
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_int().ok_or_else(|| unexpected("Int", &value))
    }
}

impl FromValue for f64 {
    fn class() -> Class {
        primitives::number()
    }

    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| unexpected("Number", &value))
    }
}

impl FromValue for DateTime<Utc> {
    fn class() -> Class {
        primitives::date_time()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(dt) => Ok(dt),
            other => Err(unexpected("DateTime", &other)),
        }
    }
}

impl FromValue for ErrorValue {
    fn class() -> Class {
        primitives::error()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Error(err) => Ok(err),
            other => Err(unexpected("Error", &other)),
        }
    }
}

impl IntoValue for () {
    fn class() -> Option<Class> {
        None
    }

    fn into_value(self) -> Value {
        Value::Nil
    }
}

impl IntoValue for bool {
    fn class() -> Option<Class> {
        Some(primitives::boolean())
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoValue for String {
    fn class() -> Option<Class> {
        Some(primitives::string())
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoValue for i64 {
    fn class() -> Option<Class> {
        Some(primitives::int())
    }

    fn into_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoValue for f64 {
    fn class() -> Option<Class> {
        Some(primitives::number())
    }

    fn into_value(self) -> Value {
        Value::Number(self)
    }
}

impl IntoValue for DateTime<Utc> {
    fn class() -> Option<Class> {
        Some(primitives::date_time())
    }

    fn into_value(self) -> Value {
        Value::DateTime(self)
    }
}

impl IntoValue for ErrorValue {
    fn class() -> Option<Class> {
        Some(primitives::error())
    }

    fn into_value(self) -> Value {
        Value::Error(self)
    }
}
