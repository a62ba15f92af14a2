//! Hyper symbol engine.
//!
//! ```text
//! syntax tree → TypeCheck (expected values) → Execute (values)
//!                     └──── construct / operate / compare ────┘
//! ```
//!
//! Classes describe how values are built, combined and accessed. The same
//! expression walk runs in two modes: [`TypeCheck`] predicts the class of
//! every node from classes alone, [`Execute`] runs the handlers. A function
//! body is checked once when it is resolved and executed on every call.

pub mod class;
pub mod derived;
pub mod engine;
pub mod primitives;

mod builtins;
mod config;
mod function;
mod interp;
mod native;
mod table;
mod value;

pub use class::{Class, ClassBuilder, ClassKey, Descriptors, Enumerable, Property, RecordContract};
pub use config::{init_tracing, Config, Console, PrintTarget};
pub use interp::{Attempt, Execute, Flow, Interpreter, Mode, TypeCheck};
pub use native::{FromValue, Function, IntoValue, Method};
pub use table::{Binding, LoopState, Object, SymbolTable};
pub use value::{
    ArrayValue, EnumValue, ErrorValue, ExpectedValue, OptionalValue, RecordValue, Value,
};
