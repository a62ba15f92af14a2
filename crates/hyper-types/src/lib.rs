//! Shared types for the Hyper runtime.
//!
//! This crate defines the syntax tree node types, source spans and the
//! error type shared by the symbol engine and its hosts.

mod error;
mod span;
pub mod ast;

pub use error::{ErrorCategory, ErrorCode, InterpreterError, WithSpan};
pub use span::{Position, Span};

/// Result type used throughout the Hyper runtime.
pub type Result<T> = std::result::Result<T, InterpreterError>;
