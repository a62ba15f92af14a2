//! Context build errors.

use hyper_types::InterpreterError;
use thiserror::Error;

/// Errors raised while turning a manifest into a [`Context`](crate::Context).
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// No interface is registered under the item's interface name.
    #[error("unknown interface {interface} for {item}")]
    UnknownInterface { interface: String, item: String },

    #[error("duplicate item {0}")]
    DuplicateItem(String),

    /// The interface cannot build this kind of item.
    #[error("{interface} cannot be initialized as {kind}")]
    Unsupported { interface: String, kind: &'static str },

    /// Resolving an item failed inside the symbol engine.
    #[error("cannot build {name}: {source}")]
    Interpreter {
        name: String,
        #[source]
        source: InterpreterError,
    },
}

impl BuildError {
    /// The interpreter error underneath, if any.
    pub fn interpreter_error(&self) -> Option<&InterpreterError> {
        match self {
            BuildError::Interpreter { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result alias for context building.
pub type BuildResult<T> = Result<T, BuildError>;
