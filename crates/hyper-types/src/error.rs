use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The syntax tree handed to the interpreter is malformed.
    Tree,
    Resolution,
    Type,
    Operator,
    Scope,
    Control,
    /// Dynamic failures the type-check pass cannot rule out.
    Runtime,
}

/// Numeric error code (E100–E799).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Syntax tree assertions (E100–E199) ──
    pub const INVALID_SYNTAX_TREE: Self = Self(100);

    // ── Resolution errors (E200–E299) ──
    pub const UNKNOWN_SELECTOR: Self = Self(200);
    pub const UNKNOWN_PROPERTY: Self = Self(201);
    pub const CANNOT_ACCESS_PROPERTY: Self = Self(202);
    pub const CANNOT_SET_PROPERTY: Self = Self(203);

    // ── Type errors (E300–E399) ──
    pub const INVALID_CLASS: Self = Self(300);
    pub const CANNOT_CONSTRUCT: Self = Self(301);
    pub const MISSING_PROPERTY: Self = Self(302);
    pub const INVALID_UNARY_OPERAND: Self = Self(303);
    pub const INVALID_INDEX: Self = Self(304);
    pub const INVALID_INDEX_TARGET: Self = Self(305);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(306);
    pub const INVALID_IF_CONDITION: Self = Self(307);
    pub const INVALID_WHILE_CONDITION: Self = Self(308);
    pub const INVALID_FOR_CONDITION: Self = Self(309);
    pub const INVALID_SWITCH_TARGET: Self = Self(310);
    pub const INVALID_THROW_VALUE: Self = Self(311);
    pub const INVALID_SPREAD_TARGET: Self = Self(312);
    pub const INVALID_CALL_EXPRESSION: Self = Self(313);
    pub const INVALID_CLASS_CONSTRUCTION: Self = Self(314);
    pub const INVALID_INSTANCEABLE_TARGET: Self = Self(315);
    pub const INVALID_VALUE_EXPRESSION: Self = Self(316);
    pub const CANNOT_ENUMERATE: Self = Self(317);
    pub const INVALID_DESTRUCTURED_ARGUMENT: Self = Self(318);
    pub const INVALID_SECONDARY_TARGET: Self = Self(319);

    // ── Operator errors (E400–E499) ──
    pub const INVALID_OPERATOR: Self = Self(400);
    pub const UNDEFINED_OPERATOR: Self = Self(401);

    // ── Scope errors (E500–E599) ──
    pub const CANNOT_REASSIGN_IMMUTABLE_VALUE: Self = Self(500);
    pub const CANNOT_REDECLARE_VALUE: Self = Self(501);
    pub const BAD_LOOP_CONTROL_STATEMENT: Self = Self(502);

    // ── Control flow errors (E600–E699) ──
    pub const INVALID_RETURN_TYPE: Self = Self(600);
    pub const MISSING_RETURN: Self = Self(601);
    pub const DUPLICATE_DEFAULT_SWITCH_STATEMENTS: Self = Self(602);

    // ── Runtime errors (E700–E799) ──
    pub const INDEX_OUT_OF_RANGE: Self = Self(700);
    pub const INVALID_RANGE_INDICES: Self = Self(701);
    pub const CANNOT_OPERATE_NIL_VALUE: Self = Self(702);
    pub const INVALID_ARGUMENT_LENGTH: Self = Self(703);
    pub const THROWN_ERROR: Self = Self(704);
    pub const ARITHMETIC_ERROR: Self = Self(705);
    pub const CANNOT_UNMARSHAL: Self = Self(706);
    pub const INVALID_ARGUMENT: Self = Self(707);
    pub const UNSET_PROPERTY: Self = Self(708);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Tree,
            200..=299 => ErrorCategory::Resolution,
            300..=399 => ErrorCategory::Type,
            400..=499 => ErrorCategory::Operator,
            500..=599 => ErrorCategory::Scope,
            600..=699 => ErrorCategory::Control,
            _ => ErrorCategory::Runtime,
        }
    }

    /// Whether a type-check pass that succeeded may still see this code at run time.
    pub fn is_dynamic(self) -> bool {
        self.category() == ErrorCategory::Runtime
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured interpreter error.
///
/// Hosts match on `code`; `message` is for humans. The span is the innermost
/// node that reported the failure, attached while the error unwinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span: Option<Span>,
    /// Name carried by a thrown `Error` value, when the failure came from `throw`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thrown: Option<String>,
}

impl InterpreterError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            span: None,
            thrown: None,
        }
    }

    /// Error raised by a `throw` statement.
    pub fn thrown(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::THROWN_ERROR,
            message: message.into(),
            span: None,
            thrown: Some(name.into()),
        }
    }

    /// Attach a position unless a deeper node already did.
    pub fn at(mut self, span: Span) -> Self {
        if self.span.is_none() && !span.is_dummy() {
            self.span = Some(span);
        }
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Name reported to `try` bindings.
    pub fn name(&self) -> &str {
        self.thrown.as_deref().unwrap_or("Error")
    }
}

impl fmt::Display for InterpreterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "[{}] {} ({span})", self.code, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

impl std::error::Error for InterpreterError {}

/// Attach a span to the error side of a result.
pub trait WithSpan<T> {
    fn at(self, span: Span) -> Result<T, InterpreterError>;
}

impl<T> WithSpan<T> for Result<T, InterpreterError> {
    fn at(self, span: Span) -> Result<T, InterpreterError> {
        self.map_err(|err| err.at(span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::CANNOT_CONSTRUCT.to_string(), "E301");
        assert_eq!(ErrorCode::INVALID_SYNTAX_TREE.to_string(), "E100");
    }

    #[test]
    fn test_error_code_categories() {
        assert_eq!(ErrorCode::INVALID_SYNTAX_TREE.category(), ErrorCategory::Tree);
        assert_eq!(ErrorCode::UNKNOWN_SELECTOR.category(), ErrorCategory::Resolution);
        assert_eq!(ErrorCode::CANNOT_CONSTRUCT.category(), ErrorCategory::Type);
        assert_eq!(ErrorCode::UNDEFINED_OPERATOR.category(), ErrorCategory::Operator);
        assert_eq!(ErrorCode::CANNOT_REDECLARE_VALUE.category(), ErrorCategory::Scope);
        assert_eq!(
            ErrorCode::DUPLICATE_DEFAULT_SWITCH_STATEMENTS.category(),
            ErrorCategory::Control
        );
        assert_eq!(ErrorCode::INDEX_OUT_OF_RANGE.category(), ErrorCategory::Runtime);
    }

    #[test]
    fn test_only_runtime_codes_are_dynamic() {
        assert!(ErrorCode::THROWN_ERROR.is_dynamic());
        assert!(ErrorCode::ARITHMETIC_ERROR.is_dynamic());
        assert!(!ErrorCode::CANNOT_CONSTRUCT.is_dynamic());
        assert!(!ErrorCode::MISSING_RETURN.is_dynamic());
    }

    #[test]
    fn test_innermost_span_wins() {
        let inner = Span::point(3, 4);
        let outer = Span::point(1, 1);
        let err = InterpreterError::new(ErrorCode::UNKNOWN_SELECTOR, "unknown selector x")
            .at(inner)
            .at(outer);
        assert_eq!(err.span, Some(inner));
        assert_eq!(err.to_string(), "[E200] unknown selector x (3:4)");
    }

    #[test]
    fn test_dummy_span_is_not_attached() {
        let err = InterpreterError::new(ErrorCode::UNKNOWN_SELECTOR, "x")
            .at(Span::DUMMY)
            .at(Span::point(2, 1));
        assert_eq!(err.span, Some(Span::point(2, 1)));
    }

    #[test]
    fn test_thrown_error_name() {
        let err = InterpreterError::thrown("NotFound", "no such user");
        assert_eq!(err.code, ErrorCode::THROWN_ERROR);
        assert_eq!(err.name(), "NotFound");
        assert_eq!(InterpreterError::new(ErrorCode::CANNOT_CONSTRUCT, "x").name(), "Error");
    }

    #[test]
    fn test_error_serializes_without_empty_fields() {
        let err = InterpreterError::new(ErrorCode::MISSING_RETURN, "missing return");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], 601);
        assert_eq!(json["message"], "missing return");
        assert!(json.get("span").is_none());
        assert!(json.get("thrown").is_none());
    }
}
