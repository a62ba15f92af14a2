use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line/column position in the source the tree was built from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range of a syntax tree node.
///
/// Trees built by hosts without source text use [`Span::DUMMY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub const DUMMY: Span = Span {
        start: Position { line: 0, column: 0 },
        end: Position { line: 0, column: 0 },
    };

    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A zero-width span at a single position.
    pub fn point(line: u32, column: u32) -> Self {
        let at = Position::new(line, column);
        Self::new(at, at)
    }

    /// The smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn is_dummy(&self) -> bool {
        *self == Self::DUMMY
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_point() {
        let s = Span::point(1, 5);
        assert_eq!(s.start, Position::new(1, 5));
        assert_eq!(s.end, Position::new(1, 5));
        assert!(!s.is_dummy());
    }

    #[test]
    fn test_span_to_across_lines() {
        let a = Span::new(Position::new(1, 5), Position::new(1, 10));
        let b = Span::new(Position::new(2, 3), Position::new(2, 8));
        let covered = a.to(b);
        assert_eq!(covered.start, Position::new(1, 5));
        assert_eq!(covered.end, Position::new(2, 8));
    }

    #[test]
    fn test_span_to_same_line() {
        let a = Span::new(Position::new(1, 5), Position::new(1, 10));
        let b = Span::new(Position::new(1, 3), Position::new(1, 8));
        let covered = a.to(b);
        assert_eq!(covered.start.column, 3);
        assert_eq!(covered.end.column, 10);
    }

    #[test]
    fn test_span_display() {
        let s = Span::new(Position::new(3, 7), Position::new(3, 15));
        assert_eq!(format!("{s}"), "3:7");
    }

    #[test]
    fn test_dummy_span() {
        assert!(Span::default().is_dummy());
        assert_eq!(Span::DUMMY.to(Span::point(2, 2)).end, Position::new(2, 2));
    }
}
