//! Syntax tree consumed by the Hyper interpreter.
//!
//! The tree is handed over already built; nothing in the runtime parses
//! source text. Every node kind is a closed enum so both interpreter
//! families match exhaustively.

use crate::Span;
use std::fmt;

// ══════════════════════════════════════════════════════════════════════════════
// Names
// ══════════════════════════════════════════════════════════════════════════════

/// An identifier with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

impl Ident {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
        }
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Ident::new(name, Span::DUMMY)
    }
}

/// A dotted name such as `models.User`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    pub members: Vec<Ident>,
    pub span: Span,
}

impl Selector {
    pub fn new(members: Vec<Ident>, span: Span) -> Self {
        Self { members, span }
    }

    pub fn path(members: &[&str]) -> Self {
        Self::new(members.iter().map(|m| Ident::from(*m)).collect(), Span::DUMMY)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(&member.name)?;
        }
        Ok(())
    }
}

/// A class reference with modifiers: `Partial<Sel>`, `[]Sel`, `Sel?`.
///
/// Modifiers apply in that order: partial, then array, then optional.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub selector: Selector,
    pub is_partial: bool,
    pub is_array: bool,
    pub is_optional: bool,
    pub span: Span,
}

impl TypeExpr {
    pub fn named(selector: Selector) -> Self {
        let span = selector.span;
        Self {
            selector,
            is_partial: false,
            is_array: false,
            is_optional: false,
            span,
        }
    }

    pub fn partial(mut self) -> Self {
        self.is_partial = true;
        self
    }

    pub fn array(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Operators
// ══════════════════════════════════════════════════════════════════════════════

/// Binary operator tokens. Comparators produce `Bool`; the rest are arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl Operator {
    pub const ARITHMETIC: [Operator; 6] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
        Operator::Pow,
    ];

    pub const ORDERING: [Operator; 6] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Lt,
        Operator::Gt,
        Operator::LtEq,
        Operator::GtEq,
    ];

    pub fn is_comparator(self) -> bool {
        !self.is_arithmetic()
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Mod | Operator::Pow
        )
    }

    pub fn token(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "**",
            Operator::Eq => "==",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::LtEq => "<=",
            Operator::GtEq => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        })
    }
}

/// `=` and the compound assignment tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    PowAssign,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment applies, `None` for `=`.
    pub fn effect(self) -> Option<Operator> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(Operator::Add),
            AssignOp::SubAssign => Some(Operator::Sub),
            AssignOp::MulAssign => Some(Operator::Mul),
            AssignOp::DivAssign => Some(Operator::Div),
            AssignOp::ModAssign => Some(Operator::Mod),
            AssignOp::PowAssign => Some(Operator::Pow),
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl From<ExprKind> for Expr {
    fn from(kind: ExprKind) -> Self {
        Expr::new(kind, Span::DUMMY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    /// `` `hello ${name}` ``
    Template(Vec<TemplatePart>),
    /// `[]T{a, b}`
    Array { ty: TypeExpr, elements: Vec<Expr> },
    /// `Sel{a: 1, ...rest}`
    Instance {
        selector: Selector,
        properties: PropertyList,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    /// `{a: 1, ...rest}` without a class.
    Object(PropertyList),
    /// `head.member(args)[i:j]...`
    Value(ValueExpr),
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyList {
    pub entries: Vec<PropertyEntry>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyEntry {
    Property { key: Ident, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValueExpr {
    pub head: Ident,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub kind: MemberKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberKind {
    Property(Ident),
    Call(Vec<Expr>),
    Index(IndexExpr),
}

/// `[i]` or `[start:end]`; either range bound may be omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexExpr {
    pub start: Option<Box<Expr>>,
    pub end: Option<Box<Expr>>,
    pub is_range: bool,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, span: Span) -> Self {
        Self { stmts, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

impl From<StmtKind> for Stmt {
    fn from(kind: StmtKind) -> Self {
        Stmt::new(kind, Span::DUMMY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Declaration(Declaration),
    Assignment(Assignment),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Continue,
    Break,
    Switch(SwitchStmt),
    Guard(Expr),
    Return(Option<Expr>),
    Throw(Expr),
    /// `try expr;` with the failure discarded.
    Try(Expr),
}

/// Right-hand side of a declaration or assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Expr(Expr),
    Try(Expr),
}

impl Initializer {
    pub fn expr(&self) -> &Expr {
        match self {
            Initializer::Expr(expr) | Initializer::Try(expr) => expr,
        }
    }

    pub fn is_try(&self) -> bool {
        matches!(self, Initializer::Try(_))
    }
}

/// `a := init` or `a, err := try init`
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub target: Ident,
    pub secondary: Option<Ident>,
    pub init: Initializer,
    pub span: Span,
}

/// `a.b[0] += init` or `a, err = try init`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: AssignTarget,
    pub secondary: Option<Ident>,
    pub op: AssignOp,
    pub init: Initializer,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignTarget {
    pub head: Ident,
    pub members: Vec<TargetMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetMember {
    pub kind: TargetMemberKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetMemberKind {
    Property(Ident),
    Index(IndexExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub condition: Expr,
    pub body: Block,
    pub alternate: Option<Alternate>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alternate {
    If(Box<IfStmt>),
    Else(Block),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    pub head: ForHead,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    /// `for i := 0; i < n; i += 1`
    Clause {
        init: Option<Box<Declaration>>,
        condition: Expr,
        update: Option<Box<ForUpdate>>,
    },
    /// `for i, item in target`
    Range {
        index: Ident,
        value: Ident,
        target: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForUpdate {
    Expr(Expr),
    Assignment(Assignment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStmt {
    pub target: Expr,
    pub cases: Vec<SwitchCase>,
    pub span: Span,
}

/// A `case` arm; `condition` is `None` for `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub condition: Option<Expr>,
    pub body: Block,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Functions
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionBlock {
    pub params: FunctionParams,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParams {
    pub arguments: Vec<Argument>,
    pub returns: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// `name Type`
    Item(ArgumentItem),
    /// `{a String, b Int}` destructured from a single record argument.
    Object(ArgumentObject),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentItem {
    pub key: Ident,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentObject {
    pub items: Vec<ArgumentItem>,
    pub span: Span,
}

// ══════════════════════════════════════════════════════════════════════════════
// Context manifests
// ══════════════════════════════════════════════════════════════════════════════

/// Top-level declarations a host turns into a context.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub name: String,
    pub items: Vec<ContextNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextNode {
    /// `type User { ... }`, `enum Role { ... }`
    Object(ContextObject),
    /// `action create(...) User { ... }`
    Method(ContextMethod),
    /// `func helper(...) { ... }`, never exported.
    Function(FunctionDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextObject {
    pub interface: Ident,
    pub name: Ident,
    pub private: bool,
    pub fields: Vec<FieldNode>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldNode {
    /// `name Type`
    Field { name: Ident, ty: TypeExpr },
    /// `Admin` or `Admin = "admin"`
    Item { name: Ident, value: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextMethod {
    pub interface: Ident,
    pub name: Ident,
    pub private: bool,
    pub function: FunctionBlock,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub function: FunctionBlock,
    pub span: Span,
}
