//! Tree-walking interpreter shared by both evaluation modes.
//!
//! Expressions are walked once, generically over a [`Mode`]: [`Execute`]
//! produces values by running handlers, [`TypeCheck`] produces expected
//! values by asking the engine's `should_*` predicates. Because both modes
//! share this walk, the class the checker predicts for a node is the class
//! the executor produces for it. Statements dispatch per mode in the
//! `execute` and `check` submodules.

mod check;
mod execute;

pub use check::TypeCheck;
pub use execute::{Execute, Flow};

use crate::class::{Class, Enumerable, Property};
use crate::derived;
use crate::native::{Function, Method};
use crate::primitives;
use crate::table::{Binding, LoopState, Object, SymbolTable};
use crate::value::Value;
use hyper_types::ast::{
    AssignOp, Assignment, Declaration, Expr, ExprKind, Ident, IndexExpr, Initializer, Literal,
    Member, MemberKind, Operator, PropertyEntry, PropertyList, Selector, TargetMember,
    TargetMemberKind, TemplatePart, TypeExpr, UnaryOp, ValueExpr,
};
use hyper_types::{ErrorCode, InterpreterError, Result, WithSpan};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

/// Outcome of an initializer.
pub struct Attempt<O> {
    /// `None` when a `try` initializer failed.
    pub value: Option<O>,
    /// The `Optional<Error>` slot of a `try` initializer.
    pub error: Option<O>,
}

/// What an expression evaluates to, and how each node kind is evaluated.
pub trait Mode: Sized {
    type Output: Clone;

    fn class_of(output: &Self::Output) -> Class;
    /// The output a scope binding stands for, if it holds a value.
    fn from_binding(binding: &Binding) -> Option<Self::Output>;
    fn to_binding(output: Self::Output) -> Binding;
    /// Rebind an existing name after an assignment.
    fn rebind(table: &SymbolTable, name: &str, output: Self::Output) -> Result<()>;
    fn literal(value: Value) -> Self::Output;

    fn construct(target: &Class, source: Self::Output) -> Result<Self::Output>;
    fn operate(op: Operator, left: &Self::Output, right: &Self::Output) -> Result<Self::Output>;
    fn compare(op: Operator, left: &Self::Output, right: &Self::Output) -> Result<Self::Output>;
    fn unary(op: UnaryOp, operand: Self::Output) -> Result<Self::Output>;

    fn get_property(target: &Self::Output, property: &Property) -> Result<Self::Output>;
    fn set_property(
        target: &mut Self::Output,
        property: &Property,
        value: Self::Output,
    ) -> Result<()>;

    /// Read an index operand; `None` when only its class is known.
    fn index(operand: &Self::Output) -> Result<Option<i64>>;
    fn get_index(
        target: &Self::Output,
        enumerable: &Enumerable,
        index: Option<i64>,
    ) -> Result<Self::Output>;
    fn set_index(
        target: &mut Self::Output,
        enumerable: &Enumerable,
        index: Option<i64>,
        value: Self::Output,
    ) -> Result<()>;
    /// Missing bounds default to the start and the length.
    fn get_range(
        target: &Self::Output,
        enumerable: &Enumerable,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Self::Output>;
    fn set_range(
        target: &mut Self::Output,
        enumerable: &Enumerable,
        start: Option<i64>,
        end: Option<i64>,
        value: Self::Output,
    ) -> Result<()>;

    fn call(function: &Function, args: Vec<Self::Output>) -> Result<Self::Output>;
    fn call_method(
        receiver: Self::Output,
        method: &Method,
        args: Vec<Self::Output>,
    ) -> Result<Self::Output>;

    /// An open record of the given fields.
    fn record(fields: BTreeMap<String, Self::Output>) -> Self::Output;
    fn array(class: &Class, items: Vec<Self::Output>) -> Self::Output;
    fn spread(source: &Self::Output) -> Result<BTreeMap<String, Self::Output>>;
    /// Join template parts already constructed into `String`.
    fn template(parts: Vec<Self::Output>) -> Self::Output;

    /// Run a `try` initializer.
    fn attempt(run: impl FnOnce() -> Result<Self::Output>) -> Result<Attempt<Self::Output>>;
}

/// Position reached while walking the members of a value expression.
enum Cursor<O> {
    Output(O),
    Class(Class),
    Object(Arc<dyn Object>),
    Callable(Function),
    Method(O, Method),
}

impl<O> Cursor<O> {
    fn describe<M: Mode<Output = O>>(&self) -> String {
        match self {
            Cursor::Output(output) => M::class_of(output).to_string(),
            Cursor::Class(class) => format!("class {class}"),
            Cursor::Object(_) => "object".to_string(),
            Cursor::Callable(_) => "function".to_string(),
            Cursor::Method(..) => "method".to_string(),
        }
    }
}

fn cursor<M: Mode>(binding: Binding) -> Result<Cursor<M::Output>> {
    match binding {
        Binding::Class(class) => Ok(Cursor::Class(class)),
        Binding::Object(object) => Ok(Cursor::Object(object)),
        Binding::Callable(function) => Ok(Cursor::Callable(function)),
        other => M::from_binding(&other).map(Cursor::Output).ok_or_else(|| {
            InterpreterError::new(
                ErrorCode::INVALID_SYNTAX_TREE,
                format!("{} binding is not usable in this mode", other.kind()),
            )
        }),
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn unknown_property(class: &Class, name: &Ident) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::UNKNOWN_PROPERTY,
        format!("{class} has no property {}", name.name),
    )
    .at(name.span)
}

fn invalid_assignment(message: String) -> InterpreterError {
    InterpreterError::new(ErrorCode::INVALID_ASSIGNMENT_TARGET, message)
}

fn not_indexable(what: &str) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::INVALID_INDEX_TARGET,
        format!("{what} cannot be indexed"),
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Interpreter
// ══════════════════════════════════════════════════════════════════════════════

pub struct Interpreter<M: Mode> {
    table: SymbolTable,
    /// Class every `return` value is constructed into; `None` forbids values.
    returns: Option<Class>,
    mode: PhantomData<M>,
}

impl<M: Mode> Interpreter<M> {
    /// A top-level interpreter; `return` accepts any value.
    pub fn new(table: SymbolTable) -> Self {
        Self::with_returns(table, Some(primitives::any()))
    }

    pub fn with_returns(table: SymbolTable, returns: Option<Class>) -> Self {
        Self {
            table,
            returns,
            mode: PhantomData,
        }
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn returns(&self) -> Option<&Class> {
        self.returns.as_ref()
    }

    fn scoped(&self, table: SymbolTable) -> Self {
        Self::with_returns(table, self.returns.clone())
    }

    fn nested(&self) -> Self {
        self.scoped(self.table.clone_scope())
    }

    fn looping(&self) -> Self {
        self.scoped(self.table.start_loop())
    }

    fn loop_control(&self, statement: &str) -> Result<&LoopState> {
        self.table.loop_state().ok_or_else(|| {
            InterpreterError::new(
                ErrorCode::BAD_LOOP_CONTROL_STATEMENT,
                format!("{statement} statement outside of a loop"),
            )
        })
    }

    // ── Names ───────────────────────────────────────────────────────────

    fn lookup(&self, ident: &Ident) -> Result<Binding> {
        self.table
            .get(&ident.name)?
            .ok_or_else(|| {
                InterpreterError::new(
                    ErrorCode::UNKNOWN_SELECTOR,
                    format!("unknown selector {}", ident.name),
                )
            })
            .at(ident.span)
    }

    /// Resolve a dotted selector through lookup objects and class statics.
    pub fn resolve_selector(&self, selector: &Selector) -> Result<Binding> {
        let Some((head, rest)) = selector.members.split_first() else {
            return Err(InterpreterError::new(ErrorCode::INVALID_SYNTAX_TREE, "empty selector")
                .at(selector.span));
        };
        let mut current = self.lookup(head)?;
        for member in rest {
            let next = match &current {
                Binding::Object(object) => object.get(&member.name)?,
                Binding::Class(class) => class.static_member(&member.name).cloned(),
                _ => None,
            };
            current = next
                .ok_or_else(|| {
                    InterpreterError::new(
                        ErrorCode::UNKNOWN_SELECTOR,
                        format!("unknown selector {selector}"),
                    )
                })
                .at(member.span)?;
        }
        Ok(current)
    }

    /// Resolve a class reference, applying `Partial`, array and optional in that order.
    pub fn resolve_type(&self, ty: &TypeExpr) -> Result<Class> {
        let mut class = match self.resolve_selector(&ty.selector)? {
            Binding::Class(class) => class,
            _ => {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_CLASS,
                    format!("{} is not a class", ty.selector),
                )
                .at(ty.span))
            }
        };
        if ty.is_partial {
            class = derived::partial(&class).at(ty.span)?;
        }
        if ty.is_array {
            class = derived::array(&class);
        }
        if ty.is_optional {
            class = derived::optional(&class);
        }
        Ok(class)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Expressions
    // ══════════════════════════════════════════════════════════════════════

    pub fn eval_expr(&self, expr: &Expr) -> Result<M::Output> {
        self.eval_expr_kind(&expr.kind).at(expr.span)
    }

    fn eval_expr_kind(&self, kind: &ExprKind) -> Result<M::Output> {
        match kind {
            ExprKind::Literal(literal) => Ok(M::literal(literal_value(literal))),
            ExprKind::Template(parts) => self.eval_template(parts),
            ExprKind::Array { ty, elements } => self.eval_array(ty, elements),
            ExprKind::Instance {
                selector,
                properties,
            } => self.eval_instance(selector, properties),
            ExprKind::Unary { op, operand } => M::unary(*op, self.eval_expr(operand)?),
            ExprKind::Binary { left, op, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                if op.is_comparator() {
                    M::compare(*op, &left, &right)
                } else {
                    M::operate(*op, &left, &right)
                }
            }
            ExprKind::Object(properties) => self.eval_properties(properties),
            ExprKind::Value(value) => self.eval_value_expr(value),
            ExprKind::Paren(inner) => self.eval_expr(inner),
        }
    }

    fn eval_template(&self, parts: &[TemplatePart]) -> Result<M::Output> {
        let string = primitives::string();
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            out.push(match part {
                TemplatePart::Text(text) => M::literal(Value::String(text.clone())),
                TemplatePart::Expr(expr) => {
                    M::construct(&string, self.eval_expr(expr)?).at(expr.span)?
                }
            });
        }
        Ok(M::template(out))
    }

    /// `[]T{...}`; `ty` names the item class.
    fn eval_array(&self, ty: &TypeExpr, elements: &[Expr]) -> Result<M::Output> {
        let item = self.resolve_type(ty)?;
        let class = derived::array(&item);
        let items = elements
            .iter()
            .map(|element| M::construct(&item, self.eval_expr(element)?).at(element.span))
            .collect::<Result<Vec<_>>>()?;
        Ok(M::array(&class, items))
    }

    fn eval_instance(&self, selector: &Selector, properties: &PropertyList) -> Result<M::Output> {
        let class = match self.resolve_selector(selector)? {
            Binding::Class(class) => class,
            _ => {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_INSTANCEABLE_TARGET,
                    format!("{selector} is not instanceable"),
                )
                .at(selector.span))
            }
        };
        let source = self.eval_properties(properties)?;
        M::construct(&class, source)
    }

    /// Build an open record; later entries override earlier ones.
    fn eval_properties(&self, list: &PropertyList) -> Result<M::Output> {
        let mut fields = BTreeMap::new();
        for entry in &list.entries {
            match entry {
                PropertyEntry::Property { key, value } => {
                    fields.insert(key.name.clone(), self.eval_expr(value)?);
                }
                PropertyEntry::Spread(expr) => {
                    let source = self.eval_expr(expr)?;
                    fields.extend(M::spread(&source).at(expr.span)?);
                }
            }
        }
        Ok(M::record(fields))
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<M::Output>> {
        args.iter().map(|arg| self.eval_expr(arg)).collect()
    }

    // ── Value expressions ───────────────────────────────────────────────

    pub fn eval_value_expr(&self, node: &ValueExpr) -> Result<M::Output> {
        let mut current = cursor::<M>(self.lookup(&node.head)?).at(node.head.span)?;
        for member in &node.members {
            current = self.eval_member(current, member).at(member.span)?;
        }
        match current {
            Cursor::Output(output) => Ok(output),
            other => Err(InterpreterError::new(
                ErrorCode::INVALID_VALUE_EXPRESSION,
                format!("{} is not a value", other.describe::<M>()),
            )),
        }
    }

    fn eval_member(
        &self,
        current: Cursor<M::Output>,
        member: &Member,
    ) -> Result<Cursor<M::Output>> {
        match &member.kind {
            MemberKind::Property(name) => self.eval_property(current, name),
            MemberKind::Call(args) => self.eval_call(current, args),
            MemberKind::Index(index) => self.eval_index(current, index),
        }
    }

    /// Methods shadow properties; classes expose statics; objects resolve lazily.
    fn eval_property(&self, current: Cursor<M::Output>, name: &Ident) -> Result<Cursor<M::Output>> {
        match current {
            Cursor::Output(output) => {
                let class = M::class_of(&output);
                if let Some(method) = class.method(&name.name) {
                    return Ok(Cursor::Method(output, method.clone()));
                }
                match class.property(&name.name) {
                    Some(property) => Ok(Cursor::Output(M::get_property(&output, property)?)),
                    None => Err(unknown_property(&class, name)),
                }
            }
            Cursor::Class(class) => match class.static_member(&name.name) {
                Some(binding) => cursor::<M>(binding.clone()),
                None => Err(unknown_property(&class, name)),
            },
            Cursor::Object(object) => match object.get(&name.name)? {
                Some(binding) => cursor::<M>(binding),
                None => Err(InterpreterError::new(
                    ErrorCode::UNKNOWN_PROPERTY,
                    format!("unknown property {}", name.name),
                )
                .at(name.span)),
            },
            other => Err(InterpreterError::new(
                ErrorCode::CANNOT_ACCESS_PROPERTY,
                format!(
                    "cannot access property {} of {}",
                    name.name,
                    other.describe::<M>()
                ),
            )),
        }
    }

    fn eval_call(&self, current: Cursor<M::Output>, args: &[Expr]) -> Result<Cursor<M::Output>> {
        let output = match current {
            Cursor::Callable(function) => M::call(&function, self.eval_args(args)?)?,
            Cursor::Method(receiver, method) => {
                M::call_method(receiver, &method, self.eval_args(args)?)?
            }
            Cursor::Class(class) => match args {
                [arg] => M::construct(&class, self.eval_expr(arg)?)?,
                _ => {
                    return Err(InterpreterError::new(
                        ErrorCode::INVALID_CLASS_CONSTRUCTION,
                        format!("{class} takes exactly one argument, got {}", args.len()),
                    ))
                }
            },
            other => {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_CALL_EXPRESSION,
                    format!("{} is not callable", other.describe::<M>()),
                ))
            }
        };
        Ok(Cursor::Output(output))
    }

    fn eval_index(&self, current: Cursor<M::Output>, index: &IndexExpr) -> Result<Cursor<M::Output>> {
        let target = match current {
            Cursor::Output(output) => output,
            other => return Err(not_indexable(&other.describe::<M>())),
        };
        let class = M::class_of(&target);
        let enumerable = class
            .enumerable()
            .ok_or_else(|| not_indexable(class.name()))?;
        let (start, end) = self.eval_bounds(index)?;
        let output = if index.is_range {
            M::get_range(&target, enumerable, start, end)?
        } else {
            require_index(index)?;
            M::get_index(&target, enumerable, start)?
        };
        Ok(Cursor::Output(output))
    }

    fn eval_bounds(&self, index: &IndexExpr) -> Result<(Option<i64>, Option<i64>)> {
        let bound = |expr: &Option<Box<Expr>>| -> Result<Option<i64>> {
            match expr {
                Some(expr) => M::index(&self.eval_expr(expr)?).at(expr.span),
                None => Ok(None),
            }
        };
        Ok((bound(&index.start)?, bound(&index.end)?))
    }

    // ══════════════════════════════════════════════════════════════════════
    // Declarations & assignment
    // ══════════════════════════════════════════════════════════════════════

    fn run_initializer(
        &self,
        init: &Initializer,
        secondary: Option<&Ident>,
    ) -> Result<Attempt<M::Output>> {
        match init {
            Initializer::Try(expr) => M::attempt(|| self.eval_expr(expr)),
            Initializer::Expr(expr) => {
                if let Some(secondary) = secondary {
                    return Err(InterpreterError::new(
                        ErrorCode::INVALID_SECONDARY_TARGET,
                        format!("secondary binding {} requires a try initializer", secondary.name),
                    )
                    .at(secondary.span));
                }
                Ok(Attempt {
                    value: Some(self.eval_expr(expr)?),
                    error: None,
                })
            }
        }
    }

    /// `a := expr`, `a, err := try expr`.
    ///
    /// Both names are checked before the initializer runs; a failed `try`
    /// leaves the primary name unbound.
    fn declare(&self, node: &Declaration) -> Result<()> {
        self.table
            .check_declarable(&node.target.name)
            .at(node.target.span)?;
        if let Some(secondary) = &node.secondary {
            self.table
                .check_declarable(&secondary.name)
                .at(secondary.span)?;
        }
        let attempt = self.run_initializer(&node.init, node.secondary.as_ref())?;
        if let Some(value) = attempt.value {
            self.table.declare(&node.target.name, M::to_binding(value))?;
        }
        if let (Some(secondary), Some(error)) = (&node.secondary, attempt.error) {
            self.table.declare(&secondary.name, M::to_binding(error))?;
        }
        Ok(())
    }

    /// `a.b[i].c (op)= expr`: getters outward, the final setter, then
    /// setters inward back to the head.
    fn assign(&self, node: &Assignment) -> Result<()> {
        let attempt = self.run_initializer(&node.init, node.secondary.as_ref())?;
        if let (Some(secondary), Some(error)) = (&node.secondary, attempt.error) {
            self.store(secondary, AssignOp::Assign, error)?;
        }
        let Some(value) = attempt.value else {
            return Ok(());
        };

        let target = &node.target;
        let Some((last, path)) = target.members.split_last() else {
            return self.store(&target.head, node.op, value);
        };
        let mut current = self.target_root(&target.head)?;
        let mut parents = Vec::with_capacity(path.len());
        for member in path {
            let (next, index) = self.read_target(&current, member).at(member.span)?;
            parents.push((current, index));
            current = next;
        }
        self.write_target(&mut current, last, node.op, value)
            .at(last.span)?;
        for (member, (mut parent, index)) in path.iter().zip(parents).rev() {
            write_back::<M>(&mut parent, member, index, current).at(member.span)?;
            current = parent;
        }
        Ok(())
    }

    fn target_root(&self, head: &Ident) -> Result<M::Output> {
        match cursor::<M>(self.lookup(head)?).at(head.span)? {
            Cursor::Output(output) => Ok(output),
            other => Err(invalid_assignment(format!(
                "cannot assign to {} {}",
                other.describe::<M>(),
                head.name
            ))
            .at(head.span)),
        }
    }

    /// Rebind a plain name, keeping its class.
    fn store(&self, name: &Ident, op: AssignOp, value: M::Output) -> Result<()> {
        let current = self.target_root(name)?;
        let class = M::class_of(&current);
        let value = match op.effect() {
            Some(op) => M::operate(op, &current, &value)?,
            None => value,
        };
        let value = M::construct(&class, value).at(name.span)?;
        M::rebind(&self.table, &name.name, value).at(name.span)
    }

    /// Read one intermediate member, returning the evaluated index if any.
    fn read_target(
        &self,
        current: &M::Output,
        member: &TargetMember,
    ) -> Result<(M::Output, Option<i64>)> {
        let class = M::class_of(current);
        match &member.kind {
            TargetMemberKind::Property(name) => match class.property(&name.name) {
                Some(property) => Ok((M::get_property(current, property)?, None)),
                None => Err(unknown_property(&class, name)),
            },
            TargetMemberKind::Index(index) => {
                if index.is_range {
                    return Err(invalid_assignment(
                        "a range must be the last member of an assignment target".to_string(),
                    ));
                }
                let enumerable = class
                    .enumerable()
                    .ok_or_else(|| not_indexable(class.name()))?;
                require_index(index)?;
                let (start, _) = self.eval_bounds(index)?;
                Ok((M::get_index(current, enumerable, start)?, start))
            }
        }
    }

    fn write_target(
        &self,
        current: &mut M::Output,
        member: &TargetMember,
        op: AssignOp,
        value: M::Output,
    ) -> Result<()> {
        let class = M::class_of(current);
        match &member.kind {
            TargetMemberKind::Property(name) => {
                let property = class
                    .property(&name.name)
                    .ok_or_else(|| unknown_property(&class, name))?;
                if property.setter.is_none() {
                    return Err(InterpreterError::new(
                        ErrorCode::CANNOT_SET_PROPERTY,
                        format!("property {} of {class} is read-only", name.name),
                    ));
                }
                let value = match op.effect() {
                    Some(op) => M::operate(op, &M::get_property(current, property)?, &value)?,
                    None => value,
                };
                let value = M::construct(&property.class, value)?;
                M::set_property(current, property, value)
            }
            TargetMemberKind::Index(index) => {
                let enumerable = class
                    .enumerable()
                    .ok_or_else(|| not_indexable(class.name()))?;
                let (start, end) = self.eval_bounds(index)?;
                if index.is_range {
                    if enumerable.set_range.is_none() || op.effect().is_some() {
                        return Err(invalid_assignment(format!(
                            "cannot assign to a range of {class}"
                        )));
                    }
                    let value = M::construct(&class, value)?;
                    return M::set_range(current, enumerable, start, end, value);
                }
                require_index(index)?;
                if enumerable.set_index.is_none() {
                    return Err(invalid_assignment(format!(
                        "cannot assign to an index of {class}"
                    )));
                }
                let value = match op.effect() {
                    Some(op) => {
                        M::operate(op, &M::get_index(current, enumerable, start)?, &value)?
                    }
                    None => value,
                };
                let value = M::construct(&enumerable.item, value)?;
                M::set_index(current, enumerable, start, value)
            }
        }
    }
}

/// Store an updated child back into its parent where the parent allows it.
fn write_back<M: Mode>(
    parent: &mut M::Output,
    member: &TargetMember,
    index: Option<i64>,
    child: M::Output,
) -> Result<()> {
    let class = M::class_of(parent);
    match &member.kind {
        TargetMemberKind::Property(name) => match class.property(&name.name) {
            Some(property) if property.setter.is_some() => M::set_property(parent, property, child),
            _ => Ok(()),
        },
        TargetMemberKind::Index(_) => match class.enumerable() {
            Some(enumerable) if enumerable.set_index.is_some() => {
                M::set_index(parent, enumerable, index, child)
            }
            _ => Ok(()),
        },
    }
}

fn require_index(index: &IndexExpr) -> Result<()> {
    if index.start.is_none() {
        return Err(InterpreterError::new(
            ErrorCode::INVALID_SYNTAX_TREE,
            "index expression without an index",
        )
        .at(index.span));
    }
    Ok(())
}
