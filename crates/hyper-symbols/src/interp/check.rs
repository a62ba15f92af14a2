//! Type-check mode: expressions produce expected values, statements report
//! whether they always return (or throw).
//!
//! Nothing here runs a native handler. Every decision goes through the
//! engine's `should_*` predicates on classes alone.

use super::execute::duplicate_default;
use super::{Attempt, Interpreter, Mode};
use crate::class::{Class, Enumerable, Property};
use crate::derived;
use crate::engine;
use crate::native::{self, Function, Method};
use crate::primitives;
use crate::table::{Binding, SymbolTable};
use crate::value::{ExpectedValue, Value};
use hyper_types::ast::{
    Alternate, Block, Expr, ForHead, ForStmt, ForUpdate, IfStmt, Operator, Stmt, StmtKind,
    SwitchStmt, UnaryOp, WhileStmt,
};
use hyper_types::{ErrorCode, InterpreterError, Result, WithSpan};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCheck;

fn expected(class: Class) -> ExpectedValue {
    ExpectedValue::new(class)
}

fn check_call(
    arguments: &[Class],
    returns: Option<&Class>,
    args: Vec<ExpectedValue>,
) -> Result<ExpectedValue> {
    native::check_arity(arguments.len(), args.len())?;
    for (class, arg) in arguments.iter().zip(&args) {
        engine::should_construct(class, &arg.class)?;
    }
    Ok(expected(returns.cloned().unwrap_or_else(primitives::nil)))
}

impl Mode for TypeCheck {
    type Output = ExpectedValue;

    fn class_of(output: &ExpectedValue) -> Class {
        output.class.clone()
    }

    fn from_binding(binding: &Binding) -> Option<ExpectedValue> {
        match binding {
            Binding::Value(value) => Some(expected(value.class())),
            Binding::Expected(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn to_binding(output: ExpectedValue) -> Binding {
        Binding::Expected(output)
    }

    /// The class of a name never changes on assignment, and the frames may
    /// belong to a scope that is executing, so nothing is written.
    fn rebind(table: &SymbolTable, name: &str, _: ExpectedValue) -> Result<()> {
        table.check_assignable(name)
    }

    fn literal(value: Value) -> ExpectedValue {
        expected(value.class())
    }

    fn construct(target: &Class, source: ExpectedValue) -> Result<ExpectedValue> {
        engine::should_construct(target, &source.class)?;
        Ok(expected(target.clone()))
    }

    fn operate(op: Operator, left: &ExpectedValue, right: &ExpectedValue) -> Result<ExpectedValue> {
        engine::should_operate(op, &left.class, &right.class).map(expected)
    }

    fn compare(op: Operator, left: &ExpectedValue, right: &ExpectedValue) -> Result<ExpectedValue> {
        engine::should_compare(op, &left.class, &right.class).map(expected)
    }

    fn unary(op: UnaryOp, operand: ExpectedValue) -> Result<ExpectedValue> {
        let class = operand.class;
        match op {
            UnaryOp::Not => {
                if class != primitives::boolean() {
                    return Err(InterpreterError::new(
                        ErrorCode::INVALID_UNARY_OPERAND,
                        format!("! requires Bool, got {class}"),
                    ));
                }
                Ok(expected(class))
            }
            UnaryOp::Plus | UnaryOp::Neg => {
                let number = primitives::number();
                engine::should_construct(&number, &class)?;
                engine::should_construct(&class, &number)?;
                Ok(expected(class))
            }
        }
    }

    fn get_property(_: &ExpectedValue, property: &Property) -> Result<ExpectedValue> {
        Ok(expected(property.class.clone()))
    }

    fn set_property(_: &mut ExpectedValue, _: &Property, _: ExpectedValue) -> Result<()> {
        Ok(())
    }

    fn index(operand: &ExpectedValue) -> Result<Option<i64>> {
        if operand.class != primitives::int() {
            return Err(InterpreterError::new(
                ErrorCode::INVALID_INDEX,
                format!("index must be Int, got {}", operand.class),
            ));
        }
        Ok(None)
    }

    fn get_index(_: &ExpectedValue, enumerable: &Enumerable, _: Option<i64>) -> Result<ExpectedValue> {
        Ok(expected(enumerable.item.clone()))
    }

    fn set_index(
        _: &mut ExpectedValue,
        _: &Enumerable,
        _: Option<i64>,
        _: ExpectedValue,
    ) -> Result<()> {
        Ok(())
    }

    fn get_range(
        target: &ExpectedValue,
        _: &Enumerable,
        _: Option<i64>,
        _: Option<i64>,
    ) -> Result<ExpectedValue> {
        Ok(target.clone())
    }

    fn set_range(
        _: &mut ExpectedValue,
        _: &Enumerable,
        _: Option<i64>,
        _: Option<i64>,
        _: ExpectedValue,
    ) -> Result<()> {
        Ok(())
    }

    fn call(function: &Function, args: Vec<ExpectedValue>) -> Result<ExpectedValue> {
        check_call(function.arguments(), function.returns(), args)
    }

    fn call_method(
        _: ExpectedValue,
        method: &Method,
        args: Vec<ExpectedValue>,
    ) -> Result<ExpectedValue> {
        check_call(&method.arguments, method.returns.as_ref(), args)
    }

    fn record(fields: BTreeMap<String, ExpectedValue>) -> ExpectedValue {
        expected(derived::open_record(
            fields
                .into_iter()
                .map(|(name, value)| (name, value.class))
                .collect(),
        ))
    }

    fn array(class: &Class, _: Vec<ExpectedValue>) -> ExpectedValue {
        expected(class.clone())
    }

    fn spread(source: &ExpectedValue) -> Result<BTreeMap<String, ExpectedValue>> {
        Ok(engine::spread_classes(&source.class)?
            .into_iter()
            .map(|(name, class)| (name, expected(class)))
            .collect())
    }

    fn template(_: Vec<ExpectedValue>) -> ExpectedValue {
        expected(primitives::string())
    }

    /// Failures inside a `try` are still static errors.
    fn attempt(run: impl FnOnce() -> Result<ExpectedValue>) -> Result<Attempt<ExpectedValue>> {
        Ok(Attempt {
            value: Some(run()?),
            error: Some(expected(derived::optional(&primitives::error()))),
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

impl Interpreter<TypeCheck> {
    /// Check a block in a fresh scope; `true` when it always returns or throws.
    pub fn check_block(&self, block: &Block) -> Result<bool> {
        self.nested().check_stmts(&block.stmts)
    }

    /// Every statement is checked, including ones after a return.
    pub fn check_stmts(&self, stmts: &[Stmt]) -> Result<bool> {
        let mut returns = false;
        for stmt in stmts {
            returns |= self.check_stmt(stmt)?;
        }
        Ok(returns)
    }

    pub fn check_stmt(&self, stmt: &Stmt) -> Result<bool> {
        self.check_stmt_kind(&stmt.kind).at(stmt.span)
    }

    fn check_stmt_kind(&self, kind: &StmtKind) -> Result<bool> {
        match kind {
            StmtKind::Expr(expr) | StmtKind::Guard(expr) | StmtKind::Try(expr) => {
                self.eval_expr(expr)?;
                Ok(false)
            }
            StmtKind::Declaration(node) => self.declare(node).map(|_| false),
            StmtKind::Assignment(node) => self.assign(node).map(|_| false),
            StmtKind::If(node) => self.check_if(node),
            StmtKind::While(node) => self.check_while(node),
            StmtKind::For(node) => self.check_for(node),
            StmtKind::Continue => self.loop_control("continue").map(|_| false),
            StmtKind::Break => self.loop_control("break").map(|_| false),
            StmtKind::Switch(node) => self.check_switch(node),
            StmtKind::Return(expr) => {
                let class = match expr {
                    Some(expr) => self.eval_expr(expr)?.class,
                    None => primitives::nil(),
                };
                match &self.returns {
                    Some(returns) => engine::should_construct(returns, &class).map_err(|_| {
                        InterpreterError::new(
                            ErrorCode::INVALID_RETURN_TYPE,
                            format!("should return {returns}, got {class}"),
                        )
                    })?,
                    None if expr.is_some() => {
                        return Err(InterpreterError::new(
                            ErrorCode::INVALID_RETURN_TYPE,
                            format!("should not return a value, got {class}"),
                        ))
                    }
                    None => {}
                }
                Ok(true)
            }
            StmtKind::Throw(expr) => {
                let class = self.eval_expr(expr)?.class;
                if class != primitives::error() {
                    return Err(InterpreterError::new(
                        ErrorCode::INVALID_THROW_VALUE,
                        format!("cannot throw {class}"),
                    ));
                }
                Ok(true)
            }
        }
    }

    fn check_condition(&self, expr: &Expr, code: ErrorCode, statement: &str) -> Result<()> {
        let class = self.eval_expr(expr)?.class;
        if class != primitives::boolean() {
            return Err(InterpreterError::new(
                code,
                format!("{statement} condition must be Bool, got {class}"),
            )
            .at(expr.span));
        }
        Ok(())
    }

    fn check_if(&self, node: &IfStmt) -> Result<bool> {
        self.check_condition(&node.condition, ErrorCode::INVALID_IF_CONDITION, "if")?;
        let body = self.check_block(&node.body)?;
        let alternate = match &node.alternate {
            Some(Alternate::If(nested)) => self.check_if(nested)?,
            Some(Alternate::Else(block)) => self.check_block(block)?,
            None => false,
        };
        Ok(body && alternate)
    }

    /// A loop body may run zero times, so loops never count as returning.
    fn check_while(&self, node: &WhileStmt) -> Result<bool> {
        let looping = self.looping();
        looping.check_condition(&node.condition, ErrorCode::INVALID_WHILE_CONDITION, "while")?;
        looping.check_block(&node.body)?;
        Ok(false)
    }

    fn check_for(&self, node: &ForStmt) -> Result<bool> {
        let looping = self.looping();
        match &node.head {
            ForHead::Clause {
                init,
                condition,
                update,
            } => {
                if let Some(init) = init {
                    looping.declare(init)?;
                }
                looping.check_condition(condition, ErrorCode::INVALID_FOR_CONDITION, "for")?;
                looping.check_block(&node.body)?;
                match update.as_deref() {
                    Some(ForUpdate::Expr(expr)) => {
                        looping.eval_expr(expr)?;
                    }
                    Some(ForUpdate::Assignment(assignment)) => looping.assign(assignment)?,
                    None => {}
                }
            }
            ForHead::Range {
                index,
                value,
                target,
            } => {
                let class = self.eval_expr(target)?.class;
                let item = class
                    .enumerable()
                    .map(|enumerable| enumerable.item.clone())
                    .ok_or_else(|| {
                        InterpreterError::new(
                            ErrorCode::CANNOT_ENUMERATE,
                            format!("cannot enumerate {class}"),
                        )
                        .at(target.span)
                    })?;
                let iteration = looping.nested();
                iteration
                    .table
                    .declare(&index.name, Binding::Expected(expected(primitives::int())))
                    .at(index.span)?;
                iteration
                    .table
                    .declare(&value.name, Binding::Expected(expected(item)))
                    .at(value.span)?;
                iteration.check_block(&node.body)?;
            }
        }
        Ok(false)
    }

    /// Returns only with a default case and every case returning.
    fn check_switch(&self, node: &SwitchStmt) -> Result<bool> {
        let target = self.eval_expr(&node.target)?.class;
        if !target.has_comparators() {
            return Err(InterpreterError::new(
                ErrorCode::INVALID_SWITCH_TARGET,
                format!("cannot switch on {target}"),
            )
            .at(node.target.span));
        }
        let mut has_default = false;
        let mut all_return = true;
        for case in &node.cases {
            match &case.condition {
                None if has_default => return Err(duplicate_default().at(case.span)),
                None => has_default = true,
                Some(condition) => {
                    let class = self.eval_expr(condition)?.class;
                    engine::should_compare(Operator::Eq, &target, &class).at(condition.span)?;
                }
            }
            all_return &= self.check_block(&case.body)?;
        }
        Ok(has_default && all_return)
    }
}
