//! Execute mode: expressions produce values, statements run.

use super::{Attempt, Interpreter, Mode};
use crate::class::{Class, Enumerable, Property};
use crate::derived;
use crate::engine;
use crate::native::{Function, Method};
use crate::primitives;
use crate::table::{Binding, SymbolTable};
use crate::value::{ArrayValue, ErrorValue, Value};
use hyper_types::ast::{
    Alternate, Block, Expr, ForHead, ForStmt, ForUpdate, IfStmt, Operator, Stmt, StmtKind,
    SwitchStmt, UnaryOp, WhileStmt,
};
use hyper_types::{ErrorCode, InterpreterError, Result, WithSpan};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default)]
pub struct Execute;

fn missing_handler(what: &str, class: &Class) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::INVALID_ASSIGNMENT_TARGET,
        format!("{class} does not support {what}"),
    )
}

fn required(index: Option<i64>) -> Result<i64> {
    index.ok_or_else(|| {
        InterpreterError::new(ErrorCode::INVALID_SYNTAX_TREE, "index expression without an index")
    })
}

impl Mode for Execute {
    type Output = Value;

    fn class_of(output: &Value) -> Class {
        output.class()
    }

    fn from_binding(binding: &Binding) -> Option<Value> {
        match binding {
            Binding::Value(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn to_binding(output: Value) -> Binding {
        Binding::Value(output)
    }

    fn rebind(table: &SymbolTable, name: &str, output: Value) -> Result<()> {
        table.assign(name, Binding::Value(output))
    }

    fn literal(value: Value) -> Value {
        value
    }

    fn construct(target: &Class, source: Value) -> Result<Value> {
        engine::construct(target, source)
    }

    fn operate(op: Operator, left: &Value, right: &Value) -> Result<Value> {
        engine::operate(op, left, right)
    }

    fn compare(op: Operator, left: &Value, right: &Value) -> Result<Value> {
        engine::compare(op, left, right).map(Value::Bool)
    }

    /// `+x` and `-x` stay integral on `Int`; other operands go through
    /// `Number` and back into their own class.
    fn unary(op: UnaryOp, operand: Value) -> Result<Value> {
        let class = operand.class();
        match op {
            UnaryOp::Not => match operand {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                _ => Err(InterpreterError::new(
                    ErrorCode::INVALID_UNARY_OPERAND,
                    format!("! requires Bool, got {class}"),
                )),
            },
            UnaryOp::Plus | UnaryOp::Neg => {
                if let Value::Int(i) = operand {
                    if op == UnaryOp::Plus {
                        return Ok(Value::Int(i));
                    }
                    return i.checked_neg().map(Value::Int).ok_or_else(|| {
                        InterpreterError::new(
                            ErrorCode::ARITHMETIC_ERROR,
                            format!("integer overflow negating {i}"),
                        )
                    });
                }
                let number = engine::construct(&primitives::number(), operand)?
                    .as_f64()
                    .ok_or_else(|| {
                        InterpreterError::new(
                            ErrorCode::INVALID_UNARY_OPERAND,
                            format!("{op} requires a number, got {class}"),
                        )
                    })?;
                let number = if op == UnaryOp::Neg { -number } else { number };
                engine::construct(&class, Value::Number(number))
            }
        }
    }

    fn get_property(target: &Value, property: &Property) -> Result<Value> {
        (property.getter)(target)
    }

    fn set_property(target: &mut Value, property: &Property, value: Value) -> Result<()> {
        match &property.setter {
            Some(setter) => setter(target, value),
            None => Err(InterpreterError::new(
                ErrorCode::CANNOT_SET_PROPERTY,
                format!("property of {} is read-only", target.class()),
            )),
        }
    }

    fn index(operand: &Value) -> Result<Option<i64>> {
        match operand {
            Value::Int(i) => Ok(Some(*i)),
            other => Err(InterpreterError::new(
                ErrorCode::INVALID_INDEX,
                format!("index must be Int, got {}", other.class()),
            )),
        }
    }

    fn get_index(target: &Value, enumerable: &Enumerable, index: Option<i64>) -> Result<Value> {
        (enumerable.get_index)(target, required(index)?)
    }

    fn set_index(
        target: &mut Value,
        enumerable: &Enumerable,
        index: Option<i64>,
        value: Value,
    ) -> Result<()> {
        let setter = enumerable
            .set_index
            .as_ref()
            .ok_or_else(|| missing_handler("index assignment", &target.class()))?;
        setter(target, required(index)?, value)
    }

    fn get_range(
        target: &Value,
        enumerable: &Enumerable,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Value> {
        let end = match end {
            Some(end) => end,
            None => (enumerable.length)(target)? as i64,
        };
        (enumerable.get_range)(target, start.unwrap_or(0), end)
    }

    fn set_range(
        target: &mut Value,
        enumerable: &Enumerable,
        start: Option<i64>,
        end: Option<i64>,
        value: Value,
    ) -> Result<()> {
        let end = match end {
            Some(end) => end,
            None => (enumerable.length)(target)? as i64,
        };
        let setter = enumerable
            .set_range
            .as_ref()
            .ok_or_else(|| missing_handler("range assignment", &target.class()))?;
        setter(target, start.unwrap_or(0), end, value)
    }

    fn call(function: &Function, args: Vec<Value>) -> Result<Value> {
        function.call(args)
    }

    fn call_method(receiver: Value, method: &Method, args: Vec<Value>) -> Result<Value> {
        method.bind(receiver).call(args)
    }

    fn record(fields: BTreeMap<String, Value>) -> Value {
        let class = derived::open_record(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), value.class()))
                .collect(),
        );
        derived::record_value(&class, fields)
    }

    fn array(class: &Class, items: Vec<Value>) -> Value {
        Value::Array(ArrayValue::new(class.clone(), items))
    }

    fn spread(source: &Value) -> Result<BTreeMap<String, Value>> {
        engine::spread_fields(source)
    }

    fn template(parts: Vec<Value>) -> Value {
        Value::String(parts.iter().map(Value::to_string).collect())
    }

    fn attempt(run: impl FnOnce() -> Result<Value>) -> Result<Attempt<Value>> {
        let slot = derived::optional(&primitives::error());
        Ok(match run() {
            Ok(value) => Attempt {
                value: Some(value),
                error: Some(Value::absent(&slot)),
            },
            Err(err) => {
                tracing::debug!(code = %err.code, message = %err.message, "try caught error");
                Attempt {
                    value: None,
                    error: Some(Value::wrap(&slot, Value::Error(ErrorValue::from(&err)))),
                }
            }
        })
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Statements
// ══════════════════════════════════════════════════════════════════════════════

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Return(Value),
}

impl Flow {
    /// The returned value, if the statement returned.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Flow::Normal => None,
            Flow::Return(value) => Some(value),
        }
    }
}

impl Interpreter<Execute> {
    /// Run a block in a fresh scope.
    pub fn exec_block(&self, block: &Block) -> Result<Flow> {
        self.nested().exec_stmts(&block.stmts)
    }

    /// Run statements in the current scope, stopping at a return or a
    /// pending `continue`/`break`.
    pub fn exec_stmts(&self, stmts: &[Stmt]) -> Result<Flow> {
        for stmt in stmts {
            if let Flow::Return(value) = self.exec_stmt(stmt)? {
                return Ok(Flow::Return(value));
            }
            if self.table.loop_state().is_some_and(|state| state.interrupted()) {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    pub fn exec_stmt(&self, stmt: &Stmt) -> Result<Flow> {
        self.exec_stmt_kind(&stmt.kind).at(stmt.span)
    }

    fn exec_stmt_kind(&self, kind: &StmtKind) -> Result<Flow> {
        match kind {
            StmtKind::Expr(expr) | StmtKind::Guard(expr) => {
                self.eval_expr(expr)?;
            }
            StmtKind::Declaration(node) => self.declare(node)?,
            StmtKind::Assignment(node) => self.assign(node)?,
            StmtKind::If(node) => return self.exec_if(node),
            StmtKind::While(node) => return self.exec_while(node),
            StmtKind::For(node) => return self.exec_for(node),
            StmtKind::Continue => {
                tracing::trace!("continue");
                self.loop_control("continue")?.request_continue();
            }
            StmtKind::Break => {
                tracing::trace!("break");
                self.loop_control("break")?.request_break();
            }
            StmtKind::Switch(node) => return self.exec_switch(node),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::Nil,
                };
                let value = match &self.returns {
                    Some(class) => engine::construct(class, value)?,
                    None => value,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Throw(expr) => {
                return match self.eval_expr(expr)? {
                    Value::Error(err) => Err(InterpreterError::thrown(err.name, err.message)),
                    other => Err(InterpreterError::new(
                        ErrorCode::INVALID_THROW_VALUE,
                        format!("cannot throw {}", other.class()),
                    )),
                };
            }
            StmtKind::Try(expr) => {
                if let Err(err) = self.eval_expr(expr) {
                    tracing::debug!(code = %err.code, message = %err.message, "try discarded error");
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn condition(&self, expr: &Expr, code: ErrorCode, statement: &str) -> Result<bool> {
        match self.eval_expr(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(InterpreterError::new(
                code,
                format!("{statement} condition must be Bool, got {}", other.class()),
            )
            .at(expr.span)),
        }
    }

    fn exec_if(&self, node: &IfStmt) -> Result<Flow> {
        if self.condition(&node.condition, ErrorCode::INVALID_IF_CONDITION, "if")? {
            return self.exec_block(&node.body);
        }
        match &node.alternate {
            Some(Alternate::If(nested)) => self.exec_if(nested),
            Some(Alternate::Else(block)) => self.exec_block(block),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_while(&self, node: &WhileStmt) -> Result<Flow> {
        let looping = self.looping();
        let state = looping.loop_control("while")?;
        loop {
            state.next_iteration();
            if !looping.condition(&node.condition, ErrorCode::INVALID_WHILE_CONDITION, "while")? {
                break;
            }
            if let Flow::Return(value) = looping.exec_block(&node.body)? {
                return Ok(Flow::Return(value));
            }
            if state.is_broken() {
                break;
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_for(&self, node: &ForStmt) -> Result<Flow> {
        match &node.head {
            ForHead::Clause {
                init,
                condition,
                update,
            } => {
                let looping = self.looping();
                let state = looping.loop_control("for")?;
                if let Some(init) = init {
                    looping.declare(init)?;
                }
                loop {
                    state.next_iteration();
                    if !looping.condition(condition, ErrorCode::INVALID_FOR_CONDITION, "for")? {
                        break;
                    }
                    if let Flow::Return(value) = looping.exec_block(&node.body)? {
                        return Ok(Flow::Return(value));
                    }
                    if state.is_broken() {
                        break;
                    }
                    match update.as_deref() {
                        Some(ForUpdate::Expr(expr)) => {
                            looping.eval_expr(expr)?;
                        }
                        Some(ForUpdate::Assignment(assignment)) => looping.assign(assignment)?,
                        None => {}
                    }
                }
                Ok(Flow::Normal)
            }
            ForHead::Range {
                index,
                value,
                target,
            } => {
                let items = self.snapshot(target)?;
                let looping = self.looping();
                let state = looping.loop_control("for")?;
                for (i, item) in items.into_iter().enumerate() {
                    state.next_iteration();
                    let iteration = looping.nested();
                    iteration
                        .table
                        .declare(&index.name, Binding::Value(Value::Int(i as i64)))
                        .at(index.span)?;
                    iteration
                        .table
                        .declare(&value.name, Binding::Value(item))
                        .at(value.span)?;
                    if let Flow::Return(value) = iteration.exec_block(&node.body)? {
                        return Ok(Flow::Return(value));
                    }
                    if state.is_broken() {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
        }
    }

    /// Items of an enumerable, read before the loop body first runs.
    fn snapshot(&self, target: &Expr) -> Result<Vec<Value>> {
        let value = self.eval_expr(target)?;
        let class = value.class();
        let enumerable = class.enumerable().ok_or_else(|| {
            InterpreterError::new(
                ErrorCode::CANNOT_ENUMERATE,
                format!("cannot enumerate {class}"),
            )
            .at(target.span)
        })?;
        let length = (enumerable.length)(&value)? as i64;
        (0..length)
            .map(|i| (enumerable.get_index)(&value, i))
            .collect()
    }

    fn exec_switch(&self, node: &SwitchStmt) -> Result<Flow> {
        let target = self.eval_expr(&node.target)?;
        let class = target.class();
        if !class.has_comparators() {
            return Err(InterpreterError::new(
                ErrorCode::INVALID_SWITCH_TARGET,
                format!("cannot switch on {class}"),
            )
            .at(node.target.span));
        }
        let mut default = None;
        for case in &node.cases {
            match &case.condition {
                None => {
                    if default.is_some() {
                        return Err(duplicate_default().at(case.span));
                    }
                    default = Some(&case.body);
                }
                Some(condition) => {
                    let value = self.eval_expr(condition)?;
                    if engine::compare(Operator::Eq, &target, &value).at(condition.span)? {
                        return self.exec_block(&case.body);
                    }
                }
            }
        }
        match default {
            Some(body) => self.exec_block(body),
            None => Ok(Flow::Normal),
        }
    }
}

pub(super) fn duplicate_default() -> InterpreterError {
    InterpreterError::new(
        ErrorCode::DUPLICATE_DEFAULT_SWITCH_STATEMENTS,
        "switch has more than one default case",
    )
}
