//! Functions declared in the language.
//!
//! A function block is type-checked once, when it is resolved; calls only
//! execute. The defining table is captured so the body sees the names that
//! were in scope at the definition.

use crate::class::Class;
use crate::derived;
use crate::interp::{Execute, Flow, Interpreter, TypeCheck};
use crate::native::Function;
use crate::table::{Binding, SymbolTable};
use crate::value::{ExpectedValue, Value};
use hyper_types::ast::{Argument, FunctionBlock};
use hyper_types::{ErrorCode, InterpreterError, Result, Span, WithSpan};
use std::collections::BTreeMap;

/// A resolved parameter.
enum Param {
    Item {
        name: String,
        span: Span,
        class: Class,
    },
    /// `{a A, b B}`: one open-record argument bound field by field.
    Object {
        fields: Vec<(String, Span, Class)>,
        class: Class,
        span: Span,
    },
}

impl Param {
    fn class(&self) -> &Class {
        match self {
            Param::Item { class, .. } | Param::Object { class, .. } => class,
        }
    }

    fn declare_expected(&self, table: &SymbolTable) -> Result<()> {
        let expected = |class: &Class| Binding::Expected(ExpectedValue::new(class.clone()));
        match self {
            Param::Item { name, span, class } => table.declare(name, expected(class)).at(*span),
            Param::Object { fields, .. } => fields
                .iter()
                .try_for_each(|(name, span, class)| table.declare(name, expected(class)).at(*span)),
        }
    }

    fn bind(&self, table: &SymbolTable, arg: Value) -> Result<()> {
        match self {
            Param::Item { name, .. } => {
                table.insert(name, Binding::Value(arg));
                Ok(())
            }
            Param::Object { fields, span, .. } => {
                let Value::Record(record) = &arg else {
                    return Err(InterpreterError::new(
                        ErrorCode::INVALID_DESTRUCTURED_ARGUMENT,
                        format!("cannot destructure {}", arg.class()),
                    )
                    .at(*span));
                };
                for (name, field_span, _) in fields {
                    let value = record.get(name).ok_or_else(|| {
                        InterpreterError::new(
                            ErrorCode::UNKNOWN_PROPERTY,
                            format!("{} has no property {name}", record.class),
                        )
                        .at(*field_span)
                    })?;
                    table.insert(name, Binding::Value(value));
                }
                Ok(())
            }
        }
    }
}

fn resolve_param(resolver: &Interpreter<TypeCheck>, argument: &Argument) -> Result<Param> {
    match argument {
        Argument::Item(item) => Ok(Param::Item {
            name: item.key.name.clone(),
            span: item.key.span,
            class: resolver.resolve_type(&item.ty)?,
        }),
        Argument::Object(object) => {
            let fields = object
                .items
                .iter()
                .map(|item| {
                    Ok((
                        item.key.name.clone(),
                        item.key.span,
                        resolver.resolve_type(&item.ty)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            let class = derived::open_record(
                fields
                    .iter()
                    .map(|(name, _, class)| (name.clone(), class.clone()))
                    .collect::<BTreeMap<_, _>>(),
            );
            Ok(Param::Object {
                fields,
                class,
                span: object.span,
            })
        }
    }
}

impl SymbolTable {
    /// Resolve and type-check a function block against this table.
    ///
    /// Fails with missing-return when a return class is declared and the
    /// body can finish without returning or throwing.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn resolve_function_block(&self, node: &FunctionBlock) -> Result<Function> {
        let resolver = Interpreter::<TypeCheck>::new(self.clone());
        let params = node
            .params
            .arguments
            .iter()
            .map(|argument| resolve_param(&resolver, argument))
            .collect::<Result<Vec<_>>>()?;
        let returns = node
            .params
            .returns
            .as_ref()
            .map(|ty| resolver.resolve_type(ty))
            .transpose()?;

        let checker = Interpreter::<TypeCheck>::with_returns(self.without_loop(), returns.clone());
        for param in &params {
            param.declare_expected(checker.table())?;
        }
        let always_returns = checker.check_block(&node.body)?;
        if let Some(class) = &returns {
            if !always_returns {
                return Err(InterpreterError::new(
                    ErrorCode::MISSING_RETURN,
                    format!("missing return of {class}"),
                )
                .at(node.body.span)
                .at(node.span));
            }
        }
        tracing::debug!(
            arguments = params.len(),
            returns = ?returns.as_ref().map(Class::name),
            "function resolved"
        );

        let arguments = params.iter().map(|param| param.class().clone()).collect();
        let captured = self.clone();
        let body = node.body.clone();
        let body_returns = returns.clone();
        Ok(Function::new(arguments, returns, move |args| {
            let table = captured.without_loop();
            for (param, arg) in params.iter().zip(args) {
                param.bind(&table, arg)?;
            }
            let interpreter = Interpreter::<Execute>::with_returns(table, body_returns.clone());
            match interpreter.exec_block(&body)? {
                Flow::Return(value) => Ok(value),
                Flow::Normal => Ok(Value::Nil),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::primitives;
    use hyper_types::ast::{
        ArgumentItem, ArgumentObject, Block, Expr, ExprKind, FunctionParams, Ident, Literal,
        Operator, Selector, Stmt, StmtKind, TypeExpr, ValueExpr,
    };

    fn ty(name: &str) -> TypeExpr {
        TypeExpr::named(Selector::path(&[name]))
    }

    fn name(name: &str) -> Expr {
        Expr::from(ExprKind::Value(ValueExpr {
            head: Ident::from(name),
            members: vec![],
        }))
    }

    fn item(key: &str, class: &str) -> ArgumentItem {
        ArgumentItem {
            key: Ident::from(key),
            ty: ty(class),
        }
    }

    fn function(arguments: Vec<Argument>, returns: Option<&str>, stmts: Vec<StmtKind>) -> FunctionBlock {
        FunctionBlock {
            params: FunctionParams {
                arguments,
                returns: returns.map(ty),
            },
            body: Block::new(stmts.into_iter().map(Stmt::from).collect(), Span::DUMMY),
            span: Span::DUMMY,
        }
    }

    fn add_body() -> Vec<StmtKind> {
        vec![StmtKind::Return(Some(Expr::from(ExprKind::Binary {
            left: Box::new(name("a")),
            op: Operator::Add,
            right: Box::new(name("b")),
        })))]
    }

    fn table() -> SymbolTable {
        SymbolTable::with_config(&Config::capture())
    }

    #[test]
    fn test_call_binds_arguments() {
        let node = function(
            vec![Argument::Item(item("a", "Int")), Argument::Item(item("b", "Int"))],
            Some("Int"),
            add_body(),
        );
        let function = table().resolve_function_block(&node).unwrap();
        assert_eq!(function.arguments(), &[primitives::int(), primitives::int()]);
        assert_eq!(function.call(vec![Value::Int(2), Value::Int(3)]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_wrong_argument_count() {
        let node = function(vec![Argument::Item(item("a", "Int"))], None, vec![]);
        let function = table().resolve_function_block(&node).unwrap();
        let err = function.call(vec![]).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_ARGUMENT_LENGTH);
    }

    #[test]
    fn test_missing_return() {
        let node = function(vec![], Some("Int"), vec![]);
        let err = table().resolve_function_block(&node).unwrap_err();
        assert_eq!(err.code, ErrorCode::MISSING_RETURN);
    }

    #[test]
    fn test_body_is_checked_at_definition() {
        let node = function(
            vec![Argument::Item(item("a", "Int")), Argument::Item(item("b", "Bool"))],
            Some("Int"),
            add_body(),
        );
        let err = table().resolve_function_block(&node).unwrap_err();
        assert_eq!(err.code, ErrorCode::UNDEFINED_OPERATOR);
    }

    #[test]
    fn test_no_return_class_yields_nil() {
        let node = function(
            vec![],
            None,
            vec![StmtKind::Expr(Expr::from(ExprKind::Literal(Literal::Int(1))))],
        );
        let function = table().resolve_function_block(&node).unwrap();
        assert_eq!(function.call(vec![]).unwrap(), Value::Nil);
    }

    #[test]
    fn test_value_return_without_class_is_rejected() {
        let node = function(
            vec![],
            None,
            vec![StmtKind::Return(Some(Expr::from(ExprKind::Literal(Literal::Int(1)))))],
        );
        let err = table().resolve_function_block(&node).unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_RETURN_TYPE);
    }

    #[test]
    fn test_destructured_argument() {
        let node = function(
            vec![Argument::Object(ArgumentObject {
                items: vec![item("a", "Int"), item("b", "Int")],
                span: Span::DUMMY,
            })],
            Some("Int"),
            add_body(),
        );
        let function = table().resolve_function_block(&node).unwrap();
        let arg = derived::record_value(
            &derived::open_record(BTreeMap::from([
                ("a".to_string(), primitives::int()),
                ("b".to_string(), primitives::int()),
            ])),
            BTreeMap::from([
                ("a".to_string(), Value::Int(4)),
                ("b".to_string(), Value::Int(6)),
            ]),
        );
        assert_eq!(function.call(vec![arg]).unwrap(), Value::Int(10));

        let err = function.call(vec![Value::Int(1)]).unwrap_err();
        assert_eq!(err.code, ErrorCode::CANNOT_CONSTRUCT);
    }

    #[test]
    fn test_captures_defining_scope() {
        let table = table();
        table
            .declare("offset", Binding::Value(Value::Int(10)))
            .unwrap();
        let node = function(
            vec![Argument::Item(item("a", "Int"))],
            Some("Int"),
            vec![StmtKind::Return(Some(Expr::from(ExprKind::Binary {
                left: Box::new(name("a")),
                op: Operator::Add,
                right: Box::new(name("offset")),
            })))],
        );
        let function = table.resolve_function_block(&node).unwrap();
        assert_eq!(function.call(vec![Value::Int(1)]).unwrap(), Value::Int(11));
    }

    #[test]
    fn test_calls_do_not_share_locals() {
        let node = function(
            vec![Argument::Item(item("a", "Int"))],
            Some("Int"),
            vec![
                StmtKind::Declaration(hyper_types::ast::Declaration {
                    target: Ident::from("local"),
                    secondary: None,
                    init: hyper_types::ast::Initializer::Expr(name("a")),
                    span: Span::DUMMY,
                }),
                StmtKind::Return(Some(name("local"))),
            ],
        );
        let function = table().resolve_function_block(&node).unwrap();
        for i in 0..3 {
            assert_eq!(function.call(vec![Value::Int(i)]).unwrap(), Value::Int(i));
        }
    }
}
