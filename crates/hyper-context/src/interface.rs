//! Interfaces turn manifest items into bindings.
//!
//! Each item names the interface that builds it (`type User { ... }` uses
//! the `type` interface). The builder ships with `type` and `enum`; hosts
//! register their own for anything else.

use hyper_symbols::{derived, Binding, ClassBuilder, Interpreter, SymbolTable, TypeCheck};
use hyper_types::ast::{ContextMethod, ContextObject, FieldNode};
use hyper_types::{ErrorCode, InterpreterError, Result};
use std::collections::BTreeMap;

/// A resolved manifest item.
#[derive(Debug, Clone)]
pub struct ContextItem {
    /// What the item's own context sees.
    pub value: Binding,
    /// What other contexts and hosts see; `None` for private items.
    pub exported: Option<Binding>,
}

impl ContextItem {
    /// An item exporting its own value unless `private`.
    pub fn new(value: Binding, private: bool) -> Self {
        let exported = (!private).then(|| value.clone());
        Self { value, exported }
    }

    pub fn private(value: Binding) -> Self {
        Self {
            value,
            exported: None,
        }
    }
}

/// The kinds of item an interface may build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Object,
    Method,
}

impl ItemKind {
    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Object => "object",
            ItemKind::Method => "method",
        }
    }
}

fn not_built(kind: ItemKind) -> InterpreterError {
    InterpreterError::new(
        ErrorCode::INVALID_SYNTAX_TREE,
        format!("interface does not build {} items", kind.label()),
    )
}

/// Builds context items from manifest nodes.
///
/// `scope` resolves names against the context being built, so items may
/// refer to each other regardless of declaration order.
pub trait Interface: Send + Sync {
    fn supports(&self, kind: ItemKind) -> bool;

    fn object_from_node(&self, scope: &SymbolTable, node: &ContextObject) -> Result<ContextItem> {
        let _ = (scope, node);
        Err(not_built(ItemKind::Object))
    }

    fn method_from_node(&self, scope: &SymbolTable, node: &ContextMethod) -> Result<ContextItem> {
        let _ = (scope, node);
        Err(not_built(ItemKind::Method))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Built-in interfaces
// ══════════════════════════════════════════════════════════════════════════════

/// `type Name { field Type ... }`: a named record class.
#[derive(Debug, Default)]
pub struct TypeInterface;

impl Interface for TypeInterface {
    fn supports(&self, kind: ItemKind) -> bool {
        kind == ItemKind::Object
    }

    fn object_from_node(&self, scope: &SymbolTable, node: &ContextObject) -> Result<ContextItem> {
        let resolver = Interpreter::<TypeCheck>::new(scope.clone());
        let mut fields = BTreeMap::new();
        for field in &node.fields {
            let FieldNode::Field { name, ty } = field else {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_SYNTAX_TREE,
                    format!("type {} accepts only typed fields", node.name.name),
                )
                .at(node.span));
            };
            let class = resolver.resolve_type(ty)?;
            if fields.insert(name.name.clone(), class).is_some() {
                return Err(InterpreterError::new(
                    ErrorCode::CANNOT_REDECLARE_VALUE,
                    format!("duplicate field {} in type {}", name.name, node.name.name),
                )
                .at(name.span));
            }
        }
        let class = ClassBuilder::record(node.name.name.clone(), fields).build();
        Ok(ContextItem::new(Binding::Class(class), node.private))
    }
}

/// `enum Name { Item, Item = "value" ... }`: items as class statics.
#[derive(Debug, Default)]
pub struct EnumInterface;

impl Interface for EnumInterface {
    fn supports(&self, kind: ItemKind) -> bool {
        kind == ItemKind::Object
    }

    fn object_from_node(&self, _: &SymbolTable, node: &ContextObject) -> Result<ContextItem> {
        let mut items: Vec<(String, String)> = Vec::with_capacity(node.fields.len());
        for field in &node.fields {
            let FieldNode::Item { name, value } = field else {
                return Err(InterpreterError::new(
                    ErrorCode::INVALID_SYNTAX_TREE,
                    format!("enum {} accepts only items", node.name.name),
                )
                .at(node.span));
            };
            if items.iter().any(|(item, _)| *item == name.name) {
                return Err(InterpreterError::new(
                    ErrorCode::CANNOT_REDECLARE_VALUE,
                    format!("duplicate item {} in enum {}", name.name, node.name.name),
                )
                .at(name.span));
            }
            let value = value.clone().unwrap_or_else(|| name.name.clone());
            items.push((name.name.clone(), value));
        }
        let class = derived::enumeration(&node.name.name, items);
        Ok(ContextItem::new(Binding::Class(class), node.private))
    }
}
