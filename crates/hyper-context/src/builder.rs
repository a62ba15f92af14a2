//! Building a context from a manifest.
//!
//! Items resolve lazily: building one item may pull in others through the
//! context scope, so manifests need no particular order. A name that is
//! requested again while it is still resolving is a cyclic reference.

use crate::error::{BuildError, BuildResult};
use crate::interface::{ContextItem, EnumInterface, Interface, ItemKind, TypeInterface};
use hyper_symbols::{Binding, Config, Object, SymbolTable};
use hyper_types::ast::{ContextNode, Manifest};
use hyper_types::{ErrorCode, InterpreterError, Result, WithSpan};
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

type Interfaces = HashMap<String, Arc<dyn Interface>>;

/// Registers interfaces and builds contexts.
pub struct ContextBuilder {
    interfaces: Interfaces,
    config: Config,
}

impl ContextBuilder {
    /// A builder with the `type` and `enum` interfaces registered.
    pub fn new() -> Self {
        let mut builder = Self {
            interfaces: HashMap::new(),
            config: Config::default(),
        };
        builder.register_interface("type", TypeInterface);
        builder.register_interface("enum", EnumInterface);
        builder
    }

    /// Register `interface` under `name`, replacing any previous one.
    pub fn register_interface(&mut self, name: impl Into<String>, interface: impl Interface + 'static) -> &mut Self {
        self.interfaces.insert(name.into(), Arc::new(interface));
        self
    }

    /// Configuration for the symbol tables items are resolved in.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    fn check_interface(&self, interface: &str, item: &str, kind: ItemKind) -> BuildResult<()> {
        let found = self
            .interfaces
            .get(interface)
            .ok_or_else(|| BuildError::UnknownInterface {
                interface: interface.to_string(),
                item: item.to_string(),
            })?;
        if !found.supports(kind) {
            return Err(BuildError::Unsupported {
                interface: interface.to_string(),
                kind: kind.label(),
            });
        }
        Ok(())
    }

    /// Resolve every item of `manifest`.
    ///
    /// Names, interfaces and item kinds are validated before anything is
    /// resolved; the first failing item stops the build.
    #[tracing::instrument(skip_all, fields(context = %manifest.name))]
    pub fn build(&self, manifest: &Manifest) -> BuildResult<Arc<Context>> {
        let mut pending = HashMap::with_capacity(manifest.items.len());
        let mut order = Vec::with_capacity(manifest.items.len());
        for node in &manifest.items {
            let name = node_name(node);
            match node {
                ContextNode::Object(object) => {
                    self.check_interface(&object.interface.name, name, ItemKind::Object)?
                }
                ContextNode::Method(method) => {
                    self.check_interface(&method.interface.name, name, ItemKind::Method)?
                }
                ContextNode::Function(_) => {}
            }
            if pending.insert(name.to_string(), node.clone()).is_some() {
                return Err(BuildError::DuplicateItem(name.to_string()));
            }
            order.push(name.to_string());
        }

        let context = Arc::new_cyclic(|this| Context {
            name: manifest.name.clone(),
            this: this.clone(),
            config: self.config.clone(),
            interfaces: self.interfaces.clone(),
            pending: Mutex::new(pending),
            resolving: Mutex::new(HashSet::new()),
            items: RwLock::new(BTreeMap::new()),
            order,
        });
        for name in &context.order {
            context
                .resolve(name)
                .map_err(|source| BuildError::Interpreter {
                    name: name.clone(),
                    source,
                })?;
        }
        tracing::debug!(items = context.order.len(), "context built");
        Ok(context)
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn node_name(node: &ContextNode) -> &str {
    match node {
        ContextNode::Object(object) => &object.name.name,
        ContextNode::Method(method) => &method.name.name,
        ContextNode::Function(function) => &function.name.name,
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Context
// ══════════════════════════════════════════════════════════════════════════════

/// A built context.
///
/// As a lookup [`Object`] it exposes exported bindings only; items see each
/// other, private ones included, through [`Context::symbol_table`].
pub struct Context {
    name: String,
    this: Weak<Context>,
    config: Config,
    interfaces: Interfaces,
    pending: Mutex<HashMap<String, ContextNode>>,
    resolving: Mutex<HashSet<String>>,
    items: RwLock<BTreeMap<String, ContextItem>>,
    order: Vec<String>,
}

/// Internal view of a context, held weakly by its own symbol tables.
struct ContextScope(Weak<Context>);

impl Object for ContextScope {
    fn get(&self, key: &str) -> Result<Option<Binding>> {
        match self.0.upgrade() {
            Some(context) => Ok(context.resolve(key)?.map(|item| item.value)),
            None => Ok(None),
        }
    }
}

impl Context {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Item names in manifest order.
    pub fn item_names(&self) -> &[String] {
        &self.order
    }

    /// The resolved item called `name`, private items included.
    pub fn item(&self, name: &str) -> Option<ContextItem> {
        self.items.read().get(name).cloned()
    }

    /// A fresh table whose names fall back to this context's items.
    pub fn symbol_table(&self) -> SymbolTable {
        SymbolTable::with_config(&self.config).with_root(Arc::new(ContextScope(self.this.clone())))
    }

    /// Exported bindings by name.
    pub fn exports(&self) -> BTreeMap<String, Binding> {
        self.items
            .read()
            .iter()
            .filter_map(|(name, item)| Some((name.clone(), item.exported.clone()?)))
            .collect()
    }

    /// JSON summary of the exports, with class fingerprints.
    pub fn describe_exports(&self) -> serde_json::Value {
        let exports = self
            .exports()
            .into_iter()
            .map(|(name, binding)| (name, describe(&binding)))
            .collect::<serde_json::Map<_, _>>();
        json!({ "context": self.name, "exports": exports })
    }

    fn resolve(&self, name: &str) -> Result<Option<ContextItem>> {
        if let Some(item) = self.items.read().get(name) {
            return Ok(Some(item.clone()));
        }
        let Some(node) = self.pending.lock().get(name).cloned() else {
            return Ok(None);
        };
        if !self.resolving.lock().insert(name.to_string()) {
            return Err(InterpreterError::new(
                ErrorCode::INVALID_CLASS,
                format!("cyclic reference to {name}"),
            ));
        }
        let built = self.build_item(&node);
        self.resolving.lock().remove(name);
        let item = built?;

        tracing::trace!(item = name, kind = item.value.kind(), "item resolved");
        self.pending.lock().remove(name);
        self.items.write().insert(name.to_string(), item.clone());
        Ok(Some(item))
    }

    fn build_item(&self, node: &ContextNode) -> Result<ContextItem> {
        let scope = self.symbol_table();
        match node {
            ContextNode::Object(object) => self
                .interface(&object.interface.name)?
                .object_from_node(&scope, object)
                .at(object.span),
            ContextNode::Method(method) => self
                .interface(&method.interface.name)?
                .method_from_node(&scope, method)
                .at(method.span),
            ContextNode::Function(function) => {
                let resolved = scope.resolve_function_block(&function.function).at(function.span)?;
                Ok(ContextItem::private(Binding::Callable(resolved)))
            }
        }
    }

    fn interface(&self, name: &str) -> Result<&Arc<dyn Interface>> {
        self.interfaces.get(name).ok_or_else(|| {
            InterpreterError::new(ErrorCode::INVALID_SYNTAX_TREE, format!("unknown interface {name}"))
        })
    }
}

impl Object for Context {
    fn get(&self, key: &str) -> Result<Option<Binding>> {
        Ok(self.resolve(key)?.and_then(|item| item.exported))
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name)
            .field("items", &self.order)
            .finish()
    }
}

fn describe(binding: &Binding) -> serde_json::Value {
    match binding {
        Binding::Class(class) => json!({
            "kind": binding.kind(),
            "class": class.name(),
            "fingerprint": class.fingerprint(),
        }),
        Binding::Value(value) => json!({ "kind": binding.kind(), "class": value.class().name() }),
        Binding::Expected(expected) => json!({ "kind": binding.kind(), "class": expected.class.name() }),
        Binding::Callable(function) => json!({
            "kind": binding.kind(),
            "arguments": function.arguments().iter().map(|class| class.name()).collect::<Vec<_>>(),
            "returns": function.returns().map(|class| class.name()),
        }),
        Binding::Object(_) => json!({ "kind": binding.kind() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper_types::ast::{ContextObject, FieldNode, Ident, Selector, TypeExpr};
    use hyper_types::Span;

    fn object(interface: &str, name: &str, private: bool, fields: Vec<FieldNode>) -> ContextNode {
        ContextNode::Object(ContextObject {
            interface: Ident::from(interface),
            name: Ident::from(name),
            private,
            fields,
            span: Span::DUMMY,
        })
    }

    fn field(name: &str, ty: &str) -> FieldNode {
        FieldNode::Field {
            name: Ident::from(name),
            ty: TypeExpr::named(Selector::path(&[ty])),
        }
    }

    fn manifest(items: Vec<ContextNode>) -> Manifest {
        Manifest {
            name: "test".to_string(),
            items,
        }
    }

    #[test]
    fn test_forward_reference_resolves() {
        let context = ContextBuilder::new()
            .build(&manifest(vec![
                object("type", "A", false, vec![field("b", "B")]),
                object("type", "B", false, vec![field("n", "Int")]),
            ]))
            .unwrap();
        assert_eq!(context.item_names(), &["A".to_string(), "B".to_string()]);
        assert!(matches!(context.item("A").map(|item| item.value), Some(Binding::Class(_))));
    }

    #[test]
    fn test_cyclic_reference_fails() {
        let err = ContextBuilder::new()
            .build(&manifest(vec![
                object("type", "A", false, vec![field("b", "B")]),
                object("type", "B", false, vec![field("a", "A")]),
            ]))
            .unwrap_err();
        let source = err.interpreter_error().unwrap();
        assert_eq!(source.code, ErrorCode::INVALID_CLASS);
        assert!(source.message.contains("cyclic reference"));
    }

    #[test]
    fn test_context_lookup_hides_private_items() {
        let context = ContextBuilder::new()
            .build(&manifest(vec![
                object("type", "Public", false, vec![field("n", "Int")]),
                object("type", "Hidden", true, vec![field("n", "Int")]),
            ]))
            .unwrap();
        assert!(context.get("Public").unwrap().is_some());
        assert!(context.get("Hidden").unwrap().is_none());
        assert!(context.symbol_table().get("Hidden").unwrap().is_some());
    }

    #[test]
    fn test_scope_outliving_context_sees_nothing() {
        let context = ContextBuilder::new()
            .build(&manifest(vec![object("type", "A", false, vec![])]))
            .unwrap();
        let table = context.symbol_table();
        drop(context);
        assert!(table.get("A").unwrap().is_none());
    }
}
