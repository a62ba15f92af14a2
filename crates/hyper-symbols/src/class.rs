//! Class descriptors.
//!
//! A [`Class`] is a cheap handle over a canonical [`ClassKey`] and the
//! descriptor tables that drive construction, operators, comparators and
//! member access. Identity is the key alone: two independently built
//! handles with equal keys are the same class.

use crate::native::Method;
use crate::table::Binding;
use crate::value::Value;
use hyper_types::ast::Operator;
use hyper_types::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

// ══════════════════════════════════════════════════════════════════════════════
// Identity
// ══════════════════════════════════════════════════════════════════════════════

/// Canonical structural description of a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum ClassKey {
    Nil,
    Any,
    Bool,
    String,
    Number,
    Double,
    Float,
    Int,
    DateTime,
    Error,
    Array(Box<ClassKey>),
    Optional(Box<ClassKey>),
    Partial(Box<ClassKey>),
    /// Open record built from an object pattern.
    Record(BTreeMap<String, ClassKey>),
    /// Named record type declared by a host.
    Object {
        name: String,
        properties: BTreeMap<String, ClassKey>,
    },
    Enum {
        name: String,
        items: Vec<String>,
    },
    /// Any other host class; identified by name and property classes.
    Host {
        name: String,
        properties: BTreeMap<String, ClassKey>,
    },
}

impl ClassKey {
    /// Hex SHA-256 digest of the canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        format!("{:x}", Sha256::digest(&canonical))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Handlers
// ══════════════════════════════════════════════════════════════════════════════

pub type ConstructFn = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type OperatorFn = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;
pub type ComparatorFn = Arc<dyn Fn(&Value, &Value) -> Result<bool> + Send + Sync>;
pub type Getter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;
pub type Setter = Arc<dyn Fn(&mut Value, Value) -> Result<()> + Send + Sync>;
pub type LengthFn = Arc<dyn Fn(&Value) -> Result<usize> + Send + Sync>;
pub type GetIndexFn = Arc<dyn Fn(&Value, i64) -> Result<Value> + Send + Sync>;
pub type SetIndexFn = Arc<dyn Fn(&mut Value, i64, Value) -> Result<()> + Send + Sync>;
pub type GetRangeFn = Arc<dyn Fn(&Value, i64, i64) -> Result<Value> + Send + Sync>;
pub type SetRangeFn = Arc<dyn Fn(&mut Value, i64, i64, Value) -> Result<()> + Send + Sync>;

/// Operator or comparator handlers keyed by (token, right operand class).
pub struct DispatchTable<F> {
    entries: HashMap<(Operator, ClassKey), F>,
}

impl<F> DispatchTable<F> {
    pub fn insert(&mut self, op: Operator, right: ClassKey, handler: F) {
        self.entries.insert((op, right), handler);
    }

    pub fn get(&self, op: Operator, right: &ClassKey) -> Option<&F> {
        self.entries.get(&(op, right.clone()))
    }

    pub fn contains(&self, op: Operator, right: &ClassKey) -> bool {
        self.get(op, right).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(Operator, ClassKey), &F)> {
        self.entries.iter()
    }
}

impl<F> Default for DispatchTable<F> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

/// A named member readable through `getter` and, when `setter` is present, assignable.
#[derive(Clone)]
pub struct Property {
    pub class: Class,
    pub getter: Getter,
    pub setter: Option<Setter>,
}

/// Indexed access over an ordered sequence.
///
/// Ranges are half-open; handlers receive bounds already evaluated.
#[derive(Clone)]
pub struct Enumerable {
    pub item: Class,
    pub length: LengthFn,
    pub get_index: GetIndexFn,
    pub set_index: Option<SetIndexFn>,
    pub get_range: GetRangeFn,
    pub set_range: Option<SetRangeFn>,
}

/// The class can be built from an open record of its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordContract {
    /// Every declared property may be omitted (`Partial<T>`).
    pub all_optional: bool,
}

/// Behaviour attached to a class.
#[derive(Default)]
pub struct Descriptors {
    /// Keyed by the exact source class.
    pub constructors: HashMap<ClassKey, ConstructFn>,
    pub operators: DispatchTable<OperatorFn>,
    pub comparators: DispatchTable<ComparatorFn>,
    pub properties: Option<BTreeMap<String, Property>>,
    pub methods: BTreeMap<String, Method>,
    pub statics: BTreeMap<String, Binding>,
    pub enumerable: Option<Enumerable>,
    pub record: Option<RecordContract>,
    /// Wrapped class of `T?`, `Partial<T>` and `[]T`.
    pub inner: Option<Class>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Class
// ══════════════════════════════════════════════════════════════════════════════

struct ClassInner {
    key: ClassKey,
    name: String,
    descriptors: OnceLock<Descriptors>,
}

#[derive(Clone)]
pub struct Class(Arc<ClassInner>);

impl Class {
    pub fn new(key: ClassKey, name: impl Into<String>, descriptors: Descriptors) -> Self {
        Self::new_cyclic(key, name, |_| descriptors)
    }

    /// Build a class whose descriptors refer back to the class itself.
    pub fn new_cyclic(
        key: ClassKey,
        name: impl Into<String>,
        build: impl FnOnce(&Class) -> Descriptors,
    ) -> Self {
        let class = Class(Arc::new(ClassInner {
            key,
            name: name.into(),
            descriptors: OnceLock::new(),
        }));
        let descriptors = build(&class);
        // Nothing else can observe the cell before this point.
        let _ = class.0.descriptors.set(descriptors);
        class
    }

    pub fn key(&self) -> &ClassKey {
        &self.0.key
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn descriptors(&self) -> &Descriptors {
        self.0.descriptors.get_or_init(Descriptors::default)
    }

    pub fn fingerprint(&self) -> String {
        self.0.key.fingerprint()
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.0.key, ClassKey::Optional(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.0.key, ClassKey::Array(_))
    }

    pub fn is_open_record(&self) -> bool {
        matches!(self.0.key, ClassKey::Record(_))
    }

    pub fn inner(&self) -> Option<&Class> {
        self.descriptors().inner.as_ref()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.descriptors().properties.as_ref()?.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.descriptors().methods.get(name)
    }

    pub fn static_member(&self, name: &str) -> Option<&Binding> {
        self.descriptors().statics.get(name)
    }

    pub fn enumerable(&self) -> Option<&Enumerable> {
        self.descriptors().enumerable.as_ref()
    }

    pub fn has_comparators(&self) -> bool {
        !self.descriptors().comparators.is_empty()
    }
}

impl PartialEq for Class {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0.key == other.0.key
    }
}

impl Eq for Class {}

impl Hash for Class {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Class({})", self.name())
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Builder
// ══════════════════════════════════════════════════════════════════════════════

/// Assembles host classes.
///
/// ```ignore
/// let money = ClassBuilder::new("Money")
///     .constructor(&primitives::int(), |v| Ok(Value::Int(v.as_int().unwrap_or(0) * 100)))
///     .build();
/// ```
pub struct ClassBuilder {
    key: ClassKey,
    name: String,
    descriptors: Descriptors,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            key: ClassKey::Host {
                name: name.clone(),
                properties: BTreeMap::new(),
            },
            name,
            descriptors: Descriptors::default(),
        }
    }

    /// A named record type whose values are built from open records.
    pub fn record(name: impl Into<String>, fields: impl IntoIterator<Item = (String, Class)>) -> Self {
        let name = name.into();
        let fields: BTreeMap<String, Class> = fields.into_iter().collect();
        let key = ClassKey::Object {
            name: name.clone(),
            properties: fields
                .iter()
                .map(|(field, class)| (field.clone(), class.key().clone()))
                .collect(),
        };
        Self {
            key,
            name,
            descriptors: crate::derived::record_descriptors(&fields),
        }
    }

    pub fn key(mut self, key: ClassKey) -> Self {
        self.key = key;
        self
    }

    pub fn constructor(
        mut self,
        source: &Class,
        handler: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.descriptors
            .constructors
            .insert(source.key().clone(), Arc::new(handler));
        self
    }

    pub fn operator(
        mut self,
        op: Operator,
        right: &Class,
        handler: impl Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.descriptors
            .operators
            .insert(op, right.key().clone(), Arc::new(handler));
        self
    }

    pub fn comparator(
        mut self,
        op: Operator,
        right: &Class,
        handler: impl Fn(&Value, &Value) -> Result<bool> + Send + Sync + 'static,
    ) -> Self {
        self.descriptors
            .comparators
            .insert(op, right.key().clone(), Arc::new(handler));
        self
    }

    /// Properties of a host class are part of its key.
    pub fn property(mut self, name: impl Into<String>, property: Property) -> Self {
        let name = name.into();
        if let ClassKey::Host { properties, .. } = &mut self.key {
            properties.insert(name.clone(), property.class.key().clone());
        }
        self.descriptors
            .properties
            .get_or_insert_with(BTreeMap::new)
            .insert(name, property);
        self
    }

    pub fn method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.descriptors.methods.insert(name.into(), method);
        self
    }

    pub fn static_member(mut self, name: impl Into<String>, binding: Binding) -> Self {
        self.descriptors.statics.insert(name.into(), binding);
        self
    }

    pub fn build(self) -> Class {
        Class::new(self.key, self.name, self.descriptors)
    }

    /// Finish with access to the class handle, for handlers that produce
    /// values of the class being built.
    pub fn build_with(self, finish: impl FnOnce(&Class, &mut Descriptors)) -> Class {
        let mut descriptors = self.descriptors;
        Class::new_cyclic(self.key, self.name, move |class| {
            finish(class, &mut descriptors);
            descriptors
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;

    #[test]
    fn test_class_identity_is_structural() {
        let a = ClassBuilder::record("Foo", [("a".to_string(), primitives::string())]).build();
        let b = ClassBuilder::record("Foo", [("a".to_string(), primitives::string())]).build();
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let c = ClassBuilder::record("Foo", [("a".to_string(), primitives::int())]).build();
        assert_ne!(a, c);
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_hash_matches_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(primitives::string());
        set.insert(primitives::string());
        set.insert(primitives::int());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let fingerprint = ClassKey::Int.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_builder_tables() {
        let money = ClassBuilder::new("Money")
            .constructor(&primitives::int(), |v| Ok(v.clone()))
            .comparator(Operator::Eq, &primitives::int(), |_, _| Ok(true))
            .build();
        assert_eq!(
            money.key(),
            &ClassKey::Host {
                name: "Money".into(),
                properties: BTreeMap::new(),
            }
        );
        assert!(money.descriptors().constructors.contains_key(&ClassKey::Int));
        assert!(money.has_comparators());
        assert!(money.descriptors().operators.is_empty());
    }

    fn host(name: &str, property: &str, class: Class) -> Class {
        ClassBuilder::new(name)
            .property(
                property,
                Property {
                    class,
                    getter: Arc::new(|_| Ok(Value::Nil)),
                    setter: None,
                },
            )
            .build()
    }

    #[test]
    fn test_host_identity_includes_properties() {
        let a = host("Money", "cents", primitives::int());
        assert_eq!(a, host("Money", "cents", primitives::int()));

        let b = host("Money", "cents", primitives::string());
        assert_ne!(a, b);
        assert_ne!(a.fingerprint(), b.fingerprint());

        let c = host("Money", "amount", primitives::int());
        assert_ne!(a, c);
        assert_ne!(a, ClassBuilder::new("Money").build());
    }

    #[test]
    fn test_build_with_sees_own_handle() {
        let class = ClassBuilder::new("Token").build_with(|this, descriptors| {
            descriptors
                .statics
                .insert("self".into(), Binding::Class(this.clone()));
        });
        match class.static_member("self") {
            Some(Binding::Class(inner)) => assert_eq!(inner, &class),
            _ => panic!("expected class static"),
        }
    }
}
