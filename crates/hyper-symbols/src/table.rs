//! Symbol tables.
//!
//! Lookup order is immutable builtins, then local frames from the innermost
//! outward, then the root lookup object. A table clone shares its frames with
//! the original; [`SymbolTable::clone_scope`] additionally pushes a fresh
//! frame, so nested declarations never leak outward while assignments still
//! reach the frame that owns the name.

use crate::builtins;
use crate::class::Class;
use crate::config::{Config, Console};
use crate::native::Function;
use crate::value::{ExpectedValue, Value};
use hyper_types::{ErrorCode, InterpreterError, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What a name resolves to.
#[derive(Clone)]
pub enum Binding {
    Class(Class),
    Value(Value),
    Expected(ExpectedValue),
    Object(Arc<dyn Object>),
    Callable(Function),
}

impl Binding {
    /// Short label for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Class(_) => "class",
            Binding::Value(_) | Binding::Expected(_) => "value",
            Binding::Object(_) => "object",
            Binding::Callable(_) => "function",
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Class(class) => write!(f, "Class({class})"),
            Binding::Value(value) => write!(f, "Value({value:?})"),
            Binding::Expected(expected) => write!(f, "Expected({})", expected.class),
            Binding::Object(_) => f.write_str("Object"),
            Binding::Callable(function) => write!(f, "{function:?}"),
        }
    }
}

/// A lookup object: resolves member names lazily.
pub trait Object: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Binding>>;
}

// ══════════════════════════════════════════════════════════════════════════════
// Loop control
// ══════════════════════════════════════════════════════════════════════════════

/// `continue`/`break` requests of the innermost running loop.
#[derive(Debug, Default)]
pub struct LoopState {
    continue_requested: AtomicBool,
    break_requested: AtomicBool,
}

impl LoopState {
    pub fn request_continue(&self) {
        self.continue_requested.store(true, Ordering::Relaxed);
    }

    pub fn request_break(&self) {
        self.break_requested.store(true, Ordering::Relaxed);
    }

    /// Whether the current iteration must stop running statements.
    pub fn interrupted(&self) -> bool {
        self.continue_requested.load(Ordering::Relaxed) || self.is_broken()
    }

    pub fn is_broken(&self) -> bool {
        self.break_requested.load(Ordering::Relaxed)
    }

    /// Clear a pending `continue` before the next iteration.
    pub fn next_iteration(&self) {
        self.continue_requested.store(false, Ordering::Relaxed);
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// SymbolTable
// ══════════════════════════════════════════════════════════════════════════════

type Frame = Arc<RwLock<HashMap<String, Binding>>>;

fn new_frame() -> Frame {
    Arc::new(RwLock::new(HashMap::new()))
}

#[derive(Clone)]
pub struct SymbolTable {
    root: Option<Arc<dyn Object>>,
    immutable: Arc<HashMap<String, Binding>>,
    frames: Vec<Frame>,
    loop_state: Option<Arc<LoopState>>,
    console: Arc<Console>,
}

impl SymbolTable {
    /// A table holding only the builtins, printing to stdout.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        let console = Arc::new(Console::new(config.print));
        Self {
            root: None,
            immutable: Arc::new(builtins::bindings(&console)),
            frames: vec![new_frame()],
            loop_state: None,
            console,
        }
    }

    /// Resolve names not found anywhere else through `root`.
    pub fn with_root(mut self, root: Arc<dyn Object>) -> Self {
        self.root = Some(root);
        self
    }

    /// Add an immutable binding alongside the builtins.
    pub fn with_immutable(mut self, name: impl Into<String>, binding: Binding) -> Self {
        Arc::make_mut(&mut self.immutable).insert(name.into(), binding);
        self
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// A child scope: fresh frame on top, parent frames read-through.
    pub fn clone_scope(&self) -> Self {
        let mut table = self.clone();
        table.frames.push(new_frame());
        table
    }

    /// A child scope carrying fresh loop-control flags.
    pub fn start_loop(&self) -> Self {
        let mut table = self.clone_scope();
        table.loop_state = Some(Arc::new(LoopState::default()));
        table
    }

    /// A child scope with loop control cleared, as seen by a function body.
    pub fn without_loop(&self) -> Self {
        let mut table = self.clone_scope();
        table.loop_state = None;
        table
    }

    pub fn loop_state(&self) -> Option<&LoopState> {
        self.loop_state.as_deref()
    }

    pub fn get(&self, name: &str) -> Result<Option<Binding>> {
        if let Some(binding) = self.immutable.get(name) {
            return Ok(Some(binding.clone()));
        }
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.read().get(name) {
                return Ok(Some(binding.clone()));
            }
        }
        match &self.root {
            Some(root) => root.get(name),
            None => Ok(None),
        }
    }

    /// Binding declared in the innermost frame only.
    pub fn lookup_local(&self, name: &str) -> Option<Binding> {
        self.frames.last()?.read().get(name).cloned()
    }

    fn is_immutable(&self, name: &str) -> Result<bool> {
        if self.immutable.contains_key(name) {
            return Ok(true);
        }
        match &self.root {
            Some(root) => Ok(root.get(name)?.is_some()),
            None => Ok(false),
        }
    }

    /// Fails when `name` is immutable or already declared in this frame.
    pub fn check_declarable(&self, name: &str) -> Result<()> {
        if self.is_immutable(name)? {
            return Err(InterpreterError::new(
                ErrorCode::CANNOT_REASSIGN_IMMUTABLE_VALUE,
                format!("cannot reassign immutable value {name}"),
            ));
        }
        if self.lookup_local(name).is_some() {
            return Err(InterpreterError::new(
                ErrorCode::CANNOT_REDECLARE_VALUE,
                format!("cannot redeclare value {name}"),
            ));
        }
        Ok(())
    }

    pub fn declare(&self, name: &str, binding: Binding) -> Result<()> {
        self.check_declarable(name)?;
        self.insert(name, binding);
        Ok(())
    }

    /// Bind in the innermost frame without checks.
    pub fn insert(&self, name: &str, binding: Binding) {
        if let Some(frame) = self.frames.last() {
            frame.write().insert(name.to_string(), binding);
        }
    }

    fn check_mutable(&self, name: &str) -> Result<()> {
        if self.is_immutable(name)? {
            return Err(InterpreterError::new(
                ErrorCode::CANNOT_REASSIGN_IMMUTABLE_VALUE,
                format!("cannot reassign immutable value {name}"),
            ));
        }
        Ok(())
    }

    fn unknown(name: &str) -> InterpreterError {
        InterpreterError::new(ErrorCode::UNKNOWN_SELECTOR, format!("unknown selector {name}"))
    }

    /// Fails where [`SymbolTable::assign`] would, without writing.
    pub fn check_assignable(&self, name: &str) -> Result<()> {
        self.check_mutable(name)?;
        if self.frames.iter().any(|frame| frame.read().contains_key(name)) {
            Ok(())
        } else {
            Err(Self::unknown(name))
        }
    }

    /// Update `name` in the frame that owns it.
    pub fn assign(&self, name: &str, binding: Binding) -> Result<()> {
        self.check_mutable(name)?;
        for frame in self.frames.iter().rev() {
            let mut frame = frame.write();
            if let Some(slot) = frame.get_mut(name) {
                *slot = binding;
                return Ok(());
            }
        }
        Err(Self::unknown(name))
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("frames", &self.frames.len())
            .field("in_loop", &self.loop_state.is_some())
            .finish()
    }
}
