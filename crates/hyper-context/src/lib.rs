//! Hyper context builder.
//!
//! A manifest lists named items, each built by an interface: `type User {
//! ... }` goes through the `type` interface, `action create(...)` through
//! whatever the host registered as `action`. Every item yields a
//! [`ContextItem`] holding the binding its own context uses and, unless the
//! item is private, the binding exported to hosts.

mod builder;
mod error;
mod interface;

pub use builder::{Context, ContextBuilder};
pub use error::{BuildError, BuildResult};
pub use interface::{ContextItem, EnumInterface, Interface, ItemKind, TypeInterface};
