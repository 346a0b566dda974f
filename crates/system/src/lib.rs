#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Scoped singleton table.
//!
//! # Purpose
//!
//! Services such as a clock or a device context are published once and looked
//! up by type. A singleton is either global, visible from every execution
//! context, or bound to one [`ContextId`].
//!
//! # Mental Model
//!
//! Each singleton type owns a static [`ScopedSlot`] holding one global entry
//! and one entry per context, indexed by context id. Looking a type up never
//! consults a runtime type map.
//!
//! # Invariants
//!
//! - A live global entry shadows every per-context entry of the same type.
//!   - Enforced in: [`ScopedSlot::get`].
//!   - Tested by: `tests::global_entry_shadows_context_entry`.
//! - The table never keeps a singleton alive.
//!   - Enforced in: [`ScopedSlot::set`] (stores a `Weak`).
//!   - Tested by: `tests::dropped_singleton_reads_as_absent`.

mod scope;
mod slot;
mod table;

pub use scope::{ContextId, Scope};
pub use slot::ScopedSlot;
pub use table::{Singleton, SystemTable};
