//! Per-type singleton storage.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::scope::{ContextId, Scope};

/// Contexts below this id live in a flat array; higher ids are hashed.
pub(crate) const DENSE_CONTEXTS: u32 = 64;

struct Entries<T: ?Sized> {
	global: Option<Weak<T>>,
	/// Indexed by [`ContextId`], ids below [`DENSE_CONTEXTS`].
	dense: Vec<Option<Weak<T>>>,
	sparse: FxHashMap<ContextId, Weak<T>>,
}

impl<T: ?Sized> Entries<T> {
	const fn new() -> Self {
		Self {
			global: None,
			dense: Vec::new(),
			sparse: HashMap::with_hasher(FxBuildHasher),
		}
	}

	fn get(&self, scope: Scope) -> Option<&Weak<T>> {
		match scope {
			Scope::Global => self.global.as_ref(),
			Scope::Context(context) if context.raw() < DENSE_CONTEXTS => {
				self.dense.get(context.index())?.as_ref()
			}
			Scope::Context(context) => self.sparse.get(&context),
		}
	}

	fn insert(&mut self, scope: Scope, entry: Weak<T>) -> Option<Weak<T>> {
		match scope {
			Scope::Global => self.global.replace(entry),
			Scope::Context(context) if context.raw() < DENSE_CONTEXTS => {
				let index = context.index();
				if self.dense.len() <= index {
					self.dense.resize_with(index + 1, || None);
				}
				self.dense[index].replace(entry)
			}
			Scope::Context(context) => self.sparse.insert(context, entry),
		}
	}

	fn take(&mut self, scope: Scope) -> Option<Weak<T>> {
		match scope {
			Scope::Global => self.global.take(),
			Scope::Context(context) if context.raw() < DENSE_CONTEXTS => {
				self.dense.get_mut(context.index()).and_then(Option::take)
			}
			Scope::Context(context) => self.sparse.remove(&context),
		}
	}

	fn contexts(&self) -> impl Iterator<Item = &Weak<T>> {
		self.dense.iter().flatten().chain(self.sparse.values())
	}
}

fn is_live<T: ?Sized>(entry: &Weak<T>) -> bool {
	entry.strong_count() > 0
}

/// Global and per-context singleton entries for one type.
///
/// Entries are non-owning. An entry whose instance has been dropped by its
/// owner reads as absent.
pub struct ScopedSlot<T: ?Sized> {
	entries: RwLock<Entries<T>>,
	enrolled: AtomicBool,
}

impl<T: ?Sized> Default for ScopedSlot<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: ?Sized> ScopedSlot<T> {
	pub const fn new() -> Self {
		Self {
			entries: RwLock::new(Entries::new()),
			enrolled: AtomicBool::new(false),
		}
	}

	/// Points `scope` at `instance`. Returns true if a live entry was replaced.
	pub fn set(&self, instance: &Arc<T>, scope: Scope) -> bool {
		let previous = self.entries.write().insert(scope, Arc::downgrade(instance));
		previous.is_some_and(|weak| is_live(&weak))
	}

	/// Resolves `scope`, consulting the global entry first.
	///
	/// For [`Scope::Global`] only the global entry is consulted.
	pub fn get(&self, scope: Scope) -> Option<Arc<T>> {
		let entries = self.entries.read();
		if let Some(global) = entries.global.as_ref().and_then(Weak::upgrade) {
			return Some(global);
		}
		match scope {
			Scope::Global => None,
			Scope::Context(_) => entries.get(scope)?.upgrade(),
		}
	}

	/// Clears the entry for `scope` only. Returns true if it held a live instance.
	pub fn remove(&self, scope: Scope) -> bool {
		let removed = self.entries.write().take(scope);
		removed.is_some_and(|weak| is_live(&weak))
	}

	/// True if no entry holds a live instance.
	pub fn is_empty(&self) -> bool {
		let entries = self.entries.read();
		!entries.global.as_ref().is_some_and(is_live) && !entries.contexts().any(is_live)
	}

	/// Marks the slot as known to a table. Returns true the first time.
	pub(crate) fn enroll(&self) -> bool {
		!self.enrolled.swap(true, Ordering::AcqRel)
	}
}

impl<T: ?Sized> fmt::Debug for ScopedSlot<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let entries = self.entries.read();
		f.debug_struct("ScopedSlot")
			.field("type_name", &std::any::type_name::<T>())
			.field("global", &entries.global.is_some())
			.field("contexts", &entries.contexts().count())
			.finish()
	}
}

/// Type-erased view of a slot, used to sweep one context across every type.
pub(crate) trait ContextSlot: Send + Sync {
	fn type_name(&self) -> &'static str;

	fn clear_context(&self, context: ContextId) -> bool;
}

impl<T: ?Sized + Send + Sync + 'static> ContextSlot for ScopedSlot<T> {
	fn type_name(&self) -> &'static str {
		std::any::type_name::<T>()
	}

	fn clear_context(&self, context: ContextId) -> bool {
		self.remove(Scope::Context(context))
	}
}
