//! The process-wide singleton table.

use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;

use crate::scope::{ContextId, Scope};
use crate::slot::{ContextSlot, ScopedSlot};

/// A type that can be published in the [`SystemTable`].
///
/// Implemented with [`declare_singleton!`](crate::declare_singleton), which
/// gives the type its own static [`ScopedSlot`].
pub trait Singleton: Send + Sync + 'static {
	fn slot() -> &'static ScopedSlot<Self>;
}

/// Implements [`Singleton`] for a type by giving it a static slot.
///
/// ```ignore
/// pub struct Clock { .. }
/// eagle_system::declare_singleton!(Clock);
/// ```
#[macro_export]
macro_rules! declare_singleton {
	($($ty:ty),+ $(,)?) => {
		$(
			impl $crate::Singleton for $ty {
				fn slot() -> &'static $crate::ScopedSlot<Self> {
					static SLOT: $crate::ScopedSlot<$ty> = $crate::ScopedSlot::new();
					&SLOT
				}
			}
		)+
	};
}

/// Scoped, non-owning registry of singletons.
///
/// Entries for a type are looked up through the type's own slot; the table
/// itself only remembers which slots have been used so a context can be
/// cleared across every type at once.
pub struct SystemTable {
	enrolled: Mutex<Vec<&'static dyn ContextSlot>>,
}

static GLOBAL: LazyLock<SystemTable> = LazyLock::new(|| SystemTable {
	enrolled: Mutex::new(Vec::new()),
});

impl SystemTable {
	/// The process-wide table.
	pub fn global() -> &'static SystemTable {
		&GLOBAL
	}

	/// Publishes `instance` for `T` in `scope`, replacing any previous entry.
	///
	/// The table does not keep `instance` alive.
	pub fn set_singleton<T: Singleton + ?Sized>(&self, instance: &Arc<T>, scope: impl Into<Scope>) {
		let scope = scope.into();
		let slot = T::slot();
		if slot.enroll() {
			self.enrolled.lock().push(slot);
		}
		let replaced = slot.set(instance, scope);
		tracing::debug!(type_name = std::any::type_name::<T>(), %scope, replaced, "singleton set");
	}

	/// Looks up `T` for `scope`.
	///
	/// A live global entry always wins over the entry for the context.
	pub fn get_singleton<T: Singleton + ?Sized>(&self, scope: impl Into<Scope>) -> Option<Arc<T>> {
		T::slot().get(scope.into())
	}

	/// Clears the entry for `T` in exactly `scope`.
	pub fn remove_singleton<T: Singleton + ?Sized>(&self, scope: impl Into<Scope>) -> bool {
		let scope = scope.into();
		let removed = T::slot().remove(scope);
		tracing::debug!(type_name = std::any::type_name::<T>(), %scope, removed, "singleton removed");
		removed
	}

	/// Clears every type's entry for `context`. Global entries are kept.
	///
	/// Returns the number of live entries that were cleared.
	pub fn clear_context(&self, context: ContextId) -> usize {
		let slots = self.enrolled.lock().clone();
		let cleared = slots
			.iter()
			.filter(|slot| {
				let removed = slot.clear_context(context);
				if removed {
					tracing::trace!(type_name = slot.type_name(), %context, "singleton cleared");
				}
				removed
			})
			.count();
		tracing::debug!(%context, cleared, "context cleared");
		cleared
	}
}
