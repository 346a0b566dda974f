//! Referrer endpoints told when their object is replaced.

use std::sync::{Arc, Weak};

use smallvec::SmallVec;

use crate::id::NotifierId;
use crate::object::Instance;

/// An endpoint registered against an object.
///
/// The rebuild pipeline calls [`Notifier::on_object_replaced`] on every
/// registered endpoint after the replacement is fully initialized and before
/// the old instance is retired.
pub trait Notifier: Send + Sync {
	fn notifier_id(&self) -> NotifierId;

	/// Retarget to `replacement`, which now carries the old object's identity.
	fn on_object_replaced(&self, replacement: &Arc<Instance>);
}

/// Set of endpoints registered on one object, keyed by [`NotifierId`].
///
/// Endpoints are held weakly; a dropped endpoint is skipped and pruned.
#[derive(Default)]
pub struct NotifierSet {
	entries: SmallVec<[(NotifierId, Weak<dyn Notifier>); 4]>,
}

impl NotifierSet {
	/// Inserts `notifier` under `id`. Returns false if `id` was already present.
	pub fn insert(&mut self, id: NotifierId, notifier: Weak<dyn Notifier>) -> bool {
		if self.contains(id) {
			return false;
		}
		self.entries.push((id, notifier));
		true
	}

	pub fn remove(&mut self, id: NotifierId) -> bool {
		let before = self.entries.len();
		self.entries.retain(|(entry, _)| *entry != id);
		self.entries.len() != before
	}

	pub fn contains(&self, id: NotifierId) -> bool {
		self.entries.iter().any(|(entry, _)| *entry == id)
	}

	/// Number of endpoints that are still alive.
	pub fn len(&self) -> usize {
		self.entries
			.iter()
			.filter(|(_, notifier)| notifier.strong_count() > 0)
			.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Upgrades every live endpoint and drops the dead ones.
	pub(crate) fn live(&mut self) -> Vec<Arc<dyn Notifier>> {
		self.entries.retain(|(_, notifier)| notifier.strong_count() > 0);
		self.entries
			.iter()
			.filter_map(|(_, notifier)| notifier.upgrade())
			.collect()
	}

	/// Merges `other` into this set, keeping set semantics.
	pub(crate) fn absorb(&mut self, other: NotifierSet) {
		for (id, notifier) in other.entries {
			self.insert(id, notifier);
		}
	}
}
