//! The swappable object trait and its live container.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::archive::{Archive, ArchiveError};
use crate::constructor::Constructor;
use crate::id::{ConstructorId, InterfaceId, NotifierId, ObjectId, PerTypeObjectId};
use crate::interface::CapabilityTable;
use crate::notifier::{Notifier, NotifierSet};

/// A runtime-replaceable object.
///
/// Implementations only describe their own state. Identity, notifier
/// bookkeeping and capability lookup live on the surrounding [`Instance`].
pub trait Object: Any + Send + Sync {
	/// Called with `true` right after construction and with `false` after state
	/// has been migrated into this instance from the one it replaces.
	///
	/// Rebuild derived or cached state that [`Object::serialize`] does not carry.
	fn init(&mut self, first_init: bool) {
		let _ = first_init;
	}

	/// Visits every field that makes up this object's state.
	///
	/// Runs once against an archive in save mode on the instance being replaced
	/// and once in load mode on its replacement. Saving must not mutate `self`.
	fn serialize(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
		let _ = archive;
		Ok(())
	}
}

impl dyn Object {
	/// Returns the concrete object if it is a `T`.
	pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
		let any: &dyn Any = self;
		any.downcast_ref()
	}

	/// Returns the concrete object mutably if it is a `T`.
	pub fn downcast_mut<T: Object>(&mut self) -> Option<&mut T> {
		let any: &mut dyn Any = self;
		any.downcast_mut()
	}

	pub fn is<T: Object>(&self) -> bool {
		self.downcast_ref::<T>().is_some()
	}
}

pub(crate) type ObjectCell = Arc<RwLock<Box<dyn Object>>>;

/// Outcome of registering a notifier endpoint on an [`Instance`].
#[derive(Debug)]
pub enum Registration {
	Registered,
	AlreadyRegistered,
	/// The instance has been replaced; register on the successor instead.
	Superseded(Arc<Instance>),
}

#[derive(Default)]
struct Referrers {
	set: NotifierSet,
	successor: Option<Arc<Instance>>,
}

/// One live object together with its identity and referrer bookkeeping.
///
/// Owned by the strong handles pointing at it. When the last one lets go the
/// object is destroyed and its constructor stops tracking it.
pub struct Instance {
	id: ObjectId,
	type_name: Arc<str>,
	capabilities: Arc<CapabilityTable>,
	pub(crate) object: ObjectCell,
	referrers: Mutex<Referrers>,
	runtime_delete: AtomicBool,
	constructor: Weak<Constructor>,
}

impl Instance {
	pub(crate) fn new(
		id: ObjectId,
		type_name: Arc<str>,
		capabilities: Arc<CapabilityTable>,
		object: Box<dyn Object>,
		constructor: Weak<Constructor>,
	) -> Self {
		Self {
			id,
			type_name,
			capabilities,
			object: Arc::new(RwLock::new(object)),
			referrers: Mutex::new(Referrers::default()),
			runtime_delete: AtomicBool::new(false),
			constructor,
		}
	}

	pub fn id(&self) -> ObjectId {
		self.id
	}

	pub fn constructor_id(&self) -> ConstructorId {
		self.id.constructor
	}

	pub fn per_type_id(&self) -> PerTypeObjectId {
		self.id.per_type
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn capabilities(&self) -> &CapabilityTable {
		&self.capabilities
	}

	/// Returns true if this instance's type implements `iid`.
	///
	/// [`ObjectRef::get_interface`](crate::ObjectRef::get_interface) is the
	/// query returning the object itself.
	pub fn implements(&self, iid: InterfaceId) -> bool {
		self.capabilities.contains(iid)
	}

	/// Returns the constructor that produced this instance, if still registered.
	pub fn constructor(&self) -> Option<Arc<Constructor>> {
		self.constructor.upgrade()
	}

	/// True once this instance has been superseded by a replacement.
	pub fn is_runtime_delete(&self) -> bool {
		self.runtime_delete.load(Ordering::Acquire)
	}

	pub(crate) fn mark_runtime_delete(&self) {
		self.runtime_delete.store(true, Ordering::Release);
	}

	/// Adds `notifier` to the referrer set. Registering twice is a no-op.
	pub fn register_notifier(&self, id: NotifierId, notifier: Weak<dyn Notifier>) -> Registration {
		let mut referrers = self.referrers.lock();
		if let Some(successor) = &referrers.successor {
			return Registration::Superseded(successor.clone());
		}
		if referrers.set.insert(id, notifier) {
			Registration::Registered
		} else {
			Registration::AlreadyRegistered
		}
	}

	/// Removes the endpoint registered under `id`.
	pub fn deregister_notifier(&self, id: NotifierId) -> bool {
		self.referrers.lock().set.remove(id)
	}

	/// Number of endpoints that are still alive.
	pub fn notifier_count(&self) -> usize {
		self.referrers.lock().set.len()
	}

	/// The instance that replaced this one, once a rebuild has handed over.
	pub fn successor(&self) -> Option<Arc<Instance>> {
		self.referrers.lock().successor.clone()
	}

	/// Records `successor` and surrenders every registered endpoint to it.
	///
	/// Registrations arriving afterwards are redirected to `successor`.
	pub(crate) fn hand_over(&self, successor: &Arc<Instance>) -> NotifierSet {
		let mut referrers = self.referrers.lock();
		referrers.successor = Some(successor.clone());
		std::mem::take(&mut referrers.set)
	}

	pub(crate) fn adopt_notifiers(&self, set: NotifierSet) {
		self.referrers.lock().set.absorb(set);
	}
}

impl fmt::Debug for Instance {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Instance")
			.field("id", &self.id)
			.field("type_name", &self.type_name)
			.field("runtime_delete", &self.is_runtime_delete())
			.finish_non_exhaustive()
	}
}

impl Drop for Instance {
	fn drop(&mut self) {
		if let Some(constructor) = self.constructor.upgrade() {
			constructor.forget(self.id.per_type);
		}
		tracing::trace!(
			object = %self.id,
			type_name = %self.type_name,
			runtime_delete = self.is_runtime_delete(),
			"object destroyed"
		);
	}
}
