//! Per-type constructors and live-instance tracking.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::FactoryError;
use crate::handle::ObjectRef;
use crate::id::{ConstructorId, ObjectId, PerTypeObjectId};
use crate::interface::CapabilityTable;
use crate::object::{Instance, Object};

type MakeFn = dyn Fn() -> Box<dyn Object> + Send + Sync;

/// What a module supplies to make one concrete type available.
///
/// Registering a definition whose type name is already known installs it as
/// the new version of that type.
#[derive(Clone)]
pub struct ConstructorDef {
	type_name: Arc<str>,
	id: ConstructorId,
	capabilities: Arc<CapabilityTable>,
	make: Arc<MakeFn>,
}

impl ConstructorDef {
	/// Definition for a `Default`-constructible type.
	pub fn new<T: Object + Default>(type_name: impl Into<Arc<str>>) -> Self {
		Self::from_fn(type_name, || Box::new(T::default()))
	}

	/// Definition using `make` to allocate fresh objects.
	pub fn from_fn<F>(type_name: impl Into<Arc<str>>, make: F) -> Self
	where
		F: Fn() -> Box<dyn Object> + Send + Sync + 'static,
	{
		let type_name = type_name.into();
		Self {
			id: ConstructorId::from_type_name(&type_name),
			type_name,
			capabilities: Arc::new(CapabilityTable::new()),
			make: Arc::new(make),
		}
	}

	pub fn with_capabilities(mut self, capabilities: CapabilityTable) -> Self {
		self.capabilities = Arc::new(capabilities);
		self
	}

	/// Pins the constructor id instead of deriving it from the type name.
	pub fn with_id(mut self, id: ConstructorId) -> Self {
		self.id = id;
		self
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn id(&self) -> ConstructorId {
		self.id
	}

	pub fn capabilities(&self) -> &CapabilityTable {
		&self.capabilities
	}
}

impl fmt::Debug for ConstructorDef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConstructorDef")
			.field("type_name", &self.type_name)
			.field("id", &self.id)
			.field("capabilities", &self.capabilities)
			.finish_non_exhaustive()
	}
}

/// The registered constructor for one concrete type.
///
/// Outlives every version of the type: a reload swaps in a new
/// [`ConstructorDef`] but keeps the id, the per-type id counter and the list
/// of live instances, so a rebuild can find every instance made by any version.
pub struct Constructor {
	id: ConstructorId,
	type_name: Arc<str>,
	current: ArcSwap<ConstructorDef>,
	generation: AtomicU32,
	next_per_type: AtomicU32,
	live: Mutex<BTreeMap<PerTypeObjectId, Weak<Instance>>>,
}

impl Constructor {
	pub(crate) fn new(def: ConstructorDef) -> Arc<Self> {
		Arc::new(Self {
			id: def.id,
			type_name: def.type_name.clone(),
			current: ArcSwap::from_pointee(def),
			generation: AtomicU32::new(0),
			next_per_type: AtomicU32::new(0),
			live: Mutex::new(BTreeMap::new()),
		})
	}

	pub fn constructor_id(&self) -> ConstructorId {
		self.id
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	/// Number of times this type has been reloaded.
	pub fn generation(&self) -> u32 {
		self.generation.load(Ordering::Acquire)
	}

	/// Definition currently used for new instances.
	pub fn current(&self) -> Arc<ConstructorDef> {
		self.current.load_full()
	}

	pub fn capabilities(&self) -> Arc<CapabilityTable> {
		self.current.load().capabilities.clone()
	}

	/// Creates a new, initialized instance and returns the first handle to it.
	pub fn construct(self: &Arc<Self>) -> Result<ObjectRef, FactoryError> {
		let instance = self.allocate().ok_or_else(|| FactoryError::IdsExhausted {
			type_name: self.type_name.to_string(),
		})?;
		instance.object.write().init(true);
		tracing::trace!(object = %instance.id(), type_name = %self.type_name, "object constructed");
		Ok(ObjectRef::new(instance))
	}

	/// Allocates and tracks an uninitialized instance with the next per-type id.
	///
	/// Returns `None` once every per-type id has been issued.
	pub(crate) fn allocate(self: &Arc<Self>) -> Option<Arc<Instance>> {
		let raw = self
			.next_per_type
			.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |next| next.checked_add(1))
			.ok()?;
		let per_type = PerTypeObjectId::from_raw(raw);
		let def = self.current.load_full();
		let instance = Arc::new(Instance::new(
			ObjectId {
				constructor: self.id,
				per_type,
			},
			self.type_name.clone(),
			def.capabilities.clone(),
			(def.make)(),
			Arc::downgrade(self),
		));
		self.live.lock().insert(per_type, Arc::downgrade(&instance));
		Some(instance)
	}

	#[cfg(test)]
	pub(crate) fn skip_ids_to(&self, next: u32) {
		self.next_per_type.store(next, Ordering::Relaxed);
	}

	/// Installs `def` as the new version of this type.
	pub(crate) fn reload(&self, def: ConstructorDef) -> u32 {
		self.current.store(Arc::new(def));
		self.generation.fetch_add(1, Ordering::AcqRel) + 1
	}

	pub(crate) fn forget(&self, per_type: PerTypeObjectId) {
		self.live.lock().remove(&per_type);
	}

	/// Every live, non-retired instance, ordered by per-type id.
	pub fn live_instances(&self) -> Vec<Arc<Instance>> {
		let candidates: Vec<Weak<Instance>> = self.live.lock().values().cloned().collect();
		candidates
			.iter()
			.filter_map(Weak::upgrade)
			.filter(|instance| !instance.is_runtime_delete())
			.collect()
	}

	/// Looks up a live, non-retired instance by its per-type id.
	pub fn instance(&self, per_type: PerTypeObjectId) -> Option<Arc<Instance>> {
		let weak = self.live.lock().get(&per_type).cloned()?;
		weak.upgrade().filter(|instance| !instance.is_runtime_delete())
	}

	pub fn live_count(&self) -> usize {
		self.live_instances().len()
	}
}

impl fmt::Debug for Constructor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Constructor")
			.field("id", &self.id)
			.field("type_name", &self.type_name)
			.field("generation", &self.generation())
			.field("live", &self.live_count())
			.finish()
	}
}
