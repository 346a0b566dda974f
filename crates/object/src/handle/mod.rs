//! Indirect references that follow their object across hot-swaps.
//!
//! # Mental Model
//!
//! Every [`ObjectRef`] owns one private endpoint (a `Link`) registered in the
//! target [`Instance`]'s notifier set. The endpoint stores its target in an
//! [`ArcSwap`], so retargeting on swap is a single atomic store and never
//! races a reader loading the pointer.
//!
//! The shared reference count is the strong count of the target instance:
//! each live endpoint holds one. Cloning a handle registers a fresh endpoint
//! on the current target; dropping a handle deregisters its endpoint and then
//! releases its count, destroying the object when it was the last.
//!
//! # Invariants
//!
//! - A non-empty handle always resolves to a live, non-retired instance.
//!   - Enforced in: [`ObjectRef::read`] (retired targets are re-resolved through
//!     [`Instance::successor`]) and `Link::attach` (late registrations follow the
//!     successor).
//!   - Tested by: `tests::clone_of_retired_target_follows_successor`,
//!     `tests/hot_swap.rs::readers_never_observe_retired_objects`.
//! - Dropping a handle deregisters before releasing ownership.
//!   - Enforced in: `Link::drop`.
//! - A thread that already holds an object guard never queues behind a
//!   pending rebuild when it reads again.
//!   - Enforced in: [`ObjectRef::try_read`] (recursive read while `HELD_GUARDS`
//!     is non-zero).
//!   - Tested by: `tests::nested_read_during_pending_rebuild`.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};

use crate::id::{InterfaceId, NotifierId, ObjectId};
use crate::interface::{Caster, Interface};
use crate::notifier::Notifier;
use crate::object::{Instance, Object, Registration};

thread_local! {
	/// Object guards alive on this thread.
	static HELD_GUARDS: Cell<usize> = const { Cell::new(0) };
}

/// Counts one live guard on the current thread. Not `Send`, like the guards.
struct Held(PhantomData<*const ()>);

impl Held {
	fn enter() -> Self {
		HELD_GUARDS.with(|held| held.set(held.get() + 1));
		Held(PhantomData)
	}
}

impl Drop for Held {
	fn drop(&mut self) {
		HELD_GUARDS.with(|held| held.set(held.get() - 1));
	}
}

fn holds_guard() -> bool {
	HELD_GUARDS.with(Cell::get) > 0
}

struct Link {
	id: NotifierId,
	target: ArcSwap<Instance>,
}

impl Link {
	fn attach(instance: Arc<Instance>) -> Arc<Self> {
		let link = Arc::new(Self {
			id: NotifierId::next(),
			target: ArcSwap::new(instance),
		});
		let endpoint = Arc::downgrade(&link) as Weak<dyn Notifier>;
		let mut target = link.target.load_full();
		while let Registration::Superseded(successor) =
			target.register_notifier(link.id, endpoint.clone())
		{
			link.target.store(successor.clone());
			target = successor;
		}
		link
	}

	/// Current target, skipping over instances that have been retired.
	fn resolve(&self) -> Arc<Instance> {
		let mut target = self.target.load_full();
		while target.is_runtime_delete() {
			let Some(successor) = target.successor() else {
				break;
			};
			let _ = self.target.compare_and_swap(&target, successor.clone());
			target = successor;
		}
		target
	}
}

impl Notifier for Link {
	fn notifier_id(&self) -> NotifierId {
		self.id
	}

	fn on_object_replaced(&self, replacement: &Arc<Instance>) {
		self.target.store(replacement.clone());
	}
}

impl Drop for Link {
	fn drop(&mut self) {
		self.target.load().deregister_notifier(self.id);
	}
}

/// Shared, reference-counted handle to a hot-swappable object.
///
/// Dereferencing always reaches the current incarnation of the object, even
/// after its type has been rebuilt. The default value is an empty handle.
#[derive(Default)]
pub struct ObjectRef {
	link: Option<Arc<Link>>,
}

impl ObjectRef {
	/// Takes shared ownership of `instance`.
	pub fn new(instance: Arc<Instance>) -> Self {
		Self {
			link: Some(Link::attach(instance)),
		}
	}

	/// An empty handle.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.link.is_none()
	}

	/// The instance this handle currently points at.
	pub fn target(&self) -> Option<Arc<Instance>> {
		self.link.as_ref().map(|link| link.resolve())
	}

	pub fn id(&self) -> Option<ObjectId> {
		self.target().map(|instance| instance.id())
	}

	pub fn type_name(&self) -> Option<String> {
		self.target().map(|instance| instance.type_name().to_string())
	}

	/// Returns a weak handle to the same object.
	pub fn downgrade(&self) -> WeakRef {
		match self.target() {
			Some(instance) => WeakRef::new(&instance),
			None => WeakRef::default(),
		}
	}

	/// Shared access to the current object.
	///
	/// # Panics
	///
	/// Panics if the handle is empty.
	#[track_caller]
	pub fn read(&self) -> ObjectReadGuard {
		match self.try_read() {
			Some(guard) => guard,
			None => panic!("dereferenced an empty ObjectRef"),
		}
	}

	/// Shared access to the current object, or `None` for an empty handle.
	pub fn try_read(&self) -> Option<ObjectReadGuard> {
		let link = self.link.as_ref()?;
		loop {
			let instance = link.resolve();
			// A plain read queues behind a waiting rebuild; nested reads must not.
			let guard = if holds_guard() {
				instance.object.read_arc_recursive()
			} else {
				instance.object.read_arc()
			};
			// Retired while we waited on the lock.
			if !instance.is_runtime_delete() {
				return Some(ObjectReadGuard {
					instance,
					guard,
					_held: Held::enter(),
				});
			}
		}
	}

	/// Exclusive access to the current object.
	///
	/// # Panics
	///
	/// Panics if the handle is empty.
	#[track_caller]
	pub fn write(&self) -> ObjectWriteGuard {
		match self.try_write() {
			Some(guard) => guard,
			None => panic!("dereferenced an empty ObjectRef"),
		}
	}

	pub fn try_write(&self) -> Option<ObjectWriteGuard> {
		let link = self.link.as_ref()?;
		loop {
			let instance = link.resolve();
			let guard = instance.object.write_arc();
			if !instance.is_runtime_delete() {
				return Some(ObjectWriteGuard {
					instance,
					guard,
					_held: Held::enter(),
				});
			}
		}
	}

	/// Returns the object if it implements `iid`.
	pub fn get_interface(&self, iid: InterfaceId) -> Option<ObjectReadGuard> {
		let guard = self.try_read()?;
		guard.instance.implements(iid).then_some(guard)
	}

	/// Shared access through interface `I`.
	pub fn interface<I: Interface>(&self) -> Option<InterfaceGuard<I>> {
		let inner = self.try_read()?;
		let caster = *inner.instance.capabilities().caster::<I>()?;
		(caster.get)(&**inner.guard)?;
		Some(InterfaceGuard { inner, caster })
	}

	/// Exclusive access through interface `I`.
	pub fn interface_mut<I: Interface>(&self) -> Option<InterfaceWriteGuard<I>> {
		let mut inner = self.try_write()?;
		let caster = *inner.instance.capabilities().caster::<I>()?;
		(caster.get_mut)(&mut **inner.guard)?;
		Some(InterfaceWriteGuard { inner, caster })
	}

	/// True if this handle currently points at `instance`.
	pub fn points_to(&self, instance: &Arc<Instance>) -> bool {
		self.target()
			.is_some_and(|target| Arc::ptr_eq(&target, instance))
	}
}

impl Clone for ObjectRef {
	fn clone(&self) -> Self {
		match self.target() {
			Some(instance) => Self::new(instance),
			None => Self::default(),
		}
	}
}

impl PartialEq for ObjectRef {
	fn eq(&self, other: &Self) -> bool {
		match (self.target(), other.target()) {
			(Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
			(None, None) => true,
			_ => false,
		}
	}
}

impl Eq for ObjectRef {}

impl PartialEq<Arc<Instance>> for ObjectRef {
	fn eq(&self, other: &Arc<Instance>) -> bool {
		self.points_to(other)
	}
}

impl From<Arc<Instance>> for ObjectRef {
	fn from(instance: Arc<Instance>) -> Self {
		Self::new(instance)
	}
}

impl fmt::Debug for ObjectRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.target() {
			Some(instance) => f
				.debug_struct("ObjectRef")
				.field("id", &instance.id())
				.field("type_name", &instance.type_name())
				.finish(),
			None => f.write_str("ObjectRef(empty)"),
		}
	}
}

struct WeakLink {
	id: NotifierId,
	target: RwLock<Weak<Instance>>,
}

impl Notifier for WeakLink {
	fn notifier_id(&self) -> NotifierId {
		self.id
	}

	fn on_object_replaced(&self, replacement: &Arc<Instance>) {
		*self.target.write() = Arc::downgrade(replacement);
	}
}

impl Drop for WeakLink {
	fn drop(&mut self) {
		if let Some(instance) = self.target.get_mut().upgrade() {
			instance.deregister_notifier(self.id);
		}
	}
}

/// Non-owning handle to a hot-swappable object.
///
/// Retargeted on swap like [`ObjectRef`], but never keeps its object alive.
#[derive(Default)]
pub struct WeakRef {
	link: Option<Arc<WeakLink>>,
}

impl WeakRef {
	fn new(instance: &Arc<Instance>) -> Self {
		let link = Arc::new(WeakLink {
			id: NotifierId::next(),
			target: RwLock::new(Arc::downgrade(instance)),
		});
		let endpoint = Arc::downgrade(&link) as Weak<dyn Notifier>;
		let mut target = instance.clone();
		while let Registration::Superseded(successor) =
			target.register_notifier(link.id, endpoint.clone())
		{
			*link.target.write() = Arc::downgrade(&successor);
			target = successor;
		}
		Self { link: Some(link) }
	}

	/// Returns a strong handle if the object is still alive.
	pub fn upgrade(&self) -> Option<ObjectRef> {
		let link = self.link.as_ref()?;
		let instance = link.target.read().upgrade()?;
		Some(ObjectRef::new(instance))
	}

	pub fn is_alive(&self) -> bool {
		self.link
			.as_ref()
			.is_some_and(|link| link.target.read().strong_count() > 0)
	}
}

impl Clone for WeakRef {
	fn clone(&self) -> Self {
		let target = self.link.as_ref().and_then(|link| link.target.read().upgrade());
		match target {
			Some(instance) => Self::new(&instance),
			None => Self::default(),
		}
	}
}

impl fmt::Debug for WeakRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WeakRef")
			.field("alive", &self.is_alive())
			.finish()
	}
}

/// Shared access to an object through an [`ObjectRef`].
///
/// Holds the instance alive and blocks any rebuild of it until dropped.
pub struct ObjectReadGuard {
	instance: Arc<Instance>,
	guard: ArcRwLockReadGuard<RawRwLock, Box<dyn Object>>,
	_held: Held,
}

impl ObjectReadGuard {
	pub fn instance(&self) -> &Arc<Instance> {
		&self.instance
	}

	pub fn id(&self) -> ObjectId {
		self.instance.id()
	}
}

impl Deref for ObjectReadGuard {
	type Target = dyn Object;

	fn deref(&self) -> &Self::Target {
		&**self.guard
	}
}

/// Exclusive access to an object through an [`ObjectRef`].
pub struct ObjectWriteGuard {
	instance: Arc<Instance>,
	guard: ArcRwLockWriteGuard<RawRwLock, Box<dyn Object>>,
	_held: Held,
}

impl ObjectWriteGuard {
	pub fn instance(&self) -> &Arc<Instance> {
		&self.instance
	}

	pub fn id(&self) -> ObjectId {
		self.instance.id()
	}
}

impl Deref for ObjectWriteGuard {
	type Target = dyn Object;

	fn deref(&self) -> &Self::Target {
		&**self.guard
	}
}

impl DerefMut for ObjectWriteGuard {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut **self.guard
	}
}

/// Shared access to an object through one of its interfaces.
pub struct InterfaceGuard<I: Interface> {
	inner: ObjectReadGuard,
	caster: Caster<I>,
}

impl<I: Interface> InterfaceGuard<I> {
	pub fn instance(&self) -> &Arc<Instance> {
		self.inner.instance()
	}
}

impl<I: Interface> Deref for InterfaceGuard<I> {
	type Target = I::Target;

	fn deref(&self) -> &I::Target {
		match (self.caster.get)(&**self.inner.guard) {
			Some(target) => target,
			None => unreachable!("interface checked when the guard was taken"),
		}
	}
}

/// Exclusive access to an object through one of its interfaces.
pub struct InterfaceWriteGuard<I: Interface> {
	inner: ObjectWriteGuard,
	caster: Caster<I>,
}

impl<I: Interface> InterfaceWriteGuard<I> {
	pub fn instance(&self) -> &Arc<Instance> {
		self.inner.instance()
	}
}

impl<I: Interface> Deref for InterfaceWriteGuard<I> {
	type Target = I::Target;

	fn deref(&self) -> &I::Target {
		match (self.caster.get)(&**self.inner.guard) {
			Some(target) => target,
			None => unreachable!("interface checked when the guard was taken"),
		}
	}
}

impl<I: Interface> DerefMut for InterfaceWriteGuard<I> {
	fn deref_mut(&mut self) -> &mut I::Target {
		match (self.caster.get_mut)(&mut **self.inner.guard) {
			Some(target) => target,
			None => unreachable!("interface checked when the guard was taken"),
		}
	}
}

#[cfg(test)]
mod tests;
