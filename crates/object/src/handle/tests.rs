use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::*;
use crate::constructor::ConstructorDef;
use crate::factory::Factory;
use crate::test_fixtures::{Counter, CounterInterface, Foo, FooV2, Holder, foo_def, foo_v2_def, holder_def};

struct Tracked {
	drops: Arc<AtomicUsize>,
}

impl Object for Tracked {}

impl Drop for Tracked {
	fn drop(&mut self) {
		self.drops.fetch_add(1, Ordering::SeqCst);
	}
}

fn tracked_factory() -> (Factory, Arc<AtomicUsize>) {
	let drops = Arc::new(AtomicUsize::new(0));
	let factory = Factory::default();
	let counter = drops.clone();
	factory
		.register(ConstructorDef::from_fn("Tracked", move || {
			Box::new(Tracked {
				drops: counter.clone(),
			})
		}))
		.unwrap();
	(factory, drops)
}

struct Witness {
	id: NotifierId,
	hits: AtomicUsize,
}

impl Notifier for Witness {
	fn notifier_id(&self) -> NotifierId {
		self.id
	}

	fn on_object_replaced(&self, _replacement: &Arc<Instance>) {
		self.hits.fetch_add(1, Ordering::SeqCst);
	}
}

#[test]
fn equality_is_identity() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let a = factory.construct("Foo").unwrap();
	let b = factory.construct("Foo").unwrap();
	let a2 = a.clone();

	assert_eq!(a, a2);
	assert_ne!(a, b);
	assert_eq!(ObjectRef::empty(), ObjectRef::default());
	assert_ne!(a, ObjectRef::empty());
	assert!(a == a.target().unwrap());
}

#[test]
#[should_panic(expected = "dereferenced an empty ObjectRef")]
fn empty_handle_read_panics() {
	let handle = ObjectRef::empty();
	let _guard = handle.read();
}

#[test]
fn empty_handle_has_no_target() {
	let handle = ObjectRef::empty();
	assert!(handle.is_empty());
	assert!(handle.try_read().is_none());
	assert!(handle.try_write().is_none());
	assert!(handle.id().is_none());
	assert!(handle.interface::<CounterInterface>().is_none());
	assert!(!handle.downgrade().is_alive());
}

#[test]
fn registering_twice_is_a_no_op() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let instance = handle.target().unwrap();
	assert_eq!(instance.notifier_count(), 1);

	let witness = Arc::new(Witness {
		id: NotifierId::next(),
		hits: AtomicUsize::new(0),
	});
	let endpoint = Arc::downgrade(&witness) as Weak<dyn Notifier>;
	assert!(matches!(
		instance.register_notifier(witness.id, endpoint.clone()),
		Registration::Registered
	));
	assert!(matches!(
		instance.register_notifier(witness.id, endpoint),
		Registration::AlreadyRegistered
	));
	assert_eq!(instance.notifier_count(), 2);

	assert!(instance.deregister_notifier(witness.id));
	assert!(!instance.deregister_notifier(witness.id));
	assert_eq!(instance.notifier_count(), 1);
}

#[test]
fn clones_share_one_count_and_drop_deregisters() {
	let (factory, drops) = tracked_factory();
	let first = factory.construct("Tracked").unwrap();
	let instance = first.target().unwrap();
	let second = first.clone();
	assert_eq!(instance.notifier_count(), 2);

	drop(second);
	assert_eq!(instance.notifier_count(), 1);
	drop(instance);

	drop(first);
	assert_eq!(drops.load(Ordering::SeqCst), 1);
	assert_eq!(factory.constructor("Tracked").unwrap().live_count(), 0);
}

#[test]
fn read_guard_keeps_object_alive() {
	let (factory, drops) = tracked_factory();
	let handle = factory.construct("Tracked").unwrap();
	let guard = handle.read();
	drop(handle);
	assert_eq!(drops.load(Ordering::SeqCst), 0);
	assert!(guard.is::<Tracked>());
	drop(guard);
	assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn weak_ref_does_not_keep_object_alive() {
	let (factory, drops) = tracked_factory();
	let handle = factory.construct("Tracked").unwrap();
	let weak = handle.downgrade();
	assert!(weak.is_alive());

	let upgraded = weak.upgrade().unwrap();
	assert_eq!(upgraded, handle);
	drop(upgraded);

	drop(handle);
	assert_eq!(drops.load(Ordering::SeqCst), 1);
	assert!(!weak.is_alive());
	assert!(weak.upgrade().is_none());
	assert!(!weak.clone().is_alive());
}

#[test]
fn weak_ref_follows_swap() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let weak = handle.downgrade();

	factory.register(foo_v2_def()).unwrap();
	factory.rebuild_instances("Foo").unwrap();

	let upgraded = weak.upgrade().unwrap();
	assert_eq!(upgraded, handle);
	assert!(upgraded.read().is::<FooV2>());
}

#[test]
fn endpoint_notified_on_swap() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let witness = Arc::new(Witness {
		id: NotifierId::next(),
		hits: AtomicUsize::new(0),
	});
	let instance = handle.target().unwrap();
	instance.register_notifier(witness.id, Arc::downgrade(&witness) as Weak<dyn Notifier>);
	drop(instance);

	factory.rebuild_instances("Foo").unwrap();
	assert_eq!(witness.hits.load(Ordering::SeqCst), 1);
	assert_eq!(handle.target().unwrap().notifier_count(), 2);
}

#[test]
fn clone_of_retired_target_follows_successor() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let retired = handle.target().unwrap();

	factory.register(foo_v2_def()).unwrap();
	factory.rebuild_instances("Foo").unwrap();
	assert!(retired.is_runtime_delete());
	assert!(retired.successor().is_some());

	// Registration on the retired instance is redirected.
	let late = ObjectRef::new(retired.clone());
	assert_eq!(late, handle);
	assert!(!late.points_to(&retired));
	assert!(late.read().is::<FooV2>());
	assert_eq!(retired.notifier_count(), 0);
	assert_eq!(handle.target().unwrap().notifier_count(), 2);

	let late_weak = WeakRef::new(&retired);
	assert_eq!(late_weak.upgrade().unwrap(), handle);
}

#[test]
fn interface_access() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	factory.register(holder_def()).unwrap();
	let foo = factory.construct("Foo").unwrap();
	let holder = factory.construct("Holder").unwrap();

	assert!(foo.get_interface(CounterInterface::IID).is_some());
	assert!(foo.get_interface(InterfaceId::OBJECT).is_some());
	assert!(foo.get_interface(InterfaceId::from_name("Missing")).is_none());
	assert!(holder.get_interface(CounterInterface::IID).is_none());
	assert!(holder.interface::<CounterInterface>().is_none());
	assert!(foo.target().unwrap().implements(CounterInterface::IID));
	assert!(!holder.target().unwrap().implements(CounterInterface::IID));

	foo.interface_mut::<CounterInterface>().unwrap().bump();
	assert_eq!(foo.interface::<CounterInterface>().unwrap().count(), 1);
	assert_eq!(foo.read().downcast_ref::<Foo>().unwrap().count, 1);
}

#[test]
fn write_guard_mutates_in_place() {
	let factory = Factory::default();
	factory.register(holder_def()).unwrap();
	factory.register(foo_def()).unwrap();
	let holder = factory.construct("Holder").unwrap();
	let child = factory.construct("Foo").unwrap();

	holder.write().downcast_mut::<Holder>().unwrap().child = child.clone();
	let guard = holder.read();
	let stored = &guard.downcast_ref::<Holder>().unwrap().child;
	assert_eq!(*stored, child);
	assert_eq!(guard.id(), holder.id().unwrap());
}

#[test]
fn debug_names_type() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let rendered = format!("{handle:?}");
	assert!(rendered.contains("Foo"), "{rendered}");
	assert_eq!(format!("{:?}", ObjectRef::empty()), "ObjectRef(empty)");
}

#[test]
fn nested_read_during_pending_rebuild() {
	let factory = Factory::default();
	factory.register(foo_def()).unwrap();
	let handle = factory.construct("Foo").unwrap();
	let alias = handle.clone();
	let before = handle.id().unwrap();

	let outer = handle.read();
	thread::scope(|scope| {
		let rebuild = scope.spawn(|| factory.rebuild_instances("Foo").unwrap().swapped_count());
		// Let the rebuild queue on the write lock.
		thread::sleep(Duration::from_millis(50));

		let inner = alias.read();
		assert!(inner.is::<Foo>());
		assert_eq!(inner.id(), before);
		drop(inner);
		drop(outer);

		assert_eq!(rebuild.join().unwrap(), 1);
	});

	assert_ne!(handle.id().unwrap(), before);
	assert_eq!(handle, alias);
}
