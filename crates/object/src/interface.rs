//! Capability contracts and per-type capability tables.
//!
//! Each concrete type registers a [`CapabilityTable`] mapping every
//! [`InterfaceId`] it implements to a caster from `dyn Object` to the
//! interface's trait object. Querying a capability is one table lookup;
//! an unknown id is simply absent.
//!
//! ```ignore
//! pub trait Counter: Send + Sync {
//!     fn count(&self) -> u32;
//! }
//! eagle_object::declare_interface!(pub CounterInterface => dyn Counter);
//!
//! let table = eagle_object::capabilities!(Foo => CounterInterface);
//! ```

use std::any::Any;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::id::InterfaceId;
use crate::object::Object;

/// A capability contract an object may implement.
pub trait Interface: 'static {
	const IID: InterfaceId;
	const NAME: &'static str;
	/// The trait object the capability exposes, e.g. `dyn Counter`.
	type Target: ?Sized + 'static;
}

/// The base capability. Every object implements it.
pub struct ObjectInterface;

impl Interface for ObjectInterface {
	const IID: InterfaceId = InterfaceId::OBJECT;
	const NAME: &'static str = "IObject";
	type Target = dyn Object;
}

pub type CastRef<T> = for<'a> fn(&'a (dyn Object + 'static)) -> Option<&'a T>;
pub type CastMut<T> = for<'a> fn(&'a mut (dyn Object + 'static)) -> Option<&'a mut T>;

/// Converts a type-erased object into one interface's trait object.
pub struct Caster<I: Interface> {
	pub get: CastRef<I::Target>,
	pub get_mut: CastMut<I::Target>,
}

impl<I: Interface> Clone for Caster<I> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<I: Interface> Copy for Caster<I> {}

struct Entry {
	name: &'static str,
	caster: Box<dyn Any + Send + Sync>,
}

/// Interfaces implemented by one concrete type.
pub struct CapabilityTable {
	entries: FxHashMap<InterfaceId, Entry>,
}

impl Default for CapabilityTable {
	fn default() -> Self {
		Self::new()
	}
}

impl CapabilityTable {
	/// Creates a table holding only the base [`ObjectInterface`].
	pub fn new() -> Self {
		let table = Self {
			entries: FxHashMap::default(),
		};
		table.with::<ObjectInterface>(|object| Some(object), |object| Some(object))
	}

	/// Adds interface `I`. Re-adding an interface replaces its caster.
	pub fn with<I: Interface>(mut self, get: CastRef<I::Target>, get_mut: CastMut<I::Target>) -> Self {
		self.entries.insert(
			I::IID,
			Entry {
				name: I::NAME,
				caster: Box::new(Caster::<I> { get, get_mut }),
			},
		);
		self
	}

	/// Returns true if `iid` is implemented. Total over the id space.
	pub fn contains(&self, iid: InterfaceId) -> bool {
		self.entries.contains_key(&iid)
	}

	/// Returns `object` itself when its type implements `iid`.
	pub fn get_interface<'a>(
		&self,
		iid: InterfaceId,
		object: &'a (dyn Object + 'static),
	) -> Option<&'a (dyn Object + 'static)> {
		self.contains(iid).then_some(object)
	}

	pub fn caster<I: Interface>(&self) -> Option<&Caster<I>> {
		self.entries.get(&I::IID)?.caster.downcast_ref::<Caster<I>>()
	}

	/// Casts `object` to interface `I`.
	pub fn cast<'a, I: Interface>(&self, object: &'a (dyn Object + 'static)) -> Option<&'a I::Target> {
		(self.caster::<I>()?.get)(object)
	}

	pub fn cast_mut<'a, I: Interface>(
		&self,
		object: &'a mut (dyn Object + 'static),
	) -> Option<&'a mut I::Target> {
		(self.caster::<I>()?.get_mut)(object)
	}

	/// Name of every implemented interface, sorted.
	pub fn names(&self) -> Vec<&'static str> {
		let mut names: Vec<_> = self.entries.values().map(|entry| entry.name).collect();
		names.sort_unstable();
		names
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

impl fmt::Debug for CapabilityTable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_list().entries(self.names()).finish()
	}
}

/// Declares a marker type implementing [`Interface`].
///
/// The interface id is derived from the marker's name.
#[macro_export]
macro_rules! declare_interface {
	($(#[$meta:meta])* $vis:vis $name:ident => $target:ty) => {
		$(#[$meta])*
		$vis struct $name;

		impl $crate::Interface for $name {
			const IID: $crate::InterfaceId = $crate::InterfaceId::from_name(stringify!($name));
			const NAME: &'static str = stringify!($name);
			type Target = $target;
		}
	};
}

/// Builds the [`CapabilityTable`] for a concrete type.
///
/// `capabilities!(Foo => CounterInterface, NodeInterface)`
#[macro_export]
macro_rules! capabilities {
	($ty:ty $(=> $($iface:ty),* $(,)?)?) => {
		$crate::CapabilityTable::new()
			$($(.with::<$iface>(
				|object| object
					.downcast_ref::<$ty>()
					.map(|concrete| concrete as &<$iface as $crate::Interface>::Target),
				|object| object
					.downcast_mut::<$ty>()
					.map(|concrete| concrete as &mut <$iface as $crate::Interface>::Target),
			))*)?
	};
}

#[cfg(test)]
mod tests {
	use super::*;

	trait Greeter: Send + Sync {
		fn greet(&self) -> String;
		fn rename(&mut self, name: &str);
	}

	crate::declare_interface!(GreeterInterface => dyn Greeter);
	crate::declare_interface!(UnusedInterface => dyn Greeter);

	#[derive(Default)]
	struct Person {
		name: String,
	}

	impl Object for Person {}

	impl Greeter for Person {
		fn greet(&self) -> String {
			format!("hello {}", self.name)
		}

		fn rename(&mut self, name: &str) {
			self.name = name.to_string();
		}
	}

	#[test]
	fn base_interface_always_present() {
		let table = CapabilityTable::new();
		assert!(table.contains(InterfaceId::OBJECT));
		assert_eq!(table.len(), 1);
	}

	#[test]
	fn cast_through_table() {
		let table = crate::capabilities!(Person => GreeterInterface);
		let mut person: Box<dyn Object> = Box::new(Person {
			name: "ada".into(),
		});

		let greeter = table.cast::<GreeterInterface>(&*person).expect("implemented");
		assert_eq!(greeter.greet(), "hello ada");

		table
			.cast_mut::<GreeterInterface>(&mut *person)
			.expect("implemented")
			.rename("bob");
		assert_eq!(person.downcast_ref::<Person>().map(|p| p.name.as_str()), Some("bob"));
	}

	#[test]
	fn unknown_interface_is_absent() {
		let table = crate::capabilities!(Person => GreeterInterface);
		let person: Box<dyn Object> = Box::new(Person::default());

		assert!(!table.contains(UnusedInterface::IID));
		assert!(table.cast::<UnusedInterface>(&*person).is_none());
		assert!(table.get_interface(InterfaceId::from_name("Nope"), &*person).is_none());
		assert!(table.get_interface(GreeterInterface::IID, &*person).is_some());
	}

	#[test]
	fn names_are_sorted() {
		let table = crate::capabilities!(Person => GreeterInterface);
		assert_eq!(table.names(), vec!["GreeterInterface", "IObject"]);
	}
}
