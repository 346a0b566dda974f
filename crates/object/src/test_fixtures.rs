//! Object types shared by the unit tests.

use crate::archive::{Archive, ArchiveError};
use crate::constructor::ConstructorDef;
use crate::handle::{ObjectRef, WeakRef};
use crate::object::Object;

pub(crate) trait Counter: Send + Sync {
	fn count(&self) -> u32;
	fn bump(&mut self);
}

crate::declare_interface!(pub(crate) CounterInterface => dyn Counter);

/// First version of the `Foo` type.
#[derive(Debug, Default)]
pub(crate) struct Foo {
	pub count: u32,
	pub label: String,
	pub fail_save: bool,
	pub inits: Vec<bool>,
}

impl Object for Foo {
	fn init(&mut self, first_init: bool) {
		self.inits.push(first_init);
	}

	fn serialize(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
		if archive.is_saving() && self.fail_save {
			return Err(ArchiveError::custom("foo refused to save"));
		}
		archive.value("count", &mut self.count)?;
		archive.value("label", &mut self.label)?;
		archive.value("fail_save", &mut self.fail_save)
	}
}

impl Counter for Foo {
	fn count(&self) -> u32 {
		self.count
	}

	fn bump(&mut self) {
		self.count += 1;
	}
}

/// Second version of `Foo`, adding `extra`.
#[derive(Debug)]
pub(crate) struct FooV2 {
	pub count: u32,
	pub label: String,
	pub extra: u32,
	pub inits: Vec<bool>,
}

impl Default for FooV2 {
	fn default() -> Self {
		Self {
			count: 0,
			label: String::new(),
			extra: 42,
			inits: Vec::new(),
		}
	}
}

impl Object for FooV2 {
	fn init(&mut self, first_init: bool) {
		self.inits.push(first_init);
	}

	fn serialize(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
		archive.value("count", &mut self.count)?;
		archive.value("label", &mut self.label)?;
		archive.value("extra", &mut self.extra)
	}
}

impl Counter for FooV2 {
	fn count(&self) -> u32 {
		self.count
	}

	fn bump(&mut self) {
		self.count += 2;
	}
}

/// Owns one child and observes one peer.
#[derive(Debug, Default)]
pub(crate) struct Holder {
	pub child: ObjectRef,
	pub peer: WeakRef,
}

impl Object for Holder {
	fn serialize(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
		archive.object("child", &mut self.child)?;
		archive.weak("peer", &mut self.peer)
	}
}

pub(crate) fn foo_def() -> ConstructorDef {
	ConstructorDef::new::<Foo>("Foo").with_capabilities(crate::capabilities!(Foo => CounterInterface))
}

/// `FooV2` registered under the `Foo` type name.
pub(crate) fn foo_v2_def() -> ConstructorDef {
	ConstructorDef::new::<FooV2>("Foo").with_capabilities(crate::capabilities!(FooV2 => CounterInterface))
}

pub(crate) fn holder_def() -> ConstructorDef {
	ConstructorDef::new::<Holder>("Holder")
}
