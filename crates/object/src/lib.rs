#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Hot-swappable runtime objects.
//!
//! A running process can replace the implementation of a live object, for
//! example after a plugin module was rebuilt, while every handle to it keeps
//! working and its state carries over.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Object`] | State and lifecycle hooks of one swappable object. |
//! | [`Instance`] | Live container: identity, capability table, notifier set. |
//! | [`ObjectRef`] | Shared handle that follows its object across swaps. |
//! | [`WeakRef`] | Non-owning handle that follows its object across swaps. |
//! | [`CapabilityTable`] | Per-type map from [`InterfaceId`] to interface casters. |
//! | [`Constructor`] | Per-type factory tracking every live instance. |
//! | [`Factory`] | Registry of constructors; entrypoint for rebuilds. |
//! | [`Archive`] | Named field visitor used to migrate state. |
//!
//! # Example
//!
//! ```ignore
//! let factory = Factory::default();
//! factory.register(ConstructorDef::new::<FilterV1>("Filter"))?;
//! let filter = factory.construct("Filter")?;
//!
//! // Module reloaded with a new implementation of the same type.
//! factory.register(ConstructorDef::new::<FilterV2>("Filter"))?;
//! let report = factory.rebuild_instances("Filter")?;
//! assert!(report.is_clean());
//! assert!(filter.read().is::<FilterV2>());
//! ```

pub mod archive;
pub mod config;
pub mod constructor;
pub mod error;
pub mod factory;
pub mod handle;
pub mod id;
pub mod interface;
pub mod loader;
pub mod notifier;
pub mod object;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use archive::{Archive, ArchiveError, Field, MemoryArchive, Mode};
pub use config::{ConfigError, FactoryConfig};
pub use constructor::{Constructor, ConstructorDef};
pub use error::{FactoryError, MigrationError};
pub use factory::{Factory, FactoryListener, RebuildFailure, RebuildReport, Registered, Swap};
pub use handle::{
	InterfaceGuard, InterfaceWriteGuard, ObjectReadGuard, ObjectRef, ObjectWriteGuard, WeakRef,
};
pub use id::{ConstructorId, InterfaceId, NotifierId, ObjectId, PerTypeObjectId};
pub use interface::{CapabilityTable, Caster, Interface, ObjectInterface};
pub use loader::{LoadError, ModuleLoader, ModuleReport, StaticModule};
pub use notifier::{Notifier, NotifierSet};
pub use object::{Instance, Object, Registration};

