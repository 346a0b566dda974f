#![cfg_attr(doc, allow(rustdoc::private_intra_doc_links))]
//! Process-wide constructor registry and the hot-swap entrypoint.
//!
//! # Purpose
//!
//! The [`Factory`] maps type names to [`Constructor`]s. Module loaders call
//! [`Factory::register`] whenever a type becomes available, either for the
//! first time or as a new version after a reload. [`Factory::rebuild_instances`]
//! then moves every live instance of the type onto the current version.
//!
//! # Rebuild pipeline
//!
//! Per instance, in order:
//! 1. Take the old instance's write lock (readers drain, bounded by
//!    [`FactoryConfig::reader_wait_ms`]).
//! 2. Allocate the replacement from the current definition.
//! 3. Save the old state into a [`MemoryArchive`](crate::MemoryArchive) and
//!    load it into the replacement, then `init(false)` it.
//! 4. Hand the notifier set over and retarget every endpoint.
//! 5. Set the old instance's runtime-delete flag, release the lock and drop
//!    the pipeline's reference, destroying it once no reader holds it.
//!
//! A failure in steps 1-3 discards the replacement; the old instance stays
//! live and canonical and the failure is listed in the [`RebuildReport`].
//!
//! # Concurrency
//!
//! - Registration and rebuild batches are serialized by one mutation lock.
//! - Lookups take a short read lock on the constructor table.
//! - Listeners run after the mutation lock is released.

mod rebuild;

use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

pub use rebuild::{RebuildFailure, RebuildReport, Swap};

use crate::config::FactoryConfig;
use crate::constructor::{Constructor, ConstructorDef};
use crate::error::FactoryError;
use crate::handle::ObjectRef;
use crate::id::{ConstructorId, InterfaceId};

/// Observer of factory activity.
///
/// Callbacks must not register constructors or start rebuilds on the same
/// factory.
pub trait FactoryListener: Send + Sync {
	fn on_constructor_registered(&self, constructor: &Arc<Constructor>, reloaded: bool) {
		let _ = (constructor, reloaded);
	}

	fn on_rebuilt(&self, report: &RebuildReport) {
		let _ = report;
	}
}

/// Outcome of [`Factory::register`].
#[derive(Debug, Clone)]
pub enum Registered {
	/// First registration of the type.
	Added(Arc<Constructor>),
	/// A new version of an already known type.
	Reloaded {
		constructor: Arc<Constructor>,
		generation: u32,
	},
}

impl Registered {
	pub fn constructor(&self) -> &Arc<Constructor> {
		match self {
			Registered::Added(constructor) | Registered::Reloaded { constructor, .. } => constructor,
		}
	}

	pub fn is_reload(&self) -> bool {
		matches!(self, Registered::Reloaded { .. })
	}
}

#[derive(Default)]
struct Table {
	by_name: FxHashMap<Arc<str>, Arc<Constructor>>,
	by_id: FxHashMap<ConstructorId, Arc<Constructor>>,
}

/// Registry of constructors keyed by type name.
pub struct Factory {
	config: FactoryConfig,
	table: RwLock<Table>,
	mutation: Mutex<()>,
	listeners: RwLock<Vec<Arc<dyn FactoryListener>>>,
}

impl Default for Factory {
	fn default() -> Self {
		Self::new(FactoryConfig::default())
	}
}

static GLOBAL: LazyLock<Factory> = LazyLock::new(Factory::default);

impl Factory {
	pub fn new(config: FactoryConfig) -> Self {
		Self {
			config,
			table: RwLock::new(Table::default()),
			mutation: Mutex::new(()),
			listeners: RwLock::new(Vec::new()),
		}
	}

	/// The process-wide factory.
	pub fn global() -> &'static Factory {
		&GLOBAL
	}

	pub fn config(&self) -> &FactoryConfig {
		&self.config
	}

	pub fn add_listener(&self, listener: Arc<dyn FactoryListener>) {
		self.listeners.write().push(listener);
	}

	/// Registers `def`, or installs it as the new version of a known type.
	///
	/// Live instances are not touched; call [`Factory::rebuild_instances`] to
	/// move them onto the new version.
	pub fn register(&self, def: ConstructorDef) -> Result<Registered, FactoryError> {
		let registered = {
			let _mutation = self.mutation.lock();
			let mut table = self.table.write();

			if let Some(existing) = table.by_name.get(def.type_name()).cloned() {
				if existing.constructor_id() != def.id() {
					return Err(FactoryError::ConstructorIdChanged {
						type_name: def.type_name().to_string(),
						existing: existing.constructor_id(),
						incoming: def.id(),
					});
				}
				let generation = existing.reload(def);
				Registered::Reloaded {
					constructor: existing,
					generation,
				}
			} else {
				if let Some(owner) = table.by_id.get(&def.id()) {
					return Err(FactoryError::DuplicateConstructorId {
						id: def.id(),
						existing: owner.type_name().to_string(),
						incoming: def.type_name().to_string(),
					});
				}
				let constructor = Constructor::new(def);
				table
					.by_name
					.insert(Arc::from(constructor.type_name()), constructor.clone());
				table.by_id.insert(constructor.constructor_id(), constructor.clone());
				Registered::Added(constructor)
			}
		};

		let constructor = registered.constructor();
		tracing::info!(
			type_name = constructor.type_name(),
			constructor_id = %constructor.constructor_id(),
			generation = constructor.generation(),
			reloaded = registered.is_reload(),
			"constructor registered"
		);
		for listener in self.listeners.read().iter() {
			listener.on_constructor_registered(constructor, registered.is_reload());
		}
		Ok(registered)
	}

	pub fn constructor(&self, type_name: &str) -> Option<Arc<Constructor>> {
		self.table.read().by_name.get(type_name).cloned()
	}

	pub fn constructor_by_id(&self, id: ConstructorId) -> Option<Arc<Constructor>> {
		self.table.read().by_id.get(&id).cloned()
	}

	/// Every registered constructor, sorted by type name.
	pub fn constructors(&self) -> Vec<Arc<Constructor>> {
		let mut all: Vec<_> = self.table.read().by_name.values().cloned().collect();
		all.sort_by(|a, b| a.type_name().cmp(b.type_name()));
		all
	}

	/// Constructors whose current version implements `iid`, sorted by type name.
	pub fn constructors_implementing(&self, iid: InterfaceId) -> Vec<Arc<Constructor>> {
		self.constructors()
			.into_iter()
			.filter(|constructor| constructor.capabilities().contains(iid))
			.collect()
	}

	pub fn len(&self) -> usize {
		self.table.read().by_name.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Constructs a new instance of `type_name`.
	pub fn construct(&self, type_name: &str) -> Result<ObjectRef, FactoryError> {
		let constructor = self
			.constructor(type_name)
			.ok_or_else(|| FactoryError::UnknownType(type_name.to_string()))?;
		constructor.construct()
	}

	/// Replaces every live instance of `type_name` with one built by the
	/// type's current definition, carrying state and handles across.
	///
	/// Per-instance failures are collected in the report; the batch carries on.
	pub fn rebuild_instances(&self, type_name: &str) -> Result<RebuildReport, FactoryError> {
		let constructor = self
			.constructor(type_name)
			.ok_or_else(|| FactoryError::UnknownType(type_name.to_string()))?;
		let report = {
			let _mutation = self.mutation.lock();
			rebuild::rebuild_constructor(&constructor, &self.config)
		};
		self.notify_rebuilt(&report);
		Ok(report)
	}

	/// Rebuilds every live instance of every registered type.
	pub fn rebuild_all(&self) -> RebuildReport {
		let report = {
			let _mutation = self.mutation.lock();
			let mut report = RebuildReport::default();
			for constructor in self.constructors() {
				report.merge(rebuild::rebuild_constructor(&constructor, &self.config));
			}
			report
		};
		self.notify_rebuilt(&report);
		report
	}

	fn notify_rebuilt(&self, report: &RebuildReport) {
		for listener in self.listeners.read().iter() {
			listener.on_rebuilt(report);
		}
	}
}
