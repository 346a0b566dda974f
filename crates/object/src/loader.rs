//! Seam between module loading and the factory.
//!
//! How a module is built or linked is up to the loader; the factory only
//! needs the [`ConstructorDef`]s it provides.

use crate::constructor::ConstructorDef;
use crate::error::FactoryError;
use crate::factory::{Factory, RebuildReport, Registered};

/// Error returned by a [`ModuleLoader`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct LoadError(String);

impl LoadError {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}
}

/// Supplies the constructors of one module.
pub trait ModuleLoader {
	fn name(&self) -> &str;

	/// Loads (or reloads) the module and returns every type it defines.
	fn load(&mut self) -> Result<Vec<ConstructorDef>, LoadError>;
}

/// A module whose constructors are linked into the host.
#[derive(Debug, Clone)]
pub struct StaticModule {
	name: String,
	defs: Vec<ConstructorDef>,
}

impl StaticModule {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			defs: Vec::new(),
		}
	}

	pub fn with(mut self, def: ConstructorDef) -> Self {
		self.defs.push(def);
		self
	}
}

impl ModuleLoader for StaticModule {
	fn name(&self) -> &str {
		&self.name
	}

	fn load(&mut self) -> Result<Vec<ConstructorDef>, LoadError> {
		Ok(self.defs.clone())
	}
}

/// Types a module load added or replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleReport {
	pub module: String,
	pub added: Vec<String>,
	pub reloaded: Vec<String>,
}

impl Factory {
	/// Registers every constructor `loader` provides.
	///
	/// Stops at the first registration error; definitions before it stay
	/// registered.
	pub fn load_module(&self, loader: &mut dyn ModuleLoader) -> Result<ModuleReport, FactoryError> {
		let defs = loader.load().map_err(|err| FactoryError::ModuleLoad {
			module: loader.name().to_string(),
			reason: err.to_string(),
		})?;

		let mut report = ModuleReport {
			module: loader.name().to_string(),
			..ModuleReport::default()
		};
		for def in defs {
			let registered = self.register(def)?;
			let type_name = registered.constructor().type_name().to_string();
			match registered {
				Registered::Added(_) => report.added.push(type_name),
				Registered::Reloaded { .. } => report.reloaded.push(type_name),
			}
		}
		tracing::debug!(
			module = %report.module,
			added = report.added.len(),
			reloaded = report.reloaded.len(),
			"module loaded"
		);
		Ok(report)
	}

	/// Loads `loader` and rebuilds every type it replaced.
	pub fn reload_module(
		&self,
		loader: &mut dyn ModuleLoader,
	) -> Result<(ModuleReport, RebuildReport), FactoryError> {
		let module = self.load_module(loader)?;
		let mut rebuild = RebuildReport::default();
		for type_name in &module.reloaded {
			rebuild.merge(self.rebuild_instances(type_name)?);
		}
		Ok((module, rebuild))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Object;

	#[derive(Default)]
	struct Blob;

	impl Object for Blob {}

	struct Broken;

	impl ModuleLoader for Broken {
		fn name(&self) -> &str {
			"broken"
		}

		fn load(&mut self) -> Result<Vec<ConstructorDef>, LoadError> {
			Err(LoadError::new("symbol table missing"))
		}
	}

	#[test]
	fn load_reports_added_then_reloaded() {
		let factory = Factory::default();
		let mut module = StaticModule::new("core").with(ConstructorDef::new::<Blob>("Blob"));

		let first = factory.load_module(&mut module).unwrap();
		assert_eq!(first.added, vec!["Blob".to_string()]);
		assert!(first.reloaded.is_empty());

		let second = factory.load_module(&mut module).unwrap();
		assert!(second.added.is_empty());
		assert_eq!(second.reloaded, vec!["Blob".to_string()]);
	}

	#[test]
	fn loader_failure_names_module() {
		let factory = Factory::default();
		let err = factory.load_module(&mut Broken).unwrap_err();
		assert_eq!(err.to_string(), "module `broken` failed to load: symbol table missing");
		assert!(factory.is_empty());
	}

	#[test]
	fn reload_module_rebuilds_reloaded_types() {
		let factory = Factory::default();
		let mut module = StaticModule::new("core").with(ConstructorDef::new::<Blob>("Blob"));
		factory.load_module(&mut module).unwrap();
		let handle = factory.construct("Blob").unwrap();
		let before = handle.id();

		let (report, rebuild) = factory.reload_module(&mut module).unwrap();
		assert_eq!(report.reloaded, vec!["Blob".to_string()]);
		assert_eq!(rebuild.swapped_count(), 1);
		assert_ne!(handle.id(), before);
	}
}
