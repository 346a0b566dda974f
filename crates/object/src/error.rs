//! Factory and migration errors.

use std::time::Duration;

use crate::archive::ArchiveError;
use crate::id::ConstructorId;

/// Failures surfaced to module loaders and rebuild callers.
#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
	#[error("no constructor registered for type `{0}`")]
	UnknownType(String),

	/// Two different types claim the same constructor id.
	#[error("constructor id {id} of `{incoming}` is already taken by `{existing}`")]
	DuplicateConstructorId {
		id: ConstructorId,
		existing: String,
		incoming: String,
	},

	/// A reload tried to move a type to a different constructor id.
	#[error("reload of `{type_name}` changes constructor id from {existing} to {incoming}")]
	ConstructorIdChanged {
		type_name: String,
		existing: ConstructorId,
		incoming: ConstructorId,
	},

	/// Every per-type id of the type has been issued.
	#[error("per-type object ids of `{type_name}` are exhausted")]
	IdsExhausted { type_name: String },

	#[error("module `{module}` failed to load: {reason}")]
	ModuleLoad { module: String, reason: String },
}

/// Why a single instance could not be rebuilt.
///
/// The instance keeps its identity and state when this is reported.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
	#[error("saving state failed: {0}")]
	Save(#[source] ArchiveError),

	#[error("loading state into the replacement failed: {0}")]
	Load(#[source] ArchiveError),

	#[error("readers held the object for longer than {waited:?}")]
	ReadersBusy { waited: Duration },

	#[error("no per-type object id left for the replacement")]
	IdsExhausted,
}
