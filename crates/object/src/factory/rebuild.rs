//! Per-instance state migration and handle retargeting.

use std::sync::Arc;

use crate::archive::MemoryArchive;
use crate::config::FactoryConfig;
use crate::constructor::Constructor;
use crate::error::MigrationError;
use crate::id::ObjectId;
use crate::object::Instance;

/// One successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
	pub type_name: String,
	pub old: ObjectId,
	pub new: ObjectId,
}

/// One instance that could not be rebuilt and is still live under `object`.
#[derive(Debug)]
pub struct RebuildFailure {
	pub type_name: String,
	pub object: ObjectId,
	pub error: MigrationError,
}

/// Outcome of a rebuild batch.
#[derive(Debug, Default)]
pub struct RebuildReport {
	pub swapped: Vec<Swap>,
	pub failures: Vec<RebuildFailure>,
}

impl RebuildReport {
	pub fn is_clean(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn swapped_count(&self) -> usize {
		self.swapped.len()
	}

	pub fn failure_count(&self) -> usize {
		self.failures.len()
	}

	/// Ids of instances left on their old version.
	pub fn failed_ids(&self) -> Vec<ObjectId> {
		self.failures.iter().map(|failure| failure.object).collect()
	}

	/// Id of the replacement for `old`, if it was swapped.
	pub fn replacement_of(&self, old: ObjectId) -> Option<ObjectId> {
		self.swapped
			.iter()
			.find(|swap| swap.old == old)
			.map(|swap| swap.new)
	}

	pub fn merge(&mut self, other: RebuildReport) {
		self.swapped.extend(other.swapped);
		self.failures.extend(other.failures);
	}
}

pub(super) fn rebuild_constructor(constructor: &Arc<Constructor>, config: &FactoryConfig) -> RebuildReport {
	let mut report = RebuildReport::default();

	// Instances allocated during the batch are not in this snapshot.
	for old in constructor.live_instances() {
		let old_id = old.id();
		match migrate(constructor, old, config) {
			Ok(replacement) => report.swapped.push(Swap {
				type_name: constructor.type_name().to_string(),
				old: old_id,
				new: replacement,
			}),
			Err(error) => {
				tracing::warn!(
					type_name = constructor.type_name(),
					object = %old_id,
					%error,
					"rebuild failed, keeping existing instance"
				);
				report.failures.push(RebuildFailure {
					type_name: constructor.type_name().to_string(),
					object: old_id,
					error,
				});
			}
		}
	}

	tracing::info!(
		type_name = constructor.type_name(),
		generation = constructor.generation(),
		swapped = report.swapped_count(),
		failed = report.failure_count(),
		"rebuild finished"
	);
	report
}

/// Moves `old` onto the constructor's current definition.
///
/// Returns the replacement's id. On error nothing observable has changed.
fn migrate(
	constructor: &Arc<Constructor>,
	old: Arc<Instance>,
	config: &FactoryConfig,
) -> Result<ObjectId, MigrationError> {
	let mut old_object = match config.reader_wait() {
		Some(waited) => old
			.object
			.try_write_for(waited)
			.ok_or(MigrationError::ReadersBusy { waited })?,
		None => old.object.write(),
	};

	let replacement = constructor.allocate().ok_or(MigrationError::IdsExhausted)?;
	let mut archive = MemoryArchive::new().with_strict(config.strict_fields);
	old_object.serialize(&mut archive).map_err(MigrationError::Save)?;
	let mut archive = archive.into_loader();
	{
		let mut new_object = replacement.object.write();
		new_object
			.serialize(&mut archive)
			.map_err(MigrationError::Load)?;
		new_object.init(false);
	}

	let mut endpoints = old.hand_over(&replacement);
	let live = endpoints.live();
	replacement.adopt_notifiers(endpoints);
	for endpoint in &live {
		endpoint.on_object_replaced(&replacement);
	}

	old.mark_runtime_delete();
	drop(old_object);
	drop(live);

	tracing::debug!(
		type_name = constructor.type_name(),
		old = %old.id(),
		new = %replacement.id(),
		referrers = replacement.notifier_count(),
		"object swapped"
	);
	Ok(replacement.id())
}
