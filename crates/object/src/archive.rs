//! Field-archiving protocol used to migrate state between object versions.
//!
//! An [`Archive`] is a named, bidirectional field visitor. The same
//! [`Object::serialize`](crate::Object::serialize) body runs in both
//! directions: in [`Mode::Save`] every visited field is written, in
//! [`Mode::Load`] it is read back into the replacement instance.
//!
//! Plain values travel through serde (encoded with postcard). Object handles
//! travel as handles, so a migrated field keeps pointing at the same logical
//! object rather than a copy of it.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handle::{ObjectRef, WeakRef};

/// Direction an archive is being visited in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Save,
	Load,
}

/// One archived field.
pub enum Field {
	Bytes(Vec<u8>),
	Object(ObjectRef),
	Weak(WeakRef),
	Objects(Vec<ObjectRef>),
	ObjectMap(BTreeMap<String, ObjectRef>),
}

impl Field {
	pub fn kind(&self) -> &'static str {
		match self {
			Field::Bytes(_) => "value",
			Field::Object(_) => "object",
			Field::Weak(_) => "weak object",
			Field::Objects(_) => "object sequence",
			Field::ObjectMap(_) => "object map",
		}
	}
}

/// Serializer Protocol failures.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
	#[error("field `{name}` is missing from the archive")]
	Missing { name: String },

	#[error("field `{name}` failed to encode: {source}")]
	Encode {
		name: String,
		#[source]
		source: postcard::Error,
	},

	#[error("field `{name}` failed to decode: {source}")]
	Decode {
		name: String,
		#[source]
		source: postcard::Error,
	},

	#[error("field `{name}` holds a {found}, expected a {expected}")]
	KindMismatch {
		name: String,
		expected: &'static str,
		found: &'static str,
	},

	#[error("{0}")]
	Custom(String),
}

impl ArchiveError {
	/// Error raised by an object's own serialize logic.
	pub fn custom(message: impl Into<String>) -> Self {
		Self::Custom(message.into())
	}
}

/// Keyed field store visited by [`Object::serialize`](crate::Object::serialize).
///
/// Implementors only move [`Field`]s in and out; the typed helpers on
/// `dyn Archive` do the encoding.
pub trait Archive {
	fn mode(&self) -> Mode;

	/// Stores `field` under `name`, replacing any previous value.
	fn put(&mut self, name: &str, field: Field) -> Result<(), ArchiveError>;

	/// Removes and returns the field stored under `name`.
	fn take(&mut self, name: &str) -> Result<Option<Field>, ArchiveError>;

	/// When true, a field missing on load is an error rather than a default.
	fn strict(&self) -> bool {
		false
	}
}

impl dyn Archive + '_ {
	pub fn is_saving(&self) -> bool {
		self.mode() == Mode::Save
	}

	pub fn is_loading(&self) -> bool {
		self.mode() == Mode::Load
	}

	/// Visits a plain serde value.
	///
	/// On load, a missing field leaves `field` untouched unless the archive is
	/// strict, so a newer type version may add fields.
	pub fn value<T>(&mut self, name: &str, field: &mut T) -> Result<(), ArchiveError>
	where
		T: Serialize + DeserializeOwned,
	{
		let strict = self.strict();
		self.visit_value(name, field, strict)
	}

	/// Like [`value`](Self::value), but a missing field is always an error.
	pub fn required<T>(&mut self, name: &str, field: &mut T) -> Result<(), ArchiveError>
	where
		T: Serialize + DeserializeOwned,
	{
		self.visit_value(name, field, true)
	}

	/// Visits a strong object handle.
	pub fn object(&mut self, name: &str, field: &mut ObjectRef) -> Result<(), ArchiveError> {
		match self.mode() {
			Mode::Save => self.put(name, Field::Object(field.clone())),
			Mode::Load => {
				if let Some(loaded) = self.take_kind(name, "object")? {
					let Field::Object(handle) = loaded else {
						return Err(mismatch(name, "object", &loaded));
					};
					*field = handle;
				}
				Ok(())
			}
		}
	}

	/// Visits a weak object handle.
	pub fn weak(&mut self, name: &str, field: &mut WeakRef) -> Result<(), ArchiveError> {
		match self.mode() {
			Mode::Save => self.put(name, Field::Weak(field.clone())),
			Mode::Load => {
				if let Some(loaded) = self.take_kind(name, "weak object")? {
					let Field::Weak(handle) = loaded else {
						return Err(mismatch(name, "weak object", &loaded));
					};
					*field = handle;
				}
				Ok(())
			}
		}
	}

	/// Visits a sequence of strong handles.
	pub fn objects(&mut self, name: &str, field: &mut Vec<ObjectRef>) -> Result<(), ArchiveError> {
		match self.mode() {
			Mode::Save => self.put(name, Field::Objects(field.clone())),
			Mode::Load => {
				if let Some(loaded) = self.take_kind(name, "object sequence")? {
					let Field::Objects(handles) = loaded else {
						return Err(mismatch(name, "object sequence", &loaded));
					};
					*field = handles;
				}
				Ok(())
			}
		}
	}

	/// Visits a string-keyed map of strong handles.
	pub fn object_map(
		&mut self,
		name: &str,
		field: &mut BTreeMap<String, ObjectRef>,
	) -> Result<(), ArchiveError> {
		match self.mode() {
			Mode::Save => self.put(name, Field::ObjectMap(field.clone())),
			Mode::Load => {
				if let Some(loaded) = self.take_kind(name, "object map")? {
					let Field::ObjectMap(handles) = loaded else {
						return Err(mismatch(name, "object map", &loaded));
					};
					*field = handles;
				}
				Ok(())
			}
		}
	}

	fn visit_value<T>(&mut self, name: &str, field: &mut T, strict: bool) -> Result<(), ArchiveError>
	where
		T: Serialize + DeserializeOwned,
	{
		match self.mode() {
			Mode::Save => {
				let bytes = postcard::to_allocvec(&*field).map_err(|source| ArchiveError::Encode {
					name: name.to_string(),
					source,
				})?;
				self.put(name, Field::Bytes(bytes))
			}
			Mode::Load => {
				let Some(loaded) = self.take(name)? else {
					if strict {
						return Err(ArchiveError::Missing {
							name: name.to_string(),
						});
					}
					tracing::trace!(field = name, "field absent from archive, keeping default");
					return Ok(());
				};
				let Field::Bytes(bytes) = loaded else {
					return Err(mismatch(name, "value", &loaded));
				};
				*field = postcard::from_bytes(&bytes).map_err(|source| ArchiveError::Decode {
					name: name.to_string(),
					source,
				})?;
				Ok(())
			}
		}
	}

	fn take_kind(&mut self, name: &str, expected: &'static str) -> Result<Option<Field>, ArchiveError> {
		let loaded = self.take(name)?;
		if loaded.is_none() && self.strict() {
			return Err(ArchiveError::Missing {
				name: name.to_string(),
			});
		}
		if loaded.is_none() {
			tracing::trace!(field = name, expected, "field absent from archive, keeping default");
		}
		Ok(loaded)
	}
}

fn mismatch(name: &str, expected: &'static str, found: &Field) -> ArchiveError {
	ArchiveError::KindMismatch {
		name: name.to_string(),
		expected,
		found: found.kind(),
	}
}

/// In-process archive used by the rebuild pipeline.
///
/// Starts in save mode; [`MemoryArchive::into_loader`] flips it for the load pass.
pub struct MemoryArchive {
	mode: Mode,
	strict: bool,
	fields: FxHashMap<String, Field>,
}

impl Default for MemoryArchive {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryArchive {
	pub fn new() -> Self {
		Self {
			mode: Mode::Save,
			strict: false,
			fields: FxHashMap::default(),
		}
	}

	pub fn with_strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}

	/// Switches to load mode, keeping every saved field.
	pub fn into_loader(mut self) -> Self {
		self.mode = Mode::Load;
		self
	}

	pub fn contains(&self, name: &str) -> bool {
		self.fields.contains_key(name)
	}

	pub fn len(&self) -> usize {
		self.fields.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}
}

impl Archive for MemoryArchive {
	fn mode(&self) -> Mode {
		self.mode
	}

	fn put(&mut self, name: &str, field: Field) -> Result<(), ArchiveError> {
		self.fields.insert(name.to_string(), field);
		Ok(())
	}

	fn take(&mut self, name: &str) -> Result<Option<Field>, ArchiveError> {
		Ok(self.fields.remove(name))
	}

	fn strict(&self) -> bool {
		self.strict
	}
}

#[cfg(test)]
mod tests {
	use std::collections::BTreeMap;

	use pretty_assertions::assert_eq;

	use super::*;

	#[derive(Debug, Default, PartialEq)]
	struct Settings {
		gain: f32,
		label: String,
		taps: Vec<u16>,
		lookup: BTreeMap<String, i64>,
	}

	impl Settings {
		fn visit(&mut self, archive: &mut dyn Archive) -> Result<(), ArchiveError> {
			archive.value("gain", &mut self.gain)?;
			archive.value("label", &mut self.label)?;
			archive.value("taps", &mut self.taps)?;
			archive.value("lookup", &mut self.lookup)
		}
	}

	#[test]
	fn save_then_load_restores_values() {
		let mut original = Settings {
			gain: 1.5,
			label: "left".into(),
			taps: vec![1, 2, 3],
			lookup: BTreeMap::from([("a".to_string(), -4)]),
		};
		let mut archive = MemoryArchive::new();
		original.visit(&mut archive).unwrap();
		assert_eq!(archive.len(), 4);

		let mut archive = archive.into_loader();
		let mut restored = Settings::default();
		restored.visit(&mut archive).unwrap();

		assert_eq!(restored, original);
		assert!(archive.is_empty());
	}

	#[test]
	fn missing_field_keeps_default_unless_strict() {
		let mut archive = MemoryArchive::new().into_loader();
		let mut gain = 0.25f32;
		(&mut archive as &mut dyn Archive).value("gain", &mut gain).unwrap();
		assert_eq!(gain, 0.25);

		let mut strict = MemoryArchive::new().with_strict(true).into_loader();
		let err = (&mut strict as &mut dyn Archive)
			.value("gain", &mut gain)
			.unwrap_err();
		assert!(matches!(err, ArchiveError::Missing { name } if name == "gain"));
	}

	#[test]
	fn required_field_fails_when_absent() {
		let mut archive = MemoryArchive::new().into_loader();
		let mut count = 0u32;
		let err = (&mut archive as &mut dyn Archive)
			.required("count", &mut count)
			.unwrap_err();
		assert!(matches!(err, ArchiveError::Missing { .. }));
	}

	#[test]
	fn incompatible_encoding_is_a_decode_error() {
		let mut archive = MemoryArchive::new();
		(&mut archive as &mut dyn Archive)
			.value("label", &mut 7u32)
			.unwrap();

		let mut archive = archive.into_loader();
		let mut label = String::new();
		let err = (&mut archive as &mut dyn Archive)
			.value("label", &mut label)
			.unwrap_err();
		assert!(matches!(err, ArchiveError::Decode { .. }), "{err}");
	}

	#[test]
	fn handle_field_rejects_plain_value() {
		let mut archive = MemoryArchive::new();
		(&mut archive as &mut dyn Archive)
			.value("child", &mut 1u8)
			.unwrap();

		let mut archive = archive.into_loader();
		let mut child = ObjectRef::default();
		let err = (&mut archive as &mut dyn Archive)
			.object("child", &mut child)
			.unwrap_err();
		assert!(matches!(
			err,
			ArchiveError::KindMismatch {
				expected: "object",
				found: "value",
				..
			}
		));
	}
}
