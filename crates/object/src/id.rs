//! Object, constructor and interface identities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over `bytes`, usable in const context.
pub(crate) const fn fnv1a(bytes: &[u8]) -> u64 {
	let mut hash = FNV_OFFSET;
	let mut i = 0;
	while i < bytes.len() {
		hash ^= bytes[i] as u64;
		hash = hash.wrapping_mul(FNV_PRIME);
		i += 1;
	}
	hash
}

/// Identifies one concrete object type for the lifetime of the process.
///
/// Derived from the type name by default so that a reloaded module producing a
/// new version of a type lands on the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConstructorId(u64);

impl ConstructorId {
	/// Stable id for `type_name`.
	pub const fn from_type_name(type_name: &str) -> Self {
		Self(fnv1a(type_name.as_bytes()))
	}

	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ConstructorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:016x}", self.0)
	}
}

/// Per-instance id, unique among the instances one constructor has produced.
///
/// Assigned monotonically and never reused, so two simultaneously-live
/// instances of a type can never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PerTypeObjectId(u32);

impl PerTypeObjectId {
	pub const fn from_raw(raw: u32) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u32 {
		self.0
	}
}

impl fmt::Display for PerTypeObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Full identity of a live object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
	pub constructor: ConstructorId,
	pub per_type: PerTypeObjectId,
}

impl fmt::Display for ObjectId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.constructor, self.per_type)
	}
}

/// Identifies one capability contract an object may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(u64);

impl InterfaceId {
	/// The base capability every object implements.
	pub const OBJECT: Self = Self::from_name("IObject");

	/// Stable id for an interface name.
	pub const fn from_name(name: &str) -> Self {
		Self(fnv1a(name.as_bytes()))
	}

	pub const fn raw(self) -> u64 {
		self.0
	}
}

impl fmt::Display for InterfaceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "iid:{:016x}", self.0)
	}
}

/// Process-unique id of one notifier endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotifierId(u64);

impl NotifierId {
	/// Allocates a fresh id.
	pub fn next() -> Self {
		static NEXT: AtomicU64 = AtomicU64::new(1);
		Self(NEXT.fetch_add(1, Ordering::Relaxed))
	}

	pub const fn raw(self) -> u64 {
		self.0
	}
}
