//! Execution-context identifiers and singleton scopes.

use std::fmt;

/// Identifies one execution context, e.g. one processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ContextId(u32);

impl ContextId {
	/// The context used when the host never creates another one.
	pub const DEFAULT: Self = Self(0);

	pub const fn new(raw: u32) -> Self {
		Self(raw)
	}

	pub const fn raw(self) -> u32 {
		self.0
	}

	pub(crate) fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for ContextId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Where a singleton is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
	/// One instance for every context. Shadows per-context entries.
	Global,
	Context(ContextId),
}

impl Scope {
	/// Raw scope value hosts use to mean [`Scope::Global`].
	pub const GLOBAL_RAW: i64 = -1;

	/// Decodes a raw scope value: [`Scope::GLOBAL_RAW`] or a context id.
	///
	/// Returns `None` for any other negative value or one past `u32::MAX`.
	pub fn from_raw(raw: i64) -> Option<Self> {
		if raw == Self::GLOBAL_RAW {
			return Some(Self::Global);
		}
		u32::try_from(raw)
			.ok()
			.map(|raw| Self::Context(ContextId::new(raw)))
	}

	pub fn to_raw(self) -> i64 {
		match self {
			Self::Global => Self::GLOBAL_RAW,
			Self::Context(context) => i64::from(context.raw()),
		}
	}
}

impl From<ContextId> for Scope {
	fn from(context: ContextId) -> Self {
		Self::Context(context)
	}
}

impl fmt::Display for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Global => f.write_str("global"),
			Self::Context(context) => write!(f, "context {context}"),
		}
	}
}
