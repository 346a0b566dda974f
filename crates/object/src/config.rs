//! Factory configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the factory and its rebuild pipeline.
///
/// ```toml
/// reader_wait_ms = 250
/// strict_fields = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FactoryConfig {
	/// How long a rebuild waits for readers to release an instance. `0` waits
	/// indefinitely.
	pub reader_wait_ms: u64,
	/// Treat a field missing from the migrated state as an error instead of
	/// keeping the replacement's constructed value.
	pub strict_fields: bool,
}

/// Errors loading a [`FactoryConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to read {path}: {source}")]
	Io {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid factory config: {0}")]
	Parse(#[from] toml::de::Error),
}

impl FactoryConfig {
	pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.display().to_string(),
			source,
		})?;
		Self::from_toml(&source)
	}

	/// Reader wait bound, `None` when unbounded.
	pub fn reader_wait(&self) -> Option<Duration> {
		(self.reader_wait_ms > 0).then(|| Duration::from_millis(self.reader_wait_ms))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_config_uses_defaults() {
		let config = FactoryConfig::from_toml("").unwrap();
		assert_eq!(config, FactoryConfig::default());
		assert_eq!(config.reader_wait(), None);
	}

	#[test]
	fn parses_fields() {
		let config = FactoryConfig::from_toml("reader_wait_ms = 40\nstrict_fields = true\n").unwrap();
		assert_eq!(config.reader_wait(), Some(Duration::from_millis(40)));
		assert!(config.strict_fields);
	}

	#[test]
	fn rejects_unknown_keys() {
		let err = FactoryConfig::from_toml("reader_wait = 3").unwrap_err();
		assert!(matches!(err, ConfigError::Parse(_)));
	}

	#[test]
	fn missing_file_reports_path() {
		let err = FactoryConfig::load("/nonexistent/eagle/factory.toml").unwrap_err();
		assert!(err.to_string().contains("/nonexistent/eagle/factory.toml"));
	}
}
