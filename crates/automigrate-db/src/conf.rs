//! Migration settings
//!
//! Settings are layered in priority order: CLI flags > environment variables >
//! `automigrate.toml` > defaults. This module handles the last three; the
//! command crate applies flags on top.
//!
//! ```toml
//! database_url = "postgres://localhost/app"
//! migrations_dir = "migrations"
//! history_table = "schema_migrations"
//!
//! [lock]
//! name = "automigrate"
//! timeout_secs = 10
//!
//! [analyzer]
//! primary_key_field = "id"
//! default_varchar_length = 255
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backends::SqlDialect;

/// Default settings file looked up in the working directory
pub const DEFAULT_SETTINGS_FILE: &str = "automigrate.toml";

/// Environment variables read by [`MigrationSettings::apply_env`]
pub const ENV_DATABASE_URL: &str = "AUTOMIGRATE_DATABASE_URL";
pub const ENV_DIALECT: &str = "AUTOMIGRATE_DIALECT";
pub const ENV_MIGRATIONS_DIR: &str = "AUTOMIGRATE_MIGRATIONS_DIR";
pub const ENV_HISTORY_TABLE: &str = "AUTOMIGRATE_HISTORY_TABLE";

/// Error type for settings loading
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Cannot read settings file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("Invalid setting: {0}")]
	Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
	/// Advisory lock name (PostgreSQL key source, MySQL lock name, SQLite holder scope)
	pub name: String,
	/// How long to wait for the lock before giving up
	pub timeout_secs: u64,
	/// SQLite lock rows older than this are taken over
	pub stale_after_secs: u64,
}

impl Default for LockSettings {
	fn default() -> Self {
		Self {
			name: "automigrate".to_string(),
			timeout_secs: 10,
			stale_after_secs: 600,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
	/// Field name treated as primary key when a field does not say otherwise
	pub primary_key_field: String,
	pub default_varchar_length: u32,
	pub default_decimal_precision: u32,
	pub default_decimal_scale: u32,
}

impl Default for AnalyzerSettings {
	fn default() -> Self {
		Self {
			primary_key_field: "id".to_string(),
			default_varchar_length: 255,
			default_decimal_precision: 10,
			default_decimal_scale: 2,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
	pub database_url: Option<String>,
	/// Explicit dialect; inferred from `database_url` when absent
	pub dialect: Option<SqlDialect>,
	pub migrations_dir: PathBuf,
	pub history_table: String,
	pub lock: LockSettings,
	pub analyzer: AnalyzerSettings,
}

impl Default for MigrationSettings {
	fn default() -> Self {
		Self {
			database_url: None,
			dialect: None,
			migrations_dir: PathBuf::from("migrations"),
			history_table: "schema_migrations".to_string(),
			lock: LockSettings::default(),
			analyzer: AnalyzerSettings::default(),
		}
	}
}

impl MigrationSettings {
	/// Parse settings from TOML text
	pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
		Ok(toml::from_str(content)?)
	}

	pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
		let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&content)
	}

	/// Load file settings then environment overrides.
	///
	/// An explicit `path` must exist. Without one, [`DEFAULT_SETTINGS_FILE`]
	/// is used when present and defaults otherwise.
	pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
		let settings = match path {
			Some(path) => Self::from_file(path)?,
			None => {
				let default_path = Path::new(DEFAULT_SETTINGS_FILE);
				if default_path.exists() {
					Self::from_file(default_path)?
				} else {
					Self::default()
				}
			}
		};
		let settings = settings.apply_env(|key| std::env::var(key).ok())?;
		settings.validate()?;
		Ok(settings)
	}

	/// Apply `AUTOMIGRATE_*` overrides read through `lookup`
	pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, SettingsError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(url) = lookup(ENV_DATABASE_URL) {
			self.database_url = Some(url);
		}
		if let Some(dialect) = lookup(ENV_DIALECT) {
			let parsed = dialect
				.parse::<SqlDialect>()
				.map_err(|e| SettingsError::Invalid(format!("{}: {}", ENV_DIALECT, e)))?;
			self.dialect = Some(parsed);
		}
		if let Some(dir) = lookup(ENV_MIGRATIONS_DIR) {
			self.migrations_dir = PathBuf::from(dir);
		}
		if let Some(table) = lookup(ENV_HISTORY_TABLE) {
			self.history_table = table;
		}
		Ok(self)
	}

	/// Dialect from the explicit setting or the database URL scheme
	pub fn resolved_dialect(&self) -> Result<SqlDialect, SettingsError> {
		let from_url = self.database_url.as_deref().and_then(SqlDialect::from_url);
		match (self.dialect, from_url) {
			(Some(explicit), Some(inferred)) if explicit != inferred => {
				Err(SettingsError::Invalid(format!(
					"dialect '{}' does not match database URL scheme '{}'",
					explicit, inferred
				)))
			}
			(Some(explicit), _) => Ok(explicit),
			(None, Some(inferred)) => Ok(inferred),
			(None, None) => Err(SettingsError::Invalid(
				"no dialect configured and none can be inferred from database_url".to_string(),
			)),
		}
	}

	pub fn validate(&self) -> Result<(), SettingsError> {
		if !is_plain_identifier(&self.history_table) {
			return Err(SettingsError::Invalid(format!(
				"history_table '{}' must contain only letters, digits and underscores",
				self.history_table
			)));
		}
		if self.lock.name.trim().is_empty() {
			return Err(SettingsError::Invalid("lock.name must not be empty".to_string()));
		}
		if self.analyzer.primary_key_field.trim().is_empty() {
			return Err(SettingsError::Invalid(
				"analyzer.primary_key_field must not be empty".to_string(),
			));
		}
		if self.analyzer.default_varchar_length == 0 {
			return Err(SettingsError::Invalid(
				"analyzer.default_varchar_length must be positive".to_string(),
			));
		}
		Ok(())
	}
}

fn is_plain_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
		&& chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
