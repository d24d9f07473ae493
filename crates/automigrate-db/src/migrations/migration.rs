//! Migration values and their on-disk artifact form

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::generator::compute_id;
use super::operations::MigrationOperation;
use super::schema::TableDefinition;
use super::{MigrationError, Result};
use crate::backends::SqlDialect;

/// Length of the id prefix used in names and messages
pub const SHORT_ID_LEN: usize = 8;

/// Zero-padded version string for a sequence number
///
/// ```
/// use automigrate_db::migrations::format_version;
///
/// assert_eq!(format_version(2), "0002");
/// assert_eq!(format_version(12345), "12345");
/// ```
pub fn format_version(sequence: u64) -> String {
	format!("{:04}", sequence)
}

pub fn parse_version(version: &str) -> Option<u64> {
	version.trim().parse().ok()
}

/// A generated migration for a single table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Migration {
	/// SHA-256 hex of the serialized operations
	pub id: String,
	pub sequence: u64,
	/// `<timestamp>_<short-id>_<table>`
	pub name: String,
	pub table_name: String,
	pub description: String,
	pub dialect: SqlDialect,
	pub created_at: DateTime<Utc>,
	pub operations: Vec<MigrationOperation>,
	/// Table shape after this migration; `None` once the table is dropped
	pub snapshot: Option<TableDefinition>,
	pub up_sql: Vec<String>,
	pub down_sql: Vec<String>,
}

impl Migration {
	pub fn version(&self) -> String {
		format_version(self.sequence)
	}

	pub fn short_id(&self) -> &str {
		let end = self.id.len().min(SHORT_ID_LEN);
		&self.id[..end]
	}

	pub fn is_destructive(&self) -> bool {
		self.operations.iter().any(MigrationOperation::is_destructive)
	}
}

/// Header written first in every artifact file so it can be inspected
/// without reading the operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
	pub id: String,
	pub sequence: u64,
	pub version: String,
	pub name: String,
	pub table: String,
	pub created_at: DateTime<Utc>,
	pub description: String,
	pub dialect: SqlDialect,
	/// One summary line per operation
	pub operations: Vec<String>,
}

/// On-disk form of a [`Migration`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationArtifact {
	pub metadata: ArtifactMetadata,
	pub operations: Vec<MigrationOperation>,
	pub snapshot: Option<TableDefinition>,
	pub up_sql: Vec<String>,
	pub down_sql: Vec<String>,
}

impl From<&Migration> for MigrationArtifact {
	fn from(migration: &Migration) -> Self {
		Self {
			metadata: ArtifactMetadata {
				id: migration.id.clone(),
				sequence: migration.sequence,
				version: migration.version(),
				name: migration.name.clone(),
				table: migration.table_name.clone(),
				created_at: migration.created_at,
				description: migration.description.clone(),
				dialect: migration.dialect,
				operations: migration
					.operations
					.iter()
					.map(MigrationOperation::summary)
					.collect(),
			},
			operations: migration.operations.clone(),
			snapshot: migration.snapshot.clone(),
			up_sql: migration.up_sql.clone(),
			down_sql: migration.down_sql.clone(),
		}
	}
}

impl MigrationArtifact {
	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn from_json(content: &str) -> Result<Self> {
		Ok(serde_json::from_str(content)?)
	}

	/// Convert back into a migration, checking the recorded id still matches
	/// the operations
	pub fn into_migration(self) -> Result<Migration> {
		let id = compute_id(&self.operations)?;
		if id != self.metadata.id {
			return Err(MigrationError::ConfigurationError(format!(
				"artifact {} records id {} but its operations hash to {}",
				self.metadata.name, self.metadata.id, id
			)));
		}
		Ok(Migration {
			id,
			sequence: self.metadata.sequence,
			name: self.metadata.name,
			table_name: self.metadata.table,
			description: self.metadata.description,
			dialect: self.metadata.dialect,
			created_at: self.metadata.created_at,
			operations: self.operations,
			snapshot: self.snapshot,
			up_sql: self.up_sql,
			down_sql: self.down_sql,
		})
	}
}

/// Read only the metadata header of an artifact
pub fn read_metadata(content: &str) -> Result<ArtifactMetadata> {
	#[derive(Deserialize)]
	struct Header {
		metadata: ArtifactMetadata,
	}
	let header: Header = serde_json::from_str(content)?;
	Ok(header.metadata)
}
