//! Filesystem-based migration repository
//!
//! Persists migrations as pretty-printed JSON artifacts, one file per
//! migration, directly under the migrations directory.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{MigrationRepository, Result};
use crate::migrations::migration::{Migration, MigrationArtifact};
use crate::migrations::MigrationError;

const ARTIFACT_EXTENSION: &str = "json";

/// Repository that persists migrations as `.json` files
///
/// Files are named `<timestamp>_<short-id>_<table>.json` and start with a
/// `metadata` object:
///
/// ```json
/// {
///   "metadata": {
///     "id": "3f1c…",
///     "sequence": 1,
///     "version": "0001",
///     "name": "20261014093005_3f1c2a9b_users",
///     "table": "users",
///     "created_at": "2026-10-14T09:30:05Z",
///     "description": "initial",
///     "dialect": "postgres",
///     "operations": ["create table users"]
///   },
///   "operations": [ … ],
///   "snapshot": { … },
///   "up_sql": ["CREATE TABLE users (id INTEGER PRIMARY KEY);"],
///   "down_sql": ["DROP TABLE users;"]
/// }
/// ```
pub struct FilesystemRepository {
	/// Root directory for migration files
	root_dir: PathBuf,
}

impl FilesystemRepository {
	/// Create a new FilesystemRepository
	///
	/// ```rust,no_run
	/// use automigrate_db::migrations::FilesystemRepository;
	/// let repo = FilesystemRepository::new("./migrations");
	/// ```
	pub fn new<P: AsRef<Path>>(root_dir: P) -> Self {
		Self {
			root_dir: root_dir.as_ref().to_path_buf(),
		}
	}

	pub fn root_dir(&self) -> &Path {
		&self.root_dir
	}

	/// Validate that a path component does not contain traversal sequences.
	///
	/// Rejects components containing `..`, path separators, or null bytes.
	fn validate_path_component(component: &str, label: &str) -> Result<()> {
		if component.is_empty() {
			return Err(MigrationError::PathTraversal(format!(
				"{} cannot be empty",
				label
			)));
		}

		if component.contains("..") {
			return Err(MigrationError::PathTraversal(format!(
				"{} contains path traversal sequence '..': {}",
				label, component
			)));
		}

		if component.contains('/') || component.contains('\\') {
			return Err(MigrationError::PathTraversal(format!(
				"{} contains path separator: {}",
				label, component
			)));
		}

		if component.contains('\0') {
			return Err(MigrationError::PathTraversal(format!(
				"{} contains null byte: {}",
				label, component
			)));
		}

		Ok(())
	}

	/// Returns `<root_dir>/<name>.json`
	fn migration_path(&self, migration: &Migration) -> Result<PathBuf> {
		Self::validate_path_component(&migration.table_name, "Table name")?;
		Self::validate_path_component(&migration.name, "Migration name")?;
		Ok(self
			.root_dir
			.join(format!("{}.{}", migration.name, ARTIFACT_EXTENSION)))
	}

	async fn read_artifact(path: &Path) -> Result<Migration> {
		let content = tokio::fs::read_to_string(path).await?;
		let artifact = MigrationArtifact::from_json(&content).map_err(|e| {
			MigrationError::ConfigurationError(format!(
				"cannot parse migration artifact {}: {}",
				path.display(),
				e
			))
		})?;
		artifact.into_migration()
	}
}

#[async_trait]
impl MigrationRepository for FilesystemRepository {
	async fn save(&self, migration: &Migration) -> Result<()> {
		let path = self.migration_path(migration)?;

		if tokio::fs::try_exists(&path).await.unwrap_or(false) {
			return Err(MigrationError::GenerationError(format!(
				"Migration file already exists: {}",
				path.display()
			)));
		}

		let existing = self.list().await?;
		if let Some(clash) = existing.iter().find(|m| m.sequence == migration.sequence) {
			return Err(MigrationError::GenerationError(format!(
				"sequence {} is already used by {}",
				migration.version(),
				clash.name
			)));
		}

		tokio::fs::create_dir_all(&self.root_dir).await?;

		let content = MigrationArtifact::from(migration).to_json()?;
		// Write to a hidden temp file first so a crash never leaves a partial artifact
		let temp_path = self
			.root_dir
			.join(format!(".{}.{}.tmp", migration.name, ARTIFACT_EXTENSION));
		tokio::fs::write(&temp_path, content).await?;
		tokio::fs::rename(&temp_path, &path).await?;

		tracing::debug!(path = %path.display(), "Wrote migration artifact");
		Ok(())
	}

	async fn list(&self) -> Result<Vec<Migration>> {
		if !tokio::fs::try_exists(&self.root_dir).await.unwrap_or(false) {
			return Ok(Vec::new());
		}

		let mut entries = tokio::fs::read_dir(&self.root_dir).await?;
		let mut by_sequence: BTreeMap<u64, Migration> = BTreeMap::new();

		while let Some(entry) = entries.next_entry().await? {
			let path = entry.path();
			let is_artifact = path.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION)
				&& !path
					.file_name()
					.and_then(|n| n.to_str())
					.is_some_and(|n| n.starts_with('.'));
			if !is_artifact || !entry.file_type().await?.is_file() {
				continue;
			}

			let migration = Self::read_artifact(&path).await?;
			if let Some(previous) = by_sequence.get(&migration.sequence) {
				return Err(MigrationError::ConfigurationError(format!(
					"migrations {} and {} share sequence {}",
					previous.name,
					migration.name,
					migration.version()
				)));
			}
			by_sequence.insert(migration.sequence, migration);
		}

		Ok(by_sequence.into_values().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::SqlDialect;
	use crate::migrations::fields::FieldType;
	use crate::migrations::generator::MigrationGenerator;
	use crate::migrations::operations::MigrationOperation;
	use crate::migrations::repository::InMemoryRepository;
	use crate::migrations::schema::{ColumnDefinition, TableDefinition};
	use chrono::Utc;
	use rstest::rstest;
	use std::sync::Arc;
	use tempfile::TempDir;

	fn create_test_migration(sequence: u64, table: &str) -> Migration {
		let table_def = TableDefinition::new(table)
			.with_column(ColumnDefinition::new("id", FieldType::Integer).primary_key());
		let generator = MigrationGenerator::new(Arc::new(InMemoryRepository::new()), SqlDialect::Sqlite);
		generator
			.build(
				table,
				vec![MigrationOperation::CreateTable {
					table: table_def.clone(),
				}],
				"initial",
				Some(table_def),
				sequence,
				Utc::now(),
			)
			.unwrap()
	}

	#[rstest]
	#[tokio::test]
	async fn test_save_and_list() {
		// Arrange
		let temp_dir = TempDir::new().unwrap();
		let repo = FilesystemRepository::new(temp_dir.path().join("migrations"));
		let users = create_test_migration(1, "users");
		let posts = create_test_migration(2, "posts");

		// Act
		repo.save(&posts).await.unwrap();
		repo.save(&users).await.unwrap();
		let listed = repo.list().await.unwrap();

		// Assert
		assert_eq!(listed, vec![users.clone(), posts]);
		let path = temp_dir
			.path()
			.join("migrations")
			.join(format!("{}.json", users.name));
		assert!(path.exists());
	}

	#[rstest]
	#[tokio::test]
	async fn test_list_missing_directory_is_empty() {
		let temp_dir = TempDir::new().unwrap();
		let repo = FilesystemRepository::new(temp_dir.path().join("absent"));
		assert!(repo.list().await.unwrap().is_empty());
	}

	#[rstest]
	#[tokio::test]
	async fn test_save_rejects_duplicate_sequence() {
		let temp_dir = TempDir::new().unwrap();
		let repo = FilesystemRepository::new(temp_dir.path());
		repo.save(&create_test_migration(1, "users")).await.unwrap();

		let result = repo.save(&create_test_migration(1, "posts")).await;
		assert!(matches!(result, Err(MigrationError::GenerationError(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_duplicate_sequence_on_disk_is_configuration_error() {
		// Arrange
		let temp_dir = TempDir::new().unwrap();
		let repo = FilesystemRepository::new(temp_dir.path());
		let first = create_test_migration(1, "users");
		let mut second = create_test_migration(1, "posts");
		second.name = format!("other_{}", second.name);
		for migration in [&first, &second] {
			let json = MigrationArtifact::from(migration).to_json().unwrap();
			std::fs::write(temp_dir.path().join(format!("{}.json", migration.name)), json).unwrap();
		}

		// Act
		let result = repo.list().await;

		// Assert
		assert!(matches!(result, Err(MigrationError::ConfigurationError(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_non_artifact_files_are_ignored() {
		let temp_dir = TempDir::new().unwrap();
		std::fs::write(temp_dir.path().join("README.md"), "notes").unwrap();
		std::fs::write(temp_dir.path().join(".partial.json.tmp"), "{").unwrap();
		let repo = FilesystemRepository::new(temp_dir.path());
		assert!(repo.list().await.unwrap().is_empty());
	}

	#[rstest]
	#[case("../escape")]
	#[case("nested/name")]
	#[case("back\\slash")]
	#[case("nul\0byte")]
	#[tokio::test]
	async fn test_path_traversal_is_rejected(#[case] table: &str) {
		let temp_dir = TempDir::new().unwrap();
		let repo = FilesystemRepository::new(temp_dir.path());
		let mut migration = create_test_migration(1, "users");
		migration.table_name = table.to_string();

		let result = repo.save(&migration).await;
		assert!(matches!(result, Err(MigrationError::PathTraversal(_))));
	}

	#[rstest]
	#[tokio::test]
	async fn test_corrupt_artifact_is_configuration_error() {
		let temp_dir = TempDir::new().unwrap();
		std::fs::write(temp_dir.path().join("0001_bad.json"), "{ not json").unwrap();
		let repo = FilesystemRepository::new(temp_dir.path());
		assert!(matches!(
			repo.list().await,
			Err(MigrationError::ConfigurationError(_))
		));
	}
}
