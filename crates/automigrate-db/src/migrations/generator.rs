//! Migration generation
//!
//! Packages operations for one table into a content-addressed [`Migration`],
//! renders its up and down SQL and hands it to a [`MigrationRepository`].

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::migration::Migration;
use super::operations::MigrationOperation;
use super::repository::MigrationRepository;
use super::schema::TableDefinition;
use super::sql::SqlGenerator;
use super::{MigrationError, Result};
use crate::backends::SqlDialect;

/// SHA-256 hex digest of the JSON serialization of `operations`.
///
/// Identical operation lists always hash to the same id.
pub fn compute_id(operations: &[MigrationOperation]) -> Result<String> {
	let canonical = serde_json::to_vec(operations)?;
	Ok(hex::encode(Sha256::digest(&canonical)))
}

/// `<timestamp>_<short-id>_<table>`
pub fn migration_name(created_at: DateTime<Utc>, id: &str, table: &str) -> String {
	let short = &id[..id.len().min(super::migration::SHORT_ID_LEN)];
	format!("{}_{}_{}", created_at.format("%Y%m%d%H%M%S"), short, table)
}

pub struct MigrationGenerator {
	repository: Arc<dyn MigrationRepository>,
	sql: SqlGenerator,
}

impl MigrationGenerator {
	pub fn new(repository: Arc<dyn MigrationRepository>, dialect: SqlDialect) -> Self {
		Self {
			repository,
			sql: SqlGenerator::new(dialect),
		}
	}

	pub fn dialect(&self) -> SqlDialect {
		self.sql.dialect()
	}

	/// Build a migration without touching the repository
	pub fn build(
		&self,
		table: &str,
		operations: Vec<MigrationOperation>,
		description: &str,
		snapshot: Option<TableDefinition>,
		sequence: u64,
		created_at: DateTime<Utc>,
	) -> Result<Migration> {
		if operations.is_empty() {
			return Err(MigrationError::GenerationError(format!(
				"no operations to generate for table {}",
				table
			)));
		}
		if let Some(other) = operations.iter().find(|op| op.table_name() != table) {
			return Err(MigrationError::GenerationError(format!(
				"operation '{}' does not belong to table {}",
				other.summary(),
				table
			)));
		}

		let up_sql = self.sql.render_all(&operations)?;
		let down_sql = self.sql.render_down(&operations)?;
		let id = compute_id(&operations)?;

		Ok(Migration {
			name: migration_name(created_at, &id, table),
			id,
			sequence,
			table_name: table.to_string(),
			description: description.to_string(),
			dialect: self.dialect(),
			created_at,
			operations,
			snapshot,
			up_sql,
			down_sql,
		})
	}

	/// One past the highest sequence in the repository
	pub async fn next_sequence(&self) -> Result<u64> {
		let existing = self.repository.list().await?;
		Ok(existing.iter().map(|m| m.sequence).max().unwrap_or(0) + 1)
	}

	/// Reject a migration whose operations repeat the latest one for its table
	pub async fn check_duplicate(&self, migration: &Migration) -> Result<()> {
		if let Some(latest) = self
			.repository
			.latest_for_table(&migration.table_name)
			.await? && latest.id == migration.id
		{
			return Err(MigrationError::GenerationError(format!(
				"operations for {} are identical to migration {} ({})",
				migration.table_name,
				latest.version(),
				latest.name
			)));
		}
		Ok(())
	}

	/// Build, validate and persist a migration with the next free sequence
	pub async fn generate(
		&self,
		table: &str,
		operations: Vec<MigrationOperation>,
		description: &str,
		snapshot: Option<TableDefinition>,
	) -> Result<Migration> {
		let sequence = self.next_sequence().await?;
		let migration = self.build(
			table,
			operations,
			description,
			snapshot,
			sequence,
			Utc::now(),
		)?;
		self.check_duplicate(&migration).await?;
		self.repository.save(&migration).await?;
		tracing::info!(
			version = %migration.version(),
			name = %migration.name,
			"Generated migration"
		);
		Ok(migration)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::migrations::fields::FieldType;
	use crate::migrations::repository::InMemoryRepository;
	use crate::migrations::schema::ColumnDefinition;
	use rstest::{fixture, rstest};

	fn users() -> TableDefinition {
		TableDefinition::new("users")
			.with_column(ColumnDefinition::new("id", FieldType::Integer).primary_key())
	}

	fn create_users() -> Vec<MigrationOperation> {
		vec![MigrationOperation::CreateTable { table: users() }]
	}

	#[fixture]
	fn generator() -> MigrationGenerator {
		MigrationGenerator::new(Arc::new(InMemoryRepository::new()), SqlDialect::Postgres)
	}

	#[rstest]
	fn test_compute_id_is_content_addressed() {
		let a = compute_id(&create_users()).unwrap();
		let b = compute_id(&create_users()).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.len(), 64);

		let other = vec![MigrationOperation::DropTable { table: users() }];
		assert_ne!(a, compute_id(&other).unwrap());
	}

	#[rstest]
	fn test_compute_id_is_sha256_of_json() {
		// sha256("[]")
		assert_eq!(
			compute_id(&[]).unwrap(),
			"4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
		);
	}

	#[rstest]
	fn test_build_renders_up_and_down(generator: MigrationGenerator) {
		let created_at = DateTime::parse_from_rfc3339("2026-10-14T09:30:05Z")
			.unwrap()
			.with_timezone(&Utc);
		let migration = generator
			.build("users", create_users(), "initial", Some(users()), 1, created_at)
			.unwrap();

		assert_eq!(migration.version(), "0001");
		assert_eq!(
			migration.name,
			format!("20261014093005_{}_users", migration.short_id())
		);
		assert_eq!(
			migration.up_sql,
			vec!["CREATE TABLE users (id INTEGER PRIMARY KEY);"]
		);
		assert_eq!(migration.down_sql, vec!["DROP TABLE users;"]);
	}

	#[rstest]
	fn test_build_rejects_empty_and_foreign_operations(generator: MigrationGenerator) {
		let now = Utc::now();
		assert!(matches!(
			generator.build("users", vec![], "", None, 1, now),
			Err(MigrationError::GenerationError(_))
		));
		assert!(matches!(
			generator.build("posts", create_users(), "", None, 1, now),
			Err(MigrationError::GenerationError(_))
		));
	}

	#[rstest]
	#[tokio::test]
	async fn test_generate_assigns_increasing_sequences(generator: MigrationGenerator) {
		let first = generator
			.generate("users", create_users(), "initial", Some(users()))
			.await
			.unwrap();
		let add = vec![MigrationOperation::AddColumn {
			table: "users".to_string(),
			column: ColumnDefinition::new("email", FieldType::VarChar(255)),
		}];
		let second = generator
			.generate("users", add, "add email", None)
			.await
			.unwrap();

		assert_eq!(first.sequence, 1);
		assert_eq!(second.sequence, 2);
	}

	#[rstest]
	#[tokio::test]
	async fn test_generate_rejects_repeat_of_latest(generator: MigrationGenerator) {
		generator
			.generate("users", create_users(), "initial", Some(users()))
			.await
			.unwrap();
		let result = generator
			.generate("users", create_users(), "again", Some(users()))
			.await;
		match result {
			Err(MigrationError::GenerationError(message)) => assert!(message.contains("0001")),
			other => panic!("expected GenerationError, got {:?}", other),
		}
	}

	#[rstest]
	fn test_build_surfaces_sqlite_limitation() {
		let generator =
			MigrationGenerator::new(Arc::new(InMemoryRepository::new()), SqlDialect::Sqlite);
		let ops = vec![MigrationOperation::ModifyColumn {
			table: "users".to_string(),
			old: ColumnDefinition::new("name", FieldType::VarChar(10)),
			new: ColumnDefinition::new("name", FieldType::VarChar(20)),
		}];
		assert!(matches!(
			generator.build("users", ops, "", None, 1, Utc::now()),
			Err(MigrationError::GenerationError(_))
		));
	}
}
