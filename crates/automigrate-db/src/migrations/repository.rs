//! Migration artifact storage

pub mod filesystem;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Migration, MigrationError, Result};

/// Durable store of generated migrations
#[async_trait]
pub trait MigrationRepository: Send + Sync {
	/// Persist a new migration. Existing artifacts are never overwritten.
	async fn save(&self, migration: &Migration) -> Result<()>;

	/// All migrations in ascending sequence order
	async fn list(&self) -> Result<Vec<Migration>>;

	/// The highest-sequence migration for `table`
	async fn latest_for_table(&self, table: &str) -> Result<Option<Migration>> {
		Ok(self
			.list()
			.await?
			.into_iter()
			.filter(|m| m.table_name == table)
			.max_by_key(|m| m.sequence))
	}
}

/// Repository kept in memory, for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryRepository {
	migrations: RwLock<Vec<Migration>>,
}

impl InMemoryRepository {
	pub fn new() -> Self {
		Self::default()
	}

	/// Repository pre-populated with `migrations`
	pub fn with_migrations(migrations: Vec<Migration>) -> Self {
		Self {
			migrations: RwLock::new(migrations),
		}
	}
}

#[async_trait]
impl MigrationRepository for InMemoryRepository {
	async fn save(&self, migration: &Migration) -> Result<()> {
		let mut migrations = self.migrations.write();
		if let Some(existing) = migrations
			.iter()
			.find(|m| m.sequence == migration.sequence || m.name == migration.name)
		{
			return Err(MigrationError::GenerationError(format!(
				"migration {} already exists as {}",
				migration.version(),
				existing.name
			)));
		}
		migrations.push(migration.clone());
		Ok(())
	}

	async fn list(&self) -> Result<Vec<Migration>> {
		let mut migrations = self.migrations.read().clone();
		migrations.sort_by_key(|m| m.sequence);
		Ok(migrations)
	}
}
