//! Migration engine
//!
//! [`MigrationEngine`] ties the planner, the history store and the run lock
//! together. It is an explicit value: every collaborator is injected through
//! [`MigrationEngine::builder`] or created by [`MigrationEngine::connect`].
//!
//! Runs that change the database (`migrate`, `rollback`, `stamp`) hold the
//! exclusive run lock for their whole duration and work through migrations one
//! at a time.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use super::lock::MigrationLock;
use super::migration::{Migration, format_version, parse_version};
use super::model::ModelRegistry;
use super::planner::{DetectedChanges, GenerationReport, MigrationPlanner};
use super::recorder::{MigrationHistoryStore, MigrationRecord};
use super::repository::MigrationRepository;
use super::repository::filesystem::FilesystemRepository;
use super::{MigrationError, Result};
use crate::backends::{MigrationConnection, SqlDialect, SqlxConnection, redact_url};
use crate::conf::MigrationSettings;

/// Public name of the engine façade
pub type MigrationManager = MigrationEngine;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrateReport {
	/// Versions applied by this run, in order
	pub applied: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
	/// Versions rolled back by this run, newest first
	pub rolled_back: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StampReport {
	pub marked: Vec<String>,
	pub unmarked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
	pub version: String,
	pub name: String,
	/// `None` when the history names a migration with no artifact
	pub table: Option<String>,
	pub description: String,
	pub applied_at: Option<DateTime<Utc>>,
}

impl StatusEntry {
	fn pending(migration: &Migration) -> Self {
		Self {
			version: migration.version(),
			name: migration.name.clone(),
			table: Some(migration.table_name.clone()),
			description: migration.description.clone(),
			applied_at: None,
		}
	}

	fn applied(record: &MigrationRecord, migration: Option<&Migration>) -> Self {
		Self {
			version: record.version.clone(),
			name: record.name.clone(),
			table: migration.map(|m| m.table_name.clone()),
			description: migration.map(|m| m.description.clone()).unwrap_or_default(),
			applied_at: record.applied_at,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
	pub applied: Vec<StatusEntry>,
	pub pending: Vec<StatusEntry>,
}

impl MigrationStatus {
	pub fn applied_versions(&self) -> Vec<&str> {
		self.applied.iter().map(|e| e.version.as_str()).collect()
	}

	pub fn pending_versions(&self) -> Vec<&str> {
		self.pending.iter().map(|e| e.version.as_str()).collect()
	}
}

#[derive(Default)]
pub struct MigrationEngineBuilder {
	connection: Option<Arc<dyn MigrationConnection>>,
	repository: Option<Arc<dyn MigrationRepository>>,
	settings: MigrationSettings,
}

impl MigrationEngineBuilder {
	pub fn connection(mut self, connection: Arc<dyn MigrationConnection>) -> Self {
		self.connection = Some(connection);
		self
	}

	/// Defaults to a [`FilesystemRepository`] over `settings.migrations_dir`
	pub fn repository(mut self, repository: Arc<dyn MigrationRepository>) -> Self {
		self.repository = Some(repository);
		self
	}

	pub fn settings(mut self, settings: MigrationSettings) -> Self {
		self.settings = settings;
		self
	}

	pub fn build(self) -> Result<MigrationEngine> {
		let connection = self.connection.ok_or_else(|| {
			MigrationError::ConfigurationError("a database connection is required".to_string())
		})?;
		self.settings.validate()?;

		let dialect = connection.dialect();
		if let Some(configured) = self.settings.dialect
			&& configured != dialect
		{
			return Err(MigrationError::ConfigurationError(format!(
				"configured dialect '{}' does not match the connection ({})",
				configured, dialect
			)));
		}

		let repository = self.repository.unwrap_or_else(|| {
			Arc::new(FilesystemRepository::new(&self.settings.migrations_dir))
		});

		Ok(MigrationEngine {
			planner: MigrationPlanner::new(
				repository,
				dialect,
				self.settings.analyzer.clone(),
			),
			history: MigrationHistoryStore::new(
				connection.clone(),
				self.settings.history_table.clone(),
			),
			lock: MigrationLock::new(
				connection.clone(),
				self.settings.lock.clone(),
				&self.settings.history_table,
			),
			connection,
			settings: self.settings,
		})
	}
}

pub struct MigrationEngine {
	connection: Arc<dyn MigrationConnection>,
	settings: MigrationSettings,
	planner: MigrationPlanner,
	history: MigrationHistoryStore,
	lock: MigrationLock,
}

impl MigrationEngine {
	pub fn builder() -> MigrationEngineBuilder {
		MigrationEngineBuilder::default()
	}

	/// Open a connection to `settings.database_url` and build an engine over
	/// the filesystem repository
	pub async fn connect(settings: MigrationSettings) -> Result<Self> {
		let url = settings.database_url.clone().ok_or_else(|| {
			MigrationError::ConfigurationError("database_url is not configured".to_string())
		})?;
		settings.resolved_dialect()?;
		tracing::info!(url = %redact_url(&url), "Connecting");
		let connection = SqlxConnection::connect(&url).await?;
		Self::builder()
			.connection(Arc::new(connection))
			.settings(settings)
			.build()
	}

	pub fn dialect(&self) -> SqlDialect {
		self.connection.dialect()
	}

	pub fn settings(&self) -> &MigrationSettings {
		&self.settings
	}

	pub fn planner(&self) -> &MigrationPlanner {
		&self.planner
	}

	pub fn history(&self) -> &MigrationHistoryStore {
		&self.history
	}

	pub async fn detect_changes(&self, registry: &ModelRegistry) -> Result<DetectedChanges> {
		self.planner.detect_changes(registry).await
	}

	pub async fn generate(
		&self,
		registry: &ModelRegistry,
		name: Option<&str>,
		dry_run: bool,
	) -> Result<GenerationReport> {
		self.planner.generate(registry, name, dry_run).await
	}

	/// Apply every pending migration in ascending order, stopping at the first
	/// failure
	pub async fn migrate(&self) -> Result<MigrateReport> {
		self.history.ensure_table().await?;
		self.lock.acquire().await?;
		let result = self.migrate_locked().await;
		self.release_lock().await;
		result
	}

	async fn migrate_locked(&self) -> Result<MigrateReport> {
		let migrations = self.planner.load_migrations().await?;
		let mut applied = self.history.get_applied().await?;
		let pending = MigrationHistoryStore::pending_from(&migrations, &applied);
		validate_plan(&pending, &applied)?;

		if pending.is_empty() {
			tracing::info!("No migrations to apply");
		}

		let mut report = MigrateReport::default();
		for migration in &pending {
			self.lock.refresh().await?;
			if migration.is_destructive() {
				tracing::warn!(
					version = %migration.version(),
					name = %migration.name,
					"Applying destructive migration"
				);
			}
			self.history.apply(migration).await?;
			tracing::info!(
				version = %migration.version(),
				name = %migration.name,
				"Applied migration"
			);
			applied.push(MigrationRecord {
				version: migration.version(),
				name: migration.name.clone(),
				applied_at: None,
			});
			report.applied.push(migration.version());
		}
		Ok(report)
	}

	/// Roll back the `steps` most recently applied migrations, newest first
	pub async fn rollback(&self, steps: usize) -> Result<RollbackReport> {
		self.history.ensure_table().await?;
		self.lock.acquire().await?;
		let result = self.rollback_locked(steps).await;
		self.release_lock().await;
		result
	}

	async fn rollback_locked(&self, steps: usize) -> Result<RollbackReport> {
		let migrations = self.planner.load_migrations().await?;
		let by_version: HashMap<String, &Migration> =
			migrations.iter().map(|m| (m.version(), m)).collect();
		let applied = self.history.get_applied().await?;

		let targets = applied
			.iter()
			.rev()
			.take(steps)
			.map(|record| {
				by_version.get(&record.version).copied().ok_or_else(|| {
					MigrationError::ConfigurationError(format!(
						"applied migration {} ({}) has no artifact to roll back from",
						record.version, record.name
					))
				})
			})
			.collect::<Result<Vec<_>>>()?;

		if targets.is_empty() {
			tracing::info!("No migrations to roll back");
		}

		let mut report = RollbackReport::default();
		for migration in targets {
			self.lock.refresh().await?;
			self.history.rollback(migration).await?;
			tracing::info!(
				version = %migration.version(),
				name = %migration.name,
				"Rolled back migration"
			);
			report.rolled_back.push(migration.version());
		}
		Ok(report)
	}

	pub async fn status(&self) -> Result<MigrationStatus> {
		self.history.ensure_table().await?;
		let migrations = self.planner.load_migrations().await?;
		let applied = self.history.get_applied().await?;
		let by_version: HashMap<String, &Migration> =
			migrations.iter().map(|m| (m.version(), m)).collect();

		Ok(MigrationStatus {
			applied: applied
				.iter()
				.map(|r| StatusEntry::applied(r, by_version.get(&r.version).copied()))
				.collect(),
			pending: MigrationHistoryStore::pending_from(&migrations, &applied)
				.iter()
				.map(StatusEntry::pending)
				.collect(),
		})
	}

	/// Mark exactly the migrations up to `version` as applied without running
	/// their SQL. `0` clears the history.
	pub async fn stamp(&self, version: &str) -> Result<StampReport> {
		let target = parse_version(version).ok_or_else(|| {
			MigrationError::ConfigurationError(format!("'{}' is not a migration version", version))
		})?;
		let migrations = self.planner.load_migrations().await?;
		if target > 0 && !migrations.iter().any(|m| m.sequence == target) {
			return Err(MigrationError::ConfigurationError(format!(
				"no migration with version {}",
				format_version(target)
			)));
		}

		self.history.ensure_table().await?;
		self.lock.acquire().await?;
		let result = self.stamp_locked(target, &migrations).await;
		self.release_lock().await;
		result
	}

	async fn stamp_locked(&self, target: u64, migrations: &[Migration]) -> Result<StampReport> {
		let applied = self.history.get_applied().await?;

		let insert: Vec<Migration> = MigrationHistoryStore::pending_from(migrations, &applied)
			.into_iter()
			.filter(|m| m.sequence <= target)
			.collect();
		let delete: Vec<String> = applied
			.iter()
			.filter(|r| parse_version(&r.version).is_none_or(|seq| seq > target))
			.map(|r| r.version.clone())
			.collect();

		self.history.stamp(&insert, &delete).await?;
		tracing::info!(
			version = %format_version(target),
			marked = insert.len(),
			unmarked = delete.len(),
			"Stamped migration history"
		);

		Ok(StampReport {
			marked: insert.iter().map(Migration::version).collect(),
			unmarked: delete,
		})
	}

	async fn release_lock(&self) {
		if let Err(error) = self.lock.release().await {
			tracing::warn!(error = %error, "Failed to release migration lock");
		}
	}
}

/// Check the whole pending list against the history before anything runs
fn validate_plan(pending: &[Migration], applied: &[MigrationRecord]) -> Result<()> {
	let mut simulated = applied.to_vec();
	for migration in pending {
		MigrationHistoryStore::validate_apply(migration, &simulated)?;
		simulated.push(MigrationRecord {
			version: migration.version(),
			name: migration.name.clone(),
			applied_at: None,
		});
	}
	Ok(())
}
