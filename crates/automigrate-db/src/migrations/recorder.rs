//! Migration history
//!
//! Records which migrations have been applied in a table inside the target
//! database:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS schema_migrations (
//!     version VARCHAR(255) NOT NULL UNIQUE,
//!     name VARCHAR(255) NOT NULL,
//!     applied_at TIMESTAMP
//! )
//! ```
//!
//! Each apply or rollback runs its statements and the history change in one
//! transaction. MySQL commits DDL implicitly, so there a failed migration can
//! leave earlier statements of the same migration in place.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

use super::migration::{Migration, parse_version};
use super::sql::quote_identifier;
use super::{MigrationError, Result};
use crate::backends::{DatabaseError, MigrationConnection, QueryValue, Row, SqlDialect};

/// One applied migration as stored in the history table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
	pub version: String,
	pub name: String,
	pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationRecord {
	fn from_row(row: &Row) -> Result<Self> {
		let applied_at = row
			.get_opt::<String>("applied_at")?
			.as_deref()
			.and_then(parse_timestamp);
		Ok(Self {
			version: row.get("version")?,
			name: row.get("name")?,
			applied_at,
		})
	}
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
	let value = value.trim();
	["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
		.iter()
		.find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
		.map(|naive| naive.and_utc())
		.or_else(|| {
			DateTime::parse_from_rfc3339(value)
				.ok()
				.map(|dt| dt.with_timezone(&Utc))
		})
}

fn version_key(version: &str) -> (u64, String) {
	(parse_version(version).unwrap_or(u64::MAX), version.to_string())
}

/// Database-backed migration history
pub struct MigrationHistoryStore {
	connection: Arc<dyn MigrationConnection>,
	table: String,
}

impl MigrationHistoryStore {
	pub fn new(connection: Arc<dyn MigrationConnection>, table: impl Into<String>) -> Self {
		Self {
			connection,
			table: table.into(),
		}
	}

	pub fn table_name(&self) -> &str {
		&self.table
	}

	fn dialect(&self) -> SqlDialect {
		self.connection.dialect()
	}

	fn quoted_table(&self) -> String {
		quote_identifier(&self.table, self.dialect())
	}

	pub async fn ensure_table(&self) -> Result<()> {
		let sql = format!(
			"CREATE TABLE IF NOT EXISTS {} (version VARCHAR(255) NOT NULL UNIQUE, \
			 name VARCHAR(255) NOT NULL, applied_at TIMESTAMP)",
			self.quoted_table()
		);
		self.connection
			.execute(&sql, vec![])
			.await
			.map_err(MigrationError::DatabaseError)?;
		Ok(())
	}

	/// Applied migrations ordered by numeric version
	pub async fn get_applied(&self) -> Result<Vec<MigrationRecord>> {
		let sql = format!(
			"SELECT version, name, CAST(applied_at AS {}) AS applied_at FROM {}",
			self.dialect().text_cast_type(),
			self.quoted_table()
		);
		let rows = self
			.connection
			.fetch_all(&sql, vec![])
			.await
			.map_err(MigrationError::DatabaseError)?;

		let mut records = rows
			.iter()
			.map(MigrationRecord::from_row)
			.collect::<Result<Vec<_>>>()?;
		records.sort_by_key(|r| version_key(&r.version));
		Ok(records)
	}

	/// Migrations in `all` that are not recorded as applied, ascending
	pub async fn get_pending(&self, all: &[Migration]) -> Result<Vec<Migration>> {
		let applied = self.get_applied().await?;
		Ok(Self::pending_from(all, &applied))
	}

	pub fn pending_from(all: &[Migration], applied: &[MigrationRecord]) -> Vec<Migration> {
		let applied: HashSet<&str> = applied.iter().map(|r| r.version.as_str()).collect();
		let mut pending: Vec<Migration> = all
			.iter()
			.filter(|m| !applied.contains(m.version().as_str()))
			.cloned()
			.collect();
		pending.sort_by_key(|m| m.sequence);
		pending
	}

	/// Check that `migration` may be applied on top of `applied`
	pub fn validate_apply(migration: &Migration, applied: &[MigrationRecord]) -> Result<()> {
		let version = migration.version();
		if applied.iter().any(|r| r.version == version) {
			return Err(MigrationError::ConfigurationError(format!(
				"migration {} ({}) is already applied",
				version, migration.name
			)));
		}
		if let Some(newest) = applied
			.iter()
			.filter_map(|r| parse_version(&r.version).map(|seq| (seq, r)))
			.max_by_key(|(seq, _)| *seq)
			&& newest.0 >= migration.sequence
		{
			return Err(MigrationError::ConfigurationError(format!(
				"migration {} ({}) is older than applied migration {}; \
				 history is out of order",
				version, migration.name, newest.1.version
			)));
		}
		Ok(())
	}

	/// Run the up statements and record the migration in one transaction
	pub async fn apply(&self, migration: &Migration) -> Result<()> {
		let version = migration.version();
		if !self.dialect().supports_transactional_ddl() {
			tracing::warn!(
				version = %version,
				"DDL is not transactional on {}; a failure may leave partial changes",
				self.dialect()
			);
		}

		self.connection
			.begin()
			.await
			.map_err(|source| MigrationError::ApplyError {
				version: version.clone(),
				source,
			})?;

		match self.apply_in_transaction(migration).await {
			Ok(()) => self
				.connection
				.commit()
				.await
				.map_err(|source| MigrationError::ApplyError { version, source }),
			Err(source) => {
				self.abort(&version).await;
				Err(MigrationError::ApplyError { version, source })
			}
		}
	}

	async fn apply_in_transaction(&self, migration: &Migration) -> std::result::Result<(), DatabaseError> {
		for statement in &migration.up_sql {
			tracing::debug!(version = %migration.version(), sql = %statement, "Executing");
			self.connection.execute(statement, vec![]).await?;
		}
		self.connection
			.execute(
				&self.insert_sql(),
				vec![
					QueryValue::from(migration.version()),
					QueryValue::from(migration.name.clone()),
				],
			)
			.await?;
		Ok(())
	}

	/// Run the down statements and remove the record in one transaction
	pub async fn rollback(&self, migration: &Migration) -> Result<()> {
		let version = migration.version();
		self.connection
			.begin()
			.await
			.map_err(|source| MigrationError::RollbackError {
				version: version.clone(),
				source,
			})?;

		match self.rollback_in_transaction(migration).await {
			Ok(()) => self
				.connection
				.commit()
				.await
				.map_err(|source| MigrationError::RollbackError { version, source }),
			Err(source) => {
				self.abort(&version).await;
				Err(MigrationError::RollbackError { version, source })
			}
		}
	}

	async fn rollback_in_transaction(
		&self,
		migration: &Migration,
	) -> std::result::Result<(), DatabaseError> {
		for statement in &migration.down_sql {
			tracing::debug!(version = %migration.version(), sql = %statement, "Executing");
			self.connection.execute(statement, vec![]).await?;
		}
		self.connection
			.execute(
				&self.delete_sql(),
				vec![QueryValue::from(migration.version())],
			)
			.await?;
		Ok(())
	}

	/// Record `insert` as applied and forget `delete`, without running any
	/// migration SQL
	pub async fn stamp(&self, insert: &[Migration], delete: &[String]) -> Result<()> {
		self.connection
			.begin()
			.await
			.map_err(MigrationError::DatabaseError)?;

		let result: std::result::Result<(), DatabaseError> = async {
			for migration in insert {
				self.connection
					.execute(
						&self.insert_sql(),
						vec![
							QueryValue::from(migration.version()),
							QueryValue::from(migration.name.clone()),
						],
					)
					.await?;
			}
			for version in delete {
				self.connection
					.execute(&self.delete_sql(), vec![QueryValue::from(version.clone())])
					.await?;
			}
			Ok(())
		}
		.await;

		match result {
			Ok(()) => self
				.connection
				.commit()
				.await
				.map_err(MigrationError::DatabaseError),
			Err(error) => {
				self.abort("stamp").await;
				Err(MigrationError::DatabaseError(error))
			}
		}
	}

	async fn abort(&self, context: &str) {
		if let Err(error) = self.connection.rollback().await {
			tracing::warn!(context = %context, error = %error, "ROLLBACK failed");
		}
	}

	fn insert_sql(&self) -> String {
		format!(
			"INSERT INTO {} (version, name, applied_at) VALUES ({}, {}, CURRENT_TIMESTAMP)",
			self.quoted_table(),
			self.dialect().placeholder(1),
			self.dialect().placeholder(2)
		)
	}

	fn delete_sql(&self) -> String {
		format!(
			"DELETE FROM {} WHERE version = {}",
			self.quoted_table(),
			self.dialect().placeholder(1)
		)
	}
}
