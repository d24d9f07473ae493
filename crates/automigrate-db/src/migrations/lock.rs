//! Exclusive run lock
//!
//! | Dialect    | Mechanism                                        |
//! |------------|--------------------------------------------------|
//! | PostgreSQL | `pg_try_advisory_lock(hashtext(name))`           |
//! | MySQL      | `GET_LOCK(name, 0)`                              |
//! | SQLite     | single-row `<history_table>_lock` table          |
//!
//! Acquisition is polled until [`LockSettings::timeout_secs`] has passed.
//! SQLite lock rows older than [`LockSettings::stale_after_secs`] are treated
//! as abandoned and taken over, so the holder refreshes its row with
//! [`MigrationLock::refresh`] while a run is in progress.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::sql::quote_identifier;
use super::{MigrationError, Result};
use crate::backends::{MigrationConnection, QueryValue, SqlDialect};
use crate::conf::LockSettings;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct MigrationLock {
	connection: Arc<dyn MigrationConnection>,
	settings: LockSettings,
	lock_table: String,
	holder: String,
}

impl MigrationLock {
	pub fn new(
		connection: Arc<dyn MigrationConnection>,
		settings: LockSettings,
		history_table: &str,
	) -> Self {
		Self {
			connection,
			settings,
			lock_table: format!("{}_lock", history_table),
			holder: uuid::Uuid::new_v4().to_string(),
		}
	}

	/// Unique id of this lock instance, stored as the SQLite holder
	pub fn holder(&self) -> &str {
		&self.holder
	}

	fn dialect(&self) -> SqlDialect {
		self.connection.dialect()
	}

	/// Block until the lock is held or the timeout expires
	pub async fn acquire(&self) -> Result<()> {
		if self.dialect() == SqlDialect::Sqlite {
			self.ensure_lock_table().await?;
		}

		let deadline = Instant::now() + Duration::from_secs(self.settings.timeout_secs);
		loop {
			if self.try_acquire().await? {
				tracing::debug!(lock = %self.settings.name, "Acquired migration lock");
				return Ok(());
			}
			if Instant::now() >= deadline {
				return Err(MigrationError::LockError(format!(
					"could not acquire migration lock '{}' within {}s; another run is in progress",
					self.settings.name, self.settings.timeout_secs
				)));
			}
			tokio::time::sleep(POLL_INTERVAL).await;
		}
	}

	pub async fn release(&self) -> Result<()> {
		match self.dialect() {
			SqlDialect::Postgres => {
				self.connection
					.fetch_all(
						"SELECT pg_advisory_unlock(hashtext($1)) AS released",
						vec![QueryValue::from(self.settings.name.clone())],
					)
					.await
					.map_err(MigrationError::DatabaseError)?;
			}
			SqlDialect::Mysql => {
				self.connection
					.fetch_all(
						"SELECT RELEASE_LOCK(?) AS released",
						vec![QueryValue::from(self.settings.name.clone())],
					)
					.await
					.map_err(MigrationError::DatabaseError)?;
			}
			SqlDialect::Sqlite => {
				let sql = format!(
					"DELETE FROM {} WHERE id = 1 AND holder = ?",
					self.quoted_lock_table()
				);
				self.connection
					.execute(&sql, vec![QueryValue::from(self.holder.clone())])
					.await
					.map_err(MigrationError::DatabaseError)?;
			}
		}
		tracing::debug!(lock = %self.settings.name, "Released migration lock");
		Ok(())
	}

	/// Renew the SQLite lock row so a long run is not taken over as stale.
	///
	/// Advisory locks live as long as the session, so this is a no-op on
	/// PostgreSQL and MySQL.
	pub async fn refresh(&self) -> Result<()> {
		if self.dialect() != SqlDialect::Sqlite {
			return Ok(());
		}
		let sql = format!(
			"UPDATE {} SET acquired_at = ? WHERE id = 1 AND holder = ?",
			self.quoted_lock_table()
		);
		let updated = self
			.connection
			.execute(
				&sql,
				vec![
					QueryValue::Int(Utc::now().timestamp()),
					QueryValue::from(self.holder.clone()),
				],
			)
			.await
			.map_err(MigrationError::DatabaseError)?;
		if updated == 0 {
			return Err(MigrationError::LockError(format!(
				"migration lock '{}' is no longer held by this run",
				self.settings.name
			)));
		}
		tracing::trace!(lock = %self.settings.name, "Refreshed migration lock");
		Ok(())
	}

	async fn try_acquire(&self) -> Result<bool> {
		match self.dialect() {
			SqlDialect::Postgres => {
				self.query_flag(
					"SELECT pg_try_advisory_lock(hashtext($1)) AS locked",
					vec![QueryValue::from(self.settings.name.clone())],
				)
				.await
			}
			SqlDialect::Mysql => {
				self.query_flag(
					"SELECT GET_LOCK(?, 0) AS locked",
					vec![QueryValue::from(self.settings.name.clone())],
				)
				.await
			}
			SqlDialect::Sqlite => self.try_acquire_row().await,
		}
	}

	async fn query_flag(&self, sql: &str, params: Vec<QueryValue>) -> Result<bool> {
		let rows = self
			.connection
			.fetch_all(sql, params)
			.await
			.map_err(MigrationError::DatabaseError)?;
		// GET_LOCK returns NULL on error, which counts as not acquired
		Ok(match rows.first() {
			Some(row) => row.get_opt::<bool>("locked")?.unwrap_or(false),
			None => false,
		})
	}

	async fn ensure_lock_table(&self) -> Result<()> {
		let sql = format!(
			"CREATE TABLE IF NOT EXISTS {} (id INTEGER PRIMARY KEY, \
			 holder VARCHAR(255) NOT NULL, acquired_at INTEGER NOT NULL)",
			self.quoted_lock_table()
		);
		self.connection
			.execute(&sql, vec![])
			.await
			.map_err(MigrationError::DatabaseError)?;
		Ok(())
	}

	async fn try_acquire_row(&self) -> Result<bool> {
		let now = Utc::now().timestamp();
		let stale_before = now - self.settings.stale_after_secs as i64;
		let table = self.quoted_lock_table();

		let taken_over = self
			.connection
			.execute(
				&format!("DELETE FROM {} WHERE acquired_at < ?", table),
				vec![QueryValue::Int(stale_before)],
			)
			.await
			.map_err(MigrationError::DatabaseError)?;
		if taken_over > 0 {
			tracing::warn!(lock = %self.settings.name, "Took over stale migration lock");
		}

		let inserted = self
			.connection
			.execute(
				&format!(
					"INSERT OR IGNORE INTO {} (id, holder, acquired_at) VALUES (1, ?, ?)",
					table
				),
				vec![QueryValue::from(self.holder.clone()), QueryValue::Int(now)],
			)
			.await
			.map_err(MigrationError::DatabaseError)?;
		Ok(inserted == 1)
	}

	fn quoted_lock_table(&self) -> String {
		quote_identifier(&self.lock_table, self.dialect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::backends::SqlxConnection;
	use rstest::rstest;
	use tempfile::TempDir;

	async fn connect(dir: &TempDir) -> Arc<dyn MigrationConnection> {
		let url = format!("sqlite://{}?mode=rwc", dir.path().join("lock.db").display());
		Arc::new(SqlxConnection::connect(&url).await.unwrap())
	}

	fn settings(timeout_secs: u64, stale_after_secs: u64) -> LockSettings {
		LockSettings {
			timeout_secs,
			stale_after_secs,
			..Default::default()
		}
	}

	#[rstest]
	#[tokio::test]
	async fn test_second_holder_times_out() {
		// Arrange
		let dir = TempDir::new().unwrap();
		let first = MigrationLock::new(connect(&dir).await, settings(0, 600), "schema_migrations");
		let second = MigrationLock::new(connect(&dir).await, settings(0, 600), "schema_migrations");
		first.acquire().await.unwrap();

		// Act
		let result = second.acquire().await;

		// Assert
		assert!(matches!(result, Err(MigrationError::LockError(_))));
		first.release().await.unwrap();
		second.acquire().await.unwrap();
		second.release().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_release_only_removes_own_row() {
		let dir = TempDir::new().unwrap();
		let owner = MigrationLock::new(connect(&dir).await, settings(0, 600), "schema_migrations");
		let other = MigrationLock::new(connect(&dir).await, settings(0, 600), "schema_migrations");
		owner.acquire().await.unwrap();

		other.release().await.unwrap();

		assert!(other.acquire().await.is_err());
		owner.release().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_stale_lock_is_taken_over() {
		let dir = TempDir::new().unwrap();
		let connection = connect(&dir).await;
		let abandoned = MigrationLock::new(connection.clone(), settings(0, 600), "schema_migrations");
		abandoned.acquire().await.unwrap();
		connection
			.execute("UPDATE schema_migrations_lock SET acquired_at = 0", vec![])
			.await
			.unwrap();

		let fresh = MigrationLock::new(connection, settings(0, 600), "schema_migrations");
		fresh.acquire().await.unwrap();
		fresh.release().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_refreshed_lock_is_not_taken_over() {
		// Arrange
		let dir = TempDir::new().unwrap();
		let connection = connect(&dir).await;
		let holder = MigrationLock::new(connection.clone(), settings(0, 600), "schema_migrations");
		holder.acquire().await.unwrap();
		connection
			.execute("UPDATE schema_migrations_lock SET acquired_at = 0", vec![])
			.await
			.unwrap();

		// Act
		holder.refresh().await.unwrap();

		// Assert
		let contender = MigrationLock::new(connection, settings(0, 600), "schema_migrations");
		assert!(matches!(contender.acquire().await, Err(MigrationError::LockError(_))));
		holder.release().await.unwrap();
	}

	#[rstest]
	#[tokio::test]
	async fn test_refresh_fails_once_lock_is_lost() {
		let dir = TempDir::new().unwrap();
		let connection = connect(&dir).await;
		let holder = MigrationLock::new(connection.clone(), settings(0, 600), "schema_migrations");
		holder.acquire().await.unwrap();
		connection
			.execute("DELETE FROM schema_migrations_lock", vec![])
			.await
			.unwrap();

		let result = holder.refresh().await;

		assert!(matches!(result, Err(MigrationError::LockError(_))));
	}
}
