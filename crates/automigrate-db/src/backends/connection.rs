//! Connection abstraction used by the migration engine

use async_trait::async_trait;

use super::error::Result;
use super::types::{QueryValue, Row, SqlDialect};

/// A single database session.
///
/// Statements issued between [`begin`](MigrationConnection::begin) and
/// [`commit`](MigrationConnection::commit) or
/// [`rollback`](MigrationConnection::rollback) run in the same transaction.
/// Implementations must serialize access so that a transaction opened by one
/// caller is not interleaved with statements from another.
#[async_trait]
pub trait MigrationConnection: Send + Sync {
	fn dialect(&self) -> SqlDialect;

	async fn begin(&self) -> Result<()>;

	/// Execute a statement and return the number of affected rows
	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> Result<u64>;

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> Result<Vec<Row>>;

	async fn commit(&self) -> Result<()>;

	async fn rollback(&self) -> Result<()>;
}
