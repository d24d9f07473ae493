//! sqlx-backed connection using the `Any` driver

use async_trait::async_trait;
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::{AnyConnection, Column, Connection, Executor, Row as _};
use tokio::sync::Mutex;

use super::{
	connection::MigrationConnection,
	error::{DatabaseError, Result},
	types::{QueryValue, Row, SqlDialect},
};

/// A single sqlx connection shared behind an async mutex.
///
/// The migration engine needs one session for the whole run so that
/// advisory locks and transactions stay on the same backend connection,
/// which is why this wraps a connection rather than a pool.
pub struct SqlxConnection {
	conn: Mutex<AnyConnection>,
	dialect: SqlDialect,
}

impl SqlxConnection {
	/// Connect to `url`, inferring the dialect from its scheme
	pub async fn connect(url: &str) -> Result<Self> {
		let dialect = SqlDialect::from_url(url).ok_or_else(|| {
			DatabaseError::ConnectionError(format!(
				"Cannot infer database dialect from URL scheme: {}",
				redact_url(url)
			))
		})?;
		sqlx::any::install_default_drivers();
		let conn = AnyConnection::connect(url).await?;
		tracing::debug!(dialect = %dialect, "Opened migration connection");
		Ok(Self {
			conn: Mutex::new(conn),
			dialect,
		})
	}

	fn bind_value<'q>(
		query: sqlx::query::Query<'q, Any, AnyArguments<'q>>,
		value: QueryValue,
	) -> sqlx::query::Query<'q, Any, AnyArguments<'q>> {
		match value {
			QueryValue::Null => query.bind(None::<String>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s),
		}
	}

	fn convert_row(any_row: &AnyRow) -> Row {
		let mut row = Row::new();
		for column in any_row.columns() {
			let index = column.ordinal();
			let value = if let Ok(v) = any_row.try_get::<Option<String>, _>(index) {
				v.map(QueryValue::String)
			} else if let Ok(v) = any_row.try_get::<Option<i64>, _>(index) {
				v.map(QueryValue::Int)
			} else if let Ok(v) = any_row.try_get::<Option<f64>, _>(index) {
				v.map(QueryValue::Float)
			} else if let Ok(v) = any_row.try_get::<Option<bool>, _>(index) {
				v.map(QueryValue::Bool)
			} else {
				None
			};
			row.insert(
				column.name().to_string(),
				value.unwrap_or(QueryValue::Null),
			);
		}
		row
	}
}

#[async_trait]
impl MigrationConnection for SqlxConnection {
	fn dialect(&self) -> SqlDialect {
		self.dialect
	}

	async fn begin(&self) -> Result<()> {
		let mut conn = self.conn.lock().await;
		(&mut *conn).execute("BEGIN").await?;
		Ok(())
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> Result<u64> {
		let mut conn = self.conn.lock().await;
		let result = if params.is_empty() {
			(&mut *conn).execute(sql).await?
		} else {
			let mut query = sqlx::query(sql);
			for param in params {
				query = Self::bind_value(query, param);
			}
			query.execute(&mut *conn).await?
		};
		Ok(result.rows_affected())
	}

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> Result<Vec<Row>> {
		let mut conn = self.conn.lock().await;
		let rows = if params.is_empty() {
			(&mut *conn).fetch_all(sql).await?
		} else {
			let mut query = sqlx::query(sql);
			for param in params {
				query = Self::bind_value(query, param);
			}
			query.fetch_all(&mut *conn).await?
		};
		Ok(rows.iter().map(Self::convert_row).collect())
	}

	async fn commit(&self) -> Result<()> {
		let mut conn = self.conn.lock().await;
		(&mut *conn).execute("COMMIT").await?;
		Ok(())
	}

	async fn rollback(&self) -> Result<()> {
		let mut conn = self.conn.lock().await;
		(&mut *conn).execute("ROLLBACK").await?;
		Ok(())
	}
}

/// Strip credentials from a connection URL before it is logged
pub fn redact_url(url: &str) -> String {
	match (url.find("://"), url.rfind('@')) {
		(Some(scheme_end), Some(at)) if at > scheme_end => {
			format!("{}://***{}", &url[..scheme_end], &url[at..])
		}
		_ => url.to_string(),
	}
}
