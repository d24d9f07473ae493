//! Common type definitions for database abstraction

use super::error::DatabaseError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// SQL dialect a connection speaks and migrations are rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
	#[serde(alias = "postgresql")]
	Postgres,
	Mysql,
	Sqlite,
}

impl SqlDialect {
	/// Check if this dialect supports transactional DDL
	///
	/// - PostgreSQL: Supports transactional DDL
	/// - SQLite: Supports transactional DDL
	/// - MySQL/MariaDB: Does NOT support transactional DDL (DDL causes implicit commit)
	///
	/// # Examples
	///
	/// ```
	/// use automigrate_db::backends::SqlDialect;
	///
	/// assert!(SqlDialect::Postgres.supports_transactional_ddl());
	/// assert!(SqlDialect::Sqlite.supports_transactional_ddl());
	/// assert!(!SqlDialect::Mysql.supports_transactional_ddl());
	/// ```
	pub fn supports_transactional_ddl(&self) -> bool {
		matches!(self, SqlDialect::Postgres | SqlDialect::Sqlite)
	}

	/// Infer the dialect from a connection URL scheme.
	///
	/// ```
	/// use automigrate_db::backends::SqlDialect;
	///
	/// assert_eq!(SqlDialect::from_url("postgres://localhost/app"), Some(SqlDialect::Postgres));
	/// assert_eq!(SqlDialect::from_url("sqlite::memory:"), Some(SqlDialect::Sqlite));
	/// assert_eq!(SqlDialect::from_url("redis://localhost"), None);
	/// ```
	pub fn from_url(url: &str) -> Option<Self> {
		let scheme = url.split(':').next()?.to_ascii_lowercase();
		match scheme.as_str() {
			"postgres" | "postgresql" => Some(SqlDialect::Postgres),
			"mysql" | "mariadb" => Some(SqlDialect::Mysql),
			"sqlite" => Some(SqlDialect::Sqlite),
			_ => None,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			SqlDialect::Postgres => "postgres",
			SqlDialect::Mysql => "mysql",
			SqlDialect::Sqlite => "sqlite",
		}
	}

	/// Character used to quote identifiers
	pub fn quote_char(&self) -> char {
		match self {
			SqlDialect::Mysql => '`',
			SqlDialect::Postgres | SqlDialect::Sqlite => '"',
		}
	}

	/// Bind parameter placeholder for the 1-based position `index`
	pub fn placeholder(&self, index: usize) -> String {
		match self {
			SqlDialect::Postgres => format!("${}", index),
			SqlDialect::Mysql | SqlDialect::Sqlite => "?".to_string(),
		}
	}

	/// Type used when casting a value to text in a SELECT list
	pub fn text_cast_type(&self) -> &'static str {
		match self {
			SqlDialect::Mysql => "CHAR",
			SqlDialect::Postgres | SqlDialect::Sqlite => "TEXT",
		}
	}
}

impl fmt::Display for SqlDialect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl FromStr for SqlDialect {
	type Err = DatabaseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"postgres" | "postgresql" | "pg" => Ok(SqlDialect::Postgres),
			"mysql" | "mariadb" => Ok(SqlDialect::Mysql),
			"sqlite" | "sqlite3" => Ok(SqlDialect::Sqlite),
			other => Err(DatabaseError::ConnectionError(format!(
				"Unsupported dialect: {}",
				other
			))),
		}
	}
}

/// Query value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryValue {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	String(String),
}

impl From<&str> for QueryValue {
	fn from(s: &str) -> Self {
		QueryValue::String(s.to_string())
	}
}

impl From<String> for QueryValue {
	fn from(s: String) -> Self {
		QueryValue::String(s)
	}
}

impl From<i64> for QueryValue {
	fn from(i: i64) -> Self {
		QueryValue::Int(i)
	}
}

impl From<bool> for QueryValue {
	fn from(b: bool) -> Self {
		QueryValue::Bool(b)
	}
}

impl From<f64> for QueryValue {
	fn from(f: f64) -> Self {
		QueryValue::Float(f)
	}
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or(QueryValue::Null)
	}
}

/// Row from query result
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
	pub data: HashMap<String, QueryValue>,
}

impl Row {
	pub fn new() -> Self {
		Self {
			data: HashMap::new(),
		}
	}

	pub fn insert(&mut self, key: String, value: QueryValue) {
		self.data.insert(key, value);
	}

	pub fn get<T: TryFrom<QueryValue>>(&self, key: &str) -> std::result::Result<T, DatabaseError>
	where
		DatabaseError: From<<T as TryFrom<QueryValue>>::Error>,
	{
		self.data
			.get(key)
			.cloned()
			.ok_or_else(|| DatabaseError::ColumnNotFound(key.to_string()))
			.and_then(|v| v.try_into().map_err(Into::into))
	}

	/// Like [`Row::get`], mapping SQL NULL to `None`
	pub fn get_opt<T: TryFrom<QueryValue>>(
		&self,
		key: &str,
	) -> std::result::Result<Option<T>, DatabaseError>
	where
		DatabaseError: From<<T as TryFrom<QueryValue>>::Error>,
	{
		match self.data.get(key) {
			None => Err(DatabaseError::ColumnNotFound(key.to_string())),
			Some(QueryValue::Null) => Ok(None),
			Some(value) => value.clone().try_into().map(Some).map_err(Into::into),
		}
	}
}

impl Default for Row {
	fn default() -> Self {
		Self::new()
	}
}

// Type conversions for QueryValue
impl TryFrom<QueryValue> for i64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Int(i) => Ok(i),
			QueryValue::Bool(b) => Ok(i64::from(b)),
			QueryValue::String(ref s) => s.trim().parse().map_err(|_| {
				DatabaseError::TypeError(format!("Cannot convert {:?} to i64", value))
			}),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to i64",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for String {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::String(s) => Ok(s),
			QueryValue::Int(i) => Ok(i.to_string()),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to String",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for bool {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Bool(b) => Ok(b),
			QueryValue::Int(i) => Ok(i != 0),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to bool",
				value
			))),
		}
	}
}

impl TryFrom<QueryValue> for f64 {
	type Error = DatabaseError;

	fn try_from(value: QueryValue) -> std::result::Result<Self, Self::Error> {
		match value {
			QueryValue::Float(f) => Ok(f),
			QueryValue::Int(i) => Ok(i as f64),
			_ => Err(DatabaseError::TypeError(format!(
				"Cannot convert {:?} to f64",
				value
			))),
		}
	}
}
