//! Field type definitions for migrations

use serde::{Deserialize, Serialize};

use crate::backends::SqlDialect;

/// Logical column types understood by the analyzer and SQL generator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
	Integer,
	VarChar(u32),
	Decimal { precision: u32, scale: u32 },
	Boolean,
	DateTime,
	Json,
}

impl FieldType {
	/// Convert to SQL type for a specific dialect
	///
	/// # Examples
	///
	/// ```
	/// use automigrate_db::backends::SqlDialect;
	/// use automigrate_db::migrations::FieldType;
	///
	/// assert_eq!(FieldType::Boolean.to_sql_for_dialect(SqlDialect::Mysql), "TINYINT(1)");
	/// assert_eq!(FieldType::Json.to_sql_for_dialect(SqlDialect::Postgres), "JSONB");
	/// assert_eq!(FieldType::VarChar(40).to_sql_for_dialect(SqlDialect::Sqlite), "VARCHAR(40)");
	/// ```
	pub fn to_sql_for_dialect(&self, dialect: SqlDialect) -> String {
		match self {
			FieldType::Integer => match dialect {
				SqlDialect::Postgres | SqlDialect::Sqlite => "INTEGER".to_string(),
				SqlDialect::Mysql => "INT".to_string(),
			},
			FieldType::VarChar(length) => format!("VARCHAR({})", length),
			FieldType::Decimal { precision, scale } => match dialect {
				SqlDialect::Postgres => format!("NUMERIC({}, {})", precision, scale),
				SqlDialect::Mysql | SqlDialect::Sqlite => {
					format!("DECIMAL({}, {})", precision, scale)
				}
			},
			// SQLite keeps BOOLEAN as the declared type so the column reads back as bool
			FieldType::Boolean => match dialect {
				SqlDialect::Postgres | SqlDialect::Sqlite => "BOOLEAN".to_string(),
				SqlDialect::Mysql => "TINYINT(1)".to_string(),
			},
			FieldType::DateTime => match dialect {
				SqlDialect::Postgres => "TIMESTAMP".to_string(),
				SqlDialect::Mysql | SqlDialect::Sqlite => "DATETIME".to_string(),
			},
			FieldType::Json => match dialect {
				SqlDialect::Postgres => "JSONB".to_string(),
				SqlDialect::Mysql => "JSON".to_string(),
				SqlDialect::Sqlite => "TEXT".to_string(),
			},
		}
	}

	/// Short lowercase name used in summaries and log output
	pub fn logical_name(&self) -> String {
		match self {
			FieldType::Integer => "integer".to_string(),
			FieldType::VarChar(length) => format!("varchar({})", length),
			FieldType::Decimal { precision, scale } => format!("decimal({}, {})", precision, scale),
			FieldType::Boolean => "boolean".to_string(),
			FieldType::DateTime => "datetime".to_string(),
			FieldType::Json => "json".to_string(),
		}
	}

	pub fn is_integer(&self) -> bool {
		matches!(self, FieldType::Integer)
	}
}

impl std::fmt::Display for FieldType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.logical_name())
	}
}
