//! Dialect-specific DDL rendering
//!
//! Renders [`MigrationOperation`]s into SQL statements. Rendering is pure; the
//! same operation and dialect always produce the same statements.
//!
//! Unique columns are handled per dialect:
//!
//! - PostgreSQL: inline `UNIQUE`, which PostgreSQL names `<table>_<column>_key`
//! - MySQL: inline `UNIQUE`, which MySQL names after the column
//! - SQLite: a separate `CREATE UNIQUE INDEX <table>_<column>_key`, since
//!   SQLite cannot drop inline constraints or add unique columns

use super::fields::FieldType;
use super::operations::{MigrationOperation, reverse_all};
use super::schema::{ColumnDefinition, IndexDefinition, TableDefinition};
use super::{MigrationError, Result};
use crate::backends::SqlDialect;

/// Words quoted in every dialect even when written in plain lower case
const RESERVED_WORDS: &[&str] = &[
	"add", "all", "alter", "and", "any", "as", "asc", "between", "both", "by", "case", "cast",
	"check", "column", "constraint", "create", "cross", "current_date", "current_time",
	"current_timestamp", "current_user", "database", "default", "delete", "desc", "distinct",
	"drop", "else", "end", "except", "exists", "false", "fetch", "for", "foreign", "from", "full",
	"grant", "group", "having", "in", "index", "inner", "insert", "intersect", "into", "is",
	"join", "key", "keys", "leading", "left", "like", "limit", "natural", "not", "null", "offset",
	"on", "or", "order", "outer", "primary", "range", "references", "rename", "replace", "revoke",
	"right", "row", "rows", "schema", "select", "session_user", "set", "table", "then", "to",
	"trailing", "true", "union", "unique", "update", "user", "using", "values", "when", "where",
	"window", "with",
];

fn is_plain_identifier(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Quote `name` for `dialect` unless it is a plain, non-reserved lower-case word.
///
/// ```
/// use automigrate_db::backends::SqlDialect;
/// use automigrate_db::migrations::quote_identifier;
///
/// assert_eq!(quote_identifier("users", SqlDialect::Postgres), "users");
/// assert_eq!(quote_identifier("user", SqlDialect::Postgres), "\"user\"");
/// assert_eq!(quote_identifier("createdAt", SqlDialect::Mysql), "`createdAt`");
/// ```
pub fn quote_identifier(name: &str, dialect: SqlDialect) -> String {
	if is_plain_identifier(name) && !RESERVED_WORDS.contains(&name) {
		return name.to_string();
	}
	let quote = dialect.quote_char();
	let escaped = name.replace(quote, &format!("{}{}", quote, quote));
	format!("{}{}{}", quote, escaped, quote)
}

/// Name of the unique constraint or index backing `column.unique`
pub fn unique_key_name(table: &str, column: &str) -> String {
	format!("{}_{}_key", table, column)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlGenerator {
	dialect: SqlDialect,
}

impl SqlGenerator {
	pub fn new(dialect: SqlDialect) -> Self {
		Self { dialect }
	}

	pub fn dialect(&self) -> SqlDialect {
		self.dialect
	}

	/// Render one operation
	///
	/// # Examples
	///
	/// ```
	/// use automigrate_db::backends::SqlDialect;
	/// use automigrate_db::migrations::{
	///     ColumnDefinition, FieldType, MigrationOperation, SqlGenerator, TableDefinition,
	/// };
	///
	/// let table = TableDefinition::new("users")
	///     .with_column(ColumnDefinition::new("id", FieldType::Integer).primary_key())
	///     .with_column(ColumnDefinition::new("name", FieldType::VarChar(255)));
	///
	/// let sql = SqlGenerator::new(SqlDialect::Postgres)
	///     .render(&MigrationOperation::CreateTable { table })
	///     .unwrap();
	/// assert_eq!(sql, vec!["CREATE TABLE users (id INTEGER PRIMARY KEY, name VARCHAR(255));"]);
	/// ```
	pub fn render(&self, operation: &MigrationOperation) -> Result<Vec<String>> {
		match operation {
			MigrationOperation::CreateTable { table } => Ok(self.create_table(table)),
			MigrationOperation::DropTable { table } => {
				Ok(vec![format!("DROP TABLE {};", self.quote(&table.name))])
			}
			MigrationOperation::AddColumn { table, column } => {
				let mut statements = vec![format!(
					"ALTER TABLE {} ADD COLUMN {};",
					self.quote(table),
					self.column_clause(column, true)
				)];
				if self.dialect == SqlDialect::Sqlite && column.unique && !column.primary_key {
					statements.push(self.create_unique_key(table, &column.name));
				}
				Ok(statements)
			}
			MigrationOperation::DropColumn { table, column } => {
				let mut statements = Vec::new();
				if self.dialect == SqlDialect::Sqlite && column.unique && !column.primary_key {
					statements.push(format!(
						"DROP INDEX IF EXISTS {};",
						self.quote(&unique_key_name(table, &column.name))
					));
				}
				statements.push(format!(
					"ALTER TABLE {} DROP COLUMN {};",
					self.quote(table),
					self.quote(&column.name)
				));
				Ok(statements)
			}
			MigrationOperation::ModifyColumn { table, old, new } => {
				self.modify_column(table, old, new)
			}
			MigrationOperation::CreateIndex { table, index } => {
				Ok(vec![self.create_index(table, index)])
			}
			MigrationOperation::DropIndex { table, index } => Ok(vec![match self.dialect {
				SqlDialect::Mysql => format!(
					"DROP INDEX {} ON {};",
					self.quote(&index.name),
					self.quote(table)
				),
				SqlDialect::Postgres | SqlDialect::Sqlite => {
					format!("DROP INDEX {};", self.quote(&index.name))
				}
			}]),
		}
	}

	/// Render operations in order
	pub fn render_all(&self, operations: &[MigrationOperation]) -> Result<Vec<String>> {
		let mut statements = Vec::new();
		for operation in operations {
			statements.extend(self.render(operation)?);
		}
		Ok(statements)
	}

	/// Render the statements undoing `operations`
	pub fn render_down(&self, operations: &[MigrationOperation]) -> Result<Vec<String>> {
		self.render_all(&reverse_all(operations))
	}

	/// Column definition as used inside `CREATE TABLE` or `ADD COLUMN`
	pub fn column_sql(&self, column: &ColumnDefinition) -> String {
		self.column_clause(column, true)
	}

	fn quote(&self, name: &str) -> String {
		quote_identifier(name, self.dialect)
	}

	fn inline_unique(&self) -> bool {
		self.dialect != SqlDialect::Sqlite
	}

	fn column_type(&self, column: &ColumnDefinition) -> String {
		let auto_increment = column.auto_increment && column.field_type.is_integer();
		match (auto_increment, self.dialect) {
			(true, SqlDialect::Postgres) => "SERIAL".to_string(),
			(true, SqlDialect::Mysql) => "INT AUTO_INCREMENT".to_string(),
			_ => column.field_type.to_sql_for_dialect(self.dialect),
		}
	}

	fn column_clause(&self, column: &ColumnDefinition, inline_primary_key: bool) -> String {
		let mut parts = vec![self.quote(&column.name), self.column_type(column)];
		let inline_pk = column.primary_key && inline_primary_key;

		if inline_pk {
			parts.push("PRIMARY KEY".to_string());
			if self.dialect == SqlDialect::Sqlite
				&& column.auto_increment
				&& column.field_type == FieldType::Integer
			{
				parts.push("AUTOINCREMENT".to_string());
			}
		}
		if !column.nullable && !inline_pk {
			parts.push("NOT NULL".to_string());
		}
		if column.unique && !column.primary_key && self.inline_unique() {
			parts.push("UNIQUE".to_string());
		}
		if let Some(default) = &column.default {
			parts.push(format!("DEFAULT {}", default));
		}

		parts.join(" ")
	}

	fn create_table(&self, table: &TableDefinition) -> Vec<String> {
		let primary_keys = table.primary_key_columns();
		let inline_pk = primary_keys.len() == 1;

		let mut definitions: Vec<String> = table
			.columns
			.iter()
			.map(|column| self.column_clause(column, inline_pk))
			.collect();

		if primary_keys.len() > 1 {
			let columns: Vec<String> = primary_keys.iter().map(|c| self.quote(&c.name)).collect();
			definitions.push(format!("PRIMARY KEY ({})", columns.join(", ")));
		}
		for fk in &table.foreign_keys {
			definitions.push(format!(
				"FOREIGN KEY ({}) REFERENCES {} ({})",
				self.quote(&fk.column),
				self.quote(&fk.referenced_table),
				self.quote(&fk.referenced_column)
			));
		}

		let mut statements = vec![format!(
			"CREATE TABLE {} ({});",
			self.quote(&table.name),
			definitions.join(", ")
		)];

		if !self.inline_unique() {
			for column in table.columns.iter().filter(|c| c.unique && !c.primary_key) {
				statements.push(self.create_unique_key(&table.name, &column.name));
			}
		}
		for index in &table.indexes {
			statements.push(self.create_index(&table.name, index));
		}

		statements
	}

	fn create_index(&self, table: &str, index: &IndexDefinition) -> String {
		let columns: Vec<String> = index.columns.iter().map(|c| self.quote(c)).collect();
		format!(
			"CREATE {}INDEX {} ON {} ({});",
			if index.unique { "UNIQUE " } else { "" },
			self.quote(&index.name),
			self.quote(table),
			columns.join(", ")
		)
	}

	fn create_unique_key(&self, table: &str, column: &str) -> String {
		format!(
			"CREATE UNIQUE INDEX {} ON {} ({});",
			self.quote(&unique_key_name(table, column)),
			self.quote(table),
			self.quote(column)
		)
	}

	fn modify_column(
		&self,
		table: &str,
		old: &ColumnDefinition,
		new: &ColumnDefinition,
	) -> Result<Vec<String>> {
		if old.name != new.name {
			return Err(MigrationError::GenerationError(format!(
				"cannot modify {}.{} into differently named column {}",
				table, old.name, new.name
			)));
		}

		let type_changed = old.field_type != new.field_type;
		let nullable_changed = old.nullable != new.nullable;
		let default_changed = old.default != new.default;
		let unique_changed = old.unique != new.unique;

		let t = self.quote(table);
		let c = self.quote(&new.name);
		let mut statements = Vec::new();

		match self.dialect {
			SqlDialect::Postgres => {
				if type_changed {
					statements.push(format!(
						"ALTER TABLE {} ALTER COLUMN {} TYPE {};",
						t,
						c,
						new.field_type.to_sql_for_dialect(self.dialect)
					));
				}
				if nullable_changed {
					let action = if new.nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
					statements.push(format!("ALTER TABLE {} ALTER COLUMN {} {};", t, c, action));
				}
				if default_changed {
					let action = match &new.default {
						Some(default) => format!("SET DEFAULT {}", default),
						None => "DROP DEFAULT".to_string(),
					};
					statements.push(format!("ALTER TABLE {} ALTER COLUMN {} {};", t, c, action));
				}
				if unique_changed {
					let key = self.quote(&unique_key_name(table, &new.name));
					statements.push(if new.unique {
						format!("ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({});", t, key, c)
					} else {
						format!("ALTER TABLE {} DROP CONSTRAINT {};", t, key)
					});
				}
			}
			SqlDialect::Mysql => {
				if type_changed || nullable_changed || default_changed {
					let mut definition = new.clone();
					definition.unique = false;
					statements.push(format!(
						"ALTER TABLE {} MODIFY COLUMN {};",
						t,
						self.column_clause(&definition, false)
					));
				}
				if unique_changed {
					statements.push(if new.unique {
						format!("ALTER TABLE {} ADD UNIQUE ({});", t, c)
					} else {
						format!("ALTER TABLE {} DROP INDEX {};", t, c)
					});
				}
			}
			SqlDialect::Sqlite => {
				if type_changed || nullable_changed || default_changed {
					let mut aspects = Vec::new();
					if type_changed {
						aspects.push(format!("type {} -> {}", old.field_type, new.field_type));
					}
					if nullable_changed {
						aspects.push(format!("nullable {} -> {}", old.nullable, new.nullable));
					}
					if default_changed {
						aspects.push("default".to_string());
					}
					return Err(MigrationError::GenerationError(format!(
						"SQLite cannot alter column {}.{} in place ({}); rebuild the table manually",
						table,
						new.name,
						aspects.join(", ")
					)));
				}
				if unique_changed {
					statements.push(if new.unique {
						self.create_unique_key(table, &new.name)
					} else {
						format!(
							"DROP INDEX {};",
							self.quote(&unique_key_name(table, &new.name))
						)
					});
				}
			}
		}

		Ok(statements)
	}
}

/// Render one operation for `dialect`
pub fn render(operation: &MigrationOperation, dialect: SqlDialect) -> Result<Vec<String>> {
	SqlGenerator::new(dialect).render(operation)
}
