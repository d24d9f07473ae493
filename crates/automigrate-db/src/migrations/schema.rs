//! Table, column, index and foreign-key definitions
//!
//! These are the normalized shapes the analyzer produces and the differ
//! compares. They are plain values; every "change" produces a new value.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::fields::FieldType;

/// A single column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
	pub name: String,
	pub field_type: FieldType,
	pub nullable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<String>,
	#[serde(default)]
	pub primary_key: bool,
	#[serde(default)]
	pub auto_increment: bool,
	#[serde(default)]
	pub unique: bool,
	#[serde(default)]
	pub index: bool,
}

impl ColumnDefinition {
	/// Create a nullable, non-key column
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			nullable: true,
			default: None,
			primary_key: false,
			auto_increment: false,
			unique: false,
			index: false,
		}
	}

	/// Mark as primary key (which also makes it NOT NULL)
	pub fn primary_key(mut self) -> Self {
		self.primary_key = true;
		self.nullable = false;
		self
	}

	pub fn not_null(mut self) -> Self {
		self.nullable = false;
		self
	}

	pub fn nullable(mut self, nullable: bool) -> Self {
		self.nullable = nullable;
		self
	}

	pub fn default_value(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn auto_increment(mut self) -> Self {
		self.auto_increment = true;
		self
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}

	pub fn indexed(mut self) -> Self {
		self.index = true;
		self
	}

	/// Whether two columns would need a `ModifyColumn` to go from one to the other
	pub fn differs_from(&self, other: &ColumnDefinition) -> bool {
		self.field_type != other.field_type
			|| self.nullable != other.nullable
			|| self.default != other.default
			|| self.unique != other.unique
	}

	/// Whether the key flags differ. Migrations never change these on an
	/// existing column.
	pub fn key_differs_from(&self, other: &ColumnDefinition) -> bool {
		self.primary_key != other.primary_key || self.auto_increment != other.auto_increment
	}

	/// `self` with the key flags of `other`
	pub fn with_key_of(mut self, other: &ColumnDefinition) -> Self {
		self.primary_key = other.primary_key;
		self.auto_increment = other.auto_increment;
		self
	}
}

/// A named index over one or more columns
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
	pub name: String,
	pub columns: Vec<String>,
	#[serde(default)]
	pub unique: bool,
}

impl IndexDefinition {
	pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			name: name.into(),
			columns: columns.into_iter().map(Into::into).collect(),
			unique: false,
		}
	}

	pub fn unique(mut self, unique: bool) -> Self {
		self.unique = unique;
		self
	}

	pub fn covers(&self, column: &str) -> bool {
		self.columns.iter().any(|c| c == column)
	}
}

/// `column` references `referenced_table(referenced_column)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
	pub column: String,
	pub referenced_table: String,
	pub referenced_column: String,
}

impl ForeignKeyDefinition {
	pub fn new(
		column: impl Into<String>,
		referenced_table: impl Into<String>,
		referenced_column: impl Into<String>,
	) -> Self {
		Self {
			column: column.into(),
			referenced_table: referenced_table.into(),
			referenced_column: referenced_column.into(),
		}
	}
}

/// Normalized description of one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
	pub name: String,
	/// Columns in declaration order
	pub columns: Vec<ColumnDefinition>,
	#[serde(default)]
	pub indexes: Vec<IndexDefinition>,
	#[serde(default)]
	pub foreign_keys: Vec<ForeignKeyDefinition>,
	#[serde(default)]
	pub timestamps: bool,
}

impl TableDefinition {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			columns: Vec::new(),
			indexes: Vec::new(),
			foreign_keys: Vec::new(),
			timestamps: false,
		}
	}

	pub fn with_column(mut self, column: ColumnDefinition) -> Self {
		self.columns.push(column);
		self
	}

	pub fn with_index(mut self, index: IndexDefinition) -> Self {
		self.indexes.push(index);
		self
	}

	pub fn with_foreign_key(mut self, foreign_key: ForeignKeyDefinition) -> Self {
		self.foreign_keys.push(foreign_key);
		self
	}

	pub fn with_timestamps(mut self, timestamps: bool) -> Self {
		self.timestamps = timestamps;
		self
	}

	pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
		self.columns.iter().find(|c| c.name == name)
	}

	pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
		self.indexes.iter().find(|i| i.name == name)
	}

	pub fn has_column(&self, name: &str) -> bool {
		self.column(name).is_some()
	}

	pub fn primary_key_columns(&self) -> Vec<&ColumnDefinition> {
		self.columns.iter().filter(|c| c.primary_key).collect()
	}

	/// Tables this one references through foreign keys, excluding itself
	pub fn referenced_tables(&self) -> BTreeSet<&str> {
		self.foreign_keys
			.iter()
			.map(|fk| fk.referenced_table.as_str())
			.filter(|t| *t != self.name)
			.collect()
	}

	/// Order-insensitive comparison of what migrations can change.
	///
	/// Columns are compared by name on type, nullability, default and
	/// uniqueness; indexes are compared as a set. Column order, the per-column
	/// `index` flag, key flags, foreign keys and the `timestamps` flag are not
	/// significant. Changes to the latter are reported by
	/// [`SchemaDiffer::unsupported_changes`](super::SchemaDiffer::unsupported_changes).
	pub fn is_equivalent(&self, other: &TableDefinition) -> bool {
		if self.name != other.name || self.columns.len() != other.columns.len() {
			return false;
		}

		let theirs: BTreeMap<&str, &ColumnDefinition> = other
			.columns
			.iter()
			.map(|c| (c.name.as_str(), c))
			.collect();
		let columns_match = self.columns.iter().all(|column| {
			theirs
				.get(column.name.as_str())
				.is_some_and(|other_column| !column.differs_from(other_column))
		});

		let our_indexes: BTreeSet<&IndexDefinition> = self.indexes.iter().collect();
		let their_indexes: BTreeSet<&IndexDefinition> = other.indexes.iter().collect();

		columns_match && our_indexes == their_indexes
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn users() -> TableDefinition {
		TableDefinition::new("users")
			.with_column(ColumnDefinition::new("id", FieldType::Integer).primary_key())
			.with_column(ColumnDefinition::new("name", FieldType::VarChar(255)))
			.with_index(IndexDefinition::new("users_name_idx", ["name"]))
	}

	#[rstest]
	fn test_equivalence_ignores_column_order() {
		let mut reordered = users();
		reordered.columns.reverse();
		assert!(users().is_equivalent(&reordered));
		assert_ne!(users(), reordered);
	}

	#[rstest]
	fn test_equivalence_detects_nullability_change() {
		let mut changed = users();
		changed.columns[1].nullable = false;
		assert!(!users().is_equivalent(&changed));
	}

	#[rstest]
	fn test_equivalence_ignores_index_flag() {
		let mut flagged = users();
		flagged.columns[1].index = true;
		assert!(users().is_equivalent(&flagged));
	}

	#[rstest]
	fn test_equivalence_compares_indexes_as_sets() {
		let mut without_index = users();
		without_index.indexes.clear();
		assert!(!users().is_equivalent(&without_index));
	}

	#[rstest]
	fn test_equivalence_ignores_flags_migrations_do_not_change() {
		let mut changed = users().with_timestamps(true);
		changed.columns[0].auto_increment = true;
		changed.columns[1].primary_key = true;
		let changed = changed.with_foreign_key(ForeignKeyDefinition::new("name", "names", "id"));
		assert!(users().is_equivalent(&changed));
	}

	#[rstest]
	fn test_with_key_of_copies_only_key_flags() {
		let old = ColumnDefinition::new("id", FieldType::Integer).primary_key();
		let new = ColumnDefinition::new("id", FieldType::VarChar(36)).not_null();

		let target = new.clone().with_key_of(&old);

		assert!(target.primary_key && !target.auto_increment);
		assert_eq!(target.field_type, FieldType::VarChar(36));
		assert!(new.key_differs_from(&old));
		assert!(!target.key_differs_from(&old));
	}

	#[rstest]
	fn test_referenced_tables_skips_self_reference() {
		let table = TableDefinition::new("comments")
			.with_column(ColumnDefinition::new("post_id", FieldType::Integer))
			.with_column(ColumnDefinition::new("parent_id", FieldType::Integer))
			.with_foreign_key(ForeignKeyDefinition::new("post_id", "posts", "id"))
			.with_foreign_key(ForeignKeyDefinition::new("parent_id", "comments", "id"));
		let referenced: Vec<&str> = table.referenced_tables().into_iter().collect();
		assert_eq!(referenced, vec!["posts"]);
	}

	#[rstest]
	fn test_primary_key_builder_forces_not_null() {
		let column = ColumnDefinition::new("id", FieldType::Integer).primary_key();
		assert!(column.primary_key);
		assert!(!column.nullable);
	}
}
