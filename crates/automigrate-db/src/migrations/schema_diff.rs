//! Schema diffing
//!
//! Compares the last recorded shape of a table with the shape derived from the
//! current model and emits the operations that turn one into the other.
//!
//! Operations come out in a fixed order so that the same pair of tables always
//! produces the same list:
//!
//! 1. `CreateTable`
//! 2. `AddColumn`
//! 3. `ModifyColumn`
//! 4. `DropIndex`
//! 5. `CreateIndex`
//! 6. `DropColumn`
//! 7. `DropTable`
//!
//! Within each group operations are sorted by column or index name.
//!
//! Primary-key, auto-increment and foreign-key changes on an existing table
//! produce no operation. [`SchemaDiffer::unsupported_changes`] lists them so
//! callers can report them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::analyzer::AnalysisWarning;
use super::operations::MigrationOperation;
use super::schema::{ColumnDefinition, IndexDefinition, TableDefinition};
use super::{MigrationError, Result};

/// Stateless table differ
pub struct SchemaDiffer;

impl SchemaDiffer {
	/// Compute the operations turning `old` into `new`.
	///
	/// # Examples
	///
	/// ```
	/// use automigrate_db::migrations::{
	///     ColumnDefinition, FieldType, MigrationOperation, SchemaDiffer, TableDefinition,
	/// };
	///
	/// let users = TableDefinition::new("users")
	///     .with_column(ColumnDefinition::new("id", FieldType::Integer).primary_key());
	///
	/// let ops = SchemaDiffer::diff(None, &users).unwrap();
	/// assert!(matches!(ops[0], MigrationOperation::CreateTable { .. }));
	/// assert!(SchemaDiffer::diff(Some(&users), &users).unwrap().is_empty());
	/// ```
	pub fn diff(
		old: Option<&TableDefinition>,
		new: &TableDefinition,
	) -> Result<Vec<MigrationOperation>> {
		check_case_collisions(new)?;

		let old = match old {
			None => {
				return Ok(vec![MigrationOperation::CreateTable { table: new.clone() }]);
			}
			Some(old) => old,
		};

		check_case_collisions(old)?;
		if old.name != new.name {
			return Err(MigrationError::DiffError(format!(
				"cannot diff table '{}' against table '{}'",
				old.name, new.name
			)));
		}

		let table = new.name.clone();
		let old_columns: BTreeMap<&str, &ColumnDefinition> =
			old.columns.iter().map(|c| (c.name.as_str(), c)).collect();
		let new_columns: BTreeMap<&str, &ColumnDefinition> =
			new.columns.iter().map(|c| (c.name.as_str(), c)).collect();

		let mut operations = Vec::new();

		for (name, new_column) in &new_columns {
			if !old_columns.contains_key(name) {
				operations.push(MigrationOperation::AddColumn {
					table: table.clone(),
					column: (*new_column).clone(),
				});
			}
		}

		for (name, new_column) in &new_columns {
			if let Some(old_column) = old_columns.get(name)
				&& old_column.differs_from(new_column)
			{
				operations.push(MigrationOperation::ModifyColumn {
					table: table.clone(),
					old: (*old_column).clone(),
					new: (*new_column).clone().with_key_of(old_column),
				});
			}
		}

		let old_indexes: BTreeMap<&str, &IndexDefinition> =
			old.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
		let new_indexes: BTreeMap<&str, &IndexDefinition> =
			new.indexes.iter().map(|i| (i.name.as_str(), i)).collect();

		for (name, old_index) in &old_indexes {
			let replaced = new_indexes.get(name).is_some_and(|new_index| new_index != old_index);
			if !new_indexes.contains_key(name) || replaced {
				operations.push(MigrationOperation::DropIndex {
					table: table.clone(),
					index: (*old_index).clone(),
				});
			}
		}

		for (name, new_index) in &new_indexes {
			let replaced = old_indexes.get(name).is_some_and(|old_index| old_index != new_index);
			if !old_indexes.contains_key(name) || replaced {
				operations.push(MigrationOperation::CreateIndex {
					table: table.clone(),
					index: (*new_index).clone(),
				});
			}
		}

		for (name, old_column) in &old_columns {
			if !new_columns.contains_key(name) {
				operations.push(MigrationOperation::DropColumn {
					table: table.clone(),
					column: (*old_column).clone(),
				});
			}
		}

		for change in Self::unsupported_changes(old, new) {
			tracing::warn!(
				table = %change.table,
				column = %change.field,
				"{}; no migration generated",
				change.message
			);
		}

		Ok(operations)
	}

	/// Changes between `old` and `new` that [`SchemaDiffer::diff`] does not
	/// turn into operations, one warning per column or foreign key
	pub fn unsupported_changes(old: &TableDefinition, new: &TableDefinition) -> Vec<AnalysisWarning> {
		let old_columns: BTreeMap<&str, &ColumnDefinition> =
			old.columns.iter().map(|c| (c.name.as_str(), c)).collect();

		let mut warnings = Vec::new();
		let warn = |field: &str, message: String| AnalysisWarning {
			table: new.name.clone(),
			field: field.to_string(),
			message,
		};

		let mut new_columns: Vec<&ColumnDefinition> = new.columns.iter().collect();
		new_columns.sort_by(|a, b| a.name.cmp(&b.name));
		for column in new_columns {
			let Some(old_column) = old_columns.get(column.name.as_str()) else {
				continue;
			};
			if old_column.primary_key != column.primary_key {
				warnings.push(warn(
					&column.name,
					format!(
						"primary key changed from {} to {} on an existing column",
						old_column.primary_key, column.primary_key
					),
				));
			}
			if old_column.auto_increment != column.auto_increment {
				warnings.push(warn(
					&column.name,
					format!(
						"auto-increment changed from {} to {} on an existing column",
						old_column.auto_increment, column.auto_increment
					),
				));
			}
		}

		let old_fks: BTreeSet<_> = old.foreign_keys.iter().collect();
		let new_fks: BTreeSet<_> = new.foreign_keys.iter().collect();
		for fk in new_fks.difference(&old_fks) {
			warnings.push(warn(
				&fk.column,
				format!(
					"foreign key to {}.{} added on an existing table",
					fk.referenced_table, fk.referenced_column
				),
			));
		}
		for fk in old_fks.difference(&new_fks) {
			// A dropped column takes its foreign key with it
			if new.has_column(&fk.column) {
				warnings.push(warn(
					&fk.column,
					format!(
						"foreign key to {}.{} removed on an existing table",
						fk.referenced_table, fk.referenced_column
					),
				));
			}
		}

		warnings
	}

	/// Operations removing a table that no longer has a model
	pub fn diff_drop(old: &TableDefinition) -> Vec<MigrationOperation> {
		vec![MigrationOperation::DropTable { table: old.clone() }]
	}

	/// Whether applying `operations` can lose data
	pub fn has_destructive_changes(operations: &[MigrationOperation]) -> bool {
		operations.iter().any(MigrationOperation::is_destructive)
	}
}

fn check_case_collisions(table: &TableDefinition) -> Result<()> {
	let mut seen: HashMap<String, &str> = HashMap::new();
	for column in &table.columns {
		if let Some(previous) = seen.insert(column.name.to_lowercase(), &column.name) {
			return Err(MigrationError::DiffError(format!(
				"columns '{}' and '{}' in table '{}' differ only by case",
				previous, column.name, table.name
			)));
		}
	}
	Ok(())
}
