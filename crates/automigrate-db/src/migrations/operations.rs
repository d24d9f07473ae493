//! Structural migration operations
//!
//! Operations are pure data. Each carries enough of the previous shape to be
//! reversed, so down-migrations never need to consult the database.

use serde::{Deserialize, Serialize};

use super::schema::{ColumnDefinition, IndexDefinition, TableDefinition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MigrationOperation {
	CreateTable {
		table: TableDefinition,
	},
	AddColumn {
		table: String,
		column: ColumnDefinition,
	},
	/// `column` is the full definition being removed
	DropColumn {
		table: String,
		column: ColumnDefinition,
	},
	ModifyColumn {
		table: String,
		old: ColumnDefinition,
		new: ColumnDefinition,
	},
	/// `table` is the full definition being removed
	DropTable {
		table: TableDefinition,
	},
	CreateIndex {
		table: String,
		index: IndexDefinition,
	},
	DropIndex {
		table: String,
		index: IndexDefinition,
	},
}

impl MigrationOperation {
	pub fn table_name(&self) -> &str {
		match self {
			MigrationOperation::CreateTable { table } | MigrationOperation::DropTable { table } => {
				&table.name
			}
			MigrationOperation::AddColumn { table, .. }
			| MigrationOperation::DropColumn { table, .. }
			| MigrationOperation::ModifyColumn { table, .. }
			| MigrationOperation::CreateIndex { table, .. }
			| MigrationOperation::DropIndex { table, .. } => table,
		}
	}

	/// One-line human readable description
	pub fn summary(&self) -> String {
		match self {
			MigrationOperation::CreateTable { table } => format!("create table {}", table.name),
			MigrationOperation::AddColumn { table, column } => {
				format!("add column {}.{}", table, column.name)
			}
			MigrationOperation::DropColumn { table, column } => {
				format!("drop column {}.{}", table, column.name)
			}
			MigrationOperation::ModifyColumn { table, new, .. } => {
				format!("modify column {}.{}", table, new.name)
			}
			MigrationOperation::DropTable { table } => format!("drop table {}", table.name),
			MigrationOperation::CreateIndex { index, .. } => format!("create index {}", index.name),
			MigrationOperation::DropIndex { index, .. } => format!("drop index {}", index.name),
		}
	}

	pub fn is_destructive(&self) -> bool {
		matches!(
			self,
			MigrationOperation::DropColumn { .. } | MigrationOperation::DropTable { .. }
		)
	}

	/// The operation undoing this one
	pub fn reverse(&self) -> MigrationOperation {
		match self.clone() {
			MigrationOperation::CreateTable { table } => MigrationOperation::DropTable { table },
			MigrationOperation::DropTable { table } => MigrationOperation::CreateTable { table },
			MigrationOperation::AddColumn { table, column } => {
				MigrationOperation::DropColumn { table, column }
			}
			MigrationOperation::DropColumn { table, column } => {
				MigrationOperation::AddColumn { table, column }
			}
			MigrationOperation::ModifyColumn { table, old, new } => {
				MigrationOperation::ModifyColumn {
					table,
					old: new,
					new: old,
				}
			}
			MigrationOperation::CreateIndex { table, index } => {
				MigrationOperation::DropIndex { table, index }
			}
			MigrationOperation::DropIndex { table, index } => {
				MigrationOperation::CreateIndex { table, index }
			}
		}
	}

	/// Apply this operation to an in-memory table shape.
	///
	/// `None` means the table does not exist. Operations that target a
	/// missing table or column leave the state unchanged.
	pub fn apply_to(&self, state: Option<TableDefinition>) -> Option<TableDefinition> {
		match self {
			MigrationOperation::CreateTable { table } => Some(table.clone()),
			MigrationOperation::DropTable { .. } => None,
			MigrationOperation::AddColumn { column, .. } => state.map(|mut table| {
				if !table.has_column(&column.name) {
					table.columns.push(column.clone());
				}
				table
			}),
			MigrationOperation::DropColumn { column, .. } => state.map(|mut table| {
				table.columns.retain(|c| c.name != column.name);
				table.indexes.retain(|i| !i.covers(&column.name));
				table.foreign_keys.retain(|fk| fk.column != column.name);
				table
			}),
			MigrationOperation::ModifyColumn { new, .. } => state.map(|mut table| {
				if let Some(existing) = table.columns.iter_mut().find(|c| c.name == new.name) {
					*existing = new.clone();
				}
				table
			}),
			MigrationOperation::CreateIndex { index, .. } => state.map(|mut table| {
				table.indexes.retain(|i| i.name != index.name);
				table.indexes.push(index.clone());
				table
			}),
			MigrationOperation::DropIndex { index, .. } => state.map(|mut table| {
				table.indexes.retain(|i| i.name != index.name);
				table
			}),
		}
	}
}

/// Fold `operations` over `state` in order
pub fn apply_all(
	operations: &[MigrationOperation],
	state: Option<TableDefinition>,
) -> Option<TableDefinition> {
	operations.iter().fold(state, |state, op| op.apply_to(state))
}

/// Reverse operations in reverse order
pub fn reverse_all(operations: &[MigrationOperation]) -> Vec<MigrationOperation> {
	operations.iter().rev().map(MigrationOperation::reverse).collect()
}
