//! Change detection and migration planning
//!
//! Compares every registered model with the snapshot stored in the latest
//! artifact for its table and turns the differences into migrations. Nothing
//! here talks to the database.

use chrono::Utc;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::analyzer::{AnalysisWarning, ModelAnalyzer};
use super::generator::MigrationGenerator;
use super::migration::Migration;
use super::model::ModelRegistry;
use super::operations::{MigrationOperation, apply_all};
use super::repository::MigrationRepository;
use super::schema::TableDefinition;
use super::schema_diff::SchemaDiffer;
use super::{MigrationError, Result};
use crate::backends::SqlDialect;
use crate::conf::AnalyzerSettings;

const DEFAULT_DESCRIPTION: &str = "auto";

/// Operations planned for one table
#[derive(Debug, Clone, PartialEq)]
pub struct TableChanges {
	pub table: String,
	pub operations: Vec<MigrationOperation>,
	/// Table shape once the operations are applied
	pub snapshot: Option<TableDefinition>,
}

/// Result of comparing the registry with the recorded snapshots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectedChanges {
	/// Changed tables in apply order
	pub tables: Vec<TableChanges>,
	pub warnings: Vec<AnalysisWarning>,
}

impl DetectedChanges {
	pub fn is_empty(&self) -> bool {
		self.tables.is_empty()
	}

	pub fn operation_count(&self) -> usize {
		self.tables.iter().map(|t| t.operations.len()).sum()
	}
}

/// Migrations produced by a `generate` run
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
	pub dry_run: bool,
	pub migrations: Vec<Migration>,
	pub warnings: Vec<AnalysisWarning>,
}

impl GenerationReport {
	pub fn is_empty(&self) -> bool {
		self.migrations.is_empty()
	}
}

pub struct MigrationPlanner {
	repository: Arc<dyn MigrationRepository>,
	analyzer: ModelAnalyzer,
	generator: MigrationGenerator,
}

impl MigrationPlanner {
	pub fn new(
		repository: Arc<dyn MigrationRepository>,
		dialect: SqlDialect,
		analyzer_settings: AnalyzerSettings,
	) -> Self {
		Self {
			generator: MigrationGenerator::new(repository.clone(), dialect),
			analyzer: ModelAnalyzer::new(analyzer_settings),
			repository,
		}
	}

	pub fn dialect(&self) -> SqlDialect {
		self.generator.dialect()
	}

	/// All artifacts, rejecting any written for another dialect
	pub async fn load_migrations(&self) -> Result<Vec<Migration>> {
		let migrations = self.repository.list().await?;
		if let Some(foreign) = migrations.iter().find(|m| m.dialect != self.dialect()) {
			return Err(MigrationError::ConfigurationError(format!(
				"migration {} ({}) was generated for {} but the engine targets {}",
				foreign.version(),
				foreign.name,
				foreign.dialect,
				self.dialect()
			)));
		}
		Ok(migrations)
	}

	pub async fn detect_changes(&self, registry: &ModelRegistry) -> Result<DetectedChanges> {
		let migrations = self.load_migrations().await?;

		// Artifacts are ascending, so the last write per table wins
		let mut snapshots: BTreeMap<String, Option<TableDefinition>> = BTreeMap::new();
		for migration in &migrations {
			snapshots.insert(migration.table_name.clone(), migration.snapshot.clone());
		}

		let mut warnings = Vec::new();
		let mut current: Vec<TableDefinition> = Vec::with_capacity(registry.len());
		let mut seen = HashSet::new();
		for model in registry.iter() {
			let (table, model_warnings) = self.analyzer.analyze_detailed(model)?;
			if !seen.insert(table.name.clone()) {
				return Err(MigrationError::AnalysisError(format!(
					"table {} is registered by more than one model",
					table.name
				)));
			}
			warnings.extend(model_warnings);
			current.push(table);
		}

		let mut changed: HashMap<String, TableChanges> = HashMap::new();
		for table in &current {
			let previous = snapshots.get(&table.name).and_then(Option::as_ref);
			let operations = SchemaDiffer::diff(previous, table)?;
			if let Some(previous) = previous {
				warnings.extend(SchemaDiffer::unsupported_changes(previous, table));
			}
			if operations.is_empty() {
				continue;
			}
			// Snapshot what the migration builds, not the model
			let snapshot = apply_all(&operations, previous.cloned()).map(|mut snapshot| {
				snapshot.timestamps = table.timestamps;
				snapshot
			});
			changed.insert(
				table.name.clone(),
				TableChanges {
					table: table.name.clone(),
					operations,
					snapshot,
				},
			);
		}

		let mut tables: Vec<TableChanges> = creation_order(&current)
			.into_iter()
			.filter_map(|name| changed.remove(&name))
			.collect();

		let dropped: Vec<TableDefinition> = snapshots
			.into_values()
			.flatten()
			.filter(|snapshot| !seen.contains(&snapshot.name))
			.collect();
		for name in creation_order(&dropped).into_iter().rev() {
			if let Some(table) = dropped.iter().find(|t| t.name == name) {
				tables.push(TableChanges {
					table: name,
					operations: SchemaDiffer::diff_drop(table),
					snapshot: None,
				});
			}
		}

		Ok(DetectedChanges { tables, warnings })
	}

	/// Plan migrations for every changed table and persist them unless
	/// `dry_run` is set.
	///
	/// All migrations are built and checked before the first one is written.
	pub async fn generate(
		&self,
		registry: &ModelRegistry,
		name: Option<&str>,
		dry_run: bool,
	) -> Result<GenerationReport> {
		let changes = self.detect_changes(registry).await?;
		let description = name.unwrap_or(DEFAULT_DESCRIPTION);
		let first_sequence = self.generator.next_sequence().await?;
		let created_at = Utc::now();

		let mut migrations = Vec::with_capacity(changes.tables.len());
		for (offset, change) in changes.tables.into_iter().enumerate() {
			let migration = self.generator.build(
				&change.table,
				change.operations,
				description,
				change.snapshot,
				first_sequence + offset as u64,
				created_at,
			)?;
			self.generator.check_duplicate(&migration).await?;
			migrations.push(migration);
		}

		if dry_run {
			tracing::info!(count = migrations.len(), "Dry run, nothing written");
		} else {
			for migration in &migrations {
				self.repository.save(migration).await?;
				tracing::info!(
					version = %migration.version(),
					name = %migration.name,
					"Generated migration"
				);
			}
		}

		Ok(GenerationReport {
			dry_run,
			migrations,
			warnings: changes.warnings,
		})
	}
}

/// Table names ordered so referenced tables come before the tables that
/// reference them. Falls back to name order when the references form a cycle.
fn creation_order(tables: &[TableDefinition]) -> Vec<String> {
	let mut by_name: Vec<&TableDefinition> = tables.iter().collect();
	by_name.sort_by(|a, b| a.name.cmp(&b.name));

	let mut graph: DiGraph<&str, ()> = DiGraph::new();
	let nodes: HashMap<&str, NodeIndex> = by_name
		.iter()
		.map(|t| (t.name.as_str(), graph.add_node(t.name.as_str())))
		.collect();
	for table in &by_name {
		for referenced in table.referenced_tables() {
			if let Some(&from) = nodes.get(referenced) {
				graph.add_edge(from, nodes[table.name.as_str()], ());
			}
		}
	}

	match toposort(&graph, None) {
		Ok(order) => order.into_iter().map(|n| graph[n].to_string()).collect(),
		Err(cycle) => {
			tracing::warn!(
				table = %graph[cycle.node_id()],
				"Foreign keys form a cycle; ordering tables by name"
			);
			by_name.iter().map(|t| t.name.clone()).collect()
		}
	}
}
