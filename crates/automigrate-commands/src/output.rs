//! Human-readable rendering of command results

use automigrate_db::migrations::{
	GenerationReport, MigrateReport, MigrationStatus, RollbackReport, StampReport, StatusEntry,
};
use colored::Colorize;
use std::fmt::Write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn render_status(status: &MigrationStatus) -> String {
	let mut out = String::new();

	let _ = writeln!(out, "{}", "Applied migrations:".bold());
	if status.applied.is_empty() {
		let _ = writeln!(out, "  (none)");
	}
	for entry in &status.applied {
		let applied_at = entry
			.applied_at
			.map(|at| at.format(TIMESTAMP_FORMAT).to_string())
			.unwrap_or_else(|| "unknown".to_string());
		let _ = writeln!(
			out,
			"  {} {}  {}",
			"[X]".green(),
			describe(entry),
			applied_at.dimmed()
		);
	}

	let _ = writeln!(out, "{}", "Pending migrations:".bold());
	if status.pending.is_empty() {
		let _ = writeln!(out, "  (none)");
	}
	for entry in &status.pending {
		let _ = writeln!(out, "  {} {}", "[ ]".yellow(), describe(entry));
	}

	out
}

fn describe(entry: &StatusEntry) -> String {
	let table = entry.table.as_deref().unwrap_or("?");
	if entry.description.is_empty() {
		format!("{} {} ({})", entry.version, entry.name, table)
	} else {
		format!(
			"{} {} ({}): {}",
			entry.version, entry.name, table, entry.description
		)
	}
}

pub fn render_migrate(report: &MigrateReport) -> String {
	if report.applied.is_empty() {
		return "No migrations to apply".to_string();
	}
	format!(
		"{} {}",
		format!("Applied {} migration(s):", report.applied.len())
			.green()
			.bold(),
		report.applied.join(", ")
	)
}

pub fn render_rollback(report: &RollbackReport) -> String {
	if report.rolled_back.is_empty() {
		return "No migrations to roll back".to_string();
	}
	format!(
		"{} {}",
		format!("Rolled back {} migration(s):", report.rolled_back.len())
			.green()
			.bold(),
		report.rolled_back.join(", ")
	)
}

pub fn render_stamp(report: &StampReport) -> String {
	let mut out = String::new();
	if report.marked.is_empty() && report.unmarked.is_empty() {
		out.push_str("History already matches");
		return out;
	}
	if !report.marked.is_empty() {
		let _ = write!(out, "Marked as applied: {}", report.marked.join(", "));
	}
	if !report.unmarked.is_empty() {
		if !out.is_empty() {
			out.push('\n');
		}
		let _ = write!(out, "Marked as pending: {}", report.unmarked.join(", "));
	}
	out
}

pub fn render_generation(report: &GenerationReport) -> String {
	let mut out = String::new();

	for warning in &report.warnings {
		let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), warning);
	}

	if report.is_empty() {
		let _ = writeln!(out, "No changes detected");
		return out;
	}

	let verb = if report.dry_run {
		"Would create"
	} else {
		"Created"
	};
	for migration in &report.migrations {
		let _ = writeln!(
			out,
			"{} {} {} ({})",
			verb.green().bold(),
			migration.version(),
			migration.name,
			migration.table_name
		);
		for operation in &migration.operations {
			let _ = writeln!(out, "    - {}", operation.summary());
		}
		if report.dry_run {
			for statement in &migration.up_sql {
				let _ = writeln!(out, "      {}", statement.dimmed());
			}
		}
	}

	out
}
