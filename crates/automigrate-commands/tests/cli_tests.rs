//! End-to-end command tests against temporary SQLite databases
//!
//! Every test goes through `run`, which reads `AUTOMIGRATE_*` variables, so
//! they are serialized with the one test that sets them.

use automigrate_commands::{Cli, resolve_settings, run};
use automigrate_db::conf::{ENV_DATABASE_URL, ENV_MIGRATIONS_DIR, MigrationSettings};
use automigrate_db::migrations::{
	FieldDescription, MigrationArtifact, MigrationEngine, MigrationStatus, ModelDescription,
	ModelRegistry,
};
use clap::Parser;
use rstest::*;
use serial_test::serial;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn automigrate_bin() -> PathBuf {
	PathBuf::from(env!("CARGO_BIN_EXE_automigrate"))
}

struct Workspace {
	dir: TempDir,
}

impl Workspace {
	fn database_url(&self) -> String {
		format!("sqlite://{}?mode=rwc", self.dir.path().join("app.db").display())
	}

	fn migrations_dir(&self) -> PathBuf {
		self.dir.path().join("migrations")
	}

	fn cli(&self, args: &[&str]) -> Cli {
		let url = self.database_url();
		let dir = self.migrations_dir();
		let mut argv = vec![
			"automigrate",
			"--database-url",
			url.as_str(),
			"--migrations-dir",
			dir.to_str().unwrap(),
		];
		argv.extend_from_slice(args);
		Cli::try_parse_from(argv).unwrap()
	}

	async fn status(&self) -> MigrationStatus {
		let settings = MigrationSettings {
			database_url: Some(self.database_url()),
			migrations_dir: self.migrations_dir(),
			..Default::default()
		};
		let engine = MigrationEngine::connect(settings).await.unwrap();
		engine.status().await.unwrap()
	}

	fn artifact_count(&self) -> usize {
		count_files(&self.migrations_dir())
	}

	/// Rewrite the artifact holding `sequence`
	fn edit_artifact(&self, sequence: u64, edit: impl FnOnce(&mut MigrationArtifact)) {
		for entry in std::fs::read_dir(self.migrations_dir()).unwrap() {
			let path = entry.unwrap().path();
			let content = std::fs::read_to_string(&path).unwrap();
			let mut artifact = MigrationArtifact::from_json(&content).unwrap();
			if artifact.metadata.sequence == sequence {
				edit(&mut artifact);
				std::fs::write(&path, artifact.to_json().unwrap()).unwrap();
				return;
			}
		}
		panic!("no artifact with sequence {}", sequence);
	}
}

fn count_files(dir: &Path) -> usize {
	std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

#[fixture]
fn workspace() -> Workspace {
	Workspace {
		dir: tempfile::tempdir().unwrap(),
	}
}

#[fixture]
fn registry() -> ModelRegistry {
	let mut registry = ModelRegistry::new();
	registry.register_description(
		ModelDescription::new("User", "users")
			.field(FieldDescription::new("id", "i64"))
			.field(FieldDescription::new("name", "String")),
	);
	registry
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_generate_migrate_status(workspace: Workspace, registry: ModelRegistry) {
	// Arrange
	let generate = workspace.cli(&["generate", "initial"]);

	// Act
	let generated = run(generate, &registry).await;
	let migrated = run(workspace.cli(&["migrate"]), &registry).await;
	let status = run(workspace.cli(&["status"]), &registry).await;

	// Assert
	assert_eq!(generated, 0);
	assert_eq!(migrated, 0);
	assert_eq!(status, 0);
	assert_eq!(workspace.artifact_count(), 1);
	let status = workspace.status().await;
	assert_eq!(status.applied_versions(), vec!["0001"]);
	assert!(status.pending.is_empty());
	assert_eq!(status.applied[0].description, "initial");
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_generate_dry_run_writes_nothing(workspace: Workspace, registry: ModelRegistry) {
	let code = run(workspace.cli(&["generate", "initial", "--dry-run"]), &registry).await;

	assert_eq!(code, 0);
	assert_eq!(workspace.artifact_count(), 0);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_generate_refuses_empty_registry(workspace: Workspace) {
	let code = run(workspace.cli(&["generate", "initial"]), &ModelRegistry::new()).await;

	assert_eq!(code, 1);
	assert_eq!(workspace.artifact_count(), 0);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_rollback_then_migrate_again(workspace: Workspace, registry: ModelRegistry) {
	assert_eq!(run(workspace.cli(&["generate", "initial"]), &registry).await, 0);
	assert_eq!(run(workspace.cli(&["migrate"]), &registry).await, 0);

	let code = run(workspace.cli(&["rollback"]), &registry).await;

	assert_eq!(code, 0);
	let status = workspace.status().await;
	assert!(status.applied.is_empty());
	assert_eq!(status.pending_versions(), vec!["0001"]);

	assert_eq!(run(workspace.cli(&["migrate"]), &registry).await, 0);
	assert_eq!(workspace.status().await.applied_versions(), vec!["0001"]);
}

/// Generates two migrations for `users` and breaks the second one
async fn generate_with_broken_second(workspace: &Workspace, registry: &ModelRegistry) {
	let mut with_email = ModelRegistry::new();
	with_email.register_description(
		ModelDescription::new("User", "users")
			.field(FieldDescription::new("id", "i64"))
			.field(FieldDescription::new("name", "String"))
			.field(FieldDescription::new("email", "Option<String>")),
	);
	assert_eq!(run(workspace.cli(&["generate", "initial"]), registry).await, 0);
	assert_eq!(run(workspace.cli(&["generate", "add_email"]), &with_email).await, 0);
	workspace.edit_artifact(2, |artifact| artifact.up_sql.push("SELEC 1".to_string()));
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_failed_migrate_exits_with_two_and_keeps_pending(
	workspace: Workspace,
	registry: ModelRegistry,
) {
	// Arrange
	generate_with_broken_second(&workspace, &registry).await;

	// Act
	let code = run(workspace.cli(&["migrate"]), &registry).await;

	// Assert
	assert_eq!(code, 2);
	let status = workspace.status().await;
	assert_eq!(status.applied_versions(), vec!["0001"]);
	assert_eq!(status.pending_versions(), vec!["0002"]);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_failed_migrate_prints_status(workspace: Workspace, registry: ModelRegistry) {
	// Arrange
	generate_with_broken_second(&workspace, &registry).await;
	let url = workspace.database_url();
	let dir = workspace.migrations_dir();

	// Act
	let output = Command::new(automigrate_bin())
		.args(["--database-url", url.as_str(), "--migrations-dir"])
		.arg(&dir)
		.arg("migrate")
		.env("NO_COLOR", "1")
		.output()
		.unwrap();

	// Assert
	assert_eq!(output.status.code(), Some(2));
	let stdout = String::from_utf8_lossy(&output.stdout);
	let pending: Vec<&str> = stdout
		.split("Pending migrations:")
		.nth(1)
		.unwrap_or_default()
		.lines()
		.filter(|line| line.contains("[ ]"))
		.collect();
	assert_eq!(pending.len(), 1, "stdout: {}", stdout);
	assert!(pending[0].contains("[ ] 0002 "), "stdout: {}", stdout);
	let stderr = String::from_utf8_lossy(&output.stderr);
	assert!(stderr.contains("error:"), "stderr: {}", stderr);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_stamp_marks_and_clears(workspace: Workspace, registry: ModelRegistry) {
	assert_eq!(run(workspace.cli(&["generate", "initial"]), &registry).await, 0);

	assert_eq!(run(workspace.cli(&["stamp", "0001"]), &registry).await, 0);
	assert_eq!(workspace.status().await.applied_versions(), vec!["0001"]);

	assert_eq!(run(workspace.cli(&["stamp", "0"]), &registry).await, 0);
	assert_eq!(workspace.status().await.pending_versions(), vec!["0001"]);
}

#[rstest]
#[case(&["stamp", "latest"])]
#[case(&["stamp", "0009"])]
#[serial]
#[tokio::test]
async fn test_stamp_rejects_bad_versions(
	workspace: Workspace,
	registry: ModelRegistry,
	#[case] args: &[&str],
) {
	assert_eq!(run(workspace.cli(args), &registry).await, 1);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_unreachable_database_exits_with_two(workspace: Workspace, registry: ModelRegistry) {
	// No mode=rwc, so SQLite refuses to create the file
	let url = format!(
		"sqlite://{}",
		workspace.dir.path().join("missing").join("app.db").display()
	);
	let cli = Cli::try_parse_from(["automigrate", "--database-url", url.as_str(), "migrate"]).unwrap();

	assert_eq!(run(cli, &registry).await, 2);
}

#[rstest]
#[serial]
#[tokio::test]
async fn test_missing_database_url_exits_with_one(registry: ModelRegistry) {
	let cli = Cli::try_parse_from(["automigrate", "status"]).unwrap();
	assert_eq!(run(cli, &registry).await, 1);
}

#[rstest]
#[serial]
fn test_flags_override_file_and_environment(workspace: Workspace) {
	// Arrange
	let config = workspace.dir.path().join("automigrate.toml");
	std::fs::write(
		&config,
		"database_url = \"sqlite://file.db\"\nhistory_table = \"app_migrations\"\n",
	)
	.unwrap();
	// SAFETY: serialized with every other test that reads the environment
	unsafe {
		std::env::set_var(ENV_DATABASE_URL, "sqlite://env.db");
		std::env::set_var(ENV_MIGRATIONS_DIR, "env_migrations");
	}

	// Act
	let from_env = resolve_settings(
		&Cli::try_parse_from(["automigrate", "--config", config.to_str().unwrap(), "status"])
			.unwrap(),
	);
	let from_flags = resolve_settings(
		&Cli::try_parse_from([
			"automigrate",
			"--config",
			config.to_str().unwrap(),
			"--database-url",
			"sqlite://flag.db",
			"--migrations-dir",
			"flag_migrations",
			"status",
		])
		.unwrap(),
	);
	unsafe {
		std::env::remove_var(ENV_DATABASE_URL);
		std::env::remove_var(ENV_MIGRATIONS_DIR);
	}

	// Assert
	let from_env = from_env.unwrap();
	assert_eq!(from_env.database_url.as_deref(), Some("sqlite://env.db"));
	assert_eq!(from_env.migrations_dir, PathBuf::from("env_migrations"));
	assert_eq!(from_env.history_table, "app_migrations");

	let from_flags = from_flags.unwrap();
	assert_eq!(from_flags.database_url.as_deref(), Some("sqlite://flag.db"));
	assert_eq!(from_flags.migrations_dir, PathBuf::from("flag_migrations"));
}

#[rstest]
#[serial]
fn test_missing_config_file_is_an_error() {
	let cli = Cli::try_parse_from(["automigrate", "--config", "/nonexistent/automigrate.toml", "status"])
		.unwrap();
	assert!(resolve_settings(&cli).is_err());
}
