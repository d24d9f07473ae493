//! CLI runner for automigrate
//!
//! Parses arguments, layers flags over the loaded settings and dispatches
//! to the migration engine. Host applications embed this through
//! [`execute_from_command_line`] with their own model registry; the bundled
//! binary passes an empty one.

use automigrate_db::conf::MigrationSettings;
use automigrate_db::migrations::{
	FilesystemRepository, MigrationEngine, MigrationError, MigrationPlanner, ModelRegistry,
	Result,
};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::{logging, output};

/// Automigrate command-line interface
///
/// This is the parser used by `execute_from_command_line()`.
/// Can also be used directly for testing CLI parsing behavior.
#[derive(Debug, Parser)]
#[command(name = "automigrate")]
#[command(about = "Generate and apply schema-diffing migrations", long_about = None)]
#[command(version)]
pub struct Cli {
	/// Subcommand to execute
	#[command(subcommand)]
	pub command: Commands,

	/// Verbosity level (can be repeated for more output)
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	pub verbosity: u8,

	/// Settings file (defaults to ./automigrate.toml when present)
	#[arg(long, value_name = "FILE", global = true)]
	pub config: Option<PathBuf>,

	/// Database connection string
	#[arg(long, value_name = "URL", global = true)]
	pub database_url: Option<String>,

	/// Directory holding migration artifacts
	#[arg(long, value_name = "DIR", global = true)]
	pub migrations_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
	/// Apply all pending migrations
	Migrate,

	/// Roll back the most recently applied migrations
	Rollback {
		/// How many migrations to roll back
		#[arg(value_name = "STEPS", default_value_t = 1)]
		steps: usize,
	},

	/// Show applied and pending migrations
	Status,

	/// Create migrations from model changes
	Generate {
		/// Description recorded in the generated migrations
		#[arg(value_name = "NAME")]
		name: String,

		/// Dry run - print the migrations without writing files
		#[arg(long)]
		dry_run: bool,
	},

	/// Rewrite the history so that VERSION is the latest applied migration, without running SQL
	Stamp {
		/// Target version; 0 clears the history
		#[arg(value_name = "VERSION")]
		version: String,
	},
}

/// Parse the process arguments, run the command and map the outcome to an
/// exit code.
///
/// # Examples
///
/// ```rust,no_run
/// use automigrate_db::migrations::ModelRegistry;
///
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     let registry = ModelRegistry::new();
///     automigrate_commands::execute_from_command_line(&registry).await
/// }
/// ```
pub async fn execute_from_command_line(registry: &ModelRegistry) -> ExitCode {
	let cli = Cli::parse();
	logging::init(cli.verbosity);
	ExitCode::from(run(cli, registry).await)
}

/// Run a parsed command and return its exit code.
///
/// `0` on success, otherwise [`MigrationError::exit_code`]. Errors are
/// printed to stderr.
pub async fn run(cli: Cli, registry: &ModelRegistry) -> u8 {
	match run_command(cli, registry).await {
		Ok(()) => 0,
		Err(e) => {
			eprintln!("{} {}", "error:".red().bold(), e);
			e.exit_code()
		}
	}
}

/// Load settings and apply the global flags on top
pub fn resolve_settings(cli: &Cli) -> Result<MigrationSettings> {
	let mut settings = MigrationSettings::load(cli.config.as_deref())?;
	if let Some(url) = &cli.database_url {
		settings.database_url = Some(url.clone());
	}
	if let Some(dir) = &cli.migrations_dir {
		settings.migrations_dir = dir.clone();
	}
	settings.validate()?;
	Ok(settings)
}

async fn run_command(cli: Cli, registry: &ModelRegistry) -> Result<()> {
	let settings = resolve_settings(&cli)?;
	tracing::debug!(
		migrations_dir = %settings.migrations_dir.display(),
		history_table = %settings.history_table,
		"settings loaded"
	);

	match cli.command {
		Commands::Generate { name, dry_run } => {
			execute_generate(settings, registry, &name, dry_run).await
		}
		Commands::Migrate => execute_migrate(settings).await,
		Commands::Rollback { steps } => execute_rollback(settings, steps).await,
		Commands::Status => execute_status(settings).await,
		Commands::Stamp { version } => execute_stamp(settings, &version).await,
	}
}

/// Generation only reads artifacts, so it needs a dialect but no connection
async fn execute_generate(
	settings: MigrationSettings,
	registry: &ModelRegistry,
	name: &str,
	dry_run: bool,
) -> Result<()> {
	if registry.is_empty() {
		return Err(MigrationError::ConfigurationError(
			"no models are registered; run generate from an application that passes its \
			 model registry to execute_from_command_line"
				.to_string(),
		));
	}

	let dialect = settings.resolved_dialect()?;
	let repository = Arc::new(FilesystemRepository::new(&settings.migrations_dir));
	let planner = MigrationPlanner::new(repository, dialect, settings.analyzer.clone());

	let report = planner.generate(registry, Some(name), dry_run).await?;
	print!("{}", output::render_generation(&report));
	Ok(())
}

async fn execute_migrate(settings: MigrationSettings) -> Result<()> {
	let engine = MigrationEngine::connect(settings).await?;
	match engine.migrate().await {
		Ok(report) => {
			println!("{}", output::render_migrate(&report));
			Ok(())
		}
		Err(e) => {
			// Show where the run stopped
			match engine.status().await {
				Ok(status) => print!("{}", output::render_status(&status)),
				Err(status_error) => {
					tracing::warn!(error = %status_error, "could not read status after failed migrate");
				}
			}
			Err(e)
		}
	}
}

async fn execute_rollback(settings: MigrationSettings, steps: usize) -> Result<()> {
	let engine = MigrationEngine::connect(settings).await?;
	let report = engine.rollback(steps).await?;
	println!("{}", output::render_rollback(&report));
	Ok(())
}

async fn execute_status(settings: MigrationSettings) -> Result<()> {
	let engine = MigrationEngine::connect(settings).await?;
	let status = engine.status().await?;
	print!("{}", output::render_status(&status));
	Ok(())
}

async fn execute_stamp(settings: MigrationSettings, version: &str) -> Result<()> {
	let engine = MigrationEngine::connect(settings).await?;
	let report = engine.stamp(version).await?;
	println!("{}", output::render_stamp(&report));
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_parse_rollback_defaults_to_one_step() {
		let cli = Cli::try_parse_from(["automigrate", "rollback"]).unwrap();
		assert_eq!(cli.command, Commands::Rollback { steps: 1 });
	}

	#[rstest]
	fn test_parse_generate_with_global_flags() {
		let cli = Cli::try_parse_from([
			"automigrate",
			"generate",
			"add_users",
			"--dry-run",
			"-vv",
			"--migrations-dir",
			"db/migrations",
		])
		.unwrap();

		assert_eq!(
			cli.command,
			Commands::Generate {
				name: "add_users".to_string(),
				dry_run: true
			}
		);
		assert_eq!(cli.verbosity, 2);
		assert_eq!(cli.migrations_dir, Some(PathBuf::from("db/migrations")));
	}

	#[rstest]
	#[case(&["automigrate"])]
	#[case(&["automigrate", "generate"])]
	#[case(&["automigrate", "stamp"])]
	#[case(&["automigrate", "rollback", "many"])]
	#[case(&["automigrate", "makemigrations"])]
	fn test_parse_rejects_invalid_invocations(#[case] args: &[&str]) {
		assert!(Cli::try_parse_from(args).is_err());
	}

	#[rstest]
	fn test_parse_stamp() {
		let cli =
			Cli::try_parse_from(["automigrate", "--database-url", "sqlite::memory:", "stamp", "0003"])
				.unwrap();
		assert_eq!(
			cli.command,
			Commands::Stamp {
				version: "0003".to_string()
			}
		);
		assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
	}
}
