//! Automigrate CLI
//!
//! Operates on existing migration artifacts. No models are registered in
//! this binary, so `generate` must be run from an application binary that
//! calls `execute_from_command_line` with its own registry.
//!
//! ```bash
//! automigrate --database-url sqlite://app.db?mode=rwc migrate
//! automigrate status
//! automigrate rollback 2
//! ```

use automigrate_db::migrations::ModelRegistry;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
	automigrate_commands::execute_from_command_line(&ModelRegistry::new()).await
}
