//! # Automigrate Commands
//!
//! Command-line interface for the automigrate engine.
//!
//! ## Commands
//!
//! - `migrate` - Apply pending migrations
//! - `rollback [n]` - Roll back the latest `n` applied migrations (default 1)
//! - `status` - List applied and pending migrations
//! - `generate <name> [--dry-run]` - Write migrations for changed models
//! - `stamp <version>` - Mark history up to `version` as applied without running SQL
//!
//! ## Exit Codes
//!
//! - `0` - Success
//! - `1` - Configuration, analysis or generation error
//! - `2` - Apply, rollback, lock or database failure
//!
//! ## Embedding
//!
//! `generate` needs the application's models, so applications ship their
//! own binary that registers them:
//!
//! ```rust,ignore
//! use automigrate_db::migrations::ModelRegistry;
//!
//! #[tokio::main]
//! async fn main() -> std::process::ExitCode {
//!     let registry = ModelRegistry::new().with::<User>().with::<Post>();
//!     automigrate_commands::execute_from_command_line(&registry).await
//! }
//! ```

pub mod cli;
pub mod logging;
pub mod output;

pub use cli::{Cli, Commands, execute_from_command_line, resolve_settings, run};
