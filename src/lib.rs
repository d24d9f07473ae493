//! # Automigrate
//!
//! Schema-diffing auto-migrations for Rust applications.
//!
//! Describe tables as plain structs with `#[derive(Model)]`, let the engine
//! diff them against the last recorded snapshot, and apply the generated
//! migrations under an exclusive run lock.
//!
//! ## Feature Flags
//!
//! - `minimal` - Engine only (`db`)
//! - `standard` (default) - Engine, `#[derive(Model)]` and all three SQL backends
//! - `full` - Everything including the command-line interface
//!
//! Backend selection:
//! - `db-postgres` - PostgreSQL support
//! - `db-mysql` - MySQL support
//! - `db-sqlite` - SQLite support
//!
//! The derive expands to paths under `automigrate_db::migrations`; crates
//! that only depend on `automigrate` point it here with `crate_path`.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use automigrate::prelude::*;
//!
//! #[derive(Model)]
//! #[model(table = "users", timestamps, crate_path = "automigrate::migrations")]
//! struct User {
//!     #[field(primary_key, auto_increment)]
//!     id: i64,
//!     #[field(max_length = 100, unique)]
//!     email: String,
//! }
//!
//! # async fn run() -> Result<(), MigrationError> {
//! let registry = ModelRegistry::new().with::<User>();
//! let engine = MigrationEngine::connect(MigrationSettings::load(None)?).await?;
//! engine.generate(&registry, Some("add_users"), false).await?;
//! engine.migrate().await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "db")]
pub use automigrate_db as db;

#[cfg(feature = "db")]
pub use automigrate_db::{backends, conf, migrations, tracking};

#[cfg(feature = "macros")]
pub use automigrate_macros::Model;

#[cfg(feature = "commands")]
pub use automigrate_commands as commands;

#[cfg(feature = "commands")]
pub use automigrate_commands::execute_from_command_line;

/// Prelude module for convenient imports
pub mod prelude {
	#[cfg(feature = "db")]
	pub use automigrate_db::prelude::*;

	#[cfg(feature = "db")]
	pub use automigrate_db::migrations::{MigrationStatus, ModelAnalyzer, SchemaDiffer};

	#[cfg(feature = "macros")]
	pub use automigrate_macros::Model;
}
