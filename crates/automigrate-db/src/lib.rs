//! # Automigrate Database
//!
//! Schema-diffing migration engine.
//!
//! This crate provides:
//! - **Backends**: The connection capability the engine runs against, SQL
//!   dialects and a sqlx-backed connection
//! - **Migrations**: Model analysis, schema diffing, SQL generation,
//!   content-addressed artifacts, history and the run lock
//! - **Settings**: `automigrate.toml` plus environment overrides
//! - **Tracking**: Field-level change tracking for model values
//!
//! ## Supported Dialects
//!
//! - **PostgreSQL**: transactional DDL, advisory run lock
//! - **MySQL**: `GET_LOCK` run lock; DDL commits implicitly
//! - **SQLite**: transactional DDL, lock table; no in-place column changes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use automigrate_db::conf::MigrationSettings;
//! use automigrate_db::migrations::{
//!     FieldDescription, MigrationEngine, ModelDescription, ModelRegistry,
//! };
//!
//! # async fn example() -> automigrate_db::migrations::Result<()> {
//! let mut registry = ModelRegistry::new();
//! registry.register_description(
//!     ModelDescription::new("User", "users")
//!         .field(FieldDescription::new("id", "i64"))
//!         .field(FieldDescription::new("name", "String")),
//! );
//!
//! let settings = MigrationSettings::load(None)?;
//! let engine = MigrationEngine::connect(settings).await?;
//! engine.generate(&registry, Some("initial"), false).await?;
//! engine.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod conf;
pub mod migrations;
pub mod tracking;

/// Prelude module for convenient imports
pub mod prelude {
	pub use crate::backends::{MigrationConnection, SqlDialect, SqlxConnection};
	pub use crate::conf::MigrationSettings;
	pub use crate::migrations::{
		ColumnDefinition, FieldDescription, FieldType, IndexDefinition, Migration,
		MigrationEngine, MigrationError, MigrationManager, MigrationOperation, Model,
		ModelDescription, ModelRegistry, TableDefinition,
	};
	pub use crate::tracking::Tracked;
}

pub use backends::DatabaseError;
pub use migrations::{MigrationError, MigrationManager};
