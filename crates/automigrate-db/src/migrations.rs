//! # Automigrate Migrations
//!
//! Schema-diffing migration pipeline.
//!
//! ## Features
//!
//! - **Analysis**: Normalizes model descriptions into [`TableDefinition`]s
//! - **Diffing**: Compares a table against its last recorded snapshot and emits ordered operations
//! - **SQL Generation**: Renders operations into PostgreSQL, MySQL or SQLite DDL
//! - **Content-addressed artifacts**: Each migration is identified by a hash of its operations
//! - **History**: Applies and rolls back migrations transactionally under an exclusive run lock
//!
//! ## Pipeline
//!
//! ```text
//! ModelRegistry ─▶ ModelAnalyzer ─▶ SchemaDiffer ─▶ MigrationGenerator ─▶ MigrationRepository
//!                                                         │
//!                                                    SqlGenerator
//!
//! MigrationRepository ─▶ MigrationEngine ─▶ MigrationHistoryStore ─▶ database
//! ```
//!
//! ```rust,ignore
//! use automigrate_db::migrations::{MigrationEngine, ModelRegistry};
//!
//! let engine = MigrationEngine::connect(settings).await?;
//! engine.generate(&registry, Some("add_users"), false).await?;
//! let report = engine.migrate().await?;
//! println!("applied {:?}", report.applied);
//! ```

pub mod analyzer;
pub mod fields;
pub mod generator;
pub mod lock;
pub mod manager;
pub mod migration;
pub mod model;
pub mod operations;
pub mod planner;
pub mod recorder;
pub mod repository;
pub mod schema;
pub mod schema_diff;
pub mod sql;

pub use analyzer::{AnalysisWarning, ModelAnalyzer};
pub use fields::FieldType;
pub use generator::{MigrationGenerator, compute_id};
pub use lock::MigrationLock;
pub use manager::{
	MigrateReport, MigrationEngine, MigrationEngineBuilder, MigrationManager, MigrationStatus,
	RollbackReport, StampReport, StatusEntry,
};
pub use migration::{ArtifactMetadata, Migration, MigrationArtifact, format_version, parse_version};
pub use model::{FieldDescription, FieldReference, Model, ModelDescription, ModelRegistry};
pub use operations::MigrationOperation;
pub use planner::{DetectedChanges, GenerationReport, MigrationPlanner, TableChanges};
pub use recorder::{MigrationHistoryStore, MigrationRecord};
pub use repository::{
	InMemoryRepository, MigrationRepository, filesystem::FilesystemRepository,
};
pub use schema::{ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition};
pub use schema_diff::SchemaDiffer;
pub use sql::{SqlGenerator, quote_identifier};

// Re-export backend types for convenience
pub use crate::backends::{DatabaseError, MigrationConnection, SqlDialect};

use thiserror::Error;

use crate::conf::SettingsError;

#[derive(Debug, Error)]
pub enum MigrationError {
	#[error("Configuration error: {0}")]
	ConfigurationError(String),

	#[error("Analysis error: {0}")]
	AnalysisError(String),

	#[error("Diff error: {0}")]
	DiffError(String),

	#[error("Generation error: {0}")]
	GenerationError(String),

	/// Applying a migration failed and its transaction was rolled back
	#[error("Failed to apply migration {version}: {source}")]
	ApplyError {
		version: String,
		#[source]
		source: DatabaseError,
	},

	#[error("Failed to roll back migration {version}: {source}")]
	RollbackError {
		version: String,
		#[source]
		source: DatabaseError,
	},

	#[error("Lock error: {0}")]
	LockError(String),

	#[error("Database error: {0}")]
	DatabaseError(#[from] DatabaseError),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),

	#[error("Path traversal detected: {0}")]
	PathTraversal(String),
}

impl MigrationError {
	/// Process exit code for this failure.
	///
	/// `2` for failures while talking to the database, `1` for everything
	/// detected before any database contact.
	pub fn exit_code(&self) -> u8 {
		match self {
			MigrationError::ApplyError { .. }
			| MigrationError::RollbackError { .. }
			| MigrationError::LockError(_)
			| MigrationError::DatabaseError(_) => 2,
			MigrationError::ConfigurationError(_)
			| MigrationError::AnalysisError(_)
			| MigrationError::DiffError(_)
			| MigrationError::GenerationError(_)
			| MigrationError::IoError(_)
			| MigrationError::SerializationError(_)
			| MigrationError::PathTraversal(_) => 1,
		}
	}
}

impl From<SettingsError> for MigrationError {
	fn from(error: SettingsError) -> Self {
		MigrationError::ConfigurationError(error.to_string())
	}
}

pub type Result<T> = std::result::Result<T, MigrationError>;
