//! # Database Backends
//!
//! The narrow database surface the migration engine needs: a single session
//! that can begin, execute, fetch and commit or roll back.
//!
//! | Database | Feature Flag | Dialect |
//! |----------|--------------|---------|
//! | PostgreSQL | `postgres` | [`SqlDialect::Postgres`] |
//! | MySQL/MariaDB | `mysql` | [`SqlDialect::Mysql`] |
//! | SQLite | `sqlite` | [`SqlDialect::Sqlite`] |
//!
//! [`SqlxConnection`] implements [`MigrationConnection`] on top of sqlx's
//! `Any` driver. Tests and embedders can provide their own implementation.

pub mod connection;
pub mod driver;
pub mod error;
pub mod types;

pub use connection::MigrationConnection;
pub use driver::{SqlxConnection, redact_url};
pub use error::{DatabaseError, Result};
pub use types::{QueryValue, Row, SqlDialect};
