//! Database error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
	#[error("SQL error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Column not found: {0}")]
	ColumnNotFound(String),

	#[error("Type error: {0}")]
	TypeError(String),

	#[error("Connection error: {0}")]
	ConnectionError(String),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
