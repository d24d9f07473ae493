//! # Automigrate Macros
//!
//! Procedural macros for automigrate.
//!
//! This crate provides `#[derive(Model)]`, which implements
//! `automigrate_db::migrations::Model` from the struct definition.
//!
//! ## Example
//!
//! ```rust,ignore
//! use automigrate_macros::Model;
//!
//! #[derive(Model)]
//! #[model(table = "users", timestamps)]
//! struct User {
//!     #[field(primary_key, auto_increment)]
//!     id: i64,
//!     #[field(max_length = 100, unique)]
//!     email: String,
//!     nickname: Option<String>,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod attr_parser;
mod model;

/// Derive `Model` for a struct with named fields
///
/// ## Model Attributes
///
/// `#[model(...)]` on the struct:
/// - `table = "name"` - Table name (defaults to the snake_case struct name)
/// - `timestamps` - Add `created_at` / `updated_at` columns
/// - `primary_key = "field"` - Field used as primary key instead of the configured default
/// - `index(name = "...", columns = "a, b", unique)` - Composite index, repeatable
/// - `crate_path = "path::to::migrations"` - Where the `migrations` module lives when
///   `automigrate_db` is not a direct dependency
///
/// ## Field Attributes
///
/// `#[field(...)]` on each field. Flags accept an optional `= true` / `= false`.
/// - `primary_key`, `auto_increment`, `unique`, `index`
/// - `nullable`, `not_null` - Override nullability inferred from `Option<T>`
/// - `default = "SQL literal"`
/// - `max_length = n`, `precision = n`, `scale = n`
/// - `db_type = "decimal"` - Declared type override
/// - `references = "table.column"` - Foreign key
/// - `column = "name"` - Column name override
/// - `skip` - Leave the field out of the table
#[proc_macro_derive(Model, attributes(model, field))]
pub fn derive_model(input: TokenStream) -> TokenStream {
	let input = parse_macro_input!(input as DeriveInput);
	model::derive_model_impl(input)
		.unwrap_or_else(|e| e.to_compile_error())
		.into()
}
