//! Model descriptions and the explicit model registry
//!
//! Models describe themselves through the [`Model`] trait, either by hand with
//! the builder API below or through `#[derive(Model)]`. A [`ModelRegistry`] is
//! an ordinary value the application builds and passes to the engine; there is
//! no process-wide registration.

use serde::{Deserialize, Serialize};

use super::schema::IndexDefinition;

/// `table.column` a field points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReference {
	pub table: String,
	pub column: String,
}

/// One declared field of a model, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
	/// Column name
	pub name: String,
	/// Declared type as written (`i64`, `Option<String>`, `chrono::DateTime<Utc>`, `varchar`)
	pub declared_type: String,
	/// Explicit nullability; inferred when `None`
	pub nullable: Option<bool>,
	/// Explicit primary-key flag; inferred from the configured key name when `None`
	pub primary_key: Option<bool>,
	pub auto_increment: bool,
	pub unique: bool,
	pub index: bool,
	pub default: Option<String>,
	pub max_length: Option<u32>,
	pub precision: Option<u32>,
	pub scale: Option<u32>,
	pub references: Option<FieldReference>,
}

impl FieldDescription {
	pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			declared_type: declared_type.into(),
			nullable: None,
			primary_key: None,
			auto_increment: false,
			unique: false,
			index: false,
			default: None,
			max_length: None,
			precision: None,
			scale: None,
			references: None,
		}
	}

	pub fn nullable(mut self, nullable: bool) -> Self {
		self.nullable = Some(nullable);
		self
	}

	pub fn primary_key(mut self, primary_key: bool) -> Self {
		self.primary_key = Some(primary_key);
		self
	}

	pub fn auto_increment(mut self) -> Self {
		self.auto_increment = true;
		self
	}

	pub fn unique(mut self) -> Self {
		self.unique = true;
		self
	}

	pub fn index(mut self) -> Self {
		self.index = true;
		self
	}

	/// Default as SQL literal text, e.g. `0`, `'draft'`, `CURRENT_TIMESTAMP`
	pub fn default_value(mut self, default: impl Into<String>) -> Self {
		self.default = Some(default.into());
		self
	}

	pub fn max_length(mut self, max_length: u32) -> Self {
		self.max_length = Some(max_length);
		self
	}

	pub fn precision(mut self, precision: u32) -> Self {
		self.precision = Some(precision);
		self
	}

	pub fn scale(mut self, scale: u32) -> Self {
		self.scale = Some(scale);
		self
	}

	pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
		self.references = Some(FieldReference {
			table: table.into(),
			column: column.into(),
		});
		self
	}
}

/// Everything the analyzer needs to know about one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescription {
	/// Model type name, used in messages
	pub model_name: String,
	pub table_name: String,
	pub fields: Vec<FieldDescription>,
	/// Model-level (possibly composite) indexes
	pub indexes: Vec<IndexDefinition>,
	pub timestamps: bool,
}

impl ModelDescription {
	pub fn new(model_name: impl Into<String>, table_name: impl Into<String>) -> Self {
		Self {
			model_name: model_name.into(),
			table_name: table_name.into(),
			fields: Vec::new(),
			indexes: Vec::new(),
			timestamps: false,
		}
	}

	pub fn field(mut self, field: FieldDescription) -> Self {
		self.fields.push(field);
		self
	}

	pub fn index(mut self, index: IndexDefinition) -> Self {
		self.indexes.push(index);
		self
	}

	pub fn timestamps(mut self, timestamps: bool) -> Self {
		self.timestamps = timestamps;
		self
	}
}

/// Implemented by application models.
///
/// ```
/// use automigrate_db::migrations::{FieldDescription, Model, ModelDescription};
///
/// struct User;
///
/// impl Model for User {
///     fn describe() -> ModelDescription {
///         ModelDescription::new("User", "users")
///             .field(FieldDescription::new("id", "i64"))
///             .field(FieldDescription::new("name", "String"))
///     }
/// }
///
/// assert_eq!(User::describe().table_name, "users");
/// ```
pub trait Model {
	fn describe() -> ModelDescription;
}

/// Ordered collection of model descriptions
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
	models: Vec<ModelDescription>,
}

impl ModelRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a model type
	pub fn register<M: Model>(&mut self) -> &mut Self {
		self.models.push(M::describe());
		self
	}

	/// Builder-style [`register`](Self::register)
	pub fn with<M: Model>(mut self) -> Self {
		self.register::<M>();
		self
	}

	/// Register a description built by hand
	pub fn register_description(&mut self, description: ModelDescription) -> &mut Self {
		self.models.push(description);
		self
	}

	pub fn get(&self, table_name: &str) -> Option<&ModelDescription> {
		self.models.iter().find(|m| m.table_name == table_name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &ModelDescription> {
		self.models.iter()
	}

	pub fn len(&self) -> usize {
		self.models.len()
	}

	pub fn is_empty(&self) -> bool {
		self.models.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	struct Post;

	impl Model for Post {
		fn describe() -> ModelDescription {
			ModelDescription::new("Post", "posts")
				.field(FieldDescription::new("id", "i64"))
				.field(FieldDescription::new("title", "String").max_length(200))
		}
	}

	#[rstest]
	fn test_registry_keeps_registration_order() {
		let mut registry = ModelRegistry::new();
		registry
			.register_description(ModelDescription::new("Zebra", "zebras"))
			.register::<Post>();

		let tables: Vec<&str> = registry.iter().map(|m| m.table_name.as_str()).collect();
		assert_eq!(tables, vec!["zebras", "posts"]);
		assert_eq!(registry.get("posts").unwrap().fields.len(), 2);
		assert!(registry.get("missing").is_none());
	}

	#[rstest]
	fn test_references_builder() {
		let field = FieldDescription::new("author_id", "i64").references("users", "id");
		assert_eq!(
			field.references,
			Some(FieldReference {
				table: "users".to_string(),
				column: "id".to_string(),
			})
		);
	}
}
