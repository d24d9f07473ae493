//! Model analysis
//!
//! Turns a [`ModelDescription`] into a normalized [`TableDefinition`]. The
//! analyzer is deterministic and never touches the database.

use std::collections::HashSet;
use std::fmt;

use super::fields::FieldType;
use super::model::{FieldDescription, ModelDescription};
use super::schema::{ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition};
use super::{MigrationError, Result};
use crate::conf::AnalyzerSettings;

/// Column names added by `timestamps`
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Non-fatal observation made while analyzing a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisWarning {
	pub table: String,
	pub field: String,
	pub message: String,
}

impl fmt::Display for AnalysisWarning {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}.{}: {}", self.table, self.field, self.message)
	}
}

/// Declared type after stripping `Option<..>`, paths and generics
#[derive(Debug, Clone, PartialEq, Eq)]
struct DeclaredType {
	optional: bool,
	base: String,
}

impl DeclaredType {
	fn parse(declared: &str) -> Self {
		let mut text: String = declared.chars().filter(|c| !c.is_whitespace()).collect();
		let mut optional = false;

		loop {
			let stripped = ["Option<", "std::option::Option<", "core::option::Option<"]
				.iter()
				.find_map(|prefix| text.strip_prefix(prefix))
				.and_then(|rest| rest.strip_suffix('>'));
			match stripped {
				Some(inner) => {
					optional = true;
					text = inner.to_string();
				}
				None => break,
			}
		}

		let text = text.trim_start_matches('&').trim_start_matches("'static");
		let head = text.split('<').next().unwrap_or(text);
		let head = head.split('(').next().unwrap_or(head);
		let base = head.rsplit("::").next().unwrap_or(head).to_ascii_lowercase();

		Self { optional, base }
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeKind {
	Integer,
	VarChar,
	Uuid,
	Decimal,
	Boolean,
	DateTime,
	Json,
}

fn classify(base: &str) -> Option<TypeKind> {
	let kind = match base {
		"i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
		| "u128" | "usize" | "int" | "integer" | "bigint" | "smallint" | "serial" => {
			TypeKind::Integer
		}
		"string" | "str" | "char" | "text" | "varchar" => TypeKind::VarChar,
		"uuid" => TypeKind::Uuid,
		"f32" | "f64" | "decimal" | "numeric" | "float" | "double" => TypeKind::Decimal,
		"bool" | "boolean" => TypeKind::Boolean,
		"datetime" | "naivedatetime" | "naivedate" | "date" | "timestamp" | "systemtime" => {
			TypeKind::DateTime
		}
		"value" | "json" | "jsonb" | "vec" | "hashmap" | "btreemap" => TypeKind::Json,
		_ => return None,
	};
	Some(kind)
}

/// Normalizes model descriptions
#[derive(Debug, Clone, Default)]
pub struct ModelAnalyzer {
	settings: AnalyzerSettings,
}

impl ModelAnalyzer {
	pub fn new(settings: AnalyzerSettings) -> Self {
		Self { settings }
	}

	pub fn settings(&self) -> &AnalyzerSettings {
		&self.settings
	}

	/// Analyze a model, discarding warnings
	pub fn analyze(&self, model: &ModelDescription) -> Result<TableDefinition> {
		self.analyze_detailed(model).map(|(table, _)| table)
	}

	/// Analyze a model and return the warnings raised on the way
	pub fn analyze_detailed(
		&self,
		model: &ModelDescription,
	) -> Result<(TableDefinition, Vec<AnalysisWarning>)> {
		let table_name = model.table_name.trim();
		if table_name.is_empty() {
			return Err(MigrationError::AnalysisError(format!(
				"model {} has an empty table name",
				model.model_name
			)));
		}
		if model.fields.is_empty() {
			return Err(MigrationError::AnalysisError(format!(
				"model {} ({}) declares no fields",
				model.model_name, table_name
			)));
		}

		let mut seen = HashSet::new();
		for field in &model.fields {
			if !seen.insert(field.name.as_str()) {
				return Err(MigrationError::AnalysisError(format!(
					"field '{}' is declared twice in {}",
					field.name, table_name
				)));
			}
		}

		let mut warnings = Vec::new();
		let mut table = TableDefinition::new(table_name).with_timestamps(model.timestamps);

		for field in &model.fields {
			let column = self.analyze_field(table_name, field, &mut warnings)?;
			if let Some(reference) = &field.references {
				table.foreign_keys.push(ForeignKeyDefinition::new(
					column.name.clone(),
					reference.table.clone(),
					reference.column.clone(),
				));
			}
			if column.index {
				table.indexes.push(IndexDefinition::new(
					format!("{}_{}_idx", table_name, column.name),
					[column.name.clone()],
				));
			}
			table.columns.push(column);
		}

		if model.timestamps {
			for name in [CREATED_AT, UPDATED_AT] {
				if !table.has_column(name) {
					table.columns.push(
						ColumnDefinition::new(name, FieldType::DateTime)
							.not_null()
							.default_value("CURRENT_TIMESTAMP"),
					);
				}
			}
		}

		for index in &model.indexes {
			if index.columns.is_empty() {
				return Err(MigrationError::AnalysisError(format!(
					"index '{}' on {} lists no columns",
					index.name, table_name
				)));
			}
			if let Some(missing) = index.columns.iter().find(|c| !table.has_column(c)) {
				return Err(MigrationError::AnalysisError(format!(
					"index '{}' refers to unknown column '{}' in {}",
					index.name, missing, table_name
				)));
			}
			if table.index(&index.name).is_some() {
				return Err(MigrationError::AnalysisError(format!(
					"index '{}' is declared twice in {}",
					index.name, table_name
				)));
			}
			table.indexes.push(index.clone());
		}

		Ok((table, warnings))
	}

	fn analyze_field(
		&self,
		table: &str,
		field: &FieldDescription,
		warnings: &mut Vec<AnalysisWarning>,
	) -> Result<ColumnDefinition> {
		let declared = DeclaredType::parse(&field.declared_type);
		let mut warn = |message: String| {
			tracing::warn!(table = %table, field = %field.name, "{}", message);
			warnings.push(AnalysisWarning {
				table: table.to_string(),
				field: field.name.clone(),
				message,
			});
		};

		let field_type = match classify(&declared.base) {
			Some(TypeKind::Integer) => FieldType::Integer,
			Some(TypeKind::VarChar) => FieldType::VarChar(
				field
					.max_length
					.unwrap_or(self.settings.default_varchar_length),
			),
			Some(TypeKind::Uuid) => FieldType::VarChar(field.max_length.unwrap_or(36)),
			Some(TypeKind::Decimal) => {
				let precision = field
					.precision
					.unwrap_or(self.settings.default_decimal_precision);
				let scale = field.scale.unwrap_or(self.settings.default_decimal_scale);
				if scale > precision {
					return Err(MigrationError::AnalysisError(format!(
						"field '{}' in {} has scale {} greater than precision {}",
						field.name, table, scale, precision
					)));
				}
				FieldType::Decimal { precision, scale }
			}
			Some(TypeKind::Boolean) => FieldType::Boolean,
			Some(TypeKind::DateTime) => FieldType::DateTime,
			Some(TypeKind::Json) => FieldType::Json,
			None => {
				let length = field
					.max_length
					.unwrap_or(self.settings.default_varchar_length);
				warn(format!(
					"unknown type '{}', falling back to VARCHAR({})",
					field.declared_type.trim(),
					length
				));
				FieldType::VarChar(length)
			}
		};

		let primary_key = field
			.primary_key
			.unwrap_or(field.name == self.settings.primary_key_field);
		let nullable = match field.nullable {
			Some(explicit) => explicit,
			None => declared.optional || !primary_key,
		};
		if primary_key && nullable {
			return Err(MigrationError::AnalysisError(format!(
				"primary key '{}' in {} cannot be nullable",
				field.name, table
			)));
		}

		let auto_increment = if field.auto_increment && !field_type.is_integer() {
			warn(format!(
				"auto_increment ignored on non-integer column of type {}",
				field_type
			));
			false
		} else {
			field.auto_increment
		};

		Ok(ColumnDefinition {
			name: field.name.clone(),
			field_type,
			nullable,
			default: field.default.clone(),
			primary_key,
			auto_increment,
			unique: field.unique && !primary_key,
			index: field.index && !primary_key,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};

	#[fixture]
	fn analyzer() -> ModelAnalyzer {
		ModelAnalyzer::default()
	}

	fn model(fields: Vec<FieldDescription>) -> ModelDescription {
		fields
			.into_iter()
			.fold(ModelDescription::new("User", "users"), ModelDescription::field)
	}

	#[rstest]
	#[case("i64", FieldType::Integer)]
	#[case("u32", FieldType::Integer)]
	#[case("serial", FieldType::Integer)]
	#[case("String", FieldType::VarChar(255))]
	#[case("&'static str", FieldType::VarChar(255))]
	#[case("text", FieldType::VarChar(255))]
	#[case("f64", FieldType::Decimal { precision: 10, scale: 2 })]
	#[case("rust_decimal::Decimal", FieldType::Decimal { precision: 10, scale: 2 })]
	#[case("bool", FieldType::Boolean)]
	#[case("chrono::DateTime<chrono::Utc>", FieldType::DateTime)]
	#[case("DateTime < Utc >", FieldType::DateTime)]
	#[case("NaiveDate", FieldType::DateTime)]
	#[case("serde_json::Value", FieldType::Json)]
	#[case("Vec<String>", FieldType::Json)]
	#[case("uuid::Uuid", FieldType::VarChar(36))]
	fn test_type_table(
		analyzer: ModelAnalyzer,
		#[case] declared: &str,
		#[case] expected: FieldType,
	) {
		let table = analyzer
			.analyze(&model(vec![
				FieldDescription::new("id", "i64"),
				FieldDescription::new("value", declared),
			]))
			.unwrap();
		assert_eq!(table.column("value").unwrap().field_type, expected);
	}

	#[rstest]
	fn test_option_marks_nullable_and_pk_is_inferred(analyzer: ModelAnalyzer) {
		let table = analyzer
			.analyze(&model(vec![
				FieldDescription::new("id", "i64"),
				FieldDescription::new("nickname", "Option<String>").nullable(false),
				FieldDescription::new("bio", "Option < String >"),
				FieldDescription::new("name", "String"),
			]))
			.unwrap();

		let id = table.column("id").unwrap();
		assert!(id.primary_key);
		assert!(!id.nullable);
		assert!(!table.column("nickname").unwrap().nullable);
		assert!(table.column("bio").unwrap().nullable);
		assert!(table.column("name").unwrap().nullable);
	}

	#[rstest]
	fn test_unknown_type_falls_back_with_warning(analyzer: ModelAnalyzer) {
		let (table, warnings) = analyzer
			.analyze_detailed(&model(vec![
				FieldDescription::new("id", "i64"),
				FieldDescription::new("location", "geo::Point"),
			]))
			.unwrap();

		assert_eq!(
			table.column("location").unwrap().field_type,
			FieldType::VarChar(255)
		);
		assert_eq!(warnings.len(), 1);
		assert_eq!(warnings[0].field, "location");
		assert!(warnings[0].message.contains("geo::Point"));
	}

	#[rstest]
	fn test_parameters_from_description(analyzer: ModelAnalyzer) {
		let table = analyzer
			.analyze(&model(vec![
				FieldDescription::new("id", "i64"),
				FieldDescription::new("code", "String").max_length(12),
				FieldDescription::new("price", "Decimal").precision(8).scale(3),
			]))
			.unwrap();

		assert_eq!(table.column("code").unwrap().field_type, FieldType::VarChar(12));
		assert_eq!(
			table.column("price").unwrap().field_type,
			FieldType::Decimal {
				precision: 8,
				scale: 3
			}
		);
	}

	#[rstest]
	fn test_timestamps_appended_unless_declared(analyzer: ModelAnalyzer) {
		let description = model(vec![
			FieldDescription::new("id", "i64"),
			FieldDescription::new("created_at", "DateTime<Utc>").nullable(true),
		])
		.timestamps(true);

		let table = analyzer.analyze(&description).unwrap();
		let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["id", "created_at", "updated_at"]);
		assert!(table.column("created_at").unwrap().nullable);

		let updated_at = table.column("updated_at").unwrap();
		assert!(!updated_at.nullable);
		assert_eq!(updated_at.default.as_deref(), Some("CURRENT_TIMESTAMP"));
		assert!(table.timestamps);
	}

	#[rstest]
	fn test_enabling_timestamps_migrates_to_an_equivalent_table(analyzer: ModelAnalyzer) {
		// Arrange
		let fields = vec![
			FieldDescription::new("id", "i64"),
			FieldDescription::new("name", "String"),
		];
		let before = analyzer.analyze(&model(fields.clone())).unwrap();
		let after = analyzer.analyze(&model(fields).timestamps(true)).unwrap();

		// Act
		let operations = crate::migrations::SchemaDiffer::diff(Some(&before), &after).unwrap();
		let migrated = crate::migrations::operations::apply_all(&operations, Some(before)).unwrap();

		// Assert
		assert_eq!(operations.len(), 2);
		assert!(migrated.is_equivalent(&after));
	}

	#[rstest]
	fn test_indexes_and_foreign_keys(analyzer: ModelAnalyzer) {
		let description = ModelDescription::new("Post", "posts")
			.field(FieldDescription::new("id", "i64"))
			.field(
				FieldDescription::new("author_id", "i64")
					.references("users", "id")
					.index(),
			)
			.field(FieldDescription::new("slug", "String"))
			.index(IndexDefinition::new("posts_author_slug_idx", ["author_id", "slug"]).unique(true));

		let table = analyzer.analyze(&description).unwrap();
		let index_names: Vec<&str> = table.indexes.iter().map(|i| i.name.as_str()).collect();
		assert_eq!(
			index_names,
			vec!["posts_author_id_idx", "posts_author_slug_idx"]
		);
		assert_eq!(
			table.foreign_keys,
			vec![ForeignKeyDefinition::new("author_id", "users", "id")]
		);
	}

	#[rstest]
	fn test_primary_key_field_is_configurable() {
		let analyzer = ModelAnalyzer::new(AnalyzerSettings {
			primary_key_field: "uid".to_string(),
			..Default::default()
		});
		let table = analyzer
			.analyze(&model(vec![
				FieldDescription::new("uid", "i64"),
				FieldDescription::new("id", "i64"),
			]))
			.unwrap();
		assert!(table.column("uid").unwrap().primary_key);
		assert!(!table.column("id").unwrap().primary_key);
	}

	#[rstest]
	#[case::empty_table(ModelDescription::new("User", " ").field(FieldDescription::new("id", "i64")))]
	#[case::no_fields(ModelDescription::new("User", "users"))]
	#[case::duplicate_field(
		ModelDescription::new("User", "users")
			.field(FieldDescription::new("id", "i64"))
			.field(FieldDescription::new("id", "i32"))
	)]
	#[case::unknown_index_column(
		ModelDescription::new("User", "users")
			.field(FieldDescription::new("id", "i64"))
			.index(IndexDefinition::new("users_email_idx", ["email"]))
	)]
	fn test_unusable_descriptions(analyzer: ModelAnalyzer, #[case] description: ModelDescription) {
		assert!(matches!(
			analyzer.analyze(&description),
			Err(MigrationError::AnalysisError(_))
		));
	}

	#[rstest]
	fn test_case_only_duplicates_are_left_to_the_differ(analyzer: ModelAnalyzer) {
		let table = analyzer
			.analyze(&model(vec![
				FieldDescription::new("id", "i64"),
				FieldDescription::new("Email", "String"),
				FieldDescription::new("email", "String"),
			]))
			.unwrap();
		assert_eq!(table.columns.len(), 3);
	}

	#[rstest]
	fn test_analysis_is_deterministic(analyzer: ModelAnalyzer) {
		let description = model(vec![
			FieldDescription::new("id", "i64"),
			FieldDescription::new("name", "String").index(),
		])
		.timestamps(true);
		assert_eq!(
			analyzer.analyze(&description).unwrap(),
			analyzer.analyze(&description).unwrap()
		);
	}
}
