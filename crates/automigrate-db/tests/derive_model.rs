//! `#[derive(Model)]` feeding the analyzer

use automigrate_db::conf::AnalyzerSettings;
use automigrate_db::migrations::{
	FieldType, IndexDefinition, Model, ModelAnalyzer, ModelRegistry, SchemaDiffer,
};
use automigrate_macros::Model;
use rstest::*;

#[allow(dead_code)]
#[derive(Model)]
#[model(table = "accounts", timestamps)]
#[model(index(name = "accounts_org_email_idx", columns = "org_id, email", unique))]
struct Account {
	#[field(primary_key, auto_increment)]
	id: i64,
	#[field(max_length = 120, unique)]
	email: String,
	#[field(references = "organizations.id", index)]
	org_id: i64,
	nickname: Option<String>,
	#[field(precision = 12, scale = 4)]
	balance: f64,
	#[field(default = "TRUE")]
	active: bool,
	settings: serde_json::Value,
	#[field(column = "display")]
	display_name: Option<String>,
	#[field(skip)]
	session_cache: Vec<u8>,
}

#[allow(dead_code)]
#[derive(Model)]
struct OrganizationUnit {
	id: i64,
	#[field(not_null)]
	label: Option<String>,
}

#[allow(dead_code)]
#[derive(Model)]
#[model(table = "countries", primary_key = "code")]
struct Country {
	#[field(max_length = 2)]
	code: String,
	name: String,
}

#[fixture]
fn analyzer() -> ModelAnalyzer {
	ModelAnalyzer::new(AnalyzerSettings::default())
}

#[rstest]
fn test_derived_description(analyzer: ModelAnalyzer) {
	// Arrange
	let description = Account::describe();

	// Act
	let table = analyzer.analyze(&description).unwrap();

	// Assert
	assert_eq!(description.model_name, "Account");
	assert_eq!(table.name, "accounts");
	let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
	assert_eq!(
		names,
		vec![
			"id",
			"email",
			"org_id",
			"nickname",
			"balance",
			"active",
			"settings",
			"display",
			"created_at",
			"updated_at",
		]
	);

	let id = table.column("id").unwrap();
	assert!(id.primary_key && id.auto_increment && !id.nullable);

	let email = table.column("email").unwrap();
	assert_eq!(email.field_type, FieldType::VarChar(120));
	assert!(email.unique);

	assert!(table.column("nickname").unwrap().nullable);
	assert_eq!(
		table.column("balance").unwrap().field_type,
		FieldType::Decimal {
			precision: 12,
			scale: 4
		}
	);
	assert_eq!(table.column("active").unwrap().default.as_deref(), Some("TRUE"));
	assert_eq!(table.column("settings").unwrap().field_type, FieldType::Json);

	assert_eq!(table.foreign_keys.len(), 1);
	assert_eq!(table.foreign_keys[0].referenced_table, "organizations");
	assert!(table.index("accounts_org_id_idx").is_some());
	assert_eq!(
		table.index("accounts_org_email_idx"),
		Some(&IndexDefinition::new("accounts_org_email_idx", ["org_id", "email"]).unique(true))
	);
}

#[rstest]
fn test_default_table_name_and_nullability_override(analyzer: ModelAnalyzer) {
	let table = analyzer.analyze(&OrganizationUnit::describe()).unwrap();

	assert_eq!(table.name, "organization_unit");
	assert!(table.column("id").unwrap().primary_key);
	assert!(!table.column("label").unwrap().nullable);
}

#[rstest]
fn test_model_level_primary_key(analyzer: ModelAnalyzer) {
	let table = analyzer.analyze(&Country::describe()).unwrap();

	let code = table.column("code").unwrap();
	assert!(code.primary_key);
	assert_eq!(code.field_type, FieldType::VarChar(2));
	assert!(!table.column("name").unwrap().primary_key);
}

#[rstest]
fn test_registry_of_derived_models_diffs_cleanly(analyzer: ModelAnalyzer) {
	let registry = ModelRegistry::new().with::<Account>().with::<Country>();

	for description in registry.iter() {
		let table = analyzer.analyze(description).unwrap();
		let operations = SchemaDiffer::diff(None, &table).unwrap();
		assert_eq!(operations.len(), 1);
		assert!(SchemaDiffer::diff(Some(&table), &table).unwrap().is_empty());
	}
	assert_eq!(registry.len(), 2);
}
