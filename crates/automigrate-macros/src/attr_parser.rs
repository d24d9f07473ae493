//! Attribute parsing for `#[model(...)]` and `#[field(...)]`.

use proc_macro2::Span;
use syn::{
	Error, Ident, Lit, Path, Result, Token,
	ext::IdentExt,
	parenthesized,
	parse::{Parse, ParseStream},
	punctuated::Punctuated,
};

/// Single attribute item: a flag, a name-value pair or a nested list.
pub(crate) enum AttrItem {
	/// Flag attribute (e.g., `primary_key`, `timestamps`)
	Flag(Ident),
	/// Name-value attribute (e.g., `max_length = 50`)
	NameValue { name: Ident, value: Lit },
	/// Nested list (e.g., `index(name = "x", columns = "a, b")`)
	List {
		name: Ident,
		items: Punctuated<AttrItem, Token![,]>,
	},
}

impl Parse for AttrItem {
	fn parse(input: ParseStream) -> Result<Self> {
		// `type` and friends are keywords, so accept any identifier
		let name = input.call(Ident::parse_any)?;

		if input.peek(Token![=]) {
			let _eq: Token![=] = input.parse()?;
			let value: Lit = input.parse()?;
			Ok(AttrItem::NameValue { name, value })
		} else if input.peek(syn::token::Paren) {
			let content;
			parenthesized!(content in input);
			let items = Punctuated::<AttrItem, Token![,]>::parse_terminated(&content)?;
			Ok(AttrItem::List { name, items })
		} else {
			Ok(AttrItem::Flag(name))
		}
	}
}

fn lit_to_string(lit: &Lit) -> Result<String> {
	match lit {
		Lit::Str(s) => Ok(s.value()),
		Lit::Int(i) => Ok(i.base10_digits().to_string()),
		Lit::Float(f) => Ok(f.base10_digits().to_string()),
		Lit::Bool(b) => Ok(b.value.to_string()),
		_ => Err(Error::new(
			lit.span(),
			"unsupported literal type, expected a string, number or bool",
		)),
	}
}

fn lit_to_u32(name: &Ident, lit: &Lit) -> Result<u32> {
	match lit {
		Lit::Int(i) => i.base10_parse(),
		Lit::Str(s) => s
			.value()
			.trim()
			.parse()
			.map_err(|_| Error::new(s.span(), format!("`{}` expects a positive integer", name))),
		_ => Err(Error::new(
			lit.span(),
			format!("`{}` expects a positive integer", name),
		)),
	}
}

fn lit_to_bool(name: &Ident, lit: &Lit) -> Result<bool> {
	match lit {
		Lit::Bool(b) => Ok(b.value),
		_ => Err(Error::new(
			lit.span(),
			format!("`{}` expects `true` or `false`", name),
		)),
	}
}

fn set_once<T>(slot: &mut Option<T>, name: &Ident, value: T) -> Result<()> {
	if slot.is_some() {
		return Err(Error::new(
			name.span(),
			format!("duplicate `{}` attribute", name),
		));
	}
	*slot = Some(value);
	Ok(())
}

/// Parsed attributes from `#[field(...)]`.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldAttrs {
	pub(crate) primary_key: Option<bool>,
	pub(crate) auto_increment: Option<bool>,
	pub(crate) unique: Option<bool>,
	pub(crate) index: Option<bool>,
	pub(crate) nullable: Option<bool>,
	/// SQL literal used as the column default
	pub(crate) default: Option<String>,
	pub(crate) max_length: Option<u32>,
	pub(crate) precision: Option<u32>,
	pub(crate) scale: Option<u32>,
	/// Declared type override, e.g. `"decimal"`
	pub(crate) db_type: Option<String>,
	/// `(table, column)` parsed from `"table.column"`
	pub(crate) references: Option<(String, String)>,
	/// Column name override
	pub(crate) column: Option<String>,
	pub(crate) skip: Option<bool>,
}

impl FieldAttrs {
	pub(crate) fn merge(&mut self, other: FieldAttrs, span: Span) -> Result<()> {
		macro_rules! merge_field {
			($($field:ident),*) => {
				$(
					if let Some(value) = other.$field {
						if self.$field.is_some() {
							return Err(Error::new(
								span,
								concat!("duplicate `", stringify!($field), "` attribute"),
							));
						}
						self.$field = Some(value);
					}
				)*
			};
		}
		merge_field!(
			primary_key,
			auto_increment,
			unique,
			index,
			nullable,
			default,
			max_length,
			precision,
			scale,
			db_type,
			references,
			column,
			skip
		);
		Ok(())
	}
}

impl Parse for FieldAttrs {
	fn parse(input: ParseStream) -> Result<Self> {
		let items = Punctuated::<AttrItem, Token![,]>::parse_terminated(input)?;
		let mut result = Self::default();

		for item in items {
			match item {
				AttrItem::Flag(name) => {
					let slot = match name.to_string().as_str() {
						"primary_key" => &mut result.primary_key,
						"auto_increment" => &mut result.auto_increment,
						"unique" => &mut result.unique,
						"index" => &mut result.index,
						"nullable" => &mut result.nullable,
						"skip" => &mut result.skip,
						"not_null" => {
							set_once(&mut result.nullable, &name, false)?;
							continue;
						}
						_ => {
							return Err(Error::new(
								name.span(),
								format!("unknown flag attribute `{}`", name),
							));
						}
					};
					set_once(slot, &name, true)?;
				}
				AttrItem::NameValue { name, value } => match name.to_string().as_str() {
					"primary_key" => set_once(&mut result.primary_key, &name, lit_to_bool(&name, &value)?)?,
					"auto_increment" => {
						set_once(&mut result.auto_increment, &name, lit_to_bool(&name, &value)?)?
					}
					"unique" => set_once(&mut result.unique, &name, lit_to_bool(&name, &value)?)?,
					"index" => set_once(&mut result.index, &name, lit_to_bool(&name, &value)?)?,
					"nullable" => set_once(&mut result.nullable, &name, lit_to_bool(&name, &value)?)?,
					"skip" => set_once(&mut result.skip, &name, lit_to_bool(&name, &value)?)?,
					"default" => set_once(&mut result.default, &name, lit_to_string(&value)?)?,
					"max_length" => set_once(&mut result.max_length, &name, lit_to_u32(&name, &value)?)?,
					"precision" => set_once(&mut result.precision, &name, lit_to_u32(&name, &value)?)?,
					"scale" => set_once(&mut result.scale, &name, lit_to_u32(&name, &value)?)?,
					"db_type" => set_once(&mut result.db_type, &name, lit_to_string(&value)?)?,
					"column" => set_once(&mut result.column, &name, lit_to_string(&value)?)?,
					"references" => {
						let target = lit_to_string(&value)?;
						let parsed = match target.split_once('.') {
							Some((table, column))
								if !table.trim().is_empty() && !column.trim().is_empty() =>
							{
								(table.trim().to_string(), column.trim().to_string())
							}
							_ => {
								return Err(Error::new(
									value.span(),
									"`references` expects \"table.column\"",
								));
							}
						};
						set_once(&mut result.references, &name, parsed)?;
					}
					_ => {
						return Err(Error::new(
							name.span(),
							format!("unknown attribute `{}`", name),
						));
					}
				},
				AttrItem::List { name, .. } => {
					return Err(Error::new(
						name.span(),
						format!("unknown attribute `{}`", name),
					));
				}
			}
		}

		Ok(result)
	}
}

/// Model-level composite index
#[derive(Debug, Clone)]
pub(crate) struct IndexAttrs {
	pub(crate) name: String,
	pub(crate) columns: Vec<String>,
	pub(crate) unique: bool,
}

impl IndexAttrs {
	fn from_items(span: Span, items: Punctuated<AttrItem, Token![,]>) -> Result<Self> {
		let mut name = None;
		let mut columns = None;
		let mut unique = None;

		for item in items {
			match item {
				AttrItem::Flag(flag) if flag == "unique" => set_once(&mut unique, &flag, true)?,
				AttrItem::NameValue { name: key, value } => match key.to_string().as_str() {
					"name" => set_once(&mut name, &key, lit_to_string(&value)?)?,
					"columns" => {
						let parsed: Vec<String> = lit_to_string(&value)?
							.split(',')
							.map(|c| c.trim().to_string())
							.filter(|c| !c.is_empty())
							.collect();
						set_once(&mut columns, &key, parsed)?;
					}
					"unique" => set_once(&mut unique, &key, lit_to_bool(&key, &value)?)?,
					_ => {
						return Err(Error::new(
							key.span(),
							format!("unknown index attribute `{}`", key),
						));
					}
				},
				AttrItem::Flag(flag) => {
					return Err(Error::new(
						flag.span(),
						format!("unknown index attribute `{}`", flag),
					));
				}
				AttrItem::List { name: key, .. } => {
					return Err(Error::new(
						key.span(),
						format!("unknown index attribute `{}`", key),
					));
				}
			}
		}

		Ok(Self {
			name: name.ok_or_else(|| Error::new(span, "`index(...)` requires `name`"))?,
			columns: columns.ok_or_else(|| Error::new(span, "`index(...)` requires `columns`"))?,
			unique: unique.unwrap_or(false),
		})
	}
}

/// Parsed attributes from `#[model(...)]`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ModelAttrs {
	/// Table name, defaults to the snake_case struct name
	pub(crate) table: Option<String>,
	pub(crate) timestamps: Option<bool>,
	/// Name of the primary key field
	pub(crate) primary_key: Option<String>,
	/// Path to the `migrations` module of automigrate-db
	pub(crate) crate_path: Option<Path>,
	pub(crate) indexes: Vec<IndexAttrs>,
}

impl ModelAttrs {
	pub(crate) fn merge(&mut self, other: ModelAttrs, span: Span) -> Result<()> {
		macro_rules! merge_field {
			($($field:ident),*) => {
				$(
					if let Some(value) = other.$field {
						if self.$field.is_some() {
							return Err(Error::new(
								span,
								concat!("duplicate `", stringify!($field), "` attribute"),
							));
						}
						self.$field = Some(value);
					}
				)*
			};
		}
		merge_field!(table, timestamps, primary_key, crate_path);
		self.indexes.extend(other.indexes);
		Ok(())
	}
}

impl Parse for ModelAttrs {
	fn parse(input: ParseStream) -> Result<Self> {
		let items = Punctuated::<AttrItem, Token![,]>::parse_terminated(input)?;
		let mut result = Self::default();

		for item in items {
			match item {
				AttrItem::Flag(name) if name == "timestamps" => {
					set_once(&mut result.timestamps, &name, true)?
				}
				AttrItem::Flag(name) => {
					return Err(Error::new(
						name.span(),
						format!("unknown flag attribute `{}`", name),
					));
				}
				AttrItem::NameValue { name, value } => match name.to_string().as_str() {
					"table" => set_once(&mut result.table, &name, lit_to_string(&value)?)?,
					"timestamps" => {
						set_once(&mut result.timestamps, &name, lit_to_bool(&name, &value)?)?
					}
					"primary_key" => {
						set_once(&mut result.primary_key, &name, lit_to_string(&value)?)?
					}
					"crate_path" => {
						let path: Path = syn::parse_str(&lit_to_string(&value)?)
							.map_err(|e| Error::new(value.span(), e.to_string()))?;
						set_once(&mut result.crate_path, &name, path)?;
					}
					_ => {
						return Err(Error::new(
							name.span(),
							format!("unknown attribute `{}`", name),
						));
					}
				},
				AttrItem::List { name, items } if name == "index" => {
					result.indexes.push(IndexAttrs::from_items(name.span(), items)?);
				}
				AttrItem::List { name, .. } => {
					return Err(Error::new(
						name.span(),
						format!("unknown attribute `{}`", name),
					));
				}
			}
		}

		Ok(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use syn::parse_quote;

	#[test]
	fn test_parse_field_flags() {
		let attrs: FieldAttrs = parse_quote! { primary_key, auto_increment };

		assert_eq!(attrs.primary_key, Some(true));
		assert_eq!(attrs.auto_increment, Some(true));
		assert_eq!(attrs.unique, None);
	}

	#[test]
	fn test_parse_flags_with_explicit_bool() {
		let attrs: FieldAttrs = parse_quote! { primary_key = false, nullable = true };

		assert_eq!(attrs.primary_key, Some(false));
		assert_eq!(attrs.nullable, Some(true));
	}

	#[test]
	fn test_parse_field_name_values() {
		let attrs: FieldAttrs = parse_quote! {
			max_length = 50, default = "'anonymous'", column = "display_name", references = "users.id"
		};

		assert_eq!(attrs.max_length, Some(50));
		assert_eq!(attrs.default.as_deref(), Some("'anonymous'"));
		assert_eq!(attrs.column.as_deref(), Some("display_name"));
		assert_eq!(
			attrs.references,
			Some(("users".to_string(), "id".to_string()))
		);
	}

	#[test]
	fn test_not_null_sets_nullable_false() {
		let attrs: FieldAttrs = parse_quote! { not_null };
		assert_eq!(attrs.nullable, Some(false));
	}

	#[test]
	fn test_duplicate_flag_error() {
		let result: Result<FieldAttrs> = syn::parse2(parse_quote! { unique, unique });

		assert!(
			result
				.unwrap_err()
				.to_string()
				.contains("duplicate `unique` attribute")
		);
	}

	#[test]
	fn test_bad_reference_error() {
		let result: Result<FieldAttrs> = syn::parse2(parse_quote! { references = "users" });
		assert!(result.is_err());
	}

	#[test]
	fn test_unknown_flag_error() {
		let result: Result<FieldAttrs> = syn::parse2(parse_quote! { required });

		assert!(
			result
				.unwrap_err()
				.to_string()
				.contains("unknown flag attribute `required`")
		);
	}

	#[test]
	fn test_parse_model_attrs() {
		let attrs: ModelAttrs = parse_quote! {
			table = "accounts",
			timestamps,
			index(name = "accounts_org_email_idx", columns = "org_id, email", unique)
		};

		assert_eq!(attrs.table.as_deref(), Some("accounts"));
		assert_eq!(attrs.timestamps, Some(true));
		assert_eq!(attrs.indexes.len(), 1);
		assert_eq!(attrs.indexes[0].columns, vec!["org_id", "email"]);
		assert!(attrs.indexes[0].unique);
	}

	#[test]
	fn test_index_requires_name_and_columns() {
		let result: Result<ModelAttrs> = syn::parse2(parse_quote! { index(columns = "a") });
		assert!(result.unwrap_err().to_string().contains("requires `name`"));
	}

	#[test]
	fn test_crate_path_must_be_a_path() {
		let attrs: ModelAttrs = parse_quote! { crate_path = "automigrate::db::migrations" };
		assert!(attrs.crate_path.is_some());

		let result: Result<ModelAttrs> = syn::parse2(parse_quote! { crate_path = "not a path" });
		assert!(result.is_err());
	}
}
