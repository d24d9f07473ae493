//! Implementation of `#[derive(Model)]`.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Path, spanned::Spanned};

use crate::attr_parser::{FieldAttrs, ModelAttrs};

const DEFAULT_CRATE_PATH: &str = "::automigrate_db::migrations";

pub(crate) fn derive_model_impl(input: DeriveInput) -> syn::Result<TokenStream> {
	let struct_name = &input.ident;

	let mut model_attrs = ModelAttrs::default();
	for attr in input.attrs.iter().filter(|a| a.path().is_ident("model")) {
		model_attrs.merge(attr.parse_args::<ModelAttrs>()?, attr.span())?;
	}

	let fields = match &input.data {
		Data::Struct(data) => match &data.fields {
			Fields::Named(fields) => &fields.named,
			_ => {
				return Err(syn::Error::new_spanned(
					&input,
					"#[derive(Model)] only supports structs with named fields",
				));
			}
		},
		_ => {
			return Err(syn::Error::new_spanned(
				&input,
				"#[derive(Model)] only supports structs",
			));
		}
	};

	let krate: Path = match model_attrs.crate_path {
		Some(path) => path,
		None => syn::parse_str(DEFAULT_CRATE_PATH)?,
	};
	let model_name = struct_name.to_string();
	let table_name = model_attrs
		.table
		.unwrap_or_else(|| to_snake_case(&model_name));

	let mut field_descriptions = Vec::new();
	for field in fields {
		let mut attrs = FieldAttrs::default();
		for attr in field.attrs.iter().filter(|a| a.path().is_ident("field")) {
			attrs.merge(attr.parse_args::<FieldAttrs>()?, attr.span())?;
		}
		if attrs.skip == Some(true) {
			continue;
		}

		let ident = field
			.ident
			.as_ref()
			.ok_or_else(|| syn::Error::new_spanned(field, "expected a named field"))?;
		let column = attrs
			.column
			.clone()
			.unwrap_or_else(|| ident.to_string().trim_start_matches("r#").to_string());
		let ty = &field.ty;
		let declared_type = attrs
			.db_type
			.clone()
			.unwrap_or_else(|| quote!(#ty).to_string());

		let primary_key = match (&model_attrs.primary_key, attrs.primary_key) {
			(_, Some(explicit)) => Some(explicit),
			(Some(pk_field), None) => Some(*pk_field == column),
			(None, None) => None,
		};

		let mut calls = Vec::new();
		if let Some(primary_key) = primary_key {
			calls.push(quote! { .primary_key(#primary_key) });
		}
		if let Some(nullable) = attrs.nullable {
			calls.push(quote! { .nullable(#nullable) });
		}
		if attrs.auto_increment == Some(true) {
			calls.push(quote! { .auto_increment() });
		}
		if attrs.unique == Some(true) {
			calls.push(quote! { .unique() });
		}
		if attrs.index == Some(true) {
			calls.push(quote! { .index() });
		}
		if let Some(default) = &attrs.default {
			calls.push(quote! { .default_value(#default) });
		}
		if let Some(max_length) = attrs.max_length {
			calls.push(quote! { .max_length(#max_length) });
		}
		if let Some(precision) = attrs.precision {
			calls.push(quote! { .precision(#precision) });
		}
		if let Some(scale) = attrs.scale {
			calls.push(quote! { .scale(#scale) });
		}
		if let Some((table, column)) = &attrs.references {
			calls.push(quote! { .references(#table, #column) });
		}

		field_descriptions.push(quote! {
			.field(#krate::FieldDescription::new(#column, #declared_type) #(#calls)*)
		});
	}

	if field_descriptions.is_empty() {
		return Err(syn::Error::new_spanned(
			&input,
			"#[derive(Model)] requires at least one field that is not skipped",
		));
	}

	let indexes = model_attrs.indexes.iter().map(|index| {
		let name = &index.name;
		let columns = &index.columns;
		let unique = index.unique;
		quote! {
			.index(#krate::IndexDefinition::new(#name, [#(#columns),*]).unique(#unique))
		}
	});
	let timestamps = model_attrs.timestamps.unwrap_or(false);

	let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

	Ok(quote! {
		#[automatically_derived]
		impl #impl_generics #krate::Model for #struct_name #ty_generics #where_clause {
			fn describe() -> #krate::ModelDescription {
				#krate::ModelDescription::new(#model_name, #table_name)
					#(#field_descriptions)*
					#(#indexes)*
					.timestamps(#timestamps)
			}
		}
	})
}

/// `UserProfile` -> `user_profile`, `HTTPRequest` -> `http_request`
pub(crate) fn to_snake_case(name: &str) -> String {
	let chars: Vec<char> = name.chars().collect();
	let mut out = String::with_capacity(name.len() + 4);
	for (i, &c) in chars.iter().enumerate() {
		if c.is_uppercase() {
			let prev = i.checked_sub(1).map(|p| chars[p]);
			let next = chars.get(i + 1).copied();
			let boundary = match prev {
				Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
				Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
				_ => false,
			};
			if boundary && !out.ends_with('_') {
				out.push('_');
			}
			out.extend(c.to_lowercase());
		} else {
			out.push(c);
		}
	}
	out
}
