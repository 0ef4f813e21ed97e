//! Implementation of the `#[derive(Entity)]` macro.

use std::collections::HashSet;

use convert_case::{Case, Casing};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Ident, LitStr, Path};

/// Parse and generate code for the `#[derive(Entity)]` macro.
pub fn derive_entity_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity derive does not support generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive only supports structs",
            ));
        }
    };

    let struct_attrs = parse_struct_attrs(input)?;
    let krate = struct_attrs
        .krate
        .unwrap_or_else(|| syn::parse_quote!(::quarry_mongodb));

    let mut field_infos = Vec::new();
    let mut seen = HashSet::new();
    for field in fields {
        let Some(info) = parse_field(field, struct_attrs.rename_all)? else {
            continue;
        };
        if !seen.insert(info.column_name.clone()) {
            return Err(syn::Error::new_spanned(
                field,
                format!("column `{}` is mapped more than once", info.column_name),
            ));
        }
        field_infos.push(info);
    }

    if field_infos.is_empty() {
        return Err(syn::Error::new_spanned(
            input,
            "Entity must map at least one field",
        ));
    }

    let columns = field_infos.iter().map(|field| generate_column(field, &krate));

    Ok(quote! {
        impl #krate::entity::Entity for #name {
            fn columns() -> &'static [#krate::entity::Column<Self>] {
                static COLUMNS: &[#krate::entity::Column<#name>] = &[
                    #(#columns),*
                ];
                COLUMNS
            }

            fn entity_name() -> &'static str {
                stringify!(#name)
            }
        }
    })
}

/// Struct-level attributes.
#[derive(Default)]
struct StructAttrs {
    krate: Option<Path>,
    rename_all: Option<Case>,
}

/// Parse struct-level `#[entity(...)]` attributes.
fn parse_struct_attrs(input: &DeriveInput) -> Result<StructAttrs, syn::Error> {
    let mut attrs = StructAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.krate = Some(value.parse()?);
            } else if meta.path.is_ident("rename_all") {
                let value: LitStr = meta.value()?.parse()?;
                attrs.rename_all = Some(parse_case(&value)?);
            } else {
                return Err(meta.error("unsupported entity attribute"));
            }
            Ok(())
        })?;
    }

    Ok(attrs)
}

fn parse_case(value: &LitStr) -> Result<Case, syn::Error> {
    match value.value().as_str() {
        "snake_case" => Ok(Case::Snake),
        "camelCase" => Ok(Case::Camel),
        "PascalCase" => Ok(Case::Pascal),
        "SCREAMING_SNAKE_CASE" => Ok(Case::ScreamingSnake),
        "kebab-case" => Ok(Case::Kebab),
        "lowercase" => Ok(Case::Flat),
        "UPPERCASE" => Ok(Case::UpperFlat),
        other => Err(syn::Error::new_spanned(
            value,
            format!("unknown rename_all style `{other}`"),
        )),
    }
}

/// Information about a mapped field.
#[derive(Debug)]
struct FieldInfo {
    name: Ident,
    column_name: String,
    desc: String,
}

/// Parse a field and its `#[entity(...)]` attributes. `None` when skipped.
fn parse_field(field: &syn::Field, rename_all: Option<Case>) -> Result<Option<FieldInfo>, syn::Error> {
    let name = field
        .ident
        .clone()
        .ok_or_else(|| syn::Error::new_spanned(field, "Fields must be named"))?;

    let raw_name = name.to_string();
    let raw_name = raw_name.strip_prefix("r#").unwrap_or(&raw_name).to_string();
    let mut column_name = match rename_all {
        Some(case) => raw_name.to_case(case),
        None => raw_name,
    };
    let mut desc = String::new();
    let mut skip = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("column") {
                let value: LitStr = meta.value()?.parse()?;
                if value.value().trim().is_empty() {
                    return Err(syn::Error::new_spanned(value, "column name cannot be blank"));
                }
                column_name = value.value();
            } else if meta.path.is_ident("desc") {
                let value: LitStr = meta.value()?.parse()?;
                desc = value.value();
            } else if meta.path.is_ident("skip") {
                skip = true;
            } else {
                return Err(meta.error("unsupported entity field attribute"));
            }
            Ok(())
        })?;
    }

    if skip {
        return Ok(None);
    }

    Ok(Some(FieldInfo {
        name,
        column_name,
        desc,
    }))
}

/// Generate one column table entry.
fn generate_column(field: &FieldInfo, krate: &Path) -> TokenStream {
    let ident = &field.name;
    let field_name = ident.to_string();
    let field_name = field_name.strip_prefix("r#").unwrap_or(&field_name);
    let column_name = &field.column_name;
    let desc = &field.desc;

    quote! {
        #krate::entity::Column {
            field: #field_name,
            column: #column_name,
            desc: #desc,
            assign: |entity, value, coercer| {
                #krate::entity::assign(&mut entity.#ident, value, coercer)
            },
            read: |entity, coercer| #krate::entity::read(&entity.#ident, coercer),
        }
    }
}
