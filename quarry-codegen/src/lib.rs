//! Procedural macros for quarry.
//!
//! # Macros
//!
//! - [`Entity`] - Derive the static field-to-column table of an entity
//!
//! # Example
//!
//! ```rust,ignore
//! #[derive(Debug, Default, quarry::Entity)]
//! #[entity(crate = "quarry::mongodb")]
//! struct SimInfo {
//!     #[entity(column = "_id", desc = "ICCID")]
//!     id: Option<String>,
//!     #[entity(desc = "Card status")]
//!     sim_status: Option<String>,
//!     #[entity(skip)]
//!     cached: bool,
//! }
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod derive;

/// Derive `Entity` for a struct with named fields.
///
/// Every field is mapped unless marked `#[entity(skip)]`. The stored column
/// defaults to the field name, converted by the struct-level `rename_all`
/// when one is given.
///
/// # Struct attributes
///
/// - `#[entity(crate = "path")]` - path to the `quarry_mongodb` crate
///   (default `::quarry_mongodb`)
/// - `#[entity(rename_all = "camelCase")]` - column naming for fields without
///   an explicit column; one of `snake_case`, `camelCase`, `PascalCase`,
///   `SCREAMING_SNAKE_CASE`, `kebab-case`, `lowercase`, `UPPERCASE`
///
/// # Field attributes
///
/// - `#[entity(column = "name")]` - stored column name
/// - `#[entity(desc = "text")]` - description kept in the column table
/// - `#[entity(skip)]` - leave the field out of the mapping
#[proc_macro_derive(Entity, attributes(entity))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive::derive_entity_impl(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
