//! Derive macros for pgdao
//!
//! Provides `#[derive(Entity)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod common;
mod entity;
mod sql_ident;

/// Derive `pgdao::Entity` for a struct with named fields.
///
/// # Example
///
/// ```ignore
/// use pgdao::Entity;
///
/// #[derive(Debug, Clone, Entity)]
/// #[dao(table = "orders")]
/// struct Order {
///     #[dao(id)]
///     id: Option<i64>,
///     #[dao(column = "order_date")]
///     order_date: chrono::NaiveDateTime,
///     #[dao(references = "Customer")]
///     customer_id: Option<i64>,
/// }
/// ```
///
/// # Attributes
///
/// - `#[dao(table = "name")]` - Table name (defaults to the snake_case type name)
/// - `#[dao(name = "Name")]` - Record-type name used in query targets (defaults to the type name)
/// - `#[dao(id)]` - Identifier field (defaults to a field named `id`); must be an `Option`
/// - `#[dao(column = "name")]` - Map field to a different column name
/// - `#[dao(references = "Type")]` - Foreign key to another entity, used by implicit joins
/// - `#[dao(skip)]` - Not persisted; filled with `Default::default()` when loading
///
/// The entity is also registered through `inventory`, so `pgdao::Registry::global()`
/// can resolve it by name.
#[proc_macro_derive(Entity, attributes(dao))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    entity::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
