//! Entity derive macro implementation
//!
//! ## Module Structure
//!
//! - `attrs`: Struct and field attribute parsing

mod attrs;

use crate::common::syn_types::is_nullable;
use crate::sql_ident::check_sql_ident;
use heck::ToSnakeCase;
use proc_macro2::{Span, TokenStream};
use quote::quote;
use syn::{Data, DeriveInput, Fields, Result};

/// One persisted field.
struct ColumnField<'a> {
    ident: &'a syn::Ident,
    ty: &'a syn::Type,
    field: String,
    column: String,
    references: Option<String>,
}

pub fn expand(input: DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Entity cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Entity can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Entity can only be derived for structs",
            ));
        }
    };

    let struct_attr = attrs::struct_attr(&input.attrs)?;
    let table = match &struct_attr.table {
        Some(lit) => {
            check_sql_ident(&lit.value(), lit.span(), "table")?;
            lit.value()
        }
        None => name.to_string().to_snake_case(),
    };
    let entity_name = struct_attr
        .name
        .as_ref()
        .map_or_else(|| name.to_string(), |lit| lit.value());

    let mut columns: Vec<ColumnField<'_>> = Vec::with_capacity(fields.len());
    let mut skipped: Vec<&syn::Ident> = Vec::new();
    let mut id_index: Option<usize> = None;

    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let attr = attrs::field_attr(&field.attrs)?;
        if attr.skip {
            if attr.is_id {
                return Err(syn::Error::new_spanned(
                    field,
                    "the identifier field cannot be skipped",
                ));
            }
            skipped.push(ident);
            continue;
        }

        let field_name = ident.to_string();
        let column = match &attr.column {
            Some(lit) => {
                check_sql_ident(&lit.value(), lit.span(), "column")?;
                lit.value()
            }
            None => field_name.trim_start_matches("r#").to_string(),
        };

        if attr.is_id {
            if id_index.is_some() {
                return Err(syn::Error::new_spanned(
                    field,
                    "only one field can be marked #[dao(id)]",
                ));
            }
            id_index = Some(columns.len());
        }

        columns.push(ColumnField {
            ident,
            ty: &field.ty,
            field: field_name.trim_start_matches("r#").to_string(),
            column,
            references: attr.references.as_ref().map(|lit| lit.value()),
        });
    }

    let id_index = id_index
        .or_else(|| columns.iter().position(|c| c.field == "id"))
        .ok_or_else(|| {
            syn::Error::new(
                Span::call_site(),
                "Entity requires an identifier: mark a field with #[dao(id)] or name it `id`",
            )
        })?;
    let id = &columns[id_index];
    if !is_nullable(id.ty) {
        return Err(syn::Error::new_spanned(
            id.ty,
            "the identifier field must be an Option so a new record can leave it unset",
        ));
    }
    let id_ident = id.ident;
    let id_ty = id.ty;
    let id_column = id.column.clone();

    let column_count = columns.len();
    let column_metas = columns.iter().map(|c| {
        let field = &c.field;
        let column = &c.column;
        let ty = c.ty;
        let nullable = is_nullable(ty);
        let references = match &c.references {
            Some(target) => quote! { ::core::option::Option::Some(#target) },
            None => quote! { ::core::option::Option::None },
        };
        quote! {
            ::pgdao::ColumnMeta {
                field: #field,
                column: #column,
                kind: <#ty as ::pgdao::FieldType>::KIND,
                nullable: #nullable,
                references: #references,
            }
        }
    });

    let to_record_sets = columns.iter().map(|c| {
        let ident = c.ident;
        let column = &c.column;
        quote! {
            record.set(#column, ::pgdao::Value::from(::core::clone::Clone::clone(&self.#ident)));
        }
    });

    let from_record_fields = columns.iter().map(|c| {
        let ident = c.ident;
        let ty = c.ty;
        let column = &c.column;
        quote! { #ident: record.get_as::<#ty>(#column)?, }
    });

    let skipped_fields = skipped.iter().map(|ident| {
        quote! { #ident: ::core::default::Default::default(), }
    });

    Ok(quote! {
        impl ::pgdao::Entity for #name {
            fn meta() -> &'static ::pgdao::EntityMeta {
                static COLUMNS: [::pgdao::ColumnMeta; #column_count] = [#(#column_metas),*];
                static META: ::pgdao::EntityMeta = ::pgdao::EntityMeta {
                    name: #entity_name,
                    table: #table,
                    id_column: #id_column,
                    columns: &COLUMNS,
                };
                &META
            }

            fn id_value(&self) -> ::pgdao::Value {
                ::pgdao::Value::from(::core::clone::Clone::clone(&self.#id_ident))
            }

            fn set_id(&mut self, id: ::pgdao::Value) -> ::pgdao::DaoResult<()> {
                self.#id_ident = <#id_ty as ::pgdao::FromValue>::from_value(id)?;
                ::core::result::Result::Ok(())
            }

            fn to_record(&self) -> ::pgdao::Record {
                let mut record = ::pgdao::Record::with_capacity(#column_count);
                #(#to_record_sets)*
                record
            }

            fn from_record(record: &::pgdao::Record) -> ::pgdao::DaoResult<Self> {
                ::core::result::Result::Ok(Self {
                    #(#from_record_fields)*
                    #(#skipped_fields)*
                })
            }
        }

        ::pgdao::inventory::submit! {
            ::pgdao::EntityRegistration {
                meta: <#name as ::pgdao::Entity>::meta,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    #[test]
    fn expands_meta_and_registration() {
        let input: DeriveInput = parse_quote! {
            #[dao(table = "orders", name = "Order")]
            struct OrderRow {
                #[dao(id)]
                order_id: Option<i64>,
                #[dao(column = "order_date")]
                placed: chrono::NaiveDateTime,
                #[dao(references = "Customer")]
                customer_id: Option<i64>,
                #[dao(skip)]
                cached: String,
            }
        };
        let out = expand(input).unwrap().to_string();
        assert!(out.contains("\"orders\""));
        assert!(out.contains("\"order_date\""));
        assert!(out.contains("\"Customer\""));
        assert!(out.contains("inventory :: submit"));
        assert!(!out.contains("\"cached\""));
    }

    #[test]
    fn defaults_table_and_id() {
        let input: DeriveInput = parse_quote! {
            struct LineItem {
                id: Option<i64>,
                sku: String,
            }
        };
        let out = expand(input).unwrap().to_string();
        assert!(out.contains("\"line_item\""));
        assert!(out.contains("id_column : \"id\""));
    }

    #[test]
    fn requires_identifier() {
        let input: DeriveInput = parse_quote! {
            struct Orphan { sku: String }
        };
        assert!(expand(input).is_err());
    }

    #[test]
    fn rejects_non_optional_identifier() {
        let input: DeriveInput = parse_quote! {
            struct Ticket {
                #[dao(id)]
                number: i64,
                title: String,
            }
        };
        let err = expand(input).unwrap_err().to_string();
        assert!(err.contains("must be an Option"));
    }

    #[test]
    fn rejects_bad_column_names() {
        let input: DeriveInput = parse_quote! {
            struct Bad {
                id: Option<i64>,
                #[dao(column = "name; drop table x")]
                name: String,
            }
        };
        assert!(expand(input).is_err());
    }
}
