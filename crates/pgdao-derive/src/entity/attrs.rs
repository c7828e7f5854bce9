//! Attribute parsing for the Entity derive macro.
//!
//! Handles struct-level and field-level `#[dao(...)]` attributes.

use syn::{Attribute, LitStr, Result};

/// Struct-level options: `#[dao(table = "...", name = "...")]`.
#[derive(Default)]
pub(super) struct StructAttr {
    pub table: Option<LitStr>,
    pub name: Option<LitStr>,
}

/// Field-level options: `#[dao(id, column = "...", references = "...", skip)]`.
#[derive(Default)]
pub(super) struct FieldAttr {
    pub is_id: bool,
    pub skip: bool,
    pub column: Option<LitStr>,
    pub references: Option<LitStr>,
}

impl syn::parse::Parse for StructAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut out = StructAttr::default();
        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            let _: syn::Token![=] = input.parse()?;
            let value: LitStr = input.parse()?;
            match key.to_string().as_str() {
                "table" => out.table = Some(value),
                "name" => out.name = Some(value),
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!("unknown entity attribute `{other}` (expected `table` or `name`)"),
                    ));
                }
            }
            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }
        Ok(out)
    }
}

impl syn::parse::Parse for FieldAttr {
    fn parse(input: syn::parse::ParseStream) -> Result<Self> {
        let mut out = FieldAttr::default();
        while !input.is_empty() {
            let key: syn::Ident = input.parse()?;
            match key.to_string().as_str() {
                "id" => out.is_id = true,
                "skip" => out.skip = true,
                "column" | "references" => {
                    let _: syn::Token![=] = input.parse()?;
                    let value: LitStr = input.parse()?;
                    if key == "column" {
                        out.column = Some(value);
                    } else {
                        out.references = Some(value);
                    }
                }
                other => {
                    return Err(syn::Error::new(
                        key.span(),
                        format!(
                            "unknown field attribute `{other}` (expected `id`, `column`, `references` or `skip`)"
                        ),
                    ));
                }
            }
            if input.peek(syn::Token![,]) {
                let _: syn::Token![,] = input.parse()?;
            } else {
                break;
            }
        }
        Ok(out)
    }
}

/// Merge every `#[dao(...)]` attribute in `attrs`; later values win.
pub(super) fn struct_attr(attrs: &[Attribute]) -> Result<StructAttr> {
    let mut out = StructAttr::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("dao")) {
        let parsed: StructAttr = attr.parse_args()?;
        out.table = parsed.table.or(out.table);
        out.name = parsed.name.or(out.name);
    }
    Ok(out)
}

pub(super) fn field_attr(attrs: &[Attribute]) -> Result<FieldAttr> {
    let mut out = FieldAttr::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("dao")) {
        let parsed: FieldAttr = attr.parse_args()?;
        out.is_id |= parsed.is_id;
        out.skip |= parsed.skip;
        out.column = parsed.column.or(out.column);
        out.references = parsed.references.or(out.references);
    }
    Ok(out)
}
