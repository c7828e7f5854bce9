use proc_macro2::Span;
use syn::{Error, Result};

pub(crate) fn is_valid_sql_ident(s: &str) -> bool {
    let mut chars = s.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Reject names that could not be emitted unquoted into SQL.
pub(crate) fn check_sql_ident(value: &str, span: Span, what: &str) -> Result<()> {
    if is_valid_sql_ident(value) {
        return Ok(());
    }
    Err(Error::new(
        span,
        format!("{what} '{value}' is not a valid SQL identifier (expected [A-Za-z_][A-Za-z0-9_]*)"),
    ))
}
