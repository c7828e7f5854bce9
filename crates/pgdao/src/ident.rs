//! Field identifier validation.
//!
//! Field names in conditions and sort clauses end up in query text, so they are
//! never trusted. [`Ident`] accepts a bare name (`email`) or an alias-qualified
//! name (`cus.email`), each part matching `[A-Za-z_][A-Za-z0-9_]*`.

use crate::error::{DaoError, DaoResult};
use std::fmt;

/// A validated field identifier with an optional alias qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ident {
    qualifier: Option<String>,
    name: String,
}

impl Ident {
    /// Parse `name` or `alias.name`.
    pub fn parse(s: &str) -> DaoResult<Self> {
        if s.is_empty() {
            return Err(DaoError::validation("Field name cannot be empty"));
        }

        let mut parts = s.split('.');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(DaoError::validation(format!(
                "Field name '{s}' has more than one qualifier"
            )));
        }

        match second {
            None => {
                check_part(s, first)?;
                Ok(Self {
                    qualifier: None,
                    name: first.to_string(),
                })
            }
            Some(name) => {
                check_part(s, first)?;
                check_part(s, name)?;
                Ok(Self {
                    qualifier: Some(first.to_string()),
                    name: name.to_string(),
                })
            }
        }
    }

    /// Build an identifier from already-trusted parts (entity metadata).
    pub(crate) fn trusted(qualifier: Option<&str>, name: &str) -> Self {
        Self {
            qualifier: qualifier.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Render as query text (`alias.name` or `name`).
    pub fn to_sql(&self) -> String {
        self.to_string()
    }

    /// Bind-slot base for this identifier: dots become underscores.
    pub(crate) fn slot_base(&self) -> String {
        match &self.qualifier {
            Some(q) => format!("{q}_{}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

fn check_part(whole: &str, part: &str) -> DaoResult<()> {
    let mut chars = part.chars();
    match chars.next() {
        None => {
            return Err(DaoError::validation(format!(
                "Empty segment in field name '{whole}'"
            )));
        }
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        Some(c) => {
            return Err(DaoError::validation(format!(
                "Invalid start character '{c}' in field name '{whole}'"
            )));
        }
    }
    if let Some(c) = chars.find(|c| !(*c == '_' || c.is_ascii_alphanumeric())) {
        return Err(DaoError::validation(format!(
            "Invalid character '{c}' in field name '{whole}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ident_simple() {
        let ident = Ident::parse("email").unwrap();
        assert_eq!(ident.to_sql(), "email");
        assert_eq!(ident.qualifier(), None);
    }

    #[test]
    fn ident_qualified() {
        let ident = Ident::parse("cus.firstName").unwrap();
        assert_eq!(ident.qualifier(), Some("cus"));
        assert_eq!(ident.name(), "firstName");
        assert_eq!(ident.slot_base(), "cus_firstName");
    }

    #[test]
    fn ident_rejects_injection() {
        assert!(Ident::parse("name = 1 OR 1=1 --").is_err());
        assert!(Ident::parse("name;DROP").is_err());
        assert!(Ident::parse("'x'").is_err());
    }

    #[test]
    fn ident_rejects_bad_shapes() {
        assert!(Ident::parse("").is_err());
        assert!(Ident::parse("1col").is_err());
        assert!(Ident::parse("a..b").is_err());
        assert!(Ident::parse("a.").is_err());
        assert!(Ident::parse("a.b.c").is_err());
    }
}
