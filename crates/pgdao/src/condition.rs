//! Query condition values for dynamic queries.
//!
//! A [`Condition`] is one predicate: a field name, an [`Operator`] and its
//! operand(s). Conditions never fail to construct; malformed combinations
//! (e.g. BETWEEN without an upper bound) are reported when a plan is built.
//!
//! # Example
//! ```ignore
//! use pgdao::Condition;
//!
//! let conditions = vec![
//!     Condition::eq("status", "active"),
//!     Condition::gt("orderDate", "01-Jan-24"),
//!     Condition::lt("orderDate", "01-Feb-24"),
//!     Condition::in_list("region", vec!["north", "south"]),
//!     Condition::is_not_null("email"),
//! ];
//! ```

use crate::error::{DaoError, DaoResult};
use crate::value::Value;
use chrono::NaiveDateTime;
use std::fmt;

/// Comparison operator of a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    Between,
}

/// How many operands an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arity {
    None,
    Single,
    List,
    Pair,
}

impl Operator {
    /// SQL spelling of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
            Operator::NotLike => "NOT LIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Between => "BETWEEN",
        }
    }

    pub(crate) fn arity(self) -> Arity {
        match self {
            Operator::IsNull | Operator::IsNotNull => Arity::None,
            Operator::In | Operator::NotIn => Arity::List,
            Operator::Between => Arity::Pair,
            _ => Arity::Single,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One predicate over a named field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    field: String,
    operator: Operator,
    value: Option<Value>,
    second_value: Option<Value>,
}

impl Condition {
    /// Create a condition from its raw parts.
    pub fn new(
        field: impl Into<String>,
        operator: Operator,
        value: Option<Value>,
        second_value: Option<Value>,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            second_value,
        }
    }

    fn single(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::new(field, operator, Some(value.into()), None)
    }

    fn list<T: Into<Value>>(field: impl Into<String>, operator: Operator, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        Self::new(field, operator, Some(Value::List(values)), None)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn second_value(&self) -> Option<&Value> {
        self.second_value.as_ref()
    }

    /// Check that the operands match the operator.
    pub(crate) fn check_shape(&self) -> DaoResult<()> {
        let has_first = self.value.as_ref().is_some_and(|v| !v.is_null());
        let has_second = self.second_value.as_ref().is_some_and(|v| !v.is_null());
        let fail = |what: &str| {
            Err(DaoError::validation(format!(
                "{} on '{}' {what}",
                self.operator, self.field
            )))
        };

        match self.operator.arity() {
            Arity::None if self.value.is_some() || self.second_value.is_some() => {
                fail("takes no value")
            }
            Arity::None => Ok(()),
            Arity::Pair if !(has_first && has_second) => fail("requires two values"),
            Arity::Pair => Ok(()),
            Arity::List => match &self.value {
                Some(Value::List(_)) if self.second_value.is_none() => Ok(()),
                _ => fail("requires a list of values"),
            },
            Arity::Single if !has_first => fail("requires a value"),
            Arity::Single if self.second_value.is_some() => fail("takes a single value"),
            Arity::Single if matches!(self.value, Some(Value::List(_))) => {
                fail("does not accept a list")
            }
            Arity::Single => Ok(()),
        }
    }

    // ==================== Factory helpers ====================

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Equals, value)
    }

    /// `field != value`
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::NotEquals, value)
    }

    /// `field > value`
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Gt, value)
    }

    /// `field < value`
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Lt, value)
    }

    /// `field >= value`
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Ge, value)
    }

    /// `field <= value`
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(field, Operator::Le, value)
    }

    /// `field LIKE pattern`; wildcards are the caller's.
    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(field, Operator::Like, pattern.into())
    }

    /// `field NOT LIKE pattern`
    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(field, Operator::NotLike, pattern.into())
    }

    /// `field IN (values...)`
    pub fn in_list<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::list(field, Operator::In, values)
    }

    /// `field NOT IN (values...)`
    pub fn not_in<T: Into<Value>>(field: impl Into<String>, values: Vec<T>) -> Self {
        Self::list(field, Operator::NotIn, values)
    }

    /// `field IS NULL`
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Operator::IsNull, None, None)
    }

    /// `field IS NOT NULL`
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, Operator::IsNotNull, None, None)
    }

    /// `field BETWEEN low AND high`
    pub fn between(
        field: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Self::new(field, Operator::Between, Some(low.into()), Some(high.into()))
    }

    pub fn date_eq(field: impl Into<String>, at: NaiveDateTime) -> Self {
        Self::eq(field, at)
    }

    pub fn date_gt(field: impl Into<String>, at: NaiveDateTime) -> Self {
        Self::gt(field, at)
    }

    pub fn date_lt(field: impl Into<String>, at: NaiveDateTime) -> Self {
        Self::lt(field, at)
    }

    pub fn date_between(field: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self::between(field, start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn factories_match_direct_construction() {
        assert_eq!(
            Condition::eq("name", "bob"),
            Condition::new("name", Operator::Equals, Some(Value::Text("bob".into())), None)
        );
        assert_eq!(
            Condition::is_null("email"),
            Condition::new("email", Operator::IsNull, None, None)
        );
        assert_eq!(
            Condition::between("age", 1, 9),
            Condition::new("age", Operator::Between, Some(Value::Int(1)), Some(Value::Int(9)))
        );
        assert_eq!(
            Condition::in_list("id", vec![1, 2]),
            Condition::new(
                "id",
                Operator::In,
                Some(Value::List(vec![Value::Int(1), Value::Int(2)])),
                None
            )
        );
    }

    #[test]
    fn date_variants_carry_timestamps() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let c = Condition::date_gt("createdAt", at);
        assert_eq!(c.operator(), Operator::Gt);
        assert_eq!(c.value(), Some(&Value::Timestamp(at)));
    }

    #[test]
    fn shape_checks() {
        assert!(Condition::eq("a", 1).check_shape().is_ok());
        assert!(Condition::is_not_null("a").check_shape().is_ok());
        assert!(Condition::not_in("a", vec![1]).check_shape().is_ok());

        let missing_hi = Condition::new("a", Operator::Between, Some(Value::Int(1)), None);
        assert!(missing_hi.check_shape().unwrap_err().is_validation());

        let null_with_value = Condition::new("a", Operator::IsNull, Some(Value::Int(1)), None);
        assert!(null_with_value.check_shape().is_err());

        let eq_without_value = Condition::new("a", Operator::Equals, None, None);
        assert!(eq_without_value.check_shape().is_err());

        let in_scalar = Condition::new("a", Operator::In, Some(Value::Int(1)), None);
        assert!(in_scalar.check_shape().is_err());

        let eq_list = Condition::new("a", Operator::Equals, Some(Value::List(vec![])), None);
        assert!(eq_list.check_shape().is_err());
    }
}
