//! Filter evaluation against stored JSON documents.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use couchlayer_core::{
    error::{DriverError, DriverErrorKind, DriverResult},
    query::{Expr, FieldOp, QueryVisitor},
};

/// Comparable view of a JSON value. All numbers compare as `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => value
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Value::Object(map) => Comparable::Map(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Looks up a dot-separated path inside a document.
pub(crate) fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Orders two documents by a field; missing and incomparable values sort first.
pub(crate) fn compare_field(left: &Value, right: &Value, field: &str) -> Ordering {
    let left = lookup(left, field).map(Comparable::from);
    let right = lookup(right, field).map(Comparable::from);

    match (left, right) {
        (Some(left), Some(right)) => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Evaluates a filter against one stored document and its key.
pub(crate) struct DocumentEvaluator<'a> {
    key: &'a str,
    document: &'a Value,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(key: &'a str, document: &'a Value) -> Self {
        Self { key, document }
    }

    /// Evaluates `filter` against one document. No filter matches everything.
    pub fn matches(key: &'a str, document: &'a Value, filter: Option<&Expr>) -> DriverResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(key, document).visit_expr(expr),
            None => Ok(true),
        }
    }

    fn contains(field_value: &Value, value: &Value) -> bool {
        match (Comparable::from(field_value), Comparable::from(value)) {
            (Comparable::String(left), Comparable::String(right)) => left.contains(right),
            (Comparable::Array(items), needle) => items.iter().any(|item| *item == needle),
            _ => false,
        }
    }

    fn member_of(field_value: &Value, values: &Value) -> bool {
        let field_value = Comparable::from(field_value);
        match Comparable::from(values) {
            Comparable::Array(values) => values.iter().any(|value| *value == field_value),
            single => single == field_value,
        }
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DriverError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.document, field) else {
            return Ok(false);
        };

        let ordering = || Comparable::from(field_value).partial_cmp(&Comparable::from(value));

        Ok(match op {
            FieldOp::Eq => Comparable::from(field_value) == Comparable::from(value),
            FieldOp::Ne => Comparable::from(field_value) != Comparable::from(value),
            FieldOp::Gt => ordering() == Some(Ordering::Greater),
            FieldOp::Gte => matches!(ordering(), Some(Ordering::Greater | Ordering::Equal)),
            FieldOp::Lt => ordering() == Some(Ordering::Less),
            FieldOp::Lte => matches!(ordering(), Some(Ordering::Less | Ordering::Equal)),
            FieldOp::Contains => Self::contains(field_value, value),
            FieldOp::NotContains => !Self::contains(field_value, value),
            FieldOp::StartsWith => match (field_value.as_str(), value.as_str()) {
                (Some(left), Some(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (field_value.as_str(), value.as_str()) {
                (Some(left), Some(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => Self::member_of(field_value, value),
            FieldOp::NoneOf => !Self::member_of(field_value, value),
        })
    }

    fn visit_key_prefix(&mut self, prefix: &str) -> Result<Self::Output, Self::Error> {
        Ok(self.key.starts_with(prefix))
    }

    fn visit_raw(&mut self, fragment: &str) -> Result<Self::Output, Self::Error> {
        Err(DriverError::new(
            DriverErrorKind::Unsupported,
            format!("In-memory driver cannot evaluate raw filter: {fragment}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couchlayer_core::query::Filter;
    use serde_json::json;

    fn eval(document: &Value, expr: Expr) -> bool {
        DocumentEvaluator::matches("dummies1", document, Some(&expr)).unwrap()
    }

    #[test]
    fn evaluates_comparisons_and_nested_paths() {
        let document = json!({ "key": "Key 1", "count": 5, "address": { "city": "Oslo" } });

        assert!(eval(&document, Filter::eq("key", "Key 1")));
        assert!(eval(&document, Filter::gte("count", 5)));
        assert!(!eval(&document, Filter::lt("count", 5)));
        assert!(eval(&document, Filter::eq("address.city", "Oslo")));
        assert!(!eval(&document, Filter::eq("missing", "x")));
    }

    #[test]
    fn evaluates_membership_and_text() {
        let document = json!({ "tags": ["a", "b"], "status": "active", "name": "dummy" });

        assert!(eval(&document, Filter::contains("tags", "a")));
        assert!(eval(&document, Filter::any_of("status", json!(["active", "idle"]))));
        assert!(eval(&document, Filter::none_of("status", json!(["deleted"]))));
        assert!(eval(&document, Filter::starts_with("name", "dum")));
        assert!(eval(&document, Filter::not_exists("deleted")));
    }

    #[test]
    fn evaluates_key_prefix() {
        let document = json!({});

        assert!(eval(&document, Filter::key_prefix("dummies")));
        assert!(!eval(&document, Filter::key_prefix("others")));
    }

    #[test]
    fn raw_fragments_are_unsupported() {
        let err = DocumentEvaluator::matches("k", &json!({}), Some(&Filter::raw("a = 1"))).unwrap_err();
        assert_eq!(err.kind, DriverErrorKind::Unsupported);
    }
}
