//! Filter expressions, sorting and paging parameters.
//!
//! Filters are built as a small expression tree and rendered by a
//! [`QueryVisitor`]: the statement module renders them to N1QL text and the
//! in-memory driver evaluates them directly against stored documents.
//!
//! ```ignore
//! use couchlayer_core::query::Filter;
//!
//! let filter = Filter::eq("status", "active").and(Filter::gt("age", 18));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PersistenceError;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String contains substring, or array contains element.
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    /// Field value is one of the values in the given array.
    AnyOf,
    /// Field value is none of the values in the given array.
    NoneOf,
}

/// A filter expression over stored documents.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Checks whether a field is present (`true`) or missing (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Value,
    },
    /// Matches documents whose storage key starts with the given prefix.
    KeyPrefix(String),
    /// A pre-composed WHERE fragment passed to the store verbatim.
    Raw(String),
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Value) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND,
    /// flattening into an existing AND list.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }
}

/// Helper for constructing filter expressions.
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    pub fn any_of(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    pub fn none_of(field: impl Into<String>, value: impl Into<Value>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    pub fn key_prefix(prefix: impl Into<String>) -> Expr {
        Expr::KeyPrefix(prefix.into())
    }

    pub fn raw(fragment: impl Into<String>) -> Expr {
        Expr::Raw(fragment.into())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<PersistenceError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error>;
    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error>;
    fn visit_key_prefix(&mut self, prefix: &str) -> Result<Self::Output, Self::Error>;
    fn visit_raw(&mut self, fragment: &str) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
            Expr::KeyPrefix(prefix) => self.visit_key_prefix(prefix),
            Expr::Raw(fragment) => self.visit_raw(fragment),
        }
    }
}

/// Paging parameters for paged queries.
///
/// `skip` of `None` means "no explicit offset"; `take` of `None` falls back to
/// the persistence's maximum page size. When `total` is set the page also
/// carries the count of all matching records.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PagingParams {
    pub skip: Option<usize>,
    pub take: Option<usize>,
    pub total: bool,
}

impl PagingParams {
    pub fn new(skip: Option<usize>, take: Option<usize>, total: bool) -> Self {
        Self { skip, take, total }
    }

    /// Builds parameters from signed values where a negative number means "absent".
    pub fn from_signed(skip: i64, take: i64, total: bool) -> Self {
        Self {
            skip: usize::try_from(skip).ok(),
            take: usize::try_from(take).ok(),
            total,
        }
    }

    /// Returns the page size to use, never more than `max_page_size`.
    pub fn take_or(&self, max_page_size: usize) -> usize {
        self.take.map_or(max_page_size, |take| take.min(max_page_size))
    }
}

/// A page of records with an optional total count.
///
/// The total is only computed when [`PagingParams::total`] is requested,
/// since it costs a second query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataPage<T> {
    pub data: Vec<T>,
    pub total: Option<usize>,
}

impl<T> DataPage<T> {
    pub fn new(data: Vec<T>, total: Option<usize>) -> Self {
        Self { data, total }
    }
}

impl<T> Default for DataPage<T> {
    fn default() -> Self {
        Self { data: Vec::new(), total: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_flattens_existing_list() {
        let expr = Filter::eq("a", 1).and(Filter::eq("b", 2)).and(Filter::eq("c", 3));

        match expr {
            Expr::And(list) => assert_eq!(list.len(), 3),
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn negative_paging_values_are_absent() {
        let paging = PagingParams::from_signed(-1, -1, true);

        assert_eq!(paging.skip, None);
        assert_eq!(paging.take_or(100), 100);
        assert!(paging.total);
    }

    #[test]
    fn take_is_capped_by_max_page_size() {
        assert_eq!(PagingParams::new(None, Some(500), false).take_or(100), 100);
        assert_eq!(PagingParams::new(None, Some(10), false).take_or(100), 10);
    }
}
