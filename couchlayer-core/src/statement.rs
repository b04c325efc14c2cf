//! Query statements issued against a bucket.
//!
//! A [`Statement`] keeps the structured parts of a SELECT, COUNT or DELETE
//! (bucket, projection, filter, sort, offset, limit) together with the
//! [`ScanConsistency`] the store should apply. Drivers that speak N1QL use
//! the rendered text from [`Statement::to_n1ql`]; the in-memory driver
//! evaluates the structured form.
//!
//! ```ignore
//! use couchlayer_core::{query::{Filter, Sort}, statement::Statement};
//!
//! let statement = Statement::select("test")
//!     .with_filter(Some(Filter::eq("_c", "dummies")))
//!     .with_sort(vec![Sort::asc("key")])
//!     .with_limit(Some(10));
//!
//! assert_eq!(
//!     statement.to_n1ql(),
//!     "SELECT `test`.* FROM `test` WHERE `_c` = \"dummies\" ORDER BY `key` ASC LIMIT 10"
//! );
//! ```

use serde_json::Value;
use std::{convert::Infallible, fmt};

use crate::query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection};

/// Consistency requirement for index scans performed by a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanConsistency {
    /// No consistency requirement; fastest.
    #[default]
    NotBounded,
    /// Waits until every mutation acknowledged before the request is indexed.
    RequestPlus,
    /// Consistent with mutations completed before this statement was issued.
    StatementPlus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Count,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub bucket: String,
    pub select: Option<Vec<String>>,
    pub filter: Option<Expr>,
    pub sort: Vec<Sort>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub consistency: ScanConsistency,
}

impl Statement {
    fn new(kind: StatementKind, bucket: &str) -> Self {
        Self {
            kind,
            bucket: bucket.to_string(),
            select: None,
            filter: None,
            sort: Vec::new(),
            offset: None,
            limit: None,
            consistency: ScanConsistency::NotBounded,
        }
    }

    pub fn select(bucket: &str) -> Self {
        Self::new(StatementKind::Select, bucket)
    }

    pub fn count(bucket: &str) -> Self {
        Self::new(StatementKind::Count, bucket)
    }

    pub fn delete(bucket: &str) -> Self {
        Self::new(StatementKind::Delete, bucket)
    }

    /// Restricts the projection to the given fields. `None` or empty selects whole documents.
    pub fn with_select(mut self, select: Option<Vec<String>>) -> Self {
        self.select = select.filter(|fields| !fields.is_empty());
        self
    }

    pub fn with_filter(mut self, filter: Option<Expr>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: Vec<Sort>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_offset(mut self, offset: Option<usize>) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_consistency(mut self, consistency: ScanConsistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Renders the statement as N1QL text.
    pub fn to_n1ql(&self) -> String {
        let bucket = escape_identifier(&self.bucket);

        let mut text = match self.kind {
            StatementKind::Select => {
                let projection = match &self.select {
                    Some(fields) => fields
                        .iter()
                        .map(|f| escape_path(f))
                        .collect::<Vec<_>>()
                        .join(", "),
                    None => format!("{bucket}.*"),
                };
                format!("SELECT {projection} FROM {bucket}")
            }
            StatementKind::Count => format!("SELECT COUNT(*) AS count FROM {bucket}"),
            StatementKind::Delete => format!("DELETE FROM {bucket}"),
        };

        if let Some(filter) = &self.filter {
            let mut translator = N1qlTranslator { bucket: &self.bucket };
            let Ok(clause) = translator.visit_expr(filter);
            text.push_str(" WHERE ");
            text.push_str(&clause);
        }

        if self.kind == StatementKind::Select && !self.sort.is_empty() {
            let order = self
                .sort
                .iter()
                .map(|sort| {
                    format!(
                        "{} {}",
                        escape_path(&sort.field),
                        match sort.direction {
                            SortDirection::Asc => "ASC",
                            SortDirection::Desc => "DESC",
                        }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            text.push_str(" ORDER BY ");
            text.push_str(&order);
        }

        if let Some(offset) = self.offset {
            text.push_str(&format!(" OFFSET {offset}"));
        }
        if let Some(limit) = self.limit {
            text.push_str(&format!(" LIMIT {limit}"));
        }

        text
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_n1ql())
    }
}

fn escape_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "\\`"))
}

fn escape_path(path: &str) -> String {
    path.split('.')
        .map(escape_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

fn escape_like(pattern: &str) -> String {
    pattern
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn literal(value: &Value) -> String {
    value.to_string()
}

fn string_literal(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// Renders filter expressions as N1QL boolean expressions.
struct N1qlTranslator<'a> {
    bucket: &'a str,
}

impl N1qlTranslator<'_> {
    fn join(&mut self, exprs: &[Expr], separator: &str, empty: &str) -> Result<String, Infallible> {
        if exprs.is_empty() {
            return Ok(empty.to_string());
        }

        let parts = exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect::<Result<Vec<_>, _>>()?;

        if parts.len() == 1 {
            Ok(parts.into_iter().collect())
        } else {
            Ok(format!("({})", parts.join(separator)))
        }
    }
}

impl QueryVisitor for N1qlTranslator<'_> {
    type Output = String;
    type Error = Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " AND ", "TRUE")
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " OR ", "FALSE")
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(format!("NOT ({})", self.visit_expr(expr)?))
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(format!(
            "{} {}",
            escape_path(field),
            if should_exist { "IS NOT MISSING" } else { "IS MISSING" }
        ))
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let field = escape_path(field);
        let text_of = |value: &Value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let list_of = |value: &Value| match value {
            Value::Array(_) => literal(value),
            other => format!("[{}]", literal(other)),
        };

        Ok(match op {
            FieldOp::Eq => format!("{field} = {}", literal(value)),
            FieldOp::Ne => format!("{field} != {}", literal(value)),
            FieldOp::Gt => format!("{field} > {}", literal(value)),
            FieldOp::Gte => format!("{field} >= {}", literal(value)),
            FieldOp::Lt => format!("{field} < {}", literal(value)),
            FieldOp::Lte => format!("{field} <= {}", literal(value)),
            FieldOp::Contains => match value {
                Value::String(s) => format!("CONTAINS({field}, {})", string_literal(s)),
                other => format!("ARRAY_CONTAINS({field}, {})", literal(other)),
            },
            FieldOp::NotContains => match value {
                Value::String(s) => format!("NOT CONTAINS({field}, {})", string_literal(s)),
                other => format!("NOT ARRAY_CONTAINS({field}, {})", literal(other)),
            },
            FieldOp::StartsWith => format!(
                "{field} LIKE {}",
                string_literal(&format!("{}%", escape_like(&text_of(value))))
            ),
            FieldOp::EndsWith => format!(
                "{field} LIKE {}",
                string_literal(&format!("%{}", escape_like(&text_of(value))))
            ),
            FieldOp::AnyOf => format!("{field} IN {}", list_of(value)),
            FieldOp::NoneOf => format!("{field} NOT IN {}", list_of(value)),
        })
    }

    fn visit_key_prefix(&mut self, prefix: &str) -> Result<Self::Output, Self::Error> {
        Ok(format!(
            "META({}).id LIKE {}",
            escape_identifier(self.bucket),
            string_literal(&format!("{}%", escape_like(prefix)))
        ))
    }

    fn visit_raw(&mut self, fragment: &str) -> Result<Self::Output, Self::Error> {
        Ok(format!("({fragment})"))
    }
}
