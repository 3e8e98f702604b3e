//! Query expression evaluation for in-memory document filtering and sorting.
//!
//! Field paths may be dotted (`address.city`, `tags.0`). Numbers of every width compare as
//! `f64`. A comparison against an array field matches when any element matches, as in
//! MongoDB.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use std::{cmp::Ordering, collections::HashMap};

use docmapper_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, QueryVisitor, Sort, SortDirection},
};

/// Resolves a dotted path inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Comparable representation of BSON values.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    /// All integers and floats, normalized to f64.
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value; compared by BSON equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(items) => Comparable::Array(
                items
                    .iter()
                    .map(Comparable::from)
                    .collect()
            ),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect()
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Other(_) => 5,
            Comparable::ObjectId(_) => 6,
            Comparable::Bool(_) => 7,
            Comparable::DateTime(_) => 8,
        }
    }

    /// Total order used for sorting: by type rank first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            (Comparable::Null, Comparable::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

/// Compares two documents by a list of sort keys. Missing fields sort as `null`.
pub(crate) fn compare_documents(left: &Document, right: &Document, sort: &[Sort]) -> Ordering {
    for key in sort {
        let a = lookup(left, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let b = lookup(right, &key.field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => a.sort_cmp(&b),
            SortDirection::Desc => b.sort_cmp(&a),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Evaluates a filter expression against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> Result<bool, DocumentStoreError> {
        self.visit_expr(expr)
    }

    /// Whether `document` matches `filter`; no filter matches everything.
    pub fn matches(document: &Document, filter: Option<&Expr>) -> Result<bool, DocumentStoreError> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

fn equals(field: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    if field == value {
        return true;
    }

    match field {
        Comparable::Array(items) => items.iter().any(|item| item == value),
        _ => false,
    }
}

fn compares(field: &Comparable<'_>, value: &Comparable<'_>, accept: fn(Ordering) -> bool) -> bool {
    match field {
        Comparable::Array(items) => items
            .iter()
            .any(|item| compares(item, value, accept)),
        _ => field
            .partial_cmp(value)
            .is_some_and(accept),
    }
}

fn contains(field: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    match (field, value) {
        (Comparable::Array(items), Comparable::Array(values)) => {
            !values.is_empty() && values.iter().all(|value| items.iter().any(|item| item == value))
        }
        (Comparable::Array(items), value) => items.iter().any(|item| item == value),
        (Comparable::String(left), Comparable::String(right)) => left.contains(right),
        _ => false,
    }
}

fn any_of(field: &Comparable<'_>, values: &Comparable<'_>) -> bool {
    match values {
        Comparable::Array(values) => values.iter().any(|value| equals(field, value)),
        value => equals(field, value),
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DocumentStoreError;

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

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let expected = Comparable::from(value);

        let Some(field_value) = lookup(self.document, field) else {
            // A missing field behaves as null for equality and never satisfies a comparison.
            return Ok(match op {
                FieldOp::Eq => expected == Comparable::Null,
                FieldOp::Ne => expected != Comparable::Null,
                FieldOp::AnyOf => any_of(&Comparable::Null, &expected),
                FieldOp::NoneOf => !any_of(&Comparable::Null, &expected),
                FieldOp::NotContains => true,
                _ => false,
            });
        };
        let actual = Comparable::from(field_value);

        Ok(match op {
            FieldOp::Eq => equals(&actual, &expected),
            FieldOp::Ne => !equals(&actual, &expected),
            FieldOp::Gt => compares(&actual, &expected, Ordering::is_gt),
            FieldOp::Gte => compares(&actual, &expected, Ordering::is_ge),
            FieldOp::Lt => compares(&actual, &expected, Ordering::is_lt),
            FieldOp::Lte => compares(&actual, &expected, Ordering::is_le),
            FieldOp::Contains => contains(&actual, &expected),
            FieldOp::NotContains => !contains(&actual, &expected),
            FieldOp::StartsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (&actual, &expected) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_of(&actual, &expected),
            FieldOp::NoneOf => !any_of(&actual, &expected),
        })
    }
}
