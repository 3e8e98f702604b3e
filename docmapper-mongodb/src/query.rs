//! Translation from docmapper filter expressions and modifiers to MongoDB query syntax.

use bson::{Bson, Document, doc};
use mongodb::options::{FindOptions, Hint};
use std::time::Duration;
use tracing::trace;

use docmapper_core::{
    error::DocumentStoreError,
    query::{Expr, FieldOp, Modifiers, QueryVisitor, Sort, SortDirection},
};

/// Translates filter expressions into MongoDB filter documents.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// The filter document for an optional expression; no expression matches everything.
    pub fn filter(expr: Option<&Expr>) -> Result<Document, DocumentStoreError> {
        match expr {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }
}

fn regex(pattern: String) -> Document {
    doc! { "$regex": pattern }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());

    for character in text.chars() {
        if "\\^$.|?*+()[]{}".contains(character) {
            escaped.push('\\');
        }
        escaped.push(character);
    }

    escaped
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` only applies to field operators; `$nor` negates a whole expression.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(text) => regex(escape(text)),
                    Bson::Array(items) => doc! { "$all": items },
                    other => doc! { "$eq": other },
                },
                FieldOp::NotContains => match value {
                    Bson::String(text) => doc! { "$not": regex(escape(text)) },
                    Bson::Array(items) => doc! { "$not": { "$all": items } },
                    other => doc! { "$ne": other },
                },
                FieldOp::StartsWith => match value {
                    Bson::String(text) => regex(format!("^{}", escape(text))),
                    _ => return Err(DocumentStoreError::InvalidArgument(format!("starts_with on {field} requires a string value"))),
                },
                FieldOp::EndsWith => match value {
                    Bson::String(text) => regex(format!("{}$", escape(text))),
                    _ => return Err(DocumentStoreError::InvalidArgument(format!("ends_with on {field} requires a string value"))),
                },
                FieldOp::AnyOf => match value {
                    Bson::Array(_) => doc! { "$in": value },
                    other => doc! { "$in": [other] },
                },
                FieldOp::NoneOf => match value {
                    Bson::Array(_) => doc! { "$nin": value },
                    other => doc! { "$nin": [other] },
                },
            }
        })
    }
}

/// Sort document with `1` for ascending and `-1` for descending keys.
pub(crate) fn sort_document(sort: &[Sort]) -> Document {
    sort.iter()
        .map(|key| {
            let direction = match key.direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            };
            (key.field.clone(), Bson::Int32(direction))
        })
        .collect()
}

fn as_u64(value: &Bson) -> Option<u64> {
    match value {
        Bson::Int32(n) => u64::try_from(*n).ok(),
        Bson::Int64(n) => u64::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 => Some(*n as u64),
        _ => None,
    }
}

/// Maps compiled modifiers onto driver find options.
///
/// Recognised hints are `hint` (index name or key document), `comment`, `max_time_ms` and
/// `batch_size`; others are ignored.
pub(crate) fn find_options(modifiers: Modifiers) -> Result<FindOptions, DocumentStoreError> {
    let mut options = FindOptions::default();

    if !modifiers.sort.is_empty() {
        options.sort = Some(sort_document(&modifiers.sort));
    }
    if let Some(offset) = modifiers.offset {
        options.skip = Some(offset as u64);
    }
    if let Some(limit) = modifiers.limit {
        options.limit = Some(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    if let Some(fields) = modifiers.fields {
        options.projection = Some(
            fields
                .into_iter()
                .map(|field| (field, Bson::Int32(1)))
                .collect(),
        );
    }

    for (key, value) in modifiers.hints {
        match (key.as_str(), value) {
            ("hint", Bson::String(name)) => options.hint = Some(Hint::Name(name)),
            ("hint", Bson::Document(keys)) => options.hint = Some(Hint::Keys(keys)),
            ("comment", comment) => options.comment = Some(comment),
            ("max_time_ms", value) => {
                let millis = as_u64(&value)
                    .ok_or_else(|| DocumentStoreError::InvalidArgument(format!("max_time_ms must be a non-negative number, got {value}")))?;
                options.max_time = Some(Duration::from_millis(millis));
            }
            ("batch_size", value) => {
                let size = as_u64(&value)
                    .and_then(|size| u32::try_from(size).ok())
                    .ok_or_else(|| DocumentStoreError::InvalidArgument(format!("batch_size must be a non-negative integer, got {value}")))?;
                options.batch_size = Some(size);
            }
            (other, _) => trace!(target: "docmapper::mongodb", hint = other, "ignoring unsupported hint"),
        }
    }

    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmapper_core::{
        criteria::compile,
        query::{Filter, FindOptions},
    };

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator::filter(Some(&expr)).unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert_eq!(MongoQueryTranslator::filter(None).unwrap(), doc! {});
    }

    #[test]
    fn conjunction_of_fields() {
        assert_eq!(
            translate(Filter::eq("name", "Alice").and(Filter::gte("age", 18))),
            doc! { "$and": [{ "name": { "$eq": "Alice" } }, { "age": { "$gte": 18 } }] },
        );
    }

    #[test]
    fn not_becomes_nor() {
        assert_eq!(
            translate(Filter::eq("name", "x").not()),
            doc! { "$nor": [{ "name": { "$eq": "x" } }] },
        );
    }

    #[test]
    fn membership_wraps_scalars() {
        assert_eq!(translate(Filter::any_of("_id", vec![1, 2])), doc! { "_id": { "$in": [1, 2] } });
        assert_eq!(translate(Filter::none_of("tag", "a")), doc! { "tag": { "$nin": ["a"] } });
    }

    #[test]
    fn string_patterns_are_escaped() {
        assert_eq!(translate(Filter::starts_with("name", "a.b")), doc! { "name": { "$regex": "^a\\.b" } });
        assert_eq!(translate(Filter::contains("name", "(x)")), doc! { "name": { "$regex": "\\(x\\)" } });
    }

    #[test]
    fn compiled_store_operators_translate_back() {
        let filter = |conditions: Document| {
            let criteria = compile(&FindOptions::with_conditions(conditions)).unwrap();
            MongoQueryTranslator::filter(criteria.filter.as_ref()).unwrap()
        };

        assert_eq!(filter(doc! { "name": { "$regex": "^Al" } }), doc! { "name": { "$regex": "^Al" } });
        assert_eq!(filter(doc! { "name": { "$regex": r"a\.b$" } }), doc! { "name": { "$regex": r"a\.b$" } });
        assert_eq!(filter(doc! { "tags": { "$all": ["a", "b"] } }), doc! { "tags": { "$all": ["a", "b"] } });
        assert_eq!(
            filter(doc! { "tags": { "$not": { "$all": ["a"] } } }),
            doc! { "tags": { "$not": { "$all": ["a"] } } },
        );
        assert_eq!(
            filter(doc! { "name": { "$not": { "$regex": "x" } } }),
            doc! { "name": { "$not": { "$regex": "x" } } },
        );
        assert_eq!(
            filter(doc! { "age": { "$not": { "$gt": 3 } } }),
            doc! { "$nor": [{ "age": { "$gt": 3 } }] },
        );
    }

    #[test]
    fn starts_with_requires_string() {
        assert!(MongoQueryTranslator::filter(Some(&Filter::starts_with("name", 3))).is_err());
    }

    #[test]
    fn modifiers_map_to_find_options() {
        let mut hints = Document::new();
        hints.insert("hint", "name_1");
        hints.insert("comment", "audit");
        hints.insert("max_time_ms", 250);
        hints.insert("batch_size", 10);
        hints.insert("unknown", true);

        let options = find_options(Modifiers {
            sort: vec![Sort::new("age", SortDirection::Desc), Sort::new("name", SortDirection::Asc)],
            limit: Some(5),
            offset: Some(10),
            fields: Some(vec!["name".to_string()]),
            hints,
        })
        .unwrap();

        assert_eq!(options.sort, Some(doc! { "age": -1, "name": 1 }));
        assert_eq!(options.limit, Some(5));
        assert_eq!(options.skip, Some(10));
        assert_eq!(options.projection, Some(doc! { "name": 1 }));
        assert!(matches!(options.hint, Some(Hint::Name(ref name)) if name == "name_1"));
        assert_eq!(options.comment, Some(Bson::String("audit".into())));
        assert_eq!(options.max_time, Some(Duration::from_millis(250)));
        assert_eq!(options.batch_size, Some(10));
    }

    #[test]
    fn negative_max_time_is_rejected() {
        let mut hints = Document::new();
        hints.insert("max_time_ms", -1);

        assert!(find_options(Modifiers { hints, ..Modifiers::default() }).is_err());
    }
}
