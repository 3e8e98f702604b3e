//! The criteria compiler.
//!
//! [`compile`] is the single translation from [`FindOptions`] to store criteria. Every
//! finder, counter, deleter and updater goes through it, so the translation rules below hold
//! system-wide:
//!
//! - an identity shortcut becomes `_id == id` (one id) or `_id in [ids]` (id list);
//! - a plain condition value becomes an equality, an array value becomes membership;
//! - a sub-document whose keys all start with `$` is an operator expression
//!   (`$eq $ne $gt $gte $lt $lte $in $nin $all $exists $regex $not`);
//! - `$regex` accepts literal text with optional `^`/`$` anchors and becomes a prefix, suffix,
//!   substring or equality match;
//! - `$or` / `$and` / `$nor` take arrays of condition documents;
//! - the order text is parsed into sort keys; limit, offset, fields and hints are copied.
//!
//! Compilation never touches a store and is deterministic.

use bson::{Bson, Document};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Criteria, Expr, FieldOp, FindOptions, IdSelector, Modifiers, Sort, SortDirection, ID_FIELD},
};

/// Compiles query options into a filter and modifiers.
pub fn compile(options: &FindOptions) -> DocumentStoreResult<Criteria> {
    let mut constraints = Vec::new();

    match &options.ids {
        Some(IdSelector::One(id)) => {
            constraints.push(Expr::field(ID_FIELD.to_string(), FieldOp::Eq, id.clone()));
        }
        Some(IdSelector::Many(ids)) => {
            constraints.push(Expr::field(ID_FIELD.to_string(), FieldOp::AnyOf, Bson::Array(ids.clone())));
        }
        None => {}
    }

    constraints.extend(compile_conditions(&options.conditions)?);

    let sort = match &options.order {
        Some(order) => parse_order(order)?,
        None => Vec::new(),
    };

    Ok(Criteria {
        filter: Expr::all(constraints),
        modifiers: Modifiers {
            sort,
            limit: options.limit,
            offset: options.offset,
            fields: options.fields.clone(),
            hints: options.hints.clone(),
        },
    })
}

/// Compiles a conditions document into a list of constraints, one or more per key.
pub fn compile_conditions(conditions: &Document) -> DocumentStoreResult<Vec<Expr>> {
    let mut constraints = Vec::with_capacity(conditions.len());

    for (field, value) in conditions {
        match field.as_str() {
            "$or" => constraints.push(Expr::Or(compile_branches(field, value)?)),
            "$and" => constraints.push(Expr::And(compile_branches(field, value)?)),
            "$nor" => constraints.push(Expr::Or(compile_branches(field, value)?).not()),
            _ if field.starts_with('$') => {
                return Err(DocumentStoreError::InvalidArgument(format!("unsupported top-level operator {field}")));
            }
            _ => constraints.extend(compile_condition(field, value)?),
        }
    }

    Ok(constraints)
}

fn compile_branches(operator: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    let Bson::Array(branches) = value else {
        return Err(DocumentStoreError::InvalidArgument(format!("{operator} expects an array of condition documents")));
    };

    branches
        .iter()
        .map(|branch| match branch {
            Bson::Document(conditions) => Ok(Expr::all(compile_conditions(conditions)?).unwrap_or(Expr::And(vec![]))),
            other => Err(DocumentStoreError::InvalidArgument(format!("{operator} branch must be a document, got {other}"))),
        })
        .collect()
}

fn compile_condition(field: &str, value: &Bson) -> DocumentStoreResult<Vec<Expr>> {
    match value {
        Bson::Document(operators) if is_operator_document(operators) => operators
            .iter()
            .map(|(operator, operand)| compile_operator(field, operator, operand))
            .collect(),
        Bson::Array(values) => Ok(vec![Expr::field(field.to_string(), FieldOp::AnyOf, Bson::Array(values.clone()))]),
        value => Ok(vec![Expr::field(field.to_string(), FieldOp::Eq, value.clone())]),
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}

fn compile_operator(field: &str, operator: &str, operand: &Bson) -> DocumentStoreResult<Expr> {
    let op = match operator {
        "$eq" => FieldOp::Eq,
        "$ne" => FieldOp::Ne,
        "$gt" => FieldOp::Gt,
        "$gte" => FieldOp::Gte,
        "$lt" => FieldOp::Lt,
        "$lte" => FieldOp::Lte,
        "$in" => FieldOp::AnyOf,
        "$nin" => FieldOp::NoneOf,
        "$all" => FieldOp::Contains,
        "$regex" => return compile_pattern(field, operand),
        "$not" => return compile_negation(field, operand),
        "$exists" => {
            return match operand {
                Bson::Boolean(should_exist) => Ok(Expr::Exists(field.to_string(), *should_exist)),
                other => Err(DocumentStoreError::InvalidArgument(format!("$exists on {field} expects a boolean, got {other}"))),
            };
        }
        other => {
            return Err(DocumentStoreError::InvalidArgument(format!("unsupported operator {other} on {field}")));
        }
    };

    if matches!(op, FieldOp::AnyOf | FieldOp::NoneOf | FieldOp::Contains) && !matches!(operand, Bson::Array(_)) {
        return Err(DocumentStoreError::InvalidArgument(format!("{operator} on {field} expects an array")));
    }

    Ok(Expr::field(field.to_string(), op, operand.clone()))
}

fn compile_negation(field: &str, operand: &Bson) -> DocumentStoreResult<Expr> {
    let mut constraints = match operand {
        Bson::Document(operators) if is_operator_document(operators) => compile_condition(field, operand)?,
        other => {
            return Err(DocumentStoreError::InvalidArgument(format!("$not on {field} expects an operator document, got {other}")));
        }
    };

    if constraints.len() > 1 {
        return Ok(Expr::And(constraints).not());
    }

    Ok(match constraints.remove(0) {
        Expr::Field { field, op: FieldOp::Contains, value } => Expr::Field { field, op: FieldOp::NotContains, value },
        constraint => constraint.not(),
    })
}

fn compile_pattern(field: &str, operand: &Bson) -> DocumentStoreResult<Expr> {
    let Bson::String(pattern) = operand else {
        return Err(DocumentStoreError::InvalidArgument(format!("$regex on {field} expects a string pattern, got {operand}")));
    };

    let (anchored_start, body) = match pattern.strip_prefix('^') {
        Some(body) => (true, body),
        None => (false, pattern.as_str()),
    };

    let (literal, anchored_end) = literal_text(body).ok_or_else(|| {
        DocumentStoreError::InvalidArgument(format!(
            "$regex on {field} supports literal text with optional ^ and $ anchors, got {pattern:?}"
        ))
    })?;

    let op = match (anchored_start, anchored_end) {
        (true, true) => FieldOp::Eq,
        (true, false) => FieldOp::StartsWith,
        (false, true) => FieldOp::EndsWith,
        (false, false) => FieldOp::Contains,
    };

    Ok(Expr::field(field.to_string(), op, Bson::String(literal)))
}

/// The literal text of a pattern body and whether it ends in an unescaped `$` anchor.
/// `None` if the body uses any other regex syntax.
fn literal_text(body: &str) -> Option<(String, bool)> {
    let mut literal = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(character) = chars.next() {
        match character {
            '\\' => match chars.next() {
                Some(escaped) if escaped.is_ascii_punctuation() => literal.push(escaped),
                _ => return None,
            },
            '$' if chars.peek().is_none() => return Some((literal, true)),
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' => return None,
            other => literal.push(other),
        }
    }

    Some((literal, false))
}

/// Parses comma separated `<field> [asc|desc]` text into sort keys.
///
/// Direction matching is case-insensitive and an unmarked field sorts ascending.
/// Empty segments are ignored.
pub fn parse_order(order: &str) -> DocumentStoreResult<Vec<Sort>> {
    order
        .split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_segment)
        .collect()
}

fn parse_segment(segment: &str) -> DocumentStoreResult<Sort> {
    let mut parts = segment.split_whitespace();

    let (Some(field), direction, None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(DocumentStoreError::InvalidArgument(format!("malformed order segment {segment:?}")));
    };

    let direction = match direction.map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") | Some("ascending") => SortDirection::Asc,
        Some("desc") | Some("descending") => SortDirection::Desc,
        Some(other) => {
            return Err(DocumentStoreError::InvalidArgument(format!("unknown sort direction {other:?} for {field}")));
        }
    };

    Ok(Sort::new(field, direction))
}

/// Renders sort keys back to order text, e.g. `"name asc, age desc"`.
pub fn render_order(sort: &[Sort]) -> String {
    sort.iter()
        .map(|key| format!("{} {}", key.field, key.direction.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inverts every segment of an order clause.
///
/// `asc` becomes `desc` and vice versa; an unmarked field becomes `desc`.
pub fn invert_order(order: &str) -> DocumentStoreResult<String> {
    let inverted = parse_order(order)?
        .into_iter()
        .map(|key| Sort::new(key.field, key.direction.inverted()))
        .collect::<Vec<_>>();

    Ok(render_order(&inverted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use bson::doc;

    #[test]
    fn compile_is_referentially_transparent() {
        let options = FindOptions::builder()
            .conditions(doc! { "name": "Alice", "age": { "$gte": 18, "$lt": 65 } })
            .order("age desc, name")
            .limit(3)
            .build();

        assert_eq!(compile(&options).unwrap(), compile(&options).unwrap());
    }

    #[test]
    fn id_list_shortcut_matches_in_condition() {
        let by_ids = compile(&FindOptions::by_ids(vec![1.into(), 2.into(), 3.into()])).unwrap();
        let by_conditions = compile(&FindOptions::with_conditions(doc! { "_id": { "$in": [1, 2, 3] } })).unwrap();

        assert_eq!(by_ids, by_conditions);
        assert_eq!(by_ids.filter, Some(Filter::any_of("_id", vec![1, 2, 3])));
    }

    #[test]
    fn single_id_shortcut_is_equality() {
        let criteria = compile(&FindOptions::by_id("abc")).unwrap();
        assert_eq!(criteria.filter, Some(Filter::eq("_id", "abc")));
    }

    #[test]
    fn id_shortcut_combines_with_conditions() {
        let options = FindOptions::builder().id(5).condition("active", true).build();
        let criteria = compile(&options).unwrap();

        assert_eq!(
            criteria.filter,
            Some(Expr::And(vec![Filter::eq("_id", 5), Filter::eq("active", true)])),
        );
    }

    #[test]
    fn array_condition_value_is_membership() {
        let criteria = compile(&FindOptions::with_conditions(doc! { "tag": ["a", "b"] })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::any_of("tag", vec!["a", "b"])));
    }

    #[test]
    fn embedded_document_without_operators_is_equality() {
        let criteria = compile(&FindOptions::with_conditions(doc! { "address": { "city": "Oslo" } })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::eq("address", doc! { "city": "Oslo" })));
    }

    #[test]
    fn or_branches_compile_recursively() {
        let criteria = compile(&FindOptions::with_conditions(doc! {
            "$or": [{ "name": "a" }, { "age": { "$gt": 3 } }],
        }))
        .unwrap();

        assert_eq!(
            criteria.filter,
            Some(Expr::Or(vec![Filter::eq("name", "a"), Filter::gt("age", 3)])),
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = compile(&FindOptions::with_conditions(doc! { "age": { "$near": 3 } })).unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidArgument(_)));
    }

    #[test]
    fn regex_patterns_become_string_matches() {
        let compile_name = |pattern: &str| compile(&FindOptions::with_conditions(doc! { "name": { "$regex": pattern } }));

        assert_eq!(compile_name("^Al").unwrap().filter, Some(Filter::starts_with("name", "Al")));
        assert_eq!(compile_name("son$").unwrap().filter, Some(Filter::ends_with("name", "son")));
        assert_eq!(compile_name("li").unwrap().filter, Some(Filter::contains("name", "li")));
        assert_eq!(compile_name("^Alice$").unwrap().filter, Some(Filter::eq("name", "Alice")));
        assert_eq!(compile_name(r"a\.b\$").unwrap().filter, Some(Filter::contains("name", "a.b$")));
        assert!(compile_name("a.*b").is_err());
        assert!(compile_name(r"\d+").is_err());
    }

    #[test]
    fn all_is_array_containment() {
        let criteria = compile(&FindOptions::with_conditions(doc! { "tags": { "$all": ["a", "b"] } })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::contains("tags", vec!["a", "b"])));

        assert!(compile(&FindOptions::with_conditions(doc! { "tags": { "$all": "a" } })).is_err());
    }

    #[test]
    fn not_negates_operator_documents() {
        let criteria = compile(&FindOptions::with_conditions(doc! { "age": { "$not": { "$gt": 3 } } })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::gt("age", 3).not()));

        let criteria = compile(&FindOptions::with_conditions(doc! { "name": { "$not": { "$regex": "x" } } })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::not_contains("name", "x")));

        let criteria = compile(&FindOptions::with_conditions(doc! { "tags": { "$not": { "$all": ["a"] } } })).unwrap();
        assert_eq!(criteria.filter, Some(Filter::not_contains("tags", vec!["a"])));

        let criteria = compile(&FindOptions::with_conditions(doc! { "age": { "$not": { "$gt": 3, "$lt": 9 } } })).unwrap();
        assert_eq!(criteria.filter, Some(Expr::And(vec![Filter::gt("age", 3), Filter::lt("age", 9)]).not()));

        assert!(compile(&FindOptions::with_conditions(doc! { "age": { "$not": 3 } })).is_err());
    }

    #[test]
    fn nor_negates_the_disjunction() {
        let criteria = compile(&FindOptions::with_conditions(doc! {
            "$nor": [{ "name": "a" }, { "age": 3 }],
        }))
        .unwrap();

        assert_eq!(
            criteria.filter,
            Some(Expr::Or(vec![Filter::eq("name", "a"), Filter::eq("age", 3)]).not()),
        );
    }

    #[test]
    fn modifiers_carry_options() {
        let options = FindOptions::builder()
            .order("name")
            .limit(2)
            .offset(4)
            .fields(["name"])
            .hint("comment", "x")
            .build();
        let modifiers = compile(&options).unwrap().modifiers;

        assert_eq!(modifiers.sort, vec![Sort::new("name", SortDirection::Asc)]);
        assert_eq!(modifiers.limit, Some(2));
        assert_eq!(modifiers.offset, Some(4));
        assert_eq!(modifiers.fields, Some(vec!["name".to_string()]));
        assert_eq!(modifiers.hints, doc! { "comment": "x" });
    }

    #[test]
    fn parse_order_is_case_insensitive() {
        assert_eq!(
            parse_order("name ASC, age Desc").unwrap(),
            vec![Sort::new("name", SortDirection::Asc), Sort::new("age", SortDirection::Desc)],
        );
    }

    #[test]
    fn parse_order_rejects_unknown_direction() {
        assert!(parse_order("name sideways").is_err());
        assert!(parse_order("name asc extra").is_err());
    }

    #[test]
    fn invert_order_swaps_directions() {
        assert_eq!(invert_order("name asc").unwrap(), "name desc");
        assert_eq!(invert_order("name desc").unwrap(), "name asc");
        assert_eq!(invert_order("name").unwrap(), "name desc");
        assert_eq!(invert_order("name DESC, age").unwrap(), "name asc, age desc");
    }

    #[test]
    fn invert_order_of_blank_text_is_empty() {
        assert_eq!(invert_order(" , ").unwrap(), "");
        assert_eq!(invert_order(",").unwrap(), "");
    }

    #[test]
    fn invert_order_is_self_inverse() {
        for order in ["name asc", "name desc", "a asc, b desc"] {
            assert_eq!(invert_order(&invert_order(order).unwrap()).unwrap(), order);
        }
    }
}
