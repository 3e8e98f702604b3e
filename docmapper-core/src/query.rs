//! Query options, filter expressions and compiled criteria.
//!
//! Callers describe a query with [`FindOptions`]. The criteria compiler
//! ([`crate::criteria::compile`]) turns it into a [`Criteria`]: a backend-neutral filter
//! [`Expr`] plus [`Modifiers`] (sort, limit, offset, projection, pass-through hints).
//! Backends consume the filter through the [`QueryVisitor`] trait.
//!
//! ```ignore
//! use docmapper::query::FindOptions;
//! use bson::doc;
//!
//! let options = FindOptions::builder()
//!     .conditions(doc! { "status": "active", "age": { "$gte": 18 } })
//!     .order("created_at desc")
//!     .limit(10)
//!     .build();
//! ```

use bson::{Bson, Document};

use crate::error::DocumentStoreError;

pub const ID_FIELD: &str = "_id";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Returns the opposite direction.
    pub fn inverted(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// One sort key of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Sort { field: field.into(), direction }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    StartsWith,
    EndsWith,
    /// Field value (or any element of it) is one of the given values.
    AnyOf,
    /// Field value (and every element of it) is none of the given values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    /// Checks if a field exists (`true`) or is missing (`false`).
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Bson,
    },
}

impl Expr {
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// An existing AND list is extended rather than nested.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// An existing OR list is extended rather than nested.
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

    /// Folds a list of constraints into one expression.
    ///
    /// No constraints yields `None`, a single constraint is returned bare, and several are
    /// wrapped in an `And`.
    pub fn all(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::And(exprs)),
        }
    }
}

/// Static constructors for common filter expressions.
///
/// ```ignore
/// use docmapper::query::Filter;
///
/// let expr = Filter::eq("name", "Alice").and(Filter::gt("age", 18));
/// ```
pub struct Filter;

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
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

    /// Matches documents whose field is one of `values`.
    pub fn any_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, values.into())
    }

    /// Matches documents whose field is none of `values`.
    pub fn none_of(field: impl Into<String>, values: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, values.into())
    }
}

/// Identity shortcut: query by one id or by a list of ids instead of a conditions map.
#[derive(Debug, Clone, PartialEq)]
pub enum IdSelector {
    One(Bson),
    Many(Vec<Bson>),
}

/// The query options structure accepted by every finder, counter, deleter and updater.
///
/// Constructed per call and never retained. See [`crate::criteria::compile`] for the
/// translation rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Identity shortcut, folded into the filter on `_id`.
    pub ids: Option<IdSelector>,
    /// Field conditions: `field => value` or `field => { "$op": value }`.
    pub conditions: Document,
    /// Comma separated `<field> [asc|desc]` list.
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    /// Projection list. `_id` is always returned.
    pub fields: Option<Vec<String>>,
    /// Store-specific modifiers passed through untouched.
    pub hints: Document,
}

impl FindOptions {
    pub fn new() -> Self {
        FindOptions::default()
    }

    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::new()
    }

    /// Options matching a single identity.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        FindOptions { ids: Some(IdSelector::One(id.into())), ..FindOptions::default() }
    }

    /// Options matching any of the given identities.
    pub fn by_ids(ids: Vec<Bson>) -> Self {
        FindOptions { ids: Some(IdSelector::Many(ids)), ..FindOptions::default() }
    }

    /// Options with only a conditions document.
    pub fn with_conditions(conditions: Document) -> Self {
        FindOptions { conditions, ..FindOptions::default() }
    }

    /// Parses a loose option document.
    ///
    /// Recognised keys are `conditions`, `order`/`sort`, `limit`, `offset`/`skip`,
    /// `fields`/`select` and `_id`/`ids`. Any other key is kept verbatim in
    /// [`FindOptions::hints`].
    pub fn from_document(document: Document) -> Result<Self, DocumentStoreError> {
        let mut options = FindOptions::default();

        for (key, value) in document {
            match key.as_str() {
                "conditions" => match value {
                    Bson::Document(conditions) => options.conditions = conditions,
                    other => return Err(invalid_option("conditions", "a document", &other)),
                },
                "order" | "sort" => match value {
                    Bson::String(order) => options.order = Some(order),
                    other => return Err(invalid_option(&key, "a string", &other)),
                },
                "limit" => options.limit = Some(as_count(&key, &value)?),
                "offset" | "skip" => options.offset = Some(as_count(&key, &value)?),
                "fields" | "select" => options.fields = Some(as_field_list(&key, value)?),
                "_id" | "ids" => {
                    options.ids = Some(match value {
                        Bson::Array(ids) => IdSelector::Many(ids),
                        id => IdSelector::One(id),
                    })
                }
                _ => {
                    options.hints.insert(key, value);
                }
            }
        }

        Ok(options)
    }
}

fn invalid_option(key: &str, expected: &str, value: &Bson) -> DocumentStoreError {
    DocumentStoreError::InvalidArgument(format!("option {key} must be {expected}, got {value}"))
}

fn as_count(key: &str, value: &Bson) -> Result<usize, DocumentStoreError> {
    match value {
        Bson::Int32(n) if *n >= 0 => Ok(*n as usize),
        Bson::Int64(n) if *n >= 0 => Ok(*n as usize),
        other => Err(invalid_option(key, "a non-negative integer", other)),
    }
}

fn as_field_list(key: &str, value: Bson) -> Result<Vec<String>, DocumentStoreError> {
    match value {
        Bson::String(list) => Ok(list
            .split(',')
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()),
        Bson::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Bson::String(field) => Ok(field),
                other => Err(invalid_option(key, "a list of field names", &other)),
            })
            .collect(),
        other => Err(invalid_option(key, "a list of field names", &other)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    pub fn new() -> Self {
        FindOptionsBuilder { options: FindOptions::default() }
    }

    pub fn id(mut self, id: impl Into<Bson>) -> Self {
        self.options.ids = Some(IdSelector::One(id.into()));
        self
    }

    pub fn ids<I, V>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.options.ids = Some(IdSelector::Many(ids.into_iter().map(Into::into).collect()));
        self
    }

    /// Replaces the conditions document.
    pub fn conditions(mut self, conditions: Document) -> Self {
        self.options.conditions = conditions;
        self
    }

    /// Adds a single condition, replacing any previous condition on the same field.
    pub fn condition(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.conditions.insert(field.into(), value.into());
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.options.order = Some(order.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.options.offset = Some(offset);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Adds a store-specific modifier that is passed through to the backend.
    pub fn hint(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.hints.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Query modifiers produced by the criteria compiler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Modifiers {
    pub sort: Vec<Sort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub fields: Option<Vec<String>>,
    pub hints: Document,
}

/// The compiled form of [`FindOptions`]: a filter plus modifiers.
///
/// Handed once to the store backend and discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    pub filter: Option<Expr>,
    pub modifiers: Modifiers,
}

impl Criteria {
    /// Narrows the filter with an additional constraint.
    pub fn and_filter(mut self, expr: Expr) -> Self {
        self.filter = Some(match self.filter {
            Some(filter) => filter.and(expr),
            None => expr,
        });
        self
    }
}

/// Index specification passed to [`crate::backend::StoreBackend::create_index`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub keys: Vec<Sort>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexSpec {
    pub fn new(keys: Vec<Sort>) -> Self {
        IndexSpec { keys, unique: false, name: None }
    }

    /// Single-field ascending index.
    pub fn ascending(field: impl Into<String>) -> Self {
        IndexSpec::new(vec![Sort::new(field, SortDirection::Asc)])
    }

    /// Parses an index from order syntax, e.g. `"last_name asc, age desc"`.
    pub fn parse(spec: &str) -> Result<Self, DocumentStoreError> {
        let keys = crate::criteria::parse_order(spec)?;

        if keys.is_empty() {
            return Err(DocumentStoreError::InvalidArgument("index spec must name at least one field".into()));
        }

        Ok(IndexSpec::new(keys))
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Visitor over filter expressions, implemented by backends to evaluate or translate them.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}
