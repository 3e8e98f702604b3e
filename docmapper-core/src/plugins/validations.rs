//! Validation gating.
//!
//! Saving a record first runs every registered [`Validator`]; a record with errors is not
//! saved. The `validations` module contributes a small rule set:
//!
//! ```ignore
//! let validations = Validations::new()
//!     .presence_of("name")
//!     .length_of("name", Some(2), Some(40))
//!     .validate_with(|record, errors| {
//!         if record.get("age").and_then(|age| age.as_i32()).is_some_and(|age| age < 0) {
//!             errors.add("age", "must not be negative");
//!         }
//!     });
//! ```

use bson::Bson;
use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

use crate::{
    error::DocumentStoreResult,
    plugin::{Plugin, Validator},
    record::Record,
    registry::Installer,
};

/// One validation failure on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.message)
    }
}

/// The structured error list of a validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: Vec<ValidationError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        ValidationErrors::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError { field: field.into(), message: message.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.errors.iter()
    }

    /// Messages recorded for `field`.
    pub fn on(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|error| error.field == field)
            .map(|error| error.message.as_str())
            .collect()
    }

    /// `"<field> <message>"` for every error.
    pub fn full_messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_messages().join(", "))
    }
}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a ValidationError;
    type IntoIter = std::slice::Iter<'a, ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

type CustomRule = Arc<dyn Fn(&Record, &mut ValidationErrors) + Send + Sync>;

#[derive(Clone)]
enum Rule {
    Presence(String),
    Length {
        field: String,
        min: Option<usize>,
        max: Option<usize>,
    },
    Custom(CustomRule),
}

impl Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Presence(field) => f.debug_tuple("Presence").field(field).finish(),
            Rule::Length { field, min, max } => f
                .debug_struct("Length")
                .field("field", field)
                .field("min", min)
                .field("max", max)
                .finish(),
            Rule::Custom(_) => f.write_str("Custom"),
        }
    }
}

fn is_blank(value: Option<&Bson>) -> bool {
    match value {
        None | Some(Bson::Null) => true,
        Some(Bson::String(text)) => text.trim().is_empty(),
        Some(Bson::Array(items)) => items.is_empty(),
        Some(Bson::Document(document)) => document.is_empty(),
        Some(_) => false,
    }
}

fn length(value: &Bson) -> Option<usize> {
    match value {
        Bson::String(text) => Some(text.chars().count()),
        Bson::Array(items) => Some(items.len()),
        _ => None,
    }
}

impl Rule {
    fn check(&self, record: &Record, errors: &mut ValidationErrors) {
        match self {
            Rule::Presence(field) => {
                if is_blank(record.get(field)) {
                    errors.add(field.clone(), "can't be blank");
                }
            }
            Rule::Length { field, min, max } => {
                let Some(length) = record.get(field).and_then(length) else {
                    return;
                };

                if let Some(min) = min.filter(|min| length < *min) {
                    errors.add(field.clone(), format!("is too short (minimum is {min})"));
                }
                if let Some(max) = max.filter(|max| length > *max) {
                    errors.add(field.clone(), format!("is too long (maximum is {max})"));
                }
            }
            Rule::Custom(rule) => rule(record, errors),
        }
    }
}

/// The `validations` behavior module.
#[derive(Debug, Clone, Default)]
pub struct Validations {
    rules: Vec<Rule>,
}

impl Validations {
    pub fn new() -> Self {
        Validations::default()
    }

    /// The field must be present and not blank.
    pub fn presence_of(mut self, field: impl Into<String>) -> Self {
        self.rules.push(Rule::Presence(field.into()));
        self
    }

    /// A string or array field, when present, must have a length within the bounds.
    pub fn length_of(mut self, field: impl Into<String>, min: Option<usize>, max: Option<usize>) -> Self {
        self.rules.push(Rule::Length { field: field.into(), min, max });
        self
    }

    pub fn validate_with<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Record, &mut ValidationErrors) + Send + Sync + 'static,
    {
        self.rules.push(Rule::Custom(Arc::new(rule)));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Plugin for Validations {
    fn name(&self) -> &'static str {
        "validations"
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        installer.validator(Arc::new(RuleSet { rules: self.rules.clone() }));
        Ok(())
    }
}

#[derive(Debug)]
struct RuleSet {
    rules: Vec<Rule>,
}

impl Validator for RuleSet {
    fn validate(&self, record: &Record, errors: &mut ValidationErrors) {
        for rule in &self.rules {
            rule.check(record, errors);
        }
    }
}
