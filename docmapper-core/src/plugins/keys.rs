//! Field schema.
//!
//! The `keys` module declares the fields of a record type. It registers the [`Schema`] as
//! per-type state (other modules, such as `dirty`, depend on it), applies declared defaults
//! to every new or loaded record, and validates the types of declared fields.
//!
//! `_id` is always declared.

use bson::{Bson, Document};
use std::sync::Arc;

use crate::{
    error::DocumentStoreResult,
    plugin::{ConstructHook, Plugin, Validator},
    plugins::validations::ValidationErrors,
    query::ID_FIELD,
    record::Record,
    registry::Installer,
};

/// Semantic type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Any,
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    ObjectId,
    Array,
    Document,
    Binary,
}

impl FieldType {
    /// Whether `value` is acceptable for a field of this type. `null` is always accepted.
    pub fn accepts(self, value: &Bson) -> bool {
        match (self, value) {
            (_, Bson::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Bson::String(_)) => true,
            (FieldType::Int, Bson::Int32(_) | Bson::Int64(_)) => true,
            (FieldType::Float, Bson::Double(_) | Bson::Int32(_) | Bson::Int64(_) | Bson::Decimal128(_)) => true,
            (FieldType::Boolean, Bson::Boolean(_)) => true,
            (FieldType::DateTime, Bson::DateTime(_) | Bson::Timestamp(_)) => true,
            (FieldType::ObjectId, Bson::ObjectId(_)) => true,
            (FieldType::Array, Bson::Array(_)) => true,
            (FieldType::Document, Bson::Document(_)) => true,
            (FieldType::Binary, Bson::Binary(_)) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::ObjectId => "object id",
            FieldType::Array => "array",
            FieldType::Document => "document",
            FieldType::Binary => "binary",
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub default: Option<Bson>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDef { name: name.into(), field_type, default: None }
    }

    pub fn with_default(mut self, default: impl Into<Bson>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Ordered set of declared fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: Vec<FieldDef>,
}

impl Default for Schema {
    fn default() -> Self {
        Schema::new()
    }
}

impl Schema {
    pub fn new() -> Self {
        Schema { fields: vec![FieldDef::new(ID_FIELD, FieldType::Any)] }
    }

    pub fn key(self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.field(FieldDef::new(name, field_type))
    }

    pub fn key_with_default(self, name: impl Into<String>, field_type: FieldType, default: impl Into<Bson>) -> Self {
        self.field(FieldDef::new(name, field_type).with_default(default))
    }

    /// Declares a field, replacing an earlier declaration with the same name.
    pub fn field(mut self, definition: FieldDef) -> Self {
        match self
            .fields
            .iter_mut()
            .find(|existing| existing.name == definition.name)
        {
            Some(existing) => *existing = definition,
            None => self.fields.push(definition),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .map(|field| field.name.as_str())
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Keeps only the declared fields of `attributes`.
    pub fn filter_declared(&self, attributes: Document) -> Document {
        attributes
            .into_iter()
            .filter(|(field, _)| self.contains(field))
            .collect()
    }
}

/// Types that can describe their own field schema, usually through `#[derive(Schema)]`.
pub trait HasSchema {
    fn schema() -> Schema;
}

/// The `keys` behavior module.
#[derive(Debug, Clone, Default)]
pub struct Keys {
    schema: Schema,
}

impl Keys {
    pub fn new() -> Self {
        Keys::default()
    }

    pub fn from_schema(schema: Schema) -> Self {
        Keys { schema }
    }

    pub fn from_type<T: HasSchema>() -> Self {
        Keys { schema: T::schema() }
    }

    pub fn key(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.schema = self.schema.key(name, field_type);
        self
    }

    pub fn key_with_default(mut self, name: impl Into<String>, field_type: FieldType, default: impl Into<Bson>) -> Self {
        self.schema = self
            .schema
            .key_with_default(name, field_type, default);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

impl Plugin for Keys {
    fn name(&self) -> &'static str {
        "keys"
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        let schema = Arc::new(self.schema.clone());

        installer.set_state(self.schema.clone());
        installer.on_construct(Arc::new(ApplyDefaults { schema: schema.clone() }));
        installer.validator(Arc::new(TypeCheck { schema }));

        Ok(())
    }
}

#[derive(Debug)]
struct ApplyDefaults {
    schema: Arc<Schema>,
}

impl ConstructHook for ApplyDefaults {
    fn construct(&self, record: &mut Record) {
        for field in self.schema.fields() {
            let Some(default) = &field.default else { continue };

            if !record.attributes().contains_key(&field.name) {
                record
                    .attributes_mut()
                    .insert(field.name.clone(), default.clone());
            }
        }
    }
}

#[derive(Debug)]
struct TypeCheck {
    schema: Arc<Schema>,
}

impl Validator for TypeCheck {
    fn validate(&self, record: &Record, errors: &mut ValidationErrors) {
        for field in self.schema.fields() {
            let Some(value) = record.get(&field.name) else { continue };

            if !field.field_type.accepts(value) {
                errors.add(field.name.clone(), format!("must be of type {}", field.field_type.as_str()));
            }
        }
    }
}
