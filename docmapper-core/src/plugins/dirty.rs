//! Dirty-state tracking.
//!
//! Records which declared fields changed since the record was loaded or last saved, along
//! with each field's original value. Setting a field back to its original value makes it
//! clean again. `_id` and undeclared fields are not tracked.

use bson::Bson;
use std::sync::Arc;

use crate::{
    error::DocumentStoreResult,
    plugin::{AttributeObserver, ConstructHook, Extensions, Plugin, ReloadHook},
    plugins::keys::Schema,
    query::ID_FIELD,
    record::Record,
    registry::Installer,
};

/// Per-record set of changed fields, in the order they first changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangedFields {
    changes: Vec<(String, Option<Bson>)>,
}

impl ChangedFields {
    pub fn fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .map(|(field, _)| field.clone())
            .collect()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changes
            .iter()
            .any(|(changed, _)| changed == field)
    }

    /// The value `field` had before it changed; `Some(None)` if it was absent.
    pub fn original(&self, field: &str) -> Option<Option<&Bson>> {
        self.changes
            .iter()
            .find(|(changed, _)| changed == field)
            .map(|(_, original)| original.as_ref())
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
    }

    fn record(&mut self, field: &str, old: Option<&Bson>, new: Option<&Bson>) {
        match self
            .changes
            .iter()
            .position(|(changed, _)| changed == field)
        {
            Some(position) => {
                if self.changes[position].1.as_ref() == new {
                    self.changes.remove(position);
                }
            }
            None if old != new => self
                .changes
                .push((field.to_string(), old.cloned())),
            None => {}
        }
    }
}

/// The `dirty` behavior module. Requires `keys`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dirty;

impl Plugin for Dirty {
    fn name(&self) -> &'static str {
        "dirty"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["keys"]
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        let tracking = Arc::new(DirtyTracking {
            schema: Arc::new(installer.require_state::<Schema>()?.clone()),
        });

        installer.on_construct(tracking.clone());
        installer.attribute_observer(tracking.clone());
        installer.on_reload(tracking);

        Ok(())
    }
}

#[derive(Debug)]
struct DirtyTracking {
    schema: Arc<Schema>,
}

impl ConstructHook for DirtyTracking {
    fn construct(&self, record: &mut Record) {
        record
            .extensions_mut()
            .insert(ChangedFields::default());
    }
}

impl AttributeObserver for DirtyTracking {
    fn attribute_changed(&self, extensions: &mut Extensions, field: &str, old: Option<&Bson>, new: Option<&Bson>) {
        if field == ID_FIELD || !self.schema.contains(field) {
            return;
        }

        if !extensions.contains::<ChangedFields>() {
            extensions.insert(ChangedFields::default());
        }

        if let Some(changes) = extensions.get_mut::<ChangedFields>() {
            changes.record(field, old, new);
        }
    }
}

impl ReloadHook for DirtyTracking {
    fn reset(&self, record: &mut Record) {
        record.clear_changes();
    }
}
