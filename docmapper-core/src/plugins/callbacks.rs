//! Lifecycle callbacks.
//!
//! Closures run before and after validation, save, create, update and destroy. A `before`
//! callback returning `false` halts the operation: `save` and `destroy` then return `false`
//! without contacting the store. Callbacks for one event run in registration order.
//!
//! ```ignore
//! let callbacks = Callbacks::new()
//!     .before(LifecycleEvent::Save, |record| {
//!         if let Some(Bson::String(email)) = record.get("email").cloned() {
//!             record.set("email", email.to_lowercase());
//!         }
//!         true
//!     })
//!     .after(LifecycleEvent::Destroy, |record| tracing::info!(id = ?record.id(), "gone"));
//! ```

use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use crate::{
    error::DocumentStoreResult,
    plugin::{LifecycleEvent, LifecycleHook, Plugin},
    record::Record,
    registry::Installer,
};

type BeforeCallback = Arc<dyn Fn(&mut Record) -> bool + Send + Sync>;
type AfterCallback = Arc<dyn Fn(&mut Record) + Send + Sync>;

/// The `callbacks` behavior module. Requires `validations`.
#[derive(Clone, Default)]
pub struct Callbacks {
    before: Vec<(LifecycleEvent, BeforeCallback)>,
    after: Vec<(LifecycleEvent, AfterCallback)>,
}

impl Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("before", &self.before.iter().map(|(event, _)| event).collect::<Vec<_>>())
            .field("after", &self.after.iter().map(|(event, _)| event).collect::<Vec<_>>())
            .finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks::default()
    }

    pub fn before<F>(mut self, event: LifecycleEvent, callback: F) -> Self
    where
        F: Fn(&mut Record) -> bool + Send + Sync + 'static,
    {
        self.before.push((event, Arc::new(callback)));
        self
    }

    pub fn after<F>(mut self, event: LifecycleEvent, callback: F) -> Self
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        self.after.push((event, Arc::new(callback)));
        self
    }
}

impl Plugin for Callbacks {
    fn name(&self) -> &'static str {
        "callbacks"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["validations"]
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        installer.lifecycle_hook(Arc::new(self.clone()));
        Ok(())
    }
}

impl LifecycleHook for Callbacks {
    fn before(&self, event: LifecycleEvent, record: &mut Record) -> bool {
        self.before
            .iter()
            .filter(|(registered, _)| *registered == event)
            .all(|(_, callback)| callback(record))
    }

    fn after(&self, event: LifecycleEvent, record: &mut Record) {
        for (_, callback) in self
            .after
            .iter()
            .filter(|(registered, _)| *registered == event)
        {
            callback(record);
        }
    }
}
