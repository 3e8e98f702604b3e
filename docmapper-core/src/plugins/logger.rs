//! Per-type logger handle.

use tracing::Level;

use crate::{error::DocumentStoreResult, plugin::Plugin, registry::Installer};

/// Logging configuration of one record type, registered as per-type state.
///
/// A type without a level logs nothing from the mapper, whatever the subscriber admits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeLogger {
    level: Option<Level>,
}

impl TypeLogger {
    pub fn new(level: Option<Level>) -> Self {
        TypeLogger { level }
    }

    pub fn level(&self) -> Option<Level> {
        self.level
    }

    /// Whether events at `level` are admitted. More verbose levels compare greater.
    pub fn enabled(&self, level: Level) -> bool {
        self.level
            .is_some_and(|configured| level <= configured)
    }

    pub fn debug_enabled(&self) -> bool {
        self.enabled(Level::DEBUG)
    }
}

/// The `logger` behavior module.
#[derive(Debug, Clone, Copy, Default)]
pub struct Logger {
    level: Option<Level>,
}

impl Logger {
    pub fn new(level: Level) -> Self {
        Logger { level: Some(level) }
    }

    pub fn disabled() -> Self {
        Logger { level: None }
    }
}

impl Plugin for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        installer.set_state(TypeLogger::new(self.level));
        Ok(())
    }
}
