//! Finder instrumentation.
//!
//! `query_logger` is installed after `querying` and wraps `find_one`/`find_many`. Each call
//! is timed and added to the type's [`QueryRuntime`]; when the type's logger admits DEBUG a
//! line with the operation label, elapsed milliseconds and compiled modifiers is emitted under
//! the `docmapper::query` target. Results and errors pass through untouched.

use async_trait::async_trait;
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::debug;

use crate::{
    error::DocumentStoreResult,
    model::Model,
    plugin::{FinderLayer, Next, Plugin},
    plugins::logger::TypeLogger,
    query::{FindOptions, Modifiers},
    record::Record,
    registry::Installer,
};

/// Running total of time spent in a type's finders.
#[derive(Debug, Default)]
pub struct QueryRuntime {
    nanos: AtomicU64,
    calls: AtomicU64,
}

impl QueryRuntime {
    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.nanos.store(0, Ordering::Relaxed);
        self.calls.store(0, Ordering::Relaxed);
    }

    fn record(&self, elapsed: Duration) {
        // At least one nanosecond per call, so every timed call moves the total.
        let nanos = u64::try_from(elapsed.as_nanos())
            .unwrap_or(u64::MAX)
            .max(1);

        self.nanos.fetch_add(nanos, Ordering::Relaxed);
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// Formats one query log line: `"<label> (<ms>ms)  <modifiers>"`.
pub fn format_log_entry(label: &str, elapsed: Duration, modifiers: &Modifiers) -> String {
    format!("{label} ({:.1}ms)  {modifiers:?}", elapsed.as_secs_f64() * 1000.0)
}

/// The `query_logger` behavior module. Requires `logger` and `querying`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryLogger;

impl Plugin for QueryLogger {
    fn name(&self) -> &'static str {
        "query_logger"
    }

    fn requires(&self) -> &'static [&'static str] {
        &["logger", "querying"]
    }

    fn install(&self, installer: &mut Installer<'_>) -> DocumentStoreResult<()> {
        installer.require_state::<TypeLogger>()?;
        installer.set_state(QueryRuntime::default());
        installer.finder_layer(Arc::new(TimedFinder));
        Ok(())
    }
}

#[derive(Debug)]
struct TimedFinder;

impl TimedFinder {
    fn instrument(&self, model: &Model, operation: &str, options: &FindOptions, elapsed: Duration) {
        if let Some(runtime) = model.state::<QueryRuntime>() {
            runtime.record(elapsed);
        }

        let debug_enabled = model
            .state::<TypeLogger>()
            .is_some_and(TypeLogger::debug_enabled);

        if !debug_enabled {
            return;
        }

        let modifiers = model
            .compile(options)
            .map(|criteria| criteria.modifiers)
            .unwrap_or_default();
        let label = format!("{}.{operation}", model.name());

        debug!(
            target: "docmapper::query",
            model = model.name(),
            "{}",
            format_log_entry(&label, elapsed, &modifiers),
        );
    }
}

#[async_trait]
impl FinderLayer for TimedFinder {
    async fn find_one(&self, model: &Model, options: &FindOptions, next: Next<'_>) -> DocumentStoreResult<Option<Record>> {
        let started = Instant::now();
        let result = next.find_one(options).await;

        self.instrument(model, "find_one", options, started.elapsed());
        result
    }

    async fn find_many(&self, model: &Model, options: &FindOptions, next: Next<'_>) -> DocumentStoreResult<Vec<Record>> {
        let started = Instant::now();
        let result = next.find_many(options).await;

        self.instrument(model, "find_many", options, started.elapsed());
        result
    }
}
