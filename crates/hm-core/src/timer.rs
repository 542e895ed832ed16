//! Restartable stopwatch that turns a begin/end pair into one record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::telemetry::{self, FieldValue, Fields, TelemetryRecord, TelemetrySink};

/// Field appended by [`OperationTimer::stop`] with whole elapsed seconds.
pub const ELAPSED_SECONDS_FIELD: &str = "ElapsedSeconds";

/// A named measurement with a bag of context fields.
///
/// The timer is idle until [`start`](Self::start) and running until
/// [`stop`](Self::stop). Stopping emits one record named after the operation
/// and returns the timer to idle with an empty context. Context added while
/// idle is kept for the next measurement.
pub struct OperationTimer {
    operation: String,
    context: Fields,
    started_at: Option<Instant>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn TelemetrySink>,
}

impl OperationTimer {
    pub fn new(
        operation: impl Into<String>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            operation: operation.into(),
            context: Fields::new(),
            started_at: None,
            clock,
            sink,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub const fn context(&self) -> &Fields {
        &self.context
    }

    /// Time measured so far, if running.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at
            .map(|start| self.clock.instant().saturating_duration_since(start))
    }

    /// Starts measuring from zero. Restarts silently if already running.
    pub fn start(&mut self) {
        self.started_at = Some(self.clock.instant());
    }

    pub fn add_context(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.context.push(key, value);
    }

    /// Drops the current measurement and context without emitting.
    pub fn cancel(&mut self) {
        self.started_at = None;
        self.context.clear();
    }

    /// Stops measuring and emits the record.
    ///
    /// Returns the measured duration, or `None` if the timer was not running
    /// (in which case nothing is emitted).
    pub fn stop(&mut self) -> Option<Duration> {
        let started_at = self.started_at.take()?;
        let elapsed = self.clock.instant().saturating_duration_since(started_at);

        self.context.push(ELAPSED_SECONDS_FIELD, elapsed.as_secs());
        let record = TelemetryRecord::information(self.operation.clone(), self.clock.now())
            .with_fields(std::mem::take(&mut self.context));

        tracing::debug!(
            operation = %self.operation,
            elapsed_ms = elapsed.as_millis(),
            "operation timer stopped"
        );
        telemetry::emit(self.sink.as_ref(), &record);

        Some(elapsed)
    }
}

impl std::fmt::Debug for OperationTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationTimer")
            .field("operation", &self.operation)
            .field("running", &self.is_running())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
