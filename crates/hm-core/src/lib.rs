//! Core telemetry engine for a host design application.
//!
//! This crate contains the fundamental types and logic for:
//! - Operation timing: turning begin/end notification pairs into one record
//! - Presence tracking: sessions of active work closed by idleness or focus loss
//! - Event correlation: routing host notifications to timers and records
//!
//! Platform access lives behind [`PresenceProbe`]; see the `hm-probe` crate.

pub mod clock;
pub mod correlator;
pub mod enrich;
pub mod event;
pub mod event_type;
mod poller;
pub mod presence;
pub mod provider;
pub mod telemetry;
mod timer;
pub mod toggles;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use correlator::{EventCorrelator, HostEventSource};
pub use enrich::{EnrichedSink, HostInfo};
pub use event::{DocumentRef, ElementInfo, HostDocument, HostError, HostEvent, Notification, UiItem};
pub use event_type::{Category, HostEventKind, UnknownEventKind};
pub use poller::PresencePoller;
pub use presence::{CloseReason, PresenceTracker, TrackerPhase};
pub use provider::{HostContext, NullProbe, PresenceProbe};
pub use telemetry::{
    FieldValue, Fields, JsonLinesSink, MemorySink, Severity, SinkError, TelemetryRecord,
    TelemetrySink, TracingSink,
};
pub use timer::{ELAPSED_SECONDS_FIELD, OperationTimer};
pub use toggles::{ConfigError, EventToggles};
pub use types::{DocumentType, ElementId, ValidationError, WindowHandle};
