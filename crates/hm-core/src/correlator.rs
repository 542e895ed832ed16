//! Bridges host lifecycle notifications to timers, direct records and the
//! presence tracker.
//!
//! # Subscription symmetry
//!
//! [`EventCorrelator::activate`] records every notification kind it actually
//! subscribed to; [`EventCorrelator::deactivate`] unsubscribes exactly that
//! recorded set. Toggle changes in between cannot leave a subscription
//! behind or remove one twice.
//!
//! # Error policy
//!
//! Handlers return `Result<(), HostError>`, and [`EventCorrelator::dispatch`]
//! logs and swallows any error. Nothing a handler does can fail the host
//! operation being observed.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::event::{DocumentRef, ElementInfo, HostDocument, HostError, HostEvent, Notification};
use crate::event_type::{Category, HostEventKind};
use crate::poller::PresencePoller;
use crate::presence::{CloseReason, PresenceTracker};
use crate::telemetry::{self, FieldValue, Fields, TelemetryRecord, TelemetrySink};
use crate::timer::OperationTimer;
use crate::toggles::EventToggles;
use crate::types::{DocumentType, ElementId};

pub const OPENING_TEMPLATE: &str = "Opening Document";
pub const SAVING_TEMPLATE: &str = "Saving Document";
pub const SAVING_AS_TEMPLATE: &str = "Saving Document As";
pub const SYNCHRONIZING_TEMPLATE: &str = "Synchronizing Document";
pub const PRINTED_TEMPLATE: &str = "Printed Document";
pub const IMPORTED_TEMPLATE: &str = "File Imported";
pub const EXPORTED_TEMPLATE: &str = "File Exported";
pub const FAMILY_LOADED_TEMPLATE: &str = "Family Loaded";
pub const MODIFIED_TEMPLATE: &str = "Document Modified";
pub const VIEW_ACTIVATED_TEMPLATE: &str = "View Activated";
pub const BUTTON_CLICKED_TEMPLATE: &str = "Button Clicked";
pub const INITIALIZED_TEMPLATE: &str = "Application Initialized";

/// Placeholder for values that could not be read.
const NOT_AVAILABLE: &str = "N/A";
const UNRESOLVED_VIEW: &str = "Could not be determined";

/// The host's subscription surface.
pub trait HostEventSource {
    fn subscribe(&mut self, kind: HostEventKind) -> Result<(), HostError>;
    fn unsubscribe(&mut self, kind: HostEventKind) -> Result<(), HostError>;
}

/// Size of the file at `path` in megabytes, or `N/A` when it cannot be read.
#[expect(
    clippy::cast_precision_loss,
    reason = "megabyte display with two decimals"
)]
pub fn document_size_mb(path: &str) -> FieldValue {
    if path.is_empty() {
        return FieldValue::from(NOT_AVAILABLE);
    }
    match std::fs::metadata(path) {
        Ok(meta) => FieldValue::from(format!("{:.2}", meta.len() as f64 / (1024.0 * 1024.0))),
        Err(e) => {
            tracing::debug!(path, error = %e, "could not read document size");
            FieldValue::from(NOT_AVAILABLE)
        }
    }
}

/// Path, title and size of a document.
fn document_fields(document: &dyn HostDocument) -> Result<Fields, HostError> {
    let path = document.path_name()?;
    let title = document.title()?;
    let mut fields = Fields::new();
    fields.push("DocumentSizeMb", document_size_mb(&path));
    fields.push("Document", path);
    fields.push("Title", title);
    Ok(fields)
}

fn normalize_control_text(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Label and kind of one printed item. Sheets are prefixed with their number.
fn printed_view_label(info: Option<ElementInfo>) -> (String, &'static str) {
    match info {
        Some(ElementInfo::Sheet { number, name }) => (format!("{number}-{name}"), "Sheet"),
        Some(ElementInfo::View { name }) => (name, "View"),
        Some(ElementInfo::Other) | None => (UNRESOLVED_VIEW.to_string(), "Unknown"),
    }
}

/// Converts host notifications into telemetry.
pub struct EventCorrelator {
    toggles: EventToggles,
    sink: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    tracker: Option<Arc<PresenceTracker>>,
    poller: PresencePoller,
    subscribed: BTreeSet<HostEventKind>,
    opening: OperationTimer,
    saving: OperationTimer,
    saving_as: OperationTimer,
    synchronizing: OperationTimer,
}

impl EventCorrelator {
    pub fn new(toggles: EventToggles, sink: Arc<dyn TelemetrySink>, clock: Arc<dyn Clock>) -> Self {
        let timer = |name: &str| OperationTimer::new(name, clock.clone(), sink.clone());
        Self {
            opening: timer(OPENING_TEMPLATE),
            saving: timer(SAVING_TEMPLATE),
            saving_as: timer(SAVING_AS_TEMPLATE),
            synchronizing: timer(SYNCHRONIZING_TEMPLATE),
            toggles,
            sink,
            clock,
            tracker: None,
            poller: PresencePoller::new(),
            subscribed: BTreeSet::new(),
        }
    }

    /// Attaches the presence tracker driven by document and view notifications.
    #[must_use]
    pub fn with_presence(mut self, tracker: Arc<PresenceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub const fn toggles(&self) -> &EventToggles {
        &self.toggles
    }

    /// Replaces the toggles used by handlers.
    ///
    /// Existing subscriptions are left alone; they are released by
    /// [`deactivate`](Self::deactivate) whatever the toggles say then.
    pub fn set_toggles(&mut self, toggles: EventToggles) {
        self.toggles = toggles;
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = HostEventKind> + '_ {
        self.subscribed.iter().copied()
    }

    pub fn is_subscribed(&self, kind: HostEventKind) -> bool {
        self.subscribed.contains(&kind)
    }

    pub fn tracker(&self) -> Option<&Arc<PresenceTracker>> {
        self.tracker.as_ref()
    }

    /// Subscribes to every notification the enabled categories need.
    ///
    /// Returns the number of new subscriptions.
    pub fn activate(&mut self, source: &mut dyn HostEventSource) -> usize {
        let mut added = 0;
        for kind in self.toggles.required_events() {
            if self.subscribed.contains(&kind) {
                continue;
            }
            match source.subscribe(kind) {
                Ok(()) => {
                    self.subscribed.insert(kind);
                    added += 1;
                }
                Err(e) => tracing::warn!(event = %kind, error = %e, "host refused subscription"),
            }
        }
        tracing::info!(subscriptions = self.subscribed.len(), "event correlator activated");
        added
    }

    /// Unsubscribes everything [`activate`](Self::activate) subscribed.
    pub fn deactivate(&mut self, source: &mut dyn HostEventSource) {
        for kind in std::mem::take(&mut self.subscribed) {
            if let Err(e) = source.unsubscribe(kind) {
                tracing::warn!(event = %kind, error = %e, "host refused unsubscription");
            }
        }
    }

    /// Opens a presence session on a document the host already has active.
    pub fn arm_presence(&self) {
        if !self.enabled(Category::Presence) {
            return;
        }
        if let Some(tracker) = &self.tracker {
            tracker.start_if_document_active();
        }
    }

    /// Starts background presence polls if presence tracking is enabled.
    pub fn start_polling(&mut self) {
        if !self.toggles.time_spent {
            return;
        }
        if let Some(tracker) = &self.tracker {
            self.poller
                .start(Arc::clone(tracker), self.toggles.poll_interval());
        }
        self.arm_presence();
    }

    /// Unsubscribes, stops polling and flushes the open presence session.
    pub fn shutdown(&mut self, source: &mut dyn HostEventSource) {
        self.deactivate(source);
        self.poller.stop();
        if let Some(tracker) = &self.tracker {
            tracker.stop(CloseReason::Finished);
        }
    }

    /// Handles one host notification. Never fails.
    pub fn dispatch(&mut self, notification: &Notification) {
        let kind = notification.kind();
        if !self.subscribed.contains(&kind) {
            tracing::trace!(event = %kind, "ignoring notification without subscription");
            return;
        }
        if !notification.valid {
            tracing::debug!(event = %kind, "skipping notification with invalid payload");
            return;
        }
        if let Err(e) = self.handle(&notification.event) {
            tracing::warn!(event = %kind, error = %e, "failed to record host notification");
        }
    }

    fn enabled(&self, category: Category) -> bool {
        self.toggles.is_enabled(category)
    }

    fn record(&self, template: &str) -> TelemetryRecord {
        TelemetryRecord::information(template, self.clock.now())
    }

    fn publish(&self, record: &TelemetryRecord) {
        telemetry::emit(self.sink.as_ref(), record);
    }

    fn handle(&mut self, event: &HostEvent) -> Result<(), HostError> {
        match event {
            HostEvent::ApplicationInitialized => {
                if self.enabled(Category::Initialization) {
                    self.publish(&self.record(INITIALIZED_TEMPLATE));
                }
                Ok(())
            }
            HostEvent::DocumentOpening {
                path,
                document_type,
            } => {
                self.on_opening(path, *document_type);
                Ok(())
            }
            HostEvent::DocumentOpened { document } => self.on_opened(document),
            HostEvent::DocumentSaving { .. } => {
                if self.enabled(Category::Saving) {
                    self.saving.cancel();
                    self.saving.start();
                }
                Ok(())
            }
            HostEvent::DocumentSaved { document } => {
                if !self.enabled(Category::Saving) {
                    return Ok(());
                }
                finish_timer(&mut self.saving, document.as_ref(), Fields::new())
            }
            HostEvent::DocumentSavingAs { path, .. } => {
                if self.enabled(Category::Saving) {
                    self.saving_as.cancel();
                    self.saving_as.add_context("TargetPath", path.as_str());
                    self.saving_as.start();
                }
                Ok(())
            }
            HostEvent::DocumentSavedAs {
                document,
                original_path,
                is_master_file,
            } => {
                if !self.enabled(Category::Saving) {
                    return Ok(());
                }
                let mut extra = Fields::new();
                extra.push("MasterFile", *is_master_file);
                extra.push("OriginalPath", original_path.as_str());
                finish_timer(&mut self.saving_as, document.as_ref(), extra)
            }
            HostEvent::DocumentSynchronizing {
                location, comments, ..
            } => {
                if self.enabled(Category::Synchronizing) {
                    self.synchronizing.cancel();
                    self.synchronizing.add_context("Location", location.as_str());
                    self.synchronizing.add_context("Comments", comments.as_str());
                    self.synchronizing.start();
                }
                Ok(())
            }
            HostEvent::DocumentSynchronized { document } => {
                if !self.enabled(Category::Synchronizing) {
                    return Ok(());
                }
                finish_timer(&mut self.synchronizing, document.as_ref(), Fields::new())
            }
            HostEvent::DocumentPrinted {
                document,
                printed_views,
            } => self.on_printed(document.as_ref(), printed_views),
            HostEvent::DocumentChanged {
                document,
                added,
                modified,
                deleted,
            } => {
                if !self.enabled(Category::Changes) {
                    return Ok(());
                }
                let record = self
                    .record(MODIFIED_TEMPLATE)
                    .with_field("Document", document.path_name()?)
                    .with_field("AddedElements", added.len())
                    .with_field("ModifiedElements", modified.len())
                    .with_field("DeletedElements", deleted.len());
                self.publish(&record);
                Ok(())
            }
            HostEvent::FileImported {
                document,
                format,
                path,
            } => {
                if !self.enabled(Category::Importing) {
                    return Ok(());
                }
                self.on_file_transfer(IMPORTED_TEMPLATE, document.as_ref(), format, path)
            }
            HostEvent::FileExported {
                document,
                format,
                path,
            } => {
                if !self.enabled(Category::Exporting) {
                    return Ok(());
                }
                self.on_file_transfer(EXPORTED_TEMPLATE, document.as_ref(), format, path)
            }
            HostEvent::FamilyLoaded {
                document,
                family_name,
                family_path,
                original_family_id,
            } => {
                if !self.enabled(Category::FamilyLoading) {
                    return Ok(());
                }
                let record = self
                    .record(FAMILY_LOADED_TEMPLATE)
                    .with_field("FamilyName", family_name.as_str())
                    .with_field("FamilyPath", family_path.as_str())
                    .with_field("Document", document.path_name()?)
                    .with_field("Title", document.title()?)
                    .with_field("Override", is_override(*original_family_id));
                self.publish(&record);
                Ok(())
            }
            HostEvent::ViewActivated {
                document,
                view_name,
                previous_document,
            } => self.on_view_activated(document, view_name, previous_document.as_ref()),
            HostEvent::UiActionExecuted { item } => {
                if !self.enabled(Category::UiClicks) {
                    return Ok(());
                }
                let Some(item) = item else {
                    tracing::debug!("ui action without an item");
                    return Ok(());
                };
                let record = self
                    .record(BUTTON_CLICKED_TEMPLATE)
                    .with_field("ButtonText", normalize_control_text(&item.text))
                    .with_field("ButtonId", item.id.as_str());
                self.publish(&record);
                Ok(())
            }
        }
    }

    fn on_opening(&mut self, path: &str, document_type: DocumentType) {
        if !self.enabled(Category::Opening) {
            return;
        }
        if document_type != DocumentType::Project {
            tracing::debug!(path, %document_type, "not timing non-project document");
            return;
        }
        self.opening.cancel();
        self.opening.add_context("DocumentPath", path);
        self.opening.add_context("DocumentType", document_type.as_str());
        self.opening.start();
    }

    fn on_opened(&mut self, document: &DocumentRef) -> Result<(), HostError> {
        let opening = if self.enabled(Category::Opening) && self.opening.is_running() {
            finish_timer(&mut self.opening, document.as_ref(), Fields::new())
        } else {
            Ok(())
        };

        if self.enabled(Category::Presence) {
            if let Some(tracker) = &self.tracker {
                tracker.start();
            }
        }

        opening
    }

    fn on_printed(
        &self,
        document: &dyn HostDocument,
        printed_views: &[ElementId],
    ) -> Result<(), HostError> {
        if !self.enabled(Category::Printing) {
            return Ok(());
        }
        let path = document.path_name()?;

        // Resolve everything first so a stale document emits nothing.
        let mut records = Vec::with_capacity(printed_views.len());
        for id in printed_views {
            let (view, view_type) = printed_view_label(document.element(*id)?);
            records.push(
                self.record(PRINTED_TEMPLATE)
                    .with_field("View", view)
                    .with_field("ViewType", view_type)
                    .with_field("ViewId", id.value())
                    .with_field("Document", path.as_str()),
            );
        }
        for record in &records {
            self.publish(record);
        }
        Ok(())
    }

    fn on_file_transfer(
        &self,
        template: &str,
        document: &dyn HostDocument,
        format: &str,
        path: &str,
    ) -> Result<(), HostError> {
        let record = self
            .record(template)
            .with_field("FileFormat", format)
            .with_field("Path", path)
            .with_field("Document", document.path_name()?)
            .with_field("Title", document.title()?);
        self.publish(&record);
        Ok(())
    }

    fn on_view_activated(
        &self,
        document: &DocumentRef,
        view_name: &str,
        previous_document: Option<&DocumentRef>,
    ) -> Result<(), HostError> {
        let track_views = self.enabled(Category::ViewChange);
        let track_presence = self.enabled(Category::Presence) && self.tracker.is_some();
        if !track_views && !track_presence {
            return Ok(());
        }
        let path = document.path_name()?;

        if track_views {
            let record = self
                .record(VIEW_ACTIVATED_TEMPLATE)
                .with_field("ViewName", view_name)
                .with_field("Document", path.as_str())
                .with_field("Title", document.title()?);
            self.publish(&record);
        }

        if track_presence {
            if let Some(tracker) = &self.tracker {
                // Without a readable previous view, compare with the session's document.
                let previous = previous_document
                    .and_then(|d| d.path_name().ok())
                    .or_else(|| tracker.session_document());
                if previous.as_deref() == Some(path.as_str()) {
                    tracker.start();
                } else {
                    tracker.change_document(path);
                }
            }
        }
        Ok(())
    }
}

/// Whether a loaded family replaced an existing one.
///
/// The host reports the invalid-id sentinel as the original family id for
/// overriding loads.
const fn is_override(original_family_id: ElementId) -> bool {
    original_family_id.is_invalid()
}

/// Adds document details and `extra` to a running timer and stops it.
///
/// A timer that is not running is left alone. On a host error the
/// measurement is dropped so stale context cannot leak into the next one.
fn finish_timer(
    timer: &mut OperationTimer,
    document: &dyn HostDocument,
    extra: Fields,
) -> Result<(), HostError> {
    if !timer.is_running() {
        return Ok(());
    }
    let fields = match document_fields(document) {
        Ok(fields) => fields,
        Err(e) => {
            timer.cancel();
            return Err(e);
        }
    };
    for (key, value) in fields.iter().chain(extra.iter()) {
        timer.add_context(key, value.clone());
    }
    timer.stop();
    Ok(())
}

impl std::fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCorrelator")
            .field("toggles", &self.toggles)
            .field("subscribed", &self.subscribed)
            .field("presence", &self.tracker.is_some())
            .finish_non_exhaustive()
    }
}
