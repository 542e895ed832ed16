//! Host lifecycle notifications and the document surface they carry.
//!
//! Payloads hold live references into the host. Any of those references may
//! become invalid between the host raising the notification and the handler
//! reading it, so every accessor on [`HostDocument`] is fallible.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::event_type::HostEventKind;
use crate::types::{DocumentType, ElementId};

/// Errors raised while reading host state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The referenced host object was closed or invalidated.
    #[error("host object is no longer valid: {0}")]
    InvalidObject(String),
    /// The host could not supply the requested data.
    #[error("host data unavailable: {0}")]
    Unavailable(String),
}

/// A document as exposed by the host.
pub trait HostDocument: Send + Sync + fmt::Debug {
    /// Full path of the document on disk (empty for unsaved documents).
    fn path_name(&self) -> Result<String, HostError>;

    /// Display title.
    fn title(&self) -> Result<String, HostError>;

    /// Looks up an element, `None` if the id does not resolve.
    fn element(&self, id: ElementId) -> Result<Option<ElementInfo>, HostError>;
}

pub type DocumentRef = Arc<dyn HostDocument>;

/// What an element id resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementInfo {
    View { name: String },
    Sheet { number: String, name: String },
    Other,
}

/// A ribbon or menu control the user executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiItem {
    pub text: String,
    pub id: String,
}

/// Payload of every notification the host can deliver.
#[derive(Debug, Clone)]
pub enum HostEvent {
    ApplicationInitialized,
    DocumentOpening {
        path: String,
        document_type: DocumentType,
    },
    DocumentOpened {
        document: DocumentRef,
    },
    DocumentSaving {
        document: DocumentRef,
    },
    DocumentSaved {
        document: DocumentRef,
    },
    DocumentSavingAs {
        document: DocumentRef,
        path: String,
    },
    DocumentSavedAs {
        document: DocumentRef,
        original_path: String,
        is_master_file: bool,
    },
    DocumentSynchronizing {
        document: DocumentRef,
        location: String,
        comments: String,
    },
    DocumentSynchronized {
        document: DocumentRef,
    },
    DocumentPrinted {
        document: DocumentRef,
        printed_views: Vec<ElementId>,
    },
    DocumentChanged {
        document: DocumentRef,
        added: Vec<ElementId>,
        modified: Vec<ElementId>,
        deleted: Vec<ElementId>,
    },
    FileImported {
        document: DocumentRef,
        format: String,
        path: String,
    },
    FileExported {
        document: DocumentRef,
        format: String,
        path: String,
    },
    FamilyLoaded {
        document: DocumentRef,
        family_name: String,
        family_path: String,
        original_family_id: ElementId,
    },
    ViewActivated {
        document: DocumentRef,
        view_name: String,
        previous_document: Option<DocumentRef>,
    },
    UiActionExecuted {
        item: Option<UiItem>,
    },
}

impl HostEvent {
    #[must_use]
    pub const fn kind(&self) -> HostEventKind {
        match self {
            Self::ApplicationInitialized => HostEventKind::ApplicationInitialized,
            Self::DocumentOpening { .. } => HostEventKind::DocumentOpening,
            Self::DocumentOpened { .. } => HostEventKind::DocumentOpened,
            Self::DocumentSaving { .. } => HostEventKind::DocumentSaving,
            Self::DocumentSaved { .. } => HostEventKind::DocumentSaved,
            Self::DocumentSavingAs { .. } => HostEventKind::DocumentSavingAs,
            Self::DocumentSavedAs { .. } => HostEventKind::DocumentSavedAs,
            Self::DocumentSynchronizing { .. } => HostEventKind::DocumentSynchronizing,
            Self::DocumentSynchronized { .. } => HostEventKind::DocumentSynchronized,
            Self::DocumentPrinted { .. } => HostEventKind::DocumentPrinted,
            Self::DocumentChanged { .. } => HostEventKind::DocumentChanged,
            Self::FileImported { .. } => HostEventKind::FileImported,
            Self::FileExported { .. } => HostEventKind::FileExported,
            Self::FamilyLoaded { .. } => HostEventKind::FamilyLoaded,
            Self::ViewActivated { .. } => HostEventKind::ViewActivated,
            Self::UiActionExecuted { .. } => HostEventKind::UiActionExecuted,
        }
    }
}

/// A delivered notification.
///
/// `valid` is the host's own "is this payload usable yet" flag; invalid
/// notifications are skipped without emitting.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: HostEvent,
    pub valid: bool,
}

impl Notification {
    #[must_use]
    pub const fn new(event: HostEvent) -> Self {
        Self { event, valid: true }
    }

    /// A notification whose payload the host flags as not yet valid.
    #[must_use]
    pub const fn invalid(event: HostEvent) -> Self {
        Self {
            event,
            valid: false,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> HostEventKind {
        self.event.kind()
    }
}

impl From<HostEvent> for Notification {
    fn from(event: HostEvent) -> Self {
        Self::new(event)
    }
}
