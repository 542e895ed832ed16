//! Host notification kinds and the feature categories that gate them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named lifecycle notifications the host can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostEventKind {
    ApplicationInitialized,
    DocumentOpening,
    DocumentOpened,
    DocumentSaving,
    DocumentSaved,
    DocumentSavingAs,
    DocumentSavedAs,
    DocumentSynchronizing,
    DocumentSynchronized,
    DocumentPrinted,
    DocumentChanged,
    FileImported,
    FileExported,
    FamilyLoaded,
    ViewActivated,
    UiActionExecuted,
}

impl HostEventKind {
    pub const ALL: [Self; 16] = [
        Self::ApplicationInitialized,
        Self::DocumentOpening,
        Self::DocumentOpened,
        Self::DocumentSaving,
        Self::DocumentSaved,
        Self::DocumentSavingAs,
        Self::DocumentSavedAs,
        Self::DocumentSynchronizing,
        Self::DocumentSynchronized,
        Self::DocumentPrinted,
        Self::DocumentChanged,
        Self::FileImported,
        Self::FileExported,
        Self::FamilyLoaded,
        Self::ViewActivated,
        Self::UiActionExecuted,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationInitialized => "application_initialized",
            Self::DocumentOpening => "document_opening",
            Self::DocumentOpened => "document_opened",
            Self::DocumentSaving => "document_saving",
            Self::DocumentSaved => "document_saved",
            Self::DocumentSavingAs => "document_saving_as",
            Self::DocumentSavedAs => "document_saved_as",
            Self::DocumentSynchronizing => "document_synchronizing",
            Self::DocumentSynchronized => "document_synchronized",
            Self::DocumentPrinted => "document_printed",
            Self::DocumentChanged => "document_changed",
            Self::FileImported => "file_imported",
            Self::FileExported => "file_exported",
            Self::FamilyLoaded => "family_loaded",
            Self::ViewActivated => "view_activated",
            Self::UiActionExecuted => "ui_action_executed",
        }
    }
}

impl fmt::Display for HostEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}

impl Serialize for HostEventKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HostEventKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A feature category, each switched by one toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Initialization,
    Opening,
    Saving,
    Synchronizing,
    Printing,
    Exporting,
    Importing,
    FamilyLoading,
    ViewChange,
    Changes,
    UiClicks,
    Presence,
}

impl Category {
    pub const ALL: [Self; 12] = [
        Self::Initialization,
        Self::Opening,
        Self::Saving,
        Self::Synchronizing,
        Self::Printing,
        Self::Exporting,
        Self::Importing,
        Self::FamilyLoading,
        Self::ViewChange,
        Self::Changes,
        Self::UiClicks,
        Self::Presence,
    ];

    /// Host notifications a category needs to be subscribed to.
    ///
    /// Categories may share notifications; presence tracking piggybacks on
    /// document-opened and view-activated.
    #[must_use]
    pub const fn event_kinds(&self) -> &'static [HostEventKind] {
        use HostEventKind as K;
        match self {
            Self::Initialization => &[K::ApplicationInitialized],
            Self::Opening => &[K::DocumentOpening, K::DocumentOpened],
            Self::Saving => &[
                K::DocumentSaving,
                K::DocumentSaved,
                K::DocumentSavingAs,
                K::DocumentSavedAs,
            ],
            Self::Synchronizing => &[K::DocumentSynchronizing, K::DocumentSynchronized],
            Self::Printing => &[K::DocumentPrinted],
            Self::Exporting => &[K::FileExported],
            Self::Importing => &[K::FileImported],
            Self::FamilyLoading => &[K::FamilyLoaded],
            Self::ViewChange => &[K::ViewActivated],
            Self::Changes => &[K::DocumentChanged],
            Self::UiClicks => &[K::UiActionExecuted],
            Self::Presence => &[K::DocumentOpened, K::ViewActivated],
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialized",
            Self::Opening => "opening",
            Self::Saving => "saving",
            Self::Synchronizing => "synchronizing",
            Self::Printing => "printing",
            Self::Exporting => "exporting",
            Self::Importing => "importing",
            Self::FamilyLoading => "family_loading",
            Self::ViewChange => "view_changed",
            Self::Changes => "changes",
            Self::UiClicks => "ui_clicks",
            Self::Presence => "time_spent",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for unknown host notification names.
#[derive(Debug, Clone)]
pub struct UnknownEventKind(String);

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown host event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_parse_back() {
        for kind in HostEventKind::ALL {
            let parsed: HostEventKind = kind.as_str().parse().expect("should parse");
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn unknown_kind_errors() {
        let err = "document_burned".parse::<HostEventKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown host event kind: document_burned");
    }

    #[test]
    fn every_kind_belongs_to_some_category() {
        for kind in HostEventKind::ALL {
            assert!(
                Category::ALL
                    .iter()
                    .any(|category| category.event_kinds().contains(&kind)),
                "{kind} is not reachable from any category"
            );
        }
    }

    #[test]
    fn presence_shares_notifications_with_opening_and_views() {
        let presence = Category::Presence.event_kinds();
        assert!(presence.contains(&HostEventKind::DocumentOpened));
        assert!(presence.contains(&HostEventKind::ViewActivated));
        assert!(!presence.contains(&HostEventKind::DocumentOpening));
    }
}
