//! Feature toggles deciding which host notifications are observed.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event_type::{Category, HostEventKind};

/// Invalid toggle values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// One flag per category plus the presence-tracking tunables.
///
/// Everything is off by default; a missing configuration observes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "flat toggle set mirrors the configuration file"
)]
pub struct EventToggles {
    pub initialized: bool,
    pub opening: bool,
    pub saving: bool,
    pub synchronizing: bool,
    pub printing: bool,
    pub exporting: bool,
    pub importing: bool,
    pub family_loading: bool,
    pub view_changed: bool,
    pub changes: bool,
    pub ui_clicks: bool,
    pub time_spent: bool,
    /// Seconds without input before the user counts as away.
    pub idle_timeout_seconds: u64,
    /// Seconds between presence polls.
    pub poll_interval_seconds: u64,
}

impl Default for EventToggles {
    fn default() -> Self {
        Self {
            initialized: false,
            opening: false,
            saving: false,
            synchronizing: false,
            printing: false,
            exporting: false,
            importing: false,
            family_loading: false,
            view_changed: false,
            changes: false,
            ui_clicks: false,
            time_spent: false,
            idle_timeout_seconds: 60,
            poll_interval_seconds: 10,
        }
    }
}

impl EventToggles {
    /// Toggles used when configuration could not be loaded.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Every category on, default tunables.
    #[must_use]
    pub fn all_enabled() -> Self {
        let mut toggles = Self::default();
        for category in Category::ALL {
            toggles.set(category, true);
        }
        toggles
    }

    #[must_use]
    pub const fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Initialization => self.initialized,
            Category::Opening => self.opening,
            Category::Saving => self.saving,
            Category::Synchronizing => self.synchronizing,
            Category::Printing => self.printing,
            Category::Exporting => self.exporting,
            Category::Importing => self.importing,
            Category::FamilyLoading => self.family_loading,
            Category::ViewChange => self.view_changed,
            Category::Changes => self.changes,
            Category::UiClicks => self.ui_clicks,
            Category::Presence => self.time_spent,
        }
    }

    pub fn set(&mut self, category: Category, enabled: bool) {
        let flag = match category {
            Category::Initialization => &mut self.initialized,
            Category::Opening => &mut self.opening,
            Category::Saving => &mut self.saving,
            Category::Synchronizing => &mut self.synchronizing,
            Category::Printing => &mut self.printing,
            Category::Exporting => &mut self.exporting,
            Category::Importing => &mut self.importing,
            Category::FamilyLoading => &mut self.family_loading,
            Category::ViewChange => &mut self.view_changed,
            Category::Changes => &mut self.changes,
            Category::UiClicks => &mut self.ui_clicks,
            Category::Presence => &mut self.time_spent,
        };
        *flag = enabled;
    }

    /// Host notifications required by the enabled categories, deduplicated.
    #[must_use]
    pub fn required_events(&self) -> BTreeSet<HostEventKind> {
        Category::ALL
            .iter()
            .filter(|category| self.is_enabled(**category))
            .flat_map(|category| category.event_kinds().iter().copied())
            .collect()
    }

    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_seconds == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}
