//! Core type definitions shared by the host collaborator traits.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid document type value.
    #[error("invalid document type: {value}")]
    InvalidDocumentType { value: String },
}

/// Identifier of an element inside a host document (views, sheets, families).
///
/// The host reserves [`ElementId::INVALID`] as the "no element" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(i64);

impl ElementId {
    /// The invalid-id sentinel.
    pub const INVALID: Self = Self(-1);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque OS handle of a top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(isize);

impl WindowHandle {
    #[must_use]
    pub const fn new(raw: isize) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> isize {
        self.0
    }
}

/// Kind of document the host is opening.
///
/// Only [`DocumentType::Project`] documents are measured by the opening timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    #[default]
    Project,
    Family,
    Template,
    Other,
}

impl DocumentType {
    /// String representation used in telemetry fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Family => "family",
            Self::Template => "template",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Self::Project),
            "family" => Ok(Self::Family),
            "template" => Ok(Self::Template),
            "other" => Ok(Self::Other),
            _ => Err(ValidationError::InvalidDocumentType {
                value: s.to_string(),
            }),
        }
    }
}
