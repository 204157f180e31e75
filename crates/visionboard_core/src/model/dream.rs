//! Dream domain model.
//!
//! # Responsibility
//! - Define the single user-facing record (a goal card).
//! - Provide field-level comparison helpers used by merge policies.
//!
//! # Invariants
//! - `id` is stable, non-nil and never reused for another Dream.
//! - `title` and `description` default to empty strings, never null.
//! - `image_data` is replaced wholesale; there is no partial update.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Stable identifier for one Dream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DreamId(Uuid);

impl DreamId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an externally assigned id (import/sync paths).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for DreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for DreamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DreamId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

/// User-editable fields of a Dream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DreamField {
    Title,
    Description,
    ImageData,
}

impl DreamField {
    pub const ALL: [DreamField; 3] = [Self::Title, Self::Description, Self::ImageData];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::ImageData => "image_data",
        }
    }
}

/// Canonical goal card record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dream {
    /// Assigned at creation, immutable afterwards.
    pub id: DreamId,
    /// Sole sort key for board listings.
    pub title: String,
    pub description: String,
    /// Encoded image bytes; the encoding is opaque to core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<Vec<u8>>,
}

impl Dream {
    /// Creates an empty Dream with a generated stable id.
    pub fn new() -> Self {
        Self::with_id(DreamId::new())
    }

    /// Creates an empty Dream with a caller-provided id.
    pub fn with_id(id: DreamId) -> Self {
        Self {
            id,
            title: String::new(),
            description: String::new(),
            image_data: None,
        }
    }

    /// Validates persistence invariants.
    pub fn validate(&self) -> Result<(), DreamValidationError> {
        if self.id.is_nil() {
            return Err(DreamValidationError::NilId);
        }
        Ok(())
    }

    /// Returns fields whose values differ between `self` and `other`.
    pub fn changed_fields(&self, other: &Dream) -> Vec<DreamField> {
        DreamField::ALL
            .into_iter()
            .filter(|field| !self.field_eq(other, *field))
            .collect()
    }

    /// Compares one field against another record.
    pub fn field_eq(&self, other: &Dream, field: DreamField) -> bool {
        match field {
            DreamField::Title => self.title == other.title,
            DreamField::Description => self.description == other.description,
            DreamField::ImageData => self.image_data == other.image_data,
        }
    }

    /// Copies one field value from `source`.
    pub fn copy_field_from(&mut self, source: &Dream, field: DreamField) {
        match field {
            DreamField::Title => self.title.clone_from(&source.title),
            DreamField::Description => self.description.clone_from(&source.description),
            DreamField::ImageData => self.image_data.clone_from(&source.image_data),
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_data.is_some()
    }
}

impl Default for Dream {
    fn default() -> Self {
        Self::new()
    }
}

/// Model validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DreamValidationError {
    NilId,
}

impl Display for DreamValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "dream id must not be nil"),
        }
    }
}

impl Error for DreamValidationError {}
