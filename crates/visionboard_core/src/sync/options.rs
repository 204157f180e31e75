//! Cloud container options.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Container used when the configuration does not name one.
pub const DEFAULT_CONTAINER_IDENTIFIER: &str = "iCloud.VisionBoard";

static CONTAINER_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^iCloud\.[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid container id regex")
});

/// Cloud mirroring options attached to a store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSyncOptions {
    #[serde(default = "default_container_identifier")]
    pub container_identifier: String,
}

impl CloudSyncOptions {
    pub fn new(container_identifier: impl Into<String>) -> Self {
        Self {
            container_identifier: container_identifier.into(),
        }
    }

    /// Checks the identifier against the `iCloud.<name>` shape.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let trimmed = self.container_identifier.trim();
        if trimmed.is_empty() {
            return Err(OptionsError::EmptyContainerIdentifier);
        }
        if !CONTAINER_ID_RE.is_match(trimmed) {
            return Err(OptionsError::InvalidContainerIdentifier(trimmed.to_string()));
        }
        Ok(())
    }
}

impl Default for CloudSyncOptions {
    fn default() -> Self {
        Self::new(DEFAULT_CONTAINER_IDENTIFIER)
    }
}

fn default_container_identifier() -> String {
    DEFAULT_CONTAINER_IDENTIFIER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    EmptyContainerIdentifier,
    InvalidContainerIdentifier(String),
}

impl Display for OptionsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContainerIdentifier => write!(f, "container identifier cannot be empty"),
            Self::InvalidContainerIdentifier(value) => write!(
                f,
                "container identifier `{value}` must look like `iCloud.<name>`"
            ),
        }
    }
}

impl Error for OptionsError {}
