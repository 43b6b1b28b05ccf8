//! Icon identifiers and fetched icon assets

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Longest identifier accepted, in bytes
pub const MAX_ICON_NAME_LEN: usize = 128;

/// Default content type for assets whose source did not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "image/svg+xml";

/// A validated icon identifier
///
/// Identifiers are opaque cache keys. Iconify style names (`mdi:home`) are
/// split into a prefix (icon set) and an icon name; unprefixed identifiers are
/// still valid keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IconName(String);

impl IconName {
    /// Validates `raw` and wraps it as an identifier
    ///
    /// # Returns
    /// * `Ok(IconName)` if the identifier is well formed
    /// * `Err(CacheError::InvalidIdentifier)` describing the first violation
    pub fn parse(raw: &str) -> Result<Self, CacheError> {
        let invalid = |reason| CacheError::InvalidIdentifier {
            name: raw.to_string(),
            reason,
        };

        if raw.is_empty() {
            return Err(invalid("identifier is empty"));
        }
        if raw.len() > MAX_ICON_NAME_LEN {
            return Err(invalid("identifier is longer than 128 bytes"));
        }
        if raw
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '%'))
        {
            return Err(invalid("identifier contains a forbidden character"));
        }

        if let Some((prefix, name)) = raw.split_once(':') {
            if prefix.is_empty() || name.is_empty() {
                return Err(invalid("prefix and icon name must both be non-empty"));
            }
            if name.contains(':') {
                return Err(invalid("identifier contains more than one ':'"));
            }
        }

        Ok(Self(raw.to_string()))
    }

    /// Parses every identifier, failing on the first malformed one
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Self>, CacheError> {
        raw.iter().map(|s| Self::parse(s.as_ref())).collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Icon set prefix (`mdi` for `mdi:home`), if the identifier has one
    pub fn prefix(&self) -> Option<&str> {
        self.0.split_once(':').map(|(prefix, _)| prefix)
    }

    /// Icon name within its set (`home` for `mdi:home`, the whole identifier otherwise)
    pub fn icon(&self) -> &str {
        self.0.split_once(':').map_or(self.0.as_str(), |(_, icon)| icon)
    }
}

impl fmt::Display for IconName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IconName {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<IconName> for String {
    fn from(name: IconName) -> Self {
        name.0
    }
}

/// A fetched icon: raw bytes plus their content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconAsset {
    /// Raw asset bytes (SVG markup for the Iconify API)
    pub data: Vec<u8>,
    /// MIME type of `data`
    pub content_type: String,
}

impl IconAsset {
    pub fn new(data: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Creates an SVG asset
    pub fn svg(data: impl Into<Vec<u8>>) -> Self {
        Self::new(data, DEFAULT_CONTENT_TYPE)
    }

    /// Size of the payload in bytes
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
