//! Save loading configuration.

use graphwire_core::{FORMAT_VERSION, SerializerConfig};
use serde::{Deserialize, Serialize};

/// Oldest format version this build still loads by default.
pub const MINIMUM_SUPPORTED_VERSION: u32 = 5;

/// Options for [`SaveReader`](crate::SaveReader) and
/// [`IntegrityValidator`](crate::IntegrityValidator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Saves older than this are rejected before any body is read.
    pub minimum_version: u32,

    /// Serializer settings for the save body.
    pub serializer: SerializerConfig,
}

impl SaveConfig {
    /// Only accept saves written by the current format.
    pub fn current_only() -> Self {
        Self {
            minimum_version: FORMAT_VERSION,
            ..Self::default()
        }
    }
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            minimum_version: MINIMUM_SUPPORTED_VERSION,
            serializer: SerializerConfig::default(),
        }
    }
}
