//! Error types for save files.

use std::path::PathBuf;

use graphwire_channel::ChannelError;
use graphwire_core::SerializeError;

/// Errors that can occur while writing, loading or validating a save.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    /// Decoding or encoding the save contents failed. Bad magic bytes and
    /// unsupported versions also land here as
    /// [`SerializeError::CorruptStream`].
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// The save file could not be opened, read or written.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A save header was rejected; carries the file for context.
    #[error("{path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: SerializeError,
    },

    /// The validator's comparison state was poisoned by a panic.
    #[error("integrity validator state poisoned")]
    Poisoned,
}

impl SaveError {
    /// `true` when the file itself is malformed (bad header, corrupt
    /// body), as opposed to an I/O failure.
    pub fn is_corrupt(&self) -> bool {
        match self {
            Self::Serialize(e) | Self::Header { source: e, .. } => e.is_stream_fault(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_error_names_the_file() {
        let err = SaveError::Header {
            path: PathBuf::from("autosave.gws"),
            source: SerializeError::corrupt("bad save magic", Some(0)),
        };
        assert_eq!(
            err.to_string(),
            "autosave.gws: corrupt stream at byte 0: bad save magic"
        );
        assert!(err.is_corrupt());
        assert!(!SaveError::Poisoned.is_corrupt());
    }
}
