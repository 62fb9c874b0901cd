//! Unified error type for Graphwire.

use graphwire_channel::ChannelError;
use graphwire_core::SerializeError;
use graphwire_protocol::ProtocolError;
use graphwire_save::SaveError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `graphwire` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attributes let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum GraphwireError {
    /// A byte channel failed (socket, file).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Encoding or decoding a graph failed.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// A connection or pack exchange failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Writing, loading or validating a save failed.
    #[error(transparent)]
    Save(#[from] SaveError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_channel_error() {
        let err = ChannelError::Closed("gone".into());
        let graphwire_err: GraphwireError = err.into();
        assert!(matches!(graphwire_err, GraphwireError::Channel(_)));
        assert!(graphwire_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_serialize_error() {
        let err = SerializeError::UnregisteredType("Ghost".into());
        let graphwire_err: GraphwireError = err.into();
        assert!(matches!(graphwire_err, GraphwireError::Serialize(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::Handshake("bad greeting".into());
        let graphwire_err: GraphwireError = err.into();
        assert!(matches!(graphwire_err, GraphwireError::Protocol(_)));
    }

    #[test]
    fn test_from_save_error() {
        let graphwire_err: GraphwireError = SaveError::Poisoned.into();
        assert!(matches!(graphwire_err, GraphwireError::Save(_)));
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        let graphwire_err: GraphwireError = err.into();
        assert!(graphwire_err.to_string().starts_with("invalid configuration"));
    }
}
