//! Error types for the encoder and decoder.

use graphwire_channel::ChannelError;

/// Errors that abort an encode or decode transaction.
///
/// None of these are recovered from inside the engine: the caller that
/// started the transaction receives the error and decides what to do with
/// the half-built state (usually: drop it).
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// The underlying byte source or sink failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// A value reached through a polymorphic pointer has a runtime type
    /// that was never registered, or a decoded tag has no allocator.
    #[error("unregistered type: {0}")]
    UnregisteredType(String),

    /// The stream violates the format: an oversized length prefix, an
    /// out-of-range discriminant, bad magic bytes, an unsupported version.
    #[error("corrupt stream{}: {reason}", at_byte(offset))]
    CorruptStream { reason: String, offset: Option<u64> },

    /// A back reference names an identity that no earlier object in this
    /// transaction received.
    #[error("identity {identity} was never assigned (next fresh identity is {expected})")]
    IdentityMismatch { identity: u32, expected: u32 },

    /// Vectorised resolution is strict and the object is missing from its
    /// registered collection.
    #[error("{0} object is not part of its registered collection")]
    NotInCollection(&'static str),

    /// A shared object's lock was poisoned by a panicking writer.
    #[error("object lock poisoned while {0}")]
    LockPoisoned(&'static str),
}

impl SerializeError {
    /// Shorthand for [`SerializeError::CorruptStream`].
    pub fn corrupt(reason: impl Into<String>, offset: Option<u64>) -> Self {
        Self::CorruptStream {
            reason: reason.into(),
            offset,
        }
    }

    /// `true` for errors caused by the bytes on the wire rather than by
    /// the local process.
    pub fn is_stream_fault(&self) -> bool {
        matches!(
            self,
            Self::CorruptStream { .. } | Self::IdentityMismatch { .. }
        )
    }
}

fn at_byte(offset: &Option<u64>) -> String {
    offset.map(|o| format!(" at byte {o}")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_message_includes_offset() {
        let err = SerializeError::corrupt("length 9000000 exceeds ceiling", Some(12));
        assert_eq!(
            err.to_string(),
            "corrupt stream at byte 12: length 9000000 exceeds ceiling"
        );
    }

    #[test]
    fn test_corrupt_message_without_offset() {
        let err = SerializeError::corrupt("bad magic", None);
        assert_eq!(err.to_string(), "corrupt stream: bad magic");
    }

    #[test]
    fn test_from_channel_error() {
        let err: SerializeError = ChannelError::Closed("peer gone".into()).into();
        assert!(matches!(err, SerializeError::Channel(_)));
        assert!(err.to_string().contains("peer gone"));
        assert!(!err.is_stream_fault());
    }

    #[test]
    fn test_identity_mismatch_is_stream_fault() {
        let err = SerializeError::IdentityMismatch {
            identity: 7,
            expected: 2,
        };
        assert!(err.is_stream_fault());
    }
}
