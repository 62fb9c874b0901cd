//! Error types for the pack protocol layer.

use graphwire_channel::ChannelError;
use graphwire_core::SerializeError;

use crate::ConnectionId;

/// Errors that can occur while exchanging packs.
///
/// Whether a failure drops only the affected peer or ends the whole
/// session is up to the caller; the protocol layer only reports it.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Encoding or decoding a pack failed.
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// Opening or shutting down the underlying channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The peer did not answer the greeting the way we expect.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The connection was closed locally.
    #[error("{0} is closed")]
    Closed(ConnectionId),

    /// A one-shot pack decode left bytes unread.
    #[error("pack used {consumed} of {total} bytes")]
    TrailingBytes { consumed: u64, total: usize },

    /// A thread panicked while holding one of the connection halves.
    #[error("connection {0} half poisoned")]
    Poisoned(&'static str),
}

impl ProtocolError {
    /// `true` when the peer hung up or the socket failed, as opposed to a
    /// malformed pack.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Channel(_) | Self::Serialize(SerializeError::Channel(_)) | Self::Closed(_)
        )
    }
}
