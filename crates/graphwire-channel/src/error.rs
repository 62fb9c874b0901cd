use std::io;
use std::path::PathBuf;

/// Errors that can occur while moving bytes through a channel.
///
/// Every variant is fatal for the transaction that hit it: the engine
/// never retries a partial read or write on its own.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The peer closed the channel or it was closed locally.
    #[error("channel closed: {0}")]
    Closed(String),

    /// Writing to the underlying sink failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// Reading from the underlying source failed.
    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// The stream ended before the requested number of bytes arrived.
    #[error("unexpected end of stream: wanted {wanted} bytes, got {got}")]
    UnexpectedEof { wanted: usize, got: usize },

    /// Repositioning a seekable channel failed.
    #[error("seek failed: {0}")]
    SeekFailed(#[source] io::Error),

    /// A file could not be opened or created.
    #[error("cannot open {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Connecting to a remote peer failed.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] io::Error),

    /// Binding or accepting connections failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] io::Error),

    /// The transport was shut down and accepts no more connections.
    #[error("transport shut down")]
    ShutDown,

    /// The channel does not support this operation (e.g. reading a
    /// write-only end).
    #[error("unsupported channel operation: {0}")]
    Unsupported(&'static str),
}
