//! TCP socket channel and the Tokio-based acceptor that produces it.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::{Channel, ChannelError};

// ---------------------------------------------------------------------------
// SocketChannel
// ---------------------------------------------------------------------------

/// A blocking, strictly sequential TCP channel.
///
/// Reads block the calling thread until bytes arrive or the peer closes.
/// [`try_clone`](Self::try_clone) yields a second handle on the same
/// socket so reading and writing can proceed on different threads.
#[derive(Debug)]
pub struct SocketChannel {
    stream: TcpStream,
    peer: SocketAddr,
    received: u64,
    sent: u64,
}

impl SocketChannel {
    /// Connects to `addr` (e.g. `"127.0.0.1:3030"`), blocking until done.
    pub fn connect(addr: &str) -> Result<Self, ChannelError> {
        let stream = TcpStream::connect(addr).map_err(ChannelError::ConnectFailed)?;
        let channel = Self::from_stream(stream)?;
        tracing::debug!(peer = %channel.peer, "socket channel connected");
        Ok(channel)
    }

    /// Wraps an already connected blocking stream.
    pub fn from_stream(stream: TcpStream) -> Result<Self, ChannelError> {
        let peer = stream.peer_addr().map_err(ChannelError::ConnectFailed)?;
        stream
            .set_nodelay(true)
            .map_err(ChannelError::ConnectFailed)?;
        Ok(Self {
            stream,
            peer,
            received: 0,
            sent: 0,
        })
    }

    /// A second handle on the same socket with its own byte counters.
    pub fn try_clone(&self) -> Result<Self, ChannelError> {
        let stream = self.stream.try_clone().map_err(ChannelError::ConnectFailed)?;
        Ok(Self {
            stream,
            peer: self.peer,
            received: 0,
            sent: 0,
        })
    }

    /// Address of the remote peer.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Shuts down both directions; blocked readers on any handle wake up
    /// with end of stream.
    pub fn shutdown(&self) -> Result<(), ChannelError> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(ChannelError::WriteFailed(e)),
        }
    }
}

impl Channel for SocketChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ChannelError> {
        loop {
            match self.stream.read(buf) {
                Ok(n) => {
                    self.received += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ChannelError::ReadFailed(e)),
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        let n = self.stream.write(data).map_err(ChannelError::WriteFailed)?;
        self.sent += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), ChannelError> {
        self.stream.flush().map_err(ChannelError::WriteFailed)
    }

    fn describe(&self) -> String {
        format!(
            "socket {} ({} bytes in, {} bytes out)",
            self.peer, self.received, self.sent
        )
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The channel type produced for each accepted peer.
    type Channel: Channel;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Channel, Self::Error>;

    /// Stops accepting: a pending or later [`accept`](Self::accept) fails
    /// with a shut-down error.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// Stops a [`TcpTransport`] from another task.
///
/// Clones share the same switch; shutting down is permanent.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if !self.stop.send_replace(true) {
            tracing::info!("TCP transport shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.stop.borrow()
    }
}

/// A TCP [`Transport`] that listens on the Tokio runtime and hands each
/// accepted peer out as a blocking [`SocketChannel`].
pub struct TcpTransport {
    listener: TcpListener,
    stop: ShutdownHandle,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(ChannelError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        let (stop, _) = watch::channel(false);
        Ok(Self {
            listener,
            stop: ShutdownHandle {
                stop: Arc::new(stop),
            },
        })
    }

    /// A handle that shuts this transport down from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.stop.clone()
    }

    /// The address the listener is bound to (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ChannelError> {
        self.listener.local_addr().map_err(ChannelError::AcceptFailed)
    }
}

impl Transport for TcpTransport {
    type Channel = SocketChannel;
    type Error = ChannelError;

    async fn accept(&mut self) -> Result<Self::Channel, Self::Error> {
        let mut stop = self.stop.stop.subscribe();
        let (stream, addr) = tokio::select! {
            accepted = self.listener.accept() => accepted.map_err(ChannelError::AcceptFailed)?,
            _ = stop.wait_for(|stopped| *stopped) => return Err(ChannelError::ShutDown),
        };

        // The engine reads synchronously; hand over a blocking std stream.
        let stream = stream.into_std().map_err(ChannelError::AcceptFailed)?;
        stream
            .set_nonblocking(false)
            .map_err(ChannelError::AcceptFailed)?;

        tracing::debug!(%addr, "accepted TCP connection");
        SocketChannel::from_stream(stream)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        self.stop.shutdown();
        Ok(())
    }
}
