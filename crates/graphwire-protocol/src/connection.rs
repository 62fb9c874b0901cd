//! A two-way pack connection with independently locked read and write
//! halves.
//!
//! One thread may block in [`Connection::receive`] while others call
//! [`Connection::send`]: the halves sit behind separate mutexes, and each
//! half owns its own encoder or decoder so identity state never crosses
//! directions.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use graphwire_channel::{Channel, SocketChannel};
use graphwire_core::{
    Collections, Decoder, Encoder, Endianness, FORMAT_VERSION, SerializerConfig, TypeRegistry,
};

use crate::{Pack, PackageApplied, PlayerColor, ProtocolError};

/// Fixed bytes each side sends first.
pub const GREETING: [u8; 10] = *b"GRAPHWIRE\n";

// ---------------------------------------------------------------------------
// ConnectionId
// ---------------------------------------------------------------------------

/// Server-assigned identifier of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A pack sent on behalf of a player, awaiting a [`PackageApplied`]
/// acknowledgement.
#[derive(Debug)]
pub struct Request {
    pub player: PlayerColor,
    pub request_id: u32,
    pub pack: Box<dyn Pack>,
}

// ---------------------------------------------------------------------------
// ConnectionBuilder
// ---------------------------------------------------------------------------

/// Configures and establishes a [`Connection`].
///
/// ```ignore
/// let conn = Connection::builder("host", registry)
///     .id(ConnectionId::new(1))
///     .connect("127.0.0.1:3030")?;
/// ```
pub struct ConnectionBuilder {
    name: String,
    id: ConnectionId,
    registry: Arc<TypeRegistry>,
    collections: Arc<Collections>,
    config: SerializerConfig,
    byte_order: Endianness,
}

impl ConnectionBuilder {
    pub fn id(mut self, id: ConnectionId) -> Self {
        self.id = id;
        self
    }

    pub fn config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn collections(mut self, collections: Arc<Collections>) -> Self {
        self.collections = collections;
        self
    }

    /// Byte order this side writes in. Defaults to the host's.
    pub fn byte_order(mut self, order: Endianness) -> Self {
        self.byte_order = order;
        self
    }

    /// Connects to `addr` over TCP and performs the handshake.
    pub fn connect(self, addr: &str) -> Result<Connection, ProtocolError> {
        let socket = SocketChannel::connect(addr)?;
        self.socket(socket)
    }

    /// Performs the handshake over an already connected socket.
    pub fn socket(self, socket: SocketChannel) -> Result<Connection, ProtocolError> {
        let reader = socket.try_clone()?;
        let writer = socket.try_clone()?;
        self.establish(Box::new(reader), Box::new(writer), Some(socket))
    }

    /// Performs the handshake over a separate read and write channel
    /// (for example two [`pipe`](graphwire_channel::pipe)s).
    pub fn over(
        self,
        reader: impl Channel + 'static,
        writer: impl Channel + 'static,
    ) -> Result<Connection, ProtocolError> {
        self.establish(Box::new(reader), Box::new(writer), None)
    }

    fn establish(
        self,
        reader: Box<dyn Channel>,
        writer: Box<dyn Channel>,
        socket: Option<SocketChannel>,
    ) -> Result<Connection, ProtocolError> {
        let mut enc = Encoder::from_boxed(writer, Arc::clone(&self.registry))
            .with_config(self.config.clone())
            .with_collections(Arc::clone(&self.collections))
            .with_byte_order(self.byte_order);
        let mut dec = Decoder::from_boxed(reader, Arc::clone(&self.registry))
            .with_config(self.config)
            .with_collections(self.collections);

        enc.write_bytes(&GREETING)?;
        enc.write_u8(self.byte_order.to_flag())?;
        enc.write_u32(FORMAT_VERSION)?;
        enc.write(&self.name)?;
        enc.flush()?;

        let mut greeting = [0u8; GREETING.len()];
        dec.read_bytes(&mut greeting)?;
        if greeting != GREETING {
            return Err(ProtocolError::Handshake(format!(
                "unexpected greeting {greeting:?}"
            )));
        }
        let flag = dec.read_u8()?;
        dec.set_stream_order(Endianness::from_flag(flag));
        let version = dec.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(ProtocolError::Handshake(format!(
                "peer speaks version {version}, we speak {FORMAT_VERSION}"
            )));
        }
        let peer_name: String = dec.read()?;

        tracing::info!(
            id = %self.id,
            name = %self.name,
            peer = %peer_name,
            reversed = dec.reverse_endianness(),
            "connection established"
        );

        Ok(Connection {
            id: self.id,
            name: self.name,
            peer_name,
            writer: Mutex::new(enc),
            reader: Mutex::new(dec),
            socket,
            open: AtomicBool::new(true),
            received_stop: AtomicBool::new(false),
            send_stop: AtomicBool::new(false),
        })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An established, handshaken pack connection.
///
/// `Connection` is `Send + Sync`; share it behind an `Arc` to read on one
/// thread and write on others.
pub struct Connection {
    id: ConnectionId,
    name: String,
    peer_name: String,
    writer: Mutex<Encoder>,
    reader: Mutex<Decoder>,
    socket: Option<SocketChannel>,
    open: AtomicBool,
    received_stop: AtomicBool,
    send_stop: AtomicBool,
}

impl Connection {
    /// Starts configuring a connection. `name` identifies this side to
    /// the peer.
    pub fn builder(name: impl Into<String>, registry: Arc<TypeRegistry>) -> ConnectionBuilder {
        ConnectionBuilder {
            name: name.into(),
            id: ConnectionId::default(),
            registry,
            collections: Arc::new(Collections::new()),
            config: SerializerConfig::default(),
            byte_order: Endianness::native(),
        }
    }

    // -- Packs --------------------------------------------------------------

    /// Writes `pack` (tag + payload) and flushes.
    pub fn send(&self, pack: &dyn Pack) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let mut enc = self.writer()?;
        enc.write_dynamic(pack)?;
        enc.flush()?;
        if pack.ends_session() {
            self.send_stop.store(true, Ordering::Release);
        }
        tracing::debug!(id = %self.id, pack = pack.name(), "sent pack");
        Ok(())
    }

    /// Blocks until the next pack arrives.
    pub fn receive(&self) -> Result<Box<dyn Pack>, ProtocolError> {
        self.ensure_open()?;
        let mut dec = self.reader()?;
        let pack: Box<dyn Pack> = dec.read_dynamic()?;
        if pack.ends_session() {
            self.received_stop.store(true, Ordering::Release);
        }
        tracing::debug!(id = %self.id, pack = pack.name(), "received pack");
        Ok(pack)
    }

    /// Sends `pack` as a request from `player`, to be acknowledged with
    /// [`acknowledge`](Self::acknowledge).
    pub fn send_request(
        &self,
        pack: &dyn Pack,
        player: PlayerColor,
        request_id: u32,
    ) -> Result<(), ProtocolError> {
        self.ensure_open()?;
        let mut enc = self.writer()?;
        enc.write(&player)?;
        enc.write(&request_id)?;
        enc.write_dynamic(pack)?;
        enc.flush()?;
        tracing::debug!(id = %self.id, %player, request_id, pack = pack.name(), "sent request");
        Ok(())
    }

    /// Blocks until the next request arrives.
    pub fn receive_request(&self) -> Result<Request, ProtocolError> {
        self.ensure_open()?;
        let mut dec = self.reader()?;
        let player: PlayerColor = dec.read()?;
        let request_id: u32 = dec.read()?;
        let pack: Box<dyn Pack> = dec.read_dynamic()?;
        Ok(Request {
            player,
            request_id,
            pack,
        })
    }

    /// Answers `request` with a [`PackageApplied`] carrying its pack type
    /// and `applied`.
    pub fn acknowledge(&self, request: &Request, applied: bool) -> Result<(), ProtocolError> {
        let registry = Arc::clone(self.writer()?.registry());
        let pack_type = registry
            .lookup_id((*request.pack).as_any().type_id(), request.pack.name())?
            .into_inner();
        self.send(&PackageApplied {
            player: request.player,
            request_id: request.request_id,
            pack_type,
            result: applied,
        })
    }

    // -- Transaction modes --------------------------------------------------

    /// Lobby mode: no identity dedup, no vectorised references.
    pub fn enter_pregame_mode(&self) -> Result<(), ProtocolError> {
        self.set_smart_pointers(false)?;
        self.set_vectorised(false)
    }

    /// Before shipping heroes between games: vectorised references off,
    /// identity dedup on, both identity maps cleared.
    pub fn prepare_for_sending_heroes(&self) -> Result<(), ProtocolError> {
        {
            let mut enc = self.writer()?;
            enc.set_vectorised(false);
            enc.set_smart_pointers(true);
            enc.clear_identities();
        }
        let mut dec = self.reader()?;
        dec.set_vectorised(false);
        dec.set_smart_pointers(true);
        dec.clear_identities();
        Ok(())
    }

    pub fn set_smart_pointers(&self, enabled: bool) -> Result<(), ProtocolError> {
        self.writer()?.set_smart_pointers(enabled);
        self.reader()?.set_smart_pointers(enabled);
        Ok(())
    }

    pub fn set_vectorised(&self, enabled: bool) -> Result<(), ProtocolError> {
        self.writer()?.set_vectorised(enabled);
        self.reader()?.set_vectorised(enabled);
        Ok(())
    }

    pub fn set_collections(&self, collections: Arc<Collections>) -> Result<(), ProtocolError> {
        self.writer()?.set_collections(Arc::clone(&collections));
        self.reader()?.set_collections(collections);
        Ok(())
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Marks the connection closed and shuts the socket down, waking any
    /// thread blocked in `receive`.
    pub fn close(&self) -> Result<(), ProtocolError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(socket) = &self.socket {
            socket.shutdown()?;
        }
        tracing::info!(id = %self.id, peer = %self.peer_name, "connection closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// `true` once a session-ending pack has been received.
    pub fn received_stop(&self) -> bool {
        self.received_stop.load(Ordering::Acquire)
    }

    /// `true` once a session-ending pack has been sent.
    pub fn send_stop(&self) -> bool {
        self.send_stop.load(Ordering::Acquire)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// `true` when the peer writes in the other byte order.
    pub fn reverses_endianness(&self) -> Result<bool, ProtocolError> {
        Ok(self.reader()?.reverse_endianness())
    }

    /// Position report of both halves, for diagnostics.
    pub fn describe(&self) -> Result<String, ProtocolError> {
        Ok(format!(
            "{self}: write {}, read {}",
            self.writer()?.describe(),
            self.reader()?.describe()
        ))
    }

    fn ensure_open(&self) -> Result<(), ProtocolError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(ProtocolError::Closed(self.id))
        }
    }

    fn writer(&self) -> Result<MutexGuard<'_, Encoder>, ProtocolError> {
        self.writer.lock().map_err(|_| ProtocolError::Poisoned("write"))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Decoder>, ProtocolError> {
        self.reader.lock().map_err(|_| ProtocolError::Poisoned("read"))
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Connection with {} (ID: {})",
            self.peer_name,
            self.id.into_inner()
        )
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("peer_name", &self.peer_name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(id = %self.id, error = %e, "failed to close connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert_eq!(ConnectionId::new(7).into_inner(), 7);
    }

    #[test]
    fn test_connection_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
    }

    #[test]
    fn test_connection_id_as_map_key() {
        use std::collections::HashMap;
        let mut names = HashMap::new();
        names.insert(ConnectionId::new(1), "host");
        assert_eq!(names[&ConnectionId::new(1)], "host");
    }
}
