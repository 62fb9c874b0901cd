//! Per-connection handler: handshake and the receive loop.
//!
//! Each accepted socket gets its own blocking task running
//! [`serve_connection`]. The flow is:
//!   1. Handshake → the peer's name and byte order are known
//!   2. `PackHandler::on_connect`
//!   3. Loop: receive a pack → `PackHandler::handle`
//!   4. `PackHandler::on_disconnect`, then the socket is shut down

use std::sync::Arc;

use graphwire_channel::SocketChannel;
use graphwire_protocol::{Connection, ConnectionId, Pack};

use crate::GraphwireError;
use crate::server::ServerState;

/// What the receive loop does after a pack was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Keep reading packs from this connection.
    Continue,
    /// Stop reading and close the connection.
    Close,
}

/// Application callbacks for a [`PackServer`](crate::PackServer).
///
/// Callbacks run on a blocking thread per connection, so they may block
/// (for example on [`Connection::receive_request`]) but they run
/// concurrently for different connections.
pub trait PackHandler: Send + Sync + 'static {
    /// Called once the handshake succeeded.
    fn on_connect(&self, _conn: &Connection) {}

    /// Called for every pack received on `conn`.
    fn handle(&self, conn: &Connection, pack: Box<dyn Pack>) -> HandlerAction;

    /// Called when the receive loop ends, whatever the reason.
    fn on_disconnect(&self, _conn: &Connection) {}
}

/// Drop guard that reports the disconnect even if a callback panics.
struct DisconnectGuard<'a, H: PackHandler> {
    conn: &'a Connection,
    handler: &'a H,
}

impl<H: PackHandler> Drop for DisconnectGuard<'_, H> {
    fn drop(&mut self) {
        self.handler.on_disconnect(self.conn);
        if let Err(e) = self.conn.close() {
            tracing::debug!(id = %self.conn.id(), error = %e, "close after disconnect failed");
        }
    }
}

/// Handles a single accepted socket from handshake to close. Blocks the
/// calling thread.
pub(crate) fn serve_connection<H: PackHandler>(
    socket: SocketChannel,
    id: ConnectionId,
    state: Arc<ServerState>,
    handler: Arc<H>,
) -> Result<(), GraphwireError> {
    let peer = socket.peer_addr();
    tracing::debug!(%id, %peer, "handling new connection");

    // --- Step 1: Handshake ---
    let conn = Connection::builder(state.config.name.clone(), Arc::clone(&state.registry))
        .id(id)
        .config(state.config.serializer.clone())
        .collections(Arc::clone(&state.collections))
        .socket(socket)?;

    handler.on_connect(&conn);
    let _guard = DisconnectGuard {
        conn: &conn,
        handler: handler.as_ref(),
    };

    // --- Step 2: Receive loop ---
    loop {
        let pack = match conn.receive() {
            Ok(pack) => pack,
            Err(e) if e.is_disconnect() => {
                tracing::info!(%id, %peer, "peer disconnected");
                break;
            }
            Err(e) => {
                tracing::warn!(%id, %peer, error = %e, "dropping connection after bad pack");
                return Err(e.into());
            }
        };

        let name = pack.name();
        if handler.handle(&conn, pack) == HandlerAction::Close {
            tracing::debug!(%id, pack = name, "handler closed connection");
            break;
        }
        if conn.received_stop() {
            tracing::info!(%id, pack = name, "peer ended the session");
            break;
        }
    }

    // _guard drops here → on_disconnect fires.
    Ok(())
}
