//! `PackServer` builder and accept loop.
//!
//! The listener runs on the Tokio runtime; every accepted socket is handed
//! to a blocking task because the engine reads synchronously.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use graphwire_channel::{ChannelError, ShutdownHandle, TcpTransport, Transport};
use graphwire_core::{Collections, SerializerConfig, TypeRegistry};
use graphwire_protocol::{ConnectionId, register_lobby_packs};

use crate::handler::{PackHandler, serve_connection};
use crate::{GraphwireError, ServerConfig};

/// Shared server state passed to each connection task.
pub(crate) struct ServerState {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) collections: Arc<Collections>,
    next_id: AtomicU64,
}

impl ServerState {
    fn next_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builder for configuring and starting a [`PackServer`].
///
/// # Example
///
/// ```rust,ignore
/// let server = PackServer::builder()
///     .bind("0.0.0.0:3030")
///     .registry(registry)
///     .build()
///     .await?;
/// server.run(MyHandler::default()).await
/// ```
pub struct PackServerBuilder {
    config: ServerConfig,
    registry: Option<Arc<TypeRegistry>>,
    collections: Arc<Collections>,
}

impl PackServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            registry: None,
            collections: Arc::new(Collections::new()),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the name announced to peers.
    pub fn name(mut self, name: &str) -> Self {
        self.config.name = name.to_string();
        self
    }

    pub fn serializer(mut self, serializer: SerializerConfig) -> Self {
        self.config.serializer = serializer;
        self
    }

    /// Sets the type registry. Defaults to one holding only the lobby
    /// packs.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the collections used for vectorised references.
    pub fn collections(mut self, collections: Arc<Collections>) -> Self {
        self.collections = collections;
        self
    }

    /// Binds the listener.
    pub async fn build(self) -> Result<PackServer, GraphwireError> {
        let transport = TcpTransport::bind(&self.config.bind_addr).await?;
        let registry = self.registry.unwrap_or_else(|| {
            let mut registry = TypeRegistry::new();
            register_lobby_packs(&mut registry);
            Arc::new(registry)
        });

        let state = Arc::new(ServerState {
            config: self.config,
            registry,
            collections: self.collections,
            next_id: AtomicU64::new(1),
        });
        Ok(PackServer { transport, state })
    }
}

impl Default for PackServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound pack server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PackServer {
    transport: TcpTransport,
    state: Arc<ServerState>,
}

impl PackServer {
    /// Creates a new builder.
    pub fn builder() -> PackServerBuilder {
        PackServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, GraphwireError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle that stops the accept loop. Connections already accepted
    /// keep running until their peers leave.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.transport.shutdown_handle()
    }

    /// Runs the accept loop.
    ///
    /// Each accepted socket gets a fresh [`ConnectionId`] and a blocking
    /// task that performs the handshake and feeds received packs to
    /// `handler`. Returns once the [`shutdown_handle`](Self::shutdown_handle)
    /// fires.
    pub async fn run<H: PackHandler>(mut self, handler: H) -> Result<(), GraphwireError> {
        let handler = Arc::new(handler);
        tracing::info!(name = %self.state.config.name, "pack server running");

        loop {
            match self.transport.accept().await {
                Ok(socket) => {
                    let id = self.state.next_id();
                    let state = Arc::clone(&self.state);
                    let handler = Arc::clone(&handler);
                    tokio::task::spawn_blocking(move || {
                        if let Err(e) = serve_connection(socket, id, state, handler) {
                            tracing::debug!(%id, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(ChannelError::ShutDown) => {
                    tracing::info!(name = %self.state.config.name, "pack server stopped");
                    return Ok(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
