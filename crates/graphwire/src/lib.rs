//! # Graphwire
//!
//! Identity-preserving persistence of object graphs for turn-based games:
//! the same encoder writes save files and network packs.
//!
//! - [`graphwire_core`]: the encoder, decoder, type registry and pointers
//! - [`graphwire_channel`]: byte channels (memory, file, TCP, pipes)
//! - [`graphwire_protocol`]: packs, connections and pack dispatch
//! - [`graphwire_save`]: save files and integrity validation
//!
//! This crate adds a [`PackServer`] that accepts TCP connections and feeds
//! their packs to a [`PackHandler`], a unified [`GraphwireError`], and
//! [`init_tracing`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graphwire::prelude::*;
//!
//! #[derive(Debug, Default)]
//! struct Town {
//!     name: String,
//!     garrison: Vec<u32>,
//! }
//! persist_fields!(Town { name, garrison });
//!
//! # fn main() -> Result<(), GraphwireError> {
//! let registry = Arc::new(TypeRegistry::new());
//! let mut save = SaveWriter::create("town.gws", Arc::clone(&registry))?;
//! save.write(&Town::default())?;
//! save.finish()?;
//!
//! let mut load = SaveReader::open("town.gws", registry, SaveConfig::default())?;
//! let town: Town = load.read()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::GraphwireError;
pub use handler::{HandlerAction, PackHandler};
pub use server::{PackServer, PackServerBuilder};

pub use graphwire_channel;
pub use graphwire_core;
pub use graphwire_protocol;
pub use graphwire_save;

/// Installs a `tracing` subscriber filtered by `RUST_LOG`, defaulting to
/// `info`. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        GraphwireError, HandlerAction, PackHandler, PackServer, PackServerBuilder, ServerConfig,
        init_tracing,
    };
    pub use graphwire_channel::{Channel, FileChannel, MemoryChannel, SocketChannel};
    pub use graphwire_core::{
        Collections, Decode, Decoder, Encode, Encoder, Endianness, IndexedCollection,
        MissingIndexPolicy, Object, PolyPtr, Ptr, SerializeError, SerializerConfig, Shared,
        SharedTable, TypeRegistry, TypeTag, persist_fields, register_derived, shared, wire_enum,
        wire_union,
    };
    pub use graphwire_protocol::{
        Applier, ChatMessage, Connection, ConnectionId, Pack, PackCodec, PackageApplied,
        PlayerColor, PlayerJoined, PlayerLeft, ProtocolError, QuitMenuWithoutStarting, Request,
        StartWithCurrentSettings, register_lobby_packs,
    };
    pub use graphwire_save::{
        IntegrityValidator, SaveConfig, SaveError, SaveReader, SaveWriter, ValidationOutcome,
    };
}
