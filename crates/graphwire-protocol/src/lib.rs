//! Pack protocol for Graphwire.
//!
//! This crate turns the serializer into a message protocol:
//!
//! - **Packs** ([`Pack`], the lobby packs) are self-describing messages,
//!   written as a type tag followed by their fields.
//! - **Connections** ([`Connection`]) carry packs both ways over a socket
//!   or any pair of channels, with separately locked read and write
//!   halves and a greeting handshake that settles byte order.
//! - **Codec** ([`PackCodec`]) encodes single packs to byte buffers.
//! - **Applier** ([`Applier`]) dispatches received packs to handlers.
//!
//! # Architecture
//!
//! ```text
//! Channel (bytes) → Encoder/Decoder (graphs) → Connection (packs) → Applier (handlers)
//! ```
//!
//! Identities persist for the lifetime of a connection's encoder and
//! decoder; [`Connection::prepare_for_sending_heroes`] starts a fresh
//! transaction on both halves.

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod applier;
mod codec;
mod connection;
mod error;
mod pack;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use applier::Applier;
pub use codec::PackCodec;
pub use connection::{Connection, ConnectionBuilder, ConnectionId, GREETING, Request};
pub use error::ProtocolError;
pub use pack::{
    ChatMessage, Pack, PackageApplied, PlayerColor, PlayerJoined, PlayerLeft,
    QuitMenuWithoutStarting, StartWithCurrentSettings, register_lobby_packs,
};
