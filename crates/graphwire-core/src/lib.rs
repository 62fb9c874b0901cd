//! Identity-preserving binary serialization of object graphs.
//!
//! An [`Encoder`] walks a value and writes it to a
//! [`Channel`](graphwire_channel::Channel); a [`Decoder`] rebuilds it on
//! the other side. Shared nodes ([`Ptr`], [`PolyPtr`]) are written once
//! and referenced by a transaction-scoped identity afterwards, so sharing
//! and cycles survive the round trip. Pointers through base interfaces
//! carry a [`TypeTag`] from the [`TypeRegistry`] so the decoder can
//! allocate the right concrete type. Objects owned by an external
//! [`IndexedCollection`] can be written as a plain index instead.
//!
//! Wire layout, all multi-byte values in the stream's byte order:
//!
//! | value | bytes |
//! |-------|-------|
//! | bool | `u8` 0/1 |
//! | number | fixed width |
//! | enumerator | `i32` |
//! | string / container | `u32` length, then elements |
//! | optional | `u8` presence, then value |
//! | tagged union | `u32` discriminant, then value |
//! | pointer | `u8` presence, [`u8` category, `u32` index], [`u32` identity], `u16` tag, body |

mod classify;
mod collections;
mod config;
mod decoder;
mod encoder;
mod error;
mod impls;
mod macros;
mod pointer;
mod registry;

pub use classify::{ValueCategory, classify};
pub use collections::{Collections, IndexedCollection, SharedTable};
pub use config::{
    DEFAULT_MAX_CONTAINER_LEN, Endianness, FORMAT_VERSION, MissingIndexPolicy, SerializerConfig,
};
pub use decoder::{Decode, Decoder};
pub use encoder::{Encode, Encoder};
pub use error::SerializeError;
pub use pointer::{ObjectIdentity, PolyPtr, Ptr, Shared, shared};
pub use registry::{Object, TypeRegistry, TypeTag};
