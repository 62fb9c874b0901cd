//! Transaction configuration.

use serde::{Deserialize, Serialize};

/// Current protocol/format version written into save headers and
/// exchanged by peers.
pub const FORMAT_VERSION: u32 = 7;

/// Default ceiling for any decoded length prefix.
pub const DEFAULT_MAX_CONTAINER_LEN: u32 = 500_000;

// ---------------------------------------------------------------------------
// Endianness
// ---------------------------------------------------------------------------

/// Byte order of multi-byte primitives in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

impl Endianness {
    /// The byte order of the running host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "little") {
            Self::Little
        } else {
            Self::Big
        }
    }

    /// The other byte order.
    pub const fn flipped(self) -> Self {
        match self {
            Self::Little => Self::Big,
            Self::Big => Self::Little,
        }
    }

    /// One-byte flag used in connection handshakes (`1` = little).
    pub const fn to_flag(self) -> u8 {
        match self {
            Self::Little => 1,
            Self::Big => 0,
        }
    }

    /// Inverse of [`to_flag`](Self::to_flag); any non-zero byte is little.
    pub const fn from_flag(flag: u8) -> Self {
        if flag != 0 { Self::Little } else { Self::Big }
    }
}

impl Default for Endianness {
    fn default() -> Self {
        Self::native()
    }
}

// ---------------------------------------------------------------------------
// SerializerConfig
// ---------------------------------------------------------------------------

/// What the encoder does when a pointer's type has a registered collection
/// but the object is not in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MissingIndexPolicy {
    /// Write the "by value" category and serialize the object normally.
    #[default]
    FallBackToValue,
    /// Abort with [`SerializeError::NotInCollection`](crate::SerializeError::NotInCollection).
    Fail,
}

/// Switches that shape one encode/decode transaction.
///
/// Both ends of a stream must use the same switches: the sections they
/// enable are not self-describing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerConfig {
    /// Write shared objects once and later references as identities.
    /// Graphs with cycles only terminate with this enabled.
    pub smart_pointers: bool,

    /// Resolve pointers through registered external collections.
    pub vectorised_members: bool,

    /// Largest length prefix the decoder accepts before declaring the
    /// stream corrupt.
    pub max_container_len: u32,

    /// Behaviour for objects missing from their collection.
    pub missing_index_policy: MissingIndexPolicy,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            smart_pointers: true,
            vectorised_members: true,
            max_container_len: DEFAULT_MAX_CONTAINER_LEN,
            missing_index_policy: MissingIndexPolicy::default(),
        }
    }
}
