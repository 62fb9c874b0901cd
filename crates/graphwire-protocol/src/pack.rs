//! The [`Pack`] trait and the lobby packs exchanged before a game starts.
//!
//! A pack is a self-describing message: on the wire it is the pack's
//! [`TypeTag`](graphwire_core::TypeTag) followed by its fields, with no
//! length prefix. Both peers must register the same packs in the same
//! order at startup so their tags agree.

use std::fmt;

use graphwire_core::{
    Decode, Decoder, Encode, Encoder, Object, SerializeError, TypeRegistry, ValueCategory,
    persist_fields, register_derived,
};

use crate::ConnectionId;

/// A message unit exchanged over a [`Connection`](crate::Connection).
pub trait Pack: Object + fmt::Debug {
    /// Short human-readable pack name for logs.
    fn name(&self) -> &'static str;

    /// `true` for packs after which the sender stops talking on this
    /// connection (leaving the lobby, starting the game).
    fn ends_session(&self) -> bool {
        false
    }
}

// ---------------------------------------------------------------------------
// Player color
// ---------------------------------------------------------------------------

/// Seat of a player in a game. `PlayerColor::NEUTRAL` marks requests
/// that don't come from a seated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PlayerColor(pub u8);

impl PlayerColor {
    pub const NEUTRAL: PlayerColor = PlayerColor(255);
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NEUTRAL {
            f.write_str("neutral")
        } else {
            write!(f, "player-{}", self.0)
        }
    }
}

impl Encode for PlayerColor {
    const CATEGORY: ValueCategory = ValueCategory::Primitive;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_u8(self.0)
    }
}

impl Decode for PlayerColor {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        Ok(Self(dec.read_u8()?))
    }
}

impl Encode for ConnectionId {
    const CATEGORY: ValueCategory = ValueCategory::Primitive;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        self.into_inner().encode(enc)
    }
}

impl Decode for ConnectionId {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        Ok(Self::new(u64::decode(dec)?))
    }
}

// ---------------------------------------------------------------------------
// Lobby packs
// ---------------------------------------------------------------------------

/// A chat line, also used for server announcements (`player_name` is
/// `"system"` then).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessage {
    pub player_name: String,
    pub message: String,
}

/// Announced to everyone when a new peer joins the lobby.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerJoined {
    pub player_name: String,
    pub connection_id: ConnectionId,
}

/// Announced to everyone when a peer's connection ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerLeft {
    pub connection_id: ConnectionId,
}

/// The host leaves the lobby without starting a game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuitMenuWithoutStarting;

/// The host starts the game with the current lobby settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartWithCurrentSettings;

/// Acknowledges a request: which pack type it carried and whether it was
/// applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageApplied {
    pub player: PlayerColor,
    pub request_id: u32,
    pub pack_type: u16,
    pub result: bool,
}

persist_fields!(ChatMessage {
    player_name,
    message
});
persist_fields!(PlayerJoined {
    player_name,
    connection_id
});
persist_fields!(PlayerLeft { connection_id });
persist_fields!(QuitMenuWithoutStarting {});
persist_fields!(StartWithCurrentSettings {});
persist_fields!(PackageApplied {
    player,
    request_id,
    pack_type,
    result
});

impl Pack for ChatMessage {
    fn name(&self) -> &'static str {
        "ChatMessage"
    }
}

impl Pack for PlayerJoined {
    fn name(&self) -> &'static str {
        "PlayerJoined"
    }
}

impl Pack for PlayerLeft {
    fn name(&self) -> &'static str {
        "PlayerLeft"
    }
}

impl Pack for QuitMenuWithoutStarting {
    fn name(&self) -> &'static str {
        "QuitMenuWithoutStarting"
    }

    fn ends_session(&self) -> bool {
        true
    }
}

impl Pack for StartWithCurrentSettings {
    fn name(&self) -> &'static str {
        "StartWithCurrentSettings"
    }

    fn ends_session(&self) -> bool {
        true
    }
}

impl Pack for PackageApplied {
    fn name(&self) -> &'static str {
        "PackageApplied"
    }
}

/// Registers the lobby packs under `dyn Pack`, always in the same order.
/// Call this before registering application packs.
pub fn register_lobby_packs(registry: &mut TypeRegistry) {
    register_derived!(
        registry,
        dyn Pack => ChatMessage,
        PlayerJoined,
        PlayerLeft,
        QuitMenuWithoutStarting,
        StartWithCurrentSettings,
        PackageApplied,
    );
}
