//! One-shot pack encoding to and from byte buffers.
//!
//! Every call is its own transaction: identities never carry over from one
//! pack to the next. Connections keep their encoder and decoder alive
//! instead, which is what lets identities persist across packs there.

use std::sync::Arc;

use graphwire_channel::MemoryChannel;
use graphwire_core::{Decoder, Encoder, Endianness, SerializerConfig, TypeRegistry};

use crate::{Pack, ProtocolError};

/// Encodes packs to `Vec<u8>` and back using a shared registry.
#[derive(Debug, Clone)]
pub struct PackCodec {
    registry: Arc<TypeRegistry>,
    config: SerializerConfig,
    byte_order: Endianness,
}

impl PackCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            config: SerializerConfig::default(),
            byte_order: Endianness::native(),
        }
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    /// Byte order of produced buffers and expected by [`decode`](Self::decode).
    pub fn with_byte_order(mut self, order: Endianness) -> Self {
        self.byte_order = order;
        self
    }

    /// Serializes `pack` as tag + payload.
    pub fn encode(&self, pack: &dyn Pack) -> Result<Vec<u8>, ProtocolError> {
        let mut enc = Encoder::new(MemoryChannel::new(), Arc::clone(&self.registry))
            .with_config(self.config.clone())
            .with_byte_order(self.byte_order);
        enc.write_dynamic(pack)?;
        let bytes = enc
            .into_channel()
            .into_bytes()
            .expect("memory channel holds its bytes");
        tracing::trace!(pack = pack.name(), bytes = bytes.len(), "encoded pack");
        Ok(bytes)
    }

    /// Deserializes one pack; the buffer must hold exactly one.
    pub fn decode(&self, bytes: &[u8]) -> Result<Box<dyn Pack>, ProtocolError> {
        let mut dec = Decoder::new(
            MemoryChannel::from_bytes(bytes.to_vec()),
            Arc::clone(&self.registry),
        )
        .with_config(self.config.clone())
        .with_stream_order(self.byte_order);
        let pack: Box<dyn Pack> = dec.read_dynamic()?;
        if dec.bytes_read() != bytes.len() as u64 {
            return Err(ProtocolError::TrailingBytes {
                consumed: dec.bytes_read(),
                total: bytes.len(),
            });
        }
        Ok(pack)
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatMessage, ConnectionId, PlayerLeft, register_lobby_packs};
    use graphwire_core::SerializeError;

    fn codec() -> PackCodec {
        let mut registry = TypeRegistry::new();
        register_lobby_packs(&mut registry);
        PackCodec::new(Arc::new(registry))
    }

    #[test]
    fn test_pack_round_trip() {
        let codec = codec();
        let bytes = codec
            .encode(&PlayerLeft {
                connection_id: ConnectionId::new(7),
            })
            .unwrap();
        // tag + u64 id
        assert_eq!(bytes.len(), 2 + 8);

        let pack = codec.decode(&bytes).unwrap();
        let left = (*pack).as_any().downcast_ref::<PlayerLeft>().unwrap();
        assert_eq!(left.connection_id, ConnectionId::new(7));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = codec();
        let mut bytes = codec
            .encode(&ChatMessage {
                player_name: "system".into(),
                message: "hi".into(),
            })
            .unwrap();
        bytes.push(0);
        assert!(matches!(
            codec.decode(&bytes),
            Err(ProtocolError::TrailingBytes { .. })
        ));
    }

    #[test]
    fn test_unknown_tag() {
        let codec = codec();
        let bytes = 999u16.to_ne_bytes();
        assert!(matches!(
            codec.decode(&bytes),
            Err(ProtocolError::Serialize(SerializeError::UnregisteredType(_)))
        ));
    }

    #[test]
    fn test_big_endian_buffers() {
        let codec = codec().with_byte_order(Endianness::Big);
        let bytes = codec
            .encode(&PlayerLeft {
                connection_id: ConnectionId::new(1),
            })
            .unwrap();
        assert_eq!(&bytes[..2], &[0, 3]);
        assert_eq!(bytes[9], 1);
        assert!(codec.decode(&bytes).is_ok());
    }
}
