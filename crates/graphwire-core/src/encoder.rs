//! The encoder: walks a value graph and writes it to a channel.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use graphwire_channel::Channel;

use crate::pointer::{Pinned, PolyPtr, Ptr, Shared, address_of, read_lock};
use crate::{
    Collections, Endianness, MissingIndexPolicy, Object, ObjectIdentity, SerializeError,
    SerializerConfig, TypeRegistry, TypeTag, ValueCategory,
};

/// Reference category byte written before a vectorised pointer.
pub(crate) const BY_VALUE: u8 = 0;
pub(crate) const BY_INDEX: u8 = 1;

/// A value that can be written by an [`Encoder`].
///
/// Aggregates usually implement this (together with
/// [`Decode`](crate::Decode)) through
/// [`persist_fields!`](crate::persist_fields); field-less enums through
/// [`wire_enum!`](crate::wire_enum).
pub trait Encode {
    /// Encoding strategy for this type.
    const CATEGORY: ValueCategory = ValueCategory::Serializable;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError>;
}

impl<T: Encode + ?Sized> Encode for &T {
    const CATEGORY: ValueCategory = T::CATEGORY;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        (**self).encode(enc)
    }
}

/// Writes values to a [`Channel`], preserving object identity.
///
/// One encoder is one transaction: identities accumulate until
/// [`clear_identities`](Self::clear_identities) is called or the encoder
/// is dropped. Every object reached through a pointer is kept alive by
/// the encoder for as long as its identity is remembered, so the address
/// used as the identity key cannot be reused by a new allocation.
pub struct Encoder {
    channel: Box<dyn Channel>,
    registry: Arc<TypeRegistry>,
    collections: Arc<Collections>,
    config: SerializerConfig,
    byte_order: Endianness,
    identities: HashMap<usize, ObjectIdentity>,
    pins: Vec<Pinned>,
    written: u64,
}

impl Encoder {
    /// New encoder writing native byte order with default settings.
    pub fn new(channel: impl Channel + 'static, registry: Arc<TypeRegistry>) -> Self {
        Self::from_boxed(Box::new(channel), registry)
    }

    pub fn from_boxed(channel: Box<dyn Channel>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            channel,
            registry,
            collections: Arc::new(Collections::new()),
            config: SerializerConfig::default(),
            byte_order: Endianness::native(),
            identities: HashMap::new(),
            pins: Vec::new(),
            written: 0,
        }
    }

    pub fn with_config(mut self, config: SerializerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_collections(mut self, collections: Arc<Collections>) -> Self {
        self.collections = collections;
        self
    }

    /// Writes multi-byte primitives in `order` instead of native order.
    pub fn with_byte_order(mut self, order: Endianness) -> Self {
        self.byte_order = order;
        self
    }

    // -- Top level ----------------------------------------------------------

    /// Encodes one value.
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<(), SerializeError> {
        value.encode(self)
    }

    pub fn flush(&mut self) -> Result<(), SerializeError> {
        self.channel.flush()?;
        Ok(())
    }

    // -- Raw building blocks ------------------------------------------------

    /// Writes bytes verbatim.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SerializeError> {
        self.channel.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Writes a primitive given in native byte order, converting to the
    /// encoder's byte order.
    pub fn write_primitive<const N: usize>(
        &mut self,
        mut native: [u8; N],
    ) -> Result<(), SerializeError> {
        if self.byte_order != Endianness::native() {
            native.reverse();
        }
        self.write_bytes(&native)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), SerializeError> {
        self.write_bytes(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), SerializeError> {
        self.write_primitive(value.to_ne_bytes())
    }

    /// Writes a container length prefix.
    pub fn write_len(&mut self, len: usize) -> Result<(), SerializeError> {
        let len = u32::try_from(len).map_err(|_| {
            SerializeError::corrupt(format!("length {len} does not fit the wire format"), None)
        })?;
        self.write_u32(len)
    }

    pub fn write_tag(&mut self, tag: TypeTag) -> Result<(), SerializeError> {
        self.write_primitive(tag.into_inner().to_ne_bytes())
    }

    /// Writes the active alternative of a tagged union.
    pub fn write_discriminant(&mut self, index: u32) -> Result<(), SerializeError> {
        self.write_u32(index)
    }

    // -- Pointers -----------------------------------------------------------

    /// Writes a concrete pointer: presence byte, optional index or
    /// identity, then the type tag (or `0` if `T` is unregistered) and the
    /// body.
    pub fn write_ptr<T: Encode + Object>(&mut self, ptr: &Ptr<T>) -> Result<(), SerializeError> {
        let Some(target) = ptr.get() else {
            return self.write_u8(0);
        };
        self.write_u8(1)?;
        if self.write_index(target)? || self.write_identity(target)? {
            return Ok(());
        }
        let tag = self.registry.tag_of::<T>().unwrap_or(TypeTag::NONE);
        self.write_tag(tag)?;
        let guard = read_lock(target)?;
        (*guard).encode(self)
    }

    /// Writes a pointer through base interface `B`; the runtime type must
    /// be registered.
    pub fn write_poly_ptr<B: ?Sized + Object>(
        &mut self,
        ptr: &PolyPtr<B>,
    ) -> Result<(), SerializeError> {
        let Some(target) = ptr.get() else {
            return self.write_u8(0);
        };
        self.write_u8(1)?;
        if self.write_index(target)? || self.write_identity(target)? {
            return Ok(());
        }
        let guard = read_lock(target)?;
        self.write_dynamic(&*guard)
    }

    /// Writes the runtime type tag of `value` followed by its body.
    pub fn write_dynamic<B: ?Sized + Object>(&mut self, value: &B) -> Result<(), SerializeError> {
        let any: &dyn Any = value.as_any();
        let tag = self.registry.lookup_id(any.type_id(), value.type_name())?;
        let encode = self.registry.encoder_for(tag)?;
        self.write_tag(tag)?;
        encode(any, self)
    }

    /// Writes the vectorised section. Returns `true` when the object was
    /// written as an index and nothing else follows.
    fn write_index<T: ?Sized + 'static>(
        &mut self,
        target: &Shared<T>,
    ) -> Result<bool, SerializeError> {
        if !self.config.vectorised_members {
            return Ok(false);
        }
        let Some(provider) = self.collections.get::<T>() else {
            return Ok(false);
        };
        match provider.index_of(target) {
            Some(index) => {
                self.write_u8(BY_INDEX)?;
                self.write_u32(index)?;
                Ok(true)
            }
            None => match self.config.missing_index_policy {
                MissingIndexPolicy::FallBackToValue => {
                    tracing::trace!(
                        element = type_name::<T>(),
                        "object outside its collection, writing by value"
                    );
                    self.write_u8(BY_VALUE)?;
                    Ok(false)
                }
                MissingIndexPolicy::Fail => Err(SerializeError::NotInCollection(type_name::<T>())),
            },
        }
    }

    /// Writes the identity section. Returns `true` when the object was
    /// already written in this transaction.
    fn write_identity<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        target: &Shared<T>,
    ) -> Result<bool, SerializeError> {
        if !self.config.smart_pointers {
            return Ok(false);
        }
        let address = address_of(target);
        if let Some(identity) = self.identities.get(&address).copied() {
            self.write_u32(identity.into_inner())?;
            return Ok(true);
        }
        let raw = u32::try_from(self.identities.len()).map_err(|_| {
            SerializeError::corrupt("more than u32::MAX objects in one transaction", None)
        })?;
        let identity = ObjectIdentity::new(raw);
        self.identities.insert(address, identity);
        self.pins.push(Box::new(Arc::clone(target)));
        self.write_u32(raw)?;
        Ok(false)
    }

    // -- Session state ------------------------------------------------------

    /// Forgets every identity assigned so far.
    pub fn clear_identities(&mut self) {
        self.identities.clear();
        self.pins.clear();
    }

    pub fn set_smart_pointers(&mut self, enabled: bool) {
        self.config.smart_pointers = enabled;
    }

    pub fn set_vectorised(&mut self, enabled: bool) {
        self.config.vectorised_members = enabled;
    }

    pub fn set_collections(&mut self, collections: Arc<Collections>) {
        self.collections = collections;
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    pub fn byte_order(&self) -> Endianness {
        self.byte_order
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of identities assigned in this transaction.
    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Human-readable position report for diagnostics.
    pub fn describe(&self) -> String {
        format!("{} after {} bytes written", self.channel.describe(), self.written)
    }

    pub fn channel_mut(&mut self) -> &mut dyn Channel {
        &mut *self.channel
    }

    pub fn into_channel(self) -> Box<dyn Channel> {
        self.channel
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("channel", &self.channel.describe())
            .field("config", &self.config)
            .field("byte_order", &self.byte_order)
            .field("identities", &self.identities.len())
            .field("written", &self.written)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwire_channel::{MemoryChannel, PipeReader, pipe};

    fn encoder() -> Encoder {
        Encoder::new(MemoryChannel::new(), Arc::new(TypeRegistry::new()))
    }

    fn piped(order: Endianness) -> (Encoder, PipeReader) {
        let (writer, reader) = pipe();
        let enc = Encoder::new(writer, Arc::new(TypeRegistry::new())).with_byte_order(order);
        (enc, reader)
    }

    fn drain(enc: Encoder, mut reader: PipeReader) -> Vec<u8> {
        drop(enc);
        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn test_write_u32_in_configured_order() {
        let (mut be, reader) = piped(Endianness::Big);
        be.write_u32(0x0102_0304).unwrap();
        assert_eq!(drain(be, reader), [1, 2, 3, 4]);

        let (mut le, reader) = piped(Endianness::Little);
        le.write_u32(0x0102_0304).unwrap();
        assert_eq!(drain(le, reader), [4, 3, 2, 1]);
    }

    #[test]
    fn test_null_pointer_is_one_zero_byte() {
        let (mut enc, reader) = piped(Endianness::Little);
        enc.write(&Ptr::<u32>::null()).unwrap();
        assert_eq!(enc.identity_count(), 0);
        assert_eq!(drain(enc, reader), [0]);
    }

    #[test]
    fn test_repeated_target_gets_one_identity() {
        let mut enc = encoder();
        let ptr = Ptr::new(7u32);
        enc.write(&ptr).unwrap();
        let first = enc.bytes_written();
        enc.write(&ptr.clone()).unwrap();
        assert_eq!(enc.identity_count(), 1);
        // presence + identity only.
        assert_eq!(enc.bytes_written() - first, 5);
    }

    #[test]
    fn test_clear_identities_forgets_targets() {
        let mut enc = encoder();
        let ptr = Ptr::new(7u32);
        enc.write(&ptr).unwrap();
        enc.clear_identities();
        assert_eq!(enc.identity_count(), 0);
        enc.write(&ptr).unwrap();
        assert_eq!(enc.identity_count(), 1);
    }

    #[test]
    fn test_unregistered_dynamic_type_fails() {
        let mut enc = encoder();
        let boxed: Box<dyn Object> = Box::new(3u32);
        let err = enc.write_dynamic(&*boxed).unwrap_err();
        assert!(matches!(err, SerializeError::UnregisteredType(ref n) if n.contains("u32")));
    }

    #[test]
    fn test_describe_mentions_position() {
        let mut enc = encoder();
        enc.write_u8(1).unwrap();
        assert!(enc.describe().ends_with("after 1 bytes written"));
    }
}
