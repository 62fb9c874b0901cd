//! The decoder: rebuilds a value graph from a channel.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use graphwire_channel::{Channel, ChannelError};

use crate::encoder::{BY_INDEX, BY_VALUE};
use crate::pointer::{Pinned, PolyPtr, Ptr, Shared, shared, write_lock};
use crate::{
    Collections, Endianness, FORMAT_VERSION, Object, ObjectIdentity, SerializeError,
    SerializerConfig, TypeRegistry, TypeTag,
};

/// A value that can be read by a [`Decoder`].
pub trait Decode: Sized {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError>;
}

/// An object created earlier in the transaction, kept under every static
/// type it has been requested as.
struct DecodedObject {
    tag: TypeTag,
    views: Vec<Pinned>,
}

impl DecodedObject {
    fn view<T: ?Sized + 'static>(&self) -> Option<Shared<T>> {
        self.views
            .iter()
            .find_map(|view| view.downcast_ref::<Shared<T>>())
            .cloned()
    }
}

/// Outcome of reading the identity section of a pointer.
enum IdentitySection {
    /// Identity tracking is off.
    Disabled,
    /// Back reference to an object created earlier.
    Known(usize),
    /// First occurrence; the object about to be read gets this identity.
    Fresh(ObjectIdentity),
}

/// Reads values from a [`Channel`], restoring object identity.
///
/// Every object created from a first occurrence is kept alive by the
/// decoder until [`clear_identities`](Self::clear_identities) or drop, so
/// later back references always resolve.
pub struct Decoder {
    channel: Box<dyn Channel>,
    registry: Arc<TypeRegistry>,
    collections: Arc<Collections>,
    config: SerializerConfig,
    stream_order: Endianness,
    version: u32,
    objects: Vec<DecodedObject>,
    read: u64,
    /// Byte pulled from the channel by [`at_end`](Decoder::at_end) and not
    /// yet handed out.
    lookahead: Option<u8>,
}

impl Decoder {
    /// New decoder expecting native byte order with default settings.
    pub fn new(channel: impl Channel + 'static, registry: Arc<TypeRegistry>) -> Self {
        Self::from_boxed(Box::new(channel), registry)
    }

    pub fn from_boxed(channel: Box<dyn Channel>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            channel,
            registry,
            collections: Arc::new(Collections::new()),
            config: SerializerConfig::default(),
            stream_order: Endianness::native(),
            version: FORMAT_VERSION,
            objects: Vec::new(),
            read: 0,
            lookahead: None,
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

    /// Declares the byte order the stream was written in.
    pub fn with_stream_order(mut self, order: Endianness) -> Self {
        self.stream_order = order;
        self
    }

    // -- Top level ----------------------------------------------------------

    /// Decodes one value.
    pub fn read<T: Decode>(&mut self) -> Result<T, SerializeError> {
        T::decode(self)
    }

    /// Decodes into an existing value, replacing it.
    pub fn read_into<T: Decode>(&mut self, target: &mut T) -> Result<(), SerializeError> {
        *target = T::decode(self)?;
        Ok(())
    }

    // -- Raw building blocks ------------------------------------------------

    /// Fills `buf` from the channel.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), SerializeError> {
        let start = match (self.lookahead.take(), buf.first_mut()) {
            (Some(byte), Some(first)) => {
                *first = byte;
                1
            }
            (held, _) => {
                self.lookahead = held;
                0
            }
        };
        self.channel.read_exact(&mut buf[start..]).map_err(|e| match e {
            ChannelError::UnexpectedEof { wanted, got } => ChannelError::UnexpectedEof {
                wanted: wanted + start,
                got: got + start,
            },
            other => other,
        })?;
        self.read += buf.len() as u64;
        Ok(())
    }

    /// `true` when the channel has no bytes left.
    ///
    /// Finding out may pull one byte from the channel; it is kept and
    /// returned by the next read, so the stream position is unchanged.
    pub fn at_end(&mut self) -> Result<bool, SerializeError> {
        if self.lookahead.is_some() {
            return Ok(false);
        }
        let mut byte = [0u8; 1];
        if self.channel.read(&mut byte)? == 0 {
            return Ok(true);
        }
        self.lookahead = Some(byte[0]);
        Ok(false)
    }

    /// Reads a primitive and returns its bytes in native order.
    pub fn read_primitive<const N: usize>(&mut self) -> Result<[u8; N], SerializeError> {
        let mut bytes = [0u8; N];
        self.read_bytes(&mut bytes)?;
        if self.reverse_endianness() {
            bytes.reverse();
        }
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, SerializeError> {
        let [byte] = self.read_primitive::<1>()?;
        Ok(byte)
    }

    pub fn read_u32(&mut self) -> Result<u32, SerializeError> {
        Ok(u32::from_ne_bytes(self.read_primitive()?))
    }

    /// Reads a container length prefix, rejecting lengths above the
    /// configured ceiling before anything is allocated.
    pub fn read_len(&mut self) -> Result<usize, SerializeError> {
        let offset = self.read;
        let len = self.read_u32()?;
        if len > self.config.max_container_len {
            tracing::warn!(
                len,
                ceiling = self.config.max_container_len,
                offset,
                "length prefix over ceiling"
            );
            return Err(SerializeError::corrupt(
                format!(
                    "length {len} exceeds ceiling {}",
                    self.config.max_container_len
                ),
                Some(offset),
            ));
        }
        Ok(len as usize)
    }

    pub fn read_tag(&mut self) -> Result<TypeTag, SerializeError> {
        Ok(TypeTag::new(u16::from_ne_bytes(self.read_primitive()?)))
    }

    /// Reads a tagged-union discriminant and checks it against the number
    /// of alternatives.
    pub fn read_discriminant(&mut self, alternatives: u32) -> Result<u32, SerializeError> {
        let offset = self.read;
        let index = self.read_u32()?;
        if index >= alternatives {
            return Err(SerializeError::corrupt(
                format!("discriminant {index} out of range for {alternatives} alternatives"),
                Some(offset),
            ));
        }
        Ok(index)
    }

    /// Shorthand for a corrupt-stream error at the current offset.
    pub fn corrupt(&self, reason: impl Into<String>) -> SerializeError {
        SerializeError::corrupt(reason, Some(self.read))
    }

    // -- Pointers -----------------------------------------------------------

    /// Reads a concrete pointer written by
    /// [`Encoder::write_ptr`](crate::Encoder::write_ptr).
    ///
    /// The object is allocated with `T::default()` and made reachable
    /// before its body is read, so a body that points back at it (a
    /// cycle) resolves to the same node.
    pub fn read_ptr<T: Decode + Default + Object>(&mut self) -> Result<Ptr<T>, SerializeError> {
        if !self.read_presence()? {
            return Ok(Ptr::null());
        }
        if let Some(target) = self.read_index::<T>()? {
            return Ok(Ptr::from_shared(target));
        }
        let fresh = match self.read_identity()? {
            IdentitySection::Known(slot) => {
                return self.reuse_concrete::<T>(slot).map(Ptr::from_shared);
            }
            IdentitySection::Fresh(identity) => Some(identity),
            IdentitySection::Disabled => None,
        };

        let offset = self.read;
        let tag = self.read_tag()?;
        if let Some(own) = self.registry.tag_of::<T>() {
            if !tag.is_none() && tag != own {
                return Err(SerializeError::corrupt(
                    format!("type tag {tag} where {} ({own}) was expected", type_name::<T>()),
                    Some(offset),
                ));
            }
        }

        let target = shared(T::default());
        if fresh.is_some() {
            let view: Pinned = Box::new(Arc::clone(&target));
            self.objects.push(DecodedObject {
                tag,
                views: vec![view],
            });
        }
        let value = T::decode(self)?;
        *write_lock(&target)? = value;
        Ok(Ptr::from_shared(target))
    }

    /// Reads a pointer through base interface `B`, allocating the
    /// concrete type named by the stream's tag.
    pub fn read_poly_ptr<B: ?Sized + Object>(&mut self) -> Result<PolyPtr<B>, SerializeError> {
        if !self.read_presence()? {
            return Ok(PolyPtr::null());
        }
        if let Some(target) = self.read_index::<B>()? {
            return Ok(PolyPtr::from_shared(target));
        }
        let fresh = match self.read_identity()? {
            IdentitySection::Known(slot) => {
                return self.reuse_base::<B>(slot).map(PolyPtr::from_shared);
            }
            IdentitySection::Fresh(identity) => Some(identity),
            IdentitySection::Disabled => None,
        };

        let offset = self.read;
        let tag = self.read_tag()?;
        if tag.is_none() {
            return Err(SerializeError::corrupt(
                format!("pointer to {} carries no type tag", type_name::<B>()),
                Some(offset),
            ));
        }
        let registry = Arc::clone(&self.registry);
        let entry = registry.derived::<B>(tag)?;
        tracing::trace!(%tag, name = entry.name, "allocating polymorphic object");

        let (target, concrete) = (entry.allocate)();
        if fresh.is_some() {
            let base_view: Pinned = Box::new(Arc::clone(&target));
            self.objects.push(DecodedObject {
                tag,
                views: vec![concrete, base_view],
            });
        }
        (entry.fill)(&target, self)?;
        Ok(PolyPtr::from_shared(target))
    }

    /// Reads a type tag and an owned body as base `B`.
    pub fn read_dynamic<B: ?Sized + Object>(&mut self) -> Result<Box<B>, SerializeError> {
        let tag = self.read_tag()?;
        let registry = Arc::clone(&self.registry);
        let entry = registry.derived::<B>(tag)?;
        (entry.boxed)(self)
    }

    fn read_presence(&mut self) -> Result<bool, SerializeError> {
        let offset = self.read;
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SerializeError::corrupt(
                format!("pointer presence byte {other}"),
                Some(offset),
            )),
        }
    }

    /// Reads the vectorised section; `Some` when the pointer was written
    /// as an index.
    fn read_index<T: ?Sized + 'static>(&mut self) -> Result<Option<Shared<T>>, SerializeError> {
        if !self.config.vectorised_members {
            return Ok(None);
        }
        let Some(provider) = self.collections.get::<T>() else {
            return Ok(None);
        };
        let offset = self.read;
        match self.read_u8()? {
            BY_VALUE => Ok(None),
            BY_INDEX => {
                let index = self.read_u32()?;
                provider.by_index(index).map(Some).ok_or_else(|| {
                    SerializeError::corrupt(
                        format!("index {index} outside the {} collection", type_name::<T>()),
                        Some(offset),
                    )
                })
            }
            other => Err(SerializeError::corrupt(
                format!("reference category {other}"),
                Some(offset),
            )),
        }
    }

    fn read_identity(&mut self) -> Result<IdentitySection, SerializeError> {
        if !self.config.smart_pointers {
            return Ok(IdentitySection::Disabled);
        }
        let raw = self.read_u32()?;
        let expected = self.objects.len();
        let slot = raw as usize;
        if slot < expected {
            Ok(IdentitySection::Known(slot))
        } else if slot == expected {
            Ok(IdentitySection::Fresh(ObjectIdentity::new(raw)))
        } else {
            Err(SerializeError::IdentityMismatch {
                identity: raw,
                expected: expected as u32,
            })
        }
    }

    fn reuse_concrete<T: Object>(&mut self, slot: usize) -> Result<Shared<T>, SerializeError> {
        let object = &self.objects[slot];
        object.view::<T>().ok_or_else(|| {
            SerializeError::corrupt(
                format!(
                    "identity {slot} refers to {}, not {}",
                    self.registry.name(object.tag).unwrap_or("an untagged object"),
                    type_name::<T>()
                ),
                Some(self.read),
            )
        })
    }

    fn reuse_base<B: ?Sized + Object>(&mut self, slot: usize) -> Result<Shared<B>, SerializeError> {
        if let Some(existing) = self.objects[slot].view::<B>() {
            return Ok(existing);
        }
        let tag = self.objects[slot].tag;
        let entry = self.registry.derived::<B>(tag)?;
        let upcast = self.objects[slot]
            .views
            .iter()
            .find_map(|view| (entry.reuse)(&**view));
        match upcast {
            Some(target) => {
                let view: Pinned = Box::new(Arc::clone(&target));
                self.objects[slot].views.push(view);
                Ok(target)
            }
            None => Err(SerializeError::corrupt(
                format!("identity {slot} cannot be viewed as {}", type_name::<B>()),
                Some(self.read),
            )),
        }
    }

    // -- Session state ------------------------------------------------------

    /// `true` when the stream's byte order differs from the host's and
    /// primitives are reversed on read.
    pub fn reverse_endianness(&self) -> bool {
        self.stream_order != Endianness::native()
    }

    /// Switches byte-order handling mid-stream, e.g. after a handshake or
    /// a save header reveals the writer's order.
    pub fn set_stream_order(&mut self, order: Endianness) {
        self.stream_order = order;
    }

    pub fn stream_order(&self) -> Endianness {
        self.stream_order
    }

    /// Format version of the stream being read, for version-gated fields.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    pub fn clear_identities(&mut self) {
        self.objects.clear();
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

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of identities seen in this transaction.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Human-readable position report for diagnostics.
    pub fn describe(&self) -> String {
        format!("{} after {} bytes read", self.channel.describe(), self.read)
    }

    /// Direct channel access. Reads made here bypass a byte held back by
    /// [`at_end`](Self::at_end).
    pub fn channel_mut(&mut self) -> &mut dyn Channel {
        &mut *self.channel
    }

    /// Unwraps the channel, dropping any byte held back by
    /// [`at_end`](Self::at_end).
    pub fn into_channel(self) -> Box<dyn Channel> {
        self.channel
    }
}

impl fmt::Debug for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoder")
            .field("channel", &self.channel.describe())
            .field("config", &self.config)
            .field("stream_order", &self.stream_order)
            .field("version", &self.version)
            .field("objects", &self.objects.len())
            .field("read", &self.read)
            .field("lookahead", &self.lookahead)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphwire_channel::MemoryChannel;

    fn decoder(bytes: &[u8]) -> Decoder {
        Decoder::new(
            MemoryChannel::from_bytes(bytes.to_vec()),
            Arc::new(TypeRegistry::new()),
        )
    }

    #[test]
    fn test_read_len_rejects_over_ceiling() {
        let mut dec = decoder(&9_000_000u32.to_ne_bytes());
        let err = dec.read_len().unwrap_err();
        assert!(matches!(
            err,
            SerializeError::CorruptStream { offset: Some(0), .. }
        ));
    }

    #[test]
    fn test_reversed_stream_order() {
        let mut dec = decoder(&[1, 2, 3, 4]).with_stream_order(Endianness::Big);
        assert_eq!(dec.reverse_endianness(), Endianness::native() == Endianness::Little);
        assert_eq!(dec.read_u32().unwrap(), 0x0102_0304);
    }

    #[test]
    fn test_at_end_keeps_stream_position() {
        let mut bytes = 0x0102_0304u32.to_ne_bytes().to_vec();
        bytes.extend_from_slice(&0x0A0B_0C0Du32.to_ne_bytes());
        let mut dec = decoder(&bytes);
        assert_eq!(dec.read_u32().unwrap(), 0x0102_0304);
        assert!(!dec.at_end().unwrap());
        assert!(!dec.at_end().unwrap());
        assert_eq!(dec.bytes_read(), 4);
        assert_eq!(dec.read_u32().unwrap(), 0x0A0B_0C0D);
        assert_eq!(dec.bytes_read(), 8);
        assert!(dec.at_end().unwrap());
    }

    #[test]
    fn test_truncation_after_at_end_reports_full_width() {
        let mut dec = decoder(&[1, 2, 3]);
        assert!(!dec.at_end().unwrap());
        match dec.read_u32().unwrap_err() {
            SerializeError::Channel(ChannelError::UnexpectedEof { wanted, got }) => {
                assert_eq!((wanted, got), (4, 3));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_discriminant_out_of_range() {
        let mut dec = decoder(&3u32.to_ne_bytes());
        assert!(dec.read_discriminant(3).is_err());
    }

    #[test]
    fn test_identity_from_the_future_is_rejected() {
        // presence, identity 5 with nothing seen yet.
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&5u32.to_ne_bytes());
        let mut dec = decoder(&bytes);
        let err = dec.read_ptr::<u32>().unwrap_err();
        assert!(matches!(
            err,
            SerializeError::IdentityMismatch {
                identity: 5,
                expected: 0
            }
        ));
    }

    #[test]
    fn test_bad_presence_byte() {
        let mut dec = decoder(&[7]);
        assert!(dec.read_ptr::<u32>().unwrap_err().is_stream_fault());
    }

    #[test]
    fn test_truncated_stream_is_channel_error() {
        let mut dec = decoder(&[1, 0]);
        assert!(matches!(
            dec.read_u32().unwrap_err(),
            SerializeError::Channel(_)
        ));
    }

    #[test]
    fn test_version_defaults_to_current() {
        let mut dec = decoder(&[]);
        assert_eq!(dec.version(), FORMAT_VERSION);
        dec.set_version(3);
        assert_eq!(dec.version(), 3);
        assert!(dec.describe().ends_with("after 0 bytes read"));
    }
}
