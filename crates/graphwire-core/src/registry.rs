//! Type registry: maps concrete types to compact wire tags and holds the
//! per-base dispatch tables used for polymorphic pointers.
//!
//! Registration happens once at startup, in the same order on every peer
//! (tags are assigned sequentially from 1). After that the registry is
//! shared read-only behind an `Arc` by every encoder and decoder.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pointer::{Pinned, Shared, shared};
use crate::{Decode, Decoder, Encode, Encoder, SerializeError};

// ---------------------------------------------------------------------------
// Object
// ---------------------------------------------------------------------------

/// Runtime type access for values stored behind base-interface pointers.
///
/// Implemented for every `'static + Send + Sync` type. Base interfaces
/// extend it (`trait Creature: Object { .. }`) so `dyn Creature` can be
/// downcast and its concrete type looked up in the registry.
pub trait Object: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync> Object for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

// ---------------------------------------------------------------------------
// TypeTag
// ---------------------------------------------------------------------------

/// Compact wire identifier of a registered concrete type. `0` means
/// "no tag".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TypeTag(u16);

impl TypeTag {
    pub const NONE: TypeTag = TypeTag(0);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn into_inner(self) -> u16 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Dispatch tables
// ---------------------------------------------------------------------------

type EncodeFn = fn(&dyn Any, &mut Encoder) -> Result<(), SerializeError>;

struct TypeEntry {
    name: &'static str,
    encode: EncodeFn,
}

/// Allocated placeholder: the base-typed handle plus the concrete handle,
/// both pointing at the same object.
pub(crate) type Allocation<B> = (Shared<B>, Pinned);

/// How to build, fill and re-view one concrete type behind base `B`.
pub(crate) struct DerivedEntry<B: ?Sized> {
    pub(crate) name: &'static str,
    pub(crate) allocate: Box<dyn Fn() -> Allocation<B> + Send + Sync>,
    pub(crate) fill: fn(&Shared<B>, &mut Decoder) -> Result<(), SerializeError>,
    pub(crate) boxed: Box<dyn Fn(&mut Decoder) -> Result<Box<B>, SerializeError> + Send + Sync>,
    pub(crate) reuse: Box<dyn Fn(&(dyn Any + Send + Sync)) -> Option<Shared<B>> + Send + Sync>,
}

/// Every concrete type registered under base `B`, keyed by tag.
pub(crate) struct DerivedTable<B: ?Sized> {
    entries: HashMap<TypeTag, DerivedEntry<B>>,
}

impl<B: ?Sized> Default for DerivedTable<B> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<B: ?Sized> DerivedTable<B> {
    pub(crate) fn get(&self, tag: TypeTag) -> Option<&DerivedEntry<B>> {
        self.entries.get(&tag)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &DerivedEntry<B>> {
        self.entries.values()
    }
}

fn encode_erased<T: Encode + 'static>(
    value: &dyn Any,
    enc: &mut Encoder,
) -> Result<(), SerializeError> {
    match value.downcast_ref::<T>() {
        Some(value) => value.encode(enc),
        None => Err(SerializeError::UnregisteredType(format!(
            "dispatch for {} received another type",
            type_name::<T>()
        ))),
    }
}

fn fill_derived<B, T>(target: &Shared<B>, dec: &mut Decoder) -> Result<(), SerializeError>
where
    B: ?Sized + Object,
    T: Decode + Object,
{
    let value = T::decode(dec)?;
    let mut guard = target
        .write()
        .map_err(|_| SerializeError::LockPoisoned("filling a decoded object"))?;
    match (*guard).as_any_mut().downcast_mut::<T>() {
        Some(slot) => {
            *slot = value;
            Ok(())
        }
        None => Err(SerializeError::corrupt(
            format!("allocated object is not a {}", type_name::<T>()),
            None,
        )),
    }
}

// ---------------------------------------------------------------------------
// TypeRegistry
// ---------------------------------------------------------------------------

/// Tag assignments and polymorphic dispatch tables.
///
/// ```ignore
/// let mut registry = TypeRegistry::new();
/// register_derived!(registry, dyn Creature => Dragon, Peasant);
/// let registry = Arc::new(registry);
/// ```
#[derive(Default)]
pub struct TypeRegistry {
    tags: HashMap<TypeId, TypeTag>,
    entries: Vec<TypeEntry>,
    bases: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next tag to `T`. Registering a type twice returns the
    /// tag it already has.
    ///
    /// # Panics
    ///
    /// Panics when more than `u16::MAX` types are registered.
    pub fn register<T: Encode + 'static>(&mut self) -> TypeTag {
        if let Some(tag) = self.tags.get(&TypeId::of::<T>()) {
            return *tag;
        }
        let raw = u16::try_from(self.entries.len() + 1).expect("type tag space exhausted");
        let tag = TypeTag(raw);
        self.entries.push(TypeEntry {
            name: type_name::<T>(),
            encode: encode_erased::<T>,
        });
        self.tags.insert(TypeId::of::<T>(), tag);
        tracing::trace!(%tag, name = type_name::<T>(), "registered type");
        tag
    }

    /// Registers `T` as a concrete implementation of base interface `B`.
    ///
    /// The two upcasts are plain unsizing coercions; the
    /// [`register_derived!`](crate::register_derived) macro writes them.
    pub fn register_derived<B, T>(
        &mut self,
        upcast: fn(Shared<T>) -> Shared<B>,
        upcast_box: fn(Box<T>) -> Box<B>,
    ) -> TypeTag
    where
        B: ?Sized + Object,
        T: Encode + Decode + Default + Object,
    {
        let tag = self.register::<T>();
        let table = self
            .bases
            .entry(TypeId::of::<B>())
            .or_insert_with(|| Box::new(DerivedTable::<B>::default()));
        let table = table
            .downcast_mut::<DerivedTable<B>>()
            .expect("base tables are keyed by their own TypeId");

        table.entries.insert(
            tag,
            DerivedEntry {
                name: type_name::<T>(),
                allocate: Box::new(move || {
                    let concrete = shared(T::default());
                    let pinned: Pinned = Box::new(Arc::clone(&concrete));
                    (upcast(concrete), pinned)
                }),
                fill: fill_derived::<B, T>,
                boxed: Box::new(move |dec| Ok(upcast_box(Box::new(T::decode(dec)?)))),
                reuse: Box::new(move |view| {
                    view.downcast_ref::<Shared<T>>()
                        .map(|concrete| upcast(Arc::clone(concrete)))
                }),
            },
        );
        tracing::trace!(
            %tag,
            base = type_name::<B>(),
            name = type_name::<T>(),
            "registered derived type"
        );
        tag
    }

    /// Tag of `T`, or [`SerializeError::UnregisteredType`].
    pub fn lookup<T: ?Sized + 'static>(&self) -> Result<TypeTag, SerializeError> {
        self.lookup_id(TypeId::of::<T>(), type_name::<T>())
    }

    /// Tag of the type with `type_id`; `name` is only used in the error.
    pub fn lookup_id(&self, type_id: TypeId, name: &str) -> Result<TypeTag, SerializeError> {
        self.tags
            .get(&type_id)
            .copied()
            .ok_or_else(|| SerializeError::UnregisteredType(name.to_string()))
    }

    /// Tag of `T` if registered.
    pub fn tag_of<T: ?Sized + 'static>(&self) -> Option<TypeTag> {
        self.tags.get(&TypeId::of::<T>()).copied()
    }

    /// Concrete type name registered under `tag`.
    pub fn name(&self, tag: TypeTag) -> Option<&'static str> {
        self.entry(tag).map(|e| e.name)
    }

    /// Number of registered concrete types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when at least one concrete type is registered under `B`.
    pub fn has_base<B: ?Sized + 'static>(&self) -> bool {
        self.bases.contains_key(&TypeId::of::<B>())
    }

    fn entry(&self, tag: TypeTag) -> Option<&TypeEntry> {
        if tag.is_none() {
            return None;
        }
        self.entries.get(usize::from(tag.0) - 1)
    }

    pub(crate) fn encoder_for(&self, tag: TypeTag) -> Result<EncodeFn, SerializeError> {
        self.entry(tag)
            .map(|e| e.encode)
            .ok_or_else(|| SerializeError::UnregisteredType(format!("tag {tag}")))
    }

    pub(crate) fn derived_table<B: ?Sized + 'static>(&self) -> Option<&DerivedTable<B>> {
        self.bases
            .get(&TypeId::of::<B>())?
            .downcast_ref::<DerivedTable<B>>()
    }

    /// Tag plus base-table entry for `tag` under `B`.
    pub(crate) fn derived<B: ?Sized + 'static>(
        &self,
        tag: TypeTag,
    ) -> Result<&DerivedEntry<B>, SerializeError> {
        self.derived_table::<B>()
            .and_then(|table| table.get(tag))
            .ok_or_else(|| {
                SerializeError::UnregisteredType(format!(
                    "tag {tag} is not registered under {}",
                    type_name::<B>()
                ))
            })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.entries.iter().map(|e| e.name).collect::<Vec<_>>())
            .field("bases", &self.bases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register_derived;

    trait Shape: Object {
        fn area(&self) -> u32;
    }

    #[derive(Debug, Default, PartialEq)]
    struct Square {
        side: u32,
    }

    #[derive(Debug, Default, PartialEq)]
    struct Strip {
        width: u32,
        height: u32,
    }

    crate::persist_fields!(Square { side });
    crate::persist_fields!(Strip { width, height });

    impl Shape for Square {
        fn area(&self) -> u32 {
            self.side * self.side
        }
    }

    impl Shape for Strip {
        fn area(&self) -> u32 {
            self.width * self.height
        }
    }

    #[test]
    fn test_tags_are_sequential_from_one() {
        let mut registry = TypeRegistry::new();
        assert_eq!(registry.register::<Square>(), TypeTag::new(1));
        assert_eq!(registry.register::<Strip>(), TypeTag::new(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = TypeRegistry::new();
        let first = registry.register::<Square>();
        let again = registry.register::<Square>();
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unregistered_fails() {
        let registry = TypeRegistry::new();
        let err = registry.lookup::<Square>().unwrap_err();
        assert!(matches!(err, SerializeError::UnregisteredType(ref n) if n.contains("Square")));
        assert_eq!(registry.tag_of::<Square>(), None);
    }

    #[test]
    fn test_derived_registration_builds_base_table() {
        let mut registry = TypeRegistry::new();
        register_derived!(registry, dyn Shape => Square, Strip);

        assert!(registry.has_base::<dyn Shape>());
        let square = registry.lookup::<Square>().unwrap();
        let entry = registry.derived::<dyn Shape>(square).unwrap();
        let (object, _pinned) = (entry.allocate)();
        assert_eq!(object.read().unwrap().area(), 0);
        assert!(registry.name(square).unwrap().ends_with("Square"));
        assert_eq!(registry.derived_table::<dyn Shape>().unwrap().entries().count(), 2);
    }

    #[test]
    fn test_reuse_upcasts_a_concrete_view() {
        let mut registry = TypeRegistry::new();
        register_derived!(registry, dyn Shape => Strip);
        let tag = registry.lookup::<Strip>().unwrap();
        let entry = registry.derived::<dyn Shape>(tag).unwrap();

        let concrete = shared(Strip {
            width: 2,
            height: 5,
        });
        let view: Pinned = Box::new(Arc::clone(&concrete));
        let as_shape = (entry.reuse)(&*view).unwrap();
        assert_eq!(as_shape.read().unwrap().area(), 10);
    }

    #[test]
    fn test_unknown_tag_under_base() {
        let mut registry = TypeRegistry::new();
        register_derived!(registry, dyn Shape => Square);
        assert!(registry.derived::<dyn Shape>(TypeTag::new(42)).is_err());
        assert!(registry.encoder_for(TypeTag::NONE).is_err());
    }
}
