//! Shared object handles and the pointer types that reference them.
//!
//! A graph node lives in a [`Shared`] cell (`Arc<RwLock<T>>`). Other nodes
//! point at it through a [`Ptr`] (concrete type known statically) or a
//! [`PolyPtr`] (only a base interface known statically). Both are nullable.
//! Identity is the `Arc` allocation: two pointers share a target exactly
//! when [`Arc::ptr_eq`] holds, and that is what the encoder preserves.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{Decode, Decoder, Encode, Encoder, Object, SerializeError, ValueCategory};

/// A shared, lockable graph node.
pub type Shared<T> = Arc<RwLock<T>>;

/// Type-erased strong handle, used to keep objects alive and to re-view
/// them under another static type.
pub(crate) type Pinned = Box<dyn Any + Send + Sync>;

/// Wraps `value` in a fresh [`Shared`] cell.
pub fn shared<T>(value: T) -> Shared<T> {
    Arc::new(RwLock::new(value))
}

/// Address of the allocation behind `handle`; stable while the handle
/// lives.
pub(crate) fn address_of<T: ?Sized>(handle: &Shared<T>) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}

pub(crate) fn read_lock<T: ?Sized>(
    handle: &Shared<T>,
) -> Result<RwLockReadGuard<'_, T>, SerializeError> {
    handle
        .read()
        .map_err(|_| SerializeError::LockPoisoned("reading an object for encoding"))
}

pub(crate) fn write_lock<T: ?Sized>(
    handle: &Shared<T>,
) -> Result<RwLockWriteGuard<'_, T>, SerializeError> {
    handle
        .write()
        .map_err(|_| SerializeError::LockPoisoned("storing a decoded object"))
}

/// Transaction-scoped number naming a shared object on the wire.
///
/// Assigned sequentially from 0 in first-encounter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentity(u32);

impl ObjectIdentity {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn into_inner(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Ptr
// ---------------------------------------------------------------------------

/// Nullable pointer to a node whose concrete type is `T`.
pub struct Ptr<T>(Option<Shared<T>>);

impl<T> Ptr<T> {
    pub const fn null() -> Self {
        Self(None)
    }

    /// Allocates a new node holding `value`.
    pub fn new(value: T) -> Self {
        Self(Some(shared(value)))
    }

    pub fn from_shared(handle: Shared<T>) -> Self {
        Self(Some(handle))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&Shared<T>> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Option<Shared<T>> {
        self.0
    }

    /// `true` when both are null or both point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Ptr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Shared<T>> for Ptr<T> {
    fn from(handle: Shared<T>) -> Self {
        Self::from_shared(handle)
    }
}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(handle) => write!(f, "Ptr({:#x})", address_of(handle)),
            None => f.write_str("Ptr(null)"),
        }
    }
}

/// Structural equality: null matches null, otherwise the targets compare
/// equal. Not suitable for cyclic graphs.
impl<T: PartialEq> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) if Arc::ptr_eq(a, b) => true,
            (Some(a), Some(b)) => match (a.read(), b.read()) {
                (Ok(a), Ok(b)) => *a == *b,
                _ => false,
            },
            _ => false,
        }
    }
}

impl<T: Encode + Object> Encode for Ptr<T> {
    const CATEGORY: ValueCategory = ValueCategory::Pointer;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_ptr(self)
    }
}

impl<T: Decode + Default + Object> Decode for Ptr<T> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        dec.read_ptr()
    }
}

// ---------------------------------------------------------------------------
// PolyPtr
// ---------------------------------------------------------------------------

/// Nullable pointer to a node known only through base interface `B`
/// (usually `dyn SomeTrait`). The concrete type must be registered under
/// `B` with [`register_derived!`](crate::register_derived).
pub struct PolyPtr<B: ?Sized>(Option<Shared<B>>);

impl<B: ?Sized> PolyPtr<B> {
    pub const fn null() -> Self {
        Self(None)
    }

    pub fn from_shared(handle: Shared<B>) -> Self {
        Self(Some(handle))
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn get(&self) -> Option<&Shared<B>> {
        self.0.as_ref()
    }

    pub fn into_inner(self) -> Option<Shared<B>> {
        self.0
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => address_of(a) == address_of(b),
            _ => false,
        }
    }
}

impl<B: ?Sized> Clone for PolyPtr<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: ?Sized> Default for PolyPtr<B> {
    fn default() -> Self {
        Self::null()
    }
}

impl<B: ?Sized> From<Shared<B>> for PolyPtr<B> {
    fn from(handle: Shared<B>) -> Self {
        Self::from_shared(handle)
    }
}

impl<B: ?Sized> fmt::Debug for PolyPtr<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(handle) => write!(f, "PolyPtr({:#x})", address_of(handle)),
            None => f.write_str("PolyPtr(null)"),
        }
    }
}

impl<B: ?Sized + Object> Encode for PolyPtr<B> {
    const CATEGORY: ValueCategory = ValueCategory::Pointer;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_poly_ptr(self)
    }
}

impl<B: ?Sized + Object> Decode for PolyPtr<B> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        dec.read_poly_ptr()
    }
}

// ---------------------------------------------------------------------------
// Box
// ---------------------------------------------------------------------------

/// An owned polymorphic value: type tag followed by the body. No presence
/// byte and no identity; boxes are never shared.
impl<B: ?Sized + Object> Encode for Box<B> {
    const CATEGORY: ValueCategory = ValueCategory::Pointer;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_dynamic(&**self)
    }
}

impl<B: ?Sized + Object> Decode for Box<B> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        dec.read_dynamic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_pointers_are_equal() {
        let a: Ptr<u32> = Ptr::null();
        let b: Ptr<u32> = Ptr::default();
        assert!(a.is_null());
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_clone_shares_the_target() {
        let a = Ptr::new(5u32);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        *b.get().unwrap().write().unwrap() = 9;
        assert_eq!(*a.get().unwrap().read().unwrap(), 9);
    }

    #[test]
    fn test_structural_equality_without_identity() {
        let a = Ptr::new(String::from("x"));
        let b = Ptr::new(String::from("x"));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, Ptr::null());
    }

    #[test]
    fn test_poly_ptr_identity_through_base() {
        trait Named: Object {}
        impl Named for u8 {}

        let concrete = shared(3u8);
        let a: PolyPtr<dyn Named> = PolyPtr::from_shared(concrete.clone() as Shared<dyn Named>);
        let b: PolyPtr<dyn Named> = PolyPtr::from_shared(concrete as Shared<dyn Named>);
        assert!(a.ptr_eq(&b));
        assert!(format!("{a:?}").starts_with("PolyPtr(0x"));
    }

    #[test]
    fn test_object_identity_display() {
        assert_eq!(ObjectIdentity::new(4).to_string(), "4");
        assert_eq!(ObjectIdentity::new(4).into_inner(), 4);
    }
}
