//! [`Encode`]/[`Decode`] for standard library types.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::{BuildHasher, Hash};

use crate::{Decode, Decoder, Encode, Encoder, SerializeError, ValueCategory};

/// Upper bound, in bytes, on speculative preallocation for decoded
/// containers; larger ones grow as elements actually arrive.
const PREALLOC_BYTES: usize = 64 * 1024;

/// Capacity to reserve for `len` elements of `T` announced by a length
/// prefix.
fn prealloc<T>(len: usize) -> usize {
    len.min(PREALLOC_BYTES / size_of::<T>().max(1))
}

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

impl Encode for bool {
    const CATEGORY: ValueCategory = ValueCategory::Boolean;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_u8(u8::from(*self))
    }
}

impl Decode for bool {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        match dec.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(dec.corrupt(format!("boolean byte {other}"))),
        }
    }
}

macro_rules! primitive {
    ($($ty:ty),* $(,)?) => {$(
        impl Encode for $ty {
            const CATEGORY: ValueCategory = ValueCategory::Primitive;

            fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
                enc.write_primitive(self.to_ne_bytes())
            }
        }

        impl Decode for $ty {
            fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
                Ok(<$ty>::from_ne_bytes(dec.read_primitive()?))
            }
        }
    )*};
}

primitive!(u8, u16, u32, u64, u128, i8, i16, i32, i64, i128, f32, f64);

// Pointer-sized integers travel as 64-bit values so 32- and 64-bit peers
// agree on the layout.
impl Encode for usize {
    const CATEGORY: ValueCategory = ValueCategory::Primitive;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        (*self as u64).encode(enc)
    }
}

impl Decode for usize {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let raw = u64::decode(dec)?;
        usize::try_from(raw).map_err(|_| dec.corrupt(format!("{raw} does not fit usize")))
    }
}

impl Encode for isize {
    const CATEGORY: ValueCategory = ValueCategory::Primitive;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        (*self as i64).encode(enc)
    }
}

impl Decode for isize {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let raw = i64::decode(dec)?;
        isize::try_from(raw).map_err(|_| dec.corrupt(format!("{raw} does not fit isize")))
    }
}

impl Encode for char {
    const CATEGORY: ValueCategory = ValueCategory::Primitive;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        u32::from(*self).encode(enc)
    }
}

impl Decode for char {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let raw = u32::decode(dec)?;
        char::from_u32(raw).ok_or_else(|| dec.corrupt(format!("{raw:#x} is not a scalar value")))
    }
}

impl Encode for () {
    fn encode(&self, _enc: &mut Encoder) -> Result<(), SerializeError> {
        Ok(())
    }
}

impl Decode for () {
    fn decode(_dec: &mut Decoder) -> Result<Self, SerializeError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

impl Encode for str {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        enc.write_len(self.len())?;
        enc.write_bytes(self.as_bytes())
    }
}

impl Encode for String {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        self.as_str().encode(enc)
    }
}

impl Decode for String {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let len = dec.read_len()?;
        let offset = dec.bytes_read();
        let mut bytes = vec![0u8; len];
        dec.read_bytes(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| SerializeError::corrupt(format!("string is not UTF-8: {e}"), Some(offset)))
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

fn encode_seq<'a, T, I>(enc: &mut Encoder, len: usize, items: I) -> Result<(), SerializeError>
where
    T: Encode + 'a,
    I: IntoIterator<Item = &'a T>,
{
    enc.write_len(len)?;
    for item in items {
        item.encode(enc)?;
    }
    Ok(())
}

fn decode_seq<T, C>(
    dec: &mut Decoder,
    mut push: impl FnMut(&mut C, T),
    new: impl FnOnce(usize) -> C,
) -> Result<C, SerializeError>
where
    T: Decode,
{
    let len = dec.read_len()?;
    let mut out = new(prealloc::<T>(len));
    for _ in 0..len {
        push(&mut out, T::decode(dec)?);
    }
    Ok(out)
}

impl<T: Encode> Encode for [T] {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        encode_seq(enc, self.len(), self)
    }
}

impl<T: Encode> Encode for Vec<T> {
    const CATEGORY: ValueCategory = match T::CATEGORY {
        ValueCategory::Boolean => ValueCategory::BooleanSequence,
        _ => ValueCategory::Serializable,
    };

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        self.as_slice().encode(enc)
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        decode_seq(dec, Vec::push, Vec::with_capacity)
    }
}

impl<T: Encode> Encode for VecDeque<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        encode_seq(enc, self.len(), self)
    }
}

impl<T: Decode> Decode for VecDeque<T> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        decode_seq(dec, VecDeque::push_back, VecDeque::with_capacity)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    const CATEGORY: ValueCategory = ValueCategory::FixedArray;

    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        for item in self {
            item.encode(enc)?;
        }
        Ok(())
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::decode(dec)?);
        }
        items
            .try_into()
            .map_err(|_| dec.corrupt(format!("fixed array of {N} came up short")))
    }
}

// ---------------------------------------------------------------------------
// Sets and maps
// ---------------------------------------------------------------------------

impl<T: Encode> Encode for BTreeSet<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        encode_seq(enc, self.len(), self)
    }
}

impl<T: Decode + Ord> Decode for BTreeSet<T> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        decode_seq(
            dec,
            |set: &mut BTreeSet<T>, item| {
                set.insert(item);
            },
            |_| BTreeSet::new(),
        )
    }
}

/// Hash containers are written in sorted key order so that equal
/// containers always produce equal bytes.
impl<T: Encode + Ord, S> Encode for HashSet<T, S> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        let mut items: Vec<&T> = self.iter().collect();
        items.sort();
        encode_seq(enc, items.len(), items.into_iter())
    }
}

impl<T: Decode + Eq + Hash, S: BuildHasher + Default> Decode for HashSet<T, S> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        decode_seq(
            dec,
            |set: &mut HashSet<T, S>, item| {
                set.insert(item);
            },
            |cap| HashSet::with_capacity_and_hasher(cap, S::default()),
        )
    }
}

fn encode_entries<'a, K, V, I>(
    enc: &mut Encoder,
    len: usize,
    entries: I,
) -> Result<(), SerializeError>
where
    K: Encode + 'a,
    V: Encode + 'a,
    I: IntoIterator<Item = (&'a K, &'a V)>,
{
    enc.write_len(len)?;
    for (key, value) in entries {
        key.encode(enc)?;
        value.encode(enc)?;
    }
    Ok(())
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        encode_entries(enc, self.len(), self)
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let len = dec.read_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let key = K::decode(dec)?;
            let value = V::decode(dec)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K: Encode + Ord, V: Encode, S> Encode for HashMap<K, V, S> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        let mut entries: Vec<(&K, &V)> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        encode_entries(enc, entries.len(), entries)
    }
}

impl<K, V, S> Decode for HashMap<K, V, S>
where
    K: Decode + Eq + Hash,
    V: Decode,
    S: BuildHasher + Default,
{
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        let len = dec.read_len()?;
        let mut map = HashMap::with_capacity_and_hasher(prealloc::<(K, V)>(len), S::default());
        for _ in 0..len {
            let key = K::decode(dec)?;
            let value = V::decode(dec)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

// ---------------------------------------------------------------------------
// Optionals and tuples
// ---------------------------------------------------------------------------

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        match self {
            Some(value) => {
                enc.write_u8(1)?;
                value.encode(enc)
            }
            None => enc.write_u8(0),
        }
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        match dec.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(dec)?)),
            other => Err(dec.corrupt(format!("optional presence byte {other}"))),
        }
    }
}

/// `Ok` is alternative 0, `Err` alternative 1.
impl<T: Encode, E: Encode> Encode for Result<T, E> {
    fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
        match self {
            Ok(value) => {
                enc.write_discriminant(0)?;
                value.encode(enc)
            }
            Err(error) => {
                enc.write_discriminant(1)?;
                error.encode(enc)
            }
        }
    }
}

impl<T: Decode, E: Decode> Decode for Result<T, E> {
    fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
        match dec.read_discriminant(2)? {
            0 => Ok(Ok(T::decode(dec)?)),
            _ => Ok(Err(E::decode(dec)?)),
        }
    }
}

macro_rules! tuple {
    ($($name:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode(&self, enc: &mut Encoder) -> Result<(), SerializeError> {
                let ($($name,)+) = self;
                $($name.encode(enc)?;)+
                Ok(())
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(dec: &mut Decoder) -> Result<Self, SerializeError> {
                Ok(($($name::decode(dec)?,)+))
            }
        }
    };
}

tuple!(A);
tuple!(A, B);
tuple!(A, B, C);
tuple!(A, B, C, D);
