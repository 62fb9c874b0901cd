//! Declarative helpers for implementing [`Encode`](crate::Encode) and
//! [`Decode`](crate::Decode).

/// Implements `Encode` and `Decode` for a struct by visiting the listed
/// fields in order. Every field of the struct must be listed.
///
/// ```ignore
/// #[derive(Default)]
/// struct Hero { name: String, level: u8, commander: Ptr<Commander> }
/// persist_fields!(Hero { name, level, commander });
/// ```
#[macro_export]
macro_rules! persist_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Encode for $ty {
            #[allow(unused_variables)]
            fn encode(
                &self,
                enc: &mut $crate::Encoder,
            ) -> ::core::result::Result<(), $crate::SerializeError> {
                $( $crate::Encode::encode(&self.$field, enc)?; )*
                ::core::result::Result::Ok(())
            }
        }

        impl $crate::Decode for $ty {
            #[allow(unused_variables)]
            fn decode(
                dec: &mut $crate::Decoder,
            ) -> ::core::result::Result<Self, $crate::SerializeError> {
                ::core::result::Result::Ok(Self {
                    $( $field: $crate::Decode::decode(dec)?, )*
                })
            }
        }
    };
}

/// Declares a field-less enum with explicit discriminants and implements
/// `Encode`/`Decode` for it as a 32-bit signed integer. Unknown values
/// are rejected as corrupt.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$vmeta])* $variant = $value ),+
        }

        impl $crate::Encode for $name {
            const CATEGORY: $crate::ValueCategory = $crate::ValueCategory::Enumerator;

            fn encode(
                &self,
                enc: &mut $crate::Encoder,
            ) -> ::core::result::Result<(), $crate::SerializeError> {
                let raw: i32 = match self {
                    $( Self::$variant => ($value) as i32, )+
                };
                $crate::Encode::encode(&raw, enc)
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                dec: &mut $crate::Decoder,
            ) -> ::core::result::Result<Self, $crate::SerializeError> {
                let offset = dec.bytes_read();
                let raw = <i32 as $crate::Decode>::decode(dec)?;
                $(
                    if raw == ($value) as i32 {
                        return ::core::result::Result::Ok(Self::$variant);
                    }
                )+
                ::core::result::Result::Err($crate::SerializeError::corrupt(
                    ::std::format!("{} has no variant {}", ::core::stringify!($name), raw),
                    ::core::option::Option::Some(offset),
                ))
            }
        }
    };
}

/// Declares a tagged union whose variants each carry one payload and
/// implements `Encode`/`Decode` for it: a `u32` discriminant (the
/// variant's position, starting at 0) followed by the active payload.
/// Discriminants past the last variant are rejected as corrupt.
///
/// ```ignore
/// wire_union! {
///     #[derive(Debug, PartialEq)]
///     pub enum Reward {
///         Gold(u32),
///         Artifact(String),
///     }
/// }
/// ```
#[macro_export]
macro_rules! wire_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident($payload:ty) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$vmeta])* $variant($payload) ),+
        }

        impl $crate::Encode for $name {
            fn encode(
                &self,
                enc: &mut $crate::Encoder,
            ) -> ::core::result::Result<(), $crate::SerializeError> {
                #[allow(dead_code)]
                enum Alternative { $( $variant ),+ }
                match self {
                    $(
                        Self::$variant(payload) => {
                            enc.write_discriminant(Alternative::$variant as u32)?;
                            $crate::Encode::encode(payload, enc)
                        }
                    )+
                }
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                dec: &mut $crate::Decoder,
            ) -> ::core::result::Result<Self, $crate::SerializeError> {
                #[allow(dead_code)]
                enum Alternative { $( $variant ),+ }
                let alternatives = [$( Alternative::$variant as u32 ),+].len() as u32;
                let index = dec.read_discriminant(alternatives)?;
                $(
                    if index == Alternative::$variant as u32 {
                        return ::core::result::Result::Ok(Self::$variant(
                            <$payload as $crate::Decode>::decode(dec)?,
                        ));
                    }
                )+
                ::core::result::Result::Err(dec.corrupt(::std::format!(
                    "{} has no alternative {}",
                    ::core::stringify!($name),
                    index
                )))
            }
        }
    };
}

/// Registers concrete types as implementations of a base interface.
///
/// ```ignore
/// register_derived!(registry, dyn Creature => Dragon, Peasant);
/// ```
#[macro_export]
macro_rules! register_derived {
    ($registry:expr, $base:ty => $($derived:ty),+ $(,)?) => {{
        $(
            $registry.register_derived::<$base, $derived>(
                |shared| -> $crate::Shared<$base> { shared },
                |boxed| -> ::std::boxed::Box<$base> { boxed },
            );
        )+
    }};
}
