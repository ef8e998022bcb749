use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::num::{NonZeroU128, NonZeroU16};

use num_enum::TryFromPrimitive;
use structbuf::{Packer, Unpack};

const SHIFT: u32 = u128::BITS - u32::BITS;
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_16: u128 = !((u16::MAX as u128) << SHIFT);

/// 16- or 128-bit UUID in canonical 128-bit form ([Vol 3] Part B, Section
/// 2.5.1). The zero UUID is not representable.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// UUID size in bytes.
    pub const BYTES: usize = std::mem::size_of::<Self>();

    /// Creates a UUID from a `u128`. Returns [`None`] for the null UUID.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Decodes a little-endian 16- or 128-bit UUID. Any other length, or a
    /// zero value, returns [`None`].
    #[inline]
    #[must_use]
    pub fn from_le_slice(v: &[u8]) -> Option<Self> {
        match v.len() {
            Self::BYTES => Self::new(v.unpack().u128()),
            Uuid16::BYTES => Uuid16::new(v.unpack().u16()).map(Uuid16::as_uuid),
            _ => None,
        }
    }

    /// Returns the UUID type. Returns [`UuidType::NonSig`] for UUIDs outside
    /// the Bluetooth base range.
    #[inline]
    #[must_use]
    pub fn typ(self) -> UuidType {
        self.as_uuid16().map_or(UuidType::NonSig, Uuid16::typ)
    }

    /// Returns the 16-bit alias of the UUID or [`None`] if it cannot be
    /// represented in 16 bits without loss.
    #[inline]
    #[must_use]
    pub fn as_uuid16(self) -> Option<Uuid16> {
        self.as_u16().and_then(Uuid16::new)
    }

    /// Returns the raw 16-bit alias of the UUID.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        (self.0.get() & MASK_16 == BASE && v > 0).then_some(v)
    }

    /// Returns the raw 128-bit value.
    #[inline(always)]
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0.get()
    }

    /// Returns the size of the shortest lossless encoding.
    #[inline]
    #[must_use]
    pub fn packed_len(self) -> usize {
        if self.as_u16().is_some() {
            Uuid16::BYTES
        } else {
            Self::BYTES
        }
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0.get().to_le_bytes()
    }
}

impl From<Uuid16> for Uuid {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.as_uuid()
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_possible_truncation)]
        if let Some(v) = self.as_u16() {
            write!(f, "{v:#06X}")
        } else {
            let v = self.0.get();
            write!(
                f,
                "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
                (v >> 96) as u32,
                (v >> 80) as u16,
                (v >> 64) as u16,
                (v >> 48) as u16,
                (v & ((1 << 48) - 1)) as u64
            )
        }
    }
}

impl Display for Uuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.typ() {
            UuidType::NonSig => Debug::fmt(self, f),
            typ => Debug::fmt(&typ, f),
        }
    }
}

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid16(NonZeroU16);

impl Uuid16 {
    /// UUID size in bytes.
    pub const BYTES: usize = std::mem::size_of::<Self>();

    /// Creates a 16-bit SIG UUID from a `u16`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the UUID type.
    #[must_use]
    pub fn typ(self) -> UuidType {
        #[inline(always)]
        fn is<T: TryFromPrimitive<Primitive = u16>>(
            u: u16,
            f: impl FnOnce(T) -> UuidType,
        ) -> UuidType {
            T::try_from_primitive(u).map_or(UuidType::Unknown(u), f)
        }
        let u = self.0.get();
        match u >> 8 {
            0x18 => is(u, UuidType::Service),
            0x28 => is(u, UuidType::Declaration),
            0x29 => is(u, UuidType::Descriptor),
            0x2A | 0x2B => is(u, UuidType::Characteristic),
            _ => UuidType::Unknown(u),
        }
    }

    /// Returns the 128-bit UUID representation.
    #[inline]
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        // SAFETY: BASE is non-zero
        unsafe { Uuid(NonZeroU128::new_unchecked((self.0.get() as u128) << SHIFT | BASE)) }
    }

    /// Returns the raw 16-bit UUID value.
    #[inline(always)]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0.get()
    }

    /// Returns the UUID as a little-endian byte array.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0.get().to_le_bytes()
    }
}

impl Debug for Uuid16 {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Uuid16 {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.typ(), f)
    }
}

#[allow(clippy::derived_hash_with_manual_eq)]
impl Hash for Uuid16 {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_uuid().hash(state);
    }
}

impl PartialEq<Uuid> for Uuid16 {
    #[inline(always)]
    fn eq(&self, rhs: &Uuid) -> bool {
        self.as_uuid() == *rhs
    }
}

impl PartialEq<Uuid16> for Uuid {
    #[inline(always)]
    fn eq(&self, rhs: &Uuid16) -> bool {
        *self == rhs.as_uuid()
    }
}

impl From<Uuid16> for u16 {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.raw()
    }
}

/// Assigned 16-bit UUID category.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum UuidType {
    Service(Service),
    Declaration(Declaration),
    Descriptor(Descriptor),
    Characteristic(Characteristic),
    Unknown(u16),
    NonSig,
}

impl From<Uuid> for UuidType {
    #[inline(always)]
    fn from(u: Uuid) -> Self {
        u.typ()
    }
}

impl Display for UuidType {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// Packer extension functions.
pub trait UuidPacker {
    /// Writes the shortest lossless encoding of the UUID.
    fn uuid(&mut self, u: impl Into<Uuid>) -> &mut Self;
    /// Writes the full 128-bit encoding of the UUID.
    fn uuid128(&mut self, u: impl Into<Uuid>) -> &mut Self;
}

impl UuidPacker for Packer<'_> {
    #[inline]
    fn uuid(&mut self, u: impl Into<Uuid>) -> &mut Self {
        let u = u.into();
        match u.as_u16() {
            Some(u) => self.u16(u),
            None => self.u128(u),
        }
    }

    #[inline]
    fn uuid128(&mut self, u: impl Into<Uuid>) -> &mut Self {
        self.u128(u.into())
    }
}

/// Creates an assigned 16-bit SIG UUID from a non-zero `u16`.
#[inline]
#[must_use]
const fn uuid16(v: u16) -> Uuid16 {
    // SAFETY: All crate uses guarantee that v != 0
    Uuid16(unsafe { NonZeroU16::new_unchecked(v) })
}

/// Defines a 16-bit UUID enum with conversions to [`Uuid`] and [`Uuid16`].
macro_rules! uuid16_enum {
    (
        $(#[$outer:meta])*
        $vis:vis enum $typ:ident {
            $($item:ident = $uuid:literal,)+
        }
    ) => {
        $(#[$outer])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Eq,
            Ord,
            PartialEq,
            PartialOrd,
            ::num_enum::IntoPrimitive,
            ::num_enum::TryFromPrimitive,
        )]
        #[cfg_attr(test, derive(enum_iterator::Sequence))]
        #[non_exhaustive]
        #[repr(u16)]
        $vis enum $typ {
            $($item = $uuid,)+
        }

        impl $typ {
            ::paste::paste! {$(
                pub const [<$item:snake:upper>]: $crate::Uuid16 = Self::$item.uuid16();
            )+}

            /// Returns the `Uuid` representation of the variant.
            #[inline]
            #[must_use]
            pub const fn uuid(self) -> $crate::Uuid {
                self.uuid16().as_uuid()
            }

            /// Returns the `Uuid16` representation of the variant.
            #[inline(always)]
            #[must_use]
            pub const fn uuid16(self) -> $crate::Uuid16 {
                uuid16(self as _)
            }
        }

        impl ::core::fmt::Display for $typ {
            #[inline(always)]
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Debug::fmt(self, f)
            }
        }

        impl ::core::cmp::PartialEq<$crate::Uuid> for $typ {
            #[inline(always)]
            fn eq(&self, rhs: &$crate::Uuid) -> bool {
                self.uuid() == *rhs
            }
        }

        impl ::core::cmp::PartialEq<$typ> for $crate::Uuid {
            #[inline(always)]
            fn eq(&self, rhs: &$typ) -> bool {
                *self == rhs.uuid()
            }
        }

        impl ::core::convert::From<$typ> for $crate::Uuid {
            #[inline]
            fn from(v: $typ) -> Self {
                v.uuid()
            }
        }

        impl ::core::convert::From<$typ> for $crate::Uuid16 {
            #[inline]
            fn from(v: $typ) -> Self {
                v.uuid16()
            }
        }
    }
}

include!("uuid16.rs");

#[cfg(test)]
mod tests {
    use enum_iterator::all;
    use structbuf::{Pack, StructBuf};

    use super::*;

    #[test]
    fn uuid_type() {
        for v in all::<Service>() {
            assert_eq!(v.uuid16().typ(), UuidType::Service(v));
        }
        for v in all::<Declaration>() {
            assert_eq!(v.uuid16().typ(), UuidType::Declaration(v));
        }
        for v in all::<Descriptor>() {
            assert_eq!(v.uuid16().typ(), UuidType::Descriptor(v));
        }
        for v in all::<Characteristic>() {
            assert_eq!(v.uuid16().typ(), UuidType::Characteristic(v));
        }
        assert_eq!(uuid16(0xFFFF).typ(), UuidType::Unknown(0xFFFF));
    }

    #[test]
    fn uuid16_alias() {
        let u = Uuid::from(Declaration::Characteristic);
        assert_eq!(u.get(), 0x00002803_0000_1000_8000_00805F9B34FB);
        assert_eq!(u.as_u16(), Some(0x2803));
        assert_eq!(u.packed_len(), Uuid16::BYTES);

        // Base UUID itself has no 16-bit alias
        assert_eq!(Uuid::new(BASE).and_then(Uuid::as_uuid16), None);
        let custom = Uuid::new(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E).unwrap();
        assert_eq!(custom.as_u16(), None);
        assert_eq!(custom.packed_len(), Uuid::BYTES);
        assert_eq!(custom.typ(), UuidType::NonSig);
    }

    #[test]
    fn from_le_slice() {
        assert_eq!(Uuid::from_le_slice(&[0x00, 0x28]), Some(Declaration::PrimaryService.uuid()));
        let u = Uuid::new(0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10).unwrap();
        assert_eq!(Uuid::from_le_slice(&u.to_bytes()), Some(u));
        assert_eq!(Uuid::from_le_slice(&[0, 0]), None);
        assert_eq!(Uuid::from_le_slice(&[1, 2, 3]), None);
    }

    #[test]
    fn packer() {
        let mut b = StructBuf::new(32);
        b.append().uuid(Service::Battery).uuid128(Service::Battery);
        assert_eq!(b.len(), 18);
        assert_eq!(&b[..2], &[0x0F, 0x18]);
        assert_eq!(&b[2..], &Service::Battery.uuid().to_bytes());
    }
}
