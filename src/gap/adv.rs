//! Length-type-value advertising data (AD) and scan response data format:
//!
//! * [Vol 3] Part C, Section 11
//! * [Vol 6] Part B, Section 2.3.1
//! * [Core Specification Supplement] Part A, Section 1
//! * [Assigned Numbers] Section 2.3

use std::str;

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use structbuf::{Pack, StructBuf};
use tracing::trace;

use super::{Error, Result};

/// Maximum legacy advertising and scan response data length
/// ([Vol 6] Part B, Section 2.3.1.1).
pub const LEGACY_ADV_LEN: usize = 31;

/// Maximum record payload length that can be described by the length byte.
const MAX_PAYLOAD_LEN: usize = u8::MAX as usize - 1;

/// Advertising data types ([Assigned Numbers] Section 2.3).
#[derive(Clone, Copy, Debug, Eq, Hash, IntoPrimitive, PartialEq, TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum AdType {
    Flags = 0x01,
    IncompleteServiceClass16 = 0x02,
    CompleteServiceClass16 = 0x03,
    IncompleteServiceClass128 = 0x06,
    CompleteServiceClass128 = 0x07,
    ShortLocalName = 0x08,
    CompleteLocalName = 0x09,
    TxPower = 0x0A,
    Appearance = 0x19,
    ManufacturerData = 0xFF,
}

bitflags! {
    /// Advertising flags (\[CSS\] Part A, Section 1.3).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct AdvFlag: u8 {
        /// LE Limited Discoverable Mode.
        const LE_LIMITED = 1 << 0;
        /// LE General Discoverable Mode.
        const LE_GENERAL = 1 << 1;
        /// BR/EDR Not Supported.
        const NO_BREDR = 1 << 2;
    }
}

/// Advertising data builder.
#[derive(Clone, Debug)]
pub struct AdvDataMut(StructBuf);

impl AdvDataMut {
    /// Creates a legacy advertising data buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self::with_capacity(LEGACY_ADV_LEN)
    }

    /// Creates an advertising data buffer holding at most `n` bytes.
    #[inline]
    #[must_use]
    pub const fn with_capacity(n: usize) -> Self {
        Self(StructBuf::new(n))
    }

    /// Appends a `[length][type][payload]` record. Nothing is written if the
    /// record does not fit.
    pub fn append(&mut self, typ: impl Into<u8>, v: &[u8]) -> Result<&mut Self> {
        if v.len() > MAX_PAYLOAD_LEN || self.0.lim() - self.0.len() < 2 + v.len() {
            return Err(Error::MessageTooLarge);
        }
        #[allow(clippy::cast_possible_truncation)]
        let n = v.len() as u8 + 1;
        self.0.append().u8(n).u8(typ).put(v);
        Ok(self)
    }

    /// Appends advertising flags (\[CSS\] Part A, Section 1.3).
    #[inline]
    pub fn flags(&mut self, v: AdvFlag) -> Result<&mut Self> {
        self.append(AdType::Flags, &[v.bits()])
    }

    /// Appends either shortened or complete local device name
    /// (\[CSS\] Part A, Section 1.2).
    #[inline]
    pub fn local_name(&mut self, complete: bool, v: impl AsRef<[u8]>) -> Result<&mut Self> {
        let typ = if complete {
            AdType::CompleteLocalName
        } else {
            AdType::ShortLocalName
        };
        self.append(typ, v.as_ref())
    }

    /// Appends TX power level in dBm (\[CSS\] Part A, Section 1.5).
    #[inline]
    pub fn tx_power(&mut self, dbm: i8) -> Result<&mut Self> {
        self.append(AdType::TxPower, &dbm.to_le_bytes())
    }

    /// Appends manufacturer-specific data. The payload starts with the
    /// company identifier (\[CSS\] Part A, Section 1.4).
    #[inline]
    pub fn manufacturer_data(&mut self, v: &[u8]) -> Result<&mut Self> {
        self.append(AdType::ManufacturerData, v)
    }

    /// Replaces the buffer contents with the records of `f`. The buffer is
    /// left empty if the fields do not fit.
    pub fn set(&mut self, f: &AdFields) -> Result<()> {
        self.0.clear();
        let r = self.set_fields(f);
        if r.is_err() {
            self.0.clear();
        }
        r
    }

    fn set_fields(&mut self, f: &AdFields) -> Result<()> {
        if let Some(v) = f.flags {
            self.flags(v)?;
        }
        if let Some(v) = f.name.filter(|v| !v.is_empty()) {
            self.local_name(f.name_complete, v)?;
        }
        if let Some(v) = f.tx_power {
            self.tx_power(v)?;
        }
        if let Some(v) = f.mfg_data {
            self.manufacturer_data(v)?;
        }
        Ok(())
    }

    /// Returns an iterator over the encoded records.
    #[inline]
    #[must_use]
    pub fn records(&self) -> Records<'_> {
        Records(self.0.as_ref())
    }

    /// Returns the number of encoded bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the buffer is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Removes all records.
    #[inline]
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Returns the final advertising data buffer.
    #[allow(clippy::missing_const_for_fn)]
    #[inline]
    #[must_use]
    pub fn get(self) -> StructBuf {
        self.0
    }
}

impl Default for AdvDataMut {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<[u8]> for AdvDataMut {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

/// One advertising data record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AdRecord<'a> {
    /// Raw record type.
    pub typ: u8,
    pub data: &'a [u8],
}

impl AdRecord<'_> {
    /// Returns the record type if it is known.
    #[inline]
    #[must_use]
    pub fn ad_type(&self) -> Option<AdType> {
        AdType::try_from(self.typ).ok()
    }
}

/// Iterator over advertising data records. A zero length byte marks the end
/// of significant data. Iteration stops after the first error.
#[derive(Clone, Debug)]
pub struct Records<'a>(&'a [u8]);

impl<'a> Records<'a> {
    /// Returns an iterator over the records in `b`.
    #[inline]
    #[must_use]
    pub const fn new(b: &'a [u8]) -> Self {
        Self(b)
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<AdRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&n, rest) = self.0.split_first()?;
        let n = usize::from(n);
        if n == 0 {
            self.0 = &[];
            return None;
        }
        if rest.len() < n {
            self.0 = &[];
            return Some(Err(Error::BadLength {
                have: rest.len(),
                need: n,
            }));
        }
        let (rec, tail) = rest.split_at(n);
        self.0 = tail;
        let (&typ, data) = rec.split_first()?;
        Some(Ok(AdRecord { typ, data }))
    }
}

/// Decoded advertising fields. Names and manufacturer data borrow from the
/// source buffer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct AdFields<'a> {
    pub flags: Option<AdvFlag>,
    pub name: Option<&'a [u8]>,
    pub name_complete: bool,
    pub tx_power: Option<i8>,
    pub mfg_data: Option<&'a [u8]>,
}

impl<'a> AdFields<'a> {
    /// Parses advertising or scan response data. Unknown record types are
    /// skipped.
    pub fn parse(b: &'a [u8]) -> Result<Self> {
        let mut f = Self::default();
        for r in Records::new(b) {
            let r = r?;
            match r.ad_type() {
                Some(AdType::Flags) => {
                    let &[v] = r.data else {
                        return Err(Error::BadData);
                    };
                    f.flags = Some(AdvFlag::from_bits_retain(v));
                }
                Some(AdType::ShortLocalName) => (f.name, f.name_complete) = (Some(r.data), false),
                Some(AdType::CompleteLocalName) => (f.name, f.name_complete) = (Some(r.data), true),
                Some(AdType::TxPower) => {
                    let &[v] = r.data else {
                        return Err(Error::BadData);
                    };
                    f.tx_power = Some(i8::from_le_bytes([v]));
                }
                Some(AdType::ManufacturerData) => {
                    if r.data.len() < 2 {
                        return Err(Error::BadData);
                    }
                    f.mfg_data = Some(r.data);
                }
                _ => trace!("Skipping advertising record {:#04X}", r.typ),
            }
        }
        Ok(f)
    }

    /// Returns the local name if it is valid UTF-8.
    #[inline]
    #[must_use]
    pub fn name_str(&self) -> Option<&'a str> {
        self.name.and_then(|v| str::from_utf8(v).ok())
    }

    /// Returns the company identifier of the manufacturer-specific data.
    #[must_use]
    pub fn company_id(&self) -> Option<u16> {
        match self.mfg_data? {
            &[a, b, ..] => Some(u16::from_le_bytes([a, b])),
            _ => None,
        }
    }
}
