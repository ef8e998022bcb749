//! Fixed-layout little-endian PDU codecs ([Vol 3] Part F, Section 3.4).

use structbuf::{Pack, Packer, StructBuf, Unpack};

use bleat_const::{Uuid, Uuid16, UuidPacker};

use super::*;

/// Encoding and decoding of one PDU type. Encoded PDUs start with the
/// opcode; the parameter encoding follows.
pub trait Codec<'a>: Sized {
    /// PDU opcode.
    const OP: Opcode;
    /// Minimum encoded length, including the opcode.
    const MIN_LEN: usize;

    /// Returns the encoded length, including the opcode.
    #[inline]
    fn encoded_len(&self) -> usize {
        Self::MIN_LEN
    }

    /// Checks semantic preconditions before anything is written.
    #[inline]
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Writes PDU parameters after the opcode.
    fn pack(&self, p: &mut Packer);

    /// Reads PDU parameters. `params` excludes the opcode and is at least
    /// `MIN_LEN - 1` bytes long.
    fn unpack(params: &'a [u8]) -> Result<Self>;

    /// Appends the PDU to `buf`. Nothing is written on error.
    fn encode(&self, buf: &mut StructBuf) -> Result<()> {
        self.validate()?;
        if buf.lim() - buf.len() < self.encoded_len() {
            return Err(Error::MessageTooLarge);
        }
        self.pack(buf.append().u8(Self::OP));
        Ok(())
    }

    /// Decodes a complete PDU, including the opcode.
    fn decode(pdu: &'a [u8]) -> Result<Self> {
        if pdu.len() < Self::MIN_LEN {
            return Err(Error::BadLength {
                have: pdu.len(),
                need: Self::MIN_LEN,
            });
        }
        if pdu[0] != u8::from(Self::OP) {
            return Err(Error::BadData);
        }
        Self::unpack(&pdu[1..])
    }
}

impl Codec<'_> for ErrorRsp {
    const OP: Opcode = Opcode::ErrorRsp;
    const MIN_LEN: usize = 5;

    fn pack(&self, p: &mut Packer) {
        p.u8(self.req)
            .u16(self.hdl.map_or(0, u16::from))
            .u8(self.err);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        let mut p = params.unpack();
        Ok(Self {
            req: p.u8(),
            hdl: Handle::new(p.u16()),
            err: ErrorCode::try_from(p.u8()).unwrap_or(ErrorCode::UnlikelyError),
        })
    }
}

/// `ATT_EXCHANGE_MTU_REQ` PDU ([Vol 3] Part F, Section 3.4.2.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExchangeMtuReq {
    pub mtu: u16,
}

impl Codec<'_> for ExchangeMtuReq {
    const OP: Opcode = Opcode::ExchangeMtuReq;
    const MIN_LEN: usize = 3;

    fn validate(&self) -> Result<()> {
        if self.mtu < DEFAULT_MTU {
            return Err(Error::InvalidArgument("MTU below the ATT default"));
        }
        Ok(())
    }

    fn pack(&self, p: &mut Packer) {
        p.u16(self.mtu);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        Ok(Self {
            mtu: params.unpack().u16(),
        })
    }
}

/// `ATT_EXCHANGE_MTU_RSP` PDU ([Vol 3] Part F, Section 3.4.2.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExchangeMtuRsp {
    pub mtu: u16,
}

impl Codec<'_> for ExchangeMtuRsp {
    const OP: Opcode = Opcode::ExchangeMtuRsp;
    const MIN_LEN: usize = 3;

    fn pack(&self, p: &mut Packer) {
        p.u16(self.mtu);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        Ok(Self {
            mtu: params.unpack().u16(),
        })
    }
}

/// Validates a raw request handle range.
#[inline]
fn check_range(start: u16, end: u16) -> Result<HandleRange> {
    HandleRange::new(start, end).ok_or(Error::InvalidArgument("invalid handle range"))
}

/// `ATT_FIND_INFORMATION_REQ` PDU ([Vol 3] Part F, Section 3.4.3.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FindInformationReq {
    pub start: u16,
    pub end: u16,
}

impl Codec<'_> for FindInformationReq {
    const OP: Opcode = Opcode::FindInformationReq;
    const MIN_LEN: usize = 5;

    fn validate(&self) -> Result<()> {
        check_range(self.start, self.end).map(|_| ())
    }

    fn pack(&self, p: &mut Packer) {
        p.u16(self.start).u16(self.end);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        let mut p = params.unpack();
        Ok(Self {
            start: p.u16(),
            end: p.u16(),
        })
    }
}

/// Handle/UUID pair format of `ATT_FIND_INFORMATION_RSP`.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum InfoFormat {
    Uuid16 = 0x01,
    Uuid128 = 0x02,
}

impl InfoFormat {
    /// Returns the size of one handle/UUID pair.
    #[inline]
    #[must_use]
    pub const fn pair_len(self) -> usize {
        match self {
            Self::Uuid16 => 2 + Uuid16::BYTES,
            Self::Uuid128 => 2 + Uuid::BYTES,
        }
    }
}

/// `ATT_FIND_INFORMATION_RSP` PDU ([Vol 3] Part F, Section 3.4.3.2).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FindInformationRsp<'a> {
    pub fmt: InfoFormat,
    /// Concatenated handle/UUID pairs.
    pub data: &'a [u8],
}

impl<'a> FindInformationRsp<'a> {
    /// Returns an iterator over handle/UUID pairs. A truncated or invalid pair
    /// yields [`Error::BadData`] and ends the iteration.
    #[inline]
    #[must_use]
    pub const fn entries(&self) -> InfoEntries<'a> {
        InfoEntries {
            fmt: self.fmt,
            rest: self.data,
        }
    }
}

impl<'a> Codec<'a> for FindInformationRsp<'a> {
    const OP: Opcode = Opcode::FindInformationRsp;
    const MIN_LEN: usize = 2;

    #[inline]
    fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.data.len()
    }

    fn pack(&self, p: &mut Packer) {
        p.u8(self.fmt).put(self.data);
    }

    fn unpack(params: &'a [u8]) -> Result<Self> {
        let fmt = InfoFormat::try_from(params[0]).map_err(|_| Error::BadData)?;
        Ok(Self {
            fmt,
            data: &params[1..],
        })
    }
}

/// Iterator over `ATT_FIND_INFORMATION_RSP` handle/UUID pairs.
#[derive(Clone, Debug)]
pub struct InfoEntries<'a> {
    fmt: InfoFormat,
    rest: &'a [u8],
}

impl Iterator for InfoEntries<'_> {
    type Item = Result<(Handle, Uuid)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let n = self.fmt.pair_len();
        if self.rest.len() < n {
            self.rest = &[];
            return Some(Err(Error::BadData));
        }
        let (pair, rest) = self.rest.split_at(n);
        self.rest = rest;
        match (Handle::new(pair.unpack().u16()), Uuid::from_le_slice(&pair[2..])) {
            (Some(hdl), Some(uuid)) => Some(Ok((hdl, uuid))),
            _ => {
                self.rest = &[];
                Some(Err(Error::BadData))
            }
        }
    }
}

/// `ATT_READ_REQ` PDU ([Vol 3] Part F, Section 3.4.4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadReq {
    pub hdl: u16,
}

impl Codec<'_> for ReadReq {
    const OP: Opcode = Opcode::ReadReq;
    const MIN_LEN: usize = 3;

    fn validate(&self) -> Result<()> {
        match Handle::new(self.hdl) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidArgument("invalid handle")),
        }
    }

    fn pack(&self, p: &mut Packer) {
        p.u16(self.hdl);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        Ok(Self {
            hdl: params.unpack().u16(),
        })
    }
}

/// `ATT_READ_RSP` PDU ([Vol 3] Part F, Section 3.4.4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadRsp<'a> {
    pub val: &'a [u8],
}

impl<'a> Codec<'a> for ReadRsp<'a> {
    const OP: Opcode = Opcode::ReadRsp;
    const MIN_LEN: usize = 1;

    #[inline]
    fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.val.len()
    }

    fn pack(&self, p: &mut Packer) {
        p.put(self.val);
    }

    fn unpack(params: &'a [u8]) -> Result<Self> {
        Ok(Self { val: params })
    }
}

/// `ATT_READ_BY_GROUP_TYPE_REQ` PDU ([Vol 3] Part F, Section 3.4.4.9).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadByGroupTypeReq {
    pub start: u16,
    pub end: u16,
    pub uuid: Uuid,
}

impl Codec<'_> for ReadByGroupTypeReq {
    const OP: Opcode = Opcode::ReadByGroupTypeReq;
    const MIN_LEN: usize = 5 + Uuid16::BYTES;

    #[inline]
    fn encoded_len(&self) -> usize {
        5 + self.uuid.packed_len()
    }

    fn validate(&self) -> Result<()> {
        check_range(self.start, self.end).map(|_| ())
    }

    fn pack(&self, p: &mut Packer) {
        p.u16(self.start).u16(self.end).uuid(self.uuid);
    }

    fn unpack(params: &[u8]) -> Result<Self> {
        let mut p = params.unpack();
        let (start, end) = (p.u16(), p.u16());
        let uuid = Uuid::from_le_slice(&params[4..]).ok_or(Error::BadData)?;
        Ok(Self { start, end, uuid })
    }
}

/// `ATT_READ_BY_GROUP_TYPE_RSP` PDU ([Vol 3] Part F, Section 3.4.4.10).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadByGroupTypeRsp<'a> {
    /// Length of each attribute data record.
    pub len: u8,
    pub data: &'a [u8],
}

impl<'a> ReadByGroupTypeRsp<'a> {
    /// Minimum attribute data record length (two handles).
    pub const MIN_RECORD_LEN: u8 = 4;

    /// Returns an iterator over attribute data records. Each record is
    /// bounds-checked against the remaining data before it is read.
    #[inline]
    #[must_use]
    pub const fn records(&self) -> GroupRecords<'a> {
        GroupRecords {
            len: self.len as usize,
            rest: self.data,
        }
    }
}

impl<'a> Codec<'a> for ReadByGroupTypeRsp<'a> {
    const OP: Opcode = Opcode::ReadByGroupTypeRsp;
    const MIN_LEN: usize = 2;

    #[inline]
    fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.data.len()
    }

    fn validate(&self) -> Result<()> {
        if self.len < Self::MIN_RECORD_LEN {
            return Err(Error::InvalidArgument("record length too small"));
        }
        Ok(())
    }

    fn pack(&self, p: &mut Packer) {
        p.u8(self.len).put(self.data);
    }

    fn unpack(params: &'a [u8]) -> Result<Self> {
        let len = params[0];
        if len < Self::MIN_RECORD_LEN {
            return Err(Error::BadData);
        }
        Ok(Self {
            len,
            data: &params[1..],
        })
    }
}

/// Attribute data record of `ATT_READ_BY_GROUP_TYPE_RSP`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GroupAttr<'a> {
    pub hdl: Handle,
    pub end: Handle,
    pub val: &'a [u8],
}

/// Iterator over `ATT_READ_BY_GROUP_TYPE_RSP` attribute data records.
#[derive(Clone, Debug)]
pub struct GroupRecords<'a> {
    len: usize,
    rest: &'a [u8],
}

impl<'a> Iterator for GroupRecords<'a> {
    type Item = Result<GroupAttr<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        if self.rest.len() < self.len {
            let have = self.rest.len();
            self.rest = &[];
            return Some(Err(Error::BadLength {
                have,
                need: self.len,
            }));
        }
        let (rec, rest) = self.rest.split_at(self.len);
        self.rest = rest;
        let mut p = rec.unpack();
        match (Handle::new(p.u16()), Handle::new(p.u16())) {
            (Some(hdl), Some(end)) if hdl <= end => Some(Ok(GroupAttr {
                hdl,
                end,
                val: &rec[4..],
            })),
            _ => {
                self.rest = &[];
                Some(Err(Error::BadData))
            }
        }
    }
}

/// `ATT_WRITE_REQ` PDU ([Vol 3] Part F, Section 3.4.5.1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteReq<'a> {
    pub hdl: u16,
    pub val: &'a [u8],
}

impl<'a> Codec<'a> for WriteReq<'a> {
    const OP: Opcode = Opcode::WriteReq;
    const MIN_LEN: usize = 3;

    #[inline]
    fn encoded_len(&self) -> usize {
        Self::MIN_LEN + self.val.len()
    }

    fn validate(&self) -> Result<()> {
        match Handle::new(self.hdl) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidArgument("invalid handle")),
        }
    }

    fn pack(&self, p: &mut Packer) {
        p.u16(self.hdl).put(self.val);
    }

    fn unpack(params: &'a [u8]) -> Result<Self> {
        Ok(Self {
            hdl: params.unpack().u16(),
            val: &params[2..],
        })
    }
}

/// `ATT_WRITE_RSP` PDU ([Vol 3] Part F, Section 3.4.5.2).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WriteRsp;

impl Codec<'_> for WriteRsp {
    const OP: Opcode = Opcode::WriteRsp;
    const MIN_LEN: usize = 1;

    fn pack(&self, _: &mut Packer) {}

    fn unpack(_: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use bleat_const::{Declaration, Service};

    use super::*;

    fn encode<'a>(pdu: &impl Codec<'a>) -> StructBuf {
        let mut b = StructBuf::new(64);
        pdu.encode(&mut b).unwrap();
        b
    }

    #[test]
    fn exchange_mtu() {
        let b = encode(&ExchangeMtuReq { mtu: 247 });
        assert_eq!(b.as_ref(), &[0x02, 0xF7, 0x00]);
        assert_eq!(ExchangeMtuRsp::decode(&[0x03, 0x00, 0x02]).unwrap().mtu, 512);

        let mut b = StructBuf::new(64);
        assert_matches!(
            ExchangeMtuReq {
                mtu: DEFAULT_MTU - 1,
            }
            .encode(&mut b),
            Err(Error::InvalidArgument(_))
        );
        assert!(b.is_empty());
    }

    #[test]
    fn decode_length() {
        assert_matches!(
            ExchangeMtuRsp::decode(&[0x03, 0x17]),
            Err(Error::BadLength { have: 2, need: 3 })
        );
        assert_matches!(ReadReq::decode(&[]), Err(Error::BadLength { have: 0, .. }));
        assert_matches!(ExchangeMtuRsp::decode(&[0x02, 0x17, 0x00]), Err(Error::BadData));
    }

    #[test]
    fn find_information_req() {
        let b = encode(&FindInformationReq {
            start: 1,
            end: 0xFFFF,
        });
        assert_eq!(b.as_ref(), &[0x04, 0x01, 0x00, 0xFF, 0xFF]);
        for (start, end) in [(0, 5), (6, 5)] {
            let mut b = StructBuf::new(64);
            let r = FindInformationReq { start, end }.encode(&mut b);
            assert_matches!(r, Err(Error::InvalidArgument(_)));
            assert!(b.is_empty());
        }
    }

    #[test]
    fn find_information_rsp() {
        let pdu = [0x05, 0x01, 0x01, 0x00, 0x00, 0x28, 0x02, 0x00, 0x03, 0x28];
        let rsp = FindInformationRsp::decode(&pdu).unwrap();
        let v: Vec<_> = rsp.entries().map(Result::unwrap).collect();
        assert_eq!(
            v,
            [
                (Handle::new(1).unwrap(), Declaration::PrimaryService.uuid()),
                (Handle::new(2).unwrap(), Declaration::Characteristic.uuid()),
            ]
        );

        let mut pdu = vec![0x05, 0x02, 0x09, 0x00];
        pdu.extend_from_slice(&0x1234_5678_9ABC_DEF0_u128.to_le_bytes());
        let rsp = FindInformationRsp::decode(&pdu).unwrap();
        let (hdl, uuid) = rsp.entries().next().unwrap().unwrap();
        assert_eq!(hdl.get(), 9);
        assert_eq!(uuid.get(), 0x1234_5678_9ABC_DEF0);

        assert_matches!(FindInformationRsp::decode(&[0x05, 0x03]), Err(Error::BadData));
    }

    #[test]
    fn find_information_rsp_truncated() {
        let pdu = [0x05, 0x01, 0x01, 0x00, 0x00, 0x28, 0x02, 0x00, 0x03];
        let rsp = FindInformationRsp::decode(&pdu).unwrap();
        let mut it = rsp.entries();
        assert!(it.next().unwrap().is_ok());
        assert_matches!(it.next(), Some(Err(Error::BadData)));
        assert!(it.next().is_none());
    }

    #[test]
    fn read_by_group_type_req() {
        let req = ReadByGroupTypeReq {
            start: 1,
            end: 0xFFFF,
            uuid: Declaration::PrimaryService.uuid(),
        };
        let b = encode(&req);
        assert_eq!(b.as_ref(), &[0x10, 0x01, 0x00, 0xFF, 0xFF, 0x00, 0x28]);
        assert_eq!(ReadByGroupTypeReq::decode(b.as_ref()).unwrap(), req);

        let custom = Uuid::new(0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E).unwrap();
        let b = encode(&ReadByGroupTypeReq {
            uuid: custom,
            ..req
        });
        assert_eq!(b.len(), 21);
    }

    #[test]
    fn read_by_group_type_rsp() {
        let pdu = [
            0x11, 0x06, // Header
            0x01, 0x00, 0x05, 0x00, 0x00, 0x18, // Generic Access
            0x06, 0x00, 0x09, 0x00, 0x0F, 0x18, // Battery
        ];
        let rsp = ReadByGroupTypeRsp::decode(&pdu).unwrap();
        let v: Vec<_> = rsp.records().map(Result::unwrap).collect();
        assert_eq!(v.len(), 2);
        assert_eq!((v[1].hdl.get(), v[1].end.get()), (6, 9));
        assert_eq!(Uuid::from_le_slice(v[1].val), Some(Service::Battery.uuid()));

        // Header only
        let rsp = ReadByGroupTypeRsp::decode(&pdu[..2]).unwrap();
        assert!(rsp.records().next().is_none());

        // Final record shorter than the declared length
        let rsp = ReadByGroupTypeRsp::decode(&pdu[..11]).unwrap();
        let mut it = rsp.records();
        assert!(it.next().unwrap().is_ok());
        assert_matches!(it.next(), Some(Err(Error::BadLength { have: 3, need: 6 })));
        assert!(it.next().is_none());

        assert_matches!(ReadByGroupTypeRsp::decode(&[0x11, 0x03, 1, 0, 1]), Err(Error::BadData));
    }

    #[test]
    fn read_write() {
        assert_eq!(encode(&ReadReq { hdl: 0x0102 }).as_ref(), &[0x0A, 0x02, 0x01]);
        let mut b = StructBuf::new(64);
        assert_matches!(ReadReq { hdl: 0 }.encode(&mut b), Err(Error::InvalidArgument(_)));

        let w = WriteReq::decode(&[0x12, 0x03, 0x00, 0xAA, 0xBB]).unwrap();
        assert_eq!((w.hdl, w.val), (3, &[0xAA, 0xBB][..]));
        assert!(ReadRsp::decode(&[0x0B]).unwrap().val.is_empty());
        assert_eq!(encode(&WriteRsp).as_ref(), &[0x13]);
    }

    #[test]
    fn message_too_large() {
        let mut b = StructBuf::new(4);
        let r = WriteReq {
            hdl: 1,
            val: &[1, 2],
        }
        .encode(&mut b);
        assert_matches!(r, Err(Error::MessageTooLarge));
        assert!(b.is_empty());
    }

    #[test]
    fn error_rsp() {
        let e = ErrorRsp::new(Opcode::ReadReq, Handle::new(3), ErrorCode::ReadNotPermitted);
        let b = encode(&e);
        assert_eq!(b.as_ref(), &[0x01, 0x0A, 0x03, 0x00, 0x02]);
        assert_eq!(ErrorRsp::decode(b.as_ref()).unwrap(), e);
        assert_eq!(e.to_string(), "ATT ReadReq failed with ReadNotPermitted for Handle(0x0003)");
    }
}
