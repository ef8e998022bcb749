use std::sync::Arc;

use smallvec::SmallVec;
use structbuf::{Pack, StructBuf};
use tracing::{debug, trace};

use bleat_const::{Declaration, Uuid, UuidPacker};

use crate::att::{
    self, Codec, ErrorCode, ErrorRsp, Handle, HandleRange, InfoFormat, Opcode, Perm, Table,
};
use crate::host::{ConnHandle, Pool, Slot};

use super::*;

/// Attribute kind and the definition that owns it. Indices refer to the
/// service, characteristic, and descriptor positions in their definitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Attr {
    Service { svc: usize },
    Include { inc: usize },
    ChrDecl { svc: usize, chr: usize },
    ChrVal { svc: usize, chr: usize },
    Dsc { svc: usize, chr: usize, dsc: usize },
}

/// Registration state of one service. `end` is the last handle of the
/// service group.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ServiceEntry {
    pub hdl: Option<Handle>,
    pub end: Option<Handle>,
}

/// Attribute access operation.
#[derive(Debug)]
pub enum Access<'a> {
    /// Append the attribute value to the buffer.
    Read(&'a mut StructBuf),
    /// Replace the attribute value.
    Write(&'a [u8]),
}

/// Client characteristic configuration of one notify/indicate-capable
/// characteristic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientCfg {
    /// Characteristic declaration handle.
    pub chr: Handle,
    pub flags: Cccd,
}

/// Per-connection client characteristic configurations. Dropping this value
/// returns its block to the server pool.
#[derive(Debug)]
pub struct ClientCfgs {
    v: SmallVec<[ClientCfg; 4]>,
    _slot: Option<Slot>,
}

impl ClientCfgs {
    /// Returns the configuration of the characteristic declared at `chr`.
    #[must_use]
    pub fn get(&self, chr: Handle) -> Option<Cccd> {
        self.v.iter().find(|c| c.chr == chr).map(|c| c.flags)
    }

    /// Updates the configuration of the characteristic declared at `chr`.
    /// Returns `false` if the characteristic is not configurable.
    pub fn set(&mut self, chr: Handle, flags: Cccd) -> bool {
        (self.v.iter_mut().find(|c| c.chr == chr)).map_or(false, |c| {
            c.flags = flags;
            true
        })
    }

    /// Returns all configurations in handle order.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[ClientCfg] {
        &self.v
    }
}

/// Registered GATT server database. Read-only after registration and shared
/// by all connections.
#[derive(Debug)]
pub struct Server {
    svcs: Vec<ServiceDef>,
    reg: Vec<ServiceEntry>,
    db: Table<Attr>,
    tmpl: Vec<ClientCfg>,
    cfg_pool: Arc<Pool>,
}

impl Server {
    /// Maximum characteristic declaration value length.
    const MAX_DECL_LEN: usize = 1 + 2 + Uuid::BYTES;

    /// Creates the server and its client configuration template.
    pub(super) fn new(
        svcs: Vec<ServiceDef>,
        reg: Vec<ServiceEntry>,
        db: Table<Attr>,
        max_cfgs: usize,
    ) -> Self {
        let mut tmpl = Vec::new();
        let mut cur = None;
        while let Some(e) = db.find_by_uuid(Declaration::Characteristic, cur) {
            cur = Some(e.handle());
            if let Attr::ChrDecl { svc, chr } = *e.access() {
                if svcs[svc].chars[chr].flags.is_configurable() {
                    tmpl.push(ClientCfg {
                        chr: e.handle(),
                        flags: Cccd::empty(),
                    });
                }
            }
        }
        let blocks = max_cfgs.checked_div(tmpl.len()).unwrap_or(0);
        debug!("GATT server with {} attribute(s), {blocks} config block(s)", db.len());
        Self {
            svcs,
            reg,
            db,
            tmpl,
            cfg_pool: Pool::new("client config", blocks),
        }
    }

    /// Returns the handle range of service `idx`.
    #[must_use]
    pub fn service(&self, idx: usize) -> Option<HandleRange> {
        let e = self.reg.get(idx)?;
        HandleRange::new(e.hdl?.get(), e.end?.get())
    }

    /// Returns the registration state of all services in definition order.
    #[inline]
    #[must_use]
    pub fn services(&self) -> &[ServiceEntry] {
        &self.reg
    }

    /// Returns the attribute table.
    #[inline(always)]
    #[must_use]
    pub const fn attrs(&self) -> &Table<Attr> {
        &self.db
    }

    /// Creates the client configuration of a new connection from the
    /// template.
    pub fn conn_init(&self) -> Result<ClientCfgs> {
        let slot = if self.tmpl.is_empty() {
            None
        } else {
            Some(self.cfg_pool.alloc().ok_or(Error::OutOfMemory)?)
        };
        Ok(ClientCfgs {
            v: SmallVec::from_slice(&self.tmpl),
            _slot: slot,
        })
    }

    /// Reads attribute `hdl`, appending its value to `buf`. Returns the value
    /// length.
    #[inline]
    pub fn read(
        &self,
        cn: ConnHandle,
        hdl: Handle,
        buf: &mut StructBuf,
    ) -> std::result::Result<usize, ErrorCode> {
        self.access(cn, hdl, Access::Read(buf))
    }

    /// Writes attribute `hdl`.
    #[inline]
    pub fn write(&self, cn: ConnHandle, hdl: Handle, val: &[u8]) -> IoResult {
        self.access(cn, hdl, Access::Write(val)).map(|_| ())
    }

    /// Performs an attribute access on behalf of client `cn`. Returns the
    /// number of value bytes read or written.
    pub fn access(
        &self,
        cn: ConnHandle,
        hdl: Handle,
        op: Access,
    ) -> std::result::Result<usize, ErrorCode> {
        let e = self.db.get(hdl).ok_or(ErrorCode::InvalidHandle)?;
        let need = match op {
            Access::Read(_) => Perm::READ,
            Access::Write(_) => Perm::WRITE,
        };
        if let Some(err) = need.check(e.perm()) {
            return Err(err);
        }
        match (*e.access(), op) {
            (Attr::Service { svc }, Access::Read(buf)) => {
                Ok(put(buf, &self.svcs[svc].uuid.to_bytes()))
            }
            (Attr::Include { inc }, Access::Read(buf)) => {
                let (Some(start), Some(end)) = (self.reg[inc].hdl, self.reg[inc].end) else {
                    return Err(ErrorCode::UnlikelyError);
                };
                let mut v = StructBuf::new(6);
                v.append().u16(start).u16(end);
                if let Some(u) = self.svcs[inc].uuid.as_u16() {
                    v.append().u16(u);
                }
                Ok(put(buf, v.as_ref()))
            }
            (Attr::ChrDecl { svc, chr }, Access::Read(buf)) => {
                let c = &self.svcs[svc].chars[chr];
                let val = hdl.next().ok_or(ErrorCode::UnlikelyError)?;
                let mut v = StructBuf::new(Self::MAX_DECL_LEN);
                v.append().u8(c.flags.props().bits()).u16(val).uuid(c.uuid);
                Ok(put(buf, v.as_ref()))
            }
            (Attr::ChrVal { svc, chr }, op) => {
                let c = &self.svcs[svc].chars[chr];
                call(c.io.as_ref(), cn, hdl, c.uuid, op)
            }
            (Attr::Dsc { svc, chr, dsc }, op) => {
                let d = &self.svcs[svc].chars[chr].descs[dsc];
                call(d.io.as_ref(), cn, hdl, d.uuid, op)
            }
            (_, Access::Write(_)) => Err(ErrorCode::WriteNotPermitted),
        }
    }

    /// Answers an ATT discovery, read, or write request, writing the response
    /// PDU to `out`. Failed requests are answered with `ATT_ERROR_RSP`. `out` is
    /// left empty for PDUs that do not require a response.
    pub fn respond(&self, cn: ConnHandle, req: &[u8], out: &mut StructBuf) -> att::Result<()> {
        out.clear();
        let Some(&op) = req.first() else {
            return Err(att::Error::BadLength { have: 0, need: 1 });
        };
        let r = match Opcode::try_from(op) {
            Ok(Opcode::FindInformationReq) => self.respond_find_info(req, out),
            Ok(Opcode::ReadReq) => self.respond_read(cn, req, out),
            Ok(Opcode::ReadByGroupTypeReq) => self.respond_group_type(req, out),
            Ok(Opcode::WriteReq) => self.respond_write(cn, req, out),
            Ok(op) if !op.is_req() => return Ok(()),
            _ => Err(ErrorRsp::new(op, None, ErrorCode::RequestNotSupported)),
        };
        if let Err(e) = r {
            debug!("{e} from {cn}");
            out.clear();
            e.encode(out)?;
        }
        Ok(())
    }

    /// Answers `ATT_FIND_INFORMATION_REQ` ([Vol 3] Part F, Section 3.4.3.1).
    /// All pairs in one response share the UUID format of the first one.
    fn respond_find_info(
        &self,
        req: &[u8],
        out: &mut StructBuf,
    ) -> std::result::Result<(), ErrorRsp> {
        let op = Opcode::FindInformationReq;
        let r = att::FindInformationReq::decode(req).map_err(|_| invalid_pdu(op))?;
        let rng = (HandleRange::new(r.start, r.end))
            .ok_or_else(|| ErrorRsp::new(op, Handle::new(r.start), ErrorCode::InvalidHandle))?;
        let start = Some(rng.start());
        let mut data = StructBuf::new(out.lim().saturating_sub(att::FindInformationRsp::MIN_LEN));
        let mut fmt = None;
        for e in (self.db.iter()).filter(|e| rng.contains(e.handle())) {
            let f = if e.typ().as_u16().is_some() {
                InfoFormat::Uuid16
            } else {
                InfoFormat::Uuid128
            };
            if *fmt.get_or_insert(f) != f || data.lim() - data.len() < f.pair_len() {
                break;
            }
            data.append().u16(e.handle()).uuid(e.typ());
        }
        let Some(fmt) = fmt.filter(|_| !data.is_empty()) else {
            return Err(ErrorRsp::new(op, start, ErrorCode::AttributeNotFound));
        };
        let rsp = att::FindInformationRsp {
            fmt,
            data: data.as_ref(),
        };
        (rsp.encode(out)).map_err(|_| ErrorRsp::new(op, start, ErrorCode::UnlikelyError))
    }

    /// Answers `ATT_READ_BY_GROUP_TYPE_REQ` for primary or secondary service
    /// discovery ([Vol 3] Part F, Section 3.4.4.9). All records in one
    /// response have the same length.
    fn respond_group_type(
        &self,
        req: &[u8],
        out: &mut StructBuf,
    ) -> std::result::Result<(), ErrorRsp> {
        let op = Opcode::ReadByGroupTypeReq;
        let r = att::ReadByGroupTypeReq::decode(req).map_err(|_| invalid_pdu(op))?;
        let rng = (HandleRange::new(r.start, r.end))
            .ok_or_else(|| ErrorRsp::new(op, Handle::new(r.start), ErrorCode::InvalidHandle))?;
        let start = Some(rng.start());
        let group = [Declaration::PrimaryService, Declaration::SecondaryService];
        if !group.iter().any(|d| d.uuid() == r.uuid) {
            return Err(ErrorRsp::new(op, start, ErrorCode::UnsupportedGroupType));
        }
        let mut data = StructBuf::new(out.lim().saturating_sub(att::ReadByGroupTypeRsp::MIN_LEN));
        let mut len = None;
        for e in (self.db.iter()).filter(|e| e.typ() == r.uuid && rng.contains(e.handle())) {
            let Attr::Service { svc } = *e.access() else {
                continue;
            };
            let uuid = self.svcs[svc].uuid;
            let end = self.reg[svc].end.unwrap_or_else(|| e.handle());
            let n = 4 + uuid.packed_len();
            if *len.get_or_insert(n) != n || data.lim() - data.len() < n {
                break;
            }
            data.append().u16(e.handle()).u16(end).uuid(uuid);
        }
        let Some(n) = len.filter(|_| !data.is_empty()) else {
            return Err(ErrorRsp::new(op, start, ErrorCode::AttributeNotFound));
        };
        #[allow(clippy::cast_possible_truncation)]
        let rsp = att::ReadByGroupTypeRsp {
            len: n as u8,
            data: data.as_ref(),
        };
        (rsp.encode(out)).map_err(|_| ErrorRsp::new(op, start, ErrorCode::UnlikelyError))
    }

    /// Answers `ATT_READ_REQ` ([Vol 3] Part F, Section 3.4.4.3).
    fn respond_read(
        &self,
        cn: ConnHandle,
        req: &[u8],
        out: &mut StructBuf,
    ) -> std::result::Result<(), ErrorRsp> {
        let op = Opcode::ReadReq;
        let r = att::ReadReq::decode(req).map_err(|_| invalid_pdu(op))?;
        let hdl = Handle::new(r.hdl).ok_or_else(|| invalid_handle(op))?;
        (att::ReadRsp { val: &[] }.encode(out))
            .map_err(|_| ErrorRsp::new(op, Some(hdl), ErrorCode::UnlikelyError))?;
        let n = (self.read(cn, hdl, out)).map_err(|e| ErrorRsp::new(op, Some(hdl), e))?;
        trace!("Read {n} byte(s) from {hdl}");
        Ok(())
    }

    /// Answers `ATT_WRITE_REQ` ([Vol 3] Part F, Section 3.4.5.1).
    fn respond_write(
        &self,
        cn: ConnHandle,
        req: &[u8],
        out: &mut StructBuf,
    ) -> std::result::Result<(), ErrorRsp> {
        let op = Opcode::WriteReq;
        let w = att::WriteReq::decode(req).map_err(|_| invalid_pdu(op))?;
        let hdl = Handle::new(w.hdl).ok_or_else(|| invalid_handle(op))?;
        (self.write(cn, hdl, w.val)).map_err(|e| ErrorRsp::new(op, Some(hdl), e))?;
        (att::WriteRsp.encode(out))
            .map_err(|_| ErrorRsp::new(op, Some(hdl), ErrorCode::UnlikelyError))
    }
}

/// Returns the error response to a request that could not be decoded.
#[inline]
fn invalid_pdu(op: Opcode) -> ErrorRsp {
    ErrorRsp::new(op, None, ErrorCode::InvalidPdu)
}

/// Returns the error response to a request for the null handle.
#[inline]
fn invalid_handle(op: Opcode) -> ErrorRsp {
    ErrorRsp::new(op, None, ErrorCode::InvalidHandle)
}

/// Appends as much of `v` as fits in `buf` and returns the number of bytes
/// written.
fn put(buf: &mut StructBuf, v: &[u8]) -> usize {
    let n = v.len().min(buf.lim() - buf.len());
    buf.append().put(&v[..n]);
    n
}

/// Translates an attribute access into a characteristic or descriptor I/O
/// request.
fn call(
    io: Option<&Io>,
    cn: ConnHandle,
    hdl: Handle,
    uuid: Uuid,
    op: Access,
) -> std::result::Result<usize, ErrorCode> {
    let io = io.ok_or(ErrorCode::UnlikelyError)?;
    match op {
        Access::Read(buf) => {
            let start = buf.len();
            io.call(IoReq::Read(&mut ReadReq::new(cn, hdl, uuid, &mut *buf)))?;
            Ok(buf.len() - start)
        }
        Access::Write(val) => {
            io.call(IoReq::Write(&WriteReq { cn, hdl, uuid, val }))?;
            Ok(val.len())
        }
    }
}
