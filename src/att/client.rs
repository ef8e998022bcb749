//! ATT client: discovered attribute cache and request/response handling.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use bleat_const::Uuid;

use crate::host::{BufPool, Cid, ConnHandle, Pool, Slot, Transport};
use crate::{SyncMutex, SyncMutexGuard};

use super::*;

/// Callbacks through which the client reports responses to the upper layer.
/// All methods default to doing nothing.
#[allow(unused_variables)]
pub trait Events: Send + Sync {
    /// Called after the peer answers an MTU exchange. `mtu` is the resulting
    /// channel MTU.
    fn mtu_negotiated(&self, cn: ConnHandle, mtu: u16) {}

    /// Called once per Find-Information response with the parse status and
    /// the last handle that was successfully added to the cache.
    fn find_info_complete(&self, cn: ConnHandle, status: Result<()>, last: Option<Handle>) {}

    /// Called for each record of a Read-By-Group-Type response.
    fn group_attr(&self, cn: ConnHandle, attr: &GroupAttr<'_>) {}

    /// Called with the value from a Read response.
    fn read_rsp(&self, cn: ConnHandle, val: &[u8]) {}

    /// Called when the peer rejects a request.
    fn error_rsp(&self, cn: ConnHandle, rsp: ErrorRsp) {}
}

/// Cached remote attribute.
#[derive(Debug)]
struct CacheEntry {
    uuid: Uuid,
    _slot: Slot,
}

/// Per-connection cache of remote attribute handles and types, kept in
/// ascending handle order without duplicates. Every entry holds one slot of
/// the shared entry pool.
#[derive(Debug)]
pub struct Cache {
    entries: BTreeMap<Handle, CacheEntry>,
    pool: Arc<Pool>,
}

impl Cache {
    /// Creates an empty cache backed by `pool`.
    #[inline]
    #[must_use]
    pub const fn new(pool: Arc<Pool>) -> Self {
        Self {
            entries: BTreeMap::new(),
            pool,
        }
    }

    /// Adds an entry. Existing entries are never replaced.
    pub fn insert(&mut self, hdl: Handle, uuid: impl Into<Uuid>) -> Result<()> {
        use std::collections::btree_map::Entry::*;
        match self.entries.entry(hdl) {
            Occupied(_) => Err(Error::AlreadyExists(hdl)),
            Vacant(e) => {
                let slot = self.pool.alloc().ok_or(Error::OutOfMemory)?;
                e.insert(CacheEntry {
                    uuid: uuid.into(),
                    _slot: slot,
                });
                Ok(())
            }
        }
    }

    /// Returns the lowest handle of an attribute with type `uuid`. 16-bit
    /// UUIDs are compared in their 128-bit form.
    #[must_use]
    pub fn find_by_uuid(&self, uuid: impl Into<Uuid>) -> Option<Handle> {
        let uuid = uuid.into();
        (self.entries.iter())
            .find(|&(_, e)| e.uuid == uuid)
            .map(|(&h, _)| h)
    }

    /// Returns the type of the attribute with handle `hdl`.
    #[inline]
    #[must_use]
    pub fn get(&self, hdl: Handle) -> Option<Uuid> {
        self.entries.get(&hdl).map(|e| e.uuid)
    }

    /// Returns an iterator over cached entries in ascending handle order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Handle, Uuid)> + '_ {
        self.entries.iter().map(|(&h, e)| (h, e.uuid))
    }

    /// Returns the number of cached entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries, returning their slots to the pool.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// ATT client of one connection. Requests are transmitted without waiting for
/// a response; responses are delivered through [`Client::recv`].
#[derive(Debug)]
pub struct Client<T> {
    cn: ConnHandle,
    tr: Arc<T>,
    bufs: Arc<BufPool>,
    cache: SyncMutex<Cache>,
}

impl<T: Transport> Client<T> {
    /// Creates a client for connection `cn` with an empty cache.
    #[must_use]
    pub fn new(cn: ConnHandle, tr: Arc<T>, bufs: Arc<BufPool>, entries: Arc<Pool>) -> Self {
        Self {
            cn,
            tr,
            bufs,
            cache: SyncMutex::new(Cache::new(entries)),
        }
    }

    /// Returns the connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnHandle {
        self.cn
    }

    /// Locks and returns the attribute cache.
    #[inline]
    pub fn cache(&self) -> SyncMutexGuard<'_, Cache> {
        self.cache.lock()
    }

    /// Sends `ATT_EXCHANGE_MTU_REQ` ([Vol 3] Part F, Section 3.4.2.1).
    pub fn exchange_mtu(&self, mtu: u16) -> Result<()> {
        self.send(&ExchangeMtuReq { mtu })
    }

    /// Sends `ATT_FIND_INFORMATION_REQ` ([Vol 3] Part F, Section 3.4.3.1).
    pub fn find_information(&self, start: u16, end: u16) -> Result<()> {
        self.send(&FindInformationReq { start, end })
    }

    /// Sends `ATT_READ_REQ` ([Vol 3] Part F, Section 3.4.4.3).
    pub fn read(&self, hdl: u16) -> Result<()> {
        self.send(&ReadReq { hdl })
    }

    /// Sends `ATT_READ_BY_GROUP_TYPE_REQ` ([Vol 3] Part F, Section 3.4.4.9).
    pub fn read_by_group_type(&self, start: u16, end: u16, uuid: impl Into<Uuid>) -> Result<()> {
        self.send(&ReadByGroupTypeReq {
            start,
            end,
            uuid: uuid.into(),
        })
    }

    /// Sends `ATT_WRITE_REQ` ([Vol 3] Part F, Section 3.4.5.1).
    pub fn write(&self, hdl: u16, val: &[u8]) -> Result<()> {
        self.send(&WriteReq { hdl, val })
    }

    /// Validates, encodes, and transmits a request. The buffer is released on
    /// every failure path.
    fn send<'a, P: Codec<'a>>(&self, pdu: &P) -> Result<()> {
        pdu.validate()?;
        let ch = (self.tr.find_channel(self.cn, Cid::ATT)).ok_or(Error::NotConnected(self.cn))?;
        let mut buf = (self.bufs.acquire(pdu.encoded_len())).ok_or(Error::OutOfMemory)?;
        pdu.encode(&mut buf)?;
        trace!("{} -> {}", P::OP, ch);
        Ok(self.tr.transmit(ch, buf)?)
    }

    /// Handles a response PDU received from the peer. A malformed PDU fails
    /// only the current exchange.
    pub fn recv(&self, pdu: &[u8], ev: &impl Events) -> Result<()> {
        let Some(&op) = pdu.first() else {
            warn!("Empty ATT PDU from {}", self.cn);
            return Err(Error::BadLength { have: 0, need: 1 });
        };
        let r = match Opcode::try_from(op) {
            Ok(Opcode::ErrorRsp) => ErrorRsp::decode(pdu).map(|rsp| {
                debug!("{} from {}", rsp, self.cn);
                ev.error_rsp(self.cn, rsp);
            }),
            Ok(Opcode::ExchangeMtuRsp) => self.recv_mtu(pdu, ev),
            Ok(Opcode::FindInformationRsp) => {
                let mut last = None;
                let r = self.recv_find_info(pdu, &mut last);
                ev.find_info_complete(self.cn, r.clone(), last);
                r
            }
            Ok(Opcode::ReadRsp) => ReadRsp::decode(pdu).map(|rsp| ev.read_rsp(self.cn, rsp.val)),
            Ok(Opcode::ReadByGroupTypeRsp) => self.recv_group_type(pdu, ev),
            _ => {
                warn!("Unexpected ATT opcode {op:#04X} from {}", self.cn);
                Err(Error::BadData)
            }
        };
        if let Err(ref e) = r {
            warn!("Invalid ATT response from {}: {e}", self.cn);
        }
        r
    }

    /// Handles `ATT_EXCHANGE_MTU_RSP`.
    fn recv_mtu(&self, pdu: &[u8], ev: &impl Events) -> Result<()> {
        let rsp = ExchangeMtuRsp::decode(pdu)?;
        let ch = (self.tr.find_channel(self.cn, Cid::ATT)).ok_or(Error::NotConnected(self.cn))?;
        if rsp.mtu < DEFAULT_MTU {
            warn!("Invalid MTU {} from {}", rsp.mtu, self.cn);
        }
        let peer = rsp.mtu.max(DEFAULT_MTU);
        self.tr.set_peer_mtu(ch, peer);
        let mtu = self.tr.channel_mtu(ch);
        debug!("MTU for {} is {mtu} (peer {peer})", self.cn);
        ev.mtu_negotiated(self.cn, mtu);
        Ok(())
    }

    /// Adds each `ATT_FIND_INFORMATION_RSP` pair to the cache. `last` is
    /// updated after every successful insertion.
    fn recv_find_info(&self, pdu: &[u8], last: &mut Option<Handle>) -> Result<()> {
        let rsp = FindInformationRsp::decode(pdu)?;
        let mut cache = self.cache.lock();
        for e in rsp.entries() {
            let (hdl, uuid) = e?;
            cache.insert(hdl, uuid)?;
            *last = Some(hdl);
        }
        Ok(())
    }

    /// Forwards each `ATT_READ_BY_GROUP_TYPE_RSP` record upward.
    fn recv_group_type(&self, pdu: &[u8], ev: &impl Events) -> Result<()> {
        let rsp = ReadByGroupTypeRsp::decode(pdu)?;
        for rec in rsp.records() {
            ev.group_attr(self.cn, &rec?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
