use std::sync::Arc;

use structbuf::StructBuf;
use tracing::{debug, trace, warn};

use crate::att::{
    self, Client, Codec, ErrorCode, ErrorRsp, Events, ExchangeMtuReq, ExchangeMtuRsp, Opcode,
};
use crate::gatt::{self, ClientCfgs, Server};
use crate::{SyncMutex, SyncMutexGuard};

use super::*;

/// Shared host state that creates per-connection ATT clients and server
/// bindings.
#[derive(Debug)]
pub struct Host<T, E> {
    tr: Arc<T>,
    ev: Arc<E>,
    srv: Arc<Server>,
    bufs: Arc<BufPool>,
    entries: Arc<Pool>,
    cfg: Config,
}

impl<T: Transport, E: Events> Host<T, E> {
    /// Creates the host and its resource pools.
    #[must_use]
    pub fn new(cfg: Config, tr: Arc<T>, ev: Arc<E>, srv: Arc<Server>) -> Self {
        debug!("Host config: {cfg:?}");
        Self {
            bufs: Arc::new(BufPool::new(cfg.tx_bufs, cfg.max_pdu_len())),
            entries: Pool::new("client entry", cfg.client_entries),
            tr,
            ev,
            srv,
            cfg,
        }
    }

    /// Returns the local GATT server.
    #[inline(always)]
    #[must_use]
    pub const fn server(&self) -> &Arc<Server> {
        &self.srv
    }

    /// Returns the host configuration.
    #[inline(always)]
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Creates the state of a new connection. Fails with `OutOfMemory` if the
    /// client configuration pool is exhausted.
    pub fn connect(&self, cn: ConnHandle) -> gatt::Result<Conn<T, E>> {
        let cfgs = self.srv.conn_init()?;
        debug!("Connected {cn}");
        Ok(Conn {
            client: Client::new(
                cn,
                Arc::clone(&self.tr),
                Arc::clone(&self.bufs),
                Arc::clone(&self.entries),
            ),
            cfgs: SyncMutex::new(cfgs),
            tr: Arc::clone(&self.tr),
            ev: Arc::clone(&self.ev),
            srv: Arc::clone(&self.srv),
            bufs: Arc::clone(&self.bufs),
            mtu: self.cfg.mtu(),
        })
    }
}

/// State of one connection. Dropping it releases the attribute cache and the
/// client configuration block.
#[derive(Debug)]
pub struct Conn<T: Transport, E: Events> {
    client: Client<T>,
    cfgs: SyncMutex<ClientCfgs>,
    tr: Arc<T>,
    ev: Arc<E>,
    srv: Arc<Server>,
    bufs: Arc<BufPool>,
    mtu: u16,
}

impl<T: Transport, E: Events> Conn<T, E> {
    /// Returns the connection handle.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnHandle {
        self.client.conn()
    }

    /// Returns the ATT client of the connection.
    #[inline(always)]
    #[must_use]
    pub const fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Locks and returns the client characteristic configurations.
    #[inline]
    pub fn client_cfgs(&self) -> SyncMutexGuard<'_, ClientCfgs> {
        self.cfgs.lock()
    }

    /// Requests the preferred MTU from the peer.
    #[inline]
    pub fn exchange_mtu(&self) -> att::Result<()> {
        self.client.exchange_mtu(self.mtu)
    }

    /// Handles an inbound ATT PDU. Responses are passed to the client and
    /// everything else to the local server.
    pub fn recv(&self, pdu: &[u8]) -> att::Result<()> {
        let Some(&op) = pdu.first() else {
            return Err(att::Error::BadLength { have: 0, need: 1 });
        };
        match Opcode::try_from(op) {
            Ok(op) if op.is_rsp() => self.client.recv(pdu, &*self.ev),
            _ => self.serve(op, pdu),
        }
    }

    /// Closes the connection.
    #[inline]
    pub fn disconnect(self) {}

    /// Answers a peer request or command using a buffer sized to the channel
    /// MTU.
    fn serve(&self, op: u8, pdu: &[u8]) -> att::Result<()> {
        let cn = self.conn();
        let ch = (self.tr.find_channel(cn, Cid::ATT)).ok_or(att::Error::NotConnected(cn))?;
        let mut buf = (self.bufs)
            .acquire(usize::from(self.tr.channel_mtu(ch)))
            .ok_or(att::Error::OutOfMemory)?;
        if op == u8::from(Opcode::ExchangeMtuReq) {
            self.serve_mtu(ch, pdu, &mut buf)?;
        } else {
            self.srv.respond(cn, pdu, &mut buf)?;
        }
        if buf.is_empty() {
            trace!("No response to {op:#04X} from {cn}");
            return Ok(());
        }
        Ok(self.tr.transmit(ch, buf)?)
    }

    /// Answers `ATT_EXCHANGE_MTU_REQ` ([Vol 3] Part F, Section 3.4.2.1).
    fn serve_mtu(&self, ch: Chan, pdu: &[u8], out: &mut StructBuf) -> att::Result<()> {
        match ExchangeMtuReq::decode(pdu).and_then(|r| r.validate().map(|()| r)) {
            Ok(req) => {
                self.tr.set_peer_mtu(ch, req.mtu);
                debug!("Peer MTU for {} is {}", ch.cn, req.mtu);
                ExchangeMtuRsp { mtu: self.mtu }.encode(out)
            }
            Err(e) => {
                warn!("Invalid MTU request from {}: {e}", ch.cn);
                ErrorRsp::new(Opcode::ExchangeMtuReq, None, ErrorCode::InvalidPdu).encode(out)
            }
        }
    }
}

impl<T: Transport, E: Events> Drop for Conn<T, E> {
    fn drop(&mut self) {
        let mut cache = self.client.cache();
        let n = cache.len();
        cache.clear();
        debug!("Disconnected {} ({n} cached attribute(s) released)", self.conn());
    }
}
