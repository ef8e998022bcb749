use std::sync::atomic::{AtomicBool, Ordering};

use crate::SyncMutex;

use super::*;

/// Local MTU used by [`MockTransport`].
pub(crate) const MOCK_LOCAL_MTU: u16 = 185;

/// Transport that records transmitted PDUs.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    conns: SyncMutex<Vec<ConnHandle>>,
    sent: SyncMutex<Vec<(Chan, Vec<u8>)>>,
    peer_mtu: SyncMutex<Option<u16>>,
    fail: AtomicBool,
}

impl MockTransport {
    pub fn new(cn: ConnHandle) -> Self {
        let t = Self::default();
        t.conns.lock().push(cn);
        t
    }

    /// Makes all subsequent transmissions fail.
    pub fn fail(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Drops the connection.
    pub fn disconnect(&self, cn: ConnHandle) {
        self.conns.lock().retain(|&c| c != cn);
    }

    /// Removes and returns all transmitted PDUs.
    pub fn take(&self) -> Vec<Vec<u8>> {
        self.sent.lock().drain(..).map(|(_, pdu)| pdu).collect()
    }

    pub fn peer_mtu(&self) -> Option<u16> {
        *self.peer_mtu.lock()
    }
}

impl Transport for MockTransport {
    fn find_channel(&self, cn: ConnHandle, cid: Cid) -> Option<Chan> {
        self.conns.lock().contains(&cn).then_some(Chan { cn, cid })
    }

    fn transmit(&self, ch: Chan, buf: TxBuf) -> Result<()> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(Error::Failed("mock"));
        }
        self.sent.lock().push((ch, buf.as_ref().to_vec()));
        Ok(())
    }

    fn channel_mtu(&self, _: Chan) -> u16 {
        self.peer_mtu().map_or(crate::att::DEFAULT_MTU, |m| m.min(MOCK_LOCAL_MTU))
    }

    fn set_peer_mtu(&self, _: Chan, mtu: u16) {
        *self.peer_mtu.lock() = Some(mtu);
    }
}
