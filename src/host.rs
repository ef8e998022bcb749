//! Host-side glue between the attribute layers and the platform transport.

use std::fmt::{Debug, Display, Formatter};

use crate::util::name_of;

pub use {config::*, conn::*, pool::*};

mod config;
mod conn;
#[cfg(test)]
mod mock;
mod pool;

#[cfg(test)]
pub(crate) use mock::*;

/// Transport errors reported by the platform.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("transport failure: {0}")]
    Failed(&'static str),
}

/// Common host result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Connection handle assigned by the controller ([Vol 4] Part E, Section
/// 5.3.1).
#[derive(
    Clone,
    Copy,
    Default,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ConnHandle(pub u16);

impl Debug for ConnHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#05X})", name_of!(ConnHandle), self.0)
    }
}

impl Display for ConnHandle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// L2CAP channel identifier ([Vol 3] Part A, Section 2.1).
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Cid(pub u16);

impl Cid {
    /// Attribute protocol fixed channel.
    pub const ATT: Self = Self(0x0004);
}

/// Logical channel of a connection that carries one protocol.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Chan {
    pub cn: ConnHandle,
    pub cid: Cid,
}

impl Display for Chan {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel {:#06X} of {}", self.cid.0, self.cn)
    }
}

/// Link-layer transport supplied by the platform. Transmission is a one-way
/// transfer of buffer ownership; responses arrive through a separate inbound
/// dispatch call, never through a blocking wait.
pub trait Transport: Debug + Send + Sync {
    /// Returns the channel carrying protocol `cid` on connection `cn` or
    /// [`None`] if the connection does not exist.
    fn find_channel(&self, cn: ConnHandle, cid: Cid) -> Option<Chan>;

    /// Queues `buf` for transmission. The transport owns the buffer after
    /// this call regardless of the outcome.
    fn transmit(&self, ch: Chan, buf: TxBuf) -> Result<()>;

    /// Returns the effective MTU of the channel.
    fn channel_mtu(&self, ch: Chan) -> u16;

    /// Records the MTU advertised by the peer.
    fn set_peer_mtu(&self, ch: Chan, mtu: u16);
}
