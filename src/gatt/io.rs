use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use structbuf::{Pack, StructBuf};

use bleat_const::Uuid;

use crate::att::{ErrorCode, Handle};
use crate::host::ConnHandle;
use crate::util::name_of;

/// I/O callback result type. Error codes are reported to the peer unchanged.
pub type IoResult = std::result::Result<(), ErrorCode>;

/// Characteristic value or descriptor access behavior.
#[derive(Clone)]
#[repr(transparent)]
pub struct Io(Arc<dyn for<'a> Fn(IoReq<'a>) -> IoResult + Send + Sync>);

impl Io {
    /// Returns an I/O callback that calls `f`.
    #[inline(always)]
    pub fn new(f: impl Fn(IoReq) -> IoResult + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Returns an I/O callback for a method of `T`.
    #[inline(always)]
    pub fn with<T: Send + Sync + 'static>(
        this: &Arc<T>,
        f: impl Fn(&T, IoReq) -> IoResult + Send + Sync + 'static,
    ) -> Self {
        let this = Arc::clone(this);
        Self(Arc::new(move |req: IoReq| f(&this, req)))
    }

    /// Executes the callback.
    #[inline(always)]
    pub(super) fn call(&self, req: IoReq) -> IoResult {
        (self.0)(req)
    }
}

impl Debug for Io {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        (f.debug_tuple(name_of!(Io)).field(&Arc::as_ptr(&self.0))).finish()
    }
}

impl<T: Fn(IoReq) -> IoResult + Send + Sync + 'static> From<T> for Io {
    #[inline(always)]
    fn from(f: T) -> Self {
        Self(Arc::new(f))
    }
}

/// Characteristic value or descriptor I/O request.
///
/// ```
/// use bleat::att::ErrorCode;
/// use bleat::gatt::{Io, IoReq};
///
/// let io = Io::new(|req| match req {
///     IoReq::Read(r) => r.complete([0x64_u8]),
///     IoReq::Write(w) => match w.value() {
///         [_] => Ok(()),
///         _ => Err(ErrorCode::InvalidAttributeValueLength),
///     },
/// });
/// # drop(io);
/// ```
#[derive(Debug)]
pub enum IoReq<'a> {
    Read(&'a mut ReadReq<'a>),
    Write(&'a WriteReq<'a>),
}

/// Server characteristic value or descriptor read request. The value is
/// appended to a response buffer owned by the caller and is truncated to the
/// space remaining in that buffer.
#[derive(Debug)]
pub struct ReadReq<'a> {
    pub(super) cn: ConnHandle,
    pub(super) hdl: Handle,
    pub(super) uuid: Uuid,
    pub(super) buf: &'a mut StructBuf,
    pub(super) start: usize,
}

impl<'a> ReadReq<'a> {
    /// Creates a read request that appends to `buf`.
    #[inline]
    pub(super) fn new(cn: ConnHandle, hdl: Handle, uuid: Uuid, buf: &'a mut StructBuf) -> Self {
        let start = buf.len();
        Self {
            cn,
            hdl,
            uuid,
            buf,
            start,
        }
    }

    /// Returns the connection of the requesting client.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnHandle {
        self.cn
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the attribute type.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the number of value bytes that can still be provided.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.lim() - self.buf.len()
    }

    /// Returns the number of value bytes provided so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len() - self.start
    }

    /// Returns whether no value bytes were provided.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Provides the complete attribute value, replacing anything provided
    /// earlier. The value is truncated to fit within the MTU.
    #[inline]
    pub fn complete(&mut self, v: impl AsRef<[u8]>) -> IoResult {
        self.buf.truncate(self.start);
        self.append(v)
    }

    /// Appends to the attribute value. The value is truncated to fit within
    /// the MTU.
    #[inline]
    pub fn append(&mut self, v: impl AsRef<[u8]>) -> IoResult {
        let v = v.as_ref();
        let n = v.len().min(self.remaining());
        self.buf.append().put(&v[..n]);
        Ok(())
    }
}

/// Server characteristic value or descriptor write request.
#[derive(Debug)]
pub struct WriteReq<'a> {
    pub(super) cn: ConnHandle,
    pub(super) hdl: Handle,
    pub(super) uuid: Uuid,
    pub(super) val: &'a [u8],
}

impl<'a> WriteReq<'a> {
    /// Returns the connection of the requesting client.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnHandle {
        self.cn
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the attribute type.
    #[inline(always)]
    #[must_use]
    pub const fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns the written value.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.val
    }

    /// Copies the written value into `dst`. Returns
    /// `InvalidAttributeValueLength` if the lengths differ.
    #[inline]
    pub fn update(&self, mut dst: impl AsMut<[u8]>) -> IoResult {
        let dst = dst.as_mut();
        if dst.len() != self.val.len() {
            return Err(ErrorCode::InvalidAttributeValueLength);
        }
        dst.copy_from_slice(self.val);
        Ok(())
    }
}

impl<'a> AsRef<[u8]> for WriteReq<'a> {
    #[inline(always)]
    fn as_ref(&self) -> &'a [u8] {
        self.val
    }
}
