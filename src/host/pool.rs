use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use structbuf::{Pack, StructBuf};
use tracing::{trace, warn};

/// Bounded resource pool. Each allocated [`Slot`] accounts for one unit of
/// capacity until it is dropped. Exhaustion is a recoverable condition.
#[derive(Debug)]
pub struct Pool {
    name: &'static str,
    cap: usize,
    used: AtomicUsize,
}

impl Pool {
    /// Creates a pool with `cap` slots.
    #[must_use]
    pub fn new(name: &'static str, cap: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            cap,
            used: AtomicUsize::new(0),
        })
    }

    /// Allocates one slot or returns [`None`] if the pool is exhausted.
    #[must_use]
    pub fn alloc(self: &Arc<Self>) -> Option<Slot> {
        let r = (self.used).fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n < self.cap).then_some(n + 1)
        });
        if r.is_err() {
            warn!("{} pool exhausted ({} slots)", self.name, self.cap);
            return None;
        }
        Some(Slot(Arc::clone(self)))
    }

    /// Returns the pool capacity.
    #[inline(always)]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.cap
    }

    /// Returns the number of allocated slots.
    #[inline]
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Returns the number of free slots.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.cap - self.in_use()
    }
}

/// Allocated pool slot. Dropping the slot returns it to the pool.
#[derive(Debug)]
#[must_use]
pub struct Slot(Arc<Pool>);

impl Drop for Slot {
    #[inline]
    fn drop(&mut self) {
        let prev = self.0.used.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "{} pool underflow", self.0.name);
    }
}

/// Pool of outbound packet buffers.
#[derive(Debug)]
pub struct BufPool {
    slots: Arc<Pool>,
    max_len: usize,
}

impl BufPool {
    /// Creates a pool of `n` buffers, each holding at most `max_len` bytes.
    #[must_use]
    pub fn new(n: usize, max_len: usize) -> Self {
        Self {
            slots: Pool::new("tx buffer", n),
            max_len,
        }
    }

    /// Acquires an empty buffer that can hold up to `lim` bytes. Returns
    /// [`None`] if the pool is exhausted.
    #[must_use]
    pub fn acquire(&self, lim: usize) -> Option<TxBuf> {
        let lim = lim.min(self.max_len);
        let slot = self.slots.alloc()?;
        trace!("Acquired {lim}-byte tx buffer");
        Some(TxBuf {
            buf: StructBuf::new(lim),
            _slot: slot,
        })
    }

    /// Returns the number of buffers that can still be acquired.
    #[inline]
    #[must_use]
    pub fn available(&self) -> usize {
        self.slots.available()
    }
}

/// Outbound packet buffer. The buffer is released back to its pool when
/// dropped, whether or not it was transmitted.
#[derive(Debug)]
pub struct TxBuf {
    buf: StructBuf,
    _slot: Slot,
}

impl TxBuf {
    /// Extends the buffer by `n` zero bytes and returns the offset of the new
    /// region, or [`None`] if the buffer limit would be exceeded.
    #[must_use]
    pub fn extend(&mut self, n: usize) -> Option<usize> {
        let off = self.buf.len();
        if self.buf.lim() - off < n {
            return None;
        }
        let mut p = self.buf.append();
        for _ in 0..n {
            p.u8(0_u8);
        }
        Some(off)
    }
}

impl AsRef<[u8]> for TxBuf {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        self.buf.as_ref()
    }
}

impl Deref for TxBuf {
    type Target = StructBuf;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for TxBuf {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion() {
        let p = Pool::new("test", 2);
        let a = p.alloc().unwrap();
        let _b = p.alloc().unwrap();
        assert!(p.alloc().is_none());
        assert_eq!(p.in_use(), 2);
        drop(a);
        assert_eq!(p.available(), 1);
        assert!(p.alloc().is_some());
        assert_eq!(p.in_use(), 1);
    }

    #[test]
    fn buf_release() {
        let bp = BufPool::new(1, 23);
        let mut b = bp.acquire(64).unwrap();
        assert_eq!(b.lim(), 23);
        assert!(bp.acquire(23).is_none());
        assert_eq!(b.extend(3), Some(0));
        assert_eq!(b.extend(20), Some(3));
        assert_eq!(b.extend(1), None);
        assert_eq!(b.as_ref(), &[0; 23]);
        drop(b);
        assert_eq!(bp.available(), 1);
    }
}
