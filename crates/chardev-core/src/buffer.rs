//! The shared device buffer.
//!
//! A `DevBuffer` is a fixed-capacity byte store plus a `valid_len`
//! watermark: the prefix of the storage that currently holds meaningful
//! data. All offsets are caller-supplied; every out-of-range request
//! resolves to a shorter (possibly empty) transfer, never to a fault.
//!
//! `SharedBuffer` wraps a `DevBuffer` in one coarse `RwLock` and is the
//! handle cloned into every access point. Each individual call is
//! atomic under the lock, but nothing orders calls from different
//! sessions against each other: a reader that races a writer over the
//! same range may observe a mix of old and new bytes across *calls*.
//! That hazard is inherited from the reference design and is not
//! papered over here.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DeviceError;
use crate::uaccess::{UserDst, UserSrc};

/// Default buffer capacity, matching the reference devices.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A fixed-capacity byte store with a valid-length watermark.
#[derive(Debug)]
pub struct DevBuffer {
    data: Box<[u8]>,
    valid_len: usize,
}

impl DevBuffer {
    /// Create a zeroed buffer with the given capacity. The capacity is
    /// fixed for the buffer's lifetime.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity].into_boxed_slice(),
            valid_len: 0,
        }
    }

    /// Fixed capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// How many bytes currently hold meaningful data.
    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// Copy `min(src.len(), capacity - offset)` bytes into storage at
    /// `offset` and return the count. Returns 0 when
    /// `offset >= capacity`. Raises `valid_len` to cover the written
    /// range.
    pub fn write_at(&mut self, offset: usize, src: &[u8]) -> usize {
        let n = src.len().min(self.capacity().saturating_sub(offset));
        if n == 0 {
            return 0;
        }
        self.data[offset..offset + n].copy_from_slice(&src[..n]);
        self.valid_len = self.valid_len.max(offset + n);
        n
    }

    /// Copy `min(dst.len(), valid_len - offset)` bytes from storage at
    /// `offset` into `dst` and return the count. Returns 0 when
    /// `offset >= valid_len`. Never reads past the watermark.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.valid_len.saturating_sub(offset));
        if n == 0 {
            return 0;
        }
        dst[..n].copy_from_slice(&self.data[offset..offset + n]);
        n
    }

    /// Drop the watermark back to zero. Storage is left in place; it is
    /// unreachable through `read_at` until rewritten.
    pub fn reset(&mut self) {
        self.valid_len = 0;
    }
}

/// A cloneable handle to a [`DevBuffer`] behind one coarse lock.
///
/// This is the only resource mutated by more than one component: every
/// access point holds a clone, and the buffer itself is freed when the
/// last clone drops.
#[derive(Debug, Clone)]
pub struct SharedBuffer {
    inner: Arc<RwLock<DevBuffer>>,
}

impl SharedBuffer {
    /// Create a buffer with the given fixed capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(DevBuffer::new(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    pub fn valid_len(&self) -> usize {
        self.inner.read().valid_len()
    }

    /// See [`DevBuffer::write_at`].
    pub fn write_at(&self, offset: usize, src: &[u8]) -> usize {
        self.inner.write().write_at(offset, src)
    }

    /// See [`DevBuffer::read_at`].
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        self.inner.read().read_at(offset, dst)
    }

    /// See [`DevBuffer::reset`].
    pub fn reset(&self) {
        self.inner.write().reset()
    }

    /// Copy from a caller-visible source into storage at `offset`,
    /// clamped to capacity. Holds the write lock for the duration of
    /// the copy. On a transfer fault the watermark is not raised.
    pub fn copy_in_at<S>(&self, offset: usize, src: &S) -> Result<usize, DeviceError>
    where
        S: UserSrc + ?Sized,
    {
        let mut guard = self.inner.write();
        let n = src.len().min(guard.capacity().saturating_sub(offset));
        if n == 0 {
            return Ok(0);
        }
        src.copy_in(&mut guard.data[offset..offset + n])?;
        guard.valid_len = guard.valid_len.max(offset + n);
        Ok(n)
    }

    /// Copy from storage at `offset` into a caller-visible destination,
    /// clamped to the watermark. Holds the read lock for the duration
    /// of the copy.
    pub fn copy_out_at<D>(&self, offset: usize, dst: &mut D) -> Result<usize, DeviceError>
    where
        D: UserDst + ?Sized,
    {
        let guard = self.inner.read();
        let n = dst.len().min(guard.valid_len.saturating_sub(offset));
        if n == 0 {
            return Ok(0);
        }
        dst.copy_out(&guard.data[offset..offset + n])?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_buffer_is_empty() {
        let buf = DevBuffer::new(16);
        assert_eq!(buf.capacity(), 16);
        assert_eq!(buf.valid_len(), 0);

        let mut dst = [0u8; 16];
        assert_eq!(buf.read_at(0, &mut dst), 0);
    }

    #[test]
    fn write_clamps_to_capacity() {
        let mut buf = DevBuffer::new(16);

        // Two bytes of room left: exactly two bytes land.
        assert_eq!(buf.write_at(14, &[0xaa; 10]), 2);
        assert_eq!(buf.valid_len(), 16);

        // At capacity: zero transfer, not a fault.
        assert_eq!(buf.write_at(16, &[0xbb; 4]), 0);
        assert_eq!(buf.write_at(usize::MAX, &[0xbb; 4]), 0);
        assert_eq!(buf.valid_len(), 16);
    }

    #[test]
    fn read_clamps_to_valid_len() {
        let mut buf = DevBuffer::new(16);
        buf.write_at(0, &[1, 2, 3]);

        let mut dst = [0u8; 16];
        assert_eq!(buf.read_at(0, &mut dst), 3);
        assert_eq!(&dst[..3], &[1, 2, 3]);

        // Past the watermark: end-of-data.
        assert_eq!(buf.read_at(3, &mut dst), 0);
        assert_eq!(buf.read_at(100, &mut dst), 0);
    }

    #[test]
    fn watermark_only_grows_under_writes() {
        let mut buf = DevBuffer::new(16);
        buf.write_at(0, &[0xff; 8]);
        assert_eq!(buf.valid_len(), 8);

        // A rewrite of an early range must not shrink the watermark.
        buf.write_at(0, &[0x11; 2]);
        assert_eq!(buf.valid_len(), 8);

        // A sparse write extends it.
        buf.write_at(10, &[0x22; 2]);
        assert_eq!(buf.valid_len(), 12);
    }

    #[test]
    fn reset_drops_watermark() {
        let mut buf = DevBuffer::new(16);
        buf.write_at(0, &[1, 2, 3]);
        buf.reset();
        assert_eq!(buf.valid_len(), 0);

        let mut dst = [0u8; 4];
        assert_eq!(buf.read_at(0, &mut dst), 0);
    }

    #[test]
    fn shared_handle_sees_writes_from_clones() {
        let a = SharedBuffer::new(16);
        let b = a.clone();

        assert_eq!(a.write_at(0, &[7, 8, 9]), 3);

        let mut dst = [0u8; 3];
        assert_eq!(b.read_at(0, &mut dst), 3);
        assert_eq!(dst, [7, 8, 9]);
    }

    #[test]
    fn copy_in_clamps_like_write_at() {
        let buf = SharedBuffer::new(8);
        let n = buf.copy_in_at(6, &[0xcc; 10][..]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf.valid_len(), 8);
        assert_eq!(buf.copy_in_at(8, &[0xcc; 4][..]).unwrap(), 0);
    }
}
