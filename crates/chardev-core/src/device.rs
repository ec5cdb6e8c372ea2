//! Access-point sessions.
//!
//! A device exposes two kinds of open handles:
//!
//! - [`DeviceSession`]: bidirectional and offset-stateful. The cursor
//!   lives in the session, starts at 0 on open, and only ever moves
//!   forward. Reads stop at the buffer's watermark; writes stop at its
//!   capacity.
//! - [`MirrorSession`]: a read-only, one-shot snapshot from offset 0.
//!   Once a read on the handle transfers bytes, every later read
//!   returns end-of-data no matter how much was left, so a caller
//!   always gets one consistent view rather than a stream.
//!
//! Dropping a session is always safe: it frees only the session's own
//! cursor state and its open slot, never the buffer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::buffer::SharedBuffer;
use crate::error::DeviceError;
use crate::uaccess::{UserDst, UserSrc};

/// Whether a device tolerates concurrent open sessions.
///
/// The reference devices disagree on this, so it is a per-device
/// deployment choice rather than a fixed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenPolicy {
    /// Any number of concurrent sessions, each with its own cursor.
    #[default]
    Shared,
    /// A second open while a session is live fails with [`DeviceError::Busy`].
    Exclusive,
}

/// The per-device state an open session hangs off of: the shared
/// buffer, the open policy, and a live-session count.
///
/// Sessions hold an `Arc` to this, so unregistering the device while
/// sessions are open is fine; the buffer outlives every session.
#[derive(Debug)]
pub struct DeviceState {
    buffer: SharedBuffer,
    policy: OpenPolicy,
    open_sessions: AtomicU32,
}

impl DeviceState {
    pub fn new(buffer: SharedBuffer, policy: OpenPolicy) -> Self {
        Self {
            buffer,
            policy,
            open_sessions: AtomicU32::new(0),
        }
    }

    /// Open a new session with its cursor at 0.
    ///
    /// Under [`OpenPolicy::Exclusive`] this fails with `Busy` while
    /// another session is live. No buffer side effects either way.
    pub fn open(this: &Arc<Self>) -> Result<DeviceSession, DeviceError> {
        match this.policy {
            OpenPolicy::Exclusive => {
                if this
                    .open_sessions
                    .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    return Err(DeviceError::Busy);
                }
            }
            OpenPolicy::Shared => {
                this.open_sessions.fetch_add(1, Ordering::AcqRel);
            }
        }
        tracing::debug!("device opened");
        Ok(DeviceSession {
            state: this.clone(),
            cursor: 0,
        })
    }

    /// Number of currently open sessions.
    pub fn open_sessions(&self) -> u32 {
        self.open_sessions.load(Ordering::Acquire)
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn policy(&self) -> OpenPolicy {
        self.policy
    }
}

/// A bidirectional open handle with a private forward-only cursor.
#[derive(Debug)]
pub struct DeviceSession {
    state: Arc<DeviceState>,
    cursor: usize,
}

impl DeviceSession {
    /// Read up to `dst.len()` bytes at the session cursor.
    ///
    /// Returns `Ok(0)` at end-of-data; on success the cursor advances
    /// by the returned count. A [`DeviceError::TransferFault`] leaves
    /// the cursor where it was and the session usable.
    pub fn read<D>(&mut self, dst: &mut D) -> Result<usize, DeviceError>
    where
        D: UserDst + ?Sized,
    {
        let n = self.state.buffer.copy_out_at(self.cursor, dst)?;
        self.cursor += n;
        tracing::trace!(bytes = n, cursor = self.cursor, "read from device");
        Ok(n)
    }

    /// Write up to `src.len()` bytes at the session cursor, clamped to
    /// the buffer capacity.
    ///
    /// Advances the cursor and the buffer's watermark by the returned
    /// count. `Ok(0)` means the cursor sits at capacity. Fault handling
    /// is symmetric with [`read`](Self::read).
    pub fn write<S>(&mut self, src: &S) -> Result<usize, DeviceError>
    where
        S: UserSrc + ?Sized,
    {
        let n = self.state.buffer.copy_in_at(self.cursor, src)?;
        self.cursor += n;
        tracing::trace!(bytes = n, cursor = self.cursor, "wrote to device");
        Ok(n)
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.state.open_sessions.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!("device released");
    }
}

/// A read-only, one-shot open handle onto the same buffer.
#[derive(Debug)]
pub struct MirrorSession {
    buffer: SharedBuffer,
    consumed: bool,
}

impl MirrorSession {
    pub fn new(buffer: SharedBuffer) -> Self {
        Self {
            buffer,
            consumed: false,
        }
    }

    /// Read up to `dst.len()` bytes of the valid region from offset 0.
    ///
    /// The first read that transfers bytes consumes the session: every
    /// later read returns `Ok(0)` regardless of how much it asks for.
    /// A zero-byte read (empty buffer, empty destination) does not
    /// consume, so a handle opened before any write still yields data
    /// once some arrives. A transfer fault does not consume either.
    pub fn read<D>(&mut self, dst: &mut D) -> Result<usize, DeviceError>
    where
        D: UserDst + ?Sized,
    {
        if self.consumed {
            return Ok(0);
        }
        let n = self.buffer.copy_out_at(0, dst)?;
        if n > 0 {
            self.consumed = true;
        }
        tracing::trace!(bytes = n, "read from mirror");
        Ok(n)
    }

    /// Mirror entries have no write path.
    pub fn write<S>(&mut self, _src: &S) -> Result<usize, DeviceError>
    where
        S: UserSrc + ?Sized,
    {
        Err(DeviceError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A caller destination that always faults, standing in for
    /// inaccessible memory on the far side of the copy.
    struct FaultyDst {
        len: usize,
    }

    impl UserDst for FaultyDst {
        fn len(&self) -> usize {
            self.len
        }

        fn copy_out(&mut self, _src: &[u8]) -> Result<(), DeviceError> {
            Err(DeviceError::TransferFault)
        }
    }

    struct FaultySrc {
        len: usize,
    }

    impl UserSrc for FaultySrc {
        fn len(&self) -> usize {
            self.len
        }

        fn copy_in(&self, _dst: &mut [u8]) -> Result<(), DeviceError> {
            Err(DeviceError::TransferFault)
        }
    }

    fn shared_device(capacity: usize) -> Arc<DeviceState> {
        Arc::new(DeviceState::new(
            SharedBuffer::new(capacity),
            OpenPolicy::Shared,
        ))
    }

    #[test]
    fn round_trip_through_fresh_sessions() {
        let dev = shared_device(64);

        let mut writer = DeviceState::open(&dev).unwrap();
        assert_eq!(writer.write(&[0x01, 0x02, 0x03][..]).unwrap(), 3);

        let mut reader = DeviceState::open(&dev).unwrap();
        let mut dst = [0u8; 3];
        assert_eq!(reader.read(&mut dst[..]).unwrap(), 3);
        assert_eq!(dst, [0x01, 0x02, 0x03]);
    }

    #[test]
    fn cursors_are_per_session() {
        let dev = shared_device(64);
        dev.buffer().write_at(0, &[0xab; 10]);

        let mut first = DeviceState::open(&dev).unwrap();
        let mut second = DeviceState::open(&dev).unwrap();

        let mut dst = [0u8; 5];
        assert_eq!(first.read(&mut dst[..]).unwrap(), 5);
        assert_eq!(first.cursor(), 5);

        // The second session starts from its own offset 0, not from
        // where the first one left off.
        assert_eq!(second.read(&mut dst[..]).unwrap(), 5);
        assert_eq!(second.cursor(), 5);
        assert_eq!(dst, [0xab; 5]);
    }

    #[test]
    fn end_of_data_is_ok_zero() {
        let dev = shared_device(64);
        dev.buffer().write_at(0, &[1, 2]);

        let mut session = DeviceState::open(&dev).unwrap();
        let mut dst = [0u8; 8];
        assert_eq!(session.read(&mut dst[..]).unwrap(), 2);
        assert_eq!(session.read(&mut dst[..]).unwrap(), 0);
        assert_eq!(session.read(&mut dst[..]).unwrap(), 0);
    }

    #[test]
    fn write_clamps_at_capacity_and_stops() {
        let dev = shared_device(8);
        let mut session = DeviceState::open(&dev).unwrap();

        assert_eq!(session.write(&[0x55; 6][..]).unwrap(), 6);
        assert_eq!(session.write(&[0x66; 6][..]).unwrap(), 2);
        assert_eq!(session.cursor(), 8);

        // Cursor at capacity: lawful zero-byte transfer.
        assert_eq!(session.write(&[0x77; 6][..]).unwrap(), 0);
        assert_eq!(dev.buffer().valid_len(), 8);
    }

    #[test]
    fn transfer_fault_leaves_session_usable() {
        let dev = shared_device(64);
        dev.buffer().write_at(0, &[9; 16]);

        let mut session = DeviceState::open(&dev).unwrap();
        let err = session.read(&mut FaultyDst { len: 8 }).unwrap_err();
        assert_eq!(err, DeviceError::TransferFault);
        assert_eq!(session.cursor(), 0);

        // Same session, same handle: the next copy succeeds.
        let mut dst = [0u8; 8];
        assert_eq!(session.read(&mut dst[..]).unwrap(), 8);
        assert_eq!(session.cursor(), 8);
    }

    #[test]
    fn write_fault_does_not_raise_watermark() {
        let dev = shared_device(64);
        let mut session = DeviceState::open(&dev).unwrap();

        let err = session.write(&FaultySrc { len: 8 }).unwrap_err();
        assert_eq!(err, DeviceError::TransferFault);
        assert_eq!(session.cursor(), 0);
        assert_eq!(dev.buffer().valid_len(), 0);

        assert_eq!(session.write(&[1, 2, 3][..]).unwrap(), 3);
        assert_eq!(dev.buffer().valid_len(), 3);
    }

    #[test]
    fn exclusive_policy_rejects_second_open() {
        let dev = Arc::new(DeviceState::new(
            SharedBuffer::new(16),
            OpenPolicy::Exclusive,
        ));

        assert_eq!(dev.policy(), OpenPolicy::Exclusive);
        let first = DeviceState::open(&dev).unwrap();
        assert_eq!(DeviceState::open(&dev).unwrap_err(), DeviceError::Busy);

        // Releasing the session frees the slot.
        drop(first);
        assert_eq!(dev.open_sessions(), 0);
        let _second = DeviceState::open(&dev).unwrap();
    }

    #[test]
    fn open_count_tracks_shared_sessions() {
        let dev = shared_device(16);
        let a = DeviceState::open(&dev).unwrap();
        let b = DeviceState::open(&dev).unwrap();
        assert_eq!(dev.open_sessions(), 2);
        drop(a);
        drop(b);
        assert_eq!(dev.open_sessions(), 0);
    }

    #[test]
    fn mirror_is_one_shot() {
        let buffer = SharedBuffer::new(256);
        buffer.write_at(0, &[0x42; 100]);

        let mut mirror = MirrorSession::new(buffer);
        let mut dst = [0u8; 50];
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 50);
        assert_eq!(dst, [0x42; 50]);

        // 50 valid bytes remain, but the snapshot is spent.
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 0);
    }

    #[test]
    fn mirror_empty_read_does_not_consume() {
        let buffer = SharedBuffer::new(64);
        let mut mirror = MirrorSession::new(buffer.clone());

        // Nothing valid yet: end-of-data, but the snapshot is not spent.
        let mut dst = [0u8; 8];
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 0);

        buffer.write_at(0, &[3, 4, 5]);
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 3);
        assert_eq!(&dst[..3], &[3, 4, 5]);
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 0);
    }

    #[test]
    fn mirror_fault_does_not_consume() {
        let buffer = SharedBuffer::new(64);
        buffer.write_at(0, &[7; 10]);

        let mut mirror = MirrorSession::new(buffer);
        assert_eq!(
            mirror.read(&mut FaultyDst { len: 4 }).unwrap_err(),
            DeviceError::TransferFault
        );

        let mut dst = [0u8; 10];
        assert_eq!(mirror.read(&mut dst[..]).unwrap(), 10);
        assert_eq!(dst, [7; 10]);
    }

    #[test]
    fn mirror_rejects_writes() {
        let mut mirror = MirrorSession::new(SharedBuffer::new(16));
        assert_eq!(
            mirror.write(&[1, 2, 3][..]).unwrap_err(),
            DeviceError::Unsupported
        );
    }
}
