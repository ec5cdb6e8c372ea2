//! Shadow-model check for the shared buffer and its sessions.
//!
//! The real `SharedBuffer`, `DeviceSession`, and `MirrorSession` are
//! driven by arbitrary op sequences and compared against a plain
//! `Vec<u8>` shadow. Invariants checked after every op:
//!
//! - every transfer count matches the clamping formulas exactly
//! - bytes read always match the shadow contents
//! - `valid_len <= capacity` and only `Reset` ever lowers it
//! - session cursors are monotonic and never exceed capacity
//! - the mirror yields at most one non-trivial read per open

use std::sync::Arc;

use chardev_core::{DeviceSession, DeviceState, MirrorSession, OpenPolicy, SharedBuffer};

/// Small on purpose: offsets near the edge should be common.
pub const MODEL_CAPACITY: usize = 64;

/// Operations on a buffer and its access points.
#[derive(Clone, Debug)]
pub enum BufferOp {
    /// Raw positioned write with a run of distinct fill bytes.
    WriteAt { offset: u16, len: u8 },
    /// Raw positioned read.
    ReadAt { offset: u16, len: u8 },
    /// Write at the current session cursor.
    SessionWrite { len: u8 },
    /// Read at the current session cursor.
    SessionRead { len: u8 },
    /// Drop the session and open a fresh one (cursor back to 0).
    ReopenSession,
    /// One-shot mirror read.
    MirrorRead { len: u8 },
    /// Drop the mirror session and open a fresh one.
    ReopenMirror,
    /// Drop the valid-length watermark.
    Reset,
}

struct Model {
    buffer: SharedBuffer,
    device: Arc<DeviceState>,
    session: DeviceSession,
    mirror: MirrorSession,
    /// Shadow contents; only the first `shadow_valid` bytes matter.
    shadow: Vec<u8>,
    shadow_valid: usize,
    shadow_cursor: usize,
    mirror_consumed: bool,
    /// Distinct fill byte per write so stale reads are caught.
    next_fill: u8,
}

impl Model {
    fn new() -> Self {
        let buffer = SharedBuffer::new(MODEL_CAPACITY);
        let device = Arc::new(DeviceState::new(buffer.clone(), OpenPolicy::Shared));
        let session = DeviceState::open(&device).expect("shared open cannot fail");
        let mirror = MirrorSession::new(buffer.clone());
        Self {
            buffer,
            device,
            session,
            mirror,
            shadow: vec![0u8; MODEL_CAPACITY],
            shadow_valid: 0,
            shadow_cursor: 0,
            mirror_consumed: false,
            next_fill: 1,
        }
    }

    fn fill(&mut self, len: usize) -> Vec<u8> {
        let byte = self.next_fill;
        self.next_fill = self.next_fill.wrapping_add(1);
        vec![byte; len]
    }

    fn apply(&mut self, i: usize, op: &BufferOp) -> Result<(), String> {
        match *op {
            BufferOp::WriteAt { offset, len } => {
                let offset = offset as usize;
                let src = self.fill(len as usize);
                let expected = src.len().min(MODEL_CAPACITY.saturating_sub(offset));

                let n = self.buffer.write_at(offset, &src);
                if n != expected {
                    return Err(format!("op {i}: write_at returned {n}, expected {expected}"));
                }
                if n > 0 {
                    self.shadow[offset..offset + n].copy_from_slice(&src[..n]);
                    self.shadow_valid = self.shadow_valid.max(offset + n);
                }
            }
            BufferOp::ReadAt { offset, len } => {
                let offset = offset as usize;
                let mut dst = vec![0u8; len as usize];
                let expected = dst.len().min(self.shadow_valid.saturating_sub(offset));

                let n = self.buffer.read_at(offset, &mut dst);
                if n != expected {
                    return Err(format!("op {i}: read_at returned {n}, expected {expected}"));
                }
                if n > 0 && dst[..n] != self.shadow[offset..offset + n] {
                    return Err(format!("op {i}: read_at contents diverge from shadow"));
                }
            }
            BufferOp::SessionWrite { len } => {
                let cursor = self.shadow_cursor;
                let src = self.fill(len as usize);
                let expected = src.len().min(MODEL_CAPACITY.saturating_sub(cursor));

                let n = self
                    .session
                    .write(&src[..])
                    .map_err(|e| format!("op {i}: session write failed: {e}"))?;
                if n != expected {
                    return Err(format!(
                        "op {i}: session write returned {n}, expected {expected}"
                    ));
                }
                if n > 0 {
                    self.shadow[cursor..cursor + n].copy_from_slice(&src[..n]);
                    self.shadow_cursor += n;
                    self.shadow_valid = self.shadow_valid.max(self.shadow_cursor);
                }
            }
            BufferOp::SessionRead { len } => {
                let cursor = self.shadow_cursor;
                let mut dst = vec![0u8; len as usize];
                let expected = dst.len().min(self.shadow_valid.saturating_sub(cursor));

                let n = self
                    .session
                    .read(&mut dst[..])
                    .map_err(|e| format!("op {i}: session read failed: {e}"))?;
                if n != expected {
                    return Err(format!(
                        "op {i}: session read returned {n}, expected {expected}"
                    ));
                }
                if dst[..n] != self.shadow[cursor..cursor + n] {
                    return Err(format!("op {i}: session read contents diverge from shadow"));
                }
                self.shadow_cursor += n;
            }
            BufferOp::ReopenSession => {
                self.session = DeviceState::open(&self.device).expect("shared open cannot fail");
                self.shadow_cursor = 0;
            }
            BufferOp::MirrorRead { len } => {
                let mut dst = vec![0u8; len as usize];
                let expected = if self.mirror_consumed {
                    0
                } else {
                    dst.len().min(self.shadow_valid)
                };

                let n = self
                    .mirror
                    .read(&mut dst[..])
                    .map_err(|e| format!("op {i}: mirror read failed: {e}"))?;
                if n != expected {
                    return Err(format!(
                        "op {i}: mirror read returned {n}, expected {expected}"
                    ));
                }
                if dst[..n] != self.shadow[..n] {
                    return Err(format!("op {i}: mirror read contents diverge from shadow"));
                }
                // Only a read that moved bytes spends the snapshot.
                if n > 0 {
                    self.mirror_consumed = true;
                }
            }
            BufferOp::ReopenMirror => {
                self.mirror = MirrorSession::new(self.buffer.clone());
                self.mirror_consumed = false;
            }
            BufferOp::Reset => {
                self.buffer.reset();
                self.shadow_valid = 0;
                // The session cursor deliberately stays put: it is
                // session state, not buffer state.
            }
        }
        self.check_invariants(i)
    }

    fn check_invariants(&self, i: usize) -> Result<(), String> {
        let valid = self.buffer.valid_len();
        if valid != self.shadow_valid {
            return Err(format!(
                "op {i}: valid_len {valid} diverged from shadow {}",
                self.shadow_valid
            ));
        }
        if valid > MODEL_CAPACITY {
            return Err(format!("op {i}: valid_len {valid} exceeds capacity"));
        }
        if self.session.cursor() != self.shadow_cursor {
            return Err(format!(
                "op {i}: cursor {} diverged from shadow {}",
                self.session.cursor(),
                self.shadow_cursor
            ));
        }
        if self.session.cursor() > MODEL_CAPACITY {
            return Err(format!("op {i}: cursor exceeds capacity"));
        }
        Ok(())
    }
}

/// Execute a sequence of operations and verify every invariant.
pub fn execute_and_verify(ops: &[BufferOp]) -> Result<(), String> {
    let mut model = Model::new();
    for (i, op) in ops.iter().enumerate() {
        model.apply(i, op)?;
    }
    Ok(())
}
