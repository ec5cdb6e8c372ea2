//! The copy seam between caller-visible memory and the device buffer.
//!
//! In the original setting these are the kernel's address-space copy
//! primitives; here they are traits so that the transfer itself stays a
//! black box to the sessions. The only way a copy can fail is
//! [`DeviceError::TransferFault`], and plain slices never fail.
//!
//! Test code implements these traits with faulting doubles to exercise
//! the "session survives a fault" contract.

use crate::error::DeviceError;

/// A caller-visible destination for bytes read from the device.
pub trait UserDst {
    /// How many bytes the destination can accept.
    fn len(&self) -> usize;

    /// True if the destination cannot accept any bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` into the destination.
    ///
    /// Callers guarantee `src.len() <= self.len()`. On
    /// `Err(TransferFault)` the destination contents are unspecified.
    fn copy_out(&mut self, src: &[u8]) -> Result<(), DeviceError>;
}

/// A caller-visible source of bytes written to the device.
pub trait UserSrc {
    /// How many bytes the source holds.
    fn len(&self) -> usize;

    /// True if the source holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the first `dst.len()` bytes of the source into `dst`.
    ///
    /// Callers guarantee `dst.len() <= self.len()`. On
    /// `Err(TransferFault)` the device-side bytes are unspecified, but
    /// the device's `valid_len` watermark is never raised over them.
    fn copy_in(&self, dst: &mut [u8]) -> Result<(), DeviceError>;
}

impl UserDst for [u8] {
    fn len(&self) -> usize {
        self.len()
    }

    fn copy_out(&mut self, src: &[u8]) -> Result<(), DeviceError> {
        self[..src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl UserSrc for [u8] {
    fn len(&self) -> usize {
        self.len()
    }

    fn copy_in(&self, dst: &mut [u8]) -> Result<(), DeviceError> {
        dst.copy_from_slice(&self[..dst.len()]);
        Ok(())
    }
}

impl UserSrc for Vec<u8> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn copy_in(&self, dst: &mut [u8]) -> Result<(), DeviceError> {
        UserSrc::copy_in(self.as_slice(), dst)
    }
}
