//! Per-call errors for device access points.

use std::fmt;

/// Error returned by a single operation on an open session.
///
/// End-of-data is *not* an error: a read past `valid_len` returns
/// `Ok(0)`. The variants here are the only hard failures an access
/// point can report, and none of them invalidates the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// A copy between caller-visible memory and the device buffer could
    /// not complete. The session stays open and usable; the cursor does
    /// not advance.
    TransferFault,
    /// The device enforces exclusive open and is already open.
    Busy,
    /// The operation is not defined for this access point (e.g. a write
    /// on a mirror entry).
    Unsupported,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::TransferFault => write!(f, "transfer to/from caller memory faulted"),
            DeviceError::Busy => write!(f, "device is already open"),
            DeviceError::Unsupported => write!(f, "operation not supported on this access point"),
        }
    }
}

impl std::error::Error for DeviceError {}
