//! chardev: a user-space character-device registry.
//!
//! A small service that reproduces the lifecycle and I/O discipline of
//! a classic character-device driver without a kernel underneath: a
//! driver acquires a device identity, registers a buffered device,
//! claims a class and a node name, and publishes a read-only mirror
//! entry. Any failure along the way unwinds everything already acquired
//! in reverse order; so does teardown.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use chardev::prelude::*;
//!
//! let registry = Arc::new(DeviceRegistry::new());
//! let driver = chardev::initialize(registry.clone(), DriverConfig::default()).unwrap();
//!
//! // Write through one session, read through another.
//! let device = registry.device("chrdev0").unwrap();
//! let mut writer = device.open().unwrap();
//! writer.write(&b"hello"[..]).unwrap();
//!
//! let mut reader = device.open().unwrap();
//! let mut buf = [0u8; 16];
//! let n = reader.read(&mut buf[..]).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//!
//! // The mirror gives one point-in-time view, then end-of-data.
//! let mut mirror = registry.mirror("chrdev").unwrap().open();
//! let n = mirror.read(&mut buf[..]).unwrap();
//! assert_eq!(&buf[..n], b"hello");
//! assert_eq!(mirror.read(&mut buf[..]).unwrap(), 0);
//!
//! driver.teardown();
//! assert!(registry.is_empty());
//! ```
//!
//! # Crates
//!
//! - `chardev-core`: the data plane (buffer, copy seam, sessions)
//! - `chardev-registry`: the control plane (identities, tables,
//!   lifecycle)
//! - this crate: re-exports plus a prelude
//!
//! # Error Handling
//!
//! Per-call failures ([`DeviceError`]) never invalidate a session, and
//! end-of-data is `Ok(0)` rather than an error. Lifecycle failures
//! ([`InitError`]) name the stage that failed and always arrive after a
//! complete rollback.

pub use chardev_core::{
    DevBuffer, DeviceError, DeviceSession, DeviceState, MirrorSession, OpenPolicy, SharedBuffer,
    UserDst, UserSrc, DEFAULT_CAPACITY,
};
pub use chardev_registry::{
    initialize, DevId, DeviceHandle, DeviceRegistry, DriverConfig, InitError, LiveDriver,
    MirrorHandle, RegistryError, RegistryOps, Stage,
};

/// Convenient imports for typical use.
///
/// ```
/// use chardev::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        initialize, DeviceError, DeviceRegistry, DriverConfig, OpenPolicy, RegistryOps,
    };
}
