//! chardev-registry: the control plane of the chardev registry.
//!
//! This crate owns everything about *who a device is* rather than what
//! it stores:
//!
//! - [`DevId`]: a (major, minor) device identity
//! - [`DeviceRegistry`]: the in-process stand-in for the kernel's
//!   registration tables (identity region, device table, class and node
//!   namespaces, mirror namespace)
//! - [`RegistryOps`]: the seam the lifecycle acquires resources through
//! - [`initialize`] / [`LiveDriver`]: the five-stage bring-up with
//!   ordered rollback, and the reverse-order teardown
//!
//! # Lifecycle
//!
//! ```text
//! Unregistered ──identity──► ──device──► ──class──► ──node──► ──mirror──► Live
//!       ▲                                                                  │
//!       └────────────── reverse-order release (rollback/teardown) ◄────────┘
//! ```
//!
//! Each forward step acquires exactly one resource and pushes a guard
//! for it; any failure pops and releases every guard in reverse order
//! before the error is reported. A failed `initialize` is therefore
//! externally unobservable: the registry ends up exactly as it started.

mod identity;
mod lifecycle;
mod registry;

pub use identity::{DevId, FIRST_LOCAL_MAJOR, LAST_LOCAL_MAJOR};
pub use lifecycle::{initialize, DriverConfig, InitError, LiveDriver, Stage};
pub use registry::{DeviceHandle, DeviceRegistry, MirrorHandle, RegistryError, RegistryOps};
