//! chardev-core: the data plane of the chardev registry.
//!
//! This crate holds everything a live device needs to move bytes:
//!
//! - [`DevBuffer`] / [`SharedBuffer`]: a fixed-capacity byte store with a
//!   `valid_len` watermark marking how much of it holds real data
//! - [`UserSrc`] / [`UserDst`]: the copy seam between caller-visible
//!   memory and the device buffer
//! - [`DeviceSession`]: a bidirectional, offset-stateful open handle
//! - [`MirrorSession`]: a read-only, one-shot snapshot handle
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   read/write    ┌───────────────────────────┐
//! │ DeviceSession│────────────────►│ SharedBuffer              │
//! │  cursor: 42  │                 │  ┌─────────────────────┐  │
//! └──────────────┘                 │  │ bytes [0, capacity) │  │
//! ┌──────────────┐   read once     │  │ valid_len watermark │  │
//! │ MirrorSession│────────────────►│  └─────────────────────┘  │
//! │  consumed: no│                 │  (one coarse RwLock)      │
//! └──────────────┘                 └───────────────────────────┘
//! ```
//!
//! Cursors live in the sessions, not in the buffer, so independent
//! callers never corrupt each other's position. The only shared mutable
//! state is the byte store and its `valid_len` watermark.
//!
//! Registration and identity live in `chardev-registry`; this crate is
//! deliberately ignorant of names, majors, and lifecycles.

mod buffer;
mod device;
mod error;
mod uaccess;

pub use buffer::{DevBuffer, SharedBuffer, DEFAULT_CAPACITY};
pub use device::{DeviceSession, DeviceState, MirrorSession, OpenPolicy};
pub use error::DeviceError;
pub use uaccess::{UserDst, UserSrc};
