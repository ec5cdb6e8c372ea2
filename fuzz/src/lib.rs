//! Fuzz models for chardev.
//!
//! Each module drives the real implementation with arbitrary op
//! sequences and checks its behavior against a trivially-correct shadow
//! model plus the documented invariants.

pub mod buffer_model;
pub mod lifecycle_model;
