//! Device identities and the major-number allocator.

use std::collections::HashMap;
use std::fmt;

/// First major number handed out, start of the local/experimental range.
pub const FIRST_LOCAL_MAJOR: u32 = 240;
/// Last major number handed out, end of the local/experimental range.
pub const LAST_LOCAL_MAJOR: u32 = 254;

/// A unique numeric device identity: major class plus minor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DevId {
    major: u32,
    minor: u32,
}

impl DevId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DevId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Hands out majors from the bounded local range and remembers which
/// owner name holds each one. The range is small on purpose: running
/// out is a real condition callers must survive, not a theoretical one.
#[derive(Debug, Default)]
pub(crate) struct IdentityAllocator {
    held: HashMap<u32, String>,
}

impl IdentityAllocator {
    /// Claim the first free major for `owner`, minor 0.
    pub(crate) fn alloc(&mut self, owner: &str) -> Option<DevId> {
        for major in FIRST_LOCAL_MAJOR..=LAST_LOCAL_MAJOR {
            if !self.held.contains_key(&major) {
                self.held.insert(major, owner.to_owned());
                return Some(DevId::new(major, 0));
            }
        }
        None
    }

    /// Return an identity to the pool. Releasing an identity that is
    /// not held is a no-op; teardown must never fail.
    pub(crate) fn release(&mut self, id: DevId) {
        self.held.remove(&id.major());
    }

    pub(crate) fn held_count(&self) -> usize {
        self.held.len()
    }

    pub(crate) fn is_held(&self, id: DevId) -> bool {
        self.held.contains_key(&id.major())
    }
}
