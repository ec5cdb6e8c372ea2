//! The in-process registration tables.
//!
//! `DeviceRegistry` plays the role of the kernel subsystems the
//! reference drivers registered with: the chrdev region, the cdev
//! table, the class and device-node namespaces, and the procfs-style
//! mirror namespace. Each table is a plain map behind its own lock;
//! acquisition can fail (collision, exhaustion), release never can.
//!
//! The lifecycle talks to the registry through [`RegistryOps`] so tests
//! can wrap a registry and force any one stage to fail.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use chardev_core::{DeviceError, DeviceSession, DeviceState, MirrorSession, OpenPolicy, SharedBuffer};
use parking_lot::Mutex;

use crate::identity::{DevId, IdentityAllocator};

/// Why a registration table refused an acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No free major left in the local range.
    ExhaustedMajors,
    /// The identity already has a device bound to it.
    IdentityTaken(DevId),
    /// A class, node, or mirror name is already in use in its namespace.
    NameTaken(String),
    /// Node lookup failed.
    NoSuchNode(String),
    /// Mirror lookup failed.
    NoSuchMirror(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::ExhaustedMajors => write!(f, "no free major numbers left"),
            RegistryError::IdentityTaken(id) => write!(f, "identity {id} already has a device"),
            RegistryError::NameTaken(name) => write!(f, "name {name:?} already registered"),
            RegistryError::NoSuchNode(name) => write!(f, "no device node named {name:?}"),
            RegistryError::NoSuchMirror(name) => write!(f, "no mirror entry named {name:?}"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// The acquisition/release surface the lifecycle runs against.
///
/// One method pair per lifecycle stage. Every acquisition is fallible;
/// every release is infallible and idempotent, because both rollback
/// and teardown must run to completion unconditionally.
pub trait RegistryOps {
    fn alloc_identity(&self, owner: &str) -> Result<DevId, RegistryError>;
    fn release_identity(&self, id: DevId);

    fn register_device(
        &self,
        id: DevId,
        buffer: SharedBuffer,
        policy: OpenPolicy,
    ) -> Result<(), RegistryError>;
    fn unregister_device(&self, id: DevId);

    fn create_class(&self, name: &str) -> Result<(), RegistryError>;
    fn destroy_class(&self, name: &str);

    fn create_node(&self, name: &str, id: DevId) -> Result<(), RegistryError>;
    fn remove_node(&self, name: &str);

    fn create_mirror(&self, name: &str, buffer: SharedBuffer) -> Result<(), RegistryError>;
    fn remove_mirror(&self, name: &str);
}

/// The concrete registry: every table the lifecycle registers with.
#[derive(Default)]
pub struct DeviceRegistry {
    identities: Mutex<IdentityAllocator>,
    devices: Mutex<HashMap<DevId, Arc<DeviceState>>>,
    classes: Mutex<HashSet<String>>,
    nodes: Mutex<HashMap<String, DevId>>,
    mirrors: Mutex<HashMap<String, SharedBuffer>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a device node name to an openable handle.
    pub fn device(&self, node: &str) -> Result<DeviceHandle, RegistryError> {
        let id = *self
            .nodes
            .lock()
            .get(node)
            .ok_or_else(|| RegistryError::NoSuchNode(node.to_owned()))?;
        let state = self
            .devices
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchNode(node.to_owned()))?;
        Ok(DeviceHandle { id, state })
    }

    /// Resolve a mirror entry name to an openable handle.
    pub fn mirror(&self, name: &str) -> Result<MirrorHandle, RegistryError> {
        let buffer = self
            .mirrors
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NoSuchMirror(name.to_owned()))?;
        Ok(MirrorHandle { buffer })
    }

    // Inspection used by operators and tests to check for leaks.

    pub fn held_identities(&self) -> usize {
        self.identities.lock().held_count()
    }

    pub fn holds_identity(&self, id: DevId) -> bool {
        self.identities.lock().is_held(id)
    }

    pub fn registered_devices(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes.lock().contains(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.lock().contains_key(name)
    }

    pub fn has_mirror(&self, name: &str) -> bool {
        self.mirrors.lock().contains_key(name)
    }

    /// True when no table holds anything. This is the post-condition of
    /// both teardown and a failed initialize.
    pub fn is_empty(&self) -> bool {
        self.held_identities() == 0
            && self.registered_devices() == 0
            && self.classes.lock().is_empty()
            && self.nodes.lock().is_empty()
            && self.mirrors.lock().is_empty()
    }
}

impl RegistryOps for DeviceRegistry {
    fn alloc_identity(&self, owner: &str) -> Result<DevId, RegistryError> {
        self.identities
            .lock()
            .alloc(owner)
            .ok_or(RegistryError::ExhaustedMajors)
    }

    fn release_identity(&self, id: DevId) {
        self.identities.lock().release(id);
    }

    fn register_device(
        &self,
        id: DevId,
        buffer: SharedBuffer,
        policy: OpenPolicy,
    ) -> Result<(), RegistryError> {
        let mut devices = self.devices.lock();
        if devices.contains_key(&id) {
            return Err(RegistryError::IdentityTaken(id));
        }
        devices.insert(id, Arc::new(DeviceState::new(buffer, policy)));
        Ok(())
    }

    fn unregister_device(&self, id: DevId) {
        // Open sessions keep their Arc; only the table entry goes away.
        self.devices.lock().remove(&id);
    }

    fn create_class(&self, name: &str) -> Result<(), RegistryError> {
        let mut classes = self.classes.lock();
        if !classes.insert(name.to_owned()) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        Ok(())
    }

    fn destroy_class(&self, name: &str) {
        self.classes.lock().remove(name);
    }

    fn create_node(&self, name: &str, id: DevId) -> Result<(), RegistryError> {
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        nodes.insert(name.to_owned(), id);
        Ok(())
    }

    fn remove_node(&self, name: &str) {
        self.nodes.lock().remove(name);
    }

    fn create_mirror(&self, name: &str, buffer: SharedBuffer) -> Result<(), RegistryError> {
        let mut mirrors = self.mirrors.lock();
        if mirrors.contains_key(name) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        mirrors.insert(name.to_owned(), buffer);
        Ok(())
    }

    fn remove_mirror(&self, name: &str) {
        self.mirrors.lock().remove(name);
    }
}

/// A resolved device node, ready to open.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    id: DevId,
    state: Arc<DeviceState>,
}

impl DeviceHandle {
    pub fn id(&self) -> DevId {
        self.id
    }

    /// Open a session against this device. See [`DeviceState::open`].
    pub fn open(&self) -> Result<DeviceSession, DeviceError> {
        DeviceState::open(&self.state)
    }

    pub fn open_sessions(&self) -> u32 {
        self.state.open_sessions()
    }
}

/// A resolved mirror entry, ready to open.
#[derive(Debug, Clone)]
pub struct MirrorHandle {
    buffer: SharedBuffer,
}

impl MirrorHandle {
    /// Open a one-shot snapshot session. Mirror opens never fail and
    /// carry no open-count bookkeeping.
    pub fn open(&self) -> MirrorSession {
        MirrorSession::new(self.buffer.clone())
    }
}
