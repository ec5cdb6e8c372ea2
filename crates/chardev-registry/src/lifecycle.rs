//! Five-stage driver bring-up with ordered rollback.
//!
//! The reference drivers acquire their resources in a fixed order and
//! release them with a chain of goto labels. Here each acquired
//! resource is pushed onto a guard stack instead; unwinding the stack
//! releases in exact reverse order, on the failure path and on teardown
//! alike, so the ordering guarantee comes from the data structure
//! rather than from hand-maintained labels.
//!
//! Either `initialize` returns a [`LiveDriver`] holding all five
//! resources, or it returns [`InitError`] and the registry is exactly
//! as it was before the call. No other end state is reachable.

use std::mem;
use std::sync::Arc;

use chardev_core::{OpenPolicy, SharedBuffer, DEFAULT_CAPACITY};

use crate::identity::DevId;
use crate::registry::{RegistryError, RegistryOps};

/// One discrete, independently releasable step of acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Major/minor allocation from the identity region.
    Identity,
    /// Binding the device (buffer + open policy) to the identity.
    Device,
    /// Claiming the class name.
    Class,
    /// Creating the discoverable device node.
    Node,
    /// Creating the read-only mirror entry.
    Mirror,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Identity => "identity",
            Stage::Device => "device",
            Stage::Class => "class",
            Stage::Node => "node",
            Stage::Mirror => "mirror",
        };
        f.write_str(name)
    }
}

/// Initialization failed at `stage`; everything acquired before it has
/// already been released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitError {
    pub stage: Stage,
    pub source: RegistryError,
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.source)
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Names, capacity, and open policy for one driver instance.
///
/// Defaults match the reference devices: node `chrdev0` in class
/// `chrdev`, a `chrdev` mirror entry, a 1 KiB buffer, shared opens.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub device_name: String,
    pub class_name: String,
    pub mirror_name: String,
    pub capacity: usize,
    pub open_policy: OpenPolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_name: "chrdev0".to_owned(),
            class_name: "chrdev".to_owned(),
            mirror_name: "chrdev".to_owned(),
            capacity: DEFAULT_CAPACITY,
            open_policy: OpenPolicy::Shared,
        }
    }
}

/// A guard for one acquired resource, carrying what is needed to
/// release it.
#[derive(Debug)]
enum Resource {
    Identity(DevId),
    Device(DevId),
    Class(String),
    Node(String),
    Mirror(String),
}

fn release<R: RegistryOps>(registry: &R, resource: Resource) {
    match resource {
        Resource::Mirror(name) => {
            tracing::info!(%name, "removed mirror entry");
            registry.remove_mirror(&name);
        }
        Resource::Node(name) => {
            tracing::info!(%name, "removed device node");
            registry.remove_node(&name);
        }
        Resource::Class(name) => {
            tracing::info!(%name, "destroyed class");
            registry.destroy_class(&name);
        }
        Resource::Device(id) => {
            tracing::info!(%id, "unregistered device");
            registry.unregister_device(id);
        }
        Resource::Identity(id) => {
            tracing::info!(%id, "released device identity");
            registry.release_identity(id);
        }
    }
}

/// Pop and release every guard, newest first.
fn unwind<R: RegistryOps>(registry: &R, mut held: Vec<Resource>) {
    while let Some(resource) = held.pop() {
        release(registry, resource);
    }
}

/// Run the five stages strictly in order.
///
/// On success every resource is held and the driver is live. On the
/// first failure, everything already acquired is released in reverse
/// order before the error is returned; the registry is left exactly as
/// it was found.
pub fn initialize<R: RegistryOps>(
    registry: Arc<R>,
    config: DriverConfig,
) -> Result<LiveDriver<R>, InitError> {
    let buffer = SharedBuffer::new(config.capacity);
    let mut held = Vec::with_capacity(5);

    match run_stages(&*registry, &config, &buffer, &mut held) {
        Ok(id) => {
            tracing::info!(%id, device = %config.device_name, "driver live");
            Ok(LiveDriver {
                registry,
                config,
                buffer,
                id,
                held,
            })
        }
        Err(err) => {
            tracing::warn!(stage = %err.stage, error = %err.source, "initialize failed, rolling back");
            unwind(&*registry, held);
            Err(err)
        }
    }
}

fn run_stages<R: RegistryOps>(
    registry: &R,
    config: &DriverConfig,
    buffer: &SharedBuffer,
    held: &mut Vec<Resource>,
) -> Result<DevId, InitError> {
    let fail = |stage: Stage| move |source: RegistryError| InitError { stage, source };

    let id = registry
        .alloc_identity(&config.device_name)
        .map_err(fail(Stage::Identity))?;
    held.push(Resource::Identity(id));
    tracing::info!(%id, "allocated device identity");

    registry
        .register_device(id, buffer.clone(), config.open_policy)
        .map_err(fail(Stage::Device))?;
    held.push(Resource::Device(id));
    tracing::info!(%id, "registered device");

    registry
        .create_class(&config.class_name)
        .map_err(fail(Stage::Class))?;
    held.push(Resource::Class(config.class_name.clone()));
    tracing::info!(name = %config.class_name, "created class");

    registry
        .create_node(&config.device_name, id)
        .map_err(fail(Stage::Node))?;
    held.push(Resource::Node(config.device_name.clone()));
    tracing::info!(name = %config.device_name, "created device node");

    registry
        .create_mirror(&config.mirror_name, buffer.clone())
        .map_err(fail(Stage::Mirror))?;
    held.push(Resource::Mirror(config.mirror_name.clone()));
    tracing::info!(name = %config.mirror_name, "created mirror entry");

    Ok(id)
}

/// A driver that reached the `Live` state: all five resources held.
///
/// `teardown` releases them in exact reverse order of acquisition.
/// Dropping a `LiveDriver` without calling `teardown` unwinds the same
/// guard stack, so resources cannot leak either way.
pub struct LiveDriver<R: RegistryOps> {
    registry: Arc<R>,
    config: DriverConfig,
    buffer: SharedBuffer,
    id: DevId,
    held: Vec<Resource>,
}

impl<R: RegistryOps> LiveDriver<R> {
    /// The identity allocated at stage one.
    pub fn id(&self) -> DevId {
        self.id
    }

    /// The shared buffer behind both access points.
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Release every resource, mirror first, identity last.
    ///
    /// Never fails; releasing an already-absent resource is a no-op in
    /// every table, so teardown is safe even if the registry was
    /// tampered with underneath.
    pub fn teardown(mut self) {
        tracing::info!(device = %self.config.device_name, "driver teardown");
        unwind(&*self.registry, mem::take(&mut self.held));
    }
}

impl<R: RegistryOps> std::fmt::Debug for LiveDriver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveDriver")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

impl<R: RegistryOps> Drop for LiveDriver<R> {
    fn drop(&mut self) {
        // Explicit teardown already drained the stack.
        if !self.held.is_empty() {
            tracing::debug!(device = %self.config.device_name, "releasing driver on drop");
            unwind(&*self.registry, mem::take(&mut self.held));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DeviceRegistry;

    #[test]
    fn initialize_reaches_live() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = initialize(registry.clone(), DriverConfig::default()).unwrap();

        assert!(registry.holds_identity(driver.id()));
        assert_eq!(driver.config().device_name, "chrdev0");
        assert_eq!(driver.buffer().capacity(), DEFAULT_CAPACITY);
        assert_eq!(registry.registered_devices(), 1);
        assert!(registry.has_class("chrdev"));
        assert!(registry.has_node("chrdev0"));
        assert!(registry.has_mirror("chrdev"));
    }

    #[test]
    fn teardown_releases_everything() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = initialize(registry.clone(), DriverConfig::default()).unwrap();
        driver.teardown();
        assert!(registry.is_empty());
    }

    #[test]
    fn drop_releases_like_teardown() {
        let registry = Arc::new(DeviceRegistry::new());
        {
            let _driver = initialize(registry.clone(), DriverConfig::default()).unwrap();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn reinitialize_after_teardown() {
        let registry = Arc::new(DeviceRegistry::new());
        for _ in 0..3 {
            let driver = initialize(registry.clone(), DriverConfig::default()).unwrap();
            driver.teardown();
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn nothing_survives_a_cycle() {
        let registry = Arc::new(DeviceRegistry::new());
        let driver = initialize(registry.clone(), DriverConfig::default()).unwrap();

        let mut session = registry.device("chrdev0").unwrap().open().unwrap();
        session.write(&[1, 2, 3][..]).unwrap();
        drop(session);
        driver.teardown();

        // A fresh cycle starts from an empty buffer.
        let driver = initialize(registry.clone(), DriverConfig::default()).unwrap();
        let mut session = registry.device("chrdev0").unwrap().open().unwrap();
        let mut dst = [0u8; 8];
        assert_eq!(session.read(&mut dst[..]).unwrap(), 0);
        drop(session);
        driver.teardown();
    }

    #[test]
    fn class_collision_fails_stage_three_and_rolls_back() {
        let registry = Arc::new(DeviceRegistry::new());
        registry.create_class("chrdev").unwrap();

        let err = initialize(registry.clone(), DriverConfig::default()).unwrap_err();
        assert_eq!(err.stage, Stage::Class);
        assert_eq!(err.source, RegistryError::NameTaken("chrdev".into()));

        // Identity and device from stages one and two are gone again.
        assert_eq!(registry.held_identities(), 0);
        assert_eq!(registry.registered_devices(), 0);
        registry.destroy_class("chrdev");
        assert!(registry.is_empty());
    }

    #[test]
    fn exhausted_majors_fail_stage_one() {
        let registry = Arc::new(DeviceRegistry::new());

        // Hold every major in the local range.
        let mut drivers = Vec::new();
        let mut n = 0;
        loop {
            let config = DriverConfig {
                device_name: format!("chrdev{n}"),
                class_name: format!("chrdev_class{n}"),
                mirror_name: format!("chrdev_mirror{n}"),
                ..DriverConfig::default()
            };
            match initialize(registry.clone(), config) {
                Ok(driver) => drivers.push(driver),
                Err(err) => {
                    assert_eq!(err.stage, Stage::Identity);
                    assert_eq!(err.source, RegistryError::ExhaustedMajors);
                    break;
                }
            }
            n += 1;
            assert!(n <= 64, "allocator never ran out");
        }

        // Nothing from the failed attempt stuck, and releasing one
        // driver makes initialization possible again.
        assert_eq!(registry.held_identities(), drivers.len());
        drivers.pop().unwrap().teardown();
        let config = DriverConfig {
            device_name: "late".to_owned(),
            class_name: "late_class".to_owned(),
            mirror_name: "late_mirror".to_owned(),
            ..DriverConfig::default()
        };
        initialize(registry.clone(), config).unwrap().teardown();
    }
}
