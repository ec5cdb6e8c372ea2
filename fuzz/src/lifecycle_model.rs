//! All-or-nothing check for the driver lifecycle.
//!
//! Arbitrary interleavings of `initialize` (with an optional injected
//! stage failure) and `teardown` run against one registry. After every
//! op exactly one of two states must hold:
//!
//! - a driver is live and the registry holds all five resources, or
//! - no driver is live and the registry holds nothing at all.

use std::sync::Arc;

use chardev_core::{OpenPolicy, SharedBuffer};
use chardev_registry::{
    initialize, DevId, DeviceRegistry, DriverConfig, LiveDriver, RegistryError, RegistryOps, Stage,
};
use parking_lot::Mutex;

/// Operations on the lifecycle.
#[derive(Clone, Debug)]
pub enum LifecycleOp {
    /// Attempt bring-up; `fail_at` arms a fault at one stage.
    Initialize { fail_at: Option<Stage> },
    /// Tear the live driver down, if any.
    Teardown,
    /// Drop the live driver without calling teardown, if any.
    DropDriver,
}

/// A real registry with one armable fault, mirroring how a registration
/// table might refuse any single acquisition.
pub struct FaultyRegistry {
    inner: DeviceRegistry,
    fail_at: Mutex<Option<Stage>>,
}

impl FaultyRegistry {
    pub fn new() -> Self {
        Self {
            inner: DeviceRegistry::new(),
            fail_at: Mutex::new(None),
        }
    }

    pub fn arm(&self, stage: Option<Stage>) {
        *self.fail_at.lock() = stage;
    }

    pub fn inner(&self) -> &DeviceRegistry {
        &self.inner
    }

    fn trips(&self, stage: Stage) -> bool {
        *self.fail_at.lock() == Some(stage)
    }
}

impl Default for FaultyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryOps for FaultyRegistry {
    fn alloc_identity(&self, owner: &str) -> Result<DevId, RegistryError> {
        if self.trips(Stage::Identity) {
            return Err(RegistryError::ExhaustedMajors);
        }
        self.inner.alloc_identity(owner)
    }

    fn release_identity(&self, id: DevId) {
        self.inner.release_identity(id);
    }

    fn register_device(
        &self,
        id: DevId,
        buffer: SharedBuffer,
        policy: OpenPolicy,
    ) -> Result<(), RegistryError> {
        if self.trips(Stage::Device) {
            return Err(RegistryError::IdentityTaken(id));
        }
        self.inner.register_device(id, buffer, policy)
    }

    fn unregister_device(&self, id: DevId) {
        self.inner.unregister_device(id);
    }

    fn create_class(&self, name: &str) -> Result<(), RegistryError> {
        if self.trips(Stage::Class) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        self.inner.create_class(name)
    }

    fn destroy_class(&self, name: &str) {
        self.inner.destroy_class(name);
    }

    fn create_node(&self, name: &str, id: DevId) -> Result<(), RegistryError> {
        if self.trips(Stage::Node) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        self.inner.create_node(name, id)
    }

    fn remove_node(&self, name: &str) {
        self.inner.remove_node(name);
    }

    fn create_mirror(&self, name: &str, buffer: SharedBuffer) -> Result<(), RegistryError> {
        if self.trips(Stage::Mirror) {
            return Err(RegistryError::NameTaken(name.to_owned()));
        }
        self.inner.create_mirror(name, buffer)
    }

    fn remove_mirror(&self, name: &str) {
        self.inner.remove_mirror(name);
    }
}

/// Execute a sequence of lifecycle operations and verify the
/// all-or-nothing invariant after every one.
pub fn execute_and_verify(ops: &[LifecycleOp]) -> Result<(), String> {
    let registry = Arc::new(FaultyRegistry::new());
    let mut driver: Option<LiveDriver<FaultyRegistry>> = None;

    for (i, op) in ops.iter().enumerate() {
        match op {
            LifecycleOp::Initialize { fail_at } => {
                registry.arm(*fail_at);
                let result = initialize(registry.clone(), DriverConfig::default());
                registry.arm(None);

                match result {
                    Ok(live) => {
                        if driver.is_some() {
                            return Err(format!(
                                "op {i}: second initialize succeeded while live"
                            ));
                        }
                        driver = Some(live);
                    }
                    Err(err) => {
                        // A fault was armed, or the previous driver's
                        // names were still taken. Either way the failed
                        // stage must match what blocked it.
                        if fail_at.is_none() && driver.is_none() {
                            return Err(format!(
                                "op {i}: initialize failed with no fault armed: {err}"
                            ));
                        }
                    }
                }
            }
            LifecycleOp::Teardown => {
                if let Some(live) = driver.take() {
                    live.teardown();
                }
            }
            LifecycleOp::DropDriver => {
                driver = None;
            }
        }

        // All five or none, after every operation.
        let inner = registry.inner();
        if driver.is_some() {
            let all_held = inner.held_identities() == 1
                && inner.registered_devices() == 1
                && inner.has_class("chrdev")
                && inner.has_node("chrdev0")
                && inner.has_mirror("chrdev");
            if !all_held {
                return Err(format!("op {i}: driver live but resources missing"));
            }
        } else if !inner.is_empty() {
            return Err(format!("op {i}: no driver live but registry not empty"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_teardown_cycles() {
        let ops = vec![
            LifecycleOp::Initialize { fail_at: None },
            LifecycleOp::Teardown,
            LifecycleOp::Initialize { fail_at: None },
            LifecycleOp::DropDriver,
            LifecycleOp::Initialize { fail_at: None },
            LifecycleOp::Teardown,
        ];
        execute_and_verify(&ops).unwrap();
    }

    #[test]
    fn failures_at_every_stage_between_cycles() {
        let mut ops = Vec::new();
        for stage in [
            Stage::Identity,
            Stage::Device,
            Stage::Class,
            Stage::Node,
            Stage::Mirror,
        ] {
            ops.push(LifecycleOp::Initialize {
                fail_at: Some(stage),
            });
            ops.push(LifecycleOp::Initialize { fail_at: None });
            ops.push(LifecycleOp::Teardown);
        }
        execute_and_verify(&ops).unwrap();
    }

    #[test]
    fn redundant_teardowns_are_harmless() {
        let ops = vec![
            LifecycleOp::Teardown,
            LifecycleOp::Initialize { fail_at: None },
            LifecycleOp::Teardown,
            LifecycleOp::Teardown,
        ];
        execute_and_verify(&ops).unwrap();
    }
}
