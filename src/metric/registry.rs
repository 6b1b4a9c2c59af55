use dashmap::DashMap;

use crate::container::{ContainerID, Pid};

/// Bookkeeping of the containers currently being sampled.
///
/// A lifecycle removes its own entry when its container exits.
pub trait ContainerRegistry: Send + Sync + 'static {
    fn remove_container(&self, container_id: &ContainerID);
}

/// Tracks sampled containers and the pid they were initialised with.
#[derive(Debug, Default)]
pub struct Monitor {
    containers: DashMap<ContainerID, Pid>,
}

impl Monitor {
    /// Registers a container, replacing any previous entry for the same id.
    pub fn register_container(&self, container_id: ContainerID, pid: Pid) {
        self.containers.insert(container_id, pid);
    }

    pub fn contains(&self, container_id: &ContainerID) -> bool {
        self.containers.contains_key(container_id)
    }

    pub fn size(&self) -> usize {
        self.containers.len()
    }
}

impl ContainerRegistry for Monitor {
    fn remove_container(&self, container_id: &ContainerID) {
        if let Some((_, pid)) = self.containers.remove(container_id) {
            log::debug!(
                "removed container {} (pid {pid}) from monitor",
                container_id.short()
            );
        }
    }
}
