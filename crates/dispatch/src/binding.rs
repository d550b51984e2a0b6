//! Device-to-instance binding table.
//!
//! The single source of truth for "which device works which instance".
//! Only this component and its owners mutate bindings; controllers read
//! device identity as input and never touch this table.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

/// At most one instance per device.
#[derive(Default)]
pub struct BindingTable {
    bindings: RwLock<HashMap<Uuid, String>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a device, replacing any previous binding.
    pub async fn bind(&self, device: Uuid, instance_name: &str) {
        self.bindings
            .write()
            .await
            .insert(device, instance_name.to_string());
    }

    pub async fn unbind(&self, device: Uuid) -> bool {
        self.bindings.write().await.remove(&device).is_some()
    }

    /// Atomic unbind+bind with a log line for the transition.
    pub async fn rebind(&self, device: Uuid, instance_name: &str) {
        let mut bindings = self.bindings.write().await;
        let previous = bindings.insert(device, instance_name.to_string());
        info!(
            device = %device,
            from = previous.as_deref().unwrap_or("-"),
            to = instance_name,
            "Device rebound"
        );
    }

    pub async fn instance_of(&self, device: Uuid) -> Option<String> {
        self.bindings.read().await.get(&device).cloned()
    }

    pub async fn devices_for_instance(&self, instance_name: &str) -> Vec<Uuid> {
        self.bindings
            .read()
            .await
            .iter()
            .filter(|(_, name)| name.as_str() == instance_name)
            .map(|(uuid, _)| *uuid)
            .collect()
    }

    /// Drop every binding onto the given instance. Returns how many.
    pub async fn unbind_instance(&self, instance_name: &str) -> usize {
        let mut bindings = self.bindings.write().await;
        let before = bindings.len();
        bindings.retain(|_, name| name.as_str() != instance_name);
        before - bindings.len()
    }

    /// Move every binding from one instance name to another (instance
    /// rename/reload). Returns how many devices moved.
    pub async fn rehome(&self, old_name: &str, new_name: &str) -> usize {
        let mut bindings = self.bindings.write().await;
        let mut moved = 0;
        for name in bindings.values_mut() {
            if name.as_str() == old_name {
                *name = new_name.to_string();
                moved += 1;
            }
        }
        moved
    }
}
