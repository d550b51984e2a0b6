//! Instance registry.
//!
//! Owns the live controller for every configured instance. Construction
//! resolves the instance's kind and geometry once into a concrete
//! controller; after that, lookups are a plain map read. Failures are
//! isolated per instance so one bad configuration never takes down the
//! rest of the fleet.

use domain::models::{Instance, InstanceGeometry, InstanceKind, MapEntity};
use domain::services::boundary::{
    AccountPool, CellCoverage, CompletionSink, DeviceDirectory, EntityStore, EventSink,
};
use shared::geometry::MultiArea;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::binding::BindingTable;
use crate::config::DispatchConfig;
use crate::controller::InstanceController;
use crate::error::{DispatchError, Result};
use crate::patrol::{PatrolController, PatrolMode};
use crate::priority::PriorityController;
use crate::sweep::{SweepController, SweepDeps};

/// The external collaborators of the dispatch core, bundled for wiring.
#[derive(Clone)]
pub struct Boundaries {
    pub devices: Arc<dyn DeviceDirectory>,
    pub accounts: Arc<dyn AccountPool>,
    pub entities: Arc<dyn EntityStore>,
    pub cells: Arc<dyn CellCoverage>,
    pub events: Arc<dyn EventSink>,
}

pub struct InstanceRegistry {
    config: DispatchConfig,
    boundaries: Boundaries,
    completion: Arc<dyn CompletionSink>,
    binding: Arc<BindingTable>,
    controllers: RwLock<HashMap<String, Arc<dyn InstanceController>>>,
}

impl InstanceRegistry {
    pub fn new(
        config: DispatchConfig,
        boundaries: Boundaries,
        completion: Arc<dyn CompletionSink>,
        binding: Arc<BindingTable>,
    ) -> Self {
        Self {
            config,
            boundaries,
            completion,
            binding,
            controllers: RwLock::new(HashMap::new()),
        }
    }

    fn build_controller(&self, instance: &Instance) -> Result<Arc<dyn InstanceController>> {
        let name = instance.name.clone();
        match instance.kind {
            InstanceKind::PatrolRaid | InstanceKind::PatrolPokemon => {
                let route = match &instance.geometry {
                    InstanceGeometry::Route(route) => route.clone(),
                    InstanceGeometry::Fence(_) => {
                        return Err(DispatchError::Config(format!(
                            "instance {name} is a patrol but carries a fence geometry"
                        )))
                    }
                };
                let mode = if instance.kind == InstanceKind::PatrolRaid {
                    PatrolMode::Raid
                } else {
                    PatrolMode::Pokemon
                };
                Ok(Arc::new(PatrolController::new(
                    name,
                    mode,
                    route,
                    instance.min_level,
                    instance.max_level,
                    self.config.hold_probability,
                    self.config.device_live_window_secs,
                )?))
            }
            InstanceKind::SweepQuest => {
                let area = self.fence_of(instance)?;
                Ok(Arc::new(SweepController::new(
                    name,
                    area,
                    instance.min_level,
                    instance.max_level,
                    instance.tuning.spin_limit,
                    instance.tuning.timezone_offset_secs,
                    &self.config,
                    SweepDeps {
                        entities: Arc::clone(&self.boundaries.entities),
                        accounts: Arc::clone(&self.boundaries.accounts),
                        cells: Arc::clone(&self.boundaries.cells),
                        completion: Arc::clone(&self.completion),
                    },
                )))
            }
            InstanceKind::PriorityIv => {
                let area = self.fence_of(instance)?;
                Ok(Arc::new(PriorityController::new(
                    name,
                    area,
                    instance.min_level,
                    instance.max_level,
                    instance.tuning.priority_kinds.clone(),
                    instance.tuning.queue_limit,
                    &self.config,
                    Arc::clone(&self.boundaries.entities),
                )))
            }
        }
    }

    fn fence_of(&self, instance: &Instance) -> Result<MultiArea> {
        match &instance.geometry {
            InstanceGeometry::Fence(rings) => MultiArea::from_rings(rings.clone())
                .map_err(|e| DispatchError::Config(format!("instance {}: {e}", instance.name))),
            InstanceGeometry::Route(_) => Err(DispatchError::Config(format!(
                "instance {} needs a fence geometry, got a route",
                instance.name
            ))),
        }
    }

    /// Construct and register the controller for an instance, replacing
    /// and stopping any prior controller under the same name.
    pub async fn add_instance(&self, instance: &Instance) -> Result<()> {
        let controller = self.build_controller(instance)?;
        let previous = self
            .controllers
            .write()
            .await
            .insert(instance.name.clone(), controller);
        if let Some(previous) = previous {
            previous.stop().await;
        }
        info!(
            instance = %instance.name,
            kind = instance.kind.as_str(),
            "Instance controller started"
        );
        Ok(())
    }

    /// Replace an instance, carrying bound devices over to the new name.
    pub async fn reload_instance(&self, instance: &Instance, old_name: &str) -> Result<()> {
        let old = self.controllers.write().await.remove(old_name);
        if let Some(old) = old {
            if old_name != instance.name {
                let moved = self.binding.rehome(old_name, &instance.name).await;
                info!(
                    from = old_name,
                    to = %instance.name,
                    devices = moved,
                    "Rehomed devices for instance reload"
                );
            }
            old.stop().await;
        }
        self.add_instance(instance).await
    }

    /// Stop and remove an instance. Returns how many devices it orphaned;
    /// the caller is expected to re-run assignment evaluation so they can
    /// be picked up elsewhere.
    pub async fn remove_instance(&self, name: &str) -> Result<usize> {
        let controller = self
            .controllers
            .write()
            .await
            .remove(name)
            .ok_or_else(|| DispatchError::UnknownInstance(name.to_string()))?;
        controller.stop().await;
        let orphaned = self.binding.unbind_instance(name).await;
        info!(instance = name, orphaned, "Instance controller removed");
        Ok(orphaned)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn InstanceController>> {
        self.controllers.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        self.controllers.read().await.keys().cloned().collect()
    }

    /// Controller status, with errors flattened to an opaque marker so a
    /// broken instance still renders in listings.
    pub async fn get_status(&self, name: &str) -> Result<String> {
        let controller = self
            .get(name)
            .await
            .ok_or_else(|| DispatchError::UnknownInstance(name.to_string()))?;
        match controller.status().await {
            Ok(status) => Ok(status),
            Err(e) => {
                warn!(instance = name, error = %e, "Status query failed");
                Ok("ERROR".to_string())
            }
        }
    }

    /// Fan an observed entity out to every priority controller. Errors are
    /// logged per controller and never abort the loop.
    pub async fn route_entity_event(&self, entity: &MapEntity) {
        let controllers: Vec<Arc<dyn InstanceController>> =
            self.controllers.read().await.values().cloned().collect();
        for controller in controllers {
            if controller.kind() != InstanceKind::PriorityIv {
                continue;
            }
            if let Err(e) = controller.ingest(entity.clone()).await {
                warn!(
                    instance = controller.name(),
                    entity = %entity.id,
                    error = %e,
                    "Entity ingestion failed"
                );
            }
        }
    }

    /// Fan a resolved entity out to every priority controller and publish
    /// it downstream.
    pub async fn route_entity_resolved(&self, entity: &MapEntity) {
        let controllers: Vec<Arc<dyn InstanceController>> =
            self.controllers.read().await.values().cloned().collect();
        for controller in controllers {
            if controller.kind() == InstanceKind::PriorityIv {
                controller.entity_resolved(entity).await;
            }
        }
        self.boundaries.events.publish_resolved(entity).await;
    }

    pub async fn stop_all(&self) {
        let controllers: Vec<Arc<dyn InstanceController>> =
            self.controllers.write().await.drain().map(|(_, c)| c).collect();
        for controller in controllers {
            controller.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{InstanceTuning, Task};
    use domain::services::memory::{
        GridCellCoverage, InMemoryAccountPool, InMemoryDeviceDirectory, InMemoryEntityStore,
        RecordingCompletionSink, RecordingEventSink,
    };
    use shared::geometry::Waypoint;
    use uuid::Uuid;

    fn boundaries() -> Boundaries {
        Boundaries {
            devices: Arc::new(InMemoryDeviceDirectory::new()),
            accounts: Arc::new(InMemoryAccountPool::new()),
            entities: Arc::new(InMemoryEntityStore::new()),
            cells: Arc::new(GridCellCoverage::new()),
            events: Arc::new(RecordingEventSink::new()),
        }
    }

    fn registry() -> InstanceRegistry {
        InstanceRegistry::new(
            DispatchConfig::default(),
            boundaries(),
            Arc::new(RecordingCompletionSink::new()),
            Arc::new(BindingTable::new()),
        )
    }

    fn ring() -> Vec<Vec<Waypoint>> {
        vec![vec![
            Waypoint::new(0.0, 0.0),
            Waypoint::new(0.0, 1.0),
            Waypoint::new(1.0, 1.0),
            Waypoint::new(1.0, 0.0),
        ]]
    }

    fn patrol_instance(name: &str) -> Instance {
        Instance {
            name: name.to_string(),
            kind: InstanceKind::PatrolRaid,
            geometry: InstanceGeometry::Route(vec![
                Waypoint::new(0.1, 0.1),
                Waypoint::new(0.2, 0.2),
            ]),
            min_level: 0,
            max_level: 40,
            tuning: InstanceTuning::default(),
        }
    }

    fn iv_instance(name: &str) -> Instance {
        Instance {
            name: name.to_string(),
            kind: InstanceKind::PriorityIv,
            geometry: InstanceGeometry::Fence(ring()),
            min_level: 25,
            max_level: 35,
            tuning: InstanceTuning {
                priority_kinds: vec![100, 200],
                ..InstanceTuning::default()
            },
        }
    }

    #[tokio::test]
    async fn test_add_and_lookup() {
        let registry = registry();
        registry.add_instance(&patrol_instance("raid-a")).await.unwrap();

        let controller = registry.get("raid-a").await.unwrap();
        assert_eq!(controller.kind(), InstanceKind::PatrolRaid);
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.names().await, vec!["raid-a"]);
    }

    #[tokio::test]
    async fn test_geometry_kind_mismatch_is_config_error() {
        let registry = registry();
        let mut bad = patrol_instance("bad");
        bad.geometry = InstanceGeometry::Fence(ring());

        let result = registry.add_instance(&bad).await;
        assert!(matches!(result, Err(DispatchError::Config(_))));
        // The failure is isolated; other instances still register.
        registry.add_instance(&patrol_instance("ok")).await.unwrap();
        assert!(registry.get("ok").await.is_some());
    }

    #[tokio::test]
    async fn test_reload_rehomes_devices() {
        let binding = Arc::new(BindingTable::new());
        let registry = InstanceRegistry::new(
            DispatchConfig::default(),
            boundaries(),
            Arc::new(RecordingCompletionSink::new()),
            Arc::clone(&binding),
        );
        registry.add_instance(&patrol_instance("old")).await.unwrap();
        let device = Uuid::new_v4();
        binding.bind(device, "old").await;

        registry
            .reload_instance(&patrol_instance("new"), "old")
            .await
            .unwrap();
        assert!(registry.get("old").await.is_none());
        assert!(registry.get("new").await.is_some());
        assert_eq!(binding.instance_of(device).await.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_remove_unbinds_devices() {
        let binding = Arc::new(BindingTable::new());
        let registry = InstanceRegistry::new(
            DispatchConfig::default(),
            boundaries(),
            Arc::new(RecordingCompletionSink::new()),
            Arc::clone(&binding),
        );
        registry.add_instance(&patrol_instance("raid-a")).await.unwrap();
        let device = Uuid::new_v4();
        binding.bind(device, "raid-a").await;

        let orphaned = registry.remove_instance("raid-a").await.unwrap();
        assert_eq!(orphaned, 1);
        assert!(registry.get("raid-a").await.is_none());
        assert!(binding.instance_of(device).await.is_none());

        let result = registry.remove_instance("raid-a").await;
        assert!(matches!(result, Err(DispatchError::UnknownInstance(_))));
    }

    #[tokio::test]
    async fn test_status_flattens_controller_errors() {
        struct BrokenController;

        #[async_trait::async_trait]
        impl InstanceController for BrokenController {
            fn name(&self) -> &str {
                "broken"
            }
            fn kind(&self) -> InstanceKind {
                InstanceKind::PatrolRaid
            }
            async fn get_task(
                &self,
                _ctx: &crate::controller::TaskContext,
            ) -> Result<Option<Task>> {
                Ok(None)
            }
            async fn status(&self) -> Result<String> {
                Err(DispatchError::NotFound("state gone".into()))
            }
            async fn stop(&self) {}
        }

        let registry = registry();
        registry
            .controllers
            .write()
            .await
            .insert("broken".to_string(), Arc::new(BrokenController));

        assert_eq!(registry.get_status("broken").await.unwrap(), "ERROR");
        assert!(registry.get_status("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_entity_events_reach_priority_controllers_only() {
        let registry = registry();
        registry.add_instance(&patrol_instance("raid-a")).await.unwrap();
        registry.add_instance(&iv_instance("iv-a")).await.unwrap();

        let entity = MapEntity::new("mon-1", 0.5, 0.5, 100);
        registry.route_entity_event(&entity).await;

        let controller = registry.get("iv-a").await.unwrap();
        let queue = controller.queue_snapshot().await.unwrap();
        assert_eq!(queue.len(), 1);
        // Patrol controllers expose no queue at all.
        let patrol = registry.get("raid-a").await.unwrap();
        assert!(patrol.queue_snapshot().await.is_none());
    }

    #[tokio::test]
    async fn test_resolved_entities_are_published() {
        let events = Arc::new(RecordingEventSink::new());
        let mut boundaries = boundaries();
        boundaries.events = Arc::clone(&events) as Arc<dyn EventSink>;
        let registry = InstanceRegistry::new(
            DispatchConfig::default(),
            boundaries,
            Arc::new(RecordingCompletionSink::new()),
            Arc::new(BindingTable::new()),
        );
        registry.add_instance(&iv_instance("iv-a")).await.unwrap();

        let entity = MapEntity::new("mon-1", 0.5, 0.5, 100);
        registry.route_entity_event(&entity).await;
        registry.route_entity_resolved(&entity).await;

        assert_eq!(events.published().await.len(), 1);
        let controller = registry.get("iv-a").await.unwrap();
        assert!(controller.queue_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_all_clears_registry() {
        let registry = registry();
        registry.add_instance(&patrol_instance("raid-a")).await.unwrap();
        registry.add_instance(&iv_instance("iv-a")).await.unwrap();

        registry.stop_all().await;
        assert!(registry.names().await.is_empty());
    }
}
