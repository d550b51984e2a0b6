//! Instance/job-dispatch core for the Scan Fleet backend.
//!
//! Decides, for each device polling for work, which coordinate to scan
//! next and under what policy: fixed patrol circles, exhaustive quest
//! sweeps, or a priority queue of interesting targets. Persistence,
//! transport, and rendering live outside this crate behind the boundary
//! traits in the `domain` crate.
//!
//! [`Dispatcher`] is the single entry point: constructed once at startup
//! with the process configuration and the boundary implementations, torn
//! down at shutdown. Tests build isolated dispatchers over the in-memory
//! boundaries.

pub mod binding;
pub mod config;
pub mod controller;
pub mod error;
pub mod jobs;
pub mod patrol;
pub mod priority;
pub mod registry;
pub mod scheduler;
pub mod sweep;

use chrono::Utc;
use domain::models::{
    Account, Assignment, CreateAssignmentRequest, CreateInstanceRequest, Instance, MapEntity, Task,
    TaskAction,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::binding::BindingTable;
use crate::config::DispatchConfig;
use crate::controller::TaskContext;
use crate::error::{DispatchError, Result};
use crate::jobs::JobRunner;
use crate::registry::{Boundaries, InstanceRegistry};
use crate::scheduler::{AssignmentScheduler, SchedulerTickJob};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide facade over the dispatch core.
pub struct Dispatcher {
    binding: Arc<BindingTable>,
    scheduler: Arc<AssignmentScheduler>,
    registry: InstanceRegistry,
    devices: Arc<dyn domain::services::DeviceDirectory>,
    accounts: Arc<dyn domain::services::AccountPool>,
    instances: RwLock<HashMap<String, Instance>>,
    runner: Mutex<Option<JobRunner>>,
    scheduler_tick_secs: u64,
}

impl Dispatcher {
    pub fn new(config: DispatchConfig, boundaries: Boundaries) -> Self {
        let binding = Arc::new(BindingTable::new());
        let scheduler = Arc::new(AssignmentScheduler::new(
            Arc::clone(&boundaries.devices),
            Arc::clone(&binding),
            config.scheduler_tz_offset_secs,
        ));
        let devices = Arc::clone(&boundaries.devices);
        let accounts = Arc::clone(&boundaries.accounts);
        let scheduler_tick_secs = config.scheduler_tick_secs;
        let registry = InstanceRegistry::new(
            config,
            boundaries,
            Arc::clone(&scheduler) as Arc<dyn domain::services::CompletionSink>,
            Arc::clone(&binding),
        );
        Self {
            binding,
            scheduler,
            registry,
            devices,
            accounts,
            instances: RwLock::new(HashMap::new()),
            runner: Mutex::new(None),
            scheduler_tick_secs,
        }
    }

    /// Start the background scheduler tick. Idempotent.
    pub async fn start(&self) {
        let mut slot = self.runner.lock().await;
        if slot.is_some() {
            return;
        }
        let mut runner = JobRunner::new();
        runner.spawn(Arc::new(SchedulerTickJob::new(
            Arc::clone(&self.scheduler),
            self.scheduler_tick_secs,
        )));
        *slot = Some(runner);
        info!("Dispatcher started");
    }

    /// Stop the scheduler tick and every instance controller.
    pub async fn shutdown(&self) {
        if let Some(runner) = self.runner.lock().await.take() {
            runner.shutdown();
            runner.wait_for_shutdown(SHUTDOWN_TIMEOUT).await;
        }
        self.registry.stop_all().await;
        info!("Dispatcher stopped");
    }

    // --- Instance CRUD -----------------------------------------------------

    pub async fn create_instance(&self, request: CreateInstanceRequest) -> Result<Instance> {
        request
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        let instance: Instance = request.into();
        if self.instances.read().await.contains_key(&instance.name) {
            return Err(DispatchError::Conflict(format!(
                "instance {} already exists",
                instance.name
            )));
        }
        self.registry.add_instance(&instance).await?;
        self.instances
            .write()
            .await
            .insert(instance.name.clone(), instance.clone());
        Ok(instance)
    }

    /// Replace an instance, tearing down the old controller and carrying
    /// bound devices over.
    pub async fn update_instance(
        &self,
        old_name: &str,
        request: CreateInstanceRequest,
    ) -> Result<Instance> {
        request
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        if !self.instances.read().await.contains_key(old_name) {
            return Err(DispatchError::UnknownInstance(old_name.to_string()));
        }
        let instance: Instance = request.into();
        self.registry.reload_instance(&instance, old_name).await?;
        let mut instances = self.instances.write().await;
        instances.remove(old_name);
        instances.insert(instance.name.clone(), instance.clone());
        Ok(instance)
    }

    /// Remove an instance and re-run assignment evaluation so orphaned
    /// devices can be picked up elsewhere.
    pub async fn delete_instance(&self, name: &str) -> Result<()> {
        let orphaned = self.registry.remove_instance(name).await?;
        self.instances.write().await.remove(name);
        if orphaned > 0 {
            self.scheduler.evaluate_now(Utc::now()).await;
        }
        Ok(())
    }

    pub async fn get_instance(&self, name: &str) -> Option<Instance> {
        self.instances.read().await.get(name).cloned()
    }

    pub async fn list_instances(&self) -> Vec<Instance> {
        self.instances.read().await.values().cloned().collect()
    }

    // --- Device polling ----------------------------------------------------

    /// Compute the next task for a polling device.
    ///
    /// `None` always means "no work right now, poll again shortly"; all
    /// internal faults are logged here and flattened to `None`.
    pub async fn get_task(
        &self,
        device_uuid: Uuid,
        account_id: Option<&str>,
        startup: bool,
    ) -> Option<Task> {
        let instance_name = match self.resolve_instance(device_uuid).await {
            Ok(Some(name)) => name,
            Ok(None) => return None,
            Err(e) => {
                warn!(device = %device_uuid, error = %e, "Device resolution failed");
                return None;
            }
        };
        let controller = match self.registry.get(&instance_name).await {
            Some(controller) => controller,
            None => {
                warn!(
                    device = %device_uuid,
                    instance = %instance_name,
                    "Device bound to unknown instance"
                );
                return None;
            }
        };

        let mut ctx = TaskContext::new(device_uuid);
        if let Some(account_id) = account_id {
            ctx = ctx.with_account(account_id);
        }
        if startup {
            ctx = ctx.on_startup();
        }

        match controller.get_task(&ctx).await {
            Ok(Some(task)) => {
                // Switch directives carry no coordinate; everything else is
                // a real destination, null island included.
                if task.action != TaskAction::SwitchAccount {
                    if let Err(e) = self.devices.set_location(device_uuid, task.lat, task.lon).await
                    {
                        warn!(device = %device_uuid, error = %e, "Location update failed");
                    }
                }
                Some(task)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    device = %device_uuid,
                    instance = %instance_name,
                    error = %e,
                    "Task computation failed"
                );
                None
            }
        }
    }

    /// The binding table is authoritative; an unbound device adopts the
    /// instance named on its directory record, if any.
    async fn resolve_instance(&self, device_uuid: Uuid) -> Result<Option<String>> {
        if let Some(name) = self.binding.instance_of(device_uuid).await {
            return Ok(Some(name));
        }
        let device = self
            .devices
            .get(device_uuid)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("device {device_uuid}")))?;
        if let Some(name) = device.instance_name {
            self.binding.bind(device_uuid, &name).await;
            return Ok(Some(name));
        }
        Ok(None)
    }

    pub async fn bind_device(&self, device_uuid: Uuid, instance_name: &str) -> Result<()> {
        if self.registry.get(instance_name).await.is_none() {
            return Err(DispatchError::UnknownInstance(instance_name.to_string()));
        }
        self.binding.rebind(device_uuid, instance_name).await;
        Ok(())
    }

    pub async fn device_instance(&self, device_uuid: Uuid) -> Option<String> {
        self.binding.instance_of(device_uuid).await
    }

    /// Hand the device a fresh usable account for its instance's level
    /// bounds. Called after a switch-account directive.
    pub async fn assign_account(&self, device_uuid: Uuid) -> Result<Account> {
        let instance_name = self
            .resolve_instance(device_uuid)
            .await?
            .ok_or_else(|| DispatchError::NotFound(format!("device {device_uuid} is unbound")))?;
        let instance = self
            .get_instance(&instance_name)
            .await
            .ok_or_else(|| DispatchError::UnknownInstance(instance_name.clone()))?;
        let account = self
            .accounts
            .get_available(instance.min_level, instance.max_level)
            .await?
            .ok_or_else(|| {
                DispatchError::NotFound(format!(
                    "no usable account for levels {}-{}",
                    instance.min_level, instance.max_level
                ))
            })?;
        self.devices.bind_account(device_uuid, &account.id).await?;
        info!(device = %device_uuid, account = %account.id, "Account assigned");
        Ok(account)
    }

    // --- Observation -------------------------------------------------------

    pub async fn get_status(&self, instance_name: &str) -> Result<String> {
        self.registry.get_status(instance_name).await
    }

    /// Read-only queue copy; `None` for kinds without a queue.
    pub async fn queue_snapshot(&self, instance_name: &str) -> Result<Option<Vec<MapEntity>>> {
        let controller = self
            .registry
            .get(instance_name)
            .await
            .ok_or_else(|| DispatchError::UnknownInstance(instance_name.to_string()))?;
        Ok(controller.queue_snapshot().await)
    }

    // --- Entity feed -------------------------------------------------------

    /// Entry point for the "entity seen" subscription feed.
    pub async fn entity_seen(&self, entity: &MapEntity) {
        self.registry.route_entity_event(entity).await;
    }

    /// Entry point for the "entity resolved" feed; also publishes the
    /// entity downstream.
    pub async fn entity_resolved(&self, entity: &MapEntity) {
        self.registry.route_entity_resolved(entity).await;
    }

    // --- Assignment CRUD ---------------------------------------------------

    pub async fn create_assignment(&self, request: CreateAssignmentRequest) -> Result<Assignment> {
        request
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        self.scheduler.create(request).await
    }

    pub async fn update_assignment(
        &self,
        id: i64,
        request: CreateAssignmentRequest,
    ) -> Result<Assignment> {
        request
            .validate()
            .map_err(|e| DispatchError::Config(e.to_string()))?;
        self.scheduler.update(id, request).await
    }

    pub async fn delete_assignment(&self, id: i64) -> Result<()> {
        self.scheduler.delete(id).await
    }

    pub async fn list_assignments(&self) -> Vec<Assignment> {
        self.scheduler.list().await
    }

    /// Direct access to the scheduler, mainly for tests driving ticks with
    /// a controlled clock.
    pub fn scheduler(&self) -> &Arc<AssignmentScheduler> {
        &self.scheduler
    }
}
