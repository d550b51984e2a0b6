//! The capability interface every live instance controller implements.

use async_trait::async_trait;
use domain::models::{InstanceKind, MapEntity, Task};
use uuid::Uuid;

use crate::error::Result;

/// Inputs for one task poll.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub device_uuid: Uuid,
    pub account_id: Option<String>,
    /// True on the device's very first poll after (re)connecting.
    pub startup: bool,
}

impl TaskContext {
    pub fn new(device_uuid: Uuid) -> Self {
        Self {
            device_uuid,
            account_id: None,
            startup: false,
        }
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn on_startup(mut self) -> Self {
        self.startup = true;
        self
    }
}

/// A live behavioral object dispatching tasks for one instance.
///
/// Controllers never mutate device records; device identity and account
/// are read-only inputs here.
#[async_trait]
pub trait InstanceController: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> InstanceKind;

    /// Compute the next task for a polling device. `Ok(None)` means
    /// "no work right now, poll again shortly" and is never an error.
    async fn get_task(&self, ctx: &TaskContext) -> Result<Option<Task>>;

    /// Human-readable progress line. Not machine-parsed.
    async fn status(&self) -> Result<String>;

    /// Feed an externally observed entity in (priority instances only).
    async fn ingest(&self, _entity: MapEntity) -> Result<()> {
        Ok(())
    }

    /// Note that an entity got its detailed scan (priority instances only).
    async fn entity_resolved(&self, _entity: &MapEntity) {}

    /// Read-only queue copy (priority instances only).
    async fn queue_snapshot(&self) -> Option<Vec<MapEntity>> {
        None
    }

    /// Halt all background timers for this instance. Safe to call with
    /// polls in flight; in-flight polls finish on pre-stop state.
    async fn stop(&self);
}
