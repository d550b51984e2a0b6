//! Domain models for the Scan Fleet backend.

pub mod account;
pub mod assignment;
pub mod device;
pub mod entity;
pub mod instance;
pub mod task;

pub use account::Account;
pub use assignment::{Assignment, CreateAssignmentRequest};
pub use device::Device;
pub use entity::MapEntity;
pub use instance::{CreateInstanceRequest, Instance, InstanceGeometry, InstanceKind, InstanceTuning};
pub use task::{Task, TaskAction};
