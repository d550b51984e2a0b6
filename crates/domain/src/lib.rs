//! Domain layer for the Scan Fleet backend.
//!
//! This crate contains:
//! - Domain models (Instance, Device, Assignment, Task, map entities)
//! - Boundary traits for the external collaborators (device directory,
//!   account pool, entity store, cell coverage, event/completion sinks)
//! - In-memory reference implementations of those boundaries

pub mod models;
pub mod services;
