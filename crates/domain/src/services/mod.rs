//! Boundary contracts for the dispatch core's external collaborators.
//!
//! Concrete transport and storage live outside this workspace; the dispatch
//! crate only ever talks to these traits.

pub mod boundary;
pub mod memory;

pub use boundary::{
    AccountPool, BoundaryError, BoundaryResult, CellCoverage, CompletionSink, DeviceDirectory,
    EntityStore, EventSink,
};

pub use memory::{
    GridCellCoverage, InMemoryAccountPool, InMemoryDeviceDirectory, InMemoryEntityStore,
    RecordingCompletionSink, RecordingEventSink,
};
