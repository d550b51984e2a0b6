//! Shared utilities and common types for the Scan Fleet backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Geometry types and geofence containment tests
//! - Encounter cooldown lookup
//! - Local time-of-day helpers
//! - Common validation logic

pub mod cooldown;
pub mod geometry;
pub mod localtime;
pub mod validation;
