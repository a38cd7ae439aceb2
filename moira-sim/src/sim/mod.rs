//! Core simulation engine for deterministic testing.
//!
//! This module provides the [`SimWorld`] coordinator that owns virtual time,
//! the event queue, and the run RNG, and drives the system under test.
//!
//! ## Submodules
//!
//! - `world` - Core SimWorld type and scheduler settings
//! - `events` - Event types and queue for scheduling
//! - `system` - The system-under-test contract
//! - `rng` - Seeded per-run random number generation

pub mod events;
pub mod rng;
pub mod system;
pub mod world;

// Re-export main types at module level
pub use events::{
    CorrelationId, Event, EventId, EventQueue, FireAt, NewEvent, Payload, ScheduledEvent, TieBreak,
};
pub use rng::{RngState, SimRng};
pub use system::{FaultRecord, IdleSystem, SimContext, System, SystemFault};
pub use world::{RunStatus, SchedulerConfig, SimWorld};
