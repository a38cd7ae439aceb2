//! # Moira Simulation Engine
//!
//! Deterministic simulation and fault injection for event-driven systems.
//!
//! A system under test is expressed as event handlers ([`System`]) and driven
//! by a simulated scheduler ([`SimWorld`]) that owns virtual time and a seeded
//! RNG. Every run is reproducible from its seed alone.
//!
//! ## Core Components
//!
//! - [`SimWorld`]: one run, with its event queue, clock, RNG, and event log
//! - [`fuzz`]: payload, initial-state, and interleaving perturbation
//! - [`CausalityTracker`]: causal DAG reconstruction and critical paths
//! - [`ReliabilityScorer`]: Wilson and Good-Turing based confidence score
//! - [`Invariant`]: trace evaluators (`always`, `never`, `leads_to`, ...)
//! - [`SimulationBuilder`]: batches of runs, sequential or on parallel workers
//!
//! ## Quick Start
//!
//! ```
//! use moira_sim::{Event, NewEvent, SimContext, SimulationBuilder, System, SystemFault, never};
//!
//! struct Counter(u32);
//!
//! impl System for Counter {
//!     fn on_event(&mut self, event: &Event, ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
//!         self.0 += 1;
//!         if event.kind == "tick" && self.0 < 3 {
//!             ctx.emit(NewEvent::new("tick"));
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let report = SimulationBuilder::new()
//!     .seed(42)
//!     .iterations(10)
//!     .step(NewEvent::new("tick"))
//!     .invariant(never("no_overflow", |event| event.kind == "overflow"))
//!     .run(|_state| Counter(0))
//!     .unwrap();
//!
//! assert_eq!(report.failed_runs, 0);
//! ```
//!
//! ## Replaying a failing seed
//!
//! Every fatal error carries the seed and virtual time it happened at, and
//! [`SimulationReport::seeds_failing`] lists the runs that violated an
//! invariant. Re-running with `.seed(failing_seed).iterations(1)` reproduces
//! the exact event log.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod causality;
mod error;
pub mod fuzz;
pub mod invariant;
pub mod runner;
pub mod scoring;
pub mod sim;

pub use error::{SimulationError, SimulationResult};

pub use causality::{CausalDag, CausalityTracker, DagEdge, PathWeight};
pub use fuzz::{
    ChainMode, Fuzzed, FuzzingConfig, InputFuzzer, Mutation, MutationKind, Scenario, ScenarioFuzzer,
    StateFuzzer,
};
pub use invariant::{
    Invariant, InvariantResult, always, eventually, invariant_fn, leads_to, never, until,
};
pub use runner::{
    RunResult, SimulationBuilder, SimulationConfig, SimulationMetrics, SimulationReport,
};
pub use scoring::{
    ConfidenceInterval, CoverageTracker, Grade, ReliabilityScore, ReliabilityScorer, RunOutcome,
    state_fingerprint,
};
pub use sim::{
    CorrelationId, Event, EventId, FaultRecord, FireAt, NewEvent, Payload, RngState, RunStatus,
    SchedulerConfig, SimContext, SimRng, SimWorld, System, SystemFault, TieBreak,
};
