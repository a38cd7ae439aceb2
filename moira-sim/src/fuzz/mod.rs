//! Fuzzing harness: payload, initial-state, and interleaving perturbation.
//!
//! All three fuzzers are stateless apart from their configuration and take
//! the run's [`SimRng`](crate::SimRng) explicitly, so a fuzzed run replays
//! exactly from its seed.
//!
//! ## Submodules
//!
//! - `config` - [`FuzzingConfig`] and mutation records
//! - `input` - [`InputFuzzer`] for event payloads
//! - `state` - [`StateFuzzer`] for initial state
//! - `scenario` - [`ScenarioFuzzer`] for orderings and scenario chaining

pub mod config;
pub mod input;
pub mod scenario;
pub mod state;

pub use config::{Fuzzed, FuzzingConfig, Mutation, MutationKind};
pub use input::InputFuzzer;
pub use scenario::{ChainMode, Scenario, ScenarioFuzzer};
pub use state::StateFuzzer;
