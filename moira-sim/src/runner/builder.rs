//! Simulation builder pattern for configuring and running experiments.
//!
//! This module provides the main SimulationBuilder type for setting up
//! and executing batches of seeded runs.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::instrument;

use super::config::SimulationConfig;
use super::report::{RunResult, SimulationMetrics, SimulationReport};
use crate::fuzz::{FuzzingConfig, Scenario, ScenarioFuzzer, StateFuzzer};
use crate::invariant::{Invariant, InvariantResult, invariant_fn};
use crate::scoring::{ReliabilityScorer, RunOutcome};
use crate::sim::{Event, EventId, NewEvent, SchedulerConfig, SimRng, SimWorld, System};
use crate::{SimulationError, SimulationResult};

/// One planned iteration.
#[derive(Debug, Clone, Copy)]
struct RunPlan {
    iteration: usize,
    seed: u64,
}

/// Settings shared read-only by every run of a batch.
#[derive(Clone)]
struct RunSettings {
    scenario: Scenario,
    fuzzing: Option<FuzzingConfig>,
    scheduler: SchedulerConfig,
    invariants: Vec<Arc<dyn Invariant>>,
}

/// Builder pattern for configuring and running simulation experiments.
///
/// Each iteration gets its own seed, its own [`SimWorld`], and a fresh system
/// built by the factory from the (possibly fuzzed) initial state.
pub struct SimulationBuilder {
    base_seed: Option<u64>,
    seeds: Vec<u64>,
    iterations: usize,
    settings: RunSettings,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    /// Create a new empty simulation builder.
    pub fn new() -> Self {
        Self {
            base_seed: None,
            seeds: Vec::new(),
            iterations: 1,
            settings: RunSettings {
                scenario: Scenario::default(),
                fuzzing: None,
                scheduler: SchedulerConfig::default(),
                invariants: Vec::new(),
            },
        }
    }

    /// Create a builder from a validated configuration document.
    pub fn from_config(config: SimulationConfig) -> SimulationResult<Self> {
        config.validate()?;
        let mut builder = Self::new().iterations(config.iterations).scheduler(config.scheduler);
        builder.base_seed = config.seed;
        builder.settings.fuzzing = config.fuzzing;
        Ok(builder)
    }

    /// Set the base seed. The first iteration runs with exactly this seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.base_seed = Some(seed);
        self
    }

    /// Set specific seeds for deterministic debugging and regression testing.
    ///
    /// They are used for the first iterations, before derived seeds.
    pub fn seeds(mut self, seeds: Vec<u64>) -> Self {
        self.seeds = seeds;
        self
    }

    /// Set the number of iterations to run.
    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Replace the scenario.
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.settings.scenario = scenario;
        self
    }

    /// Set the initial state handed to the system factory.
    pub fn initial_state(mut self, state: Value) -> Self {
        self.settings.scenario.initial_state = state;
        self
    }

    /// Append a root event to the scenario.
    pub fn step(mut self, event: NewEvent) -> Self {
        self.settings.scenario.steps.push(event);
        self
    }

    /// Enable fuzzing.
    pub fn fuzzing(mut self, config: FuzzingConfig) -> Self {
        self.settings.fuzzing = Some(config);
        self
    }

    /// Set the scheduler settings.
    pub fn scheduler(mut self, config: SchedulerConfig) -> Self {
        self.settings.scheduler = config;
        self
    }

    /// Add an invariant evaluated against every run's event log.
    pub fn invariant(mut self, invariant: impl Invariant + 'static) -> Self {
        self.settings.invariants.push(Arc::new(invariant));
        self
    }

    /// Add a closure-based invariant.
    pub fn invariant_fn<F>(mut self, name: &str, check: F) -> Self
    where
        F: Fn(&[Event]) -> Option<EventId> + Send + Sync + 'static,
    {
        self.settings.invariants.push(invariant_fn(name, check));
        self
    }

    /// Run every iteration on the current thread.
    ///
    /// A fatal error in any run aborts the batch and is returned.
    #[instrument(skip_all)]
    pub fn run<S, F>(self, factory: F) -> SimulationResult<SimulationReport>
    where
        S: System,
        F: Fn(&Value) -> S,
    {
        self.validate()?;
        let (base_seed, generated, plans) = self.plan();

        let mut scorer = ReliabilityScorer::new();
        let mut runs = Vec::with_capacity(plans.len());
        for plan in plans {
            let result = execute_run(plan, &self.settings, &factory)?;
            scorer.observe(&result.outcome);
            runs.push(result);
        }

        Ok(finish(base_seed, generated, runs, &scorer))
    }

    /// Run iterations on `workers` blocking tokio tasks.
    ///
    /// Seeds are dealt round-robin so workers never share one. Results flow
    /// through a single channel to this task, which owns the scorer. The
    /// report is identical to [`run`](Self::run) apart from wall-clock metrics.
    #[instrument(skip_all)]
    pub async fn run_parallel<S, F>(
        self,
        workers: usize,
        factory: F,
    ) -> SimulationResult<SimulationReport>
    where
        S: System,
        F: Fn(&Value) -> S + Send + Sync + 'static,
    {
        self.validate()?;
        let (base_seed, generated, plans) = self.plan();
        let workers = workers.clamp(1, plans.len().max(1));

        let settings = Arc::new(self.settings);
        let factory = Arc::new(factory);
        let (tx, mut rx) = mpsc::channel::<SimulationResult<RunResult>>(workers * 2);

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let assigned: Vec<RunPlan> =
                plans.iter().skip(worker).step_by(workers).copied().collect();
            let tx = tx.clone();
            let settings = Arc::clone(&settings);
            let factory = Arc::clone(&factory);
            tasks.spawn_blocking(move || {
                tracing::debug!(worker, runs = assigned.len(), "worker started");
                for plan in assigned {
                    let result = execute_run(plan, &settings, factory.as_ref());
                    let fatal = result.is_err();
                    if tx.blocking_send(result).is_err() || fatal {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut scorer = ReliabilityScorer::new();
        let mut runs = Vec::with_capacity(plans.len());
        while let Some(result) = rx.recv().await {
            let result = result?;
            scorer.observe(&result.outcome);
            runs.push(result);
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|err| SimulationError::WorkerFailed(err.to_string()))?;
        }
        if runs.len() != plans.len() {
            return Err(SimulationError::WorkerFailed(format!(
                "received {} of {} run results",
                runs.len(),
                plans.len()
            )));
        }

        Ok(finish(base_seed, generated, runs, &scorer))
    }

    fn validate(&self) -> SimulationResult<()> {
        if self.settings.scheduler.max_events == 0 {
            return Err(SimulationError::InvalidConfig(
                "scheduler.max_events must be at least 1".to_string(),
            ));
        }
        match &self.settings.fuzzing {
            Some(fuzzing) => fuzzing.validate(),
            None => Ok(()),
        }
    }

    /// Resolve the base seed and the per-iteration seeds.
    fn plan(&self) -> (u64, bool, Vec<RunPlan>) {
        let (base_seed, generated) = match self.base_seed {
            Some(seed) => (seed, false),
            None => {
                let seed = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(12345);
                tracing::info!(base_seed = seed, "no seed configured, generated one");
                (seed, true)
            }
        };

        let count = self.iterations.max(self.seeds.len());
        let mut derive = SimRng::new(base_seed);
        let plans = (0..count)
            .map(|iteration| {
                let seed = if let Some(seed) = self.seeds.get(iteration) {
                    *seed
                } else if iteration == 0 {
                    base_seed
                } else {
                    derive.random()
                };
                RunPlan { iteration, seed }
            })
            .collect();
        (base_seed, generated, plans)
    }
}

fn finish(
    base_seed: u64,
    generated: bool,
    runs: Vec<RunResult>,
    scorer: &ReliabilityScorer,
) -> SimulationReport {
    let report = SimulationReport::from_runs(base_seed, generated, runs, scorer);
    tracing::info!(
        "Simulation completed: {}/{} iterations successful",
        report.successful_runs,
        report.iterations
    );
    tracing::info!("Seeds used: {:?}", report.seeds_used);
    if report.failed_runs > 0 {
        tracing::warn!(
            "{} iterations failed, failing seeds: {:?}",
            report.failed_runs,
            report.seeds_failing
        );
    }
    report
}

/// Execute one seeded run from state fuzzing to invariant evaluation.
fn execute_run<S, F>(
    plan: RunPlan,
    settings: &RunSettings,
    factory: &F,
) -> SimulationResult<RunResult>
where
    S: System,
    F: Fn(&Value) -> S + ?Sized,
{
    tracing::info!(iteration = plan.iteration, seed = plan.seed, "starting iteration");
    let start = Instant::now();
    let mut rng = SimRng::new(plan.seed);
    let mut mutations = Vec::new();

    let state = match &settings.fuzzing {
        Some(fuzzing) => {
            let fuzzed = StateFuzzer::new(fuzzing.clone())
                .fuzz_state(&mut rng, &settings.scenario.initial_state);
            mutations.extend(fuzzed.mutations);
            fuzzed.value
        }
        None => settings.scenario.initial_state.clone(),
    };

    let mut world = SimWorld::with_rng(rng, factory(&state), settings.scheduler);
    let mut steps = settings.scenario.steps.clone();
    if let Some(fuzzing) = &settings.fuzzing {
        world.enable_input_fuzzing(fuzzing.clone());
        if fuzzing.fuzz_scenarios {
            ScenarioFuzzer::new(fuzzing.clone()).shuffle_roots(world.rng_mut(), &mut steps);
        }
    }

    let transaction = world.begin_transaction();
    for step in steps {
        let step = match step.correlation_id {
            Some(_) => step,
            None => step.in_transaction(transaction),
        };
        world.schedule(step)?;
    }
    let status = world.run_to_completion()?;

    let invariant_results: Vec<InvariantResult> = settings
        .invariants
        .iter()
        .map(|invariant| invariant.evaluate(world.event_log()))
        .collect();
    for violation in invariant_results.iter().filter(|result| !result.satisfied) {
        tracing::warn!(
            seed = plan.seed,
            invariant = %violation.invariant_id,
            event = ?violation.violating_event_id,
            "invariant violated"
        );
    }

    let violated =
        invariant_results.iter().any(|result| !result.satisfied) || !world.faults().is_empty();
    mutations.extend_from_slice(world.mutations());

    Ok(RunResult {
        iteration: plan.iteration,
        seed: plan.seed,
        status,
        outcome: RunOutcome::new(plan.seed, world.visited_states().iter().cloned(), violated),
        invariant_results,
        faults: world.faults().to_vec(),
        mutations,
        metrics: SimulationMetrics {
            wall_time: start.elapsed(),
            simulated_time: world.current_time(),
            events_processed: world.events_processed(),
        },
        final_state: world.system().state_fingerprint(),
    })
}
