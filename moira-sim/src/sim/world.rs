//! Core simulation world and event loop.
//!
//! [`SimWorld`] owns virtual time, the pending-event queue, the run RNG, and
//! the append-only event log of a single run. It drives a [`System`] one
//! event at a time; nothing else advances the clock.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::events::{
    CorrelationId, Event, EventId, EventQueue, FireAt, NewEvent, ScheduledEvent, TieBreak,
};
use super::rng::{RngState, SimRng};
use super::system::{FaultRecord, SimContext, System};
use crate::causality::CausalityTracker;
use crate::fuzz::{FuzzingConfig, InputFuzzer, Mutation};
use crate::{SimulationError, SimulationResult};

/// Scheduler settings for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Choice among events due at the same virtual time.
    pub tie_break: TieBreak,
    /// Maximum number of dispatches before the run is cut short.
    pub max_events: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::Random,
            max_events: 10_000,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The queue drained.
    Completed,
    /// `max_events` dispatches happened with events still pending.
    EventLimitReached,
}

/// A single deterministic simulation run.
///
/// Two worlds built from the same seed around the same system produce
/// byte-identical event logs.
pub struct SimWorld<S> {
    system: S,
    rng: SimRng,
    config: SchedulerConfig,
    queue: EventQueue,
    current_time: Duration,
    next_sequence: u64,
    events_processed: u64,
    event_ids: HashSet<EventId>,
    correlation_ids: HashSet<CorrelationId>,
    log: Vec<Event>,
    tracker: CausalityTracker,
    faults: Vec<FaultRecord>,
    visited_states: Vec<String>,
    input_fuzzer: Option<InputFuzzer>,
    mutations: Vec<Mutation>,
    aborted: Option<SimulationError>,
}

impl<S: System> SimWorld<S> {
    /// Creates a world for `seed` with the default scheduler settings.
    pub fn new(seed: u64, system: S) -> Self {
        Self::with_rng(SimRng::new(seed), system, SchedulerConfig::default())
    }

    /// Creates a world around an RNG that may already have been drawn from.
    ///
    /// Used when the initial state was fuzzed from the run RNG before the
    /// system was constructed.
    pub fn with_rng(rng: SimRng, system: S, config: SchedulerConfig) -> Self {
        let seed = rng.seed();
        Self {
            system,
            rng,
            config,
            queue: EventQueue::new(),
            current_time: Duration::ZERO,
            next_sequence: 0,
            events_processed: 0,
            event_ids: HashSet::new(),
            correlation_ids: HashSet::new(),
            log: Vec::new(),
            tracker: CausalityTracker::new(seed),
            faults: Vec::new(),
            visited_states: Vec::new(),
            input_fuzzer: None,
            mutations: Vec::new(),
            aborted: None,
        }
    }

    /// Fuzz the payload of every event scheduled from now on.
    pub fn enable_input_fuzzing(&mut self, config: FuzzingConfig) {
        self.input_fuzzer = Some(InputFuzzer::new(config));
    }

    /// The run seed.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Draw a fresh correlation id for a new transaction.
    pub fn begin_transaction(&mut self) -> CorrelationId {
        loop {
            let id = CorrelationId(self.rng.random());
            if self.correlation_ids.insert(id) {
                return id;
            }
        }
    }

    /// Schedule an event from outside any handler.
    ///
    /// Without an explicit correlation id the event starts a new transaction.
    /// Scheduling before the current time, or before the event's causal
    /// parent, aborts the run with `CausalityViolation`.
    #[instrument(skip(self, event), fields(kind = %event.kind))]
    pub fn schedule(&mut self, event: NewEvent) -> SimulationResult<EventId> {
        self.schedule_from(None, event)
    }

    fn schedule_from(
        &mut self,
        handled: Option<&Event>,
        new: NewEvent,
    ) -> SimulationResult<EventId> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }

        let time = match new.fire_at {
            FireAt::After(delay) => match self.current_time.checked_add(delay) {
                Some(time) => time,
                None => {
                    let reason = format!("delay {delay:?} overflows virtual time");
                    return Err(self.violation(reason));
                }
            },
            FireAt::At(time) => time,
        };
        if time < self.current_time {
            return Err(self.violation(format!(
                "'{}' scheduled at {:?}, before current time {:?}",
                new.kind, time, self.current_time
            )));
        }

        let causation_id = new.causation_id.or(handled.map(|event| event.id));
        let mut inherited = handled.map(|event| event.correlation_id);
        if let Some(parent_id) = causation_id {
            let parent = self
                .lookup(parent_id)
                .map(|parent| (parent.timestamp, parent.correlation_id));
            let Some((parent_time, parent_correlation)) = parent else {
                let reason = format!("'{}' names unknown causal parent {parent_id}", new.kind);
                return Err(self.violation(reason));
            };
            if parent_time > time {
                return Err(self.violation(format!(
                    "'{}' scheduled at {:?}, before its parent {} at {:?}",
                    new.kind, time, parent_id, parent_time
                )));
            }
            inherited = inherited.or(Some(parent_correlation));
        }

        let correlation_id = match new.correlation_id.or(inherited) {
            Some(id) => {
                self.correlation_ids.insert(id);
                id
            }
            None => self.begin_transaction(),
        };
        let id = self.fresh_event_id();

        let payload = match &self.input_fuzzer {
            Some(fuzzer) => {
                let fuzzed = fuzzer.fuzz_payload(&mut self.rng, &new.payload);
                self.mutations.extend(fuzzed.mutations);
                fuzzed.value
            }
            None => new.payload,
        };

        let event = Event {
            id,
            correlation_id,
            causation_id,
            timestamp: time,
            kind: new.kind,
            payload,
        };
        self.queue.schedule(ScheduledEvent::new(event, self.next_sequence));
        self.next_sequence += 1;
        Ok(id)
    }

    /// Dispatch the next event and advance virtual time to it.
    ///
    /// Returns `Ok(None)` once the queue is empty. After a fatal error every
    /// further call returns that same error.
    #[instrument(skip(self), fields(seed = self.rng.seed()))]
    pub fn step(&mut self) -> SimulationResult<Option<Event>> {
        if let Some(err) = &self.aborted {
            return Err(err.clone());
        }
        let Some(scheduled) = self.queue.pop_earliest(self.config.tie_break, &mut self.rng) else {
            return Ok(None);
        };

        let event = scheduled.into_event();
        self.current_time = event.timestamp;
        self.events_processed += 1;
        tracing::debug!(
            id = %event.id,
            kind = %event.kind,
            time = ?event.timestamp,
            "dispatching event"
        );

        if let Err(err) = self.tracker.record(event.clone()) {
            self.aborted = Some(err.clone());
            return Err(err);
        }
        self.log.push(event.clone());

        let mut ctx = SimContext::new(&mut self.rng, &event);
        let outcome = self.system.on_event(&event, &mut ctx);
        let emitted = ctx.into_emitted();

        match outcome {
            Ok(()) => {
                for new in emitted {
                    self.schedule_from(Some(&event), new)?;
                }
            }
            Err(fault) => {
                tracing::warn!(
                    seed = self.rng.seed(),
                    id = %event.id,
                    kind = %event.kind,
                    time = ?event.timestamp,
                    "system fault: {}",
                    fault
                );
                self.faults.push(FaultRecord {
                    event_id: event.id,
                    kind: event.kind.clone(),
                    time: event.timestamp,
                    message: fault.message,
                });
            }
        }

        let state = self
            .system
            .state_fingerprint()
            .unwrap_or_else(|| format!("kind:{}", event.kind));
        self.visited_states.push(state);

        Ok(Some(event))
    }

    /// Dispatch events until the queue drains or the event limit is hit.
    #[instrument(skip(self), fields(seed = self.rng.seed()))]
    pub fn run_to_completion(&mut self) -> SimulationResult<RunStatus> {
        loop {
            if self.events_processed >= self.config.max_events && !self.queue.is_empty() {
                tracing::warn!(
                    seed = self.rng.seed(),
                    max_events = self.config.max_events,
                    pending = self.queue.len(),
                    next_at = ?self.queue.peek_time(),
                    "event limit reached"
                );
                return Ok(RunStatus::EventLimitReached);
            }
            if self.step()?.is_none() {
                return Ok(RunStatus::Completed);
            }
        }
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> Duration {
        self.current_time
    }

    /// Number of events waiting to be dispatched.
    pub fn pending_event_count(&self) -> usize {
        self.queue.len()
    }

    /// Number of events dispatched so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Dispatched events, in dispatch order.
    ///
    /// Slicing the log together with [`rng_state`](Self::rng_state) lets a
    /// caller inspect the run step by step.
    pub fn event_log(&self) -> &[Event] {
        &self.log
    }

    /// The event log serialized as JSON.
    pub fn event_log_bytes(&self) -> SimulationResult<Vec<u8>> {
        serde_json::to_vec(&self.log).map_err(SimulationError::serialization)
    }

    /// Causal index over the dispatched events.
    pub fn tracker(&self) -> &CausalityTracker {
        &self.tracker
    }

    /// Current position of the run RNG.
    pub fn rng_state(&self) -> RngState {
        self.rng.state()
    }

    /// The run RNG, for drawing scenario decisions outside handlers.
    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    /// Faults raised by the system so far.
    pub fn faults(&self) -> &[FaultRecord] {
        &self.faults
    }

    /// Abstract state observed after every dispatch, in order.
    pub fn visited_states(&self) -> &[String] {
        &self.visited_states
    }

    /// Payload mutations applied by input fuzzing.
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Whether a fatal error stopped the run.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// The system under test.
    pub fn system(&self) -> &S {
        &self.system
    }

    /// Consume the world and return the system under test.
    pub fn into_system(self) -> S {
        self.system
    }

    fn lookup(&self, id: EventId) -> Option<&Event> {
        self.tracker.get(id).or_else(|| self.queue.find(id))
    }

    fn fresh_event_id(&mut self) -> EventId {
        loop {
            let id = EventId(self.rng.random());
            if self.event_ids.insert(id) {
                return id;
            }
        }
    }

    fn violation(&mut self, reason: String) -> SimulationError {
        let err = SimulationError::CausalityViolation {
            seed: self.rng.seed(),
            time: self.current_time,
            reason,
        };
        tracing::error!(seed = self.rng.seed(), time = ?self.current_time, "{}", err);
        self.aborted = Some(err.clone());
        err
    }
}
