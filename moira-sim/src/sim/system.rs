//! Contract between the scheduler and the system under test.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::events::{CorrelationId, Event, EventId, NewEvent};
use super::rng::SimRng;

/// A failure raised by the system under test while handling an event.
///
/// Faults are test results, not engine errors: the run records the fault,
/// drops whatever the handler emitted, and keeps dispatching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemFault {
    /// What went wrong.
    pub message: String,
}

impl SystemFault {
    /// Create a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SystemFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SystemFault {}

/// A fault captured during a run, with the event that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    /// Event whose handler failed.
    pub event_id: EventId,
    /// Kind of the failing event.
    pub kind: String,
    /// Virtual time of the failure.
    pub time: Duration,
    /// Fault message.
    pub message: String,
}

/// Handler-side view of the running simulation.
///
/// Gives access to the run RNG and virtual clock, and collects the events the
/// handler wants scheduled next.
pub struct SimContext<'a> {
    rng: &'a mut SimRng,
    now: Duration,
    event_id: EventId,
    correlation_id: CorrelationId,
    emitted: Vec<NewEvent>,
}

impl<'a> SimContext<'a> {
    pub(crate) fn new(rng: &'a mut SimRng, event: &Event) -> Self {
        Self {
            rng,
            now: event.timestamp,
            event_id: event.id,
            correlation_id: event.correlation_id,
            emitted: Vec::new(),
        }
    }

    /// The run RNG. Handlers must not use any other source of randomness.
    pub fn rng(&mut self) -> &mut SimRng {
        &mut *self.rng
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Seed of the run.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Id of the event being handled.
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Transaction of the event being handled.
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Request that an event be scheduled as a consequence of this one.
    pub fn emit(&mut self, event: NewEvent) {
        self.emitted.push(event);
    }

    pub(crate) fn into_emitted(self) -> Vec<NewEvent> {
        self.emitted
    }
}

/// The system under test, expressed as event handlers.
///
/// Handlers run synchronously, one event at a time. They must be pure with
/// respect to wall-clock time and ambient randomness: use [`SimContext::rng`]
/// and [`SimContext::now`] instead.
pub trait System {
    /// Handle one dispatched event.
    fn on_event(&mut self, event: &Event, ctx: &mut SimContext<'_>) -> Result<(), SystemFault>;

    /// Fingerprint of the current abstract state.
    ///
    /// Observed after every dispatch and fed to the reliability scorer. When
    /// `None`, the scheduler falls back to the kind of the dispatched event.
    fn state_fingerprint(&self) -> Option<String> {
        None
    }
}

impl<S: System + ?Sized> System for Box<S> {
    fn on_event(&mut self, event: &Event, ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
        (**self).on_event(event, ctx)
    }

    fn state_fingerprint(&self) -> Option<String> {
        (**self).state_fingerprint()
    }
}

/// A system that accepts every event and emits nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleSystem;

impl System for IdleSystem {
    fn on_event(&mut self, _event: &Event, _ctx: &mut SimContext<'_>) -> Result<(), SystemFault> {
        Ok(())
    }
}
