//! Event types and the pending-event queue.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rng::SimRng;

/// JSON object carried by every event.
pub type Payload = Map<String, Value>;

/// Identifier of a dispatched or pending event, drawn from the run RNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt_{:016x}", self.0)
    }
}

/// Identifier grouping all events of one logical transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub u64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx_{:016x}", self.0)
    }
}

/// A dispatched (or pending) simulation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier within the run.
    pub id: EventId,
    /// Transaction this event belongs to.
    pub correlation_id: CorrelationId,
    /// Event that directly produced this one; `None` for roots.
    pub causation_id: Option<EventId>,
    /// Virtual time at which the event is dispatched.
    pub timestamp: Duration,
    /// Handler-level name of the event (e.g. `"withdraw"`).
    pub kind: String,
    /// Event data.
    pub payload: Payload,
}

impl Event {
    /// Whether this event has no causal parent.
    pub fn is_root(&self) -> bool {
        self.causation_id.is_none()
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Look up an integer payload field.
    pub fn field_i64(&self, name: &str) -> Option<i64> {
        self.payload.get(name).and_then(Value::as_i64)
    }

    /// Look up a string payload field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// When a new event should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FireAt {
    /// Relative to the current virtual time.
    After(Duration),
    /// At an absolute virtual time. Times in the past are rejected.
    At(Duration),
}

/// A request to schedule an event.
///
/// The scheduler fills in the identifier and the timestamp. Events emitted by
/// a handler inherit the correlation id of, and point their causation id at,
/// the event being handled unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Handler-level name of the event.
    pub kind: String,
    /// Event data.
    pub payload: Payload,
    /// Firing time.
    pub fire_at: FireAt,
    /// Explicit transaction; `None` means inherit (or draw a fresh one for roots).
    pub correlation_id: Option<CorrelationId>,
    /// Explicit causal parent; `None` means the handled event (or root).
    pub causation_id: Option<EventId>,
}

impl NewEvent {
    /// An event of the given kind firing immediately with an empty payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: Payload::new(),
            fire_at: FireAt::After(Duration::ZERO),
            correlation_id: None,
            causation_id: None,
        }
    }

    /// Replace the payload.
    ///
    /// Non-object values are wrapped under a `"value"` key.
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Payload::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Set a single payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Fire `delay` after the current virtual time.
    pub fn after(mut self, delay: Duration) -> Self {
        self.fire_at = FireAt::After(delay);
        self
    }

    /// Fire at an absolute virtual time.
    pub fn at(mut self, time: Duration) -> Self {
        self.fire_at = FireAt::At(time);
        self
    }

    /// Attach the event to an existing transaction.
    pub fn in_transaction(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Declare an explicit causal parent.
    pub fn caused_by(mut self, parent: EventId) -> Self {
        self.causation_id = Some(parent);
        self
    }
}

/// An event waiting in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    sequence: u64,
    event: Event,
}

impl ScheduledEvent {
    /// Creates a new scheduled event.
    pub fn new(event: Event, sequence: u64) -> Self {
        Self { sequence, event }
    }

    /// Returns the scheduled execution time.
    pub fn time(&self) -> Duration {
        self.event.timestamp
    }

    /// Insertion sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns a reference to the event.
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Consumes the scheduled event and returns the event.
    pub fn into_event(self) -> Event {
        self.event
    }
}

/// How the queue chooses among events eligible at the same virtual time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Draw uniformly from the run RNG. Exposes races.
    #[default]
    Random,
    /// Insertion order.
    Fifo,
}

/// Events bucketed by virtual time.
///
/// Within a bucket events are kept in insertion order; which one pops next is
/// decided by the [`TieBreak`] policy.
#[derive(Debug, Default)]
pub struct EventQueue {
    buckets: BTreeMap<Duration, Vec<ScheduledEvent>>,
    len: usize,
}

impl EventQueue {
    /// Creates a new empty event queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an event for execution.
    pub fn schedule(&mut self, event: ScheduledEvent) {
        self.buckets.entry(event.time()).or_default().push(event);
        self.len += 1;
    }

    /// Removes and returns one of the earliest scheduled events.
    ///
    /// An event whose causal parent is still pending in the same bucket is
    /// never eligible, so a parent always pops before its children.
    pub fn pop_earliest(
        &mut self,
        tie_break: TieBreak,
        rng: &mut SimRng,
    ) -> Option<ScheduledEvent> {
        let mut entry = self.buckets.first_entry()?;
        let bucket = entry.get_mut();
        let eligible = eligible_indices(bucket);
        let index = match tie_break {
            TieBreak::Random => eligible[rng.choose_index(eligible.len())],
            TieBreak::Fifo => eligible[0],
        };
        let scheduled = bucket.remove(index);
        if bucket.is_empty() {
            entry.remove();
        }
        self.len -= 1;
        Some(scheduled)
    }

    /// Virtual time of the earliest pending event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.buckets.keys().next().copied()
    }

    /// Number of events eligible at the earliest pending time.
    pub fn ready_count(&self) -> usize {
        self.buckets.values().next().map_or(0, Vec::len)
    }

    /// Find a pending event by id.
    pub fn find(&self, id: EventId) -> Option<&Event> {
        self.iter().find(|event| event.id == id)
    }

    /// Iterate pending events in time order, then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.buckets
            .values()
            .flat_map(|bucket| bucket.iter().map(ScheduledEvent::event))
    }

    /// Returns `true` if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of events in the queue.
    pub fn len(&self) -> usize {
        self.len
    }
}

/// Indices of the bucket entries whose parent is not waiting in the same bucket.
///
/// Parents are always scheduled before their children, so the first entry
/// of a non-empty bucket is a root of the bucket's causal forest and the
/// result is never empty.
fn eligible_indices(bucket: &[ScheduledEvent]) -> Vec<usize> {
    let pending: HashSet<EventId> = bucket.iter().map(|scheduled| scheduled.event.id).collect();
    let eligible: Vec<usize> = bucket
        .iter()
        .enumerate()
        .filter(|(_, scheduled)| {
            scheduled
                .event
                .causation_id
                .is_none_or(|parent| !pending.contains(&parent))
        })
        .map(|(index, _)| index)
        .collect();
    if eligible.is_empty() { vec![0] } else { eligible }
}
