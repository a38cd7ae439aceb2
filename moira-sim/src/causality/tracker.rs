//! Incremental causal index over dispatched events.
//!
//! Events live in an append-only arena addressed by position. Two maps index
//! the arena: event id to position, and parent id to child positions. A third
//! groups positions by correlation id. No event holds a reference to another,
//! so the graph can never form an ownership cycle; logical cycles (which only
//! externally recorded traces can contain) are detected at query time.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::causality::dag::{CausalDag, DagEdge};
use crate::sim::{CorrelationId, Event, EventId};
use crate::{SimulationError, SimulationResult};

/// Weight used when searching for the critical path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathWeight {
    /// Number of events on the path.
    #[default]
    EventCount,
    /// Virtual time elapsed between the root and the leaf.
    VirtualTime,
}

/// Causal index of one run (or of an externally supplied trace).
#[derive(Debug, Clone, Default)]
pub struct CausalityTracker {
    seed: u64,
    events: Vec<Event>,
    positions: HashMap<EventId, usize>,
    children: HashMap<EventId, Vec<usize>>,
    groups: BTreeMap<CorrelationId, Vec<usize>>,
}

/// Per-query view of one correlation group, with positions local to the group.
struct GroupGraph<'a> {
    events: Vec<&'a Event>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
}

impl<'a> GroupGraph<'a> {
    /// Events ordered by (timestamp, arrival); children in the same order.
    fn build(tracker: &'a CausalityTracker, arena_positions: &[usize]) -> Self {
        let mut ordered: Vec<usize> = arena_positions.to_vec();
        ordered.sort_by_key(|&pos| (tracker.events[pos].timestamp, pos));

        let local: HashMap<EventId, usize> = ordered
            .iter()
            .enumerate()
            .map(|(local, &pos)| (tracker.events[pos].id, local))
            .collect();

        let events: Vec<&Event> = ordered.iter().map(|&pos| &tracker.events[pos]).collect();
        let parent: Vec<Option<usize>> = events
            .iter()
            .map(|event| event.causation_id.and_then(|p| local.get(&p).copied()))
            .collect();

        let mut children = vec![Vec::new(); events.len()];
        for (child, parent) in parent.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(child);
            }
        }

        Self {
            events,
            parent,
            children,
        }
    }

    /// Topological order (Kahn), or `None` if the group contains a cycle.
    fn topological_order(&self) -> Option<Vec<usize>> {
        let mut ready: VecDeque<usize> = (0..self.events.len())
            .filter(|&node| self.parent[node].is_none())
            .collect();
        let mut order = Vec::with_capacity(self.events.len());
        while let Some(node) = ready.pop_front() {
            order.push(node);
            ready.extend(self.children[node].iter().copied());
        }
        (order.len() == self.events.len()).then_some(order)
    }

    fn edge_weight(&self, weight: PathWeight, from: usize, to: usize) -> u128 {
        match weight {
            PathWeight::EventCount => 1,
            PathWeight::VirtualTime => self.events[to]
                .timestamp
                .saturating_sub(self.events[from].timestamp)
                .as_nanos(),
        }
    }
}

impl CausalityTracker {
    /// Create an empty tracker for the run with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    /// Build a tracker from an existing, possibly partially ordered, trace.
    pub fn from_trace<I>(seed: u64, events: I) -> SimulationResult<Self>
    where
        I: IntoIterator<Item = Event>,
    {
        let mut tracker = Self::new(seed);
        for event in events {
            tracker.record(event)?;
        }
        Ok(tracker)
    }

    /// Append an event to the index.
    ///
    /// Parents do not need to be recorded first. Re-recording an id, or an
    /// event naming itself as its cause, is an integrity violation.
    pub fn record(&mut self, event: Event) -> SimulationResult<()> {
        if self.positions.contains_key(&event.id) {
            let reason = format!("event {} recorded twice", event.id);
            return Err(self.integrity(event.timestamp, reason));
        }
        if event.causation_id == Some(event.id) {
            let reason = format!("event {} is its own cause", event.id);
            return Err(self.integrity(event.timestamp, reason));
        }

        let position = self.events.len();
        self.positions.insert(event.id, position);
        if let Some(parent) = event.causation_id {
            self.children.entry(parent).or_default().push(position);
        }
        self.groups.entry(event.correlation_id).or_default().push(position);
        self.events.push(event);
        Ok(())
    }

    /// All recorded events, in recording order.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Look up a recorded event.
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.positions.get(&id).map(|&pos| &self.events[pos])
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Correlation ids seen so far, in ascending order.
    pub fn correlation_ids(&self) -> Vec<CorrelationId> {
        self.groups.keys().copied().collect()
    }

    /// The causal graph of all events sharing `correlation_id`.
    ///
    /// An event whose parent lies outside the group (or was never recorded)
    /// is a root of this graph.
    pub fn get_trace_as_dag(&self, correlation_id: CorrelationId) -> SimulationResult<CausalDag> {
        let graph = self.group(correlation_id)?;
        self.checked_order(&graph)?;

        let edges = graph
            .parent
            .iter()
            .enumerate()
            .filter_map(|(child, parent)| {
                parent.map(|parent| DagEdge {
                    from: graph.events[parent].id,
                    to: graph.events[child].id,
                })
            })
            .collect();

        Ok(CausalDag {
            correlation_id,
            nodes: graph.events.iter().map(|event| (*event).clone()).collect(),
            edges,
        })
    }

    /// One longest root-to-leaf path of the transaction.
    ///
    /// Ties go to the earliest-timestamp root, then to the earliest-timestamp
    /// child at every branch point; arrival order settles equal timestamps.
    pub fn get_critical_path(
        &self,
        correlation_id: CorrelationId,
        weight: PathWeight,
    ) -> SimulationResult<Vec<EventId>> {
        let graph = self.group(correlation_id)?;
        let order = self.checked_order(&graph)?;

        let n = graph.events.len();
        let leaf_value = match weight {
            PathWeight::EventCount => 1,
            PathWeight::VirtualTime => 0,
        };
        let mut best = vec![0u128; n];
        let mut next: Vec<Option<usize>> = vec![None; n];
        for &node in order.iter().rev() {
            let mut value = leaf_value;
            let mut chosen = None;
            // Children are in (timestamp, arrival) order: strict comparison keeps the earliest.
            for &child in &graph.children[node] {
                let candidate = graph.edge_weight(weight, node, child) + best[child];
                if chosen.is_none() || candidate > value {
                    value = candidate;
                    chosen = Some(child);
                }
            }
            best[node] = value;
            next[node] = chosen;
        }

        let mut current: Option<usize> = None;
        for root in (0..n).filter(|&node| graph.parent[node].is_none()) {
            let longer = match current {
                Some(chosen) => best[root] > best[chosen],
                None => true,
            };
            if longer {
                current = Some(root);
            }
        }

        let mut path = Vec::new();
        while let Some(node) = current {
            path.push(graph.events[node].id);
            current = next[node];
        }
        Ok(path)
    }

    /// The event followed by its chain of recorded causes, nearest first.
    ///
    /// Returns an empty chain for an unknown id.
    pub fn ancestors(&self, id: EventId) -> SimulationResult<Vec<EventId>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = self.get(id);
        while let Some(event) = current {
            if !seen.insert(event.id) {
                let reason = format!("causation cycle through {}", event.id);
                return Err(self.integrity(event.timestamp, reason));
            }
            chain.push(event.id);
            current = event.causation_id.and_then(|parent| self.get(parent));
        }
        Ok(chain)
    }

    /// The event followed by everything it transitively caused, depth first.
    ///
    /// Returns an empty list for an unknown id.
    pub fn descendants(&self, id: EventId) -> SimulationResult<Vec<EventId>> {
        let Some(&start) = self.positions.get(&id) else {
            return Ok(Vec::new());
        };

        let mut visited = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![start];
        while let Some(pos) = stack.pop() {
            let event = &self.events[pos];
            if !seen.insert(event.id) {
                let reason = format!("causation cycle through {}", event.id);
                return Err(self.integrity(event.timestamp, reason));
            }
            visited.push(event.id);

            let mut kids = self.children.get(&event.id).cloned().unwrap_or_default();
            kids.sort_by_key(|&child| (self.events[child].timestamp, child));
            stack.extend(kids.into_iter().rev());
        }
        Ok(visited)
    }

    fn group(&self, correlation_id: CorrelationId) -> SimulationResult<GroupGraph<'_>> {
        let positions = self
            .groups
            .get(&correlation_id)
            .ok_or(SimulationError::NotFound { correlation_id })?;
        Ok(GroupGraph::build(self, positions))
    }

    fn checked_order(&self, graph: &GroupGraph<'_>) -> SimulationResult<Vec<usize>> {
        graph.topological_order().ok_or_else(|| {
            let time = graph
                .events
                .iter()
                .map(|event| event.timestamp)
                .max()
                .unwrap_or_default();
            self.integrity(time, "causation graph contains a cycle".to_string())
        })
    }

    fn integrity(&self, time: Duration, reason: String) -> SimulationError {
        tracing::error!(seed = self.seed, ?time, "{}", reason);
        SimulationError::IntegrityViolation {
            seed: self.seed,
            time,
            reason,
        }
    }
}
