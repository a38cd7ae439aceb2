//! Exported causal graph of one transaction.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::sim::{CorrelationId, Event, EventId};

/// Directed causation edge, parent to child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DagEdge {
    /// The causing event.
    pub from: EventId,
    /// The caused event.
    pub to: EventId,
}

/// Read-only snapshot of the events sharing a correlation id.
///
/// Serializes as `{"correlation_id": .., "nodes": [..], "edges": [{"from": .., "to": ..}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalDag {
    /// Transaction the graph belongs to.
    pub correlation_id: CorrelationId,
    /// Events, ordered by virtual time then arrival.
    pub nodes: Vec<Event>,
    /// Causation edges between nodes of this graph.
    pub edges: Vec<DagEdge>,
}

impl CausalDag {
    /// Look up a node by id.
    pub fn node(&self, id: EventId) -> Option<&Event> {
        self.nodes.iter().find(|event| event.id == id)
    }

    /// Nodes with no incoming edge.
    pub fn roots(&self) -> Vec<EventId> {
        self.nodes
            .iter()
            .map(|event| event.id)
            .filter(|id| !self.edges.iter().any(|edge| edge.to == *id))
            .collect()
    }

    /// Nodes with no outgoing edge.
    pub fn leaves(&self) -> Vec<EventId> {
        self.nodes
            .iter()
            .map(|event| event.id)
            .filter(|id| !self.edges.iter().any(|edge| edge.from == *id))
            .collect()
    }

    /// Direct children of a node, in node order.
    pub fn children(&self, id: EventId) -> Vec<EventId> {
        self.edges
            .iter()
            .filter(|edge| edge.from == id)
            .map(|edge| edge.to)
            .collect()
    }

    /// Whether no node can reach itself.
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree: HashMap<EventId, usize> =
            self.nodes.iter().map(|event| (event.id, 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.to).or_insert(0) += 1;
            in_degree.entry(edge.from).or_insert(0);
        }

        let mut ready: VecDeque<EventId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0;
        while let Some(id) = ready.pop_front() {
            visited += 1;
            for edge in self.edges.iter().filter(|edge| edge.from == id) {
                if let Some(degree) = in_degree.get_mut(&edge.to) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(edge.to);
                    }
                }
            }
        }
        visited == in_degree.len()
    }

    /// Serialize to the JSON trace export format.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
