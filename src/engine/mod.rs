//! Simulation engines and the arena that owns them.
//!
//! Every model of an architecture gets one engine, mirroring the model
//! tree: an [`AtomicEngine`] per atomic model and a
//! [`CoordinationEngine`] per coupled model. Engines live in an
//! [`EngineArena`] indexed by [`EngineId`] and looked up by URI; there is
//! no global registry.
//!
//! # Implementation Notes
//!
//! - Engines are only ever accessed through `&self`. Atomic engines lock
//!   their own state, coordination engines only lock their last event time.
//! - Parents are recorded by URI in the arena, which is what the router
//!   walks when an event goes up the hierarchy.

pub mod atomic;
pub mod coordinator;

use std::collections::HashMap;

use crate::error::{SimResult, SimulationError};
use crate::routing::{RoutingTable, RoutingTopology};
use crate::time::Time;
use crate::trace::TraceSink;
use crate::types::{EngineId, ModelUri};

pub use atomic::{AtomicEngine, ModelPhase, TransitionKind};
pub use coordinator::CoordinationEngine;

/// One engine of the arena.
#[derive(Debug)]
pub enum EngineNode {
    Atomic(AtomicEngine),
    Coordinator(CoordinationEngine),
}

impl EngineNode {
    pub fn uri(&self) -> &str {
        match self {
            EngineNode::Atomic(e) => e.uri(),
            EngineNode::Coordinator(e) => e.uri(),
        }
    }

    pub fn as_atomic(&self) -> Option<&AtomicEngine> {
        match self {
            EngineNode::Atomic(e) => Some(e),
            EngineNode::Coordinator(_) => None,
        }
    }

    pub fn as_coordinator(&self) -> Option<&CoordinationEngine> {
        match self {
            EngineNode::Coordinator(e) => Some(e),
            EngineNode::Atomic(_) => None,
        }
    }
}

/// Owner of every engine of one architecture.
#[derive(Debug)]
pub struct EngineArena {
    nodes: Vec<EngineNode>,
    index: HashMap<ModelUri, EngineId>,
    parents: HashMap<ModelUri, ModelUri>,
    root: EngineId,
}

impl EngineArena {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            parents: HashMap::new(),
            root: 0,
        }
    }

    /// Adds an engine and returns its id.
    pub(crate) fn insert(&mut self, node: EngineNode) -> EngineId {
        let id = self.nodes.len();
        self.index.insert(node.uri().to_string(), id);
        self.nodes.push(node);
        id
    }

    pub(crate) fn set_parent(&mut self, child: &str, parent: &str) {
        self.parents.insert(child.to_string(), parent.to_string());
    }

    pub(crate) fn set_root(&mut self, root: EngineId) {
        self.root = root;
    }

    pub fn root(&self) -> EngineId {
        self.root
    }

    pub fn node(&self, id: EngineId) -> &EngineNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EngineNode> {
        self.nodes.iter()
    }

    /// Looks up an engine by model URI.
    pub fn id_of(&self, uri: &str) -> Option<EngineId> {
        self.index.get(uri).copied()
    }

    pub fn get(&self, uri: &str) -> Option<&EngineNode> {
        self.id_of(uri).map(|id| &self.nodes[id])
    }

    pub fn atomic(&self, uri: &str) -> SimResult<&AtomicEngine> {
        self.get(uri)
            .and_then(EngineNode::as_atomic)
            .ok_or_else(|| SimulationError::UnknownModel(uri.to_string()))
    }

    /// Atomic engines, in arena order.
    pub fn atomics(&self) -> impl Iterator<Item = &AtomicEngine> {
        self.nodes.iter().filter_map(EngineNode::as_atomic)
    }

    /// Coordination engines, in arena order.
    pub fn coordinators(&self) -> impl Iterator<Item = &CoordinationEngine> {
        self.nodes.iter().filter_map(EngineNode::as_coordinator)
    }

    pub fn time_of_next_event(&self, id: EngineId) -> Time {
        match &self.nodes[id] {
            EngineNode::Atomic(e) => e.time_of_next_event(),
            EngineNode::Coordinator(e) => e.time_of_next_event(self),
        }
    }

    pub fn transition(&self, id: EngineId, time: Time, trace: Option<&dyn TraceSink>) -> SimResult<()> {
        match &self.nodes[id] {
            EngineNode::Atomic(e) => e.transition(time, trace).map(|_| ()),
            EngineNode::Coordinator(e) => e.transition(self, time, trace),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl RoutingTopology for EngineArena {
    fn table(&self, uri: &str) -> Option<&RoutingTable> {
        self.get(uri)
            .and_then(EngineNode::as_coordinator)
            .map(CoordinationEngine::routing)
    }

    fn parent(&self, uri: &str) -> Option<&str> {
        self.parents.get(uri).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupled::{CoupledModelDescriptor, EventSink, EventSource};
    use crate::models::mock::{Ping, RecorderModel, TickerModel};
    use crate::time::{Duration, TimeUnit};

    fn at(t: f64) -> Time {
        Time::new(t, TimeUnit::Seconds)
    }

    fn two_level() -> EngineArena {
        let desc = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
            .with_submodels(["ticker", "recorder"])
            .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder"));

        let mut arena = EngineArena::new();
        let ticker = arena.insert(EngineNode::Atomic(AtomicEngine::new(
            "ticker",
            TimeUnit::Seconds,
            Box::new(TickerModel::new(Duration::new(1.0, TimeUnit::Seconds))),
        )));
        let recorder = arena.insert(EngineNode::Atomic(AtomicEngine::new(
            "recorder",
            TimeUnit::Seconds,
            Box::new(RecorderModel::new("recorder")),
        )));
        let root = arena.insert(EngineNode::Coordinator(CoordinationEngine::new(
            "root",
            TimeUnit::Seconds,
            vec![ticker, recorder],
            RoutingTable::from_descriptor(&desc),
        )));
        arena.set_parent("ticker", "root");
        arena.set_parent("recorder", "root");
        arena.set_root(root);
        for engine in arena.atomics() {
            engine.initialise_state(at(0.0)).unwrap();
            engine.initialise_variables().unwrap();
        }
        arena
    }

    #[test]
    fn test_lookup_by_uri() {
        let arena = two_level();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.id_of("recorder"), Some(1));
        assert!(arena.atomic("root").is_err());
        assert!(arena.atomic("missing").is_err());
        assert_eq!(arena.parent("ticker"), Some("root"));
        assert!(arena.table("root").is_some());
        assert!(arena.table("ticker").is_none());
    }

    #[test]
    fn test_coordinator_next_event_is_min_of_children() {
        let arena = two_level();
        assert_eq!(arena.time_of_next_event(arena.root()), at(1.0));
    }

    #[test]
    fn test_collect_outputs_of_imminent_children() {
        let arena = two_level();
        let root = arena.node(arena.root()).as_coordinator().unwrap();
        let mut out = Vec::new();
        root.collect_outputs(&arena, at(1.0), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].0, "ticker");

        root.transition(&arena, at(1.0), None).unwrap();
        assert_eq!(root.time_of_last_event(), at(1.0));
        assert_eq!(arena.time_of_next_event(arena.root()), at(2.0));
    }
}
