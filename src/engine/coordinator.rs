//! Coordination engine of a coupled model.
//!
//! Implements one level of the DEVS abstract simulator: the time of next
//! event is the minimum over the children, imminent children produce
//! outputs, and every child with something due transitions. The recursion
//! into children goes through the [`EngineArena`], which owns all engines.

use parking_lot::Mutex;

use crate::engine::{EngineArena, EngineNode};
use crate::error::SimResult;
use crate::event::Event;
use crate::routing::RoutingTable;
use crate::time::{Time, TimeUnit};
use crate::trace::TraceSink;
use crate::types::{EngineId, ModelUri};

/// Engine driving one coupled model.
pub struct CoordinationEngine {
    uri: ModelUri,
    time_unit: TimeUnit,
    children: Vec<EngineId>,
    routing: RoutingTable,
    time_of_last_event: Mutex<Time>,
}

impl CoordinationEngine {
    pub fn new(
        uri: impl Into<ModelUri>,
        time_unit: TimeUnit,
        children: Vec<EngineId>,
        routing: RoutingTable,
    ) -> Self {
        Self {
            uri: uri.into(),
            time_unit,
            children,
            routing,
            time_of_last_event: Mutex::new(Time::zero(time_unit)),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    /// Child engines, in submodel declaration order.
    pub fn children(&self) -> &[EngineId] {
        &self.children
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    pub fn time_of_last_event(&self) -> Time {
        *self.time_of_last_event.lock()
    }

    pub(crate) fn reset(&self, start: Time) {
        *self.time_of_last_event.lock() = start.to_unit(self.time_unit);
    }

    /// Minimum of the children's next event times, kept in the unit of the
    /// child it comes from so that imminence checks stay exact.
    pub fn time_of_next_event(&self, arena: &EngineArena) -> Time {
        self.children
            .iter()
            .map(|&child| arena.time_of_next_event(child))
            .min()
            .unwrap_or_else(|| Time::infinity(self.time_unit))
    }

    /// Collects the outputs of every imminent descendant, tagged with the
    /// URI of the atomic model that emitted them.
    pub fn collect_outputs(
        &self,
        arena: &EngineArena,
        time: Time,
        out: &mut Vec<(ModelUri, Box<dyn Event>)>,
    ) -> SimResult<()> {
        for &child in &self.children {
            match arena.node(child) {
                EngineNode::Atomic(engine) => {
                    for event in engine.output(time)? {
                        out.push((engine.uri().to_string(), event));
                    }
                }
                EngineNode::Coordinator(coordinator) => {
                    if coordinator.time_of_next_event(arena) == time {
                        coordinator.collect_outputs(arena, time, out)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Transitions every child with something due at `time`.
    ///
    /// Children run in declaration order; with the `parallel` feature they
    /// run on the rayon pool instead.
    pub fn transition(
        &self,
        arena: &EngineArena,
        time: Time,
        trace: Option<&dyn TraceSink>,
    ) -> SimResult<()> {
        let due: Vec<EngineId> = self
            .children
            .iter()
            .copied()
            .filter(|&child| arena.time_of_next_event(child) <= time)
            .collect();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            due.par_iter()
                .try_for_each(|&child| arena.transition(child, time, trace))?;
        }
        #[cfg(not(feature = "parallel"))]
        for child in due {
            arena.transition(child, time, trace)?;
        }

        *self.time_of_last_event.lock() = time.to_unit(self.time_unit);
        Ok(())
    }
}

impl std::fmt::Debug for CoordinationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationEngine")
            .field("uri", &self.uri)
            .field("time_unit", &self.time_unit)
            .field("children", &self.children)
            .finish()
    }
}
