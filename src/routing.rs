//! Event routing across the composition hierarchy.
//!
//! Each coordination engine owns a [`RoutingTable`] resolved from its
//! coupled model descriptor. An event emitted by an atomic model travels:
//!
//! - **sideways** through the connections of its parent, into siblings;
//! - **up** through the parent's reexports, where it is routed again from
//!   the parent's point of view, up to the root;
//! - **down** through the imports of every coupled model it enters, until
//!   it reaches atomic models.
//!
//! The same walk is used twice: statically by the architecture builder,
//! to reject events that could re-enter their own emitter in the same
//! instant, and at run time to produce the actual deliveries.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::coupled::{CoupledModelDescriptor, EventSink, EventSource};
use crate::error::ArchitectureError;
use crate::event::{convert_event, Event, EventConverter, EventType};
use crate::types::ModelUri;

/// An event propagated to the parent under another type.
#[derive(Clone)]
pub(crate) struct Reexport {
    pub exported: EventType,
    pub converter: Option<EventConverter>,
}

/// Resolved routing tables of one coordination engine.
#[derive(Clone, Default)]
pub struct RoutingTable {
    connections: HashMap<EventSource, Vec<EventSink>>,
    reexports: HashMap<EventSource, Vec<Reexport>>,
    imports: HashMap<EventType, Vec<EventSink>>,
}

impl RoutingTable {
    /// Resolves the coupling maps of a coupled model.
    pub fn from_descriptor(desc: &CoupledModelDescriptor) -> Self {
        let mut reexports: HashMap<EventSource, Vec<Reexport>> = HashMap::new();
        for r in &desc.reexported_events {
            reexports.entry(r.source.clone()).or_default().push(Reexport {
                exported: r.exported,
                converter: r.converter.clone(),
            });
        }
        Self {
            connections: desc.connections.clone(),
            reexports,
            imports: desc.imported_events.clone(),
        }
    }

    /// Siblings connected to `source`.
    pub fn connection_sinks(&self, source: &EventSource) -> &[EventSink] {
        self.connections.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn reexports(&self, source: &EventSource) -> &[Reexport] {
        self.reexports.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Submodels receiving an imported event type.
    pub fn import_sinks(&self, event_type: EventType) -> &[EventSink] {
        self.imports.get(&event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of connection entries, for diagnostics.
    pub fn connection_count(&self) -> usize {
        self.connections.values().map(Vec::len).sum()
    }
}

/// The hierarchy as seen by the router.
pub(crate) trait RoutingTopology {
    /// Routing table of a coupled model, `None` for atomic models.
    fn table(&self, uri: &str) -> Option<&RoutingTable>;

    /// URI of the parent coupled model, `None` for the root.
    fn parent(&self, uri: &str) -> Option<&str>;
}

/// Outcome of routing one emitted event.
#[derive(Default)]
pub(crate) struct RouteResult {
    /// Atomic receivers and their independent copies, in routing order.
    pub deliveries: Vec<(ModelUri, Box<dyn Event>)>,
    /// Events leaving the root through its reexports.
    pub exported: Vec<Box<dyn Event>>,
    /// Hops that led nowhere.
    pub dropped: usize,
}

enum Hop {
    Up(ModelUri, EventType, Box<dyn Event>),
    Down(ModelUri, EventType, Box<dyn Event>),
}

/// Routes an event emitted by `source` (typically an atomic model).
pub(crate) fn route<T: RoutingTopology + ?Sized>(
    topo: &T,
    source: &str,
    event: Box<dyn Event>,
) -> RouteResult {
    let event_type = event.event_type();
    walk(topo, Hop::Up(source.to_string(), event_type, event))
}

/// Delivers an event entering `target` from outside, e.g. an injected one.
pub(crate) fn deliver_into<T: RoutingTopology + ?Sized>(
    topo: &T,
    target: &str,
    event: Box<dyn Event>,
) -> RouteResult {
    let event_type = event.event_type();
    walk(topo, Hop::Down(target.to_string(), event_type, event))
}

fn walk<T: RoutingTopology + ?Sized>(topo: &T, first: Hop) -> RouteResult {
    let mut result = RouteResult::default();
    let mut work = vec![first];
    while let Some(hop) = work.pop() {
        match hop {
            Hop::Up(child, event_type, event) => {
                let Some(parent) = topo.parent(&child) else {
                    result.exported.push(event);
                    continue;
                };
                let Some(table) = topo.table(parent) else {
                    result.dropped += 1;
                    continue;
                };
                let source = EventSource::of(child, event_type);
                let sinks = table.connection_sinks(&source);
                let reexports = table.reexports(&source);
                if sinks.is_empty() && reexports.is_empty() {
                    tracing::trace!(
                        from = %source.model_uri,
                        event = %event_type,
                        "event has no receiver"
                    );
                    result.dropped += 1;
                    continue;
                }
                // Pushed in reverse so that the stack pops them in declaration order.
                for r in reexports.iter().rev() {
                    let copy = convert_event(event.as_ref(), r.converter.as_ref());
                    work.push(Hop::Up(parent.to_string(), r.exported, copy));
                }
                for sink in sinks.iter().rev() {
                    let copy = convert_event(event.as_ref(), sink.converter.as_ref());
                    work.push(Hop::Down(sink.model_uri.clone(), sink.event_type, copy));
                }
            }
            Hop::Down(target, event_type, event) => match topo.table(&target) {
                None => result.deliveries.push((target, event)),
                Some(table) => {
                    let sinks = table.import_sinks(event_type);
                    if sinks.is_empty() {
                        result.dropped += 1;
                    }
                    for sink in sinks.iter().rev() {
                        let copy = convert_event(event.as_ref(), sink.converter.as_ref());
                        work.push(Hop::Down(sink.model_uri.clone(), sink.event_type, copy));
                    }
                }
            },
        }
    }
    result
}

/// Atomic models that an event of `event_type` emitted by `source` can
/// reach, following declared types only.
pub(crate) fn static_receivers<T: RoutingTopology + ?Sized>(
    topo: &T,
    source: &str,
    event_type: EventType,
) -> BTreeSet<ModelUri> {
    #[derive(Clone, PartialEq, Eq, Hash)]
    enum Step {
        Up(ModelUri, EventType),
        Down(ModelUri, EventType),
    }

    let mut receivers = BTreeSet::new();
    let mut seen = HashSet::new();
    let mut work = vec![Step::Up(source.to_string(), event_type)];
    while let Some(step) = work.pop() {
        if !seen.insert(step.clone()) {
            continue;
        }
        match &step {
            Step::Up(child, ty) => {
                if let Some(parent) = topo.parent(child) {
                    if let Some(table) = topo.table(parent) {
                        let src = EventSource::of(child.clone(), *ty);
                        for sink in table.connection_sinks(&src) {
                            work.push(Step::Down(sink.model_uri.clone(), sink.event_type));
                        }
                        for r in table.reexports(&src) {
                            work.push(Step::Up(parent.to_string(), r.exported));
                        }
                    }
                }
            }
            Step::Down(target, ty) => match topo.table(target) {
                None => {
                    receivers.insert(target.clone());
                }
                Some(table) => {
                    for sink in table.import_sinks(*ty) {
                        work.push(Step::Down(sink.model_uri.clone(), sink.event_type));
                    }
                }
            },
        }
    }
    receivers
}

/// Rejects any exported event of an atomic model that can be routed back
/// into that same model within the instant it is emitted.
pub(crate) fn check_reentry<'a, T, I>(topo: &T, exports: I) -> Result<(), ArchitectureError>
where
    T: RoutingTopology + ?Sized,
    I: IntoIterator<Item = (&'a str, EventType)>,
{
    for (uri, event_type) in exports {
        if static_receivers(topo, uri, event_type).contains(uri) {
            return Err(ArchitectureError::RoutingCycle {
                model: uri.to_string(),
                event: event_type.short_name().to_string(),
            });
        }
    }
    Ok(())
}

/// Topology assembled from descriptors, used before any engine exists.
pub(crate) struct StaticTopology {
    tables: HashMap<ModelUri, RoutingTable>,
    parents: HashMap<ModelUri, ModelUri>,
}

impl StaticTopology {
    pub fn new<'a>(coupled: impl IntoIterator<Item = &'a CoupledModelDescriptor>) -> Self {
        let mut tables = HashMap::new();
        let mut parents = HashMap::new();
        for desc in coupled {
            for sub in &desc.submodels {
                parents.insert(sub.clone(), desc.uri.clone());
            }
            tables.insert(desc.uri.clone(), RoutingTable::from_descriptor(desc));
        }
        Self { tables, parents }
    }
}

impl RoutingTopology for StaticTopology {
    fn table(&self, uri: &str) -> Option<&RoutingTable> {
        self.tables.get(uri)
    }

    fn parent(&self, uri: &str) -> Option<&str> {
        self.parents.get(uri).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mock::{Ping, Toggle};
    use crate::time::{Time, TimeUnit};
    use std::sync::Arc;

    fn ping() -> Box<dyn Event> {
        Box::new(Ping::new(Time::new(1.0, TimeUnit::Seconds), 1))
    }

    fn flat() -> StaticTopology {
        let root = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
            .with_submodels(["a", "b", "c"])
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("b"))
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("c"));
        StaticTopology::new([&root])
    }

    #[test]
    fn test_fan_out_delivers_independent_copies() {
        let topo = flat();
        let result = route(&topo, "a", ping());
        let receivers: Vec<_> = result.deliveries.iter().map(|(u, _)| u.as_str()).collect();
        assert_eq!(receivers, vec!["b", "c"]);
        assert_eq!(result.dropped, 0);
        assert!(result.exported.is_empty());
    }

    #[test]
    fn test_unconnected_event_is_dropped() {
        let topo = flat();
        let result = route(&topo, "b", ping());
        assert!(result.deliveries.is_empty());
        assert_eq!(result.dropped, 1);
    }

    #[test]
    fn test_reexport_then_import_with_conversion() {
        let to_toggle: EventConverter = Arc::new(|e: &dyn Event| -> Box<dyn Event> {
            Box::new(Toggle::new(e.time_of_occurrence()))
        });
        let left = CoupledModelDescriptor::new("left", TimeUnit::Seconds)
            .with_submodel("a")
            .reexport_event(EventType::of::<Ping>(), EventSource::new::<Ping>("a"), None);
        let right = CoupledModelDescriptor::new("right", TimeUnit::Seconds)
            .with_submodel("b")
            .import_event(EventType::of::<Toggle>(), EventSink::new::<Toggle>("b"));
        let root = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
            .with_submodels(["left", "right"])
            .connect(
                EventSource::new::<Ping>("left"),
                EventSink::new::<Toggle>("right").with_converter(to_toggle),
            )
            .reexport_event(EventType::of::<Ping>(), EventSource::new::<Ping>("left"), None);
        let topo = StaticTopology::new([&left, &right, &root]);

        let result = route(&topo, "a", ping());
        assert_eq!(result.deliveries.len(), 1);
        assert_eq!(result.deliveries[0].0, "b");
        assert!(result.deliveries[0].1.is::<Toggle>());
        assert_eq!(result.exported.len(), 1);
        assert!(result.exported[0].is::<Ping>());

        let receivers = static_receivers(&topo, "a", EventType::of::<Ping>());
        assert_eq!(receivers.into_iter().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_deliver_into_coupled_target() {
        let group = CoupledModelDescriptor::new("group", TimeUnit::Seconds)
            .with_submodels(["x", "y"])
            .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("x"))
            .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("y"));
        let topo = StaticTopology::new([&group]);

        let result = deliver_into(&topo, "group", ping());
        assert_eq!(result.deliveries.len(), 2);
        let result = deliver_into(&topo, "x", ping());
        assert_eq!(result.deliveries[0].0, "x");
    }

    #[test]
    fn test_self_loop_is_rejected() {
        let root = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
            .with_submodels(["a", "b"])
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("b"))
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("a"));
        let topo = StaticTopology::new([&root]);

        let err = check_reentry(&topo, [("a", EventType::of::<Ping>())]).unwrap_err();
        assert_eq!(
            err,
            ArchitectureError::RoutingCycle {
                model: "a".to_string(),
                event: "Ping".to_string(),
            }
        );
        assert!(check_reentry(&topo, [("b", EventType::of::<Ping>())]).is_ok());
    }

    #[test]
    fn test_diamond_is_allowed() {
        let group = CoupledModelDescriptor::new("group", TimeUnit::Seconds)
            .with_submodel("c")
            .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("c"));
        let root = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
            .with_submodels(["a", "group"])
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("group"))
            .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("group"));
        let topo = StaticTopology::new([&group, &root]);

        assert!(check_reentry(&topo, [("a", EventType::of::<Ping>())]).is_ok());
        assert_eq!(route(&topo, "a", ping()).deliveries.len(), 2);
    }
}
