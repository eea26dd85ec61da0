//! Architecture descriptors and the validating builder.
//!
//! An [`Architecture`] is the declarative description of a simulation:
//! atomic model descriptors (URI, time unit, factory), coupled model
//! descriptors (submodels plus coupling maps) and the root URI. Building
//! it validates everything first, in this order:
//!
//! 1. URI uniqueness;
//! 2. the root is a coupled model;
//! 3. every submodel resolves to a descriptor and has a single parent;
//! 4. every import, export, connection, reexport and binding references
//!    declared event and variable types, and every submodel import is
//!    satisfied;
//! 5. no event can re-enter its emitter within the instant it is emitted.
//!
//! Any violation fails the build before a single engine exists. Atomic
//! models are instantiated during validation, since their interfaces are
//! what the coupling maps are checked against.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::coupled::{CoupledModelDescriptor, EventSink, VariableSink, VariableSource};
use crate::engine::{AtomicEngine, CoordinationEngine, EngineArena, EngineNode};
use crate::error::ArchitectureError;
use crate::event::EventType;
use crate::model::{AtomicModel, ModelInterface};
use crate::routing::{check_reentry, RoutingTable, StaticTopology};
use crate::simulation::Simulation;
use crate::time::TimeUnit;
use crate::types::{EngineId, ModelUri};
use crate::variable::{VariableDecl, VariableType};

/// Creates an atomic model from its descriptor data.
pub type ModelFactory = Arc<dyn Fn(&ModelSpec) -> Box<dyn AtomicModel> + Send + Sync>;

/// What a factory gets to build a model.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSpec {
    pub uri: ModelUri,
    pub time_unit: TimeUnit,
    pub attrs: HashMap<String, String>,
}

impl ModelSpec {
    /// Raw attribute value.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    /// Parsed attribute value, or `default` when absent or unparsable.
    pub fn attr_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.attrs.get(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(uri = %self.uri, key, raw = %raw, "ignoring unparsable attribute");
                default
            }),
        }
    }
}

/// Describes an atomic model.
#[derive(Clone)]
pub struct AtomicModelDescriptor {
    pub uri: ModelUri,
    pub time_unit: TimeUnit,
    pub factory: ModelFactory,
    pub attrs: HashMap<String, String>,
}

impl AtomicModelDescriptor {
    /// Creates a descriptor from a factory closure.
    pub fn new<F>(uri: impl Into<ModelUri>, time_unit: TimeUnit, factory: F) -> Self
    where
        F: Fn(&ModelSpec) -> Box<dyn AtomicModel> + Send + Sync + 'static,
    {
        Self::from_factory(uri, time_unit, Arc::new(factory))
    }

    /// Creates a descriptor from a shared factory.
    pub fn from_factory(uri: impl Into<ModelUri>, time_unit: TimeUnit, factory: ModelFactory) -> Self {
        Self {
            uri: uri.into(),
            time_unit,
            factory,
            attrs: HashMap::new(),
        }
    }

    /// Adds an attribute passed to the factory.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.insert(key.into(), value.to_string());
        self
    }

    pub fn spec(&self) -> ModelSpec {
        ModelSpec {
            uri: self.uri.clone(),
            time_unit: self.time_unit,
            attrs: self.attrs.clone(),
        }
    }

    /// Runs the factory.
    pub fn instantiate(&self) -> Box<dyn AtomicModel> {
        (self.factory)(&self.spec())
    }
}

impl fmt::Debug for AtomicModelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicModelDescriptor")
            .field("uri", &self.uri)
            .field("time_unit", &self.time_unit)
            .field("attrs", &self.attrs)
            .finish()
    }
}

/// The complete declarative description of a simulation.
#[derive(Clone, Debug)]
pub struct Architecture {
    pub root_uri: ModelUri,
    pub atomic: Vec<AtomicModelDescriptor>,
    pub coupled: Vec<CoupledModelDescriptor>,
    pub global_time_unit: TimeUnit,
}

/// Validated models, ready to be wrapped into engines.
struct Validated {
    models: HashMap<ModelUri, Box<dyn AtomicModel>>,
}

impl Architecture {
    pub fn new(root_uri: impl Into<ModelUri>, global_time_unit: TimeUnit) -> Self {
        Self {
            root_uri: root_uri.into(),
            atomic: Vec::new(),
            coupled: Vec::new(),
            global_time_unit,
        }
    }

    pub fn with_atomic(mut self, desc: AtomicModelDescriptor) -> Self {
        self.atomic.push(desc);
        self
    }

    pub fn with_coupled(mut self, desc: CoupledModelDescriptor) -> Self {
        self.coupled.push(desc);
        self
    }

    /// Runs every build-time check without creating engines.
    pub fn validate(&self) -> Result<(), ArchitectureError> {
        self.check().map(|_| ())
    }

    /// Validates the architecture and produces the engine tree.
    ///
    /// Can be called repeatedly; every call instantiates fresh models.
    pub fn build(&self) -> Result<Simulation, ArchitectureError> {
        let Validated { mut models } = self.check()?;
        let coupled: HashMap<&str, &CoupledModelDescriptor> =
            self.coupled.iter().map(|d| (d.uri.as_str(), d)).collect();
        let atomic: HashMap<&str, &AtomicModelDescriptor> =
            self.atomic.iter().map(|d| (d.uri.as_str(), d)).collect();

        let mut arena = EngineArena::new();
        let root = build_engine(&self.root_uri, &self.root_uri, &coupled, &atomic, &mut models, &mut arena)?;
        arena.set_root(root);
        tracing::debug!(root = %self.root_uri, engines = arena.len(), "architecture built");
        Ok(Simulation::new(arena, self.root_uri.clone(), self.global_time_unit))
    }

    fn check(&self) -> Result<Validated, ArchitectureError> {
        // 1. uniqueness
        let mut seen = HashSet::new();
        for uri in self
            .atomic
            .iter()
            .map(|d| &d.uri)
            .chain(self.coupled.iter().map(|d| &d.uri))
        {
            if !seen.insert(uri.as_str()) {
                return Err(ArchitectureError::DuplicateUri(uri.clone()));
            }
        }

        // 2. root
        let coupled: HashMap<&str, &CoupledModelDescriptor> =
            self.coupled.iter().map(|d| (d.uri.as_str(), d)).collect();
        let atomic: HashMap<&str, &AtomicModelDescriptor> =
            self.atomic.iter().map(|d| (d.uri.as_str(), d)).collect();
        let root = coupled
            .get(self.root_uri.as_str())
            .copied()
            .ok_or_else(|| ArchitectureError::RootNotCoupled(self.root_uri.clone()))?;

        // 3. submodels
        let mut parents: HashMap<&str, &str> = HashMap::new();
        for desc in &self.coupled {
            for sub in &desc.submodels {
                if !seen.contains(sub.as_str()) {
                    return Err(ArchitectureError::UnknownSubmodel {
                        parent: desc.uri.clone(),
                        submodel: sub.clone(),
                    });
                }
                if let Some(first) = parents.insert(sub.as_str(), desc.uri.as_str()) {
                    return Err(ArchitectureError::SharedSubmodel {
                        submodel: sub.clone(),
                        first: first.to_string(),
                        second: desc.uri.clone(),
                    });
                }
            }
        }
        if parents.contains_key(root.uri.as_str()) {
            return Err(ArchitectureError::ContainmentCycle(root.uri.clone()));
        }
        let reachable = reachable_from(root, &coupled)?;
        for uri in &seen {
            if !reachable.contains(*uri) {
                tracing::warn!(uri = %uri, "descriptor is not part of the architecture rooted at {}", self.root_uri);
            }
        }

        // 4. interfaces and coupling maps
        let mut models: HashMap<ModelUri, Box<dyn AtomicModel>> = HashMap::new();
        let mut interfaces: HashMap<&str, ModelInterface> = HashMap::new();
        for desc in &self.atomic {
            if reachable.contains(desc.uri.as_str()) {
                let model = desc.instantiate();
                interfaces.insert(desc.uri.as_str(), model.interface());
                models.insert(desc.uri.clone(), model);
            }
        }
        for desc in &self.coupled {
            if reachable.contains(desc.uri.as_str()) {
                interfaces.insert(desc.uri.as_str(), desc.interface());
            }
        }
        if !root.imported_variables.is_empty() {
            return Err(ArchitectureError::RootImportsVariables(root.uri.clone()));
        }
        let checker = CouplingChecker {
            interfaces: &interfaces,
        };
        let in_tree: Vec<&CoupledModelDescriptor> = self
            .coupled
            .iter()
            .filter(|d| reachable.contains(d.uri.as_str()))
            .collect();
        for desc in &in_tree {
            checker.check_events(desc)?;
            checker.check_variables(desc)?;
        }

        // 5. re-entry
        let topology = StaticTopology::new(in_tree.iter().copied());
        let exports: Vec<(&str, EventType)> = self
            .atomic
            .iter()
            .filter_map(|d| interfaces.get(d.uri.as_str()).map(|i| (d.uri.as_str(), i)))
            .flat_map(|(uri, i)| i.exported_events.iter().map(move |&t| (uri, t)))
            .collect();
        check_reentry(&topology, exports)?;

        // Variable bindings, resolved down to atomic exporters and importers.
        let resolver = VariableResolver {
            coupled: &coupled,
            atomic: &atomic,
        };
        let mut pairs = Vec::new();
        for desc in &in_tree {
            for (source, sinks) in &desc.bindings {
                let exporter = resolver.source(source)?;
                for sink in sinks {
                    for importer in resolver.sinks(sink) {
                        pairs.push((exporter.clone(), importer));
                    }
                }
            }
        }
        for ((exporter, var, ty), (importer, name)) in pairs {
            let shared = models
                .get(&exporter)
                .and_then(|m| m.exported_variable(&var))
                .ok_or_else(|| ArchitectureError::VariableNotExported {
                    model: exporter.clone(),
                    name: var.clone(),
                    ty: type_name(ty),
                })?;
            if let Some(model) = models.get_mut(&importer) {
                model
                    .bind_imported_variable(&name, &shared)
                    .map_err(|source| ArchitectureError::Binding {
                        model: importer.clone(),
                        name: name.clone(),
                        source,
                    })?;
            }
        }

        Ok(Validated { models })
    }
}

/// Coupled models reachable from the root, root included.
fn reachable_from<'a>(
    root: &'a CoupledModelDescriptor,
    coupled: &HashMap<&str, &'a CoupledModelDescriptor>,
) -> Result<HashSet<&'a str>, ArchitectureError> {
    let mut reachable = HashSet::new();
    let mut work = vec![root];
    reachable.insert(root.uri.as_str());
    while let Some(desc) = work.pop() {
        for sub in &desc.submodels {
            if !reachable.insert(sub.as_str()) {
                return Err(ArchitectureError::ContainmentCycle(sub.clone()));
            }
            if let Some(child) = coupled.get(sub.as_str()) {
                work.push(child);
            }
        }
    }
    Ok(reachable)
}

fn build_engine(
    uri: &str,
    parent: &str,
    coupled: &HashMap<&str, &CoupledModelDescriptor>,
    atomic: &HashMap<&str, &AtomicModelDescriptor>,
    models: &mut HashMap<ModelUri, Box<dyn AtomicModel>>,
    arena: &mut EngineArena,
) -> Result<EngineId, ArchitectureError> {
    if let Some(desc) = coupled.get(uri) {
        let mut children = Vec::with_capacity(desc.submodels.len());
        for sub in &desc.submodels {
            children.push(build_engine(sub, uri, coupled, atomic, models, arena)?);
            arena.set_parent(sub, uri);
        }
        return Ok(arena.insert(EngineNode::Coordinator(CoordinationEngine::new(
            uri,
            desc.time_unit,
            children,
            RoutingTable::from_descriptor(desc),
        ))));
    }
    let desc = atomic
        .get(uri)
        .ok_or_else(|| ArchitectureError::UnknownSubmodel {
            parent: parent.to_string(),
            submodel: uri.to_string(),
        })?;
    let model = models.remove(uri).unwrap_or_else(|| desc.instantiate());
    Ok(arena.insert(EngineNode::Atomic(AtomicEngine::new(uri, desc.time_unit, model))))
}

fn event_name(ty: EventType) -> String {
    ty.short_name().to_string()
}

fn type_name(ty: VariableType) -> String {
    ty.short_name().to_string()
}

struct CouplingChecker<'a> {
    interfaces: &'a HashMap<&'a str, ModelInterface>,
}

impl CouplingChecker<'_> {
    fn interface(&self, parent: &CoupledModelDescriptor, uri: &str) -> Result<&ModelInterface, ArchitectureError> {
        if !parent.has_submodel(uri) {
            return Err(ArchitectureError::NotASubmodel {
                parent: parent.uri.clone(),
                model: uri.to_string(),
            });
        }
        self.interfaces.get(uri).ok_or_else(|| ArchitectureError::UnknownSubmodel {
            parent: parent.uri.clone(),
            submodel: uri.to_string(),
        })
    }

    fn check_sink(&self, parent: &CoupledModelDescriptor, from: EventType, sink: &EventSink) -> Result<(), ArchitectureError> {
        let interface = self.interface(parent, &sink.model_uri)?;
        if !interface.imports_event(sink.event_type) {
            return Err(ArchitectureError::EventNotImported {
                model: sink.model_uri.clone(),
                event: event_name(sink.event_type),
            });
        }
        if sink.converter.is_none() && sink.event_type != from {
            return Err(ArchitectureError::MissingConverter {
                model: sink.model_uri.clone(),
                from: event_name(from),
                to: event_name(sink.event_type),
            });
        }
        Ok(())
    }

    fn check_events(&self, desc: &CoupledModelDescriptor) -> Result<(), ArchitectureError> {
        for (&event_type, sinks) in &desc.imported_events {
            for sink in sinks {
                self.check_sink(desc, event_type, sink)?;
            }
        }

        for (source, sinks) in &desc.connections {
            let interface = self.interface(desc, &source.model_uri)?;
            if !interface.exports_event(source.event_type) {
                return Err(ArchitectureError::EventNotExported {
                    model: source.model_uri.clone(),
                    event: event_name(source.event_type),
                });
            }
            for sink in sinks {
                self.check_sink(desc, source.event_type, sink)?;
            }
        }

        for reexport in &desc.reexported_events {
            let source = &reexport.source;
            let interface = self.interface(desc, &source.model_uri)?;
            if !interface.exports_event(source.event_type) {
                return Err(ArchitectureError::EventNotExported {
                    model: source.model_uri.clone(),
                    event: event_name(source.event_type),
                });
            }
            if !desc.exported_events.contains(&reexport.exported) {
                return Err(ArchitectureError::EventNotExported {
                    model: desc.uri.clone(),
                    event: event_name(reexport.exported),
                });
            }
            if reexport.converter.is_none() && reexport.exported != source.event_type {
                return Err(ArchitectureError::MissingConverter {
                    model: desc.uri.clone(),
                    from: event_name(source.event_type),
                    to: event_name(reexport.exported),
                });
            }
        }

        for &exported in &desc.exported_events {
            if !desc.reexported_events.iter().any(|r| r.exported == exported) {
                return Err(ArchitectureError::MissingReexport {
                    model: desc.uri.clone(),
                    event: event_name(exported),
                });
            }
        }

        // Every submodel import must be fed by the parent or a sibling.
        for sub in &desc.submodels {
            let interface = self.interface(desc, sub)?;
            for &wanted in &interface.imported_events {
                let feeds = |sink: &EventSink| sink.model_uri == *sub && sink.event_type == wanted;
                let satisfied = desc.imported_events.values().flatten().any(feeds)
                    || desc.connections.values().flatten().any(feeds);
                if !satisfied {
                    return Err(ArchitectureError::UnsatisfiedImport {
                        model: sub.clone(),
                        event: event_name(wanted),
                        parent: desc.uri.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn exported_decl(&self, desc: &CoupledModelDescriptor, source: &VariableSource) -> Result<(), ArchitectureError> {
        let interface = self.interface(desc, &source.model_uri)?;
        let decl = interface.exported_variable(&source.name).ok_or_else(|| {
            ArchitectureError::VariableNotExported {
                model: source.model_uri.clone(),
                name: source.name.clone(),
                ty: type_name(source.ty),
            }
        })?;
        if decl.ty != source.ty {
            return Err(ArchitectureError::VariableTypeMismatch {
                model: source.model_uri.clone(),
                name: source.name.clone(),
                expected: type_name(decl.ty),
                found: type_name(source.ty),
            });
        }
        Ok(())
    }

    fn imported_decl(&self, desc: &CoupledModelDescriptor, sink: &VariableSink, from: VariableType) -> Result<(), ArchitectureError> {
        let interface = self.interface(desc, &sink.model_uri)?;
        let decl = interface.imported_variable(&sink.name).ok_or_else(|| {
            ArchitectureError::VariableNotImported {
                model: sink.model_uri.clone(),
                name: sink.name.clone(),
                ty: type_name(sink.ty),
            }
        })?;
        for found in [sink.ty, from] {
            if decl.ty != found {
                return Err(ArchitectureError::VariableTypeMismatch {
                    model: sink.model_uri.clone(),
                    name: sink.name.clone(),
                    expected: type_name(decl.ty),
                    found: type_name(found),
                });
            }
        }
        Ok(())
    }

    fn check_variables(&self, desc: &CoupledModelDescriptor) -> Result<(), ArchitectureError> {
        let mut bound: HashMap<(&str, &str), usize> = HashMap::new();

        for (source, sinks) in &desc.bindings {
            self.exported_decl(desc, source)?;
            for sink in sinks {
                self.imported_decl(desc, sink, source.ty)?;
                *bound.entry((sink.model_uri.as_str(), sink.name.as_str())).or_default() += 1;
            }
        }
        for (decl, sinks) in &desc.imported_variables {
            for sink in sinks {
                self.imported_decl(desc, sink, decl.ty)?;
                *bound.entry((sink.model_uri.as_str(), sink.name.as_str())).or_default() += 1;
            }
        }
        for (decl, source) in &desc.reexported_variables {
            self.exported_decl(desc, source)?;
            if decl.ty != source.ty {
                return Err(ArchitectureError::VariableTypeMismatch {
                    model: desc.uri.clone(),
                    name: decl.name.clone(),
                    expected: type_name(decl.ty),
                    found: type_name(source.ty),
                });
            }
        }

        for sub in &desc.submodels {
            let interface = self.interface(desc, sub)?;
            for VariableDecl { name, .. } in &interface.imported_variables {
                match bound.get(&(sub.as_str(), name.as_str())).copied().unwrap_or(0) {
                    0 => {
                        return Err(ArchitectureError::UnboundVariable {
                            model: sub.clone(),
                            name: name.clone(),
                        })
                    }
                    1 => {}
                    _ => {
                        return Err(ArchitectureError::DuplicateVariableBinding {
                            model: sub.clone(),
                            name: name.clone(),
                        })
                    }
                }
            }
        }
        Ok(())
    }
}

/// Follows reexports and imports down to atomic models.
struct VariableResolver<'a> {
    coupled: &'a HashMap<&'a str, &'a CoupledModelDescriptor>,
    atomic: &'a HashMap<&'a str, &'a AtomicModelDescriptor>,
}

impl VariableResolver<'_> {
    /// Atomic exporter behind a (possibly reexported) variable.
    fn source(&self, source: &VariableSource) -> Result<(ModelUri, String, VariableType), ArchitectureError> {
        if self.atomic.contains_key(source.model_uri.as_str()) {
            return Ok((source.model_uri.clone(), source.name.clone(), source.ty));
        }
        let inner = self
            .coupled
            .get(source.model_uri.as_str())
            .and_then(|desc| desc.reexported_variables.get(&source.decl()))
            .ok_or_else(|| ArchitectureError::VariableNotExported {
                model: source.model_uri.clone(),
                name: source.name.clone(),
                ty: type_name(source.ty),
            })?;
        self.source(inner)
    }

    /// Atomic importers behind a (possibly forwarded) variable import.
    fn sinks(&self, sink: &VariableSink) -> Vec<(ModelUri, String)> {
        if self.atomic.contains_key(sink.model_uri.as_str()) {
            return vec![(sink.model_uri.clone(), sink.name.clone())];
        }
        self.coupled
            .get(sink.model_uri.as_str())
            .and_then(|desc| desc.imported_variables.get(&sink.decl()))
            .map(|inner| inner.iter().flat_map(|s| self.sinks(s)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coupled::EventSource;
    use crate::models::mock::{LevelModel, Ping, RecorderModel, TickerModel, Toggle, ToggleSourceModel};
    use crate::time::Duration;

    fn secs(v: f64) -> Duration {
        Duration::new(v, TimeUnit::Seconds)
    }

    fn ticker(uri: &str) -> AtomicModelDescriptor {
        AtomicModelDescriptor::new(uri, TimeUnit::Seconds, |_| Box::new(TickerModel::new(secs(1.0))))
    }

    fn recorder(uri: &str) -> AtomicModelDescriptor {
        AtomicModelDescriptor::new(uri, TimeUnit::Seconds, |spec| Box::new(RecorderModel::new(spec.uri.clone())))
    }

    #[test]
    fn test_model_spec_attributes() {
        let desc = ticker("t").with_attr("period", 2.5).with_attr("name", "x");
        let spec = desc.spec();
        assert_eq!(spec.attr_or("period", 1.0), 2.5);
        assert_eq!(spec.attr_or("missing", 7u32), 7);
        assert_eq!(spec.attr_or("name", 3.0), 3.0);
        assert_eq!(spec.attr("name"), Some("x"));
    }

    #[test]
    fn test_duplicate_uri() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .with_atomic(ticker("a"))
            .validate()
            .unwrap_err();
        assert_eq!(err, ArchitectureError::DuplicateUri("a".to_string()));
    }

    #[test]
    fn test_root_must_be_coupled() {
        let err = Architecture::new("a", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .validate()
            .unwrap_err();
        assert_eq!(err, ArchitectureError::RootNotCoupled("a".to_string()));
    }

    #[test]
    fn test_unknown_and_shared_submodels() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_coupled(CoupledModelDescriptor::new("root", TimeUnit::Seconds).with_submodel("ghost"))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::UnknownSubmodel { .. }));

        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .with_coupled(CoupledModelDescriptor::new("g", TimeUnit::Seconds).with_submodel("a"))
            .with_coupled(CoupledModelDescriptor::new("root", TimeUnit::Seconds).with_submodels(["a", "g"]))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::SharedSubmodel { .. }));
    }

    #[test]
    fn test_unsatisfied_import() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .with_atomic(recorder("b"))
            .with_coupled(CoupledModelDescriptor::new("root", TimeUnit::Seconds).with_submodels(["a", "b"]))
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ArchitectureError::UnsatisfiedImport {
                model: "b".to_string(),
                event: "Ping".to_string(),
                parent: "root".to_string(),
            }
        );
    }

    #[test]
    fn test_connection_type_checks() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .with_atomic(recorder("b"))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .connect(EventSource::new::<Toggle>("a"), EventSink::new::<Ping>("b")),
            )
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::EventNotExported { .. }));

        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(ticker("a"))
            .with_atomic(recorder("b"))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("b"))
                    .connect(EventSource::new::<Ping>("a"), EventSink::new::<Ping>("elsewhere")),
            )
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::NotASubmodel { .. }));
    }

    #[test]
    fn test_routing_cycle_rejected() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("r", TimeUnit::Seconds, |_| {
                Box::new(EchoRecorder)
            }))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodel("r")
                    .connect(EventSource::new::<Ping>("r"), EventSink::new::<Ping>("r")),
            )
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::RoutingCycle { .. }));
    }

    /// Imports and exports pings, so it can be wired onto itself.
    struct EchoRecorder;

    impl AtomicModel for EchoRecorder {
        fn interface(&self) -> ModelInterface {
            ModelInterface::new().imports::<Ping>().exports::<Ping>()
        }

        fn time_advance(&self) -> Duration {
            Duration::INFINITY
        }
    }

    fn hioa_pair() -> Architecture {
        Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("a", TimeUnit::Seconds, |_| {
                Box::new(ToggleSourceModel::new(secs(1.0), 3))
            }))
            .with_atomic(AtomicModelDescriptor::new("b", TimeUnit::Seconds, |spec| {
                Box::new(LevelModel::new(spec.uri.clone()))
            }))
    }

    #[test]
    fn test_unbound_variable() {
        let err = hioa_pair()
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .connect(EventSource::new::<Toggle>("a"), EventSink::new::<Toggle>("b")),
            )
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ArchitectureError::UnboundVariable {
                model: "a".to_string(),
                name: "level".to_string(),
            }
        );
    }

    #[test]
    fn test_variable_type_mismatch() {
        let err = hioa_pair()
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .connect(EventSource::new::<Toggle>("a"), EventSink::new::<Toggle>("b"))
                    .bind_variable(
                        VariableSource::new::<i64>("b", "level"),
                        VariableSink::new::<i64>("a", "level"),
                    ),
            )
            .validate()
            .unwrap_err();
        assert!(matches!(err, ArchitectureError::VariableTypeMismatch { .. }));
    }

    #[test]
    fn test_root_cannot_import_variables() {
        let err = hioa_pair()
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .import_variable(VariableDecl::of::<f64>("level"), VariableSink::new::<f64>("a", "level")),
            )
            .validate()
            .unwrap_err();
        assert_eq!(err, ArchitectureError::RootImportsVariables("root".to_string()));
    }

    #[test]
    fn test_valid_architecture_builds_twice() {
        let arch = hioa_pair().with_coupled(
            CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                .with_submodels(["a", "b"])
                .connect(EventSource::new::<Toggle>("a"), EventSink::new::<Toggle>("b"))
                .bind_variable(
                    VariableSource::new::<f64>("b", "level"),
                    VariableSink::new::<f64>("a", "level"),
                ),
        );
        let first = arch.build().unwrap();
        let second = arch.build().unwrap();
        assert_eq!(first.model_uris(), vec!["a", "b", "root"]);
        assert_eq!(second.root_uri(), "root");
    }

    /// Declares `level` but never hands out a handle to it.
    #[derive(Debug)]
    struct UndeliveredLevel;

    impl AtomicModel for UndeliveredLevel {
        fn interface(&self) -> ModelInterface {
            ModelInterface::new()
                .imports::<Toggle>()
                .exports_variable(VariableDecl::of::<f64>("level"))
        }

        fn time_advance(&self) -> Duration {
            Duration::INFINITY
        }
    }

    #[test]
    fn test_missing_variable_handle_names_declared_type() {
        let err = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("a", TimeUnit::Seconds, |_| {
                Box::new(ToggleSourceModel::new(secs(1.0), 3))
            }))
            .with_atomic(AtomicModelDescriptor::new("b", TimeUnit::Seconds, |_| Box::new(UndeliveredLevel)))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["a", "b"])
                    .connect(EventSource::new::<Toggle>("a"), EventSink::new::<Toggle>("b"))
                    .bind_variable(
                        VariableSource::new::<f64>("b", "level"),
                        VariableSink::new::<f64>("a", "level"),
                    ),
            )
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ArchitectureError::VariableNotExported {
                model: "b".to_string(),
                name: "level".to_string(),
                ty: "f64".to_string(),
            }
        );
    }
}
