//! Coupled model descriptors.
//!
//! A coupled model is a composition of submodels (atomic or coupled) plus
//! declarative maps saying how events and variables flow between them:
//!
//! - **imported events**: events entering the coupled model from its parent,
//!   forwarded to submodels;
//! - **reexported events**: events emitted by a submodel, propagated one
//!   level up under the coupled model's own exported event type;
//! - **connections**: events emitted by one submodel and delivered to
//!   siblings;
//! - **imported / reexported variables** and **variable bindings**, the HIOA
//!   counterparts for shared variables.
//!
//! Any hop may translate the event through an [`EventConverter`].
//!
//! # Example
//!
//! ```
//! use devs_hioa::coupled::{CoupledModelDescriptor, EventSink, EventSource};
//! use devs_hioa::models::mock::Ping;
//! use devs_hioa::time::TimeUnit;
//!
//! let root = CoupledModelDescriptor::new("root", TimeUnit::Seconds)
//!     .with_submodels(["ticker", "recorder"])
//!     .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder"));
//!
//! assert_eq!(root.submodels, vec!["ticker", "recorder"]);
//! ```

use std::collections::HashMap;
use std::fmt;

use crate::event::{Event, EventConverter, EventType};
use crate::model::ModelInterface;
use crate::time::TimeUnit;
use crate::types::ModelUri;
use crate::variable::{VariableDecl, VariableType};

/// Emitting end of an event hop: a submodel and the event type it exports.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EventSource {
    pub model_uri: ModelUri,
    pub event_type: EventType,
}

impl EventSource {
    pub fn new<E: Event>(model_uri: impl Into<ModelUri>) -> Self {
        Self::of(model_uri, EventType::of::<E>())
    }

    pub fn of(model_uri: impl Into<ModelUri>, event_type: EventType) -> Self {
        Self {
            model_uri: model_uri.into(),
            event_type,
        }
    }
}

/// Receiving end of an event hop, with an optional conversion applied on
/// the way in.
#[derive(Clone)]
pub struct EventSink {
    pub model_uri: ModelUri,
    pub event_type: EventType,
    pub converter: Option<EventConverter>,
}

impl EventSink {
    pub fn new<E: Event>(model_uri: impl Into<ModelUri>) -> Self {
        Self::of(model_uri, EventType::of::<E>())
    }

    pub fn of(model_uri: impl Into<ModelUri>, event_type: EventType) -> Self {
        Self {
            model_uri: model_uri.into(),
            event_type,
            converter: None,
        }
    }

    /// Translates incoming events into `event_type`.
    pub fn with_converter(mut self, converter: EventConverter) -> Self {
        self.converter = Some(converter);
        self
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("model_uri", &self.model_uri)
            .field("event_type", &self.event_type)
            .field("converted", &self.converter.is_some())
            .finish()
    }
}

/// An event emitted by a submodel and propagated one level up.
#[derive(Clone)]
pub struct ReexportedEvent {
    /// Event type under which the coupled model exports it.
    pub exported: EventType,
    pub source: EventSource,
    pub converter: Option<EventConverter>,
}

impl fmt::Debug for ReexportedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReexportedEvent")
            .field("exported", &self.exported)
            .field("source", &self.source)
            .field("converted", &self.converter.is_some())
            .finish()
    }
}

/// A variable exported by a submodel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariableSource {
    pub model_uri: ModelUri,
    pub name: String,
    pub ty: VariableType,
}

impl VariableSource {
    pub fn new<T: 'static>(model_uri: impl Into<ModelUri>, name: impl Into<String>) -> Self {
        Self {
            model_uri: model_uri.into(),
            name: name.into(),
            ty: VariableType::of::<T>(),
        }
    }

    pub fn decl(&self) -> VariableDecl {
        VariableDecl {
            name: self.name.clone(),
            ty: self.ty,
        }
    }
}

/// A variable imported by a submodel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VariableSink {
    pub model_uri: ModelUri,
    pub name: String,
    pub ty: VariableType,
}

impl VariableSink {
    pub fn new<T: 'static>(model_uri: impl Into<ModelUri>, name: impl Into<String>) -> Self {
        Self {
            model_uri: model_uri.into(),
            name: name.into(),
            ty: VariableType::of::<T>(),
        }
    }

    pub fn decl(&self) -> VariableDecl {
        VariableDecl {
            name: self.name.clone(),
            ty: self.ty,
        }
    }
}

/// Describes a coupled model: its submodels and all coupling maps.
#[derive(Clone, Debug)]
pub struct CoupledModelDescriptor {
    /// Unique identifier of the coupled model
    pub uri: ModelUri,
    /// Unit of its simulated clock
    pub time_unit: TimeUnit,
    /// Submodel URIs, in declaration order
    pub submodels: Vec<ModelUri>,
    /// Event types entering from the parent, and where they go
    pub imported_events: HashMap<EventType, Vec<EventSink>>,
    /// Event types leaving to the parent
    pub exported_events: Vec<EventType>,
    pub reexported_events: Vec<ReexportedEvent>,
    /// Sibling-to-sibling event connections
    pub connections: HashMap<EventSource, Vec<EventSink>>,
    /// Variables entering from the parent, and the submodels importing them
    pub imported_variables: HashMap<VariableDecl, Vec<VariableSink>>,
    /// Variables of submodels exported by this coupled model
    pub reexported_variables: HashMap<VariableDecl, VariableSource>,
    /// Sibling-to-sibling variable bindings
    pub bindings: HashMap<VariableSource, Vec<VariableSink>>,
}

impl CoupledModelDescriptor {
    /// Creates a coupled model with no submodels.
    pub fn new(uri: impl Into<ModelUri>, time_unit: TimeUnit) -> Self {
        Self {
            uri: uri.into(),
            time_unit,
            submodels: Vec::new(),
            imported_events: HashMap::new(),
            exported_events: Vec::new(),
            reexported_events: Vec::new(),
            connections: HashMap::new(),
            imported_variables: HashMap::new(),
            reexported_variables: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    /// Adds a submodel.
    pub fn with_submodel(mut self, uri: impl Into<ModelUri>) -> Self {
        self.submodels.push(uri.into());
        self
    }

    /// Adds multiple submodels.
    pub fn with_submodels<I, S>(mut self, uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ModelUri>,
    {
        self.submodels.extend(uris.into_iter().map(Into::into));
        self
    }

    /// Forwards an imported event type to a submodel.
    pub fn import_event(mut self, event_type: EventType, sink: EventSink) -> Self {
        self.imported_events.entry(event_type).or_default().push(sink);
        self
    }

    /// Declares an exported event type. It must also be reexported from
    /// some submodel.
    pub fn export_event(mut self, event_type: EventType) -> Self {
        if !self.exported_events.contains(&event_type) {
            self.exported_events.push(event_type);
        }
        self
    }

    /// Propagates a submodel's event one level up as `exported`.
    pub fn reexport_event(
        self,
        exported: EventType,
        source: EventSource,
        converter: Option<EventConverter>,
    ) -> Self {
        let mut this = self.export_event(exported);
        this.reexported_events.push(ReexportedEvent {
            exported,
            source,
            converter,
        });
        this
    }

    /// Connects an event emitted by one submodel to a sibling.
    pub fn connect(mut self, source: EventSource, sink: EventSink) -> Self {
        self.connections.entry(source).or_default().push(sink);
        self
    }

    /// Forwards an imported variable to a submodel.
    pub fn import_variable(mut self, decl: VariableDecl, sink: VariableSink) -> Self {
        self.imported_variables.entry(decl).or_default().push(sink);
        self
    }

    /// Exports a submodel's variable under `decl`.
    pub fn reexport_variable(mut self, decl: VariableDecl, source: VariableSource) -> Self {
        self.reexported_variables.insert(decl, source);
        self
    }

    /// Binds a submodel's exported variable to a sibling's import.
    pub fn bind_variable(mut self, source: VariableSource, sink: VariableSink) -> Self {
        self.bindings.entry(source).or_default().push(sink);
        self
    }

    /// Returns true if `uri` is a direct submodel.
    pub fn has_submodel(&self, uri: &str) -> bool {
        self.submodels.iter().any(|s| s == uri)
    }

    /// Interface seen by the parent of this coupled model.
    pub fn interface(&self) -> ModelInterface {
        ModelInterface {
            imported_events: self.imported_events.keys().copied().collect(),
            exported_events: self.exported_events.clone(),
            imported_variables: self.imported_variables.keys().cloned().collect(),
            exported_variables: self.reexported_variables.keys().cloned().collect(),
        }
    }
}
