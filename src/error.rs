//! Error types of the simulation kernel.
//!
//! Configuration errors ([`ArchitectureError`]) are raised while an
//! architecture is built and abort before any engine exists. Runtime
//! errors ([`SimulationError`]) abort the current run and carry the
//! offending model URI and simulated time. Model code reports problems
//! through [`ModelError`], which the engines wrap.

use thiserror::Error;

use crate::time::Time;
use crate::types::ModelUri;

/// Errors reported while reading or binding HIOA variables.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VariableError {
    #[error("imported variable `{name}` is not bound to any exported variable")]
    Unbound { name: String },

    #[error("variable `{name}` has not been initialised yet")]
    Uninitialised { name: String },

    #[error("variable `{name}` has type {found}, expected {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("model does not import a variable named `{name}`")]
    UnknownImport { name: String },

    #[error("imported variable `{name}` is already bound")]
    AlreadyBound { name: String },
}

/// Errors raised by user model code: transitions and event execution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("event {event} cannot be executed on a model of type {model}")]
    UnexpectedEvent {
        event: &'static str,
        model: &'static str,
    },

    #[error(transparent)]
    Variable(#[from] VariableError),

    #[error("{0}")]
    Invalid(String),
}

/// Result type returned by model transition functions.
pub type ModelResult<T> = Result<T, ModelError>;

/// Rejections from the timer service collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("timer service has been shut down")]
    Shutdown,

    #[error("timer service rejected the task: {0}")]
    Rejected(String),
}

/// Configuration errors detected while building an architecture.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchitectureError {
    #[error("duplicate model URI: {0}")]
    DuplicateUri(ModelUri),

    #[error("root model {0} is not declared as a coupled model")]
    RootNotCoupled(ModelUri),

    #[error("coupled model {parent} references unknown submodel {submodel}")]
    UnknownSubmodel { parent: ModelUri, submodel: ModelUri },

    #[error("model {submodel} is a submodel of both {first} and {second}")]
    SharedSubmodel {
        submodel: ModelUri,
        first: ModelUri,
        second: ModelUri,
    },

    #[error("coupled model {0} contains itself")]
    ContainmentCycle(ModelUri),

    #[error("coupled model {parent} references {model}, which is not one of its submodels")]
    NotASubmodel { parent: ModelUri, model: ModelUri },

    #[error("model {model} does not import event type {event}")]
    EventNotImported { model: ModelUri, event: String },

    #[error("model {model} does not export event type {event}")]
    EventNotExported { model: ModelUri, event: String },

    #[error("event {from} reaches {model} as {to} without a converter")]
    MissingConverter {
        model: ModelUri,
        from: String,
        to: String,
    },

    #[error("root model {0} cannot import variables")]
    RootImportsVariables(ModelUri),

    #[error("coupled model {model} declares exported event {event} without a reexport source")]
    MissingReexport { model: ModelUri, event: String },

    #[error("event {event} imported by {model} is neither imported by {parent} nor connected")]
    UnsatisfiedImport {
        model: ModelUri,
        event: String,
        parent: ModelUri,
    },

    #[error("model {model} does not export a variable {name}: {ty}")]
    VariableNotExported {
        model: ModelUri,
        name: String,
        ty: String,
    },

    #[error("model {model} does not import a variable {name}: {ty}")]
    VariableNotImported {
        model: ModelUri,
        name: String,
        ty: String,
    },

    #[error("variable binding type mismatch on {model}.{name}: {expected} bound to {found}")]
    VariableTypeMismatch {
        model: ModelUri,
        name: String,
        expected: String,
        found: String,
    },

    #[error("imported variable {model}.{name} is not bound")]
    UnboundVariable { model: ModelUri, name: String },

    #[error("imported variable {model}.{name} is bound more than once")]
    DuplicateVariableBinding { model: ModelUri, name: String },

    #[error("event {event} emitted by {model} can be routed back into {model} in the same instant")]
    RoutingCycle { model: ModelUri, event: String },

    #[error("model {model} failed to bind variable {name}: {source}")]
    Binding {
        model: ModelUri,
        name: String,
        #[source]
        source: VariableError,
    },
}

/// Runtime errors that abort a simulation run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("protocol violation in model {uri} at {time}: {source}")]
    Protocol {
        uri: ModelUri,
        time: Time,
        #[source]
        source: ModelError,
    },

    #[error("model {uri} used in phase {phase}: {operation} is not allowed")]
    IllegalState {
        uri: ModelUri,
        phase: &'static str,
        operation: &'static str,
    },

    #[error("simulated time would go backwards from {from} to {to}")]
    TimeReversal { from: Time, to: Time },

    #[error("unknown model URI: {0}")]
    UnknownModel(ModelUri),

    #[error("simulation run is not active")]
    NotRunning,

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

/// Result type for simulation runs.
pub type SimResult<T> = Result<T, SimulationError>;
