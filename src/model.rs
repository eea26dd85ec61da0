//! Atomic model definitions and the `AtomicModel` trait.
//!
//! An atomic model is a local state machine driven by four DEVS functions:
//! a time advance, an output function, and the internal and external
//! transitions. Models hold domain state only; the scheduling bookkeeping
//! (time of last and next event, pending events) lives in the engine that
//! owns the model.
//!
//! Models describe what they exchange with the outside world through a
//! [`ModelInterface`], which the architecture builder checks against the
//! coupling declarations before any engine exists.

use crate::error::{ModelError, ModelResult, VariableError};
use crate::event::{Event, EventType};
use crate::time::{Duration, Time};
use crate::trace::TraceSink;
use crate::types::{short_type_name, AsAny};
use crate::variable::{SharedVariable, VariableDecl};

/// Events and variables a model imports and exports.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelInterface {
    pub imported_events: Vec<EventType>,
    pub exported_events: Vec<EventType>,
    pub imported_variables: Vec<VariableDecl>,
    pub exported_variables: Vec<VariableDecl>,
}

impl ModelInterface {
    /// Creates an empty interface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an imported event type.
    pub fn imports<E: Event>(mut self) -> Self {
        self.imported_events.push(EventType::of::<E>());
        self
    }

    /// Declares an exported event type.
    pub fn exports<E: Event>(mut self) -> Self {
        self.exported_events.push(EventType::of::<E>());
        self
    }

    /// Declares an imported variable.
    pub fn imports_variable(mut self, decl: VariableDecl) -> Self {
        self.imported_variables.push(decl);
        self
    }

    /// Declares an exported variable.
    pub fn exports_variable(mut self, decl: VariableDecl) -> Self {
        self.exported_variables.push(decl);
        self
    }

    /// Returns true if `ty` is an imported event type.
    pub fn imports_event(&self, ty: EventType) -> bool {
        self.imported_events.contains(&ty)
    }

    /// Returns true if `ty` is an exported event type.
    pub fn exports_event(&self, ty: EventType) -> bool {
        self.exported_events.contains(&ty)
    }

    /// Looks up an imported variable by name.
    pub fn imported_variable(&self, name: &str) -> Option<&VariableDecl> {
        self.imported_variables.iter().find(|d| d.name == name)
    }

    /// Looks up an exported variable by name.
    pub fn exported_variable(&self, name: &str) -> Option<&VariableDecl> {
        self.exported_variables.iter().find(|d| d.name == name)
    }
}

/// Context of the variable initialisation phase.
///
/// Grants one-off write access to exported variables at the start of a run,
/// see [`ExportedVar::initialise`](crate::variable::ExportedVar::initialise).
/// Only the engine creates it, so transitions cannot reach for it:
///
/// ```compile_fail
/// use devs_hioa::model::VariableInit;
/// use devs_hioa::time::{Time, TimeUnit};
///
/// let ctx = VariableInit::new("fan", Time::zero(TimeUnit::Seconds));
/// ```
pub struct VariableInit<'a> {
    uri: &'a str,
    start_time: Time,
}

impl<'a> VariableInit<'a> {
    pub(crate) fn new(uri: &'a str, start_time: Time) -> Self {
        Self { uri, start_time }
    }

    /// URI of the initialising model.
    pub fn uri(&self) -> &str {
        self.uri
    }

    /// Start of the run, in the model's unit.
    pub fn start_time(&self) -> Time {
        self.start_time
    }
}

/// Context of an internal transition.
///
/// Grants write access to exported variables, see
/// [`ExportedVar::set`](crate::variable::ExportedVar::set).
pub struct InternalTransition<'a> {
    uri: &'a str,
    current_time: Time,
    elapsed: Duration,
    trace: Option<&'a dyn TraceSink>,
}

impl<'a> InternalTransition<'a> {
    pub(crate) fn new(
        uri: &'a str,
        current_time: Time,
        elapsed: Duration,
        trace: Option<&'a dyn TraceSink>,
    ) -> Self {
        Self {
            uri,
            current_time,
            elapsed,
            trace,
        }
    }

    /// URI of the transitioning model.
    pub fn uri(&self) -> &str {
        self.uri
    }

    /// Time of the transition, in the model's unit.
    pub fn current_time(&self) -> Time {
        self.current_time
    }

    /// Time spent in the previous state.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Sends a line to the trace sink, if any.
    pub fn log(&self, text: impl AsRef<str>) {
        if let Some(trace) = self.trace {
            trace.log_message(self.uri, text.as_ref());
        }
    }
}

/// Context of an external transition.
///
/// By the time the user-defined external transition runs, every delivered
/// event has already been executed on the model.
pub struct ExternalTransition<'a> {
    uri: &'a str,
    current_time: Time,
    elapsed: Duration,
    confluent: bool,
    trace: Option<&'a dyn TraceSink>,
}

impl<'a> ExternalTransition<'a> {
    pub(crate) fn new(
        uri: &'a str,
        current_time: Time,
        elapsed: Duration,
        confluent: bool,
        trace: Option<&'a dyn TraceSink>,
    ) -> Self {
        Self {
            uri,
            current_time,
            elapsed,
            confluent,
            trace,
        }
    }

    /// URI of the transitioning model.
    pub fn uri(&self) -> &str {
        self.uri
    }

    /// Time of the transition, in the model's unit.
    pub fn current_time(&self) -> Time {
        self.current_time
    }

    /// Time spent in the previous state; zero for the external leg of a
    /// confluent transition.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Returns true when an internal transition ran just before, at the
    /// same instant.
    pub fn is_confluent(&self) -> bool {
        self.confluent
    }

    /// Sends a line to the trace sink, if any.
    pub fn log(&self, text: impl AsRef<str>) {
        if let Some(trace) = self.trace {
            trace.log_message(self.uri, text.as_ref());
        }
    }
}

/// The core trait that all atomic models must implement.
///
/// Lifecycle: constructed by a factory, then `initialise_state` and
/// `initialise_variables`, then any number of internal transitions (when
/// the time advance elapses) and external transitions (when events
/// arrive), then `end_simulation`.
///
/// A time advance of [`Duration::INFINITY`] means "passive until an
/// external event arrives". Returning a zero duration forces an immediate
/// internal transition; the transition must then change the state, or the
/// model loops at the same instant forever.
pub trait AtomicModel: AsAny + Send + 'static {
    /// Events and variables this model exchanges.
    fn interface(&self) -> ModelInterface {
        ModelInterface::default()
    }

    /// Resets the model state at the start of a run.
    fn initialise_state(&mut self, _start_time: Time) {}

    /// Writes the initial values of exported variables.
    ///
    /// Runs after every model of the architecture has initialised its state.
    fn initialise_variables(&mut self, _ctx: &VariableInit<'_>) -> ModelResult<()> {
        Ok(())
    }

    /// Time the model stays in its current state absent external events.
    fn time_advance(&self) -> Duration;

    /// Events emitted just before an internal transition.
    fn output(&mut self, _time: Time) -> Option<Vec<Box<dyn Event>>> {
        None
    }

    /// State change when the time advance elapses.
    fn user_defined_internal_transition(
        &mut self,
        _ctx: &InternalTransition<'_>,
    ) -> ModelResult<()> {
        Ok(())
    }

    /// State change after delivered events have been executed on the model.
    fn user_defined_external_transition(
        &mut self,
        _ctx: &ExternalTransition<'_>,
    ) -> ModelResult<()> {
        Ok(())
    }

    /// Called once when the run ends.
    fn end_simulation(&mut self, _end_time: Time) {}

    /// Handle on an exported variable, for binding.
    fn exported_variable(&self, _name: &str) -> Option<SharedVariable> {
        None
    }

    /// Binds an imported variable to an exported one.
    fn bind_imported_variable(
        &mut self,
        name: &str,
        _var: &SharedVariable,
    ) -> Result<(), VariableError> {
        Err(VariableError::UnknownImport {
            name: name.to_string(),
        })
    }

    /// Summary of the run, collected after `end_simulation`.
    fn final_report(&self) -> Option<serde_json::Value> {
        None
    }

    /// Short name of the concrete model type.
    fn model_type(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Downcasts the receiving model of an event to the concrete type the event
/// acts upon.
///
/// A mismatch is a protocol violation naming the event and the model type.
pub fn downcast_target<'m, M: AtomicModel>(
    model: &'m mut dyn AtomicModel,
    event: &dyn Event,
) -> ModelResult<&'m mut M> {
    let found = model.model_type();
    model
        .as_any_mut()
        .downcast_mut::<M>()
        .ok_or(ModelError::UnexpectedEvent {
            event: event.event_type().short_name(),
            model: found,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mock::{PassiveModel, Ping, RecorderModel, Toggle};
    use crate::time::TimeUnit;
    use crate::trace::MemorySink;

    fn at(t: f64) -> Time {
        Time::new(t, TimeUnit::Seconds)
    }

    #[test]
    fn test_interface_builder() {
        let interface = ModelInterface::new()
            .imports::<Ping>()
            .exports::<Toggle>()
            .imports_variable(VariableDecl::of::<f64>("level"))
            .exports_variable(VariableDecl::of::<bool>("on"));

        assert!(interface.imports_event(EventType::of::<Ping>()));
        assert!(!interface.imports_event(EventType::of::<Toggle>()));
        assert!(interface.exports_event(EventType::of::<Toggle>()));
        assert_eq!(
            interface.imported_variable("level"),
            Some(&VariableDecl::of::<f64>("level"))
        );
        assert!(interface.exported_variable("level").is_none());
        assert!(interface.exported_variable("on").is_some());
    }

    #[test]
    fn test_downcast_target() {
        let mut recorder = RecorderModel::new("rec");
        let ping = Ping::new(at(1.0), 1);
        let target = downcast_target::<RecorderModel>(&mut recorder, &ping);
        assert!(target.is_ok());

        let mut passive = PassiveModel::new();
        let err = downcast_target::<RecorderModel>(&mut passive, &ping).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnexpectedEvent {
                event: "Ping",
                model: "PassiveModel",
            }
        );
    }

    #[test]
    fn test_transition_contexts_log() {
        let sink = MemorySink::new();
        let internal = InternalTransition::new(
            "fan",
            at(2.0),
            Duration::new(2.0, TimeUnit::Seconds),
            Some(&sink),
        );
        internal.log("internal");
        assert_eq!(internal.uri(), "fan");
        assert_eq!(internal.current_time(), at(2.0));

        let external = ExternalTransition::new(
            "fan",
            at(2.0),
            Duration::zero(TimeUnit::Seconds),
            true,
            Some(&sink),
        );
        external.log("external");
        assert!(external.is_confluent());
        assert!(external.elapsed().is_zero());

        assert_eq!(
            sink.messages(),
            vec![
                ("fan".to_string(), "internal".to_string()),
                ("fan".to_string(), "external".to_string()),
            ]
        );
    }

    #[test]
    fn test_default_bind_rejects_unknown_import() {
        let mut passive = PassiveModel::new();
        let exported = crate::variable::ExportedVar::<f64>::new("x", "level");
        let err = passive
            .bind_imported_variable("level", &exported.shared())
            .unwrap_err();
        assert!(matches!(err, VariableError::UnknownImport { .. }));
    }
}
