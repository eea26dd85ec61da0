//! Atomic simulation engine.
//!
//! Owns one atomic model together with its scheduling state: the time of
//! the last and next internal event and the queue of pending external
//! events. Everything sits behind one mutex, so a timer-driven transition
//! and a concurrently injected event never interleave on the same model.

use parking_lot::Mutex;

use crate::error::{ModelError, SimResult, SimulationError, VariableError};
use crate::event::{Event, EventQueue};
use crate::model::{AtomicModel, ExternalTransition, InternalTransition, VariableInit};
use crate::stats::ModelStats;
use crate::time::{Duration, Time, TimeUnit};
use crate::trace::TraceSink;
use crate::types::ModelUri;
use crate::variable::SharedVariable;

/// Lifecycle phase of an atomic model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelPhase {
    Uninitialised,
    Initialised,
    Active,
    Ended,
}

impl ModelPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelPhase::Uninitialised => "uninitialised",
            ModelPhase::Initialised => "initialised",
            ModelPhase::Active => "active",
            ModelPhase::Ended => "ended",
        }
    }
}

/// Which transition an atomic engine ran at one instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionKind {
    Internal,
    External,
    Confluent,
}

struct AtomicState {
    model: Box<dyn AtomicModel>,
    phase: ModelPhase,
    time_of_last_event: Time,
    time_of_next_event: Time,
    pending: EventQueue,
    stats: ModelStats,
}

/// Engine driving one atomic model.
pub struct AtomicEngine {
    uri: ModelUri,
    time_unit: TimeUnit,
    state: Mutex<AtomicState>,
}

impl AtomicEngine {
    /// Wraps a freshly constructed model.
    pub fn new(uri: impl Into<ModelUri>, time_unit: TimeUnit, model: Box<dyn AtomicModel>) -> Self {
        Self {
            uri: uri.into(),
            time_unit,
            state: Mutex::new(AtomicState {
                model,
                phase: ModelPhase::Uninitialised,
                time_of_last_event: Time::zero(time_unit),
                time_of_next_event: Time::infinity(time_unit),
                pending: EventQueue::new(),
                stats: ModelStats::default(),
            }),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.time_unit
    }

    pub fn phase(&self) -> ModelPhase {
        self.state.lock().phase
    }

    fn illegal(&self, phase: ModelPhase, operation: &'static str) -> SimulationError {
        SimulationError::IllegalState {
            uri: self.uri.clone(),
            phase: phase.as_str(),
            operation,
        }
    }

    fn protocol(&self, time: Time, source: ModelError) -> SimulationError {
        SimulationError::Protocol {
            uri: self.uri.clone(),
            time,
            source,
        }
    }

    /// Resets the model state for a run starting at `start`.
    pub fn initialise_state(&self, start: Time) -> SimResult<()> {
        let mut state = self.state.lock();
        if matches!(state.phase, ModelPhase::Initialised | ModelPhase::Active) {
            return Err(self.illegal(state.phase, "initialise"));
        }
        let start = start.to_unit(self.time_unit);
        state.model.initialise_state(start);
        state.pending.clear();
        state.stats = ModelStats::default();
        state.time_of_last_event = start;
        state.time_of_next_event = Time::infinity(self.time_unit);
        state.phase = ModelPhase::Initialised;
        Ok(())
    }

    /// Writes the initial values of exported variables, then schedules the
    /// first internal event.
    pub fn initialise_variables(&self) -> SimResult<()> {
        let mut state = self.state.lock();
        if state.phase != ModelPhase::Initialised {
            return Err(self.illegal(state.phase, "initialise variables"));
        }
        let start = state.time_of_last_event;
        state
            .model
            .initialise_variables(&VariableInit::new(&self.uri, start))
            .map_err(|e| self.protocol(start, e))?;
        state.time_of_next_event = start + state.model.time_advance();
        state.phase = ModelPhase::Active;
        Ok(())
    }

    /// Earliest of the next internal event and the earliest pending event.
    pub fn time_of_next_event(&self) -> Time {
        let state = self.state.lock();
        match state.pending.earliest() {
            Some(t) if t < state.time_of_next_event => t,
            _ => state.time_of_next_event,
        }
    }

    /// Time of the last transition.
    pub fn time_of_last_event(&self) -> Time {
        self.state.lock().time_of_last_event
    }

    /// Queues an external event.
    pub fn push_event(&self, event: Box<dyn Event>) -> SimResult<()> {
        let mut state = self.state.lock();
        if matches!(state.phase, ModelPhase::Uninitialised | ModelPhase::Ended) {
            return Err(self.illegal(state.phase, "receive an event"));
        }
        if event.time_of_occurrence() < state.time_of_last_event {
            return Err(SimulationError::TimeReversal {
                from: state.time_of_last_event,
                to: event.time_of_occurrence(),
            });
        }
        state.pending.push(event);
        state.stats.peak_queue_size = state.stats.peak_queue_size.max(state.pending.len());
        Ok(())
    }

    /// Runs the output function if the model is imminent at `time`.
    pub fn output(&self, time: Time) -> SimResult<Vec<Box<dyn Event>>> {
        let mut state = self.state.lock();
        if state.phase != ModelPhase::Active {
            return Err(self.illegal(state.phase, "output"));
        }
        if state.time_of_next_event != time {
            return Ok(Vec::new());
        }
        let local = time.to_unit(self.time_unit);
        let events = state.model.output(local).unwrap_or_default();
        state.stats.outputs_emitted += events.len() as u64;
        Ok(events)
    }

    /// Runs whichever transition is due at `time`, if any.
    pub fn transition(
        &self,
        time: Time,
        trace: Option<&dyn TraceSink>,
    ) -> SimResult<Option<TransitionKind>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.phase != ModelPhase::Active {
            return Err(self.illegal(state.phase, "transition"));
        }
        if time < state.time_of_last_event {
            return Err(SimulationError::TimeReversal {
                from: state.time_of_last_event,
                to: time,
            });
        }
        let now = time.to_unit(self.time_unit);
        let imminent = state.time_of_next_event == time;
        let due = state.pending.take_due(time);
        let kind = match (imminent, due.is_empty()) {
            (false, true) => return Ok(None),
            (true, true) => TransitionKind::Internal,
            (false, false) => TransitionKind::External,
            (true, false) => TransitionKind::Confluent,
        };
        let elapsed = now.since(state.time_of_last_event);

        if kind != TransitionKind::External {
            let ctx = InternalTransition::new(&self.uri, now, elapsed, trace);
            state
                .model
                .user_defined_internal_transition(&ctx)
                .map_err(|e| self.protocol(now, e))?;
        }
        if kind != TransitionKind::Internal {
            for event in &due {
                event
                    .execute_on(state.model.as_mut())
                    .map_err(|e| self.protocol(now, e))?;
            }
            state.stats.events_received += due.len() as u64;
            let confluent = kind == TransitionKind::Confluent;
            let elapsed = if confluent {
                Duration::zero(self.time_unit)
            } else {
                elapsed
            };
            let ctx = ExternalTransition::new(&self.uri, now, elapsed, confluent, trace);
            state
                .model
                .user_defined_external_transition(&ctx)
                .map_err(|e| self.protocol(now, e))?;
        }

        match kind {
            TransitionKind::Internal => state.stats.internal_transitions += 1,
            TransitionKind::External => state.stats.external_transitions += 1,
            TransitionKind::Confluent => state.stats.confluent_transitions += 1,
        }
        state.stats.record_transition(now);
        state.time_of_last_event = now;
        state.time_of_next_event = now + state.model.time_advance();
        tracing::trace!(uri = %self.uri, time = %now, ?kind, "transition");
        Ok(Some(kind))
    }

    /// Ends the run for this model. Idempotent.
    pub fn end(&self, end_time: Time) {
        let mut state = self.state.lock();
        if state.phase == ModelPhase::Ended {
            return;
        }
        if state.phase != ModelPhase::Uninitialised {
            state.model.end_simulation(end_time.to_unit(self.time_unit));
        }
        state.pending.clear();
        state.phase = ModelPhase::Ended;
    }

    /// Handle on an exported variable of the model.
    pub fn exported_variable(&self, name: &str) -> Option<SharedVariable> {
        self.state.lock().model.exported_variable(name)
    }

    /// Binds an imported variable of the model.
    pub fn bind_imported_variable(&self, name: &str, var: &SharedVariable) -> Result<(), VariableError> {
        self.state.lock().model.bind_imported_variable(name, var)
    }

    /// Runs `f` on the model if it is of type `M`.
    pub fn with_model<M: AtomicModel, R>(&self, f: impl FnOnce(&M) -> R) -> Option<R> {
        let state = self.state.lock();
        state.model.as_ref().as_any().downcast_ref::<M>().map(f)
    }

    pub fn final_report(&self) -> Option<serde_json::Value> {
        self.state.lock().model.final_report()
    }

    pub fn stats(&self) -> ModelStats {
        self.state.lock().stats.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }
}

impl std::fmt::Debug for AtomicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicEngine")
            .field("uri", &self.uri)
            .field("time_unit", &self.time_unit)
            .finish()
    }
}
