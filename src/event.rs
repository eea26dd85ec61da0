//! Event definitions for the simulation kernel.
//!
//! Events are the discrete messages exchanged between models. The kernel
//! never interprets their content: it routes them by [`EventType`] through
//! the coupling tables and, once delivered, asks each event to apply itself
//! to the receiving model ([`Event::execute_on`]).
//!
//! # Defining an event
//!
//! ```
//! use devs_hioa::event::Event;
//! use devs_hioa::model::{downcast_target, AtomicModel};
//! use devs_hioa::error::ModelResult;
//! use devs_hioa::time::{Duration, Time};
//!
//! #[derive(Debug)]
//! struct Lamp { on: bool }
//!
//! impl AtomicModel for Lamp {
//!     fn time_advance(&self) -> Duration { Duration::INFINITY }
//! }
//!
//! #[derive(Clone, Debug)]
//! struct TurnOn { time: Time }
//!
//! impl Event for TurnOn {
//!     fn time_of_occurrence(&self) -> Time { self.time }
//!
//!     fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()> {
//!         downcast_target::<Lamp>(model, self)?.on = true;
//!         Ok(())
//!     }
//! }
//! ```

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::ModelResult;
use crate::model::AtomicModel;
use crate::time::Time;
use crate::types::{short_type_name, AsAny};

/// Identity of a concrete event type, used as routing key.
///
/// Two event types are equal when they are the same Rust type; the name is
/// kept for diagnostics and configuration files.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// The event type of `E`.
    pub fn of<E: Event>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: std::any::type_name::<E>(),
        }
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name.
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventType({})", self.short_name())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Object-safe services every event gets for free from `Clone`.
///
/// Implemented by a blanket impl; event authors only derive `Clone`.
pub trait EventMeta {
    /// Routing key of the concrete event type.
    fn event_type(&self) -> EventType;

    /// An independent boxed copy, used for one-to-many fan-out.
    fn clone_event(&self) -> Box<dyn Event>;
}

impl<E: Event + Clone> EventMeta for E {
    fn event_type(&self) -> EventType {
        EventType::of::<E>()
    }

    fn clone_event(&self) -> Box<dyn Event> {
        Box::new(self.clone())
    }
}

/// A timestamped message dispatched onto a target model.
///
/// Concrete events carry their own (optional) content as fields.
pub trait Event: EventMeta + AsAny + fmt::Debug + Send + Sync + 'static {
    /// Simulated time at which the event occurs.
    fn time_of_occurrence(&self) -> Time;

    /// Strict partial order used only to break ties among events delivered
    /// to the same model at the same instant.
    fn has_priority_over(&self, _other: &dyn Event) -> bool {
        false
    }

    /// Applies the effect of this event to the receiving model.
    ///
    /// Receiving an unexpected model type is a protocol violation; use
    /// [`downcast_target`](crate::model::downcast_target) to report it.
    fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()>;
}

impl Clone for Box<dyn Event> {
    fn clone(&self) -> Self {
        (**self).clone_event()
    }
}

impl dyn Event {
    /// Returns true if this event is of concrete type `E`.
    pub fn is<E: Event>(&self) -> bool {
        self.as_any().is::<E>()
    }

    /// Downcasts to the concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }
}

/// Translates an event of one type into an event of another type while it
/// travels along a connection, an import or a reexport.
pub type EventConverter = Arc<dyn Fn(&dyn Event) -> Box<dyn Event> + Send + Sync>;

/// Applies an optional converter, producing an independent copy either way.
pub fn convert_event(event: &dyn Event, converter: Option<&EventConverter>) -> Box<dyn Event> {
    match converter {
        Some(convert) => convert(event),
        None => event.clone_event(),
    }
}

/// Pending external events of one atomic model, kept in delivery order.
///
/// An event is inserted after every queued event that has priority over
/// it and before the first queued event it has priority over; events with
/// no priority relation keep their arrival order.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<Box<dyn Event>>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an event according to the priority relation.
    pub fn push(&mut self, event: Box<dyn Event>) {
        let lower = self
            .events
            .iter()
            .rposition(|queued| queued.has_priority_over(event.as_ref()))
            .map_or(0, |i| i + 1);
        let pos = self.events[lower..]
            .iter()
            .position(|queued| event.has_priority_over(queued.as_ref()))
            .map_or(self.events.len(), |i| lower + i);
        self.events.insert(pos, event);
    }

    /// Removes and returns, in delivery order, every event occurring at or
    /// before `time`.
    pub fn take_due(&mut self, time: Time) -> Vec<Box<dyn Event>> {
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.events)
            .into_iter()
            .partition(|e| e.time_of_occurrence() <= time);
        self.events = later;
        due
    }

    /// Returns true if some event occurs at or before `time`.
    pub fn has_due(&self, time: Time) -> bool {
        self.events.iter().any(|e| e.time_of_occurrence() <= time)
    }

    /// Occurrence time of the earliest queued event.
    pub fn earliest(&self) -> Option<Time> {
        self.events.iter().map(|e| e.time_of_occurrence()).min()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no event is queued.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drops every queued event.
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
