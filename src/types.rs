//! Core type definitions for the simulation kernel.
//!
//! This module defines the identifiers shared by models, engines and
//! architecture descriptors, plus the downcasting helper used for
//! visitor-style event dispatch.

use std::any::Any;

/// Unique identifier of a model inside one architecture.
///
/// The kernel looks models up purely by URI, never by structural position
/// in the composition hierarchy.
pub type ModelUri = String;

/// Index of an engine inside the engine arena owned by a [`Simulation`].
///
/// [`Simulation`]: crate::simulation::Simulation
pub type EngineId = usize;

/// Name of an HIOA variable, unique within the model that declares it.
pub type VariableName = String;

/// Upcast to `Any` for trait objects.
///
/// Implemented for every `'static` type; used by events to reach the
/// concrete model type they act upon and by variable bindings to recover
/// the typed value cell.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Returns `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Returns the last path segment of a fully qualified type name.
///
/// `devs_hioa::models::fan::SwitchOn` becomes `SwitchOn`; generic
/// arguments are kept as written.
pub fn short_type_name(full: &str) -> &str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}
