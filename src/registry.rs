//! Model factory registry for configuration-driven setup.
//!
//! Descriptor files name model types, event types, variable types and
//! converters by string. The registry maps those names to factories and
//! type identities.
//!
//! # Example
//!
//! ```
//! use devs_hioa::architecture::ModelSpec;
//! use devs_hioa::models::mock::TickerModel;
//! use devs_hioa::registry::ModelRegistry;
//! use devs_hioa::time::{Duration, TimeUnit};
//! use std::collections::HashMap;
//!
//! let mut registry = ModelRegistry::new();
//! registry.register("Ticker", |spec| {
//!     Box::new(TickerModel::new(Duration::new(1.0, spec.time_unit)))
//! });
//!
//! let spec = ModelSpec {
//!     uri: "ticker".to_string(),
//!     time_unit: TimeUnit::Seconds,
//!     attrs: HashMap::new(),
//! };
//! assert!(registry.create("Ticker", &spec).is_some());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::architecture::{ModelFactory, ModelSpec};
use crate::event::{Event, EventConverter, EventType};
use crate::model::AtomicModel;
use crate::time::Duration;
use crate::variable::VariableType;

/// Name-based lookup of everything a descriptor file can reference.
#[derive(Default)]
pub struct ModelRegistry {
    factories: HashMap<String, ModelFactory>,
    events: HashMap<String, EventType>,
    variable_types: HashMap<String, VariableType>,
    converters: HashMap<String, EventConverter>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an atomic model factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&ModelSpec) -> Box<dyn AtomicModel> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    /// Registers the event type `E` under `name`.
    pub fn register_event<E: Event>(&mut self, name: impl Into<String>) {
        self.events.insert(name.into(), EventType::of::<E>());
    }

    /// Registers the variable type `T` under `name`.
    pub fn register_variable_type<T: 'static>(&mut self, name: impl Into<String>) {
        self.variable_types.insert(name.into(), VariableType::of::<T>());
    }

    pub fn register_converter(&mut self, name: impl Into<String>, converter: EventConverter) {
        self.converters.insert(name.into(), converter);
    }

    /// Creates a model instance by type name.
    pub fn create(&self, type_name: &str, spec: &ModelSpec) -> Option<Box<dyn AtomicModel>> {
        self.factories.get(type_name).map(|f| f(spec))
    }

    /// Shared factory for a type name.
    pub fn factory(&self, type_name: &str) -> Option<ModelFactory> {
        self.factories.get(type_name).cloned()
    }

    pub fn event_type(&self, name: &str) -> Option<EventType> {
        self.events.get(name).copied()
    }

    pub fn variable_type(&self, name: &str) -> Option<VariableType> {
        self.variable_types.get(name).copied()
    }

    pub fn converter(&self, name: &str) -> Option<EventConverter> {
        self.converters.get(name).cloned()
    }

    /// Returns true if a model type is registered.
    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Number of registered model types.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Registered model type names.
    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.factories.keys()
    }

    /// Registered event names.
    pub fn event_names(&self) -> impl Iterator<Item = &String> {
        self.events.keys()
    }

    /// Unregisters a model type.
    pub fn unregister(&mut self, type_name: &str) -> bool {
        self.factories.remove(type_name).is_some()
    }

    /// Clears every registration.
    pub fn clear(&mut self) {
        self.factories.clear();
        self.events.clear();
        self.variable_types.clear();
        self.converters.clear();
    }
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("model_types", &self.factories.keys().collect::<Vec<_>>())
            .field("events", &self.events.keys().collect::<Vec<_>>())
            .field("variable_types", &self.variable_types.keys().collect::<Vec<_>>())
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Creates a registry with the built-in models.
///
/// Model types and their attributes (durations in the model's time unit):
/// - `Fan` - `low_power`, `high_power`
/// - `SolarPanel` - `period`, `peak`
/// - `Battery` - `period`, `capacity`, `initial_level`, `low_threshold`
/// - `FanUser` - `script`, e.g. `"1:on, 3:high, 8:off"`
/// - `Ticker` - `period`, `limit`
/// - `Recorder` - `period`
/// - `Passive`
/// - `Level`
/// - `ToggleSource` - `period`, `toggles`
///
/// Events are registered under their type names, variable types as `f64`,
/// `i64`, `u64`, `bool` and `String`, and the converter
/// `battery_low_to_switch_off`.
pub fn create_default_registry() -> ModelRegistry {
    use crate::models::battery::{BatteryLow, BatteryModel};
    use crate::models::fan::{FanModel, SetHigh, SetLow, SwitchOff, SwitchOn};
    use crate::models::home::battery_low_to_switch_off;
    use crate::models::mock::{LevelModel, PassiveModel, Ping, RecorderModel, TickerModel, Toggle, ToggleSourceModel};
    use crate::models::solar::SolarPanelModel;
    use crate::models::user::{parse_script, FanUserModel};

    fn period(spec: &ModelSpec, default: f64) -> Duration {
        Duration::new(spec.attr_or("period", default), spec.time_unit)
    }

    let mut registry = ModelRegistry::new();

    registry.register("Fan", |spec| {
        Box::new(FanModel::new(spec.uri.clone(), spec.time_unit).with_power(
            spec.attr_or("low_power", FanModel::DEFAULT_LOW_POWER),
            spec.attr_or("high_power", FanModel::DEFAULT_HIGH_POWER),
        ))
    });

    registry.register("SolarPanel", |spec| {
        Box::new(
            SolarPanelModel::new(spec.uri.clone(), period(spec, 1.0))
                .with_peak(spec.attr_or("peak", SolarPanelModel::DEFAULT_PEAK)),
        )
    });

    registry.register("Battery", |spec| {
        Box::new(
            BatteryModel::new(spec.uri.clone(), period(spec, 1.0), spec.attr_or("capacity", 1000.0))
                .with_initial_level(spec.attr_or("initial_level", 1.0))
                .with_low_threshold(spec.attr_or("low_threshold", 0.2)),
        )
    });

    registry.register("FanUser", |spec| {
        let script = parse_script(spec.attr("script").unwrap_or(""), spec.time_unit).unwrap_or_else(|e| {
            tracing::warn!(uri = %spec.uri, error = %e, "ignoring invalid user script");
            Vec::new()
        });
        Box::new(FanUserModel::new(script))
    });

    registry.register("Ticker", |spec| {
        let ticker = TickerModel::new(period(spec, 1.0));
        Box::new(match spec.attr("limit").and_then(|s| s.parse().ok()) {
            Some(limit) => ticker.with_limit(limit),
            None => ticker,
        })
    });

    registry.register("Recorder", |spec| {
        let recorder = RecorderModel::new(spec.uri.clone());
        Box::new(match spec.attr("period").and_then(|s| s.parse().ok()) {
            Some(p) => recorder.with_period(Duration::new(p, spec.time_unit)),
            None => recorder,
        })
    });

    registry.register("Passive", |_| Box::new(PassiveModel::new()));

    registry.register("Level", |spec| Box::new(LevelModel::new(spec.uri.clone())));

    registry.register("ToggleSource", |spec| {
        Box::new(ToggleSourceModel::new(period(spec, 1.0), spec.attr_or("toggles", 1)))
    });

    registry.register_event::<SwitchOn>("SwitchOn");
    registry.register_event::<SwitchOff>("SwitchOff");
    registry.register_event::<SetHigh>("SetHigh");
    registry.register_event::<SetLow>("SetLow");
    registry.register_event::<BatteryLow>("BatteryLow");
    registry.register_event::<Ping>("Ping");
    registry.register_event::<Toggle>("Toggle");

    registry.register_variable_type::<f64>("f64");
    registry.register_variable_type::<i64>("i64");
    registry.register_variable_type::<u64>("u64");
    registry.register_variable_type::<bool>("bool");
    registry.register_variable_type::<String>("String");

    registry.register_converter("battery_low_to_switch_off", battery_low_to_switch_off());

    registry
}
