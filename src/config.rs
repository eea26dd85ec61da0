//! Architecture descriptor files.
//!
//! This module provides YAML/JSON support for describing an architecture
//! and its run parameters declaratively. Names of model types, events,
//! variable types and converters are resolved through a
//! [`ModelRegistry`].
//!
//! # Configuration File Structure
//!
//! ```yaml
//! simulation:
//!   root: home
//!   time_unit: hours
//!   start: 0
//!   end: 24
//!   acceleration: 3600
//!   log_level: info
//!
//! atomic:
//!   - uri: fan
//!     type: Fan
//!     attrs:
//!       high_power: 120
//!   - uri: user
//!     type: FanUser
//!     attrs:
//!       script: "1:on, 3:high, 8:off"
//!
//! coupled:
//!   - uri: home
//!     submodels: [user, fan]
//!     imported_events:
//!       - event: SwitchOn
//!         sinks: [{ model: fan, event: SwitchOn }]
//!     connections:
//!       - from: { model: user, event: SwitchOn }
//!         to: [{ model: fan, event: SwitchOn }]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use thiserror::Error;

use crate::architecture::{Architecture, AtomicModelDescriptor};
use crate::coupled::{CoupledModelDescriptor, EventSink, EventSource, VariableSink, VariableSource};
use crate::error::ArchitectureError;
use crate::event::{EventConverter, EventType};
use crate::registry::ModelRegistry;
use crate::simulation::Simulation;
use crate::time::{Time, TimeUnit};
use crate::types::ModelUri;
use crate::variable::{VariableDecl, VariableType};

/// Errors that can occur while loading or resolving a descriptor file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),

    #[error("Unknown model type `{type_name}` for {uri}")]
    UnknownModelType { uri: ModelUri, type_name: String },

    #[error("Unknown event type: {0}")]
    UnknownEvent(String),

    #[error("Unknown variable type: {0}")]
    UnknownVariableType(String),

    #[error("Unknown converter: {0}")]
    UnknownConverter(String),

    #[error(transparent)]
    Architecture(#[from] ArchitectureError),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Run parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// URI of the root coupled model
    #[serde(default = "default_root")]
    pub root: ModelUri,

    /// Global time unit, also the default unit of every model
    #[serde(default = "default_time_unit")]
    pub time_unit: TimeUnit,

    /// Start time, in the global unit
    #[serde(default)]
    pub start: f64,

    /// End time (exclusive), in the global unit
    #[serde(default = "default_end")]
    pub end: f64,

    /// Simulated seconds per wall-clock second in real-time runs
    #[serde(default = "default_acceleration")]
    pub acceleration: f64,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output directory for statistics
    #[serde(default)]
    pub output_dir: Option<String>,
}

fn default_root() -> ModelUri {
    "root".to_string()
}

fn default_time_unit() -> TimeUnit {
    TimeUnit::Seconds
}

fn default_end() -> f64 {
    100.0
}

fn default_acceleration() -> f64 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            root: default_root(),
            time_unit: default_time_unit(),
            start: 0.0,
            end: default_end(),
            acceleration: default_acceleration(),
            log_level: default_log_level(),
            output_dir: None,
        }
    }
}

/// An atomic model instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AtomicConfig {
    pub uri: ModelUri,

    /// Registered model type name
    #[serde(rename = "type")]
    pub model_type: String,

    /// Defaults to the global time unit
    #[serde(default)]
    pub time_unit: Option<TimeUnit>,

    /// Factory attributes; scalars are passed as their text
    #[serde(default)]
    pub attrs: HashMap<String, serde_json::Value>,
}

/// An `(model, event)` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEndpoint {
    pub model: ModelUri,
    pub event: String,
    /// Registered converter applied on the way in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportedEventConfig {
    pub event: String,
    pub sinks: Vec<EventEndpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReexportedEventConfig {
    /// Type under which the coupled model exports the event
    pub event: String,
    pub source: EventEndpoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub from: EventEndpoint,
    pub to: Vec<EventEndpoint>,
}

/// A `(model, variable)` endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VariableEndpoint {
    pub model: ModelUri,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImportedVariableConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub sinks: Vec<VariableEndpoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReexportedVariableConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: String,
    pub source: VariableEndpoint,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BindingConfig {
    #[serde(rename = "type")]
    pub var_type: String,
    pub from: VariableEndpoint,
    pub to: Vec<VariableEndpoint>,
}

/// A coupled model and its coupling maps.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoupledConfig {
    pub uri: ModelUri,

    #[serde(default)]
    pub time_unit: Option<TimeUnit>,

    #[serde(default)]
    pub submodels: Vec<ModelUri>,

    #[serde(default)]
    pub imported_events: Vec<ImportedEventConfig>,

    #[serde(default)]
    pub reexported_events: Vec<ReexportedEventConfig>,

    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    #[serde(default)]
    pub imported_variables: Vec<ImportedVariableConfig>,

    #[serde(default)]
    pub reexported_variables: Vec<ReexportedVariableConfig>,

    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// Complete architecture and run configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub simulation: SimulationParams,

    #[serde(default)]
    pub atomic: Vec<AtomicConfig>,

    #[serde(default)]
    pub coupled: Vec<CoupledConfig>,
}

impl SimConfig {
    /// Creates a new empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Checks the run parameters and URI uniqueness. Coupling maps are
    /// checked when the architecture is built.
    pub fn validate(&self) -> ConfigResult<()> {
        let params = &self.simulation;
        if !(params.end >= params.start) {
            return Err(ConfigError::Validation(format!(
                "End time {} is before start time {}",
                params.end, params.start
            )));
        }
        if !(params.acceleration.is_finite() && params.acceleration > 0.0) {
            return Err(ConfigError::Validation(format!(
                "Acceleration factor must be positive, got {}",
                params.acceleration
            )));
        }

        let mut uris = HashSet::new();
        for uri in self
            .atomic
            .iter()
            .map(|a| &a.uri)
            .chain(self.coupled.iter().map(|c| &c.uri))
        {
            if !uris.insert(uri) {
                return Err(ConfigError::Validation(format!("Duplicate model URI: {uri}")));
            }
        }
        if !self.coupled.is_empty() && !self.coupled.iter().any(|c| c.uri == params.root) {
            return Err(ConfigError::Validation(format!(
                "Root {} is not a coupled model",
                params.root
            )));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Saves configuration to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn start_time(&self) -> Time {
        Time::new(self.simulation.start, self.simulation.time_unit)
    }

    pub fn end_time(&self) -> Time {
        Time::new(self.simulation.end, self.simulation.time_unit)
    }

    /// Returns the number of models, atomic and coupled.
    pub fn model_count(&self) -> usize {
        self.atomic.len() + self.coupled.len()
    }

    pub fn find_atomic(&self, uri: &str) -> Option<&AtomicConfig> {
        self.atomic.iter().find(|a| a.uri == uri)
    }

    pub fn find_coupled(&self, uri: &str) -> Option<&CoupledConfig> {
        self.coupled.iter().find(|c| c.uri == uri)
    }

    /// Resolves every name through `registry` into an [`Architecture`].
    pub fn to_architecture(&self, registry: &ModelRegistry) -> ConfigResult<Architecture> {
        let unit = self.simulation.time_unit;
        let resolver = Resolver { registry };
        let mut arch = Architecture::new(self.simulation.root.clone(), unit);

        for atomic in &self.atomic {
            let factory = registry.factory(&atomic.model_type).ok_or_else(|| {
                ConfigError::UnknownModelType {
                    uri: atomic.uri.clone(),
                    type_name: atomic.model_type.clone(),
                }
            })?;
            let mut desc = AtomicModelDescriptor::from_factory(
                atomic.uri.clone(),
                atomic.time_unit.unwrap_or(unit),
                factory,
            );
            for (key, value) in &atomic.attrs {
                desc = desc.with_attr(key.clone(), attr_text(value));
            }
            arch = arch.with_atomic(desc);
        }

        for coupled in &self.coupled {
            arch = arch.with_coupled(resolver.coupled(coupled, unit)?);
        }
        Ok(arch)
    }

    /// Resolves and builds the simulation in one go.
    pub fn build_simulation(&self, registry: &ModelRegistry) -> ConfigResult<Simulation> {
        Ok(self.to_architecture(registry)?.build()?)
    }
}

fn attr_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Resolver<'a> {
    registry: &'a ModelRegistry,
}

impl Resolver<'_> {
    fn event(&self, name: &str) -> ConfigResult<EventType> {
        self.registry
            .event_type(name)
            .ok_or_else(|| ConfigError::UnknownEvent(name.to_string()))
    }

    fn variable_type(&self, name: &str) -> ConfigResult<VariableType> {
        self.registry
            .variable_type(name)
            .ok_or_else(|| ConfigError::UnknownVariableType(name.to_string()))
    }

    fn converter(&self, name: Option<&str>) -> ConfigResult<Option<EventConverter>> {
        name.map(|n| {
            self.registry
                .converter(n)
                .ok_or_else(|| ConfigError::UnknownConverter(n.to_string()))
        })
        .transpose()
    }

    fn sink(&self, endpoint: &EventEndpoint) -> ConfigResult<EventSink> {
        let sink = EventSink::of(endpoint.model.clone(), self.event(&endpoint.event)?);
        Ok(match self.converter(endpoint.converter.as_deref())? {
            Some(converter) => sink.with_converter(converter),
            None => sink,
        })
    }

    fn variable_sink(endpoint: &VariableEndpoint, ty: VariableType) -> VariableSink {
        VariableSink {
            model_uri: endpoint.model.clone(),
            name: endpoint.name.clone(),
            ty,
        }
    }

    fn variable_source(endpoint: &VariableEndpoint, ty: VariableType) -> VariableSource {
        VariableSource {
            model_uri: endpoint.model.clone(),
            name: endpoint.name.clone(),
            ty,
        }
    }

    fn coupled(&self, config: &CoupledConfig, unit: TimeUnit) -> ConfigResult<CoupledModelDescriptor> {
        let mut desc = CoupledModelDescriptor::new(config.uri.clone(), config.time_unit.unwrap_or(unit))
            .with_submodels(config.submodels.iter().cloned());

        for import in &config.imported_events {
            let ty = self.event(&import.event)?;
            for sink in &import.sinks {
                desc = desc.import_event(ty, self.sink(sink)?);
            }
        }
        for reexport in &config.reexported_events {
            let source = EventSource::of(reexport.source.model.clone(), self.event(&reexport.source.event)?);
            let converter = self.converter(reexport.source.converter.as_deref())?;
            desc = desc.reexport_event(self.event(&reexport.event)?, source, converter);
        }
        for connection in &config.connections {
            let source = EventSource::of(connection.from.model.clone(), self.event(&connection.from.event)?);
            for sink in &connection.to {
                desc = desc.connect(source.clone(), self.sink(sink)?);
            }
        }

        for import in &config.imported_variables {
            let ty = self.variable_type(&import.var_type)?;
            let decl = VariableDecl {
                name: import.name.clone(),
                ty,
            };
            for sink in &import.sinks {
                desc = desc.import_variable(decl.clone(), Self::variable_sink(sink, ty));
            }
        }
        for reexport in &config.reexported_variables {
            let ty = self.variable_type(&reexport.var_type)?;
            let decl = VariableDecl {
                name: reexport.name.clone(),
                ty,
            };
            desc = desc.reexport_variable(decl, Self::variable_source(&reexport.source, ty));
        }
        for binding in &config.bindings {
            let ty = self.variable_type(&binding.var_type)?;
            let source = Self::variable_source(&binding.from, ty);
            for sink in &binding.to {
                desc = desc.bind_variable(source.clone(), Self::variable_sink(sink, ty));
            }
        }
        Ok(desc)
    }
}

/// Builder for creating SimConfig programmatically.
#[derive(Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, uri: impl Into<ModelUri>) -> Self {
        self.config.simulation.root = uri.into();
        self
    }

    pub fn time_unit(mut self, unit: TimeUnit) -> Self {
        self.config.simulation.time_unit = unit;
        self
    }

    /// Sets the run interval, in the global unit.
    pub fn interval(mut self, start: f64, end: f64) -> Self {
        self.config.simulation.start = start;
        self.config.simulation.end = end;
        self
    }

    pub fn acceleration(mut self, factor: f64) -> Self {
        self.config.simulation.acceleration = factor;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.simulation.log_level = level.into();
        self
    }

    /// Adds an atomic model.
    pub fn add_atomic(self, uri: impl Into<ModelUri>, model_type: impl Into<String>) -> Self {
        self.add_atomic_with_attrs(uri, model_type, std::iter::empty::<(String, String)>())
    }

    /// Adds an atomic model with factory attributes.
    pub fn add_atomic_with_attrs<I, K, V>(mut self, uri: impl Into<ModelUri>, model_type: impl Into<String>, attrs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.config.atomic.push(AtomicConfig {
            uri: uri.into(),
            model_type: model_type.into(),
            time_unit: None,
            attrs: attrs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        });
        self
    }

    /// Adds a coupled model.
    pub fn add_coupled(mut self, coupled: CoupledConfig) -> Self {
        self.config.coupled.push(coupled);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> ConfigResult<SimConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::create_default_registry;

    const TICKER_YAML: &str = r#"
simulation:
  root: root
  time_unit: seconds
  start: 0
  end: 5.5
  log_level: debug

atomic:
  - uri: ticker
    type: Ticker
    attrs:
      period: 1
      limit: 3
  - uri: recorder
    type: Recorder

coupled:
  - uri: root
    submodels: [ticker, recorder]
    connections:
      - from: { model: ticker, event: Ping }
        to: [{ model: recorder, event: Ping }]
"#;

    #[test]
    fn test_default_config() {
        let config = SimConfig::new();
        assert_eq!(config.simulation.root, "root");
        assert_eq!(config.simulation.acceleration, 1.0);
        assert!(config.atomic.is_empty());
    }

    #[test]
    fn test_yaml_parsing() {
        let config = SimConfig::from_yaml(TICKER_YAML).unwrap();
        assert_eq!(config.simulation.end, 5.5);
        assert_eq!(config.simulation.log_level, "debug");
        assert_eq!(config.model_count(), 3);
        let ticker = config.find_atomic("ticker").unwrap();
        assert_eq!(attr_text(&ticker.attrs["limit"]), "3");
        assert_eq!(config.find_coupled("root").unwrap().connections.len(), 1);
    }

    #[test]
    fn test_json_parsing() {
        let json = r#"{
            "simulation": { "root": "top", "time_unit": "minutes", "end": 10 },
            "atomic": [ { "uri": "p", "type": "Passive" } ],
            "coupled": [ { "uri": "top", "submodels": ["p"] } ]
        }"#;

        let config = SimConfig::from_json(json).unwrap();
        assert_eq!(config.simulation.time_unit, TimeUnit::Minutes);
        assert_eq!(config.end_time(), Time::new(10.0, TimeUnit::Minutes));
    }

    #[test]
    fn test_to_architecture_and_run() {
        let config = SimConfig::from_yaml(TICKER_YAML).unwrap();
        let sim = config.build_simulation(&create_default_registry()).unwrap();
        sim.do_standalone_simulation(config.start_time(), config.end_time()).unwrap();
        let received = sim.inspect::<crate::models::mock::RecorderModel, _>("recorder", |r| r.received.len());
        assert_eq!(received, Some(3));
    }

    #[test]
    fn test_unknown_names() {
        let registry = create_default_registry();
        let config = SimConfigBuilder::new()
            .add_atomic("x", "Teleporter")
            .build()
            .unwrap();
        assert!(matches!(
            config.to_architecture(&registry),
            Err(ConfigError::UnknownModelType { .. })
        ));

        let yaml = TICKER_YAML.replace("event: Ping }\n        to", "event: Pong }\n        to");
        let config = SimConfig::from_yaml(&yaml).unwrap();
        assert!(matches!(
            config.to_architecture(&registry),
            Err(ConfigError::UnknownEvent(name)) if name == "Pong"
        ));
    }

    #[test]
    fn test_architecture_errors_surface() {
        let yaml = TICKER_YAML.replace("submodels: [ticker, recorder]", "submodels: [ticker, recorder, ghost]");
        let config = SimConfig::from_yaml(&yaml).unwrap();
        let err = config.build_simulation(&create_default_registry()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Architecture(ArchitectureError::UnknownSubmodel { .. })
        ));
    }

    #[test]
    fn test_validation_errors() {
        assert!(SimConfigBuilder::new().interval(10.0, 5.0).build().is_err());
        assert!(SimConfigBuilder::new().acceleration(0.0).build().is_err());
        assert!(SimConfigBuilder::new()
            .add_atomic("a", "Passive")
            .add_atomic("a", "Passive")
            .build()
            .is_err());
        assert!(SimConfigBuilder::new()
            .root("missing")
            .add_coupled(CoupledConfig {
                uri: "top".to_string(),
                ..Default::default()
            })
            .build()
            .is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = SimConfigBuilder::new()
            .root("top")
            .interval(0.0, 50.0)
            .add_atomic_with_attrs("t", "Ticker", [("period", 2.0)])
            .add_coupled(CoupledConfig {
                uri: "top".to_string(),
                submodels: vec!["t".to_string()],
                ..Default::default()
            })
            .build()
            .unwrap();

        let yaml = config.to_yaml().unwrap();
        let restored = SimConfig::from_yaml(&yaml).unwrap();
        assert_eq!(restored.simulation.end, 50.0);
        assert_eq!(restored.model_count(), 2);

        let json = config.to_json().unwrap();
        let restored = SimConfig::from_json(&json).unwrap();
        assert_eq!(attr_text(&restored.atomic[0].attrs["period"]), "2.0");
    }
}
