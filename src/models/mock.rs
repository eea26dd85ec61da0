//! Mock models and events for testing.
//!
//! These models provide simple, predictable behaviors useful for
//! exercising the kernel: periodic emitters, passive sinks, recorders,
//! and a two-model HIOA pair exchanging an event and a variable.

use crate::error::{ModelResult, VariableError};
use crate::event::Event;
use crate::model::{downcast_target, AtomicModel, ExternalTransition, InternalTransition, ModelInterface, VariableInit};
use crate::time::{Duration, Time, TimeUnit};
use crate::types::ModelUri;
use crate::variable::{ExportedVar, ImportedVar, SharedVariable, Value};

/// Numbered event recorded by a [`RecorderModel`].
///
/// Among pings of the same instant, a higher `priority` is delivered first.
#[derive(Clone, Debug, PartialEq)]
pub struct Ping {
    pub time: Time,
    pub seq: u64,
    pub priority: u8,
}

impl Ping {
    pub fn new(time: Time, seq: u64) -> Self {
        Self {
            time,
            seq,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

impl Event for Ping {
    fn time_of_occurrence(&self) -> Time {
        self.time
    }

    fn has_priority_over(&self, other: &dyn Event) -> bool {
        other
            .downcast_ref::<Ping>()
            .is_some_and(|p| self.priority > p.priority)
    }

    fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()> {
        let recorder = downcast_target::<RecorderModel>(model, self)?;
        recorder.received.push((self.time, self.seq));
        Ok(())
    }
}

/// Content-free event raising the change flag of a [`LevelModel`].
#[derive(Clone, Debug, PartialEq)]
pub struct Toggle {
    pub time: Time,
}

impl Toggle {
    pub fn new(time: Time) -> Self {
        Self { time }
    }
}

impl Event for Toggle {
    fn time_of_occurrence(&self) -> Time {
        self.time
    }

    fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()> {
        downcast_target::<LevelModel>(model, self)?.changed = true;
        Ok(())
    }
}

/// Emits a [`Ping`] every `period`, optionally a limited number of times.
#[derive(Debug)]
pub struct TickerModel {
    period: Duration,
    limit: Option<u64>,
    /// Pings emitted so far.
    pub emitted: u64,
    /// State times of every internal transition.
    pub internal_times: Vec<Time>,
}

impl TickerModel {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            limit: None,
            emitted: 0,
            internal_times: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.emitted >= limit)
    }
}

impl AtomicModel for TickerModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new().exports::<Ping>()
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.emitted = 0;
        self.internal_times.clear();
    }

    fn time_advance(&self) -> Duration {
        if self.exhausted() {
            Duration::INFINITY
        } else {
            self.period
        }
    }

    fn output(&mut self, time: Time) -> Option<Vec<Box<dyn Event>>> {
        Some(vec![Box::new(Ping::new(time, self.emitted + 1))])
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.emitted += 1;
        self.internal_times.push(ctx.current_time());
        Ok(())
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "emitted": self.emitted }))
    }
}

/// Never activates; counts any transition that would be invoked anyway.
#[derive(Debug, Default)]
pub struct PassiveModel {
    pub internal_count: u64,
    pub external_count: u64,
}

impl PassiveModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AtomicModel for PassiveModel {
    fn time_advance(&self) -> Duration {
        Duration::INFINITY
    }

    fn user_defined_internal_transition(&mut self, _ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.internal_count += 1;
        Ok(())
    }

    fn user_defined_external_transition(&mut self, _ctx: &ExternalTransition<'_>) -> ModelResult<()> {
        self.external_count += 1;
        Ok(())
    }
}

/// Records delivered pings, and optionally runs its own periodic internal
/// transitions so that deliveries can coincide with them.
#[derive(Debug)]
pub struct RecorderModel {
    uri: ModelUri,
    period: Option<Duration>,
    /// `(time, seq)` of every executed ping, in execution order.
    pub received: Vec<(Time, u64)>,
    /// `(time, elapsed, confluent)` of every external transition.
    pub externals: Vec<(Time, Duration, bool)>,
    /// State times of every internal transition.
    pub internal_times: Vec<Time>,
}

impl RecorderModel {
    pub fn new(uri: impl Into<ModelUri>) -> Self {
        Self {
            uri: uri.into(),
            period: None,
            received: Vec::new(),
            externals: Vec::new(),
            internal_times: Vec::new(),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

impl AtomicModel for RecorderModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new().imports::<Ping>()
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.received.clear();
        self.externals.clear();
        self.internal_times.clear();
    }

    fn time_advance(&self) -> Duration {
        self.period.unwrap_or(Duration::INFINITY)
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.internal_times.push(ctx.current_time());
        Ok(())
    }

    fn user_defined_external_transition(&mut self, ctx: &ExternalTransition<'_>) -> ModelResult<()> {
        self.externals
            .push((ctx.current_time(), ctx.elapsed(), ctx.is_confluent()));
        ctx.log(format!("received {} pings", self.received.len()));
        Ok(())
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "uri": self.uri,
            "received": self.received.len(),
        }))
    }
}

/// Raises `level` by one each time a [`Toggle`] arrives.
///
/// Uses the change-flag pattern: a toggle sets the flag, the zero time
/// advance forces an internal transition at the same instant, which
/// republishes the variable and clears the flag.
#[derive(Debug)]
pub struct LevelModel {
    changed: bool,
    value: f64,
    level: ExportedVar<f64>,
    /// State times of every internal transition.
    pub internal_times: Vec<Time>,
}

impl LevelModel {
    pub const LEVEL: &'static str = "level";

    pub fn new(uri: impl Into<ModelUri>) -> Self {
        Self {
            changed: false,
            value: 0.0,
            level: ExportedVar::new(uri, Self::LEVEL),
            internal_times: Vec::new(),
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl AtomicModel for LevelModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new()
            .imports::<Toggle>()
            .exports_variable(self.level.decl())
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.changed = false;
        self.value = 0.0;
        self.internal_times.clear();
    }

    fn initialise_variables(&mut self, ctx: &VariableInit<'_>) -> ModelResult<()> {
        self.level.initialise(ctx, self.value);
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        if self.changed {
            Duration::zero(TimeUnit::Seconds)
        } else {
            Duration::INFINITY
        }
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.value += 1.0;
        self.level.set(ctx, self.value);
        self.changed = false;
        self.internal_times.push(ctx.current_time());
        Ok(())
    }

    fn exported_variable(&self, name: &str) -> Option<SharedVariable> {
        (name == self.level.name()).then(|| self.level.shared())
    }
}

/// Emits `toggles` [`Toggle`]s one `period` apart, then reads the imported
/// `level` once, one period after the last toggle.
#[derive(Debug)]
pub struct ToggleSourceModel {
    period: Duration,
    toggles: u64,
    emitted: u64,
    done: bool,
    level: ImportedVar<f64>,
    /// Values of `level` read during internal transitions.
    pub observations: Vec<(Time, Value<f64>)>,
}

impl ToggleSourceModel {
    pub fn new(period: Duration, toggles: u64) -> Self {
        Self {
            period,
            toggles,
            emitted: 0,
            done: false,
            level: ImportedVar::new(LevelModel::LEVEL),
            observations: Vec::new(),
        }
    }
}

impl AtomicModel for ToggleSourceModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new()
            .exports::<Toggle>()
            .imports_variable(self.level.decl())
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.emitted = 0;
        self.done = false;
        self.observations.clear();
    }

    fn time_advance(&self) -> Duration {
        if self.done {
            Duration::INFINITY
        } else {
            self.period
        }
    }

    fn output(&mut self, time: Time) -> Option<Vec<Box<dyn Event>>> {
        (self.emitted < self.toggles).then(|| vec![Box::new(Toggle::new(time)) as Box<dyn Event>])
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        if self.emitted < self.toggles {
            self.emitted += 1;
        } else {
            self.observations.push((ctx.current_time(), self.level.read()?));
            self.done = true;
        }
        Ok(())
    }

    fn bind_imported_variable(&mut self, name: &str, var: &SharedVariable) -> Result<(), VariableError> {
        if name == self.level.name() {
            self.level.bind(var)
        } else {
            Err(VariableError::UnknownImport {
                name: name.to_string(),
            })
        }
    }
}
