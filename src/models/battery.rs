//! Home battery.

use crate::error::{ModelError, ModelResult, VariableError};
use crate::event::Event;
use crate::model::{AtomicModel, InternalTransition, ModelInterface, VariableInit};
use crate::time::{Duration, Time, TimeUnit};
use crate::types::ModelUri;
use crate::variable::{ExportedVar, ImportedVar, SharedVariable};

/// Emitted when the charge level drops below the battery's threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct BatteryLow {
    pub time: Time,
    /// Charge level at emission, as a fraction of capacity.
    pub level: f64,
}

impl BatteryLow {
    pub fn new(time: Time, level: f64) -> Self {
        Self { time, level }
    }
}

impl Event for BatteryLow {
    fn time_of_occurrence(&self) -> Time {
        self.time
    }

    // Only ever delivered after conversion.
    fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()> {
        Err(ModelError::UnexpectedEvent {
            event: "BatteryLow",
            model: model.model_type(),
        })
    }
}

/// Integrates imported `production` and `consumption` (watts) every
/// `period` and publishes `charge_level` as a fraction of its capacity.
///
/// Crossing below `low_threshold` emits one [`BatteryLow`] in the same
/// instant; the next one requires the level to recover first.
#[derive(Debug)]
pub struct BatteryModel {
    time_unit: TimeUnit,
    period: Duration,
    capacity_wh: f64,
    initial_level: f64,
    low_threshold: f64,
    charge_wh: f64,
    below: bool,
    low_pending: bool,
    consumption: ImportedVar<f64>,
    production: ImportedVar<f64>,
    charge_level: ExportedVar<f64>,
    /// Number of [`BatteryLow`] events emitted.
    pub low_events: u64,
    /// Lowest level reached during the run.
    pub min_level: f64,
}

impl BatteryModel {
    pub const CONSUMPTION: &'static str = "consumption";
    pub const PRODUCTION: &'static str = "production";
    pub const CHARGE_LEVEL: &'static str = "charge_level";

    pub fn new(uri: impl Into<ModelUri>, period: Duration, capacity_wh: f64) -> Self {
        Self {
            time_unit: period.unit(),
            period,
            capacity_wh,
            initial_level: 1.0,
            low_threshold: 0.2,
            charge_wh: capacity_wh,
            below: false,
            low_pending: false,
            consumption: ImportedVar::new(Self::CONSUMPTION),
            production: ImportedVar::new(Self::PRODUCTION),
            charge_level: ExportedVar::new(uri, Self::CHARGE_LEVEL),
            low_events: 0,
            min_level: 1.0,
        }
    }

    pub fn with_initial_level(mut self, level: f64) -> Self {
        self.initial_level = level.clamp(0.0, 1.0);
        self
    }

    pub fn with_low_threshold(mut self, threshold: f64) -> Self {
        self.low_threshold = threshold;
        self
    }

    /// Current charge as a fraction of capacity.
    pub fn level(&self) -> f64 {
        if self.capacity_wh > 0.0 {
            self.charge_wh / self.capacity_wh
        } else {
            0.0
        }
    }
}

impl AtomicModel for BatteryModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new()
            .exports::<BatteryLow>()
            .imports_variable(self.consumption.decl())
            .imports_variable(self.production.decl())
            .exports_variable(self.charge_level.decl())
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.charge_wh = self.capacity_wh * self.initial_level;
        self.below = self.level() < self.low_threshold;
        self.low_pending = false;
        self.low_events = 0;
        self.min_level = self.level();
    }

    fn initialise_variables(&mut self, ctx: &VariableInit<'_>) -> ModelResult<()> {
        self.charge_level.initialise(ctx, self.level());
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        if self.low_pending {
            Duration::zero(self.time_unit)
        } else {
            self.period
        }
    }

    fn output(&mut self, time: Time) -> Option<Vec<Box<dyn Event>>> {
        self.low_pending
            .then(|| vec![Box::new(BatteryLow::new(time, self.level())) as Box<dyn Event>])
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.low_pending = false;

        let hours = ctx.elapsed().to_unit(TimeUnit::Hours).value();
        let net = self.production.value()? - self.consumption.value()?;
        self.charge_wh = (self.charge_wh + net * hours).clamp(0.0, self.capacity_wh);

        let level = self.level();
        self.min_level = self.min_level.min(level);
        if level < self.low_threshold {
            if !self.below {
                self.below = true;
                self.low_pending = true;
                self.low_events += 1;
                ctx.log(format!("charge level {level:.3} below threshold"));
            }
        } else {
            self.below = false;
        }
        self.charge_level.set(ctx, level);
        Ok(())
    }

    fn exported_variable(&self, name: &str) -> Option<SharedVariable> {
        (name == self.charge_level.name()).then(|| self.charge_level.shared())
    }

    fn bind_imported_variable(&mut self, name: &str, var: &SharedVariable) -> Result<(), VariableError> {
        match name {
            Self::CONSUMPTION => self.consumption.bind(var),
            Self::PRODUCTION => self.production.bind(var),
            _ => Err(VariableError::UnknownImport {
                name: name.to_string(),
            }),
        }
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "level": self.level(),
            "min_level": self.min_level,
            "low_events": self.low_events,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(h: f64) -> Time {
        Time::new(h, TimeUnit::Hours)
    }

    fn bound_battery(consumption: &ExportedVar<f64>, production: &ExportedVar<f64>) -> BatteryModel {
        let mut battery = BatteryModel::new("battery", Duration::new(1.0, TimeUnit::Hours), 100.0)
            .with_initial_level(0.5)
            .with_low_threshold(0.3);
        battery.bind_imported_variable("consumption", &consumption.shared()).unwrap();
        battery.bind_imported_variable("production", &production.shared()).unwrap();
        battery.initialise_state(hour(0.0));
        battery.initialise_variables(&VariableInit::new("battery", hour(0.0))).unwrap();
        battery
    }

    #[test]
    fn test_discharge_emits_battery_low_once() {
        let consumption = ExportedVar::new("fan", "intensity");
        let production = ExportedVar::new("solar", "production");
        let init = VariableInit::new("test", hour(0.0));
        consumption.initialise(&init, 15.0);
        production.initialise(&init, 0.0);
        let mut battery = bound_battery(&consumption, &production);

        let ctx = InternalTransition::new("battery", hour(1.0), Duration::new(1.0, TimeUnit::Hours), None);
        battery.user_defined_internal_transition(&ctx).unwrap();
        assert!((battery.level() - 0.35).abs() < 1e-9);
        assert!(battery.output(hour(1.0)).is_none());

        let ctx = InternalTransition::new("battery", hour(2.0), Duration::new(1.0, TimeUnit::Hours), None);
        battery.user_defined_internal_transition(&ctx).unwrap();
        assert!(battery.time_advance().is_zero());
        let out = battery.output(hour(2.0)).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is::<BatteryLow>());

        let ctx = InternalTransition::new("battery", hour(2.0), Duration::zero(TimeUnit::Hours), None);
        battery.user_defined_internal_transition(&ctx).unwrap();
        assert_eq!(battery.time_advance(), Duration::new(1.0, TimeUnit::Hours));
        assert_eq!(battery.low_events, 1);

        let ctx = InternalTransition::new("battery", hour(3.0), Duration::new(1.0, TimeUnit::Hours), None);
        battery.user_defined_internal_transition(&ctx).unwrap();
        assert_eq!(battery.low_events, 1);
    }

    #[test]
    fn test_charge_is_clamped() {
        let consumption = ExportedVar::new("fan", "intensity");
        let production = ExportedVar::new("solar", "production");
        let init = VariableInit::new("test", hour(0.0));
        consumption.initialise(&init, 0.0);
        production.initialise(&init, 500.0);
        let mut battery = bound_battery(&consumption, &production);

        let ctx = InternalTransition::new("battery", hour(1.0), Duration::new(1.0, TimeUnit::Hours), None);
        battery.user_defined_internal_transition(&ctx).unwrap();
        assert_eq!(battery.level(), 1.0);
    }

    #[test]
    fn test_unbound_import_is_an_error() {
        let mut battery = BatteryModel::new("battery", Duration::new(1.0, TimeUnit::Hours), 100.0);
        battery.initialise_state(hour(0.0));
        let ctx = InternalTransition::new("battery", hour(1.0), Duration::new(1.0, TimeUnit::Hours), None);
        assert!(battery.user_defined_internal_transition(&ctx).is_err());
        assert!(battery.bind_imported_variable("voltage", &ExportedVar::<f64>::new("x", "v").shared()).is_err());
    }
}
