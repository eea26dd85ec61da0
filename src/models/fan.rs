//! Three-state fan.
//!
//! The fan is switched by four content-free events. Its power draw is
//! published through the exported variable `intensity`, using the
//! change-flag pattern: a state-changing event raises the flag, the zero
//! time advance triggers an internal transition in the same instant, and
//! that transition writes the new value.

use serde::Serialize;

use crate::error::ModelResult;
use crate::event::Event;
use crate::model::{downcast_target, AtomicModel, InternalTransition, ModelInterface, VariableInit};
use crate::time::{Duration, Time, TimeUnit};
use crate::types::ModelUri;
use crate::variable::{ExportedVar, SharedVariable};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FanState {
    Off,
    Low,
    High,
}

macro_rules! fan_event {
    ($(#[$doc:meta])* $name:ident => $apply:expr) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            pub time: Time,
        }

        impl $name {
            pub fn new(time: Time) -> Self {
                Self { time }
            }
        }

        impl Event for $name {
            fn time_of_occurrence(&self) -> Time {
                self.time
            }

            fn execute_on(&self, model: &mut dyn AtomicModel) -> ModelResult<()> {
                let fan = downcast_target::<FanModel>(model, self)?;
                let apply: fn(FanState) -> FanState = $apply;
                fan.switch_to(apply(fan.state));
                Ok(())
            }
        }
    };
}

fan_event!(
    /// Turns an off fan on, at low speed.
    SwitchOn => |state| match state {
        FanState::Off => FanState::Low,
        other => other,
    }
);

fan_event!(
    /// Turns the fan off.
    SwitchOff => |_| FanState::Off
);

fan_event!(
    /// Sets a running fan to high speed.
    SetHigh => |state| match state {
        FanState::Off => FanState::Off,
        _ => FanState::High,
    }
);

fan_event!(
    /// Sets a running fan to low speed.
    SetLow => |state| match state {
        FanState::Off => FanState::Off,
        _ => FanState::Low,
    }
);

/// A fan drawing `low_power` or `high_power` watts when running.
#[derive(Debug)]
pub struct FanModel {
    time_unit: TimeUnit,
    low_power: f64,
    high_power: f64,
    state: FanState,
    changed: bool,
    intensity: ExportedVar<f64>,
    /// Number of state changes during the run.
    pub switches: u64,
}

impl FanModel {
    pub const INTENSITY: &'static str = "intensity";
    pub const DEFAULT_LOW_POWER: f64 = 40.0;
    pub const DEFAULT_HIGH_POWER: f64 = 100.0;

    pub fn new(uri: impl Into<ModelUri>, time_unit: TimeUnit) -> Self {
        Self {
            time_unit,
            low_power: Self::DEFAULT_LOW_POWER,
            high_power: Self::DEFAULT_HIGH_POWER,
            state: FanState::Off,
            changed: false,
            intensity: ExportedVar::new(uri, Self::INTENSITY),
            switches: 0,
        }
    }

    pub fn with_power(mut self, low: f64, high: f64) -> Self {
        self.low_power = low;
        self.high_power = high;
        self
    }

    pub fn state(&self) -> FanState {
        self.state
    }

    /// Power draw in the current state, in watts.
    pub fn power(&self) -> f64 {
        match self.state {
            FanState::Off => 0.0,
            FanState::Low => self.low_power,
            FanState::High => self.high_power,
        }
    }

    fn switch_to(&mut self, state: FanState) {
        if state != self.state {
            self.state = state;
            self.changed = true;
            self.switches += 1;
        }
    }
}

impl AtomicModel for FanModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new()
            .imports::<SwitchOn>()
            .imports::<SwitchOff>()
            .imports::<SetHigh>()
            .imports::<SetLow>()
            .exports_variable(self.intensity.decl())
    }

    fn initialise_state(&mut self, _start_time: Time) {
        self.state = FanState::Off;
        self.changed = false;
        self.switches = 0;
    }

    fn initialise_variables(&mut self, ctx: &VariableInit<'_>) -> ModelResult<()> {
        self.intensity.initialise(ctx, self.power());
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        if self.changed {
            Duration::zero(self.time_unit)
        } else {
            Duration::INFINITY
        }
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        self.intensity.set(ctx, self.power());
        self.changed = false;
        ctx.log(format!("fan {:?} drawing {} W", self.state, self.power()));
        Ok(())
    }

    fn exported_variable(&self, name: &str) -> Option<SharedVariable> {
        (name == self.intensity.name()).then(|| self.intensity.shared())
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({
            "state": self.state,
            "switches": self.switches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: f64) -> Time {
        Time::new(t, TimeUnit::Hours)
    }

    #[test]
    fn test_switching_raises_change_flag() {
        let mut fan = FanModel::new("fan", TimeUnit::Hours);
        assert!(fan.time_advance().is_infinite());

        SetHigh::new(at(1.0)).execute_on(&mut fan).unwrap();
        assert_eq!(fan.state(), FanState::Off);
        assert!(fan.time_advance().is_infinite());

        SwitchOn::new(at(1.0)).execute_on(&mut fan).unwrap();
        assert_eq!(fan.state(), FanState::Low);
        assert!(fan.time_advance().is_zero());

        let ctx = InternalTransition::new("fan", at(1.0), Duration::zero(TimeUnit::Hours), None);
        fan.user_defined_internal_transition(&ctx).unwrap();
        assert!(fan.time_advance().is_infinite());
        assert_eq!(fan.intensity.value().unwrap(), FanModel::DEFAULT_LOW_POWER);
    }

    #[test]
    fn test_power_per_state() {
        let mut fan = FanModel::new("fan", TimeUnit::Hours).with_power(10.0, 20.0);
        assert_eq!(fan.power(), 0.0);
        SwitchOn::new(at(0.0)).execute_on(&mut fan).unwrap();
        SetHigh::new(at(0.0)).execute_on(&mut fan).unwrap();
        assert_eq!(fan.power(), 20.0);
        SetLow::new(at(0.0)).execute_on(&mut fan).unwrap();
        assert_eq!(fan.power(), 10.0);
        SwitchOff::new(at(0.0)).execute_on(&mut fan).unwrap();
        assert_eq!(fan.power(), 0.0);
        assert_eq!(fan.switches, 4);
    }
}
