//! A small home energy system.
//!
//! ```text
//! home
//! ├── user     scripted SwitchOn / SwitchOff / SetHigh / SetLow
//! ├── fan      exports intensity
//! └── power
//!     ├── solar    exports production
//!     └── battery  imports consumption + production, emits BatteryLow
//! ```
//!
//! The fan's `intensity` is bound to the battery's `consumption` through
//! the `power` coupled model. A `BatteryLow` leaving `power` reaches the
//! fan as a `SwitchOff`, and also leaves the architecture through the
//! root's reexport. External `SwitchOn` events imported by the root go to
//! the fan.

use std::sync::Arc;

use crate::architecture::{Architecture, AtomicModelDescriptor};
use crate::coupled::{CoupledModelDescriptor, EventSink, EventSource, VariableSink, VariableSource};
use crate::event::{Event, EventConverter, EventType};
use crate::models::battery::{BatteryLow, BatteryModel};
use crate::models::fan::{FanModel, SetHigh, SetLow, SwitchOff, SwitchOn};
use crate::models::solar::SolarPanelModel;
use crate::models::user::{parse_script, FanCommand, FanUserModel};
use crate::time::{Duration, TimeUnit};
use crate::variable::VariableDecl;

pub const HOME: &str = "home";
pub const POWER: &str = "power";
pub const USER: &str = "user";
pub const FAN: &str = "fan";
pub const SOLAR: &str = "solar";
pub const BATTERY: &str = "battery";

/// Default user script, in hours from midnight.
pub const DEFAULT_SCRIPT: &str = "0.5:on, 1:high, 7:on, 9:high, 12:low, 14:off";

/// Turns a `BatteryLow` into a `SwitchOff` occurring at the same time.
pub fn battery_low_to_switch_off() -> EventConverter {
    Arc::new(|event: &dyn Event| Box::new(SwitchOff::new(event.time_of_occurrence())) as Box<dyn Event>)
}

/// Hourly solar periods, quarter-hour battery periods.
pub fn home_architecture(script: Vec<(Duration, FanCommand)>) -> Architecture {
    let unit = TimeUnit::Hours;
    Architecture::new(HOME, unit)
        .with_atomic(AtomicModelDescriptor::new(USER, unit, move |_| {
            Box::new(FanUserModel::new(script.clone()))
        }))
        .with_atomic(
            AtomicModelDescriptor::new(FAN, unit, |spec| {
                Box::new(FanModel::new(spec.uri.clone(), spec.time_unit).with_power(
                    spec.attr_or("low_power", FanModel::DEFAULT_LOW_POWER),
                    spec.attr_or("high_power", FanModel::DEFAULT_HIGH_POWER),
                ))
            }),
        )
        .with_atomic(AtomicModelDescriptor::new(SOLAR, unit, |spec| {
            Box::new(
                SolarPanelModel::new(spec.uri.clone(), Duration::new(1.0, spec.time_unit))
                    .with_peak(spec.attr_or("peak", SolarPanelModel::DEFAULT_PEAK)),
            )
        }))
        .with_atomic(
            AtomicModelDescriptor::new(BATTERY, unit, |spec| {
                Box::new(
                    BatteryModel::new(spec.uri.clone(), Duration::new(0.25, spec.time_unit), spec.attr_or("capacity", 500.0))
                        .with_initial_level(spec.attr_or("initial_level", 0.4))
                        .with_low_threshold(spec.attr_or("low_threshold", 0.2)),
                )
            }),
        )
        .with_coupled(power_model(unit))
        .with_coupled(home_model(unit))
}

/// [`home_architecture`] with [`DEFAULT_SCRIPT`].
pub fn default_home_architecture() -> Architecture {
    let script = parse_script(DEFAULT_SCRIPT, TimeUnit::Hours).unwrap_or_default();
    home_architecture(script)
}

fn power_model(unit: TimeUnit) -> CoupledModelDescriptor {
    CoupledModelDescriptor::new(POWER, unit)
        .with_submodels([SOLAR, BATTERY])
        .bind_variable(
            VariableSource::new::<f64>(SOLAR, SolarPanelModel::PRODUCTION),
            VariableSink::new::<f64>(BATTERY, BatteryModel::PRODUCTION),
        )
        .import_variable(
            VariableDecl::of::<f64>(BatteryModel::CONSUMPTION),
            VariableSink::new::<f64>(BATTERY, BatteryModel::CONSUMPTION),
        )
        .reexport_variable(
            VariableDecl::of::<f64>(BatteryModel::CHARGE_LEVEL),
            VariableSource::new::<f64>(BATTERY, BatteryModel::CHARGE_LEVEL),
        )
        .reexport_event(
            EventType::of::<BatteryLow>(),
            EventSource::new::<BatteryLow>(BATTERY),
            None,
        )
}

fn home_model(unit: TimeUnit) -> CoupledModelDescriptor {
    CoupledModelDescriptor::new(HOME, unit)
        .with_submodels([USER, FAN, POWER])
        .import_event(EventType::of::<SwitchOn>(), EventSink::new::<SwitchOn>(FAN))
        .connect(EventSource::new::<SwitchOn>(USER), EventSink::new::<SwitchOn>(FAN))
        .connect(EventSource::new::<SwitchOff>(USER), EventSink::new::<SwitchOff>(FAN))
        .connect(EventSource::new::<SetHigh>(USER), EventSink::new::<SetHigh>(FAN))
        .connect(EventSource::new::<SetLow>(USER), EventSink::new::<SetLow>(FAN))
        .connect(
            EventSource::new::<BatteryLow>(POWER),
            EventSink::new::<SwitchOff>(FAN).with_converter(battery_low_to_switch_off()),
        )
        .reexport_event(
            EventType::of::<BatteryLow>(),
            EventSource::new::<BatteryLow>(POWER),
            None,
        )
        .bind_variable(
            VariableSource::new::<f64>(FAN, FanModel::INTENSITY),
            VariableSink::new::<f64>(POWER, BatteryModel::CONSUMPTION),
        )
}
