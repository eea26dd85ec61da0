//! Built-in model implementations.
//!
//! # Available Models
//!
//! ## Household equipment
//! - [`FanModel`] - Three-state fan publishing its power draw as `intensity`
//! - [`SolarPanelModel`] - Periodic producer publishing `production`
//! - [`BatteryModel`] - Integrates production and consumption, emits [`BatteryLow`]
//! - [`FanUserModel`] - Scripted user operating the fan
//!
//! The [`home`] module wires them into a complete architecture.
//!
//! ## Mock models
//! - [`TickerModel`], [`PassiveModel`], [`RecorderModel`] and the
//!   [`LevelModel`] / [`ToggleSourceModel`] HIOA pair, used by tests.

pub mod battery;
pub mod fan;
pub mod home;
pub mod mock;
pub mod solar;
pub mod user;

pub use battery::{BatteryLow, BatteryModel};
pub use fan::{FanModel, FanState, SetHigh, SetLow, SwitchOff, SwitchOn};
pub use home::home_architecture;
pub use mock::{LevelModel, PassiveModel, Ping, RecorderModel, TickerModel, Toggle, ToggleSourceModel};
pub use solar::SolarPanelModel;
pub use user::{FanCommand, FanUserModel};
