//! Solar panel producing power along a daily sine curve.

use crate::error::ModelResult;
use crate::model::{AtomicModel, InternalTransition, ModelInterface, VariableInit};
use crate::time::{Duration, Time, TimeUnit};
use crate::types::ModelUri;
use crate::variable::{ExportedVar, SharedVariable};

/// Publishes its production, in watts, every `period`.
///
/// Production is `peak * sin(pi * (h - 6) / 12)` for the hour of day `h`
/// between 6 and 18, zero otherwise.
#[derive(Debug)]
pub struct SolarPanelModel {
    period: Duration,
    peak: f64,
    production: ExportedVar<f64>,
    /// Energy produced so far, in watt-hours.
    pub energy_wh: f64,
    last_power: f64,
}

impl SolarPanelModel {
    pub const PRODUCTION: &'static str = "production";
    pub const DEFAULT_PEAK: f64 = 300.0;

    pub fn new(uri: impl Into<ModelUri>, period: Duration) -> Self {
        Self {
            period,
            peak: Self::DEFAULT_PEAK,
            production: ExportedVar::new(uri, Self::PRODUCTION),
            energy_wh: 0.0,
            last_power: 0.0,
        }
    }

    pub fn with_peak(mut self, peak: f64) -> Self {
        self.peak = peak;
        self
    }

    /// Production at simulated time `time`, in watts.
    pub fn power_at(&self, time: Time) -> f64 {
        let hour = time.to_unit(TimeUnit::Hours).value().rem_euclid(24.0);
        if (6.0..=18.0).contains(&hour) {
            (self.peak * (std::f64::consts::PI * (hour - 6.0) / 12.0).sin()).max(0.0)
        } else {
            0.0
        }
    }
}

impl AtomicModel for SolarPanelModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new().exports_variable(self.production.decl())
    }

    fn initialise_state(&mut self, start_time: Time) {
        self.energy_wh = 0.0;
        self.last_power = self.power_at(start_time);
    }

    fn initialise_variables(&mut self, ctx: &VariableInit<'_>) -> ModelResult<()> {
        self.production.initialise(ctx, self.last_power);
        Ok(())
    }

    fn time_advance(&self) -> Duration {
        self.period
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        let hours = ctx.elapsed().to_unit(TimeUnit::Hours).value();
        self.energy_wh += self.last_power * hours;
        self.last_power = self.power_at(ctx.current_time());
        self.production.set(ctx, self.last_power);
        Ok(())
    }

    fn exported_variable(&self, name: &str) -> Option<SharedVariable> {
        (name == self.production.name()).then(|| self.production.shared())
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "energy_wh": self.energy_wh }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hour(h: f64) -> Time {
        Time::new(h, TimeUnit::Hours)
    }

    #[test]
    fn test_daily_curve() {
        let panel = SolarPanelModel::new("solar", Duration::new(1.0, TimeUnit::Hours)).with_peak(100.0);
        assert_eq!(panel.power_at(hour(3.0)), 0.0);
        assert!((panel.power_at(hour(12.0)) - 100.0).abs() < 1e-9);
        assert!((panel.power_at(hour(36.0)) - 100.0).abs() < 1e-9);
        assert!(panel.power_at(hour(20.0)) == 0.0);
        assert!(panel.power_at(hour(9.0)) > 0.0);
    }

    #[test]
    fn test_energy_accumulates() {
        let mut panel = SolarPanelModel::new("solar", Duration::new(1.0, TimeUnit::Hours)).with_peak(100.0);
        panel.initialise_state(hour(12.0));
        let ctx = InternalTransition::new("solar", hour(13.0), Duration::new(1.0, TimeUnit::Hours), None);
        panel.user_defined_internal_transition(&ctx).unwrap();
        assert!((panel.energy_wh - 100.0).abs() < 1e-9);
    }
}
