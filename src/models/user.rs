//! Scripted fan user.

use std::fmt;
use std::str::FromStr;

use crate::error::ModelResult;
use crate::event::Event;
use crate::model::{AtomicModel, InternalTransition, ModelInterface};
use crate::models::fan::{SetHigh, SetLow, SwitchOff, SwitchOn};
use crate::time::{Duration, Time, TimeUnit};

/// One action on the fan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FanCommand {
    On,
    Off,
    High,
    Low,
}

impl FanCommand {
    /// The event carrying this command at `time`.
    pub fn event(self, time: Time) -> Box<dyn Event> {
        match self {
            FanCommand::On => Box::new(SwitchOn::new(time)),
            FanCommand::Off => Box::new(SwitchOff::new(time)),
            FanCommand::High => Box::new(SetHigh::new(time)),
            FanCommand::Low => Box::new(SetLow::new(time)),
        }
    }
}

impl FromStr for FanCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(FanCommand::On),
            "off" => Ok(FanCommand::Off),
            "high" => Ok(FanCommand::High),
            "low" => Ok(FanCommand::Low),
            other => Err(format!("unknown fan command `{other}`")),
        }
    }
}

impl fmt::Display for FanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FanCommand::On => "on",
            FanCommand::Off => "off",
            FanCommand::High => "high",
            FanCommand::Low => "low",
        };
        f.write_str(name)
    }
}

/// Parses a script such as `"1:on, 3:high, 8:off"`: offsets from the
/// start of the run, in `unit`, each followed by a command.
pub fn parse_script(script: &str, unit: TimeUnit) -> Result<Vec<(Duration, FanCommand)>, String> {
    script
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (offset, command) = entry
                .split_once(':')
                .ok_or_else(|| format!("expected `offset:command`, got `{entry}`"))?;
            let offset: f64 = offset
                .trim()
                .parse()
                .map_err(|_| format!("invalid offset in `{entry}`"))?;
            Ok((Duration::new(offset, unit), command.parse()?))
        })
        .collect()
}

/// Emits the commands of its script at their offsets from the run start.
#[derive(Debug)]
pub struct FanUserModel {
    script: Vec<(Duration, FanCommand)>,
    start: Option<Time>,
    now: Option<Time>,
    next: usize,
    /// Commands issued so far.
    pub issued: Vec<(Time, FanCommand)>,
}

impl FanUserModel {
    pub fn new(mut script: Vec<(Duration, FanCommand)>) -> Self {
        script.sort_by(|a, b| a.0.cmp(&b.0));
        Self {
            script,
            start: None,
            now: None,
            next: 0,
            issued: Vec::new(),
        }
    }

    pub fn script(&self) -> &[(Duration, FanCommand)] {
        &self.script
    }
}

impl AtomicModel for FanUserModel {
    fn interface(&self) -> ModelInterface {
        ModelInterface::new()
            .exports::<SwitchOn>()
            .exports::<SwitchOff>()
            .exports::<SetHigh>()
            .exports::<SetLow>()
    }

    fn initialise_state(&mut self, start_time: Time) {
        self.start = Some(start_time);
        self.now = Some(start_time);
        self.next = 0;
        self.issued.clear();
    }

    fn time_advance(&self) -> Duration {
        match (self.script.get(self.next), self.start, self.now) {
            (Some(&(offset, _)), Some(start), Some(now)) => {
                let due = start + offset;
                if due <= now {
                    Duration::zero(offset.unit())
                } else {
                    due - now
                }
            }
            _ => Duration::INFINITY,
        }
    }

    fn output(&mut self, time: Time) -> Option<Vec<Box<dyn Event>>> {
        let &(_, command) = self.script.get(self.next)?;
        Some(vec![command.event(time)])
    }

    fn user_defined_internal_transition(&mut self, ctx: &InternalTransition<'_>) -> ModelResult<()> {
        if let Some(&(_, command)) = self.script.get(self.next) {
            self.issued.push((ctx.current_time(), command));
            ctx.log(format!("user: fan {command}"));
            self.next += 1;
        }
        self.now = Some(ctx.current_time());
        Ok(())
    }

    fn final_report(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "issued": self.issued.len() }))
    }
}
