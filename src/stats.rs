//! Statistics collection and export for simulation runs.
//!
//! Atomic engines count their own transitions; the simulation counts
//! steps and routed events. [`SimulationStats`] is the snapshot assembled
//! from both, exportable as JSON, CSV or a text summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::time::{Time, TimeUnit};
use crate::types::ModelUri;

/// Aggregate statistics for a simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    /// Run metadata
    pub metadata: SimulationMetadata,

    /// Coordinator-level counters
    pub run: RunStats,

    /// Per atomic model counters, keyed by URI
    pub models: BTreeMap<ModelUri, ModelStats>,

    /// Timing statistics
    pub timing: TimingStats,
}

/// Metadata about the simulation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SimulationMetadata {
    /// URI of the root coupled model
    pub name: String,

    /// Wall clock start, seconds since the epoch
    pub start_time: Option<String>,

    /// Wall clock end, seconds since the epoch
    pub end_time: Option<String>,

    /// Crate version
    pub version: String,

    /// Whether the run was driven by the real-time extension
    pub real_time: bool,
}

/// Coordinator-level counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Unit of the reported times
    pub time_unit: Option<TimeUnit>,

    /// Simulated start time
    pub start_time: f64,

    /// Simulated time of the last committed step
    pub final_time: f64,

    /// Steps executed by the root coordinator
    pub steps_executed: u64,

    /// Events produced by output functions
    pub events_emitted: u64,

    /// Copies delivered to atomic models
    pub events_delivered: u64,

    /// Routing hops that led nowhere
    pub events_dropped: u64,

    /// Events leaving the root through its reexports
    pub events_exported: u64,

    /// Events injected from outside the simulation
    pub events_injected: u64,

    /// Number of atomic models
    pub model_count: usize,

    /// Number of coupled models
    pub coupled_count: usize,
}

/// Counters of one atomic model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub internal_transitions: u64,
    pub external_transitions: u64,
    pub confluent_transitions: u64,
    /// Events returned by the output function
    pub outputs_emitted: u64,
    /// Events executed on the model
    pub events_received: u64,
    /// Peak number of pending events
    pub peak_queue_size: usize,
    /// State time of the last transition, in the model's unit
    pub last_transition_time: Option<f64>,
}

impl ModelStats {
    /// Total number of transitions, a confluent one counting once.
    pub fn transitions(&self) -> u64 {
        self.internal_transitions + self.external_transitions + self.confluent_transitions
    }

    pub(crate) fn record_transition(&mut self, time: Time) {
        self.last_transition_time = Some(time.value());
    }
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulated time units per wall-clock second
    pub sim_time_per_second: f64,

    /// Transitions per wall-clock second
    pub transitions_per_second: f64,
}

impl SimulationStats {
    /// Creates a new empty statistics container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.metadata.name = name.into();
        self
    }

    /// Total transitions across all models.
    pub fn total_transitions(&self) -> u64 {
        self.models.values().map(ModelStats::transitions).sum()
    }

    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            let simulated = self.run.final_time - self.run.start_time;
            self.timing.sim_time_per_second = simulated / seconds;
            self.timing.transitions_per_second = self.total_transitions() as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports summary statistics to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");

        csv.push_str(&format!("final_time,{}\n", self.run.final_time));
        csv.push_str(&format!("steps_executed,{}\n", self.run.steps_executed));
        csv.push_str(&format!("events_emitted,{}\n", self.run.events_emitted));
        csv.push_str(&format!("events_delivered,{}\n", self.run.events_delivered));
        csv.push_str(&format!("events_dropped,{}\n", self.run.events_dropped));
        csv.push_str(&format!("events_exported,{}\n", self.run.events_exported));
        csv.push_str(&format!("events_injected,{}\n", self.run.events_injected));
        csv.push_str(&format!("model_count,{}\n", self.run.model_count));
        csv.push_str(&format!("coupled_count,{}\n", self.run.coupled_count));

        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv.push_str(&format!("sim_time_per_second,{:.2}\n", self.timing.sim_time_per_second));
        csv.push_str(&format!(
            "transitions_per_second,{:.2}\n",
            self.timing.transitions_per_second
        ));

        csv
    }

    /// Exports summary statistics to CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports per-model statistics to CSV.
    pub fn models_to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("model,internal,external,confluent,outputs,received,peak_queue,last_transition\n");

        for (uri, stats) in &self.models {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                uri,
                stats.internal_transitions,
                stats.external_transitions,
                stats.confluent_transitions,
                stats.outputs_emitted,
                stats.events_received,
                stats.peak_queue_size,
                stats
                    .last_transition_time
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            ));
        }

        csv
    }

    /// Exports per-model statistics to CSV file.
    pub fn models_to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.models_to_csv())
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== Simulation Statistics ===")?;
        writeln!(w)?;

        if !self.metadata.name.is_empty() {
            writeln!(w, "Name: {}", self.metadata.name)?;
        }
        if let Some(ref start) = self.metadata.start_time {
            writeln!(w, "Started: {}", start)?;
        }
        if let Some(ref end) = self.metadata.end_time {
            writeln!(w, "Ended: {}", end)?;
        }
        if self.metadata.real_time {
            writeln!(w, "Mode: real time")?;
        }
        writeln!(w)?;

        let unit = self.run.time_unit.map(|u| u.symbol()).unwrap_or("");
        writeln!(w, "--- Run ---")?;
        writeln!(w, "Simulated: {} {unit} .. {} {unit}", self.run.start_time, self.run.final_time)?;
        writeln!(w, "Steps executed: {}", self.run.steps_executed)?;
        writeln!(w, "Events emitted: {}", self.run.events_emitted)?;
        writeln!(w, "Events delivered: {}", self.run.events_delivered)?;
        writeln!(w, "Events dropped: {}", self.run.events_dropped)?;
        writeln!(w, "Events exported: {}", self.run.events_exported)?;
        writeln!(w, "Events injected: {}", self.run.events_injected)?;
        writeln!(
            w,
            "Models: {} atomic, {} coupled",
            self.run.model_count, self.run.coupled_count
        )?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Sim time/sec: {:.2}", self.timing.sim_time_per_second)?;
        writeln!(w, "Transitions/sec: {:.2}", self.timing.transitions_per_second)?;
        writeln!(w)?;

        writeln!(w, "--- Models ---")?;
        for (uri, stats) in &self.models {
            writeln!(w, "{}:", uri)?;
            writeln!(
                w,
                "  Internal: {}, External: {}, Confluent: {}",
                stats.internal_transitions, stats.external_transitions, stats.confluent_transitions
            )?;
            writeln!(
                w,
                "  Outputs: {}, Received: {}",
                stats.outputs_emitted, stats.events_received
            )?;
        }

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Returns current timestamp as string.
pub(crate) fn wall_clock_now() -> String {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    format!("{}s", duration.as_secs())
}
