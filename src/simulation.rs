//! The simulation run context.
//!
//! A [`Simulation`] owns the engine arena produced by
//! [`Architecture::build`](crate::architecture::Architecture::build) and
//! drives the root coordination engine through the DEVS abstract
//! simulator loop:
//!
//! 1. the time of next event is the minimum over the engine tree;
//! 2. imminent atomic models run their output function;
//! 3. produced events are routed to their receivers;
//! 4. every model that is imminent or received events transitions;
//! 5. the global clock moves to the step time, and the loop repeats.
//!
//! Steps and external injections are serialized by a single run lock, so
//! an injected event is never ordered ahead of an already committed step.
//!
//! # Example
//!
//! ```
//! use devs_hioa::architecture::{Architecture, AtomicModelDescriptor};
//! use devs_hioa::coupled::{CoupledModelDescriptor, EventSink, EventSource};
//! use devs_hioa::models::mock::{Ping, RecorderModel, TickerModel};
//! use devs_hioa::time::{Duration, Time, TimeUnit};
//!
//! let arch = Architecture::new("root", TimeUnit::Seconds)
//!     .with_atomic(AtomicModelDescriptor::new("ticker", TimeUnit::Seconds, |_| {
//!         Box::new(TickerModel::new(Duration::new(1.0, TimeUnit::Seconds)))
//!     }))
//!     .with_atomic(AtomicModelDescriptor::new("recorder", TimeUnit::Seconds, |spec| {
//!         Box::new(RecorderModel::new(spec.uri.clone()))
//!     }))
//!     .with_coupled(
//!         CoupledModelDescriptor::new("root", TimeUnit::Seconds)
//!             .with_submodels(["ticker", "recorder"])
//!             .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder")),
//!     );
//!
//! let sim = arch.build().unwrap();
//! sim.do_standalone_simulation(
//!     Time::zero(TimeUnit::Seconds),
//!     Time::new(5.5, TimeUnit::Seconds),
//! )
//! .unwrap();
//!
//! let received = sim.inspect::<RecorderModel, _>("recorder", |r| r.received.len());
//! assert_eq!(received, Some(5));
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::engine::{CoordinationEngine, EngineArena};
use crate::error::{SimResult, SimulationError};
use crate::event::Event;
use crate::model::AtomicModel;
use crate::routing::{self, RouteResult};
use crate::stats::{wall_clock_now, RunStats, SimulationStats, Timer};
use crate::time::{Time, TimeUnit};
use crate::trace::TraceSink;
use crate::types::ModelUri;

/// Mutable state of the current run, guarded by the run lock.
pub(crate) struct RunState {
    running: bool,
    start_time: Time,
    current_time: Time,
    end_time: Time,
    stats: RunStats,
    timer: Option<Timer>,
    wall_time_ms: f64,
    started_at: Option<String>,
    ended_at: Option<String>,
}

impl RunState {
    fn new(unit: TimeUnit) -> Self {
        Self {
            running: false,
            start_time: Time::zero(unit),
            current_time: Time::zero(unit),
            end_time: Time::zero(unit),
            stats: RunStats::default(),
            timer: None,
            wall_time_ms: 0.0,
            started_at: None,
            ended_at: None,
        }
    }
}

/// A ready-to-run engine tree plus the state of its current run.
pub struct Simulation {
    arena: EngineArena,
    root_uri: ModelUri,
    global_time_unit: TimeUnit,
    trace: Option<Arc<dyn TraceSink>>,
    run: Mutex<RunState>,
    stop_requested: AtomicBool,
    real_time: AtomicBool,
    exported: Mutex<Vec<Box<dyn Event>>>,
}

impl Simulation {
    pub(crate) fn new(arena: EngineArena, root_uri: ModelUri, global_time_unit: TimeUnit) -> Self {
        Self {
            arena,
            root_uri,
            global_time_unit,
            trace: None,
            run: Mutex::new(RunState::new(global_time_unit)),
            stop_requested: AtomicBool::new(false),
            real_time: AtomicBool::new(false),
            exported: Mutex::new(Vec::new()),
        }
    }

    /// Attaches a trace sink receiving the models' diagnostic lines.
    pub fn with_trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub fn global_time_unit(&self) -> TimeUnit {
        self.global_time_unit
    }

    /// The engine tree.
    pub fn arena(&self) -> &EngineArena {
        &self.arena
    }

    /// URIs of every model, in engine order.
    pub fn model_uris(&self) -> Vec<&str> {
        self.arena.nodes().map(|n| n.uri()).collect()
    }

    fn trace(&self) -> Option<&dyn TraceSink> {
        self.trace.as_deref()
    }

    fn root(&self) -> SimResult<&CoordinationEngine> {
        self.arena
            .node(self.arena.root())
            .as_coordinator()
            .ok_or_else(|| SimulationError::UnknownModel(self.root_uri.clone()))
    }

    /// Prepares every model for a run over `[start, end)`.
    pub fn initialise(&self, start: Time, end: Time) -> SimResult<()> {
        let mut run = self.run.lock();
        if run.running {
            return Err(SimulationError::IllegalState {
                uri: self.root_uri.clone(),
                phase: "running",
                operation: "initialise",
            });
        }
        self.stop_requested.store(false, Ordering::SeqCst);
        self.real_time.store(false, Ordering::SeqCst);
        self.exported.lock().clear();

        for engine in self.arena.atomics() {
            engine.initialise_state(start)?;
        }
        for coordinator in self.arena.coordinators() {
            coordinator.reset(start);
        }
        // Every state is initialised before any variable is written.
        for engine in self.arena.atomics() {
            engine.initialise_variables()?;
        }

        let unit = self.global_time_unit;
        *run = RunState::new(unit);
        run.running = true;
        run.start_time = start;
        run.current_time = start;
        run.end_time = end;
        run.timer = Some(Timer::start());
        run.started_at = Some(wall_clock_now());
        info!(root = %self.root_uri, %start, %end, "simulation initialised");
        Ok(())
    }

    /// Time of the next event anywhere in the engine tree, in the unit of
    /// the model it comes from.
    pub fn time_of_next_event(&self) -> Time {
        self.arena.time_of_next_event(self.arena.root())
    }

    /// Time of the last committed step, in the global time unit.
    pub fn current_time(&self) -> Time {
        self.run.lock().current_time.to_unit(self.global_time_unit)
    }

    /// End time of the current run.
    pub fn end_time(&self) -> Time {
        self.run.lock().end_time.to_unit(self.global_time_unit)
    }

    pub fn is_running(&self) -> bool {
        self.run.lock().running
    }

    /// Requests the run to stop before its next step.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_real_time(&self) {
        self.real_time.store(true, Ordering::SeqCst);
    }

    fn step_locked(&self, run: &mut RunState, time: Time) -> SimResult<()> {
        if time < run.current_time {
            return Err(SimulationError::TimeReversal {
                from: run.current_time,
                to: time,
            });
        }
        let root = self.root()?;

        let mut outputs = Vec::new();
        root.collect_outputs(&self.arena, time, &mut outputs)?;
        run.stats.events_emitted += outputs.len() as u64;
        for (source, event) in outputs {
            let routed = routing::route(&self.arena, &source, event);
            self.apply_route(run, routed)?;
        }

        root.transition(&self.arena, time, self.trace())?;
        // Kept in the unit it was computed in: converting it would break
        // exact imminence checks against later injections.
        run.current_time = time;
        run.stats.steps_executed += 1;
        debug!(time = %run.current_time, "step");
        Ok(())
    }

    fn apply_route(&self, run: &mut RunState, routed: RouteResult) -> SimResult<()> {
        run.stats.events_dropped += routed.dropped as u64;
        for (uri, event) in routed.deliveries {
            self.arena.atomic(&uri)?.push_event(event)?;
            run.stats.events_delivered += 1;
        }
        if !routed.exported.is_empty() {
            run.stats.events_exported += routed.exported.len() as u64;
            self.exported.lock().extend(routed.exported);
        }
        Ok(())
    }

    /// Executes one step at the next event time, if it lies before the
    /// end of the run. Returns the time of the executed step in the global
    /// time unit.
    pub fn step(&self) -> SimResult<Option<Time>> {
        let mut run = self.run.lock();
        if !run.running {
            return Err(SimulationError::NotRunning);
        }
        let next = self.time_of_next_event();
        if next >= run.end_time {
            return Ok(None);
        }
        self.step_locked(&mut run, next)?;
        Ok(Some(next.to_unit(self.global_time_unit)))
    }

    /// Executes every step whose time is at most `horizon` and strictly
    /// before the end of the run, unless a stop is requested. Returns the
    /// time of the next pending event.
    pub fn run_until(&self, horizon: Time) -> SimResult<Time> {
        let mut run = self.run.lock();
        if !run.running {
            return Err(SimulationError::NotRunning);
        }
        loop {
            let next = self.time_of_next_event();
            if next >= run.end_time || next > horizon || self.is_stop_requested() {
                return Ok(next);
            }
            self.step_locked(&mut run, next)?;
        }
    }

    /// Ends the run: every model gets `end_simulation` and the trace sink is
    /// closed. Does nothing if no run is active.
    pub fn finalise(&self, end: Time) {
        let mut run = self.run.lock();
        if !run.running {
            return;
        }
        for engine in self.arena.atomics() {
            engine.end(end);
        }
        run.running = false;
        run.ended_at = Some(wall_clock_now());
        if let Some(timer) = run.timer.take() {
            run.wall_time_ms = timer.elapsed_ms();
        }
        if let Some(trace) = self.trace() {
            trace.close();
        }
        info!(
            root = %self.root_uri,
            time = %run.current_time.to_unit(self.global_time_unit),
            steps = run.stats.steps_executed,
            "simulation ended"
        );
    }

    /// Runs the whole simulation on the calling thread.
    ///
    /// Stops at `end` (exclusive) or earlier if [`Simulation::stop`] is
    /// called from another thread. Models are finalised and the trace sink
    /// is closed even when the run aborts with an error.
    pub fn do_standalone_simulation(&self, start: Time, end: Time) -> SimResult<()> {
        self.initialise(start, end)?;
        let outcome = self.run_until(end).map(|_| ());
        let end_at = if outcome.is_ok() && !self.is_stop_requested() {
            end
        } else {
            self.current_time()
        };
        if let Err(e) = &outcome {
            error!(root = %self.root_uri, error = %e, "simulation aborted");
        }
        self.finalise(end_at);
        outcome
    }

    /// Delivers an external event to a model, atomic or coupled, at the
    /// event's own time of occurrence.
    pub fn inject_event(&self, uri: &str, event: Box<dyn Event>) -> SimResult<()> {
        let mut run = self.run.lock();
        if !run.running {
            return Err(SimulationError::NotRunning);
        }
        if event.time_of_occurrence() < run.current_time {
            return Err(SimulationError::TimeReversal {
                from: run.current_time,
                to: event.time_of_occurrence(),
            });
        }
        self.deliver_external(&mut run, uri, event)
    }

    /// Builds and delivers an external event stamped with the later of
    /// `floor` and the last committed step time. Returns the stamp.
    pub(crate) fn inject_with<F>(&self, uri: &str, floor: Time, factory: F) -> SimResult<Time>
    where
        F: FnOnce(Time) -> Box<dyn Event>,
    {
        let mut run = self.run.lock();
        if !run.running {
            return Err(SimulationError::NotRunning);
        }
        let time = std::cmp::max(floor, run.current_time);
        self.deliver_external(&mut run, uri, factory(time))?;
        Ok(time)
    }

    fn deliver_external(&self, run: &mut RunState, uri: &str, event: Box<dyn Event>) -> SimResult<()> {
        if self.arena.get(uri).is_none() {
            return Err(SimulationError::UnknownModel(uri.to_string()));
        }
        debug!(target_uri = uri, event = %event.event_type(), time = %event.time_of_occurrence(), "external event");
        run.stats.events_injected += 1;
        let routed = routing::deliver_into(&self.arena, uri, event);
        self.apply_route(run, routed)
    }

    /// Typed read access to an atomic model's state. `None` if the URI is
    /// unknown, not atomic, or not of type `M`.
    pub fn inspect<M: AtomicModel, R>(&self, uri: &str, f: impl FnOnce(&M) -> R) -> Option<R> {
        self.arena.atomic(uri).ok()?.with_model(f)
    }

    /// Final reports of the models that provide one, keyed by URI.
    pub fn final_reports(&self) -> BTreeMap<ModelUri, serde_json::Value> {
        self.arena
            .atomics()
            .filter_map(|e| e.final_report().map(|r| (e.uri().to_string(), r)))
            .collect()
    }

    /// Events that left the root through its reexports since the run
    /// started.
    pub fn drain_exported_events(&self) -> Vec<Box<dyn Event>> {
        std::mem::take(&mut *self.exported.lock())
    }

    /// Snapshot of the run statistics.
    pub fn stats(&self) -> SimulationStats {
        let run = self.run.lock();
        let mut stats = SimulationStats::new().with_name(self.root_uri.clone());
        stats.metadata.version = env!("CARGO_PKG_VERSION").to_string();
        stats.metadata.start_time = run.started_at.clone();
        stats.metadata.end_time = run.ended_at.clone();
        stats.metadata.real_time = self.real_time.load(Ordering::SeqCst);

        stats.run = run.stats.clone();
        stats.run.time_unit = Some(self.global_time_unit);
        stats.run.start_time = run.start_time.to_unit(self.global_time_unit).value();
        stats.run.final_time = run.current_time.to_unit(self.global_time_unit).value();
        stats.run.model_count = self.arena.atomics().count();
        stats.run.coupled_count = self.arena.coordinators().count();

        stats.models = self
            .arena
            .atomics()
            .map(|e| (e.uri().to_string(), e.stats()))
            .collect();

        let wall_ms = match &run.timer {
            Some(timer) => timer.elapsed_ms(),
            None => run.wall_time_ms,
        };
        stats.compute_timing(wall_ms);
        stats
    }

    /// Statistics as a JSON value.
    pub fn export_stats(&self) -> serde_json::Value {
        serde_json::to_value(self.stats()).unwrap_or(serde_json::Value::Null)
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("root_uri", &self.root_uri)
            .field("global_time_unit", &self.global_time_unit)
            .field("engines", &self.arena.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::architecture::{Architecture, AtomicModelDescriptor};
    use crate::coupled::{CoupledModelDescriptor, EventSink, EventSource};
    use crate::models::mock::{PassiveModel, Ping, RecorderModel, TickerModel};
    use crate::time::Duration;

    fn at(t: f64) -> Time {
        Time::new(t, TimeUnit::Seconds)
    }

    fn ticker_recorder(limit: u64) -> Simulation {
        Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("ticker", TimeUnit::Seconds, move |_| {
                Box::new(TickerModel::new(Duration::new(1.0, TimeUnit::Seconds)).with_limit(limit))
            }))
            .with_atomic(AtomicModelDescriptor::new("recorder", TimeUnit::Seconds, |spec| {
                Box::new(RecorderModel::new(spec.uri.clone()))
            }))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["ticker", "recorder"])
                    .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_standalone_run() {
        let sim = ticker_recorder(3);
        sim.do_standalone_simulation(at(0.0), at(10.0)).unwrap();

        let received = sim
            .inspect::<RecorderModel, _>("recorder", |r| r.received.clone())
            .unwrap();
        assert_eq!(received, vec![(at(1.0), 1), (at(2.0), 2), (at(3.0), 3)]);
        assert!(!sim.is_running());

        let stats = sim.stats();
        assert_eq!(stats.run.steps_executed, 3);
        assert_eq!(stats.run.events_delivered, 3);
        assert_eq!(stats.models["recorder"].external_transitions, 3);
    }

    #[test]
    fn test_end_time_is_exclusive() {
        let sim = ticker_recorder(10);
        sim.do_standalone_simulation(at(0.0), at(3.0)).unwrap();
        let emitted = sim.inspect::<TickerModel, _>("ticker", |t| t.emitted).unwrap();
        assert_eq!(emitted, 2);
        assert_eq!(sim.current_time(), at(2.0));
    }

    #[test]
    fn test_step_by_step() {
        let sim = ticker_recorder(2);
        sim.initialise(at(0.0), at(10.0)).unwrap();
        assert_eq!(sim.time_of_next_event(), at(1.0));
        assert_eq!(sim.step().unwrap(), Some(at(1.0)));
        assert_eq!(sim.step().unwrap(), Some(at(2.0)));
        assert_eq!(sim.step().unwrap(), None);
        assert!(sim.time_of_next_event().is_infinite());
        sim.finalise(at(10.0));
        assert!(matches!(sim.step(), Err(SimulationError::NotRunning)));
    }

    #[test]
    fn test_inject_event_into_running_simulation() {
        let sim = ticker_recorder(0);
        sim.initialise(at(0.0), at(10.0)).unwrap();
        sim.inject_event("recorder", Box::new(Ping::new(at(4.0), 42)))
            .unwrap();
        assert_eq!(sim.time_of_next_event(), at(4.0));
        sim.run_until(at(10.0)).unwrap();
        sim.finalise(at(10.0));

        let received = sim
            .inspect::<RecorderModel, _>("recorder", |r| r.received.clone())
            .unwrap();
        assert_eq!(received, vec![(at(4.0), 42)]);
        assert_eq!(sim.stats().run.events_injected, 1);
    }

    #[test]
    fn test_inject_rejects_past_and_unknown() {
        let sim = ticker_recorder(5);
        sim.initialise(at(0.0), at(10.0)).unwrap();
        sim.run_until(at(2.0)).unwrap();
        assert!(matches!(
            sim.inject_event("recorder", Box::new(Ping::new(at(1.0), 1))),
            Err(SimulationError::TimeReversal { .. })
        ));
        assert!(matches!(
            sim.inject_event("nobody", Box::new(Ping::new(at(3.0), 1))),
            Err(SimulationError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_stop_before_end() {
        let sim = ticker_recorder(100);
        sim.initialise(at(0.0), at(100.0)).unwrap();
        sim.run_until(at(5.0)).unwrap();
        sim.stop();
        sim.run_until(at(50.0)).unwrap();
        assert_eq!(sim.current_time(), at(5.0));
    }

    #[test]
    fn test_protocol_violation_aborts_run() {
        let sim = Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("ticker", TimeUnit::Seconds, |_| {
                Box::new(TickerModel::new(Duration::new(1.0, TimeUnit::Seconds)))
            }))
            .with_atomic(AtomicModelDescriptor::new("passive", TimeUnit::Seconds, |_| {
                Box::new(PassiveModel::new())
            }))
            .with_coupled(CoupledModelDescriptor::new("root", TimeUnit::Seconds).with_submodels(["ticker", "passive"]))
            .build()
            .unwrap();
        sim.do_standalone_simulation(at(0.0), at(5.0)).unwrap();

        sim.initialise(at(0.0), at(5.0)).unwrap();
        sim.inject_event("passive", Box::new(Ping::new(at(0.5), 1))).unwrap();
        let err = sim.run_until(at(5.0)).unwrap_err();
        assert!(matches!(err, SimulationError::Protocol { ref uri, .. } if uri == "passive"));
    }

    #[test]
    fn test_final_reports_and_export_stats() {
        let sim = ticker_recorder(2);
        sim.do_standalone_simulation(at(0.0), at(5.0)).unwrap();
        let reports = sim.final_reports();
        assert_eq!(reports["ticker"]["emitted"], 2);
        assert_eq!(reports["recorder"]["received"], 2);

        let json = sim.export_stats();
        assert_eq!(json["run"]["steps_executed"], 2);
        assert_eq!(json["metadata"]["name"], "root");
    }
}
