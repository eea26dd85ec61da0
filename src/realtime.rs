//! Real-time driver.
//!
//! [`RTSimulation`] runs a [`Simulation`] against the wall clock. Every
//! simulated instant is mapped to a wall-clock deadline through an
//! [`RtClock`]; the driver keeps exactly one timer armed on the
//! [`TimerService`] for the next event, executes the due steps when it
//! fires and re-arms. Events can be injected from any thread with
//! [`RTSimulation::trigger_external_event`]; they are stamped with the
//! current wall-clock-derived simulated time and the timer is re-armed so
//! they are processed as soon as possible.
//!
//! # Implementation Notes
//!
//! - The driver state (clock, armed handle, arm token) sits behind one
//!   mutex. Every arm gets a fresh token; a callback whose token is no
//!   longer current returns without touching anything, so late or
//!   cancelled timers are harmless.
//! - Steps themselves go through the simulation's run lock, which is what
//!   serializes them against injections.
//! - There is no backpressure: injecting faster than the simulation
//!   consumes grows the models' pending queues.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{SchedulingError, SimResult, SimulationError};
use crate::event::Event;
use crate::simulation::Simulation;
use crate::time::{Duration, Time};
use crate::timer::{TimerHandle, TimerService};

/// Steps due within this much wall time are run in the current callback
/// instead of re-arming the timer.
const SLACK: StdDuration = StdDuration::from_micros(500);

/// Mapping between simulated time and wall-clock instants.
#[derive(Clone, Copy, Debug)]
pub struct RtClock {
    wall_start: Instant,
    sim_start: Time,
    acceleration: f64,
}

impl RtClock {
    /// `acceleration` is how many simulated seconds pass per wall-clock
    /// second.
    pub fn new(wall_start: Instant, sim_start: Time, acceleration: f64) -> Self {
        Self {
            wall_start,
            sim_start,
            acceleration,
        }
    }

    pub fn wall_start(&self) -> Instant {
        self.wall_start
    }

    pub fn sim_start(&self) -> Time {
        self.sim_start
    }

    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Wall-clock delay corresponding to a simulated duration.
    pub fn wall_delay(&self, sim: Duration) -> Option<StdDuration> {
        let std = sim.to_std()?;
        StdDuration::try_from_secs_f64(std.as_secs_f64() / self.acceleration).ok()
    }

    /// Wall-clock instant at which `time` is due; `None` for infinity.
    pub fn deadline(&self, time: Time) -> Option<Instant> {
        let delay = self.wall_delay(time.since(self.sim_start))?;
        self.wall_start.checked_add(delay)
    }

    /// Simulated time corresponding to a wall-clock instant.
    pub fn sim_time_at(&self, instant: Instant) -> Time {
        let elapsed = instant.saturating_duration_since(self.wall_start);
        let sim = Duration::from_std(elapsed, self.sim_start.unit()) * self.acceleration;
        self.sim_start + sim
    }

    pub fn now(&self) -> Time {
        self.sim_time_at(Instant::now())
    }
}

enum Outcome {
    Idle,
    Running,
    Finished(SimResult<()>),
}

struct Driver {
    clock: Option<RtClock>,
    end: Option<Time>,
    handle: Option<Arc<dyn TimerHandle>>,
    token: u64,
    finished: bool,
}

struct Inner {
    simulation: Arc<Simulation>,
    timers: Arc<dyn TimerService>,
    acceleration: f64,
    driver: Mutex<Driver>,
    outcome: Mutex<Outcome>,
    done: Condvar,
}

/// Wall-clock driven run of a simulation.
#[derive(Clone)]
pub struct RTSimulation {
    inner: Arc<Inner>,
}

impl RTSimulation {
    pub fn new(simulation: Arc<Simulation>, timers: Arc<dyn TimerService>, acceleration: f64) -> Self {
        Self {
            inner: Arc::new(Inner {
                simulation,
                timers,
                acceleration,
                driver: Mutex::new(Driver {
                    clock: None,
                    end: None,
                    handle: None,
                    token: 0,
                    finished: false,
                }),
                outcome: Mutex::new(Outcome::Idle),
                done: Condvar::new(),
            }),
        }
    }

    pub fn simulation(&self) -> &Arc<Simulation> {
        &self.inner.simulation
    }

    pub fn acceleration(&self) -> f64 {
        self.inner.acceleration
    }

    /// The clock of the current run, once started.
    pub fn clock(&self) -> Option<RtClock> {
        self.inner.driver.lock().clock
    }

    /// Initialises the models and arms the first timer. Simulated time
    /// `sim_start` corresponds to the wall-clock instant `wall_start`.
    pub fn start_rt_simulation(&self, wall_start: Instant, sim_start: Time, sim_end: Time) -> SimResult<()> {
        let acceleration = self.inner.acceleration;
        if !(acceleration.is_finite() && acceleration > 0.0) {
            return Err(SchedulingError::Rejected(format!(
                "acceleration factor must be positive, got {acceleration}"
            ))
            .into());
        }
        let sim = &self.inner.simulation;
        sim.initialise(sim_start, sim_end)?;
        sim.mark_real_time();

        let mut driver = self.inner.driver.lock();
        driver.clock = Some(RtClock::new(wall_start, sim_start, acceleration));
        driver.end = Some(sim_end);
        driver.finished = false;
        *self.inner.outcome.lock() = Outcome::Running;
        info!(root = %sim.root_uri(), %sim_start, %sim_end, acceleration, "real-time simulation started");

        if let Err(e) = Inner::arm(&self.inner, &mut driver) {
            Inner::finish(&self.inner, &mut driver, Err(e.clone()));
            return Err(e);
        }
        Ok(())
    }

    /// Injects an event built by `factory` into the model `uri` at the
    /// current wall-clock-derived simulated time, and returns that time.
    ///
    /// Safe to call from any thread while the run is active.
    pub fn trigger_external_event<F>(&self, uri: &str, factory: F) -> SimResult<Time>
    where
        F: FnOnce(Time) -> Box<dyn Event>,
    {
        let clock = {
            let driver = self.inner.driver.lock();
            match (driver.clock, driver.finished) {
                (Some(clock), false) => clock,
                _ => return Err(SimulationError::NotRunning),
            }
        };
        let time = self.inner.simulation.inject_with(uri, clock.now(), factory)?;
        debug!(target_uri = uri, %time, "external event triggered");

        let mut driver = self.inner.driver.lock();
        if !driver.finished {
            Inner::arm(&self.inner, &mut driver)?;
        }
        Ok(time)
    }

    /// Stops the run: cancels the armed timer and finalises the models.
    /// Idempotent.
    pub fn stop(&self) {
        self.inner.simulation.stop();
        let mut driver = self.inner.driver.lock();
        if driver.finished || driver.clock.is_none() {
            return;
        }
        Inner::finish(&self.inner, &mut driver, Ok(()));
    }

    pub fn is_finished(&self) -> bool {
        matches!(*self.inner.outcome.lock(), Outcome::Finished(_))
    }

    /// Blocks until the run finished or `timeout` elapsed. `None` on
    /// timeout or if the run never started.
    pub fn wait_for_completion(&self, timeout: StdDuration) -> Option<SimResult<()>> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.inner.outcome.lock();
        loop {
            match &*outcome {
                Outcome::Finished(result) => return Some(result.clone()),
                Outcome::Idle => return None,
                Outcome::Running => {
                    if self.inner.done.wait_until(&mut outcome, deadline).timed_out() {
                        return match &*outcome {
                            Outcome::Finished(result) => Some(result.clone()),
                            _ => None,
                        };
                    }
                }
            }
        }
    }
}

impl Inner {
    /// Arms a timer for the next event, replacing the current one. With
    /// nothing left before the end of the run, the timer is armed for the
    /// end itself, so that external events can still arrive until then.
    fn arm(this: &Arc<Inner>, driver: &mut Driver) -> SimResult<()> {
        let (Some(clock), Some(end)) = (driver.clock, driver.end) else {
            return Err(SimulationError::NotRunning);
        };
        if let Some(old) = driver.handle.take() {
            old.cancel();
        }
        driver.token += 1;

        let next = this.simulation.time_of_next_event();
        let target = if next >= end { end } else { next };
        let Some(deadline) = clock.deadline(target) else {
            // Passive with an open end: only an injection or a stop moves on.
            return Ok(());
        };
        let delay = deadline.saturating_duration_since(Instant::now());

        let token = driver.token;
        let weak = Arc::downgrade(this);
        let handle = this.timers.schedule(
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::fire(&inner, token);
                }
            }),
            delay,
        )?;
        driver.handle = Some(handle);
        debug!(%target, delay_ms = delay.as_secs_f64() * 1000.0, "timer armed");
        Ok(())
    }

    fn fire(this: &Arc<Inner>, token: u64) {
        let mut driver = this.driver.lock();
        if driver.finished || driver.token != token {
            return;
        }
        driver.handle = None;
        let (Some(clock), Some(end)) = (driver.clock, driver.end) else {
            return;
        };
        let sim = &this.simulation;
        loop {
            if sim.is_stop_requested() {
                Inner::finish(this, &mut driver, Ok(()));
                return;
            }
            let next = sim.time_of_next_event();
            if next >= end {
                if clock.deadline(end).is_some_and(|d| d <= Instant::now() + SLACK) {
                    Inner::finish(this, &mut driver, Ok(()));
                    return;
                }
                break;
            }
            match clock.deadline(next) {
                Some(deadline) if deadline > Instant::now() + SLACK => break,
                _ => {}
            }
            if let Err(e) = sim.step() {
                error!(root = %sim.root_uri(), error = %e, "real-time simulation aborted");
                Inner::finish(this, &mut driver, Err(e));
                return;
            }
        }
        if let Err(e) = Inner::arm(this, &mut driver) {
            warn!(error = %e, "could not re-arm the real-time timer");
            Inner::finish(this, &mut driver, Err(e));
        }
    }

    fn finish(this: &Arc<Inner>, driver: &mut Driver, result: SimResult<()>) {
        if driver.finished {
            return;
        }
        driver.finished = true;
        driver.token += 1;
        if let Some(handle) = driver.handle.take() {
            handle.cancel();
        }
        let sim = &this.simulation;
        let end_at = match (driver.end, &result) {
            (Some(end), Ok(())) if !sim.is_stop_requested() => end,
            _ => sim.current_time(),
        };
        sim.finalise(end_at);
        *this.outcome.lock() = Outcome::Finished(result);
        this.done.notify_all();
    }
}

impl std::fmt::Debug for RTSimulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RTSimulation")
            .field("simulation", &self.inner.simulation)
            .field("acceleration", &self.inner.acceleration)
            .field("finished", &self.is_finished())
            .finish()
    }
}
