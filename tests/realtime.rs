//! Real-time runs driven by the threaded timer service.
//!
//! Timing assertions use generous bounds: the point is ordering and
//! completion, not scheduler precision.

use std::sync::Arc;
use std::thread;
use std::time::{Duration as StdDuration, Instant};

use devs_hioa::architecture::{Architecture, AtomicModelDescriptor};
use devs_hioa::coupled::{CoupledModelDescriptor, EventSink, EventSource};
use devs_hioa::error::{SchedulingError, SimulationError};
use devs_hioa::event::EventType;
use devs_hioa::models::mock::{Ping, RecorderModel, TickerModel};
use devs_hioa::realtime::RTSimulation;
use devs_hioa::time::{Duration, Time, TimeUnit};
use devs_hioa::timer::{ThreadedTimerService, TimerService};
use devs_hioa::Simulation;

fn at(t: f64) -> Time {
    Time::new(t, TimeUnit::Seconds)
}

fn timers() -> Arc<dyn TimerService> {
    Arc::new(ThreadedTimerService::new().unwrap())
}

fn ticker_recorder() -> Arc<Simulation> {
    let sim = Architecture::new("root", TimeUnit::Seconds)
        .with_atomic(AtomicModelDescriptor::new("ticker", TimeUnit::Seconds, |spec| {
            Box::new(TickerModel::new(Duration::new(1.0, spec.time_unit)))
        }))
        .with_atomic(AtomicModelDescriptor::new("recorder", TimeUnit::Seconds, |spec| {
            Box::new(RecorderModel::new(spec.uri.clone()))
        }))
        .with_coupled(
            CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                .with_submodels(["ticker", "recorder"])
                .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("recorder"))
                .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder")),
        )
        .build()
        .unwrap();
    Arc::new(sim)
}

fn passive_recorder() -> Arc<Simulation> {
    let sim = Architecture::new("root", TimeUnit::Seconds)
        .with_atomic(AtomicModelDescriptor::new("recorder", TimeUnit::Seconds, |spec| {
            Box::new(RecorderModel::new(spec.uri.clone()))
        }))
        .with_coupled(
            CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                .with_submodels(["recorder"])
                .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("recorder")),
        )
        .build()
        .unwrap();
    Arc::new(sim)
}

fn received(sim: &Simulation) -> Vec<(Time, u64)> {
    sim.inspect::<RecorderModel, _>("recorder", |r| r.received.clone())
        .unwrap_or_default()
}

#[test]
fn test_rt_run_follows_wall_clock() {
    let sim = ticker_recorder();
    let rt = RTSimulation::new(sim.clone(), timers(), 10.0);

    let wall_start = Instant::now();
    rt.start_rt_simulation(wall_start, at(0.0), at(3.5)).unwrap();
    let outcome = rt.wait_for_completion(StdDuration::from_secs(10));
    let elapsed = wall_start.elapsed();

    assert_eq!(outcome, Some(Ok(())));
    assert!(rt.is_finished());
    assert!(!sim.is_running());
    // 3.5 simulated seconds at 10x.
    assert!(elapsed >= StdDuration::from_millis(340), "finished after {elapsed:?}");
    assert!(elapsed < StdDuration::from_secs(5), "finished after {elapsed:?}");

    assert_eq!(received(&sim), vec![(at(1.0), 1), (at(2.0), 2), (at(3.0), 3)]);
    assert!(sim.stats().metadata.real_time);
}

#[test]
fn test_standalone_rerun_is_not_reported_as_real_time() {
    let sim = ticker_recorder();
    let rt = RTSimulation::new(sim.clone(), timers(), 100.0);
    rt.start_rt_simulation(Instant::now(), at(0.0), at(2.5)).unwrap();
    assert_eq!(rt.wait_for_completion(StdDuration::from_secs(10)), Some(Ok(())));
    assert!(sim.stats().metadata.real_time);

    sim.do_standalone_simulation(at(0.0), at(2.5)).unwrap();
    assert!(!sim.stats().metadata.real_time);
    assert_eq!(received(&sim), vec![(at(1.0), 1), (at(2.0), 2)]);
}

#[test]
fn test_trigger_external_event_from_another_thread() {
    let sim = passive_recorder();
    let rt = RTSimulation::new(sim.clone(), timers(), 1.0);
    rt.start_rt_simulation(Instant::now(), at(0.0), at(1000.0)).unwrap();

    let injector = {
        let rt = rt.clone();
        thread::spawn(move || {
            thread::sleep(StdDuration::from_millis(50));
            rt.trigger_external_event("root", |time| Box::new(Ping::new(time, 9)))
        })
    };
    let stamp = injector.join().unwrap().unwrap();
    assert!(stamp >= at(0.05));
    assert!(stamp < at(5.0));

    let deadline = Instant::now() + StdDuration::from_secs(5);
    while received(&sim).is_empty() && Instant::now() < deadline {
        thread::sleep(StdDuration::from_millis(5));
    }
    assert_eq!(received(&sim), vec![(stamp, 9)]);
    assert!(!rt.is_finished());

    rt.stop();
    assert_eq!(rt.wait_for_completion(StdDuration::from_secs(1)), Some(Ok(())));
    assert_eq!(sim.current_time(), stamp);
}

#[test]
fn test_injected_events_keep_their_order() {
    let sim = passive_recorder();
    let rt = RTSimulation::new(sim.clone(), timers(), 1.0);
    rt.start_rt_simulation(Instant::now(), at(0.0), at(1000.0)).unwrap();

    let stamps: Vec<Time> = (1..=5)
        .map(|seq| {
            thread::sleep(StdDuration::from_millis(2));
            rt.trigger_external_event("recorder", move |time| Box::new(Ping::new(time, seq)))
                .unwrap()
        })
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));

    let deadline = Instant::now() + StdDuration::from_secs(5);
    while received(&sim).len() < 5 && Instant::now() < deadline {
        thread::sleep(StdDuration::from_millis(5));
    }
    rt.stop();

    let seqs: Vec<u64> = received(&sim).into_iter().map(|(_, seq)| seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_stop_is_idempotent() {
    let sim = ticker_recorder();
    let rt = RTSimulation::new(sim.clone(), timers(), 1.0);
    rt.start_rt_simulation(Instant::now(), at(0.0), at(100.0)).unwrap();

    rt.stop();
    rt.stop();
    assert!(rt.is_finished());
    assert_eq!(rt.wait_for_completion(StdDuration::from_millis(10)), Some(Ok(())));
    assert!(!sim.is_running());

    // The armed timer was cancelled: nothing happens after the stop.
    thread::sleep(StdDuration::from_millis(50));
    assert!(received(&sim).is_empty());
    assert!(matches!(
        rt.trigger_external_event("recorder", |t| Box::new(Ping::new(t, 1))),
        Err(SimulationError::NotRunning)
    ));
}

#[test]
fn test_invalid_acceleration_is_rejected() {
    let rt = RTSimulation::new(passive_recorder(), timers(), 0.0);
    let err = rt.start_rt_simulation(Instant::now(), at(0.0), at(1.0)).unwrap_err();
    assert!(matches!(err, SimulationError::Scheduling(SchedulingError::Rejected(_))));
    assert!(rt.wait_for_completion(StdDuration::from_millis(10)).is_none());
}

#[test]
fn test_shut_down_timer_service_fails_the_run() {
    let timers = timers();
    timers.shutdown();
    let rt = RTSimulation::new(ticker_recorder(), timers, 1.0);

    let err = rt.start_rt_simulation(Instant::now(), at(0.0), at(10.0)).unwrap_err();
    assert_eq!(err, SimulationError::Scheduling(SchedulingError::Shutdown));
    assert_eq!(
        rt.wait_for_completion(StdDuration::from_millis(10)),
        Some(Err(SimulationError::Scheduling(SchedulingError::Shutdown)))
    );
}

#[test]
fn test_transition_fires_at_its_wall_deadline() {
    // A 2 second time advance at real-time speed.
    let sim = Arc::new(
        Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("ticker", TimeUnit::Seconds, |spec| {
                Box::new(TickerModel::new(Duration::new(2.0, spec.time_unit)).with_limit(1))
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
            .unwrap(),
    );
    let rt = RTSimulation::new(sim.clone(), timers(), 1.0);

    let wall_start = Instant::now();
    rt.start_rt_simulation(wall_start, at(0.0), at(10.0)).unwrap();
    let deadline = wall_start + StdDuration::from_secs(5);
    while received(&sim).is_empty() && Instant::now() < deadline {
        thread::sleep(StdDuration::from_millis(1));
    }
    let fired_after = wall_start.elapsed();
    rt.stop();

    assert_eq!(received(&sim), vec![(at(2.0), 1)]);
    assert!(fired_after >= StdDuration::from_millis(1990), "fired after {fired_after:?}");
    assert!(fired_after < StdDuration::from_millis(2500), "fired after {fired_after:?}");
}

#[test]
fn test_injection_during_internal_transitions_loses_nothing() {
    // The target runs its own internal transitions every 50 ms while the
    // injections arrive.
    let sim = Arc::new(
        Architecture::new("root", TimeUnit::Seconds)
            .with_atomic(AtomicModelDescriptor::new("recorder", TimeUnit::Seconds, |spec| {
                Box::new(RecorderModel::new(spec.uri.clone()).with_period(Duration::new(0.05, spec.time_unit)))
            }))
            .with_coupled(
                CoupledModelDescriptor::new("root", TimeUnit::Seconds)
                    .with_submodels(["recorder"])
                    .import_event(EventType::of::<Ping>(), EventSink::new::<Ping>("recorder")),
            )
            .build()
            .unwrap(),
    );
    let rt = RTSimulation::new(sim.clone(), timers(), 1.0);
    rt.start_rt_simulation(Instant::now(), at(0.0), at(1.5)).unwrap();

    let injector = {
        let rt = rt.clone();
        thread::spawn(move || {
            (1..=20)
                .map(|seq| {
                    thread::sleep(StdDuration::from_millis(23));
                    rt.trigger_external_event("recorder", move |time| Box::new(Ping::new(time, seq)))
                        .unwrap()
                })
                .collect::<Vec<Time>>()
        })
    };
    let stamps = injector.join().unwrap();
    assert_eq!(rt.wait_for_completion(StdDuration::from_secs(10)), Some(Ok(())));

    let (received, externals, internals) = sim
        .inspect::<RecorderModel, _>("recorder", |r| {
            (r.received.clone(), r.externals.clone(), r.internal_times.clone())
        })
        .unwrap();

    let expected: Vec<(Time, u64)> = stamps.iter().copied().zip(1..).collect();
    assert_eq!(received, expected);
    // Every injection is applied no earlier than its stamp.
    for stamp in &stamps {
        assert!(externals.iter().any(|(time, _, _)| time == stamp), "no delivery at {stamp}");
    }
    assert!(internals.len() >= 25, "{} internal transitions", internals.len());
    assert!(internals.windows(2).all(|w| w[0] < w[1]));
}
