//! Home Energy Example
//!
//! Runs the built-in home architecture over one simulated day:
//! - A scripted user switching a fan (Event-driven)
//! - A solar panel and a battery sampling on their own periods
//! - A battery-low alarm routed back to the fan through a converter
//!
//! Usage:
//!   cargo run --example home                  # stand-alone run
//!   cargo run --example home -- --rt          # real-time run at 3600x
//!   cargo run --example home -- home.yaml     # architecture from a file

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use devs_hioa::config::SimConfig;
use devs_hioa::event::{Event, EventMeta};
use devs_hioa::models::home::{default_home_architecture, BATTERY, FAN};
use devs_hioa::registry::create_default_registry;
use devs_hioa::{RTSimulation, Simulation, ThreadedTimerService, Time, TimeUnit, TracingSink};

const REAL_TIME_ACCELERATION: f64 = 3600.0;

fn print_results(sim: &Simulation) {
    println!("\n=== Final Reports ===");
    for (uri, report) in sim.final_reports() {
        println!("{uri:>10}: {report}");
    }

    let exported = sim.drain_exported_events();
    println!("\nEvents leaving the architecture: {}", exported.len());
    for event in exported.iter().map(|e| e.as_ref()) {
        println!("  {} at {}", event.event_type(), event.time_of_occurrence());
    }

    println!("\n{}", sim.stats().summary());
}

fn run_standalone(sim: &Simulation, start: Time, end: Time) -> Result<(), Box<dyn Error>> {
    println!("Stand-alone run from {start} to {end}");
    sim.do_standalone_simulation(start, end)?;
    Ok(())
}

fn run_real_time(sim: Arc<Simulation>, start: Time, end: Time, acceleration: f64) -> Result<(), Box<dyn Error>> {
    println!("Real-time run from {start} to {end} at {acceleration}x");
    let rt = RTSimulation::new(sim, Arc::new(ThreadedTimerService::new()?), acceleration);
    rt.start_rt_simulation(Instant::now(), start, end)?;

    let span = end.to_unit(TimeUnit::Seconds).value() - start.to_unit(TimeUnit::Seconds).value();
    let budget = StdDuration::from_secs_f64(span / acceleration + 5.0);
    match rt.wait_for_completion(budget) {
        Some(outcome) => outcome?,
        None => {
            rt.stop();
            return Err("real-time run did not finish in time".into());
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let real_time = args.iter().any(|a| a == "--rt");
    let path = args.iter().find(|a| !a.starts_with("--"));

    let (sim, start, end, acceleration) = match path {
        Some(path) => {
            let config = SimConfig::from_file(path)?;
            devs_hioa::init_logging(&config.simulation.log_level);
            let sim = config.build_simulation(&create_default_registry())?;
            (sim, config.start_time(), config.end_time(), config.simulation.acceleration)
        }
        None => {
            devs_hioa::init_logging("info");
            let sim = default_home_architecture().build()?;
            (
                sim,
                Time::new(0.0, TimeUnit::Hours),
                Time::new(24.0, TimeUnit::Hours),
                REAL_TIME_ACCELERATION,
            )
        }
    };
    let sim = Arc::new(sim.with_trace_sink(Arc::new(TracingSink)));

    println!("=== Home Energy Simulation ===");
    println!("Models: {}", sim.model_uris().join(", "));

    if real_time {
        run_real_time(sim.clone(), start, end, acceleration)?;
    } else {
        run_standalone(&sim, start, end)?;
    }

    if let Some(level) = sim.inspect::<devs_hioa::models::battery::BatteryModel, _>(BATTERY, |b| b.level()) {
        println!("Battery level at the end: {:.1}%", level * 100.0);
    }
    if let Some(state) = sim.inspect::<devs_hioa::models::fan::FanModel, _>(FAN, |f| f.state()) {
        println!("Fan state at the end: {state:?}");
    }

    print_results(&sim);
    Ok(())
}
