//! # DEVS-HIOA Simulation Kernel
//!
//! A hierarchical discrete-event simulation kernel in the DEVS tradition,
//! extended with HIOA-style shared variables and a real-time driver.
//!
//! ## Design Principles
//!
//! - **Descriptor-Driven**: An [`Architecture`] of atomic and coupled model
//!   descriptors is the source of truth. It is checked once, at build time,
//!   and turned into an engine tree.
//! - **Event Couplings**: Events leave atomic models through `output`, are
//!   routed along connections, reexports and imports (converted on the way
//!   when a coupling says so) and run external transitions on their sinks.
//! - **Shared Variables**: Exported variables are published during internal
//!   transitions and read lazily by importers, which see the latest write.
//! - **Two Drivers**:
//!   - **Stand-alone**: [`Simulation::do_standalone_simulation`] steps as
//!     fast as possible.
//!   - **Real-time**: [`RTSimulation`] schedules each step on a
//!     [`TimerService`] at its wall-clock deadline.
//!
//! ## Features
//!
//! - `parallel` - Run the children of a coordinator through rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use devs_hioa::{Architecture, AtomicModelDescriptor, CoupledModelDescriptor, EventSink, EventSource};
//! use devs_hioa::models::mock::{Ping, RecorderModel, TickerModel};
//! use devs_hioa::time::{Duration, Time, TimeUnit};
//!
//! let unit = TimeUnit::Seconds;
//! let sim = Architecture::new("root", unit)
//!     .with_atomic(AtomicModelDescriptor::new("ticker", unit, |spec| {
//!         Box::new(TickerModel::new(Duration::new(1.0, spec.time_unit)))
//!     }))
//!     .with_atomic(AtomicModelDescriptor::new("recorder", unit, |spec| {
//!         Box::new(RecorderModel::new(spec.uri.clone()))
//!     }))
//!     .with_coupled(
//!         CoupledModelDescriptor::new("root", unit)
//!             .with_submodels(["ticker", "recorder"])
//!             .connect(EventSource::new::<Ping>("ticker"), EventSink::new::<Ping>("recorder")),
//!     )
//!     .build()
//!     .unwrap();
//!
//! sim.do_standalone_simulation(Time::zero(unit), Time::new(3.5, unit)).unwrap();
//! let received = sim.inspect::<RecorderModel, _>("recorder", |r| r.received.len());
//! assert_eq!(received, Some(3));
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use devs_hioa::{create_default_registry, SimConfig};
//!
//! let config = SimConfig::from_yaml_file("home.yaml")?;
//! let sim = config.build_simulation(&create_default_registry())?;
//! sim.do_standalone_simulation(config.start_time(), config.end_time())?;
//! ```

pub mod types;
pub mod time;
pub mod error;
pub mod event;
pub mod variable;
pub mod model;
pub mod coupled;
pub mod routing;
pub mod engine;
pub mod trace;
pub mod simulation;
pub mod architecture;
pub mod timer;
pub mod realtime;
pub mod config;
pub mod registry;
pub mod stats;
pub mod models;

// Re-export commonly used types
pub use types::{EngineId, ModelUri};
pub use time::{Duration, Time, TimeUnit};
pub use error::{ArchitectureError, ModelError, SchedulingError, SimResult, SimulationError, VariableError};
pub use event::{Event, EventConverter, EventType};
pub use variable::{ExportedVar, ImportedVar, SharedVariable, Value, VariableDecl, VariableType};
pub use model::{AtomicModel, ExternalTransition, InternalTransition, ModelInterface, VariableInit};
pub use coupled::{CoupledModelDescriptor, EventSink, EventSource, VariableSink, VariableSource};
pub use simulation::Simulation;
pub use architecture::{Architecture, AtomicModelDescriptor, ModelSpec};
pub use timer::{ThreadedTimerService, TimerHandle, TimerService};
pub use realtime::{RTSimulation, RtClock};
pub use config::{ConfigError, SimConfig, SimConfigBuilder};
pub use registry::{create_default_registry, ModelRegistry};
pub use stats::{SimulationStats, Timer};
pub use trace::{MemorySink, TraceSink, TracingSink};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging.
///
/// # Example
///
/// ```rust,ignore
/// devs_hioa::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
