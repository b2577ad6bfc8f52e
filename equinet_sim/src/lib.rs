//! EquiNet Deterministic Fault-Injection Simulator
//!
//! Replays inferred agent rules on a synchronous clock, injects transient
//! outages and lets recovered agents restore their cycle's "ones" count
//! from locally visible tallies only.
//!
//! # Core Principle: Seeded Everything
//!
//! All sources of non-determinism are controlled:
//! - **Randomness**: pattern permutations, inference order and runtime
//!   fallback bits each come from a generator derived from one master seed
//! - **Time**: a step counter; every read uses the previous committed state
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                        │
//! │   Pattern ──► StrategyInference ──► Topology (cycles)      │
//! │                                        │                   │
//! │  ┌─────────────────────────────────────▼─────────────────┐ │
//! │  │                      SimWorld                         │ │
//! │  │  FaultSchedule ──► SimAgent × N ──► Trace + EventLog  │ │
//! │  │                    (Online|Down) × (correcting)       │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │                                        │                   │
//! │                                   TraceExport (JSON)       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use equinet_sim::{FaultSchedule, FaultWindow, SimConfig, SimWorld};
//!
//! let schedule = FaultSchedule::new().with_window(FaultWindow::new(3, 4, 2));
//! let mut world = SimWorld::new(topology, schedule, SimConfig::default())?;
//! let trace = world.run();
//! ```

mod agent;
mod context;
mod error;
mod exporter;
mod faults;
mod runner;
mod trace;
mod world;
pub mod scenarios;

pub use agent::{FaultStatus, RuleOutcome, SimAgent};
pub use context::SimContext;
pub use error::{BuildError, ConfigError};
pub use exporter::{TraceExport, TraceFrame};
pub use faults::{FaultSchedule, FaultWindow, Transition};
pub use runner::{RunnerConfig, ScenarioMetrics, ScenarioResult, ScenarioRun, ScenarioRunner};
pub use trace::{CorrectionEvent, EventLog, RuntimeAnomaly, Snapshot, Status, Trace};
pub use world::{CorrectionPolicy, SimConfig, SimWorld};
