//! Treasury Deterministic Simulation Harness
//!
//! Runs the coordination engine on a virtual clock so that a whole session
//! (agent ticks plus crisis scenarios) replays identically from one seed.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advanced by the harness, one tick interval per tick
//! - **Scenario timers**: Step durations advance the same clock instead of waiting
//! - **Randomness**: Every agent stream derived from a single 64-bit seed
//!
//! # Usage
//!
//! ```ignore
//! use treasury_sim::{SimConfig, SimRunner};
//!
//! let runner = SimRunner::new(SimConfig { seed: 42, ..Default::default() });
//! let (result, _export) = runner.run("market-crash").await?;
//! assert!(result.passed);
//! ```

mod context;
mod error;
mod exporter;
mod runner;
mod world;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{FrameFailure, SimExport, SimFrame};
pub use runner::{SimMetrics, SimResult, SimRunner};
pub use world::{ScenarioReport, SimConfig, SimWorld};
