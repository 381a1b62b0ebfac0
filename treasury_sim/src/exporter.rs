//! JSON exporter for simulation runs.
//!
//! Exports one frame per coordinator tick plus the final engine snapshot, so
//! a dashboard or notebook can replay the run.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use treasury_core::{Agent, Decision, EngineSnapshot, TickReport};

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Tick sequence number
    pub tick: u64,

    /// Virtual time in milliseconds
    pub time_ms: u64,

    /// Agent states after the tick
    pub agents: Vec<Agent>,

    /// Decisions produced by this tick
    pub decisions: Vec<Decision>,

    /// Agents whose synthesis failed this tick
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FrameFailure>,
}

impl SimFrame {
    pub fn from_tick(report: &TickReport, time_ms: u64, agents: Vec<Agent>) -> Self {
        Self {
            tick: report.tick,
            time_ms,
            agents,
            decisions: report.decisions.clone(),
            failures: report
                .failures
                .iter()
                .map(|(agent_id, reason)| FrameFailure {
                    agent_id: agent_id.to_string(),
                    reason: reason.clone(),
                })
                .collect(),
        }
    }
}

/// A per-agent synthesis failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameFailure {
    pub agent_id: String,
    pub reason: String,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Virtual duration in milliseconds
    pub duration_ms: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Engine state at the end of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<EngineSnapshot>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_ms: 0,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
            snapshot: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.duration_ms = frame.time_ms;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(
        &mut self,
        passed: bool,
        failure_reason: Option<String>,
        snapshot: EngineSnapshot,
    ) {
        self.passed = passed;
        self.failure_reason = failure_reason;
        self.snapshot = Some(snapshot);
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
