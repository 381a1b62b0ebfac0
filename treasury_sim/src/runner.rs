//! Simulation runner - drives one world through ticks and a catalog scenario.

use crate::error::SimError;
use crate::exporter::{SimExport, SimFrame};
use crate::world::{SimConfig, SimWorld};

use serde::Serialize;
use tracing::{debug, info, warn};
use treasury_core::{EventKind, RunPhase};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct SimResult {
    /// Scenario that was run
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Whether the scenario completed and every invariant held
    pub passed: bool,

    /// Terminal phase of the scenario run
    pub phase: RunPhase,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final virtual time in milliseconds
    pub final_time_ms: u64,

    /// Metrics collected during run
    pub metrics: SimMetrics,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimMetrics {
    pub decisions: usize,
    pub tick_failures: usize,
    pub state_changes: usize,
    pub steps_completed: usize,
    pub ledger_len: usize,
}

/// Runs catalog scenarios against fresh worlds.
pub struct SimRunner {
    config: SimConfig,
    record_frames: bool,
}

impl SimRunner {
    /// Creates a new runner.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            record_frames: false,
        }
    }

    /// Records a frame per tick for export.
    pub fn with_frames(mut self, record: bool) -> Self {
        self.record_frames = record;
        self
    }

    /// Runs `scenario_id` in a fresh world.
    ///
    /// Half of the configured ticks run before the scenario starts and the
    /// rest after it finishes.
    pub async fn run(&self, scenario_id: &str) -> Result<(SimResult, SimExport), SimError> {
        info!(scenario = scenario_id, seed = self.config.seed, "starting simulation");

        let mut world = SimWorld::new(self.config.clone())?;
        world.activate_agents()?;
        let mut export = SimExport::new(scenario_id, self.config.seed);
        let mut tick_failures = 0;

        let warmup = self.config.ticks / 2;
        for _ in 0..warmup {
            tick_failures += self.tick(&mut world, &mut export);
        }

        let report = world.run_scenario(scenario_id).await?;
        debug!(
            scenario = scenario_id,
            phase = ?report.phase,
            virtual_ms = report.virtual_duration_ms,
            "scenario finished"
        );

        for _ in warmup..self.config.ticks {
            tick_failures += self.tick(&mut world, &mut export);
        }

        let violations = world.check_invariants();
        let failure_reason = if report.phase != RunPhase::Completed {
            Some(format!(
                "scenario ended {:?} after {}/{} steps",
                report.phase, report.completed_steps, report.total_steps
            ))
        } else if !violations.is_empty() {
            Some(violations.join("; "))
        } else {
            None
        };
        let passed = failure_reason.is_none();
        if let Some(reason) = &failure_reason {
            warn!(scenario = scenario_id, %reason, "simulation failed");
        }

        let coordinator = world.coordinator();
        export.finalize(passed, failure_reason.clone(), coordinator.snapshot());

        let result = SimResult {
            scenario: scenario_id.to_string(),
            seed: self.config.seed,
            passed,
            phase: report.phase,
            total_ticks: world.tick_count(),
            final_time_ms: world.time_ms(),
            metrics: SimMetrics {
                decisions: world.event_count(EventKind::DecisionCreated),
                tick_failures,
                state_changes: world.event_count(EventKind::AgentStateChanged),
                steps_completed: report.completed_steps,
                ledger_len: coordinator.ledger_len(),
            },
            failure_reason,
        };
        Ok((result, export))
    }

    fn tick(&self, world: &mut SimWorld, export: &mut SimExport) -> usize {
        let report = world.tick();
        if self.record_frames {
            let agents = world.coordinator().list_agents();
            export.add_frame(SimFrame::from_tick(&report, world.time_ms(), agents));
        }
        report.failures.len()
    }
}
