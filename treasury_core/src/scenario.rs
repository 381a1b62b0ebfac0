//! Scenario definitions - named, ordered sequences of simulated steps.

use crate::decision::DecisionDraft;
use crate::error::StepExecutionError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use treasury_env::{AgentId, RunId};

/// Status of a single step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Terminal result of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    /// Every step completed
    Completed,
    /// `stop()` was requested; steps from `at_step` on never completed
    Aborted { at_step: usize },
    /// A step failed and the run halted
    Failed { step_id: String, reason: String },
}

impl RunOutcome {
    pub fn phase(&self) -> RunPhase {
        match self {
            RunOutcome::Completed => RunPhase::Completed,
            RunOutcome::Aborted { .. } => RunPhase::Aborted,
            RunOutcome::Failed { .. } => RunPhase::Failed,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

/// Coarse state of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunPhase {
    Idle,
    Running,
    Completed,
    Aborted,
    Failed,
}

/// Pure function from step id to the step's result payload.
pub type StepResolver =
    Arc<dyn Fn(&str) -> Result<serde_json::Value, StepExecutionError> + Send + Sync>;

/// What a step does once its simulated duration has elapsed.
#[derive(Clone)]
pub enum StepAction {
    /// Compute the result from the step id
    Compute(StepResolver),

    /// Record a decision on behalf of an agent; the stored decision is the result
    Decision { agent_id: AgentId, draft: DecisionDraft },
}

impl std::fmt::Debug for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepAction::Compute(_) => f.write_str("Compute(..)"),
            StepAction::Decision { agent_id, draft } => f
                .debug_struct("Decision")
                .field("agent_id", agent_id)
                .field("action", &draft.action)
                .finish(),
        }
    }
}

/// One step of a scenario.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub simulated_duration_ms: u64,
    pub status: StepStatus,
    pub result: Option<serde_json::Value>,
    #[serde(skip)]
    pub action: StepAction,
}

impl ScenarioStep {
    /// Creates a pending step whose result is `{"stepId": id, "ok": true}`.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        simulated_duration_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            simulated_duration_ms,
            status: StepStatus::Pending,
            result: None,
            action: StepAction::Compute(Arc::new(|step_id| {
                Ok(serde_json::json!({ "stepId": step_id, "ok": true }))
            })),
        }
    }

    /// Uses a fixed result payload.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.action = StepAction::Compute(Arc::new(move |_| Ok(result.clone())));
        self
    }

    /// Computes the result with `resolver`.
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&str) -> Result<serde_json::Value, StepExecutionError> + Send + Sync + 'static,
    {
        self.action = StepAction::Compute(Arc::new(resolver));
        self
    }

    /// Makes this a decision step for `agent_id`.
    pub fn with_decision(mut self, agent_id: AgentId, draft: DecisionDraft) -> Self {
        self.action = StepAction::Decision { agent_id, draft };
        self
    }

    fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
    }
}

/// A named, ordered list of steps. Insertion order is execution order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a step.
    pub fn step(mut self, step: ScenarioStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns every step to Pending and clears results.
    pub fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
    }

    /// Sum of simulated step durations.
    pub fn total_duration_ms(&self) -> u64 {
        self.steps.iter().map(|s| s.simulated_duration_ms).sum()
    }
}

/// Read-only view of the runner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioStatus {
    pub run_id: Option<RunId>,
    pub scenario_id: Option<String>,
    pub current_step_index: usize,
    pub phase: RunPhase,
    pub steps: Vec<ScenarioStep>,
}

impl ScenarioStatus {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            scenario_id: None,
            current_step_index: 0,
            phase: RunPhase::Idle,
            steps: Vec::new(),
        }
    }

    /// Share of completed steps, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        let done = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        done as f64 / self.steps.len() as f64
    }
}
