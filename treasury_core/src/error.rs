//! Error taxonomy for the coordination engine.
//!
//! Lifecycle operations return [`EngineError`] and leave all state unchanged
//! on failure. [`EngineWarning`] is reported but never aborts the caller.
//! [`SubscriberError`] is caught by the event bus and only ever logged.

use crate::agent::{AgentState, LifecycleOp};
use thiserror::Error;
use treasury_env::{AgentId, EnvError};

/// Errors returned by coordinator and scenario runner operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(AgentId),

    #[error("Agent {agent_id} cannot {op} while {state}")]
    InvalidTransition {
        agent_id: AgentId,
        op: LifecycleOp,
        state: AgentState,
    },

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Scenario already active: {active}")]
    ScenarioAlreadyActive { active: String },

    #[error("Coordinator is running: {0}")]
    CoordinatorRunning(String),

    #[error(transparent)]
    StepExecution(#[from] StepExecutionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl EngineError {
    /// HTTP status an API adapter should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            EngineError::UnknownAgent(_) | EngineError::ScenarioNotFound(_) => 404,
            EngineError::ScenarioAlreadyActive { .. }
            | EngineError::InvalidTransition { .. }
            | EngineError::DuplicateAgent(_)
            | EngineError::CoordinatorRunning(_) => 409,
            EngineError::InvalidDecision(_) | EngineError::Env(_) => 400,
            EngineError::StepExecution(_) | EngineError::Config(_) => 500,
        }
    }
}

/// Non-fatal conditions reported alongside a successful operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineWarning {
    #[error("coordinator tick loop is already running")]
    AlreadyRunning,
}

/// A scenario step failed while computing its result.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("step {step_id} failed: {reason}")]
pub struct StepExecutionError {
    pub step_id: String,
    pub reason: String,
}

impl StepExecutionError {
    pub fn new(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            reason: reason.into(),
        }
    }
}

/// An event handler rejected or failed to process an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("subscriber failed: {0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Invalid engine configuration.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,

    #[error("ledger capacity must be greater than zero")]
    ZeroLedgerCapacity,

    #[error("event channel capacity must be greater than zero")]
    ZeroChannelCapacity,

    #[error("{name} must lie in [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("confidence range is inverted: min {min} > max {max}")]
    InvertedConfidence { min: f64, max: f64 },

    #[error("{name} must be finite and non-negative, got {value}")]
    NegativeBound { name: &'static str, value: f64 },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
