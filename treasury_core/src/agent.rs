//! Agents - the autonomous units the coordinator drives.
//!
//! An agent is pure data: identity, kind, lifecycle state and a performance
//! record. Only the coordinator mutates it; callers always receive clones.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use treasury_env::AgentId;

/// Classification of an agent. Drives template and impact selection.
///
/// Serialized as a plain lowercase string (`"trader"`, `"compliance"`, ...);
/// any other string, including differently cased built-in names, round-trips
/// through [`AgentKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentKind {
    Trader,
    Compliance,
    Supervisor,
    Advisor,
    Custom(String),
}

impl AgentKind {
    /// Returns the kind name.
    pub fn name(&self) -> &str {
        match self {
            AgentKind::Trader => "trader",
            AgentKind::Compliance => "compliance",
            AgentKind::Supervisor => "supervisor",
            AgentKind::Advisor => "advisor",
            AgentKind::Custom(name) => name,
        }
    }
}

impl From<String> for AgentKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "trader" => AgentKind::Trader,
            "compliance" => AgentKind::Compliance,
            "supervisor" => AgentKind::Supervisor,
            "advisor" => AgentKind::Advisor,
            _ => AgentKind::Custom(s),
        }
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        kind.name().to_string()
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Stopped,
    Active,
    Paused,
    Suspended,
}

/// A lifecycle request against a single agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleOp {
    Start,
    Pause,
    Suspend,
    Stop,
}

impl AgentState {
    /// Applies a lifecycle request.
    ///
    /// Returns the resulting state, or `None` if the request is not allowed
    /// from this state. A request that leaves the state unchanged (start on
    /// Active, pause on Paused) is a valid no-op.
    ///
    /// ```text
    /// start:   any                        -> Active
    /// pause:   Active | Paused            -> Paused
    /// suspend: Active | Paused | Suspended -> Suspended
    /// stop:    any                        -> Stopped
    /// ```
    pub fn apply(self, op: LifecycleOp) -> Option<AgentState> {
        use AgentState::*;
        match (op, self) {
            (LifecycleOp::Start, _) => Some(Active),
            (LifecycleOp::Stop, _) => Some(Stopped),
            (LifecycleOp::Pause, Active | Paused) => Some(Paused),
            (LifecycleOp::Pause, Stopped | Suspended) => None,
            (LifecycleOp::Suspend, Active | Paused | Suspended) => Some(Suspended),
            (LifecycleOp::Suspend, Stopped) => None,
        }
    }

    /// Returns true if the coordinator produces decisions for this state.
    pub fn is_active(self) -> bool {
        self == AgentState::Active
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentState::Stopped => "stopped",
            AgentState::Active => "active",
            AgentState::Paused => "paused",
            AgentState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleOp::Start => "start",
            LifecycleOp::Pause => "pause",
            LifecycleOp::Suspend => "suspend",
            LifecycleOp::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Running performance record of an agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    /// Share of decisions at or above the success threshold, in [0, 1]
    pub success_rate: f64,

    /// Number of decisions this agent has produced
    pub decisions_count: u64,

    /// Mean synthesis time per decision
    pub avg_response_time_ms: f64,
}

impl Performance {
    /// Folds one decision outcome into the running averages.
    pub fn record(&mut self, success: bool, response_time_ms: f64) {
        let n = self.decisions_count as f64;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = ((self.success_rate * n + outcome) / (n + 1.0)).clamp(0.0, 1.0);
        self.avg_response_time_ms = (self.avg_response_time_ms * n + response_time_ms.max(0.0)) / (n + 1.0);
        self.decisions_count += 1;
    }
}

/// Snapshot of an agent as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: AgentKind,
    #[serde(rename = "status")]
    pub state: AgentState,
    pub performance: Performance,
    pub last_action: Option<String>,
}

impl Agent {
    /// Creates a stopped agent with an empty performance record.
    pub fn new(spec: AgentSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            kind: spec.kind,
            state: AgentState::Stopped,
            performance: Performance::default(),
            last_action: None,
        }
    }
}

/// Registration input for a new agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    pub name: String,
    pub kind: AgentKind,
}

impl AgentSpec {
    /// Creates a spec, validating the id.
    pub fn new(id: &str, name: impl Into<String>, kind: AgentKind) -> Result<Self, EngineError> {
        Ok(Self {
            id: AgentId::new(id)?,
            name: name.into(),
            kind,
        })
    }
}

/// The standard four-agent treasury council.
pub fn default_roster() -> Vec<AgentSpec> {
    [
        ("trader-1", "Treasury Trader", AgentKind::Trader),
        ("compliance-1", "Compliance Sentinel", AgentKind::Compliance),
        ("supervisor-1", "Risk Supervisor", AgentKind::Supervisor),
        ("advisor-1", "Strategy Advisor", AgentKind::Advisor),
    ]
    .into_iter()
    .filter_map(|(id, name, kind)| AgentSpec::new(id, name, kind).ok())
    .collect()
}
