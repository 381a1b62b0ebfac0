//! Treasury Core - Multi-Agent Coordination Engine for DAO Treasuries
//!
//! A coordinator drives a fixed set of autonomous agents through a periodic
//! decision cycle:
//! 1. **Agents**: lifecycle state machine (Stopped/Active/Paused/Suspended) and performance stats
//! 2. **Decision Ledger**: bounded, append-only history of every synthesized decision
//! 3. **Coordinator**: registry owner, tick loop, lifecycle control
//! 4. **Event Bus**: typed synchronous pub/sub for decisions, state changes and scenarios
//! 5. **Scenario Runner**: cancellable, ordered execution of multi-step crisis drills
//!
//! Time, task spawning and randomness come from a [`treasury_env::EngineContext`],
//! so the same engine runs under tokio or under the deterministic simulator.

pub mod agent;
pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod decision;
pub mod error;
pub mod event_bus;
pub mod ledger;
pub mod market;
pub mod scenario;
pub mod scenario_runner;
pub mod snapshot;
pub mod synthesis;
pub mod templates;

mod sync;

// Re-export key types for convenience
pub use agent::{default_roster, Agent, AgentKind, AgentSpec, AgentState, LifecycleOp, Performance};
pub use config::EngineConfig;
pub use coordinator::{Coordinator, CoordinatorBuilder, StartReport, TickReport};
pub use decision::{Decision, DecisionDraft, DecisionId, DecisionImpact};
pub use error::{ConfigError, EngineError, EngineWarning, StepExecutionError, SubscriberError};
pub use event_bus::{Delivery, EngineEvent, EventBus, EventKind, SubscriptionHandle};
pub use ledger::DecisionLedger;
pub use market::{MarketSnapshot, PriceOracle, StaticOracle};
pub use scenario::{RunOutcome, RunPhase, Scenario, ScenarioStatus, ScenarioStep, StepStatus};
pub use scenario_runner::{DecisionRecorder, ScenarioRunner};
pub use snapshot::EngineSnapshot;
pub use templates::{ActionTemplate, TemplateBook};
