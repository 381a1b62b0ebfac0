//! SimWorld - The simulation harness container.

use crate::context::SimContext;
use crate::error::SimError;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use treasury_core::catalog::builtin_scenarios;
use treasury_core::{
    default_roster, AgentState, Coordinator, EngineConfig, EngineEvent, EventBus, EventKind,
    RunPhase, ScenarioRunner, ScenarioStatus, StepStatus, SubscriptionHandle, TickReport,
};
use treasury_env::{AgentId, EngineContext};

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Coordinator ticks per run
    pub ticks: u64,

    /// Engine settings shared by coordinator and runner
    pub engine: EngineConfig,

    /// Most recent events kept for inspection; counts cover every event
    pub event_log_capacity: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ticks: 24,
            engine: EngineConfig::default(),
            event_log_capacity: 1024,
        }
    }
}

/// Per-kind event counts plus a bounded window of the latest events.
#[derive(Debug, Default)]
struct EventLog {
    capacity: usize,
    recent: VecDeque<EngineEvent>,
    counts: HashMap<EventKind, usize>,
}

impl EventLog {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    fn record(&mut self, event: &EngineEvent) {
        *self.counts.entry(event.kind()).or_insert(0) += 1;
        if self.capacity == 0 {
            return;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(event.clone());
    }
}

/// Outcome of one scenario run inside the world.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub phase: RunPhase,
    pub completed_steps: usize,
    pub total_steps: usize,
    /// Virtual time the run took
    pub virtual_duration_ms: u64,
    pub status: ScenarioStatus,
}

/// The SimWorld - an engine wired to a virtual clock.
///
/// The world never starts the coordinator's own tick loop. It advances the
/// clock by one tick interval and calls `tick()` itself, so every run with
/// the same seed produces the same decisions.
pub struct SimWorld {
    /// Configuration
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    coordinator: Coordinator<SimContext>,
    runner: ScenarioRunner<SimContext>,

    /// Events published on the bus
    events: Arc<Mutex<EventLog>>,
    _subscriptions: Vec<SubscriptionHandle>,

    /// Current tick count
    tick_count: u64,
}

impl SimWorld {
    /// Creates a new SimWorld with the default roster and built-in scenarios.
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.engine.validate()?;

        let context = SimContext::shared(config.seed);
        let bus = EventBus::shared(config.engine.event_channel_capacity);

        let coordinator = Coordinator::builder(Arc::clone(&context))
            .config(config.engine.clone())
            .bus(Arc::clone(&bus))
            .agents(default_roster())
            .build()?;

        let runner = ScenarioRunner::new(Arc::clone(&context), Arc::clone(&bus))
            .with_scenarios(builtin_scenarios()?);
        runner.attach_recorder(Arc::new(coordinator.clone()));

        let events = Arc::new(Mutex::new(EventLog::new(config.event_log_capacity)));
        let subscriptions = [
            EventKind::DecisionCreated,
            EventKind::AgentStateChanged,
            EventKind::ScenarioStepCompleted,
            EventKind::ScenarioCompleted,
        ]
        .into_iter()
        .map(|kind| {
            let log = Arc::clone(&events);
            bus.subscribe(kind, move |event| {
                log.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(event);
                Ok(())
            })
        })
        .collect();

        Ok(Self {
            config,
            context,
            coordinator,
            runner,
            events,
            _subscriptions: subscriptions,
            tick_count: 0,
        })
    }

    pub fn coordinator(&self) -> &Coordinator<SimContext> {
        &self.coordinator
    }

    pub fn runner(&self) -> &ScenarioRunner<SimContext> {
        &self.runner
    }

    /// Activates every Stopped or Suspended agent without starting the
    /// coordinator's tick loop.
    pub fn activate_agents(&self) -> Result<Vec<AgentId>, SimError> {
        let mut activated = Vec::new();
        for agent in self.coordinator.list_agents() {
            if matches!(agent.state, AgentState::Stopped | AgentState::Suspended) {
                self.coordinator.start(&agent.id)?;
                activated.push(agent.id);
            }
        }
        Ok(activated)
    }

    /// Advances virtual time by one tick interval and runs one tick.
    pub fn tick(&mut self) -> TickReport {
        self.context.advance_time(self.config.engine.tick_interval());
        self.tick_count += 1;
        self.coordinator.tick()
    }

    /// Runs `ticks` consecutive ticks.
    pub fn run_ticks(&mut self, ticks: u64) -> Vec<TickReport> {
        (0..ticks).map(|_| self.tick()).collect()
    }

    /// Runs a catalog scenario to completion on the virtual clock.
    pub async fn run_scenario(&self, scenario_id: &str) -> Result<ScenarioReport, SimError> {
        let started_ms = self.context.now().as_millis() as u64;
        self.runner.start(scenario_id)?;
        let phase = self.runner.wait().await;
        let status = self.runner.status();

        Ok(ScenarioReport {
            scenario_id: scenario_id.to_string(),
            phase,
            completed_steps: status
                .steps
                .iter()
                .filter(|s| s.status == StepStatus::Completed)
                .count(),
            total_steps: status.steps.len(),
            virtual_duration_ms: (self.context.now().as_millis() as u64).saturating_sub(started_ms),
            status,
        })
    }

    /// The most recent events, oldest first, up to `event_log_capacity`.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recent
            .iter()
            .cloned()
            .collect()
    }

    /// Number of events of `kind` published so far.
    pub fn event_count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counts
            .get(&kind)
            .copied()
            .unwrap_or(0)
    }

    /// Checks engine invariants and returns a description of each violation.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for agent in self.coordinator.list_agents() {
            let appended = self.coordinator.ledger_count_for_agent(&agent.id);
            if agent.performance.decisions_count != appended {
                violations.push(format!(
                    "{}: decisionsCount {} != ledger appends {}",
                    agent.id, agent.performance.decisions_count, appended
                ));
            }
            if !(0.0..=1.0).contains(&agent.performance.success_rate) {
                violations.push(format!(
                    "{}: successRate {} outside [0, 1]",
                    agent.id, agent.performance.success_rate
                ));
            }
        }

        let capacity = self.config.engine.ledger_capacity;
        if self.coordinator.ledger_len() > capacity {
            violations.push(format!(
                "ledger holds {} decisions, capacity {}",
                self.coordinator.ledger_len(),
                capacity
            ));
        }

        // recent_decisions is newest first
        let decisions = self.coordinator.recent_decisions(capacity);
        for pair in decisions.windows(2) {
            if pair[0].timestamp < pair[1].timestamp || pair[0].id <= pair[1].id {
                violations.push(format!("{} is out of order after {}", pair[0].id, pair[1].id));
            }
        }

        violations
    }

    /// Returns the current simulation time in milliseconds.
    pub fn time_ms(&self) -> u64 {
        self.context.now().as_millis() as u64
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns the number of registered agents.
    pub fn agent_count(&self) -> usize {
        self.coordinator.list_agents().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use treasury_core::catalog::MARKET_CRASH;

    fn world(seed: u64) -> SimWorld {
        SimWorld::new(SimConfig {
            seed,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sim_world_creation() {
        let world = world(42);
        assert_eq!(world.agent_count(), 4);
        assert_eq!(world.tick_count(), 0);
        assert_eq!(world.time_ms(), 0);
    }

    #[test]
    fn test_sim_world_tick_advances_clock() {
        let mut world = world(42);
        world.activate_agents().unwrap();

        let report = world.tick();

        assert_eq!(world.tick_count(), 1);
        assert_eq!(world.time_ms(), 5_000);
        assert_eq!(report.decisions.len(), 4);
        assert!(!world.coordinator().is_running());
    }

    #[test]
    fn test_inactive_world_produces_nothing() {
        let mut world = world(42);
        let report = world.tick();
        assert!(report.decisions.is_empty());
        assert_eq!(world.event_count(EventKind::DecisionCreated), 0);
    }

    #[test]
    fn test_sim_world_determinism() {
        let mut first = world(7);
        let mut second = world(7);
        first.activate_agents().unwrap();
        second.activate_agents().unwrap();

        first.run_ticks(5);
        second.run_ticks(5);

        assert_eq!(
            first.coordinator().recent_decisions(100),
            second.coordinator().recent_decisions(100)
        );
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut first = world(1);
        let mut second = world(2);
        first.activate_agents().unwrap();
        second.activate_agents().unwrap();

        let a = first.tick();
        let b = second.tick();

        let confidences = |r: &TickReport| r.decisions.iter().map(|d| d.confidence).collect::<Vec<_>>();
        assert_ne!(confidences(&a), confidences(&b));
    }

    #[test]
    fn test_invariants_hold_past_ledger_capacity() {
        let mut world = SimWorld::new(SimConfig {
            seed: 3,
            ticks: 0,
            engine: EngineConfig::default().with_ledger_capacity(10),
            ..Default::default()
        })
        .unwrap();
        world.activate_agents().unwrap();
        world.run_ticks(20);

        assert_eq!(world.coordinator().ledger_len(), 10);
        assert!(world.check_invariants().is_empty(), "{:?}", world.check_invariants());
    }

    #[tokio::test]
    async fn test_scenario_runs_on_virtual_clock() {
        let mut world = world(11);
        world.activate_agents().unwrap();
        world.run_ticks(2);

        let before = world.time_ms();
        let report = world.run_scenario(MARKET_CRASH).await.unwrap();

        assert_eq!(report.phase, RunPhase::Completed);
        assert_eq!(report.completed_steps, report.total_steps);
        assert_eq!(report.virtual_duration_ms, report.status.steps.iter().map(|s| s.simulated_duration_ms).sum::<u64>());
        assert!(world.time_ms() > before);

        // Two decision steps wrote through the coordinator
        assert_eq!(world.event_count(EventKind::DecisionCreated), 2 * 4 + 2);
        assert_eq!(world.event_count(EventKind::ScenarioCompleted), 1);
        assert!(world.check_invariants().is_empty());
        assert!(world.context.now() >= Duration::from_millis(10_000));
    }

    #[test]
    fn test_event_log_is_bounded_but_counts_everything() {
        let mut world = SimWorld::new(SimConfig {
            seed: 5,
            event_log_capacity: 8,
            ..Default::default()
        })
        .unwrap();
        world.activate_agents().unwrap();
        world.run_ticks(10);

        let events = world.events();
        assert_eq!(events.len(), 8);
        assert_eq!(world.event_count(EventKind::DecisionCreated), 40);
        assert_eq!(world.event_count(EventKind::AgentStateChanged), 4);
        assert!(events.iter().all(|e| e.kind() == EventKind::DecisionCreated));
    }

    #[tokio::test]
    async fn test_unknown_scenario() {
        let world = world(1);
        let err = world.run_scenario("meteor-strike").await.unwrap_err();
        assert!(matches!(err, SimError::Engine(treasury_core::EngineError::ScenarioNotFound(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_invariants_hold_for_any_seed(
            seed in any::<u64>(),
            ticks in 1u64..40,
            capacity in 1usize..30,
        ) {
            let mut world = SimWorld::new(SimConfig {
                seed,
                ticks,
                engine: EngineConfig::default().with_ledger_capacity(capacity),
                ..Default::default()
            })
            .unwrap();
            world.activate_agents().unwrap();
            world.run_ticks(ticks);

            prop_assert!(world.check_invariants().is_empty(), "{:?}", world.check_invariants());
            prop_assert_eq!(world.coordinator().ledger_len(), capacity.min(4 * ticks as usize));
        }
    }
}
