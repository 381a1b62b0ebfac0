//! Agent Registry / Coordinator - owns the agents, their lifecycle and the
//! periodic decision-production loop.
//!
//! # Architecture
//!
//! ```text
//!  lifecycle ops ──► Registry (agents + rng) ──tick()──► DecisionLedger
//!                          ▲                                  │
//!                     tick loop                        DecisionCreated
//!                    (ctx.sleep)                              ▼
//!                                                   EventBus ──► observers
//! ```
//!
//! All writes to the registry and the ledger happen under the registry write
//! lock (registry before ledger). Readers take a short read lock and clone, so
//! they never hold a lock while the caller iterates. Events are published
//! after every lock is released.

use crate::agent::{Agent, AgentSpec, AgentState, LifecycleOp};
use crate::config::EngineConfig;
use crate::decision::{Decision, DecisionDraft, DecisionId};
use crate::error::{EngineError, EngineWarning};
use crate::event_bus::{EngineEvent, EventBus};
use crate::ledger::DecisionLedger;
use crate::market::{PriceOracle, StaticOracle};
use crate::scenario_runner::DecisionRecorder;
use crate::snapshot::EngineSnapshot;
use crate::synthesis::DecisionSynthesizer;
use crate::sync;
use crate::templates::TemplateBook;

use rand_chacha::ChaCha8Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use treasury_env::{AgentId, EngineContext};

/// An agent plus the random stream its decisions are drawn from.
struct AgentSlot {
    agent: Agent,
    rng: ChaCha8Rng,
}

struct Registry {
    /// Registration order is tick order
    agents: Vec<AgentSlot>,

    /// Next seed extension handed to `derive_rng`
    next_stream: u64,

    /// Next decision id
    next_decision_id: u64,

    /// Timestamp of the most recent decision batch
    last_timestamp_ms: u64,
}

impl Registry {
    fn slot_mut(&mut self, id: &AgentId) -> Result<&mut AgentSlot, EngineError> {
        self.agents
            .iter_mut()
            .find(|s| &s.agent.id == id)
            .ok_or_else(|| EngineError::UnknownAgent(id.clone()))
    }

    /// Strictly greater than any earlier batch, even if the clock stalls.
    fn next_timestamp(&self, now_ms: u64) -> u64 {
        now_ms.max(self.last_timestamp_ms + 1)
    }

    fn stamp(&mut self, draft: DecisionDraft, agent_id: AgentId, timestamp: u64) -> Decision {
        let id = DecisionId(self.next_decision_id);
        self.next_decision_id += 1;
        draft.into_decision(id, agent_id, timestamp)
    }
}

/// Handle to a running tick loop. Dropping it also stops the loop.
struct LoopControl {
    shutdown: watch::Sender<bool>,
}

/// Result of [`Coordinator::start_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Agents moved to Active by this call
    pub activated: Vec<AgentId>,

    /// Set when the tick loop was already running
    pub warning: Option<EngineWarning>,
}

/// Result of one tick.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Tick sequence number (1-based)
    pub tick: u64,

    /// Decisions produced, in agent registration order
    pub decisions: Vec<Decision>,

    /// Agents whose synthesis failed this tick
    pub failures: Vec<(AgentId, String)>,
}

struct Inner<C: EngineContext> {
    ctx: Arc<C>,
    config: EngineConfig,
    registry: RwLock<Registry>,
    ledger: RwLock<DecisionLedger>,
    bus: Arc<EventBus>,
    oracle: Arc<dyn PriceOracle>,
    synthesizer: DecisionSynthesizer,
    tick_loop: Mutex<Option<LoopControl>>,
    tick_count: AtomicU64,
}

/// The coordination engine.
///
/// Cheap to clone; clones share the same state. Construct one per process
/// with [`Coordinator::builder`] and tear it down with
/// [`Coordinator::stop_all`]. The tick loop holds only a weak reference, so
/// dropping every clone also ends it.
pub struct Coordinator<C: EngineContext> {
    inner: Arc<Inner<C>>,
}

impl<C: EngineContext> Clone for Coordinator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`Coordinator`].
pub struct CoordinatorBuilder<C: EngineContext> {
    ctx: Arc<C>,
    config: EngineConfig,
    bus: Option<Arc<EventBus>>,
    oracle: Arc<dyn PriceOracle>,
    templates: TemplateBook,
    agents: Vec<AgentSpec>,
}

impl<C: EngineContext> CoordinatorBuilder<C> {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing bus (e.g. with a scenario runner).
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn oracle(mut self, oracle: Arc<dyn PriceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn templates(mut self, templates: TemplateBook) -> Self {
        self.templates = templates;
        self
    }

    /// Registers agents at construction, in order.
    pub fn agents(mut self, agents: impl IntoIterator<Item = AgentSpec>) -> Self {
        self.agents.extend(agents);
        self
    }

    pub fn build(self) -> Result<Coordinator<C>, EngineError> {
        self.config.validate()?;

        let bus = self
            .bus
            .unwrap_or_else(|| EventBus::shared(self.config.event_channel_capacity));
        let inner = Inner {
            synthesizer: DecisionSynthesizer::new(self.templates, &self.config),
            ledger: RwLock::new(DecisionLedger::new(self.config.ledger_capacity)),
            registry: RwLock::new(Registry {
                agents: Vec::new(),
                next_stream: 0,
                next_decision_id: 1,
                last_timestamp_ms: 0,
            }),
            ctx: self.ctx,
            config: self.config,
            bus,
            oracle: self.oracle,
            tick_loop: Mutex::new(None),
            tick_count: AtomicU64::new(0),
        };
        let coordinator = Coordinator {
            inner: Arc::new(inner),
        };
        for spec in self.agents {
            coordinator.register(spec)?;
        }
        Ok(coordinator)
    }
}

impl<C: EngineContext> Coordinator<C> {
    /// Starts building a coordinator on `ctx`.
    pub fn builder(ctx: Arc<C>) -> CoordinatorBuilder<C> {
        CoordinatorBuilder {
            ctx,
            config: EngineConfig::default(),
            bus: None,
            oracle: Arc::new(StaticOracle::default()),
            templates: TemplateBook::default(),
            agents: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    pub fn context(&self) -> &Arc<C> {
        &self.inner.ctx
    }

    // =========================================================================
    // REGISTRY
    // =========================================================================

    /// Adds a stopped agent. Its random stream is derived from the context
    /// seed and the registration sequence number.
    pub fn register(&self, spec: AgentSpec) -> Result<Agent, EngineError> {
        let mut registry = sync::write(&self.inner.registry);
        if registry.agents.iter().any(|s| s.agent.id == spec.id) {
            return Err(EngineError::DuplicateAgent(spec.id));
        }
        let rng = self.inner.ctx.derive_rng(registry.next_stream);
        registry.next_stream += 1;

        let agent = Agent::new(spec);
        debug!(agent_id = %agent.id, kind = %agent.kind, "registered agent");
        registry.agents.push(AgentSlot {
            agent: agent.clone(),
            rng,
        });
        Ok(agent)
    }

    /// Removes an agent. Its decisions stay in the ledger.
    pub fn remove(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        let mut registry = sync::write(&self.inner.registry);
        let index = registry
            .agents
            .iter()
            .position(|s| &s.agent.id == agent_id)
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.clone()))?;
        let slot = registry.agents.remove(index);
        info!(agent_id = %agent_id, "removed agent");
        Ok(slot.agent)
    }

    /// Snapshots of every agent, in registration order.
    pub fn list_agents(&self) -> Vec<Agent> {
        sync::read(&self.inner.registry)
            .agents
            .iter()
            .map(|s| s.agent.clone())
            .collect()
    }

    /// Snapshot of one agent.
    pub fn agent(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        sync::read(&self.inner.registry)
            .agents
            .iter()
            .find(|s| &s.agent.id == agent_id)
            .map(|s| s.agent.clone())
            .ok_or_else(|| EngineError::UnknownAgent(agent_id.clone()))
    }

    /// Up to `limit` most recent decisions, newest first.
    pub fn recent_decisions(&self, limit: usize) -> Vec<Decision> {
        sync::read(&self.inner.ledger).recent(limit)
    }

    /// Lifetime number of ledger appends for `agent_id`.
    pub fn ledger_count_for_agent(&self, agent_id: &AgentId) -> u64 {
        sync::read(&self.inner.ledger).count_for_agent(agent_id)
    }

    /// Number of decisions currently retained.
    pub fn ledger_len(&self) -> usize {
        sync::read(&self.inner.ledger).len()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Activates every Stopped or Suspended agent and starts the tick loop.
    ///
    /// Paused agents stay paused. Calling this while the loop is running is
    /// not an error: the report carries [`EngineWarning::AlreadyRunning`].
    pub fn start_all(&self) -> StartReport {
        let changes = {
            let mut registry = sync::write(&self.inner.registry);
            let mut changes = Vec::new();
            for slot in registry.agents.iter_mut() {
                let from = slot.agent.state;
                if matches!(from, AgentState::Stopped | AgentState::Suspended) {
                    slot.agent.state = AgentState::Active;
                    changes.push((slot.agent.id.clone(), from, AgentState::Active));
                }
            }
            changes
        };
        let activated = changes.iter().map(|(id, _, _)| id.clone()).collect();
        self.publish_state_changes(changes);

        let mut tick_loop = sync::lock(&self.inner.tick_loop);
        let warning = if tick_loop.is_some() {
            warn!("start_all called while the tick loop is already running");
            Some(EngineWarning::AlreadyRunning)
        } else {
            *tick_loop = Some(self.spawn_tick_loop());
            info!(
                interval_ms = self.inner.config.tick_interval_ms,
                "coordinator tick loop started"
            );
            None
        };

        StartReport { activated, warning }
    }

    /// Stops the tick loop before its next tick and moves every agent to
    /// Stopped. A tick already in progress completes first.
    ///
    /// Returns true if the loop was running.
    pub fn stop_all(&self) -> bool {
        let was_running = match sync::lock(&self.inner.tick_loop).take() {
            Some(control) => {
                let _ = control.shutdown.send(true);
                true
            }
            None => false,
        };

        let changes = {
            let mut registry = sync::write(&self.inner.registry);
            let mut changes = Vec::new();
            for slot in registry.agents.iter_mut() {
                let from = slot.agent.state;
                if from != AgentState::Stopped {
                    slot.agent.state = AgentState::Stopped;
                    changes.push((slot.agent.id.clone(), from, AgentState::Stopped));
                }
            }
            changes
        };
        self.publish_state_changes(changes);

        if was_running {
            info!("coordinator tick loop stopped");
        }
        was_running
    }

    /// True while the tick loop is scheduled.
    pub fn is_running(&self) -> bool {
        sync::lock(&self.inner.tick_loop).is_some()
    }

    /// Activates one agent (from Stopped, Paused or Suspended).
    pub fn start(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        self.transition(agent_id, LifecycleOp::Start)
    }

    /// Pauses one Active agent.
    pub fn pause(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        self.transition(agent_id, LifecycleOp::Pause)
    }

    /// Administratively suspends an Active or Paused agent.
    pub fn suspend(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        self.transition(agent_id, LifecycleOp::Suspend)
    }

    /// Pause followed by start, under a single write lock.
    ///
    /// Readers observe the agent either in its prior state or Active. Only
    /// Active and Paused agents can be restarted.
    pub fn restart(&self, agent_id: &AgentId) -> Result<Agent, EngineError> {
        let (agent, changes) = {
            let mut registry = sync::write(&self.inner.registry);
            let slot = registry.slot_mut(agent_id)?;
            let from = slot.agent.state;
            let paused = from.apply(LifecycleOp::Pause).ok_or_else(|| {
                EngineError::InvalidTransition {
                    agent_id: agent_id.clone(),
                    op: LifecycleOp::Pause,
                    state: from,
                }
            })?;

            let mut changes = Vec::new();
            if paused != from {
                changes.push((agent_id.clone(), from, paused));
            }
            slot.agent.state = AgentState::Active;
            changes.push((agent_id.clone(), paused, AgentState::Active));
            (slot.agent.clone(), changes)
        };
        info!(agent_id = %agent_id, "restarted agent");
        self.publish_state_changes(changes);
        Ok(agent)
    }

    fn transition(&self, agent_id: &AgentId, op: LifecycleOp) -> Result<Agent, EngineError> {
        let (agent, from) = {
            let mut registry = sync::write(&self.inner.registry);
            let slot = registry.slot_mut(agent_id)?;
            let from = slot.agent.state;
            let to = from.apply(op).ok_or_else(|| EngineError::InvalidTransition {
                agent_id: agent_id.clone(),
                op,
                state: from,
            })?;
            slot.agent.state = to;
            (slot.agent.clone(), from)
        };

        if from != agent.state {
            debug!(agent_id = %agent_id, %from, to = %agent.state, "agent state changed");
            self.publish_state_changes(vec![(agent_id.clone(), from, agent.state)]);
        }
        Ok(agent)
    }

    fn publish_state_changes(&self, changes: Vec<(AgentId, AgentState, AgentState)>) {
        for (agent_id, from, to) in changes {
            self.inner
                .bus
                .publish(EngineEvent::AgentStateChanged { agent_id, from, to });
        }
    }

    // =========================================================================
    // TICK
    // =========================================================================

    /// Runs one decision-production cycle over every Active agent.
    ///
    /// A failure for one agent is logged and recorded in the report; the
    /// remaining agents still tick.
    pub fn tick(&self) -> TickReport {
        let tick = self.inner.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        let market = self.inner.oracle.snapshot();
        let mut report = TickReport {
            tick,
            ..Default::default()
        };

        {
            let mut registry = sync::write(&self.inner.registry);
            let timestamp = registry.next_timestamp(self.inner.ctx.unix_millis());
            let threshold = self.inner.config.success_threshold;

            let mut drafts = Vec::new();
            for slot in registry.agents.iter_mut() {
                if !slot.agent.state.is_active() {
                    continue;
                }
                let started = self.inner.ctx.now();
                match self
                    .inner
                    .synthesizer
                    .synthesize(&slot.agent, &mut slot.rng, &market)
                {
                    Ok(draft) => {
                        let elapsed_ms =
                            self.inner.ctx.now().saturating_sub(started).as_secs_f64() * 1000.0;
                        slot.agent
                            .performance
                            .record(draft.confidence >= threshold, elapsed_ms);
                        slot.agent.last_action = Some(draft.action.clone());
                        drafts.push((slot.agent.id.clone(), draft));
                    }
                    Err(e) => {
                        warn!(agent_id = %slot.agent.id, tick, error = %e, "decision synthesis failed");
                        report.failures.push((slot.agent.id.clone(), e.to_string()));
                    }
                }
            }

            if !drafts.is_empty() {
                registry.last_timestamp_ms = timestamp;
                let mut ledger = sync::write(&self.inner.ledger);
                for (agent_id, draft) in drafts {
                    let decision = registry.stamp(draft, agent_id, timestamp);
                    ledger.append(decision.clone());
                    report.decisions.push(decision);
                }
            }
        }

        debug!(
            tick,
            decisions = report.decisions.len(),
            failures = report.failures.len(),
            "tick complete"
        );
        for decision in &report.decisions {
            self.inner
                .bus
                .publish(EngineEvent::DecisionCreated(decision.clone()));
        }
        report
    }

    /// Number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.inner.tick_count.load(Ordering::SeqCst)
    }

    fn spawn_tick_loop(&self) -> LoopControl {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let weak: Weak<Inner<C>> = Arc::downgrade(&self.inner);
        let ctx = Arc::clone(&self.inner.ctx);
        let interval = self.inner.config.tick_interval();

        self.inner.ctx.spawn("coordinator-tick-loop", async move {
            loop {
                tokio::select! {
                    _ = ctx.sleep(interval) => {}
                    _ = shutdown_rx.changed() => break,
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Coordinator { inner }.tick();
            }
            debug!("tick loop exited");
        });

        LoopControl { shutdown }
    }

    // =========================================================================
    // EXTERNAL DECISIONS & PERSISTENCE
    // =========================================================================

    /// Appends a decision supplied from outside the tick (e.g. a scenario
    /// step) on behalf of `agent_id`, in any lifecycle state.
    pub fn record_decision(
        &self,
        agent_id: &AgentId,
        draft: DecisionDraft,
    ) -> Result<Decision, EngineError> {
        draft.validate().map_err(EngineError::InvalidDecision)?;

        let decision = {
            let mut registry = sync::write(&self.inner.registry);
            let timestamp = registry.next_timestamp(self.inner.ctx.unix_millis());
            let threshold = self.inner.config.success_threshold;
            let slot = registry.slot_mut(agent_id)?;
            slot.agent
                .performance
                .record(draft.confidence >= threshold, 0.0);
            slot.agent.last_action = Some(draft.action.clone());

            registry.last_timestamp_ms = timestamp;
            let decision = registry.stamp(draft, agent_id.clone(), timestamp);
            sync::write(&self.inner.ledger).append(decision.clone());
            decision
        };

        self.inner
            .bus
            .publish(EngineEvent::DecisionCreated(decision.clone()));
        Ok(decision)
    }

    /// Serializable copy of agents and retained decisions.
    pub fn snapshot(&self) -> EngineSnapshot {
        let registry = sync::read(&self.inner.registry);
        let ledger = sync::read(&self.inner.ledger);
        EngineSnapshot {
            taken_at_ms: self.inner.ctx.unix_millis(),
            agents: registry.agents.iter().map(|s| s.agent.clone()).collect(),
            decisions: ledger.iter().cloned().collect(),
        }
    }

    /// Replaces all agents and decisions with `snapshot`.
    ///
    /// Refused while the tick loop runs. Agents keep their recorded state,
    /// and each gets a fresh random stream.
    pub fn restore(&self, snapshot: EngineSnapshot) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::CoordinatorRunning(
                "stop the coordinator before restoring a snapshot".to_string(),
            ));
        }

        let mut registry = sync::write(&self.inner.registry);
        let mut ledger = sync::write(&self.inner.ledger);

        let counts: Vec<(AgentId, u64)> = snapshot
            .agents
            .iter()
            .map(|a| (a.id.clone(), a.performance.decisions_count))
            .collect();
        let next_decision_id = snapshot
            .decisions
            .iter()
            .map(|d| d.id.0 + 1)
            .max()
            .unwrap_or(1);
        let last_timestamp_ms = snapshot
            .decisions
            .iter()
            .map(|d| d.timestamp)
            .max()
            .unwrap_or(0);

        let mut agents = Vec::with_capacity(snapshot.agents.len());
        for (stream, agent) in snapshot.agents.into_iter().enumerate() {
            agents.push(AgentSlot {
                rng: self.inner.ctx.derive_rng(stream as u64),
                agent,
            });
        }

        *ledger = DecisionLedger::from_parts(
            self.inner.config.ledger_capacity,
            snapshot.decisions,
            counts,
        );
        registry.next_stream = agents.len() as u64;
        registry.agents = agents;
        registry.next_decision_id = next_decision_id.max(registry.next_decision_id);
        registry.last_timestamp_ms = last_timestamp_ms.max(registry.last_timestamp_ms);

        info!(
            agents = registry.agents.len(),
            decisions = ledger.len(),
            "restored engine snapshot"
        );
        Ok(())
    }
}

impl<C: EngineContext> DecisionRecorder for Coordinator<C> {
    fn record_decision(
        &self,
        agent_id: &AgentId,
        draft: DecisionDraft,
    ) -> Result<Decision, EngineError> {
        Coordinator::record_decision(self, agent_id, draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{default_roster, AgentKind};
    use crate::decision::DecisionImpact;
    use crate::event_bus::EventKind;
    use crate::templates::ActionTemplate;
    use std::time::Duration;
    use treasury_env::TokioContext;

    fn id(s: &str) -> AgentId {
        AgentId::new(s).unwrap()
    }

    fn two_agents() -> Vec<AgentSpec> {
        vec![
            AgentSpec::new("trader-1", "Trader", AgentKind::Trader).unwrap(),
            AgentSpec::new("compliance-1", "Compliance", AgentKind::Compliance).unwrap(),
        ]
    }

    fn coordinator(agents: Vec<AgentSpec>) -> Coordinator<TokioContext> {
        Coordinator::builder(Arc::new(TokioContext::seeded(42)))
            .agents(agents)
            .build()
            .unwrap()
    }

    fn activate_all(c: &Coordinator<TokioContext>) {
        for agent in c.list_agents() {
            c.start(&agent.id).unwrap();
        }
    }

    fn assert_counts_match_ledger(c: &Coordinator<TokioContext>) {
        for agent in c.list_agents() {
            assert_eq!(
                agent.performance.decisions_count,
                c.ledger_count_for_agent(&agent.id),
                "count mismatch for {}",
                agent.id
            );
        }
    }

    #[test]
    fn test_one_tick_two_agents() {
        let c = coordinator(two_agents());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _ = c.bus().subscribe(EventKind::DecisionCreated, move |event| {
            if let EngineEvent::DecisionCreated(d) = event {
                log.lock().unwrap().push(d.agent_id.clone());
            }
            Ok(())
        });

        activate_all(&c);
        let report = c.tick();

        assert_eq!(report.decisions.len(), 2);
        assert_eq!(c.recent_decisions(10).len(), 2);
        for agent in c.list_agents() {
            assert_eq!(agent.performance.decisions_count, 1);
            assert!(agent.last_action.is_some());
        }
        assert_eq!(*seen.lock().unwrap(), vec![id("trader-1"), id("compliance-1")]);
    }

    #[test]
    fn test_paused_agent_is_skipped() {
        let c = coordinator(two_agents());
        activate_all(&c);
        c.tick();

        c.pause(&id("trader-1")).unwrap();
        let report = c.tick();

        assert_eq!(report.decisions.len(), 1);
        assert_eq!(report.decisions[0].agent_id, id("compliance-1"));
        let recent = c.recent_decisions(10);
        assert_eq!(recent[0].agent_id, id("compliance-1"));
        assert_eq!(c.agent(&id("trader-1")).unwrap().performance.decisions_count, 1);
        assert_eq!(c.agent(&id("compliance-1")).unwrap().performance.decisions_count, 2);
    }

    #[test]
    fn test_counts_match_ledger_after_many_ticks() {
        let c = Coordinator::builder(Arc::new(TokioContext::seeded(7)))
            .config(EngineConfig::default().with_ledger_capacity(5))
            .agents(default_roster())
            .build()
            .unwrap();
        activate_all(&c);

        for round in 0..30 {
            if round == 10 {
                c.pause(&id("advisor-1")).unwrap();
            }
            if round == 20 {
                c.suspend(&id("supervisor-1")).unwrap();
            }
            c.tick();
            assert_counts_match_ledger(&c);
        }
        assert_eq!(c.ledger_len(), 5);
    }

    #[test]
    fn test_timestamps_strictly_increase_across_ticks() {
        let c = coordinator(two_agents());
        activate_all(&c);
        let mut last = 0;
        for _ in 0..20 {
            let report = c.tick();
            let ts = report.decisions[0].timestamp;
            assert!(report.decisions.iter().all(|d| d.timestamp == ts));
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn test_decision_ids_are_creation_ordered() {
        let c = coordinator(two_agents());
        activate_all(&c);
        c.tick();
        c.tick();
        let ids: Vec<u64> = c.recent_decisions(10).iter().map(|d| d.id.0).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let run = || {
            let c = coordinator(two_agents());
            activate_all(&c);
            c.tick();
            c.tick();
            c.recent_decisions(10)
                .into_iter()
                .map(|d| (d.action, d.confidence, d.impact))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_failing_agent_is_isolated() {
        let templates = TemplateBook::default().with_templates(
            AgentKind::Trader,
            vec![ActionTemplate::new("Swap {missing}", "broken")],
        );
        let c = Coordinator::builder(Arc::new(TokioContext::seeded(1)))
            .templates(templates)
            .agents(two_agents())
            .build()
            .unwrap();
        activate_all(&c);

        let report = c.tick();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, id("trader-1"));
        assert_eq!(report.decisions.len(), 1);
        assert_eq!(c.agent(&id("trader-1")).unwrap().performance.decisions_count, 0);
        assert_counts_match_ledger(&c);
    }

    #[test]
    fn test_unknown_agent_errors() {
        let c = coordinator(two_agents());
        let ghost = id("ghost-1");
        assert_eq!(c.start(&ghost), Err(EngineError::UnknownAgent(ghost.clone())));
        assert_eq!(c.pause(&ghost), Err(EngineError::UnknownAgent(ghost.clone())));
        assert_eq!(c.restart(&ghost), Err(EngineError::UnknownAgent(ghost)));
    }

    #[test]
    fn test_invalid_transition_leaves_state_unchanged() {
        let c = coordinator(two_agents());
        let trader = id("trader-1");
        let err = c.pause(&trader).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { state: AgentState::Stopped, .. }));
        assert_eq!(c.agent(&trader).unwrap().state, AgentState::Stopped);
    }

    #[test]
    fn test_restart_always_ends_active() {
        let c = coordinator(two_agents());
        let trader = id("trader-1");
        c.start(&trader).unwrap();
        assert_eq!(c.restart(&trader).unwrap().state, AgentState::Active);

        c.pause(&trader).unwrap();
        assert_eq!(c.restart(&trader).unwrap().state, AgentState::Active);

        c.suspend(&trader).unwrap();
        assert!(c.restart(&trader).is_err());
        assert_eq!(c.agent(&trader).unwrap().state, AgentState::Suspended);
    }

    #[test]
    fn test_restart_is_atomic_for_readers() {
        let c = coordinator(two_agents());
        let trader = id("trader-1");
        c.start(&trader).unwrap();

        let reader = c.clone();
        let handle = std::thread::spawn(move || {
            let trader = id("trader-1");
            for _ in 0..2_000 {
                let state = reader.agent(&trader).unwrap().state;
                assert_eq!(state, AgentState::Active);
            }
        });
        for _ in 0..500 {
            c.restart(&trader).unwrap();
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_restart_from_paused_is_atomic_for_readers() {
        let c = coordinator(two_agents());
        let trader = id("trader-1");
        c.start(&trader).unwrap();
        c.pause(&trader).unwrap();

        let reader = c.clone();
        let handle = std::thread::spawn(move || {
            let trader = id("trader-1");
            for _ in 0..2_000 {
                let state = reader.agent(&trader).unwrap().state;
                assert!(
                    matches!(state, AgentState::Paused | AgentState::Active),
                    "reader saw {:?}",
                    state
                );
            }
        });
        for _ in 0..500 {
            let restarted = c.restart(&trader).unwrap();
            assert_eq!(restarted.state, AgentState::Active);
            c.pause(&trader).unwrap();
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_restart_events() {
        let c = coordinator(two_agents());
        let trader = id("trader-1");
        c.start(&trader).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let _ = c.bus().subscribe(EventKind::AgentStateChanged, move |event| {
            if let EngineEvent::AgentStateChanged { from, to, .. } = event {
                log.lock().unwrap().push((*from, *to));
            }
            Ok(())
        });
        c.restart(&trader).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (AgentState::Active, AgentState::Paused),
                (AgentState::Paused, AgentState::Active)
            ]
        );
    }

    #[test]
    fn test_list_agents_returns_copies() {
        let c = coordinator(two_agents());
        let mut agents = c.list_agents();
        agents[0].state = AgentState::Active;
        agents[0].performance.decisions_count = 99;

        let fresh = c.list_agents();
        assert_eq!(fresh[0].state, AgentState::Stopped);
        assert_eq!(fresh[0].performance.decisions_count, 0);
    }

    #[test]
    fn test_empty_engine_is_valid() {
        let c = coordinator(Vec::new());
        assert!(c.list_agents().is_empty());
        assert!(c.recent_decisions(10).is_empty());
        assert!(c.tick().decisions.is_empty());
    }

    #[test]
    fn test_duplicate_and_remove() {
        let c = coordinator(two_agents());
        let dup = AgentSpec::new("trader-1", "Again", AgentKind::Trader).unwrap();
        assert_eq!(c.register(dup), Err(EngineError::DuplicateAgent(id("trader-1"))));

        activate_all(&c);
        c.tick();
        c.remove(&id("trader-1")).unwrap();
        assert_eq!(c.list_agents().len(), 1);
        // Decisions outlive their agent
        assert_eq!(c.ledger_count_for_agent(&id("trader-1")), 1);
    }

    #[test]
    fn test_record_decision_keeps_invariant() {
        let c = coordinator(two_agents());
        let draft = DecisionDraft::new("Hedge ETH", "Crash", 0.9, DecisionImpact::new(-5_000.0, -2.0, 0.0));
        let decision = c.record_decision(&id("trader-1"), draft.clone()).unwrap();

        assert_eq!(decision.agent_id, id("trader-1"));
        assert_counts_match_ledger(&c);
        assert_eq!(c.agent(&id("trader-1")).unwrap().last_action.as_deref(), Some("Hedge ETH"));

        let bad = DecisionDraft { confidence: 2.0, ..draft };
        assert!(matches!(
            c.record_decision(&id("trader-1"), bad),
            Err(EngineError::InvalidDecision(_))
        ));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let c = coordinator(two_agents());
        activate_all(&c);
        c.tick();
        c.tick();
        let snapshot = c.snapshot();

        let fresh = coordinator(Vec::new());
        fresh.restore(snapshot.clone()).unwrap();

        assert_eq!(fresh.list_agents(), snapshot.agents);
        assert_eq!(fresh.recent_decisions(10).len(), 4);
        assert_counts_match_ledger(&fresh);

        let report = fresh.tick();
        assert!(report.decisions.iter().all(|d| d.id.0 > 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_runs_on_interval() {
        let c = coordinator(two_agents());
        let report = c.start_all();
        assert_eq!(report.activated.len(), 2);
        assert_eq!(report.warning, None);
        assert!(c.is_running());

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(c.tick_count(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(c.tick_count(), 3);
        assert_counts_match_ledger(&c);
        c.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_twice_warns() {
        let c = coordinator(two_agents());
        c.start_all();
        let second = c.start_all();

        assert_eq!(second.warning, Some(EngineWarning::AlreadyRunning));
        assert!(second.activated.is_empty());
        c.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all_halts_loop() {
        let c = coordinator(two_agents());
        c.start_all();
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(c.tick_count(), 1);

        assert!(c.stop_all());
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(c.tick_count(), 1);
        assert!(!c.is_running());
        assert!(c.list_agents().iter().all(|a| a.state == AgentState::Stopped));
        assert!(!c.stop_all());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_all_keeps_paused_agents_paused() {
        let c = coordinator(two_agents());
        c.start(&id("trader-1")).unwrap();
        c.pause(&id("trader-1")).unwrap();
        c.suspend(&id("trader-1")).ok();
        c.start(&id("compliance-1")).unwrap();
        c.pause(&id("compliance-1")).unwrap();

        let report = c.start_all();

        assert_eq!(report.activated, vec![id("trader-1")]);
        assert_eq!(c.agent(&id("compliance-1")).unwrap().state, AgentState::Paused);
        c.stop_all();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_refused_while_running() {
        let c = coordinator(two_agents());
        c.start_all();
        let snapshot = c.snapshot();
        assert!(matches!(c.restore(snapshot), Err(EngineError::CoordinatorRunning(_))));
        c.stop_all();
    }
}
