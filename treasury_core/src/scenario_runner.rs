//! Scenario Runner - executes one scenario's steps in order, one run at a time.
//!
//! Each step waits out its simulated duration on a cancellable timer, then
//! computes its result and publishes `ScenarioStepCompleted`. `stop()` wakes
//! the timer immediately; the run ends as `Aborted` and the remaining steps
//! stay Pending. A failing step halts the run as `Failed`. Either way the run
//! ends with exactly one `ScenarioCompleted` event.

use crate::decision::{Decision, DecisionDraft};
use crate::error::{EngineError, StepExecutionError};
use crate::event_bus::{EngineEvent, EventBus};
use crate::scenario::{RunOutcome, RunPhase, Scenario, ScenarioStatus, StepAction, StepStatus};
use crate::sync;

use rand::Rng;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};
use treasury_env::{AgentId, EngineContext, RunId};

/// Random-stream extensions for run ids start here, clear of agent streams.
const RUN_ID_STREAM: u64 = 1 << 63;

/// Sink for decisions produced by scenario decision steps.
///
/// Implemented by the coordinator, which stays the only ledger writer.
pub trait DecisionRecorder: Send + Sync {
    fn record_decision(
        &self,
        agent_id: &AgentId,
        draft: DecisionDraft,
    ) -> Result<Decision, EngineError>;
}

/// Cancellation signal for one run.
struct RunCancel {
    requested: AtomicBool,
    notify: Notify,
}

impl RunCancel {
    fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // notify_one stores a permit if the timer is not being awaited yet
        self.notify.notify_one();
    }

    fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

struct ActiveRun {
    run_id: RunId,
    scenario: Scenario,
    current_step_index: usize,
    cancel: Arc<RunCancel>,
}

struct RunnerState {
    phase: RunPhase,
    run: Option<ActiveRun>,
}

/// A step that has just been marked Running.
struct StepTicket {
    run_id: RunId,
    scenario_id: String,
    step_id: String,
    duration: Duration,
    action: StepAction,
}

struct RunnerInner<C: EngineContext> {
    ctx: Arc<C>,
    bus: Arc<EventBus>,
    catalog: RwLock<Vec<Scenario>>,
    state: RwLock<RunnerState>,
    recorder: RwLock<Option<Arc<dyn DecisionRecorder>>>,
    phase_tx: watch::Sender<RunPhase>,
    runs_started: AtomicU64,
}

/// Runs registered scenarios. Cheap to clone; clones share state.
pub struct ScenarioRunner<C: EngineContext> {
    inner: Arc<RunnerInner<C>>,
}

impl<C: EngineContext> Clone for ScenarioRunner<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: EngineContext> ScenarioRunner<C> {
    /// Creates an idle runner publishing on `bus`.
    pub fn new(ctx: Arc<C>, bus: Arc<EventBus>) -> Self {
        let (phase_tx, _) = watch::channel(RunPhase::Idle);
        Self {
            inner: Arc::new(RunnerInner {
                ctx,
                bus,
                catalog: RwLock::new(Vec::new()),
                state: RwLock::new(RunnerState {
                    phase: RunPhase::Idle,
                    run: None,
                }),
                recorder: RwLock::new(None),
                phase_tx,
                runs_started: AtomicU64::new(0),
            }),
        }
    }

    /// Registers several scenarios.
    pub fn with_scenarios(self, scenarios: impl IntoIterator<Item = Scenario>) -> Self {
        for scenario in scenarios {
            self.register(scenario);
        }
        self
    }

    /// Attaches the sink used by decision steps.
    pub fn attach_recorder(&self, recorder: Arc<dyn DecisionRecorder>) {
        *sync::write(&self.inner.recorder) = Some(recorder);
    }

    /// Adds a scenario, replacing any scenario with the same id.
    ///
    /// A run already in progress keeps executing its own copy.
    pub fn register(&self, scenario: Scenario) -> Option<Scenario> {
        let mut catalog = sync::write(&self.inner.catalog);
        match catalog.iter_mut().find(|s| s.id == scenario.id) {
            Some(existing) => Some(std::mem::replace(existing, scenario)),
            None => {
                catalog.push(scenario);
                None
            }
        }
    }

    /// Registered scenarios, in registration order.
    pub fn scenarios(&self) -> Vec<Scenario> {
        sync::read(&self.inner.catalog).clone()
    }

    /// Starts `scenario_id`. Execution continues on a spawned task.
    pub fn start(&self, scenario_id: &str) -> Result<RunId, EngineError> {
        let mut scenario = sync::read(&self.inner.catalog)
            .iter()
            .find(|s| s.id == scenario_id)
            .cloned()
            .ok_or_else(|| EngineError::ScenarioNotFound(scenario_id.to_string()))?;

        let run_id = self.inner.next_run_id();
        let cancel = Arc::new(RunCancel::new());
        {
            let mut state = sync::write(&self.inner.state);
            if state.phase == RunPhase::Running {
                let active = state
                    .run
                    .as_ref()
                    .map(|r| r.scenario.id.clone())
                    .unwrap_or_default();
                return Err(EngineError::ScenarioAlreadyActive { active });
            }
            scenario.reset();
            state.run = Some(ActiveRun {
                run_id,
                scenario,
                current_step_index: 0,
                cancel: Arc::clone(&cancel),
            });
            state.phase = RunPhase::Running;
            self.inner.phase_tx.send_replace(RunPhase::Running);
        }
        info!(scenario_id, %run_id, "scenario started");

        let inner = Arc::clone(&self.inner);
        self.inner
            .ctx
            .spawn(&format!("scenario-{}", scenario_id), async move {
                let outcome = inner.execute(&cancel).await;
                inner.finish(run_id, outcome);
            });
        Ok(run_id)
    }

    /// Requests cancellation of the active run.
    ///
    /// Returns false, and does nothing else, when no run is active.
    pub fn stop(&self) -> bool {
        let state = sync::read(&self.inner.state);
        match (&state.phase, &state.run) {
            (RunPhase::Running, Some(run)) => {
                if !run.cancel.is_requested() {
                    info!(scenario_id = %run.scenario.id, run_id = %run.run_id, "scenario stop requested");
                }
                run.cancel.request();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the current (or most recent) run.
    pub fn status(&self) -> ScenarioStatus {
        let state = sync::read(&self.inner.state);
        match &state.run {
            Some(run) => ScenarioStatus {
                run_id: Some(run.run_id),
                scenario_id: Some(run.scenario.id.clone()),
                current_step_index: run.current_step_index,
                phase: state.phase,
                steps: run.scenario.steps.clone(),
            },
            None => ScenarioStatus::idle(),
        }
    }

    /// Waits until no run is active and returns the final phase.
    pub async fn wait(&self) -> RunPhase {
        let mut rx = self.inner.phase_tx.subscribe();
        let result = rx.wait_for(|phase| *phase != RunPhase::Running).await;
        match result {
            Ok(phase) => *phase,
            Err(_) => sync::read(&self.inner.state).phase,
        }
    }
}

impl<C: EngineContext> RunnerInner<C> {
    /// Run ids come from the context's random streams, so seeded contexts
    /// reproduce them.
    fn next_run_id(&self) -> RunId {
        let n = self.runs_started.fetch_add(1, Ordering::Relaxed);
        RunId::from_seed(self.ctx.derive_rng(RUN_ID_STREAM | n).gen())
    }

    async fn execute(&self, cancel: &RunCancel) -> RunOutcome {
        let step_count = sync::read(&self.state)
            .run
            .as_ref()
            .map(|r| r.scenario.steps.len())
            .unwrap_or(0);

        for index in 0..step_count {
            if cancel.is_requested() {
                return RunOutcome::Aborted { at_step: index };
            }
            let Some(ticket) = self.begin_step(index) else {
                return RunOutcome::Aborted { at_step: index };
            };

            tokio::select! {
                biased;
                _ = cancel.notify.notified() => {
                    self.set_step(index, StepStatus::Pending, None);
                    return RunOutcome::Aborted { at_step: index };
                }
                _ = self.ctx.sleep(ticket.duration) => {}
            }
            // A stop that lands as the timer elapses still wins over the step
            if cancel.is_requested() {
                self.set_step(index, StepStatus::Pending, None);
                return RunOutcome::Aborted { at_step: index };
            }

            match self.resolve(&ticket.step_id, ticket.action) {
                Ok(result) => {
                    self.set_step(index, StepStatus::Completed, Some(result.clone()));
                    debug!(step_id = %ticket.step_id, index, "scenario step completed");
                    self.bus.publish(EngineEvent::ScenarioStepCompleted {
                        run_id: ticket.run_id,
                        scenario_id: ticket.scenario_id,
                        step_index: index,
                        step_id: ticket.step_id,
                        result,
                    });
                }
                Err(e) => {
                    self.set_step(index, StepStatus::Failed, None);
                    warn!(step_id = %e.step_id, reason = %e.reason, "scenario step failed");
                    return RunOutcome::Failed {
                        step_id: e.step_id,
                        reason: e.reason,
                    };
                }
            }
        }
        RunOutcome::Completed
    }

    fn begin_step(&self, index: usize) -> Option<StepTicket> {
        let mut state = sync::write(&self.state);
        let run = state.run.as_mut()?;
        run.current_step_index = index;
        let scenario_id = run.scenario.id.clone();
        let step = run.scenario.steps.get_mut(index)?;
        step.status = StepStatus::Running;
        debug!(step_id = %step.id, index, "scenario step running");
        Some(StepTicket {
            run_id: run.run_id,
            scenario_id,
            step_id: step.id.clone(),
            duration: Duration::from_millis(step.simulated_duration_ms),
            action: step.action.clone(),
        })
    }

    fn set_step(&self, index: usize, status: StepStatus, result: Option<serde_json::Value>) {
        let mut state = sync::write(&self.state);
        if let Some(step) = state
            .run
            .as_mut()
            .and_then(|run| run.scenario.steps.get_mut(index))
        {
            step.status = status;
            step.result = result;
        }
    }

    fn resolve(
        &self,
        step_id: &str,
        action: StepAction,
    ) -> Result<serde_json::Value, StepExecutionError> {
        match action {
            StepAction::Compute(resolver) => catch_unwind(AssertUnwindSafe(|| resolver(step_id)))
                .unwrap_or_else(|_| Err(StepExecutionError::new(step_id, "step resolver panicked"))),
            StepAction::Decision { agent_id, draft } => {
                let recorder = sync::read(&self.recorder)
                    .clone()
                    .ok_or_else(|| StepExecutionError::new(step_id, "no decision recorder attached"))?;
                let decision = recorder
                    .record_decision(&agent_id, draft)
                    .map_err(|e| StepExecutionError::new(step_id, e.to_string()))?;
                serde_json::to_value(&decision)
                    .map_err(|e| StepExecutionError::new(step_id, e.to_string()))
            }
        }
    }

    fn finish(&self, run_id: RunId, outcome: RunOutcome) {
        let phase = outcome.phase();
        let scenario_id = {
            let mut state = sync::write(&self.state);
            state.phase = phase;
            state
                .run
                .as_ref()
                .filter(|run| run.run_id == run_id)
                .map(|run| run.scenario.id.clone())
                .unwrap_or_default()
        };

        match &outcome {
            RunOutcome::Completed => info!(%scenario_id, %run_id, "scenario completed"),
            RunOutcome::Aborted { at_step } => {
                info!(%scenario_id, %run_id, at_step, "scenario aborted")
            }
            RunOutcome::Failed { step_id, reason } => {
                warn!(%scenario_id, %run_id, %step_id, %reason, "scenario failed")
            }
        }

        self.bus.publish(EngineEvent::ScenarioCompleted {
            run_id,
            scenario_id,
            outcome,
        });

        // A handler may already have started the next run; its Running
        // phase must not be overwritten by this run's terminal one.
        let state = sync::read(&self.state);
        if state.run.as_ref().is_some_and(|run| run.run_id == run_id) {
            self.phase_tx.send_replace(phase);
        }
    }
}
