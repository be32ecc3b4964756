//! Idle Scheduler: the autonomous decision loop.
//!
//! Waits for the agent to stay idle for a randomized delay, then picks an
//! action (trusted skill → decision service → weighted-random fallback),
//! dispatches it on the action bus, and waits for its outcome. A failed
//! outcome earns exactly one retry with the failure described to the
//! decision service. Reflection is checked after every recorded outcome.

use golem_core::{
    clamp_secs, duration_from_secs, ActionBus, ActionId, ActionPayload, ActionRequest, AgentBody,
    AutonomousAction, BusEvent, ContextHasher, ContextSnapshot, FsmState, GolemConfig, Origin,
    WorldQuery,
};
use golem_memory::{ReflectionEngine, ReflectionReport, SharedMemory};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};

use crate::decision::{validate_decision, Decision, DecisionRejected, DecisionRequest, DecisionService};
use crate::fallback::{action_from_decision, FallbackPicker};
use crate::outcome::{OutcomeRecord, OutcomeTracker, PendingAction};

/// Idle delays never go below this, whatever the config says.
const MIN_IDLE_DELAY_SECS: f32 = 3.0;

// ============================================================================
// Observable state
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    WaitingIdle,
    BuildingContext,
    SkillHit,
    QueryingDecision,
    Dispatching,
    AwaitingOutcome,
    RetryPending,
    Reflecting,
    Stopped,
}

/// Where the dispatched action came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Skill,
    Decision,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Recorded(OutcomeRecord),
    /// An external command took over; nothing was recorded.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub action: AutonomousAction,
    pub source: DecisionSource,
    pub outcome: ActionOutcome,
}

impl CycleOutcome {
    pub fn failed(&self) -> bool {
        matches!(&self.outcome, ActionOutcome::Recorded(r) if !r.succeeded)
    }
}

/// Everything that happened in one trigger of the loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// `None` when the agent left Idle before dispatch or the bus refused it.
    pub first: Option<CycleOutcome>,
    pub retry: Option<CycleOutcome>,
    pub reflections: Vec<ReflectionReport>,
}

enum Attempt {
    Done(CycleOutcome),
    Skipped,
    Shutdown,
}

enum RetryWait {
    Elapsed,
    /// An external command arrived; the retry is abandoned.
    Preempted(ActionId),
    Shutdown,
}

/// Build the failure narrative handed to the decision service on a retry.
pub fn retry_context_for(record: &OutcomeRecord) -> String {
    let target = record.target.as_deref().unwrap_or("nothing in particular");
    let reason = record
        .error
        .as_deref()
        .unwrap_or("it did not complete successfully");
    format!(
        "Your previous action {} targeting {} failed because {}. Choose a different action or target.",
        record.action_name, target, reason
    )
}

// ============================================================================
// IdleScheduler
// ============================================================================

pub struct IdleScheduler {
    config: GolemConfig,
    body: Arc<dyn AgentBody>,
    bus: Arc<dyn ActionBus>,
    hasher: ContextHasher,
    decider: Option<Arc<dyn DecisionService>>,
    memory: SharedMemory,
    tracker: OutcomeTracker,
    reflection: ReflectionEngine,
    fallback: FallbackPicker,
    rng: StdRng,
    recent_actions: VecDeque<String>,
    phase_tx: watch::Sender<SchedulerPhase>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl IdleScheduler {
    pub fn new(
        config: GolemConfig,
        body: Arc<dyn AgentBody>,
        world: Arc<dyn WorldQuery>,
        bus: Arc<dyn ActionBus>,
        memory: SharedMemory,
        decider: Option<Arc<dyn DecisionService>>,
    ) -> Self {
        let hasher = ContextHasher::new(
            world,
            config.decision.nearby_radius,
            config.decision.nearby_tags.clone(),
        );
        let (phase_tx, _) = watch::channel(SchedulerPhase::WaitingIdle);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            tracker: OutcomeTracker::new(memory.clone()),
            reflection: ReflectionEngine::new(config.memory.clone(), memory.clone()),
            fallback: FallbackPicker::new(config.scheduler.clone()),
            config,
            body,
            bus,
            hasher,
            decider,
            memory,
            rng: StdRng::from_entropy(),
            recent_actions: VecDeque::new(),
            phase_tx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Deterministic randomness for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn phase(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase_tx.subscribe()
    }

    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<OutcomeRecord> {
        self.tracker.subscribe_outcomes()
    }

    /// Sending `true` stops the loop at its next suspension point.
    pub fn shutdown_signal(&self) -> watch::Sender<bool> {
        self.shutdown_tx.clone()
    }

    fn set_phase(&self, phase: SchedulerPhase) {
        self.phase_tx.send_replace(phase);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    /// Spawn the loop. It runs until shutdown, then flushes memory.
    pub fn spawn(self) -> SchedulerHandle {
        let shutdown_tx = self.shutdown_signal();
        let phase_rx = self.phase();
        let join = tokio::spawn(self.run());
        SchedulerHandle {
            shutdown_tx,
            phase_rx,
            join,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("IdleScheduler: started");
        while let Some(report) = self.run_once().await {
            tracing::debug!(
                "IdleScheduler: cycle done (dispatched={}, retried={}, reflections={})",
                report.first.is_some(),
                report.retry.is_some(),
                report.reflections.len()
            );
        }
        self.tracker.cancel();
        self.memory.lock().await.flush();
        self.set_phase(SchedulerPhase::Stopped);
        tracing::info!("IdleScheduler: stopped");
    }

    /// Wait for an idle trigger and run one full cycle. `None` on shutdown.
    pub async fn run_once(&mut self) -> Option<CycleReport> {
        if !self.wait_for_idle().await {
            return None;
        }
        let report = self.run_cycle().await;
        if self.is_shutdown() {
            return None;
        }
        self.settle().await;
        Some(report)
    }

    // ========================================================================
    // Idle trigger
    // ========================================================================

    fn idle_delay(&mut self) -> Duration {
        let cfg = &self.config.scheduler;
        let variance = clamp_secs(cfg.idle_delay_variance_secs.abs());
        let jitter = if variance > 0.0 {
            self.rng.gen_range(-variance..=variance)
        } else {
            0.0
        };
        duration_from_secs((clamp_secs(cfg.idle_delay_secs) + jitter).max(MIN_IDLE_DELAY_SECS))
    }

    /// `true` once the agent has been continuously Idle for the randomized
    /// delay; `false` on shutdown.
    async fn wait_for_idle(&mut self) -> bool {
        let mut shutdown = self.shutdown_rx.clone();
        let mut state = self.body.state();
        loop {
            if self.is_shutdown() {
                return false;
            }
            self.set_phase(SchedulerPhase::WaitingIdle);

            loop {
                let current = *state.borrow_and_update();
                if current == FsmState::Idle {
                    break;
                }
                tokio::select! {
                    changed = state.changed() => {
                        if changed.is_err() {
                            tracing::warn!("IdleScheduler: agent state channel closed");
                            return false;
                        }
                    }
                    _ = shutdown.changed() => return false,
                }
            }

            let delay = self.idle_delay();
            tracing::debug!("IdleScheduler: idle, waiting {:.1}s", delay.as_secs_f32());
            let sleep = tokio::time::sleep(delay);
            tokio::pin!(sleep);

            let left_idle = loop {
                tokio::select! {
                    _ = &mut sleep => break false,
                    changed = state.changed() => {
                        if changed.is_err() {
                            return false;
                        }
                        if *state.borrow_and_update() != FsmState::Idle {
                            break true;
                        }
                    }
                    _ = shutdown.changed() => return false,
                }
            };
            if !left_idle {
                return true;
            }
            tracing::debug!("IdleScheduler: agent left Idle during wait, restarting");
        }
    }

    // ========================================================================
    // Cycle
    // ========================================================================

    async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        // one subscription for the whole cycle, so a command that lands
        // between the first outcome and the retry is still seen
        let mut events = self.bus.subscribe();

        let first = match self.attempt(None, &mut events).await {
            Attempt::Done(outcome) => outcome,
            Attempt::Skipped | Attempt::Shutdown => return report,
        };
        if let Some(r) = self.after_outcome(&first).await {
            report.reflections.push(r);
        }

        let retry_context = match &first.outcome {
            ActionOutcome::Recorded(record)
                if !record.succeeded && self.config.memory.enable_failure_retry =>
            {
                Some(retry_context_for(record))
            }
            _ => None,
        };
        report.first = Some(first);

        let Some(context) = retry_context else {
            return report;
        };

        self.set_phase(SchedulerPhase::RetryPending);
        tracing::info!("IdleScheduler: retrying after failure");
        match self
            .wait_for_retry(self.config.scheduler.retry_delay(), &mut events)
            .await
        {
            RetryWait::Elapsed => {}
            RetryWait::Preempted(action_id) => {
                tracing::warn!(
                    "IdleScheduler: external {} arrived, dropping retry",
                    action_id
                );
                return report;
            }
            RetryWait::Shutdown => return report,
        }

        if let Attempt::Done(retry) = self.attempt(Some(context), &mut events).await {
            if retry.failed() {
                tracing::info!("IdleScheduler: retry failed too, not retrying again");
            }
            if let Some(r) = self.after_outcome(&retry).await {
                report.reflections.push(r);
            }
            report.retry = Some(retry);
        }
        report
    }

    /// Feed a recorded outcome to reflection, reflecting when due.
    async fn after_outcome(&mut self, outcome: &CycleOutcome) -> Option<ReflectionReport> {
        let ActionOutcome::Recorded(record) = &outcome.outcome else {
            return None;
        };
        self.reflection.track_action(record.importance);
        if !self.reflection.should_reflect() {
            return None;
        }
        self.set_phase(SchedulerPhase::Reflecting);
        self.reflection.execute_reflection().await
    }

    /// Decide, dispatch, and wait for one action.
    async fn attempt(
        &mut self,
        failure_context: Option<String>,
        events: &mut broadcast::Receiver<BusEvent>,
    ) -> Attempt {
        if self.is_shutdown() {
            return Attempt::Shutdown;
        }
        self.set_phase(SchedulerPhase::BuildingContext);
        let snapshot = self
            .hasher
            .snapshot(self.body.current_state(), self.body.position());

        let is_retry = failure_context.is_some();
        let (action, decision, source) = self.choose_action(&snapshot, failure_context).await;
        if self.is_shutdown() {
            return Attempt::Shutdown;
        }

        // the world may have moved on while we were deciding
        if let Some(external) = drain_external(events) {
            if is_retry {
                tracing::warn!(
                    "IdleScheduler: external {} arrived, dropping retry {}",
                    external,
                    action.action_id
                );
            } else {
                tracing::debug!(
                    "IdleScheduler: external {} arrived, dropping {}",
                    external,
                    action.action_id
                );
            }
            return Attempt::Skipped;
        }
        if self.body.current_state() != FsmState::Idle {
            tracing::debug!("IdleScheduler: agent no longer Idle, dropping {}", action.action_id);
            return Attempt::Skipped;
        }

        self.set_phase(SchedulerPhase::Dispatching);
        let request = ActionRequest::autonomous(action.action_id, action.payload.clone());
        if let Err(e) = self.bus.request(request) {
            tracing::warn!("IdleScheduler: could not dispatch {}: {}", action.action_id, e);
            return Attempt::Skipped;
        }
        tracing::info!("IdleScheduler: starting {} ({:?})", action.description, source);
        self.remember_recent(action.action_id);

        self.tracker.begin_tracking(PendingAction::new(
            &action,
            decision.as_ref(),
            snapshot.hash.clone(),
            snapshot.position,
        ));

        self.set_phase(SchedulerPhase::AwaitingOutcome);
        let outcome = match self.await_outcome(&action, events).await {
            Some(outcome) => outcome,
            None => return Attempt::Shutdown,
        };

        if matches!(outcome, ActionOutcome::Recorded(_)) {
            self.stand_up_if_sitting();
        }

        Attempt::Done(CycleOutcome {
            action,
            source,
            outcome,
        })
    }

    /// `None` on shutdown.
    async fn await_outcome(
        &mut self,
        action: &AutonomousAction,
        events: &mut broadcast::Receiver<BusEvent>,
    ) -> Option<ActionOutcome> {
        let mut shutdown = self.shutdown_rx.clone();
        let deadline = tokio::time::sleep(action.expected_duration);
        tokio::pin!(deadline);
        let mut bus_open = true;

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    let record = self.tracker.complete_tracking(true).await?;
                    return Some(ActionOutcome::Recorded(record));
                }
                event = events.recv(), if bus_open => match event {
                    Ok(BusEvent::Requested(req)) if req.origin == Origin::External => {
                        tracing::info!(
                            "IdleScheduler: external {} interrupts {}",
                            req.action_id,
                            action.action_id
                        );
                        self.tracker.cancel();
                        return Some(ActionOutcome::Interrupted);
                    }
                    Ok(event) => {
                        if let Some(record) = self.tracker.handle_event(&event).await {
                            return Some(ActionOutcome::Recorded(record));
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("IdleScheduler: missed {} bus events", n);
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("IdleScheduler: bus closed, waiting out {}", action.action_id);
                        bus_open = false;
                    }
                },
                _ = shutdown.changed() => {
                    self.tracker.cancel();
                    return None;
                }
            }
        }
    }

    fn stand_up_if_sitting(&self) {
        if self.body.current_state() != FsmState::Sitting {
            return;
        }
        let request = ActionRequest::autonomous(ActionId::StandUp, ActionPayload::None);
        if let Err(e) = self.bus.request(request) {
            tracing::warn!("IdleScheduler: could not stand up: {}", e);
        }
    }

    fn remember_recent(&mut self, action_id: ActionId) {
        let cap = self.config.decision.recent_actions;
        self.recent_actions.push_back(action_id.as_str().to_string());
        while self.recent_actions.len() > cap {
            self.recent_actions.pop_front();
        }
    }

    async fn settle(&self) {
        self.pause(self.config.scheduler.settle_delay()).await;
    }

    /// Sleep unless shut down first. `false` on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown_rx.clone();
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = shutdown.changed() => false,
        }
    }

    /// Pause before a retry while watching the bus for external commands.
    async fn wait_for_retry(
        &self,
        duration: Duration,
        events: &mut broadcast::Receiver<BusEvent>,
    ) -> RetryWait {
        if self.is_shutdown() {
            return RetryWait::Shutdown;
        }
        if let Some(external) = drain_external(events) {
            return RetryWait::Preempted(external);
        }
        let mut shutdown = self.shutdown_rx.clone();
        let sleep = tokio::time::sleep(duration);
        tokio::pin!(sleep);
        let mut bus_open = true;

        loop {
            tokio::select! {
                _ = &mut sleep => return RetryWait::Elapsed,
                event = events.recv(), if bus_open => match event {
                    Ok(BusEvent::Requested(req)) if req.origin == Origin::External => {
                        return RetryWait::Preempted(req.action_id);
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => bus_open = false,
                },
                _ = shutdown.changed() => return RetryWait::Shutdown,
            }
        }
    }

    // ========================================================================
    // Decision pipeline
    // ========================================================================

    async fn choose_action(
        &mut self,
        snapshot: &ContextSnapshot,
        failure_context: Option<String>,
    ) -> (AutonomousAction, Option<Decision>, DecisionSource) {
        // a retry never reuses the skill that may have just failed
        if failure_context.is_none() {
            if let Some(decision) = self.trusted_skill(snapshot).await {
                self.set_phase(SchedulerPhase::SkillHit);
                tracing::info!(
                    "IdleScheduler: using skill {} for {}",
                    decision.action_name,
                    snapshot.hash
                );
                let action = self.action_for(&decision, snapshot);
                return (action, Some(decision), DecisionSource::Skill);
            }
        }

        match self.query_decision(snapshot, failure_context).await {
            Ok(decision) => {
                tracing::info!(
                    "IdleScheduler: decided {} (confidence={:.2}): {}",
                    decision.action_name,
                    decision.confidence,
                    decision.thought
                );
                let action = self.action_for(&decision, snapshot);
                (action, Some(decision), DecisionSource::Decision)
            }
            Err(rejected) => {
                if self.decider.is_some() && self.config.decision.enabled && !self.is_shutdown() {
                    tracing::warn!("IdleScheduler: {}; using fallback", rejected);
                }
                let action = self.fallback.pick(snapshot.position, &mut self.rng);
                (action, None, DecisionSource::Fallback)
            }
        }
    }

    async fn trusted_skill(&mut self, snapshot: &ContextSnapshot) -> Option<Decision> {
        let memory = self.memory.clone();
        let store = memory.lock().await;
        let skill = store.skills().match_context(&snapshot.hash)?;
        if !store.skills().should_use_skill(Some(skill), &mut self.rng) {
            return None;
        }
        Some(Decision {
            action_id: skill.recommended_action,
            action_name: skill.action_name.clone(),
            target: skill.target.clone(),
            thought: format!(
                "This worked here before ({}/{}).",
                skill.success_count, skill.use_count
            ),
            reasoning: format!("Cached skill for {}", snapshot.hash),
            confidence: skill.success_rate(),
        })
    }

    async fn query_decision(
        &mut self,
        snapshot: &ContextSnapshot,
        failure_context: Option<String>,
    ) -> Result<Decision, DecisionRejected> {
        let decider = match (&self.decider, self.config.decision.enabled) {
            (Some(d), true) => d.clone(),
            _ => return Err(DecisionRejected::Unavailable("decision service disabled".into())),
        };
        self.set_phase(SchedulerPhase::QueryingDecision);

        let retrieved_memories = self
            .memory
            .lock()
            .await
            .episodic()
            .retrieve_top_k(&snapshot.hash, None);

        let request = DecisionRequest {
            character_name: self.config.decision.character_name.clone(),
            personality: self.config.decision.personality.clone(),
            fsm_state: snapshot.fsm_state,
            position: snapshot.position,
            nearby: snapshot.nearby_labels(),
            recent_actions: self.recent_actions.iter().cloned().collect(),
            retrieved_memories,
            failure_context,
        };

        tracing::debug!(
            "IdleScheduler: querying {} with {} memories",
            decider.name(),
            request.retrieved_memories.len()
        );
        let timeout = self.config.decision.timeout();
        let mut shutdown = self.shutdown_rx.clone();
        let decided = tokio::select! {
            decided = tokio::time::timeout(timeout, decider.decide(&request)) => decided,
            _ = shutdown.changed() => {
                return Err(DecisionRejected::Unavailable("shutting down".into()));
            }
        };
        let raw = match decided {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(DecisionRejected::Unavailable(format!("{:#}", e))),
            Err(_) => {
                return Err(DecisionRejected::Unavailable(format!(
                    "timed out after {:.1}s",
                    timeout.as_secs_f32()
                )))
            }
        };
        validate_decision(raw, self.config.decision.min_confidence)
    }

    fn action_for(&mut self, decision: &Decision, snapshot: &ContextSnapshot) -> AutonomousAction {
        action_from_decision(
            decision,
            &self.config.scheduler,
            snapshot.position,
            &snapshot.nearby,
            &mut self.rng,
        )
    }
}

/// Empty the receiver, returning the last external command seen.
fn drain_external(events: &mut broadcast::Receiver<BusEvent>) -> Option<ActionId> {
    let mut external = None;
    loop {
        match events.try_recv() {
            Ok(BusEvent::Requested(req)) if req.origin == Origin::External => {
                external = Some(req.action_id);
            }
            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return external,
        }
    }
}

// ============================================================================
// SchedulerHandle
// ============================================================================

/// Owner's handle on a spawned scheduler.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    phase_rx: watch::Receiver<SchedulerPhase>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn phase(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase_rx.clone()
    }

    /// Stop the loop and wait for it to flush memory.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.shutdown_tx.send_replace(true);
        self.join.await?;
        Ok(())
    }
}
