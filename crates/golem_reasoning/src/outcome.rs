//! Outcome Tracker: correlates one dispatched action with its completion or
//! failure and writes the result into memory.
//!
//! Single slot: at most one action is pending. The scheduler never begins a
//! second action while one is pending; if it does anyway, the displaced
//! action is handed back and a warning is logged.

use golem_core::{ActionId, ActionLifecycle, AutonomousAction, BusEvent, ContextHash, Position};
use golem_memory::{now_millis, Episode, SharedMemory};
use tokio::sync::broadcast;

use crate::decision::Decision;

/// Identity and decision metadata of the action being tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action_id: ActionId,
    pub action_name: String,
    pub target: Option<String>,
    pub thought: String,
    pub reasoning: String,
    pub context_hash: ContextHash,
    pub position: Position,
    /// Unix milliseconds at dispatch.
    pub started_at: i64,
}

impl PendingAction {
    pub fn new(
        action: &AutonomousAction,
        decision: Option<&Decision>,
        context_hash: ContextHash,
        position: Position,
    ) -> Self {
        Self {
            action_id: action.action_id,
            action_name: action.action_id.as_str().to_string(),
            target: decision.and_then(|d| d.target.clone()),
            thought: decision.map(|d| d.thought.clone()).unwrap_or_default(),
            reasoning: decision.map(|d| d.reasoning.clone()).unwrap_or_default(),
            context_hash,
            position,
            started_at: now_millis(),
        }
    }

    fn into_episode(self, succeeded: bool) -> Episode {
        Episode {
            timestamp: self.started_at,
            action_id: self.action_id,
            action_name: self.action_name,
            target: self.target,
            thought: self.thought,
            reasoning: self.reasoning,
            // scored by EpisodicMemory
            importance: 0.0,
            succeeded,
            position: self.position,
            context_hash: self.context_hash,
        }
    }
}

/// One recorded outcome, as broadcast to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub action_id: ActionId,
    pub action_name: String,
    pub target: Option<String>,
    pub succeeded: bool,
    pub importance: f32,
    pub error: Option<String>,
    pub context_hash: ContextHash,
}

pub struct OutcomeTracker {
    memory: SharedMemory,
    pending: Option<PendingAction>,
    outcome_tx: broadcast::Sender<OutcomeRecord>,
}

impl OutcomeTracker {
    pub fn new(memory: SharedMemory) -> Self {
        let (outcome_tx, _) = broadcast::channel(64);
        Self {
            memory,
            pending: None,
            outcome_tx,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Every recorded outcome, in order.
    pub fn subscribe_outcomes(&self) -> broadcast::Receiver<OutcomeRecord> {
        self.outcome_tx.subscribe()
    }

    /// Start tracking `action`. Returns the displaced pending action, if any.
    pub fn begin_tracking(&mut self, action: PendingAction) -> Option<PendingAction> {
        tracing::debug!("OutcomeTracker: tracking {}", action.action_name);
        let displaced = self.pending.replace(action);
        if let Some(old) = &displaced {
            tracing::warn!(
                "OutcomeTracker: began tracking while {} was still pending; it will not be recorded",
                old.action_name
            );
        }
        displaced
    }

    /// Drop the pending action without recording anything.
    pub fn cancel(&mut self) -> Option<PendingAction> {
        let cancelled = self.pending.take();
        if let Some(p) = &cancelled {
            tracing::debug!("OutcomeTracker: cancelled {}", p.action_name);
        }
        cancelled
    }

    /// Complete from a bus lifecycle event. Events for any other action, and
    /// events arriving with nothing pending, are ignored.
    pub async fn handle_event(&mut self, event: &BusEvent) -> Option<OutcomeRecord> {
        let (lifecycle, succeeded) = match event {
            BusEvent::Completed(l) => (l, l.succeeded),
            BusEvent::Failed(l) => (l, false),
            BusEvent::Requested(_) => return None,
        };
        if !self.matches(lifecycle) {
            return None;
        }
        self.record(succeeded, lifecycle.error.clone()).await
    }

    fn matches(&self, lifecycle: &ActionLifecycle) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| p.action_id == lifecycle.source_action)
    }

    /// Complete directly, e.g. when the expected duration elapsed.
    pub async fn complete_tracking(&mut self, succeeded: bool) -> Option<OutcomeRecord> {
        self.record(succeeded, None).await
    }

    async fn record(&mut self, succeeded: bool, error: Option<String>) -> Option<OutcomeRecord> {
        let pending = self.pending.take()?;
        let action_id = pending.action_id;
        let action_name = pending.action_name.clone();
        let target = pending.target.clone();
        let context_hash = pending.context_hash.clone();

        let importance = {
            let mut store = self.memory.lock().await;
            store.record_outcome(pending.into_episode(succeeded))
        };

        tracing::info!(
            "OutcomeTracker: recorded {} → {} (importance={:.2})",
            action_name,
            if succeeded { "SUCCESS" } else { "FAIL" },
            importance
        );

        let record = OutcomeRecord {
            action_id,
            action_name,
            target,
            succeeded,
            importance,
            error,
            context_hash,
        };
        // no subscribers is fine
        let _ = self.outcome_tx.send(record.clone());
        Some(record)
    }
}
