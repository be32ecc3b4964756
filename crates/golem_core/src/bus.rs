//! Action dispatch/observe bus.
//!
//! Requests and lifecycle signals travel on one broadcast stream. Every
//! request records who issued it so the idle scheduler can tell its own
//! follow-up commands apart from external interruptions.

use tokio::sync::broadcast;

use crate::action::{ActionId, ActionPayload};
use crate::error::GolemError;

/// Who issued an action request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The idle scheduler itself.
    Autonomous,
    /// A user, script, or any other driver of the character.
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action_id: ActionId,
    pub payload: ActionPayload,
    pub origin: Origin,
}

impl ActionRequest {
    pub fn autonomous(action_id: ActionId, payload: ActionPayload) -> Self {
        Self {
            action_id,
            payload,
            origin: Origin::Autonomous,
        }
    }

    pub fn external(action_id: ActionId, payload: ActionPayload) -> Self {
        Self {
            action_id,
            payload,
            origin: Origin::External,
        }
    }
}

/// Completion or failure report for a previously requested action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionLifecycle {
    pub source_action: ActionId,
    pub action_name: String,
    pub succeeded: bool,
    pub error: Option<String>,
}

impl ActionLifecycle {
    pub fn completed(source_action: ActionId) -> Self {
        Self {
            source_action,
            action_name: source_action.as_str().to_string(),
            succeeded: true,
            error: None,
        }
    }

    pub fn failed(source_action: ActionId, error: impl Into<String>) -> Self {
        Self {
            source_action,
            action_name: source_action.as_str().to_string(),
            succeeded: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BusEvent {
    Requested(ActionRequest),
    Completed(ActionLifecycle),
    Failed(ActionLifecycle),
}

pub trait ActionBus: Send + Sync {
    fn publish(&self, event: BusEvent) -> Result<(), GolemError>;

    fn subscribe(&self) -> broadcast::Receiver<BusEvent>;

    fn request(&self, request: ActionRequest) -> Result<(), GolemError> {
        self.publish(BusEvent::Requested(request))
    }
}

/// Broadcast-channel bus for a single process.
#[derive(Debug, Clone)]
pub struct InProcessBus {
    tx: broadcast::Sender<BusEvent>,
}

impl InProcessBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ActionBus for InProcessBus {
    fn publish(&self, event: BusEvent) -> Result<(), GolemError> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| GolemError::BusClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }
}
