//! Capabilities the cognition loop needs from the host world.

use tokio::sync::watch;

use crate::action::{FsmState, Position};

/// Something in the world the agent can notice.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub name: String,
    pub tag: String,
    pub position: Position,
}

impl EntityRef {
    pub fn new(name: impl Into<String>, tag: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            tag: tag.into(),
            position,
        }
    }
}

/// Tag-based proximity scan.
pub trait WorldQuery: Send + Sync {
    /// Entities carrying one of `tags` within `radius` of `center`.
    fn find_nearby(&self, center: Position, radius: f32, tags: &[String]) -> Vec<EntityRef>;
}

/// The agent's physical presence: behaviour state and location.
pub trait AgentBody: Send + Sync {
    /// Live view of the behaviour state machine.
    fn state(&self) -> watch::Receiver<FsmState>;

    fn position(&self) -> Position;

    fn current_state(&self) -> FsmState {
        *self.state().borrow()
    }
}
