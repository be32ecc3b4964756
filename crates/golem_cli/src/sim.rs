//! A small simulated café for driving the scheduler without a game engine.
//!
//! `SimWorld` is both the agent's body and the world it perceives. The bus
//! responder plays the role of the animation layer: it moves the body into
//! the state an action implies, then completes or fails the action.

use golem_core::{
    ActionBus, ActionId, ActionLifecycle, ActionPayload, ActionRequest, AgentBody, BusEvent,
    EntityRef, FsmState, InProcessBus, Position, WorldQuery,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

const FAILURE_REASONS: [&str; 4] = [
    "path blocked",
    "target out of reach",
    "animation interrupted",
    "object in use",
];

pub struct SimWorld {
    state_tx: watch::Sender<FsmState>,
    position: Mutex<Position>,
    props: Vec<EntityRef>,
}

impl SimWorld {
    pub fn new(props: Vec<EntityRef>) -> Self {
        let (state_tx, _) = watch::channel(FsmState::Idle);
        Self {
            state_tx,
            position: Mutex::new(Position::default()),
            props,
        }
    }

    /// Chairs, games and a menu board within a few metres of the origin.
    pub fn cafe() -> Self {
        Self::new(vec![
            EntityRef::new("chair_01", "Caffee Chair", Position::new(2.0, 0.0, 1.0)),
            EntityRef::new("chair_02", "Caffee Chair", Position::new(3.0, 0.0, 1.0)),
            EntityRef::new("chair_03", "Caffee Chair", Position::new(-2.0, 0.0, 4.0)),
            EntityRef::new("arcade_01", "Arcade", Position::new(8.0, 0.0, -3.0)),
            EntityRef::new("claw_01", "Claw Machine", Position::new(9.0, 0.0, -1.0)),
            EntityRef::new("menu_board", "Cafe Ad Display", Position::new(0.0, 1.5, 6.0)),
            EntityRef::new("window_seat", "InterestPoint", Position::new(-12.0, 0.0, 0.0)),
        ])
    }

    pub fn set_state(&self, state: FsmState) {
        self.state_tx.send_replace(state);
    }

    fn set_position(&self, position: Position) {
        if let Ok(mut p) = self.position.lock() {
            *p = position;
        }
    }

    fn prop(&self, name: &str) -> Option<&EntityRef> {
        self.props.iter().find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Where performing `request` leaves the body.
    fn destination(&self, request: &ActionRequest) -> Option<Position> {
        match &request.payload {
            ActionPayload::MoveTo { destination } => Some(*destination),
            ActionPayload::SitAtChair { chair_number } => self
                .prop(&format!("chair_{:02}", chair_number))
                .map(|e| e.position),
            ActionPayload::Target { name } => self.prop(name).map(|e| e.position),
            _ => None,
        }
    }
}

impl AgentBody for SimWorld {
    fn state(&self) -> watch::Receiver<FsmState> {
        self.state_tx.subscribe()
    }

    fn position(&self) -> Position {
        self.position
            .lock()
            .map(|p| *p)
            .unwrap_or_default()
    }
}

impl WorldQuery for SimWorld {
    fn find_nearby(&self, center: Position, radius: f32, tags: &[String]) -> Vec<EntityRef> {
        self.props
            .iter()
            .filter(|e| tags.iter().any(|t| t == &e.tag))
            .filter(|e| e.position.distance(&center) <= radius)
            .cloned()
            .collect()
    }
}

fn busy_state(action_id: ActionId) -> FsmState {
    match action_id {
        ActionId::MoveToLocation => FsmState::Moving,
        ActionId::SitAtChair => FsmState::Sitting,
        ActionId::TurnTo | ActionId::LookAt => FsmState::Looking,
        ActionId::PlayArcade | ActionId::PlayClaw => FsmState::Playing,
        ActionId::StandUp => FsmState::Idle,
        ActionId::Idle
        | ActionId::Lean
        | ActionId::ExamineMenu
        | ActionId::Wave
        | ActionId::Reflection => FsmState::Interacting,
    }
}

#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Probability in [0, 1] that an action fails.
    pub failure_rate: f32,
    /// Simulated animation length before an action reports completion.
    pub action_time: Duration,
    pub seed: Option<u64>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.2,
            action_time: Duration::from_secs(2),
            seed: None,
        }
    }
}

/// Perform every requested action against `world` and report the outcome.
pub fn spawn_responder(
    world: Arc<SimWorld>,
    bus: Arc<InProcessBus>,
    config: ResponderConfig,
) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe();
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    tokio::spawn(async move {
        loop {
            let request = match events.recv().await {
                Ok(BusEvent::Requested(request)) => request,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("SimWorld: missed {} bus events", n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let action_id = request.action_id;
            if action_id == ActionId::StandUp {
                world.set_state(FsmState::Idle);
                continue;
            }

            world.set_state(busy_state(action_id));
            tokio::time::sleep(config.action_time).await;

            let event = if rng.gen::<f32>() < config.failure_rate {
                let reason = FAILURE_REASONS[rng.gen_range(0..FAILURE_REASONS.len())];
                tracing::debug!("SimWorld: {} failed ({})", action_id, reason);
                world.set_state(FsmState::Idle);
                BusEvent::Failed(ActionLifecycle::failed(action_id, reason))
            } else {
                if let Some(position) = world.destination(&request) {
                    world.set_position(position);
                }
                // sitting persists until the scheduler stands the agent up
                if action_id != ActionId::SitAtChair {
                    world.set_state(FsmState::Idle);
                }
                BusEvent::Completed(ActionLifecycle::completed(action_id))
            };

            if bus.publish(event).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_find_nearby_filters_by_tag_and_radius() {
        let world = SimWorld::cafe();
        let near = world.find_nearby(Position::default(), 5.0, &tags(&["Caffee Chair", "Arcade"]));
        let names: Vec<&str> = near.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["chair_01", "chair_02", "chair_03"]);

        let far = world.find_nearby(Position::default(), 15.0, &tags(&["Arcade"]));
        assert_eq!(far.len(), 1);
        assert!(world.find_nearby(Position::default(), 50.0, &[]).is_empty());
    }

    #[test]
    fn test_destination_resolves_chairs_and_targets() {
        let world = SimWorld::cafe();
        let sit = ActionRequest::autonomous(
            ActionId::SitAtChair,
            ActionPayload::SitAtChair { chair_number: 2 },
        );
        assert_eq!(world.destination(&sit), Some(Position::new(3.0, 0.0, 1.0)));

        let play = ActionRequest::autonomous(
            ActionId::PlayClaw,
            ActionPayload::Target {
                name: "CLAW_01".to_string(),
            },
        );
        assert_eq!(world.destination(&play), Some(Position::new(9.0, 0.0, -1.0)));

        let wave = ActionRequest::autonomous(ActionId::Wave, ActionPayload::None);
        assert_eq!(world.destination(&wave), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_completes_and_moves() {
        let world = Arc::new(SimWorld::cafe());
        let bus = Arc::new(InProcessBus::default());
        let mut events = bus.subscribe();
        spawn_responder(
            world.clone(),
            bus.clone(),
            ResponderConfig {
                failure_rate: 0.0,
                ..ResponderConfig::default()
            },
        );

        let destination = Position::new(1.0, 0.0, 2.0);
        bus.request(ActionRequest::autonomous(
            ActionId::MoveToLocation,
            ActionPayload::MoveTo { destination },
        ))
        .unwrap();

        loop {
            if let BusEvent::Completed(l) = events.recv().await.unwrap() {
                assert_eq!(l.source_action, ActionId::MoveToLocation);
                assert!(l.succeeded);
                break;
            }
        }
        assert_eq!(world.position(), destination);
        assert_eq!(world.current_state(), FsmState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_responder_fails_and_sitting_persists() {
        let world = Arc::new(SimWorld::cafe());
        let bus = Arc::new(InProcessBus::default());
        let mut events = bus.subscribe();
        spawn_responder(
            world.clone(),
            bus.clone(),
            ResponderConfig {
                failure_rate: 1.0,
                seed: Some(1),
                ..ResponderConfig::default()
            },
        );

        bus.request(ActionRequest::autonomous(ActionId::Wave, ActionPayload::None))
            .unwrap();
        loop {
            if let BusEvent::Failed(l) = events.recv().await.unwrap() {
                assert!(l.error.is_some());
                break;
            }
        }
        assert_eq!(world.current_state(), FsmState::Idle);

        world.set_state(FsmState::Sitting);
        bus.request(ActionRequest::autonomous(ActionId::StandUp, ActionPayload::None))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(world.current_state(), FsmState::Idle);
    }
}
