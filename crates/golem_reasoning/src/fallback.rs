//! Weighted-random fallback and decision → action mapping.
//!
//! The category pick is a pure function of the weights and a roll so it can
//! be tested exactly; building the concrete action draws the remaining
//! randomness (destination, chair, duration) from the caller's rng.

use golem_core::{
    clamp_secs, duration_from_secs, ActionId, ActionPayload, AutonomousAction, EntityRef,
    FallbackWeights, Position, SchedulerConfig,
};
use rand::Rng;
use std::time::Duration;

use crate::decision::Decision;

/// Distance of the gaze point used by look-around.
const LOOK_DISTANCE: f32 = 5.0;
const CHAIR_COUNT: u32 = 4;
const GESTURE_IDLE_TYPE: &str = "standing";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackCategory {
    Wander,
    LookAround,
    Sit,
    Gesture,
    PlayGame,
}

impl FallbackCategory {
    /// Fixed walk order for cumulative weights.
    pub const ORDER: [FallbackCategory; 5] = [
        FallbackCategory::Wander,
        FallbackCategory::LookAround,
        FallbackCategory::Sit,
        FallbackCategory::Gesture,
        FallbackCategory::PlayGame,
    ];

    fn weight(&self, weights: &FallbackWeights) -> f32 {
        match self {
            Self::Wander => weights.wander,
            Self::LookAround => weights.look_around,
            Self::Sit => weights.sit,
            Self::Gesture => weights.gesture,
            Self::PlayGame => weights.play_game,
        }
    }
}

/// Pick a category for `roll ∈ [0, total)`: the first whose cumulative weight
/// exceeds the roll. Non-positive totals always wander.
pub fn pick_category(weights: &FallbackWeights, roll: f32) -> FallbackCategory {
    if weights.total() <= 0.0 {
        return FallbackCategory::Wander;
    }
    let mut cumulative = 0.0;
    for category in FallbackCategory::ORDER {
        cumulative += category.weight(weights);
        if roll < cumulative {
            return category;
        }
    }
    FallbackCategory::Wander
}

fn secs(s: f32) -> Duration {
    duration_from_secs(s)
}

pub struct FallbackPicker {
    config: SchedulerConfig,
}

impl FallbackPicker {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn pick<R: Rng + ?Sized>(&self, origin: Position, rng: &mut R) -> AutonomousAction {
        let total = self.config.weights.total();
        let roll = if total > 0.0 { rng.gen::<f32>() * total } else { 0.0 };
        let category = pick_category(&self.config.weights, roll);
        tracing::debug!("FallbackPicker: roll {:.2}/{:.2} → {:?}", roll, total, category);
        self.build(category, origin, rng)
    }

    pub fn build<R: Rng + ?Sized>(
        &self,
        category: FallbackCategory,
        origin: Position,
        rng: &mut R,
    ) -> AutonomousAction {
        match category {
            FallbackCategory::Wander => AutonomousAction {
                action_id: ActionId::MoveToLocation,
                payload: ActionPayload::MoveTo {
                    destination: self.wander_destination(origin, rng),
                },
                expected_duration: secs(self.config.wander_duration_secs),
                description: "autonomous wander".to_string(),
            },
            FallbackCategory::LookAround => AutonomousAction {
                action_id: ActionId::TurnTo,
                payload: ActionPayload::Gaze {
                    position: look_point(origin, rng),
                },
                expected_duration: secs(self.config.look_duration_secs),
                description: "autonomous look around".to_string(),
            },
            FallbackCategory::Sit => AutonomousAction {
                action_id: ActionId::SitAtChair,
                payload: ActionPayload::SitAtChair {
                    chair_number: rng.gen_range(1..=CHAIR_COUNT),
                },
                expected_duration: self.sit_duration(rng),
                description: "autonomous sit".to_string(),
            },
            FallbackCategory::Gesture => AutonomousAction {
                action_id: ActionId::Idle,
                payload: ActionPayload::Idle {
                    idle_type: GESTURE_IDLE_TYPE.to_string(),
                },
                expected_duration: secs(self.config.gesture_duration_secs),
                description: "autonomous gesture".to_string(),
            },
            FallbackCategory::PlayGame => {
                let action_id = if rng.gen_bool(0.5) {
                    ActionId::PlayArcade
                } else {
                    ActionId::PlayClaw
                };
                AutonomousAction {
                    action_id,
                    payload: ActionPayload::None,
                    expected_duration: secs(self.config.play_duration_secs),
                    description: format!("autonomous play ({})", action_id),
                }
            }
        }
    }

    /// Uniform point in the planar disc of `wander_radius` around `origin`.
    fn wander_destination<R: Rng + ?Sized>(&self, origin: Position, rng: &mut R) -> Position {
        let radius = self.config.wander_radius;
        if !radius.is_finite() || radius <= 0.0 {
            return origin;
        }
        let angle = rng.gen_range(0.0..std::f32::consts::TAU);
        let dist = radius * rng.gen::<f32>().sqrt();
        origin.offset_planar(dist * angle.cos(), dist * angle.sin())
    }

    fn sit_duration<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let (min, max) = (
            clamp_secs(self.config.sit_duration_min_secs),
            clamp_secs(self.config.sit_duration_max_secs),
        );
        if max > min {
            secs(rng.gen_range(min..max))
        } else {
            secs(min)
        }
    }
}

fn look_point<R: Rng + ?Sized>(origin: Position, rng: &mut R) -> Position {
    let yaw = rng.gen_range(-180.0f32..180.0).to_radians();
    origin.offset_planar(LOOK_DISTANCE * yaw.sin(), LOOK_DISTANCE * yaw.cos())
}

/// Trailing digits of a target name, e.g. `chair_03` → 3.
fn chair_number(target: &str) -> Option<u32> {
    let digits: String = target
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok().filter(|n| *n > 0)
}

/// Turn a validated decision into a concrete action. Named targets resolve
/// against `nearby` first; unknown targets fall back to local randomness.
pub fn action_from_decision<R: Rng + ?Sized>(
    decision: &Decision,
    config: &SchedulerConfig,
    origin: Position,
    nearby: &[EntityRef],
    rng: &mut R,
) -> AutonomousAction {
    let picker = FallbackPicker::new(config.clone());
    let target_entity = decision
        .target
        .as_deref()
        .and_then(|t| nearby.iter().find(|e| e.name.eq_ignore_ascii_case(t)));
    let named = || match &decision.target {
        Some(name) => ActionPayload::Target { name: name.clone() },
        None => ActionPayload::None,
    };

    let (payload, expected_duration) = match decision.action_id {
        ActionId::MoveToLocation => {
            let destination = match target_entity {
                Some(e) => e.position,
                None => picker.wander_destination(origin, rng),
            };
            (
                ActionPayload::MoveTo { destination },
                secs(config.wander_duration_secs),
            )
        }
        ActionId::TurnTo | ActionId::LookAt => {
            let position = match target_entity {
                Some(e) => e.position,
                None => look_point(origin, rng),
            };
            (ActionPayload::Gaze { position }, secs(config.look_duration_secs))
        }
        ActionId::SitAtChair => {
            let chair = decision
                .target
                .as_deref()
                .and_then(chair_number)
                .unwrap_or_else(|| rng.gen_range(1..=CHAIR_COUNT));
            (
                ActionPayload::SitAtChair {
                    chair_number: chair,
                },
                picker.sit_duration(rng),
            )
        }
        ActionId::Idle => (
            ActionPayload::Idle {
                idle_type: GESTURE_IDLE_TYPE.to_string(),
            },
            secs(config.gesture_duration_secs),
        ),
        ActionId::PlayArcade | ActionId::PlayClaw => {
            (named(), secs(config.play_duration_secs))
        }
        ActionId::StandUp => (ActionPayload::None, secs(config.look_duration_secs)),
        ActionId::Lean | ActionId::ExamineMenu | ActionId::Wave | ActionId::Reflection => {
            (named(), secs(config.gesture_duration_secs))
        }
    };

    let description = if decision.thought.is_empty() {
        format!("decided {}", decision.action_id)
    } else {
        format!("decided {}: {}", decision.action_id, decision.thought)
    };

    AutonomousAction {
        action_id: decision.action_id,
        payload,
        expected_duration,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn percent_weights() -> FallbackWeights {
        FallbackWeights {
            wander: 40.0,
            look_around: 20.0,
            sit: 15.0,
            gesture: 15.0,
            play_game: 10.0,
        }
    }

    fn decision(action_id: ActionId, target: Option<&str>) -> Decision {
        Decision {
            action_id,
            action_name: action_id.as_str().to_string(),
            target: target.map(str::to_string),
            thought: String::new(),
            reasoning: String::new(),
            confidence: 0.9,
        }
    }

    #[test]
    fn test_roll_41_picks_look() {
        assert_eq!(pick_category(&percent_weights(), 41.0), FallbackCategory::LookAround);
    }

    #[test]
    fn test_category_boundaries() {
        let w = percent_weights();
        assert_eq!(pick_category(&w, 0.0), FallbackCategory::Wander);
        assert_eq!(pick_category(&w, 39.99), FallbackCategory::Wander);
        assert_eq!(pick_category(&w, 40.0), FallbackCategory::LookAround);
        assert_eq!(pick_category(&w, 60.0), FallbackCategory::Sit);
        assert_eq!(pick_category(&w, 75.0), FallbackCategory::Gesture);
        assert_eq!(pick_category(&w, 99.9), FallbackCategory::PlayGame);
    }

    #[test]
    fn test_zero_total_wanders() {
        let w = FallbackWeights {
            wander: 0.0,
            look_around: 0.0,
            sit: 0.0,
            gesture: 0.0,
            play_game: 0.0,
        };
        assert_eq!(pick_category(&w, 0.0), FallbackCategory::Wander);
    }

    #[test]
    fn test_zero_weight_category_never_chosen() {
        let w = FallbackWeights {
            wander: 0.0,
            ..percent_weights()
        };
        assert_eq!(pick_category(&w, 0.0), FallbackCategory::LookAround);
    }

    #[test]
    fn test_wander_stays_within_radius() {
        let picker = FallbackPicker::new(SchedulerConfig::default());
        let mut rng = StdRng::seed_from_u64(3);
        let origin = Position::new(10.0, 1.0, -4.0);
        for _ in 0..100 {
            let action = picker.build(FallbackCategory::Wander, origin, &mut rng);
            assert_eq!(action.action_id, ActionId::MoveToLocation);
            let ActionPayload::MoveTo { destination } = action.payload else {
                panic!("wander must carry a destination");
            };
            assert!(destination.distance(&origin) <= 5.0 + 1e-4);
            assert_eq!(destination.y, 1.0);
            assert_eq!(action.expected_duration, Duration::from_secs(8));
        }
    }

    #[test]
    fn test_sit_and_gesture_payloads() {
        let picker = FallbackPicker::new(SchedulerConfig::default());
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let sit = picker.build(FallbackCategory::Sit, Position::default(), &mut rng);
            let ActionPayload::SitAtChair { chair_number } = sit.payload else {
                panic!("sit must carry a chair number");
            };
            assert!((1..=4).contains(&chair_number));
            assert!(sit.expected_duration >= Duration::from_secs(10));
            assert!(sit.expected_duration <= Duration::from_secs(30));
        }
        let gesture = picker.build(FallbackCategory::Gesture, Position::default(), &mut rng);
        assert_eq!(gesture.action_id, ActionId::Idle);
        assert_eq!(
            gesture.payload,
            ActionPayload::Idle {
                idle_type: "standing".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_tunables_are_clamped() {
        let picker = FallbackPicker::new(SchedulerConfig {
            wander_radius: f32::INFINITY,
            wander_duration_secs: 1e30,
            sit_duration_max_secs: f32::INFINITY,
            look_duration_secs: f32::NAN,
            ..SchedulerConfig::default()
        });
        let mut rng = StdRng::seed_from_u64(9);
        let origin = Position::new(1.0, 0.0, 2.0);
        let day = Duration::from_secs(86_400);

        let wander = picker.build(FallbackCategory::Wander, origin, &mut rng);
        assert_eq!(wander.payload, ActionPayload::MoveTo { destination: origin });
        assert_eq!(wander.expected_duration, day);

        let sit = picker.build(FallbackCategory::Sit, origin, &mut rng);
        assert!(sit.expected_duration >= Duration::from_secs(10));
        assert!(sit.expected_duration <= day);

        let look = picker.build(FallbackCategory::LookAround, origin, &mut rng);
        assert_eq!(look.expected_duration, Duration::ZERO);
    }

    #[test]
    fn test_play_game_uses_both_machines() {
        let picker = FallbackPicker::new(SchedulerConfig::default());
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            seen.insert(
                picker
                    .build(FallbackCategory::PlayGame, Position::default(), &mut rng)
                    .action_id,
            );
        }
        assert_eq!(
            seen,
            std::collections::HashSet::from([ActionId::PlayArcade, ActionId::PlayClaw])
        );
    }

    #[test]
    fn test_decision_targets_nearby_entity() {
        let arcade = EntityRef::new("arcade_01", "Arcade", Position::new(3.0, 0.0, 4.0));
        let mut rng = StdRng::seed_from_u64(1);
        let action = action_from_decision(
            &decision(ActionId::MoveToLocation, Some("Arcade_01")),
            &SchedulerConfig::default(),
            Position::default(),
            &[arcade.clone()],
            &mut rng,
        );
        assert_eq!(
            action.payload,
            ActionPayload::MoveTo {
                destination: arcade.position
            }
        );

        let look = action_from_decision(
            &decision(ActionId::LookAt, Some("arcade_01")),
            &SchedulerConfig::default(),
            Position::default(),
            &[arcade.clone()],
            &mut rng,
        );
        assert_eq!(look.payload, ActionPayload::Gaze { position: arcade.position });
    }

    #[test]
    fn test_decision_chair_number_from_target() {
        let mut rng = StdRng::seed_from_u64(1);
        let action = action_from_decision(
            &decision(ActionId::SitAtChair, Some("chair_03")),
            &SchedulerConfig::default(),
            Position::default(),
            &[],
            &mut rng,
        );
        assert_eq!(action.payload, ActionPayload::SitAtChair { chair_number: 3 });
        assert_eq!(chair_number("chair"), None);
        assert_eq!(chair_number("chair_0"), None);
    }

    #[test]
    fn test_decision_named_gesture() {
        let mut rng = StdRng::seed_from_u64(1);
        let action = action_from_decision(
            &decision(ActionId::Wave, Some("visitor")),
            &SchedulerConfig::default(),
            Position::default(),
            &[],
            &mut rng,
        );
        assert_eq!(
            action.payload,
            ActionPayload::Target {
                name: "visitor".to_string()
            }
        );
        assert_eq!(action.expected_duration, Duration::from_secs(5));
    }
}
