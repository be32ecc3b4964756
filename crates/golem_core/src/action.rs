//! Action vocabulary shared by the scheduler, memory, and the action bus.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A point in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Offset on the ground plane (y is preserved).
    pub fn offset_planar(&self, dx: f32, dz: f32) -> Self {
        Self::new(self.x + dx, self.y, self.z + dz)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

// ============================================================================
// ActionId
// ============================================================================

/// Actions the agent can perform autonomously, plus the internal
/// `Reflection` marker used for synthetic memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionId {
    Idle,
    MoveToLocation,
    TurnTo,
    SitAtChair,
    StandUp,
    LookAt,
    Lean,
    ExamineMenu,
    PlayArcade,
    PlayClaw,
    Wave,
    Reflection,
}

impl ActionId {
    /// Actions a decision service may choose, in prompt order.
    pub const SELECTABLE: [ActionId; 11] = [
        ActionId::Idle,
        ActionId::MoveToLocation,
        ActionId::TurnTo,
        ActionId::SitAtChair,
        ActionId::StandUp,
        ActionId::LookAt,
        ActionId::Lean,
        ActionId::ExamineMenu,
        ActionId::PlayArcade,
        ActionId::PlayClaw,
        ActionId::Wave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::MoveToLocation => "MoveToLocation",
            Self::TurnTo => "TurnTo",
            Self::SitAtChair => "SitAtChair",
            Self::StandUp => "StandUp",
            Self::LookAt => "LookAt",
            Self::Lean => "Lean",
            Self::ExamineMenu => "ExamineMenu",
            Self::PlayArcade => "PlayArcade",
            Self::PlayClaw => "PlayClaw",
            Self::Wave => "Wave",
            Self::Reflection => "Reflection",
        }
    }

    /// Case-insensitive lookup against the selectable whitelist.
    /// `Reflection` is never returned.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::SELECTABLE
            .iter()
            .copied()
            .find(|id| id.as_str().eq_ignore_ascii_case(name))
    }

    /// Comma-separated whitelist, as shown to decision services.
    pub fn selectable_list() -> String {
        Self::SELECTABLE
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ActionPayload {
    None,
    MoveTo { destination: Position },
    Gaze { position: Position },
    SitAtChair { chair_number: u32 },
    Idle { idle_type: String },
    /// A named object in the world, as chosen by a decision service.
    Target { name: String },
}

/// A fully-specified action ready to publish on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct AutonomousAction {
    pub action_id: ActionId,
    pub payload: ActionPayload,
    pub expected_duration: Duration,
    pub description: String,
}

// ============================================================================
// FsmState
// ============================================================================

/// Behaviour state reported by the agent's body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FsmState {
    Idle,
    Moving,
    Sitting,
    Looking,
    Interacting,
    Playing,
}

impl FsmState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Moving => "Moving",
            Self::Sitting => "Sitting",
            Self::Looking => "Looking",
            Self::Interacting => "Interacting",
            Self::Playing => "Playing",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_case_insensitive() {
        assert_eq!(ActionId::from_name("sitatchair"), Some(ActionId::SitAtChair));
        assert_eq!(ActionId::from_name("  WAVE "), Some(ActionId::Wave));
        assert_eq!(ActionId::from_name("MoveToLocation"), Some(ActionId::MoveToLocation));
    }

    #[test]
    fn test_from_name_rejects_unknown_and_internal() {
        assert_eq!(ActionId::from_name("Dance"), None);
        assert_eq!(ActionId::from_name(""), None);
        assert_eq!(ActionId::from_name("Reflection"), None);
    }

    #[test]
    fn test_selectable_list_matches_whitelist() {
        let list = ActionId::selectable_list();
        assert!(list.starts_with("Idle, MoveToLocation"));
        assert!(list.ends_with("PlayClaw, Wave"));
        assert!(!list.contains("Reflection"));
    }

    #[test]
    fn test_position_helpers() {
        let a = Position::new(0.0, 1.0, 0.0);
        let b = a.offset_planar(3.0, 4.0);
        assert_eq!(b.y, 1.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
        assert_eq!(a.to_string(), "(0.0, 1.0, 0.0)");
    }

    #[test]
    fn test_payload_serializes_tagged() {
        let p = ActionPayload::SitAtChair { chair_number: 2 };
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"kind":"sit_at_chair","chair_number":2}"#);
    }
}
