use chrono::Utc;
use golem_core::{ActionId, ContextHash, Position};
use serde::{Deserialize, Serialize};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One remembered action and how it turned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    /// Unix milliseconds.
    pub timestamp: i64,
    pub action_id: ActionId,
    pub action_name: String,
    pub target: Option<String>,
    pub thought: String,
    pub reasoning: String,
    /// In [0, 1]. A value `<= 0` on insertion means "unscored" and is
    /// computed by `EpisodicMemory::add_episode`.
    pub importance: f32,
    pub succeeded: bool,
    pub position: Position,
    pub context_hash: ContextHash,
}

impl Episode {
    /// An unscored episode stamped with the current time.
    pub fn new(action_id: ActionId, context_hash: ContextHash, succeeded: bool) -> Self {
        Self {
            timestamp: now_millis(),
            action_id,
            action_name: action_id.as_str().to_string(),
            target: None,
            thought: String::new(),
            reasoning: String::new(),
            importance: 0.0,
            succeeded,
            position: Position::default(),
            context_hash,
        }
    }
}

/// A cached situation → action recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    pub situation_pattern: ContextHash,
    pub recommended_action: ActionId,
    pub action_name: String,
    pub target: Option<String>,
    pub use_count: u32,
    pub success_count: u32,
}

impl Skill {
    pub fn success_rate(&self) -> f32 {
        if self.use_count == 0 {
            0.0
        } else {
            self.success_count as f32 / self.use_count as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_zero_uses() {
        let skill = Skill {
            situation_pattern: ContextHash::raw("Idle|none"),
            recommended_action: ActionId::Wave,
            action_name: "Wave".into(),
            target: None,
            use_count: 0,
            success_count: 0,
        };
        assert_eq!(skill.success_rate(), 0.0);
    }

    #[test]
    fn test_episode_serializes_camel_case() {
        let ep = Episode::new(ActionId::Lean, ContextHash::raw("Idle|none"), true);
        let json = serde_json::to_value(&ep).unwrap();
        assert_eq!(json["actionId"], "Lean");
        assert_eq!(json["contextHash"], "Idle|none");
        assert!(json.get("succeeded").is_some());
    }
}
