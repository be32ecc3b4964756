//! Decision contract between the scheduler and an external decision service.
//!
//! A service returns a loosely-typed [`RawDecision`]; the scheduler only acts
//! on it after [`validate_decision`] maps the action name onto the whitelist
//! and checks confidence. Everything that goes wrong on this path is a
//! [`DecisionRejected`] and leads to the weighted-random fallback.

use anyhow::Result;
use async_trait::async_trait;
use golem_core::{ActionId, FsmState, Position};
use golem_memory::Episode;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Types
// ============================================================================

/// A validated decision the scheduler can turn into an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action_id: ActionId,
    pub action_name: String,
    pub target: Option<String>,
    pub thought: String,
    pub reasoning: String,
    pub confidence: f32,
}

/// Wire shape of a decision service reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawDecision {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Everything a decision service is told about the current moment.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub character_name: String,
    pub personality: String,
    pub fsm_state: FsmState,
    pub position: Position,
    /// `"name (tag)"` labels of nearby objects.
    pub nearby: Vec<String>,
    /// Most recent action names, oldest first.
    pub recent_actions: Vec<String>,
    pub retrieved_memories: Vec<Episode>,
    /// Set only on a retry after a failed action.
    pub failure_context: Option<String>,
}

#[async_trait]
pub trait DecisionService: Send + Sync {
    /// Ask for the next action. Errors are treated as "no decision".
    async fn decide(&self, request: &DecisionRequest) -> Result<RawDecision>;

    /// Name for logging.
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionRejected {
    #[error("decision service unavailable: {0}")]
    Unavailable(String),
    #[error("confidence {confidence:.2} below minimum {min:.2}")]
    LowConfidence { confidence: f32, min: f32 },
    #[error("unmapped action '{0}'")]
    UnmappedAction(String),
}

// ============================================================================
// Validation
// ============================================================================

/// Map a raw reply onto the action whitelist and enforce the confidence floor.
pub fn validate_decision(raw: RawDecision, min_confidence: f32) -> Result<Decision, DecisionRejected> {
    let action_id = ActionId::from_name(&raw.action)
        .ok_or_else(|| DecisionRejected::UnmappedAction(raw.action.clone()))?;

    if raw.confidence < min_confidence {
        return Err(DecisionRejected::LowConfidence {
            confidence: raw.confidence,
            min: min_confidence,
        });
    }

    Ok(Decision {
        action_id,
        action_name: raw.action.trim().to_string(),
        target: normalize_target(raw.target),
        thought: raw.thought,
        reasoning: raw.reasoning,
        confidence: raw.confidence.clamp(0.0, 1.0),
    })
}

/// Services often spell "no target" as an empty string or the word null.
fn normalize_target(target: Option<String>) -> Option<String> {
    target
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("null") && !t.eq_ignore_ascii_case("none"))
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a decision out of free-form service output.
///
/// Strategies, in order:
/// 1. Direct JSON parse
/// 2. JSON inside a markdown code block
/// 3. Outermost balanced `{...}`, raw then repaired
pub fn parse_decision_text(text: &str) -> Result<RawDecision> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty decision output");
    }

    if let Ok(raw) = serde_json::from_str::<RawDecision>(trimmed) {
        return Ok(raw);
    }

    if let Ok(code_block_re) = regex::Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?\s*```") {
        if let Some(caps) = code_block_re.captures(trimmed) {
            let inner = caps.get(1).map_or("", |m| m.as_str()).trim();
            if let Ok(raw) = serde_json::from_str::<RawDecision>(inner) {
                return Ok(raw);
            }
        }
    }

    if let Some(json_str) = extract_balanced_braces(trimmed) {
        if let Ok(raw) = serde_json::from_str::<RawDecision>(&json_str) {
            return Ok(raw);
        }
        if let Ok(raw) = serde_json::from_str::<RawDecision>(&repair_json(&json_str)) {
            return Ok(raw);
        }
    }

    anyhow::bail!(
        "could not parse decision from: {}",
        trimmed.chars().take(200).collect::<String>()
    )
}

fn extract_balanced_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + i + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Trailing commas, and single quotes when no double quotes are present.
fn repair_json(text: &str) -> String {
    let mut result = text.to_string();
    if let Ok(trailing_comma) = regex::Regex::new(r",\s*([}\]])") {
        result = trailing_comma.replace_all(&result, "$1").to_string();
    }
    if !result.contains('"') {
        result = result.replace('\'', "\"");
    }
    result
}

// ============================================================================
// Tests
// ============================================================================
