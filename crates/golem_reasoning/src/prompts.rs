use chrono::{DateTime, Utc};
use golem_core::ActionId;
use golem_memory::Episode;

use crate::decision::DecisionRequest;

/// Assemble the full decision prompt: situation, personality, recalled
/// memories, failure context on a retry, rules, whitelist, reply schema.
pub fn build_decision_prompt(request: &DecisionRequest) -> String {
    let nearby = if request.nearby.is_empty() {
        "nothing nearby".to_string()
    } else {
        request.nearby.join(", ")
    };
    let recent = if request.recent_actions.is_empty() {
        "none".to_string()
    } else {
        request.recent_actions.join(", ")
    };

    let mut prompt = format!(
        "You are {}, a character in a virtual world.\n\n\
         ## Current State\n\
         - FSM state: {}\n\
         - Position: {}\n\
         - Nearby objects: {}\n\
         - Recent actions (last {}): {}\n\n\
         ## Personality\n{}\n",
        request.character_name,
        request.fsm_state,
        request.position,
        nearby,
        request.recent_actions.len(),
        recent,
        request.personality,
    );

    if !request.retrieved_memories.is_empty() {
        prompt.push_str("\n## Relevant Memories\n");
        for ep in &request.retrieved_memories {
            prompt.push_str(&format_memory(ep));
            prompt.push('\n');
        }
    }

    if let Some(failure) = &request.failure_context {
        prompt.push_str("\n## Previous Attempt Failed\n");
        prompt.push_str(failure);
        prompt.push('\n');
    }

    prompt.push_str(
        "\n## Rules\n\
         1. Think step by step about what you want to do and why.\n\
         2. Do NOT repeat the same action 3 times in a row.\n\
         3. Choose actions that fit your personality and current context.\n\
         4. If you just sat for a long time, consider standing up and walking.\n\
         5. Learn from your memories: avoid what failed, prefer what worked here before.\n",
    );

    prompt.push_str(&format!(
        "\n## Valid Actions\n{}\n\n\
         Respond ONLY with JSON (no markdown, no explanation):\n\
         {{\n  \"reasoning\": \"<2-3 sentences: why this action>\",\n  \
         \"action\": \"<ActionId from valid list>\",\n  \
         \"target\": \"<object_name or null>\",\n  \
         \"thought\": \"<one sentence: character's inner thought>\",\n  \
         \"confidence\": <0.0-1.0>\n}}",
        ActionId::selectable_list()
    ));

    prompt
}

/// `- [HH:MM] ActionName → target [OK|FAILED] thought`
fn format_memory(ep: &Episode) -> String {
    let time = DateTime::<Utc>::from_timestamp_millis(ep.timestamp)
        .map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let status = if ep.succeeded { "OK" } else { "FAILED" };
    let mut line = format!("- [{}] {}", time, ep.action_name);
    if let Some(target) = &ep.target {
        line.push_str(&format!(" → {}", target));
    }
    line.push_str(&format!(" [{}]", status));
    if !ep.thought.is_empty() {
        line.push_str(&format!(" {}", ep.thought));
    }
    line
}
