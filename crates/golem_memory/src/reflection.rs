//! Reflection Engine: periodic self-analysis over the most important
//! episodes.
//!
//! Observations are derived locally from action frequency and failure counts
//! and written back as high-importance `Reflection` episodes. Every pass
//! ends by pruning skills that keep failing.

use golem_core::{ActionId, ContextHash, MemoryConfig};

use crate::episode::Episode;
use crate::store::SharedMemory;

/// How many top-importance episodes a reflection pass looks at.
pub const REFLECTION_SAMPLE: usize = 10;

pub const REFLECTION_REASONING: &str = "Periodic reflection on recent experiences";
pub const REFLECTION_CONTEXT: &str = "reflection";

const ALL_WELL: &str =
    "My recent actions have been going well. I should continue exploring my environment.";

/// What one reflection pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectionReport {
    pub observations: Vec<String>,
    pub skills_pruned: usize,
}

pub struct ReflectionEngine {
    config: MemoryConfig,
    memory: SharedMemory,
    actions_since_reflection: u32,
    accumulated_importance: f32,
    is_reflecting: bool,
}

impl ReflectionEngine {
    pub fn new(config: MemoryConfig, memory: SharedMemory) -> Self {
        Self {
            config,
            memory,
            actions_since_reflection: 0,
            accumulated_importance: 0.0,
            is_reflecting: false,
        }
    }

    /// Count one completed outcome.
    pub fn track_action(&mut self, importance: f32) {
        self.actions_since_reflection += 1;
        self.accumulated_importance += importance;
    }

    pub fn should_reflect(&self) -> bool {
        if self.is_reflecting {
            return false;
        }
        self.actions_since_reflection >= self.config.reflection_interval
            || self.accumulated_importance >= self.config.reflection_importance_threshold
    }

    pub fn is_reflecting(&self) -> bool {
        self.is_reflecting
    }

    pub fn actions_since_reflection(&self) -> u32 {
        self.actions_since_reflection
    }

    pub fn accumulated_importance(&self) -> f32 {
        self.accumulated_importance
    }

    /// Run one reflection pass. Counters reset even when there is nothing to
    /// reflect on, in which case `None` is returned.
    pub async fn execute_reflection(&mut self) -> Option<ReflectionReport> {
        if self.is_reflecting {
            return None;
        }
        self.is_reflecting = true;
        self.actions_since_reflection = 0;
        self.accumulated_importance = 0.0;

        tracing::info!("ReflectionEngine: starting reflection");

        let report = {
            let mut store = self.memory.lock().await;
            let sample = store.episodic().retrieve_by_importance(REFLECTION_SAMPLE);
            if sample.is_empty() {
                None
            } else {
                let observations = local_observations(&sample, self.config.frequent_action_threshold);
                for obs in &observations {
                    tracing::info!("ReflectionEngine: observation: {}", obs);
                    store.episodic_mut().add_episode(reflection_episode(obs));
                }
                let skills_pruned = store.skills_mut().prune();
                store.on_episode_added();
                Some(ReflectionReport {
                    observations,
                    skills_pruned,
                })
            }
        };

        self.is_reflecting = false;
        if let Some(r) = &report {
            tracing::info!(
                "ReflectionEngine: complete, {} observations, {} skills pruned",
                r.observations.len(),
                r.skills_pruned
            );
        } else {
            tracing::debug!("ReflectionEngine: no episodes to reflect on");
        }
        report
    }
}

fn reflection_episode(observation: &str) -> Episode {
    let mut ep = Episode::new(
        ActionId::Reflection,
        ContextHash::raw(REFLECTION_CONTEXT),
        true,
    );
    ep.thought = observation.to_string();
    ep.reasoning = REFLECTION_REASONING.to_string();
    ep.importance = 1.0;
    ep
}

/// Frequency and failure observations over `episodes`. Never empty.
///
/// Counting ties go to the action name seen first.
pub fn local_observations(episodes: &[Episode], frequent_threshold: usize) -> Vec<String> {
    let mut counts: Vec<(&str, usize, usize)> = Vec::new();
    for ep in episodes {
        let name = ep.action_name.as_str();
        let slot = match counts.iter().position(|(n, _, _)| *n == name) {
            Some(i) => i,
            None => {
                counts.push((name, 0, 0));
                counts.len() - 1
            }
        };
        counts[slot].1 += 1;
        if !ep.succeeded {
            counts[slot].2 += 1;
        }
    }

    let mut observations = Vec::new();

    let mut most_common: Option<(&str, usize)> = None;
    let mut worst: Option<(&str, usize)> = None;
    for &(name, uses, fails) in &counts {
        if most_common.map_or(true, |(_, best)| uses > best) {
            most_common = Some((name, uses));
        }
        if fails > 0 && worst.map_or(true, |(_, best)| fails > best) {
            worst = Some((name, fails));
        }
    }

    if let Some((name, count)) = most_common {
        if count >= frequent_threshold {
            observations.push(format!(
                "I tend to {} frequently ({} times recently). I should try more variety.",
                name, count
            ));
        }
    }
    if let Some((name, fails)) = worst {
        observations.push(format!(
            "{} has failed {} times. I should be more cautious with this action or try alternatives.",
            name, fails
        ));
    }

    if observations.is_empty() {
        observations.push(ALL_WELL.to_string());
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(name: ActionId, succeeded: bool) -> Episode {
        Episode::new(name, ContextHash::raw("Idle|none"), succeeded)
    }

    #[test]
    fn test_generic_observation_when_nothing_stands_out() {
        let sample = vec![ep(ActionId::Wave, true), ep(ActionId::Lean, true)];
        assert_eq!(local_observations(&sample, 3), vec![ALL_WELL.to_string()]);
    }

    #[test]
    fn test_repetition_observation() {
        let sample = vec![
            ep(ActionId::Lean, true),
            ep(ActionId::Wave, true),
            ep(ActionId::Wave, true),
            ep(ActionId::Wave, true),
        ];
        let obs = local_observations(&sample, 3);
        assert_eq!(
            obs,
            vec!["I tend to Wave frequently (3 times recently). I should try more variety."]
        );
    }

    #[test]
    fn test_failure_observation_names_worst_action() {
        let sample = vec![
            ep(ActionId::SitAtChair, false),
            ep(ActionId::MoveToLocation, false),
            ep(ActionId::MoveToLocation, false),
            ep(ActionId::Wave, true),
        ];
        let obs = local_observations(&sample, 3);
        assert_eq!(obs.len(), 1);
        assert!(obs[0].starts_with("MoveToLocation has failed 2 times."));
    }

    #[test]
    fn test_failure_ties_go_to_first_seen() {
        let sample = vec![ep(ActionId::SitAtChair, false), ep(ActionId::TurnTo, false)];
        let obs = local_observations(&sample, 3);
        assert!(obs[0].starts_with("SitAtChair has failed 1 times."));
    }

    #[test]
    fn test_should_reflect_thresholds() {
        let store = crate::MemoryStore::new(
            MemoryConfig::default(),
            golem_core::PersistenceConfig {
                enabled: false,
                ..Default::default()
            },
            "Golem",
        );
        let mut engine = ReflectionEngine::new(
            MemoryConfig {
                reflection_interval: 3,
                reflection_importance_threshold: 1.0,
                ..MemoryConfig::default()
            },
            store.into_shared(),
        );
        assert!(!engine.should_reflect());
        engine.track_action(0.1);
        engine.track_action(0.1);
        assert!(!engine.should_reflect());
        engine.track_action(0.1);
        assert!(engine.should_reflect());

        engine.actions_since_reflection = 0;
        engine.accumulated_importance = 0.0;
        engine.track_action(0.6);
        engine.track_action(0.5);
        assert!(engine.should_reflect());

        engine.is_reflecting = true;
        assert!(!engine.should_reflect());
    }
}
