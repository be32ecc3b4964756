//! Skill Library: situation → action cache gated by trust and exploration.

use golem_core::{ActionId, ContextHash, MemoryConfig};
use rand::Rng;

use crate::episode::Skill;

pub struct SkillLibrary {
    skills: Vec<Skill>,
    config: MemoryConfig,
}

impl SkillLibrary {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            skills: Vec::new(),
            config,
        }
    }

    /// Replace contents with persisted skills. Duplicate patterns keep their
    /// first entry and capacity eviction is re-applied.
    pub fn load_from(&mut self, saved: Vec<Skill>) {
        self.skills.clear();
        for skill in saved {
            if self.match_context(&skill.situation_pattern).is_some() {
                tracing::warn!(
                    "SkillLibrary: dropping duplicate persisted skill for {}",
                    skill.situation_pattern
                );
                continue;
            }
            self.skills.push(skill);
        }
        self.evict_overflow();
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    pub fn match_context(&self, situation: &ContextHash) -> Option<&Skill> {
        self.skills.iter().find(|s| &s.situation_pattern == situation)
    }

    fn match_context_mut(&mut self, situation: &ContextHash) -> Option<&mut Skill> {
        self.skills
            .iter_mut()
            .find(|s| &s.situation_pattern == situation)
    }

    /// Enough uses and a high enough success rate, ignoring exploration.
    pub fn is_trusted(&self, skill: &Skill) -> bool {
        skill.use_count >= self.config.min_skill_uses
            && skill.success_rate() >= self.config.skill_confidence_threshold
    }

    /// Trusted and not bypassed by this call's exploration roll.
    pub fn should_use_skill<R: Rng + ?Sized>(&self, skill: Option<&Skill>, rng: &mut R) -> bool {
        let Some(skill) = skill else {
            return false;
        };
        if !self.is_trusted(skill) {
            return false;
        }
        let roll: f32 = rng.gen();
        if roll < self.config.exploration_rate {
            tracing::debug!(
                "SkillLibrary: exploring instead of {} for {} (roll {:.2} < {:.2})",
                skill.action_name,
                skill.situation_pattern,
                roll,
                self.config.exploration_rate
            );
            return false;
        }
        true
    }

    /// Fold one real-world outcome into the library.
    pub fn record_outcome(
        &mut self,
        situation: &ContextHash,
        action_id: ActionId,
        action_name: &str,
        target: Option<&str>,
        succeeded: bool,
    ) {
        let replacement_threshold = self.config.skill_replacement_threshold;
        if let Some(existing) = self.match_context_mut(situation) {
            if existing.recommended_action == action_id {
                existing.use_count += 1;
                if succeeded {
                    existing.success_count += 1;
                }
            } else {
                // Rate is read before this visit is counted.
                let struggling = existing.success_rate() < replacement_threshold;
                existing.use_count += 1;
                if succeeded && struggling {
                    tracing::info!(
                        "SkillLibrary: {} replaces {} for {}",
                        action_name,
                        existing.action_name,
                        situation
                    );
                    existing.recommended_action = action_id;
                    existing.action_name = action_name.to_string();
                    existing.target = target.map(str::to_string);
                    existing.success_count += 1;
                }
            }
            return;
        }

        if !succeeded {
            return;
        }

        self.skills.push(Skill {
            situation_pattern: situation.clone(),
            recommended_action: action_id,
            action_name: action_name.to_string(),
            target: target.map(str::to_string),
            use_count: 1,
            success_count: 1,
        });
        tracing::debug!("SkillLibrary: learned {} for {}", action_name, situation);
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.skills.len() > self.config.max_skills {
            let Some(worst) = self.worst_index() else {
                break;
            };
            let removed = self.skills.remove(worst);
            tracing::debug!(
                "SkillLibrary: evicted {} for {} (rate {:.2})",
                removed.action_name,
                removed.situation_pattern,
                removed.success_rate()
            );
        }
    }

    /// Index of the lowest success rate; the first one found wins ties.
    fn worst_index(&self) -> Option<usize> {
        let mut worst: Option<(usize, f32)> = None;
        for (i, skill) in self.skills.iter().enumerate() {
            let rate = skill.success_rate();
            match worst {
                Some((_, r)) if rate >= r => {}
                _ => worst = Some((i, rate)),
            }
        }
        worst.map(|(i, _)| i)
    }

    /// Drop well-tested skills that keep failing. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.skills.len();
        let min_uses = self.config.min_skill_uses;
        let threshold = self.config.skill_prune_threshold;
        self.skills
            .retain(|s| !(s.use_count >= min_uses && s.success_rate() < threshold));
        before - self.skills.len()
    }
}
