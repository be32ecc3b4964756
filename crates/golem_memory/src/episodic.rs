//! Episodic Memory: bounded log of past actions with ranked retrieval.
//!
//! Episodes are scored once on insertion (base + novelty + failure) and
//! never mutated afterwards. Retrieval blends recency decay, stored
//! importance, and context relevance into a single score.

use golem_core::{ActionId, ContextHash, MemoryConfig};
use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::episode::{now_millis, Episode};

/// How many of the most recent episodes are checked for novelty.
const NOVELTY_LOOKBACK: usize = 10;

/// An episode together with the score it received for one query.
#[derive(Debug, Clone)]
pub struct ScoredEpisode {
    pub episode: Episode,
    pub score: f32,
    pub recency: f32,
    pub relevance: f32,
}

pub struct EpisodicMemory {
    episodes: VecDeque<Episode>,
    config: MemoryConfig,
}

impl EpisodicMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            episodes: VecDeque::new(),
            config,
        }
    }

    /// Replace contents with persisted episodes (oldest first). Capacity and
    /// importance bounds are re-applied in case the config changed since the
    /// snapshot was written.
    pub fn load_from(&mut self, saved: Vec<Episode>) {
        self.episodes = saved
            .into_iter()
            .map(|mut ep| {
                ep.importance = ep.importance.clamp(0.0, 1.0);
                ep
            })
            .collect();
        self.evict_overflow();
    }

    pub fn episodes(&self) -> &VecDeque<Episode> {
        &self.episodes
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Append an episode, scoring it first if it arrives unscored.
    /// Returns the importance that was stored.
    pub fn add_episode(&mut self, mut entry: Episode) -> f32 {
        entry.importance = if entry.importance <= 0.0 {
            self.calculate_importance(&entry)
        } else {
            entry.importance.clamp(0.0, 1.0)
        };
        let importance = entry.importance;

        self.episodes.push_back(entry);
        self.evict_overflow();
        importance
    }

    fn evict_overflow(&mut self) {
        while self.episodes.len() > self.config.max_episodes {
            self.episodes.pop_front();
        }
    }

    /// `clamp01(base + novelty·[action unseen in last 10] + failure·[failed])`
    pub fn calculate_importance(&self, entry: &Episode) -> f32 {
        let novelty = if self.seen_recently(entry.action_id) {
            0.0
        } else {
            self.config.novelty_bonus
        };
        let failure = if entry.succeeded {
            0.0
        } else {
            self.config.failure_bonus
        };
        (self.config.base_importance + novelty + failure).clamp(0.0, 1.0)
    }

    fn seen_recently(&self, action_id: ActionId) -> bool {
        self.episodes
            .iter()
            .rev()
            .take(NOVELTY_LOOKBACK)
            .any(|ep| ep.action_id == action_id)
    }

    /// Top-k episodes for `context`, best first. `None` uses the configured default.
    pub fn retrieve_top_k(&self, context: &ContextHash, k: Option<usize>) -> Vec<Episode> {
        self.retrieve_top_k_at(context, k, now_millis())
            .into_iter()
            .map(|s| s.episode)
            .collect()
    }

    /// Ranked retrieval evaluated at `now_ms`.
    ///
    /// Ties on score keep insertion order (older first).
    pub fn retrieve_top_k_at(
        &self,
        context: &ContextHash,
        k: Option<usize>,
        now_ms: i64,
    ) -> Vec<ScoredEpisode> {
        let k = k.unwrap_or(self.config.top_k_episodes);
        if k == 0 || self.episodes.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, ScoredEpisode)> = self
            .episodes
            .iter()
            .enumerate()
            .map(|(idx, ep)| (idx, self.score(ep, context, now_ms)))
            .collect();

        scored.sort_by(|(ia, a), (ib, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(ia.cmp(ib))
        });
        scored.truncate(k);

        tracing::debug!(
            "EpisodicMemory: retrieved {} of {} episodes for {}",
            scored.len(),
            self.episodes.len(),
            context
        );
        scored.into_iter().map(|(_, s)| s).collect()
    }

    fn score(&self, ep: &Episode, context: &ContextHash, now_ms: i64) -> ScoredEpisode {
        let recency = recency_decay(now_ms - ep.timestamp, self.config.recency_half_life_secs);
        let relevance = ep.context_hash.relevance(context);
        let score = self.config.recency_weight * recency
            + self.config.importance_weight * ep.importance
            + self.config.relevance_weight * relevance;
        ScoredEpisode {
            episode: ep.clone(),
            score,
            recency,
            relevance,
        }
    }

    /// The `n` most important episodes, highest first (ties keep insertion order).
    pub fn retrieve_by_importance(&self, n: usize) -> Vec<Episode> {
        let mut sorted: Vec<&Episode> = self.episodes.iter().collect();
        sorted.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(Ordering::Equal)
        });
        sorted.into_iter().take(n).cloned().collect()
    }
}

/// `exp(-ln2 · age / half_life)`; future timestamps count as age zero.
fn recency_decay(age_ms: i64, half_life_secs: f64) -> f32 {
    if half_life_secs <= 0.0 {
        return 0.0;
    }
    let age_secs = age_ms.max(0) as f64 / 1000.0;
    (-std::f64::consts::LN_2 * age_secs / half_life_secs).exp() as f32
}
