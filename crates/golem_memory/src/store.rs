//! Memory Store: owns episodic memory and the skill library, and keeps a
//! per-character JSON snapshot of both on disk.
//!
//! Persistence is best-effort. A missing or unreadable file means starting
//! fresh, and a failed write leaves everything resident until the next save
//! interval comes around.

use golem_core::{ActionId, ContextHash, MemoryConfig, PersistenceConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::episode::{Episode, Skill};
use crate::episodic::EpisodicMemory;
use crate::skills::SkillLibrary;

/// Handle shared by the outcome tracker, reflection engine, and scheduler.
pub type SharedMemory = Arc<Mutex<MemoryStore>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("memory file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("memory file {path} is not a valid snapshot: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk document: `{ "episodes": [...], "skills": [...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub episodes: Vec<Episode>,
    #[serde(default)]
    pub skills: Vec<Skill>,
}

/// Summary counts for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryStats {
    pub episodes: usize,
    pub skills: usize,
    pub reflections: usize,
    pub mean_importance: f32,
    /// Successful fraction of non-reflection episodes, 0 when there are none.
    pub success_ratio: f32,
    pub trusted_skills: usize,
}

pub struct MemoryStore {
    episodic: EpisodicMemory,
    skills: SkillLibrary,
    persistence: PersistenceConfig,
    path: PathBuf,
    episodes_since_save: u32,
}

impl MemoryStore {
    pub fn new(memory: MemoryConfig, persistence: PersistenceConfig, character_name: &str) -> Self {
        let path = persistence.memory_path(character_name);
        Self {
            episodic: EpisodicMemory::new(memory.clone()),
            skills: SkillLibrary::new(memory),
            persistence,
            path,
            episodes_since_save: 0,
        }
    }

    /// Build a store and load whatever snapshot exists for the character.
    pub fn open(memory: MemoryConfig, persistence: PersistenceConfig, character_name: &str) -> Self {
        let mut store = Self::new(memory, persistence, character_name);
        store.load();
        store
    }

    pub fn into_shared(self) -> SharedMemory {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn episodic(&self) -> &EpisodicMemory {
        &self.episodic
    }

    pub fn episodic_mut(&mut self) -> &mut EpisodicMemory {
        &mut self.episodic
    }

    pub fn skills(&self) -> &SkillLibrary {
        &self.skills
    }

    pub fn skills_mut(&mut self) -> &mut SkillLibrary {
        &mut self.skills
    }

    /// Write one real-world outcome into both structures and count it toward
    /// the next periodic save. Returns the importance the episode received.
    pub fn record_outcome(&mut self, episode: Episode) -> f32 {
        let hash: ContextHash = episode.context_hash.clone();
        let action_id: ActionId = episode.action_id;
        let action_name = episode.action_name.clone();
        let target = episode.target.clone();
        let succeeded = episode.succeeded;

        let importance = self.episodic.add_episode(episode);
        self.skills
            .record_outcome(&hash, action_id, &action_name, target.as_deref(), succeeded);
        self.on_episode_added();
        importance
    }

    /// Count a new episode and flush when the save interval is reached.
    pub fn on_episode_added(&mut self) {
        if !self.persistence.enabled {
            return;
        }
        self.episodes_since_save += 1;
        if self.episodes_since_save >= self.persistence.save_interval.max(1) {
            self.save();
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Load the snapshot, keeping in-memory state untouched on any failure.
    pub fn load(&mut self) {
        if !self.persistence.enabled {
            return;
        }
        match self.try_load() {
            Ok(true) => tracing::info!(
                "MemoryStore: loaded {} episodes and {} skills from {}",
                self.episodic.len(),
                self.skills.len(),
                self.path.display()
            ),
            Ok(false) => tracing::info!(
                "MemoryStore: no memory file at {}, starting fresh",
                self.path.display()
            ),
            Err(e) => tracing::warn!("MemoryStore: {}; starting fresh", e),
        }
    }

    /// `Ok(false)` when there is no file yet.
    pub fn try_load(&mut self) -> Result<bool, StoreError> {
        if !self.path.exists() {
            return Ok(false);
        }
        let content = std::fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let snapshot: MemorySnapshot =
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        self.episodic.load_from(snapshot.episodes);
        self.skills.load_from(snapshot.skills);
        Ok(true)
    }

    /// Write the snapshot. Failure keeps the counter so the next interval retries.
    pub fn save(&mut self) {
        if !self.persistence.enabled {
            return;
        }
        match self.try_save() {
            Ok(()) => {
                self.episodes_since_save = 0;
                tracing::debug!(
                    "MemoryStore: saved {} episodes and {} skills",
                    self.episodic.len(),
                    self.skills.len()
                );
            }
            Err(e) => tracing::warn!("MemoryStore: {}; keeping memory resident", e),
        }
    }

    pub fn try_save(&self) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        let snapshot = MemorySnapshot {
            episodes: self.episodic.episodes().iter().cloned().collect(),
            skills: self.skills.skills().to_vec(),
        };
        let json = serde_json::to_string_pretty(&snapshot).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        // write aside and rename so a crash mid-write never truncates the live file
        let tmp = self.tmp_path();
        std::fs::write(&tmp, json).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Sibling of the memory file that each save writes before renaming.
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Save regardless of the interval counter. Used on shutdown.
    pub fn flush(&mut self) {
        if self.persistence.enabled {
            tracing::info!("MemoryStore: flushing to {}", self.path.display());
        }
        self.save();
    }

    pub fn stats(&self) -> MemoryStats {
        let episodes = self.episodic.episodes();
        let mut reflections = 0usize;
        let mut outcomes = 0usize;
        let mut successes = 0usize;
        let mut importance_sum = 0.0f32;
        for ep in episodes {
            importance_sum += ep.importance;
            if ep.action_id == ActionId::Reflection {
                reflections += 1;
            } else {
                outcomes += 1;
                if ep.succeeded {
                    successes += 1;
                }
            }
        }

        MemoryStats {
            episodes: episodes.len(),
            skills: self.skills.len(),
            reflections,
            mean_importance: if episodes.is_empty() {
                0.0
            } else {
                importance_sum / episodes.len() as f32
            },
            success_ratio: if outcomes == 0 {
                0.0
            } else {
                successes as f32 / outcomes as f32
            },
            trusted_skills: self
                .skills
                .skills()
                .iter()
                .filter(|s| self.skills.is_trusted(s))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled() -> PersistenceConfig {
        PersistenceConfig {
            enabled: false,
            ..PersistenceConfig::default()
        }
    }

    #[test]
    fn test_record_outcome_feeds_both_structures() {
        let mut store = MemoryStore::new(MemoryConfig::default(), disabled(), "Golem");
        let ep = Episode::new(ActionId::Wave, ContextHash::raw("Idle|none"), true);
        let importance = store.record_outcome(ep);
        assert!(importance > 0.0);
        assert_eq!(store.episodic().len(), 1);
        assert_eq!(store.skills().len(), 1);
    }

    #[test]
    fn test_failed_outcome_records_episode_only() {
        let mut store = MemoryStore::new(MemoryConfig::default(), disabled(), "Golem");
        let ep = Episode::new(ActionId::MoveToLocation, ContextHash::raw("Idle|none"), false);
        store.record_outcome(ep);
        assert_eq!(store.episodic().len(), 1);
        assert!(store.skills().is_empty());
    }

    #[test]
    fn test_stats_empty() {
        let store = MemoryStore::new(MemoryConfig::default(), disabled(), "Golem");
        let stats = store.stats();
        assert_eq!(stats.episodes, 0);
        assert_eq!(stats.mean_importance, 0.0);
        assert_eq!(stats.success_ratio, 0.0);
    }

    #[test]
    fn test_stats_excludes_reflections_from_success_ratio() {
        let mut store = MemoryStore::new(MemoryConfig::default(), disabled(), "Golem");
        store.record_outcome(Episode::new(ActionId::Wave, ContextHash::raw("a"), true));
        store.record_outcome(Episode::new(ActionId::Lean, ContextHash::raw("a"), false));
        let mut reflection = Episode::new(ActionId::Reflection, ContextHash::raw("reflection"), true);
        reflection.importance = 1.0;
        store.episodic_mut().add_episode(reflection);

        let stats = store.stats();
        assert_eq!(stats.episodes, 3);
        assert_eq!(stats.reflections, 1);
        assert!((stats.success_ratio - 0.5).abs() < 1e-6);
    }
}
