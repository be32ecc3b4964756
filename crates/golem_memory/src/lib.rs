pub mod episode;
pub mod episodic;
pub mod reflection;
pub mod skills;
pub mod store;

pub use episode::{now_millis, Episode, Skill};
pub use episodic::{EpisodicMemory, ScoredEpisode};
pub use reflection::{local_observations, ReflectionEngine, ReflectionReport};
pub use skills::SkillLibrary;
pub use store::{MemorySnapshot, MemoryStats, MemoryStore, SharedMemory, StoreError};
