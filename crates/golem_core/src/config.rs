use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for any seconds-valued tunable (one day).
pub const MAX_DURATION_SECS: f32 = 86_400.0;

/// Clamp a seconds tunable into `[0, MAX_DURATION_SECS]`. NaN reads as zero.
pub fn clamp_secs(secs: f32) -> f32 {
    if secs.is_nan() {
        0.0
    } else {
        secs.clamp(0.0, MAX_DURATION_SECS)
    }
}

/// `Duration` from a seconds tunable. Never panics, unlike `from_secs_f32`.
pub fn duration_from_secs(secs: f32) -> Duration {
    Duration::try_from_secs_f32(clamp_secs(secs)).unwrap_or(Duration::ZERO)
}

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GolemConfig {
    pub scheduler: SchedulerConfig,
    pub decision: DecisionConfig,
    pub memory: MemoryConfig,
    pub persistence: PersistenceConfig,
}

impl GolemConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: GolemConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({:#}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GOLEM_CHARACTER") {
            self.decision.character_name = v;
        }
        if let Ok(v) = std::env::var("GOLEM_MEMORY_DIR") {
            self.persistence.memory_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("GOLEM_USE_DECISION") {
            if let Ok(b) = v.parse() {
                self.decision.enabled = b;
            }
        }
        if let Ok(v) = std::env::var("GOLEM_DECISION_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.decision.timeout_secs = n;
            }
        }
    }

    /// Sanity-check tunables. Returns one line per suspicious setting; an empty
    /// vec means the config looks coherent. Nothing here is fatal.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let weights = &self.scheduler.weights;
        if weights.total() <= 0.0 {
            warnings.push(format!(
                "fallback weights sum to {:.2}; every fallback will wander",
                weights.total()
            ));
        }
        if self.scheduler.sit_duration_min_secs > self.scheduler.sit_duration_max_secs {
            warnings.push(format!(
                "sit_duration_min_secs ({}) exceeds sit_duration_max_secs ({})",
                self.scheduler.sit_duration_min_secs, self.scheduler.sit_duration_max_secs
            ));
        }

        let s = &self.scheduler;
        for (name, value) in [
            ("idle_delay_secs", s.idle_delay_secs),
            ("idle_delay_variance_secs", s.idle_delay_variance_secs),
            ("wander_radius", s.wander_radius),
            ("wander_duration_secs", s.wander_duration_secs),
            ("sit_duration_min_secs", s.sit_duration_min_secs),
            ("sit_duration_max_secs", s.sit_duration_max_secs),
            ("look_duration_secs", s.look_duration_secs),
            ("gesture_duration_secs", s.gesture_duration_secs),
            ("play_duration_secs", s.play_duration_secs),
            ("settle_delay_secs", s.settle_delay_secs),
            ("retry_delay_secs", s.retry_delay_secs),
            ("timeout_secs", self.decision.timeout_secs),
        ] {
            if !value.is_finite() || value > MAX_DURATION_SECS {
                warnings.push(format!(
                    "{} = {} is not usable; clamped to [0, {}]",
                    name, value, MAX_DURATION_SECS
                ));
            }
        }

        let m = &self.memory;
        if m.recency_weight + m.importance_weight + m.relevance_weight <= 0.0 {
            warnings.push("retrieval weights are all zero; memory ranking is arbitrary".to_string());
        }
        if m.recency_half_life_secs <= 0.0 {
            warnings.push("recency_half_life_secs must be positive".to_string());
        }
        for (name, value) in [
            ("skill_confidence_threshold", m.skill_confidence_threshold),
            ("skill_prune_threshold", m.skill_prune_threshold),
            ("skill_replacement_threshold", m.skill_replacement_threshold),
            ("exploration_rate", m.exploration_rate),
            ("base_importance", m.base_importance),
            ("min_confidence", self.decision.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(format!("{} = {} is outside [0, 1]", name, value));
            }
        }
        if m.max_episodes == 0 {
            warnings.push("max_episodes = 0 discards every episode".to_string());
        }

        warnings
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

/// Relative weights of the five fallback categories. Any non-negative scale works.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FallbackWeights {
    pub wander: f32,
    pub look_around: f32,
    pub sit: f32,
    pub gesture: f32,
    pub play_game: f32,
}

impl FallbackWeights {
    pub fn total(&self) -> f32 {
        self.wander + self.look_around + self.sit + self.gesture + self.play_game
    }
}

impl Default for FallbackWeights {
    fn default() -> Self {
        Self {
            wander: 0.40,
            look_around: 0.20,
            sit: 0.15,
            gesture: 0.15,
            play_game: 0.10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds of continuous idleness before an autonomous action starts.
    pub idle_delay_secs: f32,
    pub idle_delay_variance_secs: f32,
    pub weights: FallbackWeights,
    pub wander_radius: f32,
    pub wander_duration_secs: f32,
    pub sit_duration_min_secs: f32,
    pub sit_duration_max_secs: f32,
    pub look_duration_secs: f32,
    pub gesture_duration_secs: f32,
    pub play_duration_secs: f32,
    /// Pause after an action finishes before the scheduler looks for idleness again.
    pub settle_delay_secs: f32,
    /// Pause between a failed outcome and its ReAct retry.
    pub retry_delay_secs: f32,
}

impl SchedulerConfig {
    pub fn settle_delay(&self) -> Duration {
        duration_from_secs(self.settle_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        duration_from_secs(self.retry_delay_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_delay_secs: 10.0,
            idle_delay_variance_secs: 5.0,
            weights: FallbackWeights::default(),
            wander_radius: 5.0,
            wander_duration_secs: 8.0,
            sit_duration_min_secs: 10.0,
            sit_duration_max_secs: 30.0,
            look_duration_secs: 3.0,
            gesture_duration_secs: 5.0,
            play_duration_secs: 20.0,
            settle_delay_secs: 1.0,
            retry_delay_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    /// false = weighted-random fallback only, the decision service is never queried.
    pub enabled: bool,
    pub timeout_secs: f32,
    pub min_confidence: f32,
    pub character_name: String,
    pub personality: String,
    pub nearby_radius: f32,
    pub nearby_tags: Vec<String>,
    /// How many recent action names are shown to the decision service.
    pub recent_actions: usize,
}

impl DecisionConfig {
    pub fn timeout(&self) -> Duration {
        duration_from_secs(self.timeout_secs)
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10.0,
            min_confidence: 0.3,
            character_name: "Golem".to_string(),
            personality: r#"{"traits":["curious","calm","observant"],"preferences":{"favorite_spot":"garden_bench","dislikes":"standing still too long"}}"#.to_string(),
            nearby_radius: 15.0,
            nearby_tags: vec![
                "Caffee Chair".to_string(),
                "Arcade".to_string(),
                "Claw Machine".to_string(),
                "Slot Machine Chair".to_string(),
                "Cafe Ad Display".to_string(),
                "InterestPoint".to_string(),
            ],
            recent_actions: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    // Episodic memory
    pub max_episodes: usize,
    pub top_k_episodes: usize,
    pub recency_half_life_secs: f64,
    pub recency_weight: f32,
    pub importance_weight: f32,
    pub relevance_weight: f32,

    // Importance
    pub base_importance: f32,
    pub novelty_bonus: f32,
    pub failure_bonus: f32,

    // Skill library
    pub max_skills: usize,
    pub min_skill_uses: u32,
    pub skill_confidence_threshold: f32,
    pub skill_prune_threshold: f32,
    pub skill_replacement_threshold: f32,
    pub exploration_rate: f32,

    // Reflection
    pub reflection_interval: u32,
    pub reflection_importance_threshold: f32,
    pub frequent_action_threshold: usize,

    // ReAct
    pub enable_failure_retry: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_episodes: 200,
            top_k_episodes: 5,
            recency_half_life_secs: 600.0,
            recency_weight: 0.4,
            importance_weight: 0.3,
            relevance_weight: 0.3,
            base_importance: 0.3,
            novelty_bonus: 0.2,
            failure_bonus: 0.3,
            max_skills: 50,
            min_skill_uses: 3,
            skill_confidence_threshold: 0.7,
            skill_prune_threshold: 0.3,
            skill_replacement_threshold: 0.5,
            exploration_rate: 0.2,
            reflection_interval: 20,
            reflection_importance_threshold: 5.0,
            frequent_action_threshold: 3,
            enable_failure_retry: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    /// Flush to disk every N added episodes.
    pub save_interval: u32,
    pub memory_dir: PathBuf,
}

impl PersistenceConfig {
    /// `<memory_dir>/<character>_memory.json`
    pub fn memory_path(&self, character_name: &str) -> PathBuf {
        self.memory_dir.join(format!("{}_memory.json", character_name))
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_interval: 10,
            memory_dir: PathBuf::from("golem_memory"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
