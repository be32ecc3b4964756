//! Integration tests for MemoryStore persistence.
//!
//! Uses tempfile::TempDir so every test gets its own memory directory.

use golem_core::{ActionId, ContextHash, MemoryConfig, PersistenceConfig};
use golem_memory::{Episode, MemoryStore, Skill};

fn persistence(dir: &tempfile::TempDir, save_interval: u32) -> PersistenceConfig {
    PersistenceConfig {
        enabled: true,
        save_interval,
        memory_dir: dir.path().join("memory"),
    }
}

fn outcome(action: ActionId, hash: &str, succeeded: bool) -> Episode {
    let mut ep = Episode::new(action, ContextHash::raw(hash), succeeded);
    ep.thought = format!("trying {}", action);
    ep
}

#[test]
fn test_round_trip_through_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 100), "Golem");
    store.record_outcome(outcome(ActionId::Wave, "Idle|none", true));
    store.record_outcome(outcome(ActionId::Lean, "Idle|Arcade", false));
    store.flush();

    let path = dir.path().join("memory").join("Golem_memory.json");
    assert!(path.exists());
    assert_eq!(store.path(), path.as_path());

    let reopened = MemoryStore::open(MemoryConfig::default(), persistence(&dir, 100), "Golem");
    assert_eq!(reopened.episodic().len(), 2);
    assert_eq!(reopened.skills().len(), 1);
    assert_eq!(
        reopened.episodic().episodes()[0].thought,
        store.episodic().episodes()[0].thought
    );
}

#[test]
fn test_interrupted_save_leaves_last_snapshot_intact() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 100), "Golem");
    store.record_outcome(outcome(ActionId::Wave, "Idle|none", true));
    store.flush();
    assert!(!store.tmp_path().exists());

    // a write that died halfway
    std::fs::write(store.tmp_path(), "{\"episodes\": [{\"actionN").unwrap();

    let mut reopened = MemoryStore::open(MemoryConfig::default(), persistence(&dir, 100), "Golem");
    assert_eq!(reopened.episodic().len(), 1);

    reopened.record_outcome(outcome(ActionId::Lean, "Idle|none", false));
    reopened.flush();
    assert!(!reopened.tmp_path().exists());
    let again = MemoryStore::open(MemoryConfig::default(), persistence(&dir, 100), "Golem");
    assert_eq!(again.episodic().len(), 2);
}

#[test]
fn test_snapshot_uses_camel_case_document() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 1), "Celeste");
    store.record_outcome(outcome(ActionId::SitAtChair, "Idle|Caffee Chair", true));

    let raw = std::fs::read_to_string(dir.path().join("memory").join("Celeste_memory.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(doc["episodes"][0]["actionName"], "SitAtChair");
    assert_eq!(doc["episodes"][0]["contextHash"], "Idle|Caffee Chair");
    assert_eq!(doc["skills"][0]["situationPattern"], "Idle|Caffee Chair");
    assert_eq!(doc["skills"][0]["useCount"], 1);
}

#[test]
fn test_periodic_save_every_interval() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 3), "Golem");
    let path = store.path().to_path_buf();

    store.record_outcome(outcome(ActionId::Wave, "a", true));
    store.record_outcome(outcome(ActionId::Wave, "a", true));
    assert!(!path.exists());

    store.record_outcome(outcome(ActionId::Wave, "a", true));
    assert!(path.exists());
}

#[test]
fn test_missing_file_starts_fresh() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 10), "Nobody");
    assert!(!store.try_load().unwrap());
    assert!(store.episodic().is_empty());
}

#[test]
fn test_corrupt_file_starts_fresh() {
    let dir = tempfile::TempDir::new().unwrap();
    let cfg = persistence(&dir, 10);
    std::fs::create_dir_all(&cfg.memory_dir).unwrap();
    std::fs::write(cfg.memory_path("Golem"), "{ not json").unwrap();

    let mut store = MemoryStore::new(MemoryConfig::default(), cfg.clone(), "Golem");
    assert!(store.try_load().is_err());

    let store = MemoryStore::open(MemoryConfig::default(), cfg, "Golem");
    assert!(store.episodic().is_empty());
    assert!(store.skills().is_empty());
}

#[test]
fn test_save_failure_keeps_memory_resident() {
    let dir = tempfile::TempDir::new().unwrap();
    // A regular file where the memory directory should be
    let blocker = dir.path().join("memory");
    std::fs::write(&blocker, "not a directory").unwrap();

    let mut store = MemoryStore::new(MemoryConfig::default(), persistence(&dir, 1), "Golem");
    store.record_outcome(outcome(ActionId::Wave, "a", true));
    assert!(store.try_save().is_err());
    assert_eq!(store.episodic().len(), 1);
}

#[test]
fn test_load_reapplies_invariants() {
    let dir = tempfile::TempDir::new().unwrap();
    let mut big = MemoryStore::new(
        MemoryConfig::default(),
        persistence(&dir, 1000),
        "Golem",
    );
    for i in 0..10 {
        let mut ep = outcome(ActionId::Idle, "Idle|none", true);
        ep.timestamp = i;
        ep.importance = 3.0;
        big.episodic_mut().add_episode(ep);
    }
    big.skills_mut().load_from(vec![Skill {
        situation_pattern: ContextHash::raw("Idle|none"),
        recommended_action: ActionId::Idle,
        action_name: "Idle".to_string(),
        target: None,
        use_count: 2,
        success_count: 2,
    }]);
    big.flush();

    let small = MemoryStore::open(
        MemoryConfig {
            max_episodes: 4,
            ..MemoryConfig::default()
        },
        persistence(&dir, 1000),
        "Golem",
    );
    let stamps: Vec<i64> = small.episodic().episodes().iter().map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![6, 7, 8, 9]);
    assert!(small.episodic().episodes().iter().all(|e| e.importance <= 1.0));
    assert_eq!(small.skills().len(), 1);
}

#[test]
fn test_disabled_persistence_never_touches_disk() {
    let dir = tempfile::TempDir::new().unwrap();
    let cfg = PersistenceConfig {
        enabled: false,
        save_interval: 1,
        memory_dir: dir.path().join("memory"),
    };
    let mut store = MemoryStore::new(MemoryConfig::default(), cfg, "Golem");
    store.record_outcome(outcome(ActionId::Wave, "a", true));
    store.flush();
    assert!(!dir.path().join("memory").exists());
}
