//! Situation fingerprints.
//!
//! A context hash is `fsmState|tag1,tag2,...` with tags sorted and
//! deduplicated, or `fsmState|none` when nothing is nearby. It keys both
//! skill lookup and memory relevance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::action::{FsmState, Position};
use crate::world::{EntityRef, WorldQuery};

const FIELD_SEP: char = '|';
const TAG_SEP: char = ',';
const NO_TAGS: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextHash(String);

impl ContextHash {
    /// Build a hash from a state name and the tags seen nearby. Tag order and
    /// duplicates do not affect the result.
    pub fn new<S: AsRef<str>>(fsm_state: &str, nearby_tags: &[S]) -> Self {
        let tags: BTreeSet<&str> = nearby_tags
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .collect();
        let tag_field = if tags.is_empty() {
            NO_TAGS.to_string()
        } else {
            tags.into_iter().collect::<Vec<_>>().join(",")
        };
        Self(format!("{}{}{}", fsm_state, FIELD_SEP, tag_field))
    }

    /// Wrap an arbitrary key (e.g. `"reflection"`) without normalising it.
    pub fn raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(fsm_state, tags)` when the hash has at least two fields.
    fn fields(&self) -> Option<(&str, &str)> {
        let mut parts = self.0.split(FIELD_SEP);
        let state = parts.next()?;
        let tags = parts.next()?;
        Some((state, tags))
    }

    /// Similarity to another context in [0, 1].
    ///
    /// Exact match scores 1.0. Otherwise a matching state is worth 0.5 and the
    /// Jaccard similarity of the tag sets is worth up to another 0.5. The
    /// `none` sentinel never intersects anything. Symmetric in its arguments.
    pub fn relevance(&self, other: &ContextHash) -> f32 {
        if self.0 == other.0 {
            return 1.0;
        }
        let (Some((state_a, tags_a)), Some((state_b, tags_b))) = (self.fields(), other.fields())
        else {
            return 0.0;
        };

        let state_score = if state_a == state_b { 0.5 } else { 0.0 };
        state_score + 0.5 * jaccard(&tag_set(tags_a), &tag_set(tags_b))
    }
}

fn tag_set(field: &str) -> BTreeSet<&str> {
    field
        .split(TAG_SEP)
        .map(str::trim)
        .filter(|t| !t.is_empty() && *t != NO_TAGS)
        .collect()
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

impl fmt::Display for ContextHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// ContextHasher
// ============================================================================

/// What the agent can currently perceive, plus its fingerprint.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub fsm_state: FsmState,
    pub position: Position,
    pub nearby: Vec<EntityRef>,
    pub hash: ContextHash,
}

impl ContextSnapshot {
    /// `"name (tag)"` labels for prompts.
    pub fn nearby_labels(&self) -> Vec<String> {
        self.nearby
            .iter()
            .map(|e| format!("{} ({})", e.name, e.tag))
            .collect()
    }
}

/// Scans the world around the agent and fingerprints the situation.
pub struct ContextHasher {
    world: Arc<dyn WorldQuery>,
    radius: f32,
    tags: Vec<String>,
}

impl ContextHasher {
    pub fn new(world: Arc<dyn WorldQuery>, radius: f32, tags: Vec<String>) -> Self {
        Self { world, radius, tags }
    }

    pub fn snapshot(&self, fsm_state: FsmState, position: Position) -> ContextSnapshot {
        let nearby = self.world.find_nearby(position, self.radius, &self.tags);
        let tags: Vec<&str> = nearby.iter().map(|e| e.tag.as_str()).collect();
        let hash = ContextHash::new(fsm_state.as_str(), &tags);
        tracing::debug!("ContextHasher: {} entities nearby → {}", nearby.len(), hash);
        ContextSnapshot {
            fsm_state,
            position,
            nearby,
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_order_independent() {
        let a = ContextHash::new("Idle", &["Arcade", "Caffee Chair"]);
        let b = ContextHash::new("Idle", &["Caffee Chair", "Arcade", "Arcade"]);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Idle|Arcade,Caffee Chair");
    }

    #[test]
    fn test_hash_none_sentinel() {
        let empty: [&str; 0] = [];
        assert_eq!(ContextHash::new("Idle", &empty).as_str(), "Idle|none");
    }

    #[test]
    fn test_relevance_partial_credit() {
        let a = ContextHash::new("Idle", &["Arcade", "Claw Machine"]);
        let b = ContextHash::new("Idle", &["Arcade"]);
        // state match 0.5 + 0.5 * (1/2)
        assert!((a.relevance(&b) - 0.75).abs() < 1e-6);

        let c = ContextHash::new("Sitting", &["Arcade"]);
        // state differs, tags 1/2 overlap
        assert!((a.relevance(&c) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_none_never_intersects() {
        let empty: [&str; 0] = [];
        let a = ContextHash::new("Idle", &empty);
        let b = ContextHash::new("Sitting", &empty);
        assert_eq!(a.relevance(&b), 0.0);

        let c = ContextHash::new("Idle", &["Arcade"]);
        assert!((a.relevance(&c) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_relevance_malformed_only_exact() {
        let r = ContextHash::raw("reflection");
        let a = ContextHash::new("Idle", &["Arcade"]);
        assert_eq!(r.relevance(&r.clone()), 1.0);
        assert_eq!(r.relevance(&a), 0.0);
        assert_eq!(a.relevance(&r), 0.0);
    }

    struct FixedWorld(Vec<EntityRef>);

    impl WorldQuery for FixedWorld {
        fn find_nearby(&self, center: Position, radius: f32, tags: &[String]) -> Vec<EntityRef> {
            self.0
                .iter()
                .filter(|e| tags.contains(&e.tag) && e.position.distance(&center) <= radius)
                .cloned()
                .collect()
        }
    }

    #[test]
    fn test_hasher_uses_world_scan() {
        let world = FixedWorld(vec![
            EntityRef::new("arcade_01", "Arcade", Position::new(2.0, 0.0, 0.0)),
            EntityRef::new("chair_01", "Caffee Chair", Position::new(50.0, 0.0, 0.0)),
            EntityRef::new("lamp", "Lamp", Position::new(1.0, 0.0, 0.0)),
        ]);
        let hasher = ContextHasher::new(
            Arc::new(world),
            10.0,
            vec!["Arcade".to_string(), "Caffee Chair".to_string()],
        );
        let snap = hasher.snapshot(FsmState::Idle, Position::default());
        assert_eq!(snap.hash.as_str(), "Idle|Arcade");
        assert_eq!(snap.nearby_labels(), vec!["arcade_01 (Arcade)".to_string()]);
    }
}
