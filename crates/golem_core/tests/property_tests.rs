//! Property-based tests for context hashing and relevance.
//!
//! Relevance drives memory retrieval ranking, so it must be reflexive,
//! symmetric, and bounded for any pair of hashes, including hand-written keys.

use golem_core::ContextHash;
use proptest::prelude::*;

fn state() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["Idle", "Moving", "Sitting", "Playing"]).prop_map(String::from)
}

fn tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(vec!["Arcade", "Caffee Chair", "Claw Machine", "InterestPoint"])
            .prop_map(String::from),
        0..4,
    )
}

fn hash() -> impl Strategy<Value = ContextHash> {
    prop_oneof![
        4 => (state(), tags()).prop_map(|(s, t)| ContextHash::new(&s, &t)),
        1 => "\\PC{0,24}".prop_map(ContextHash::raw),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// **Reflexivity**: every hash is fully relevant to itself.
    #[test]
    fn relevance_reflexive(h in hash()) {
        prop_assert_eq!(h.relevance(&h), 1.0);
    }

    /// **Symmetry**: relevance(a, b) == relevance(b, a).
    #[test]
    fn relevance_symmetric(a in hash(), b in hash()) {
        prop_assert_eq!(a.relevance(&b), b.relevance(&a));
    }

    /// **Bounded**: relevance is always within [0, 1].
    #[test]
    fn relevance_bounded(a in hash(), b in hash()) {
        let r = a.relevance(&b);
        prop_assert!((0.0..=1.0).contains(&r), "relevance {} out of range", r);
    }

    /// **Order independence**: shuffling the nearby tags never changes the hash.
    #[test]
    fn hash_order_independent(s in state(), mut t in tags()) {
        let a = ContextHash::new(&s, &t);
        t.reverse();
        let b = ContextHash::new(&s, &t);
        prop_assert_eq!(a, b);
    }
}
