// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Composite Identifiers

use cim_topology::domain::{compose, decompose, EntityId, DELIMITER};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9._-]{0,11}"
}

proptest! {
    /// decompose(compose(parts), len) == parts
    #[test]
    fn prop_compose_decompose_round_trip(parts in prop::collection::vec(segment(), 1..8)) {
        let id = compose(&parts[..]).unwrap();
        prop_assert_eq!(decompose(&id, parts.len()).unwrap(), parts.clone());
        prop_assert_eq!(id.matches(DELIMITER).count(), parts.len() - 1);
    }

    /// Any other expected count is rejected
    #[test]
    fn prop_decompose_rejects_wrong_count(
        parts in prop::collection::vec(segment(), 1..8),
        expected in 1usize..10,
    ) {
        prop_assume!(expected != parts.len());
        let id = compose(&parts[..]).unwrap();
        prop_assert!(decompose(&id, expected).is_err());
    }

    /// A segment containing the delimiter never composes
    #[test]
    fn prop_delimiter_in_segment_rejected(left in segment(), right in segment()) {
        let bad = format!("{}{}{}", left, DELIMITER, right);
        prop_assert!(compose(&[bad.as_str()]).is_err());
    }

    /// Children are descendants of every prefix, never of a sibling
    #[test]
    fn prop_descendant_follows_segments(
        parts in prop::collection::vec(segment(), 2..8),
        other in segment(),
    ) {
        let id = EntityId::from_segments(&parts[..]).unwrap();
        for cut in 1..parts.len() {
            let ancestor = EntityId::from_segments(&parts[..cut]).unwrap();
            prop_assert!(id.is_descendant_of(&ancestor));
        }

        prop_assume!(other != parts[0]);
        let sibling = EntityId::parse(other).unwrap();
        prop_assert!(!id.is_descendant_of(&sibling));
    }
}
