// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnet Allocation
//!
//! Existing children are built by allocating from the parent itself, so
//! every generated layout is one the registry could actually hold.

use cim_topology::allocator::{allocate, Candidates};
use cim_topology::domain::Cidr;
use proptest::prelude::*;

fn parent() -> Cidr {
    Cidr::new("10.0.0.0/16").unwrap()
}

/// Children produced by a sequence of allocations with mixed sizes
fn layout(sizes: &[u8]) -> Vec<Cidr> {
    let parent = parent();
    let mut children = Vec::new();
    for bits in sizes {
        if let Ok(block) = allocate(&parent, &children, *bits) {
            children.push(block);
        }
    }
    children
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The result depends on the set of children, not their order
    #[test]
    fn prop_allocation_ignores_input_order(
        sizes in prop::collection::vec(1u8..10, 0..20),
        bits in 1u8..10,
        seed in any::<u64>(),
    ) {
        let children = layout(&sizes);
        let mut shuffled = children.clone();
        let len = shuffled.len();
        if len > 1 {
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();
        }

        prop_assert_eq!(
            allocate(&parent(), &children, bits),
            allocate(&parent(), &shuffled, bits)
        );
    }

    /// A successful allocation lies in the parent, overlaps nothing, and no
    /// lower block of the same size was free
    #[test]
    fn prop_allocation_is_lowest_free_block(
        sizes in prop::collection::vec(1u8..10, 0..20),
        bits in 1u8..10,
    ) {
        let children = layout(&sizes);
        if let Ok(block) = allocate(&parent(), &children, bits) {
            prop_assert!(parent().contains(&block));
            prop_assert_eq!(block.prefix_length(), 16 + bits);
            prop_assert!(children.iter().all(|c| !c.overlaps(&block)));

            let candidates = Candidates::new(parent(), 16 + bits).unwrap();
            for lower in candidates.take_while(|c| c.first() < block.first()) {
                prop_assert!(children.iter().any(|c| c.overlaps(&lower)));
            }
        }
    }

    /// Layouts built by repeated allocation stay pairwise disjoint
    #[test]
    fn prop_allocated_children_disjoint(sizes in prop::collection::vec(0u8..10, 0..24)) {
        let children = layout(&sizes);
        for (i, a) in children.iter().enumerate() {
            for b in &children[i + 1..] {
                prop_assert!(!a.overlaps(b));
            }
        }
    }
}
