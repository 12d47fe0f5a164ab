//! Property tests for the universal invariants that must hold across any
//! sequence of allocate/deallocate operations.

use proptest::prelude::*;
use segalloc::big::BigObjectAllocator;
use segalloc::chunk::Chunk;
use segalloc::fixed::FixedAllocator;
use segalloc::small::SmallObjectAllocator;

/// Chunk free-list consistency: after any sequence of allocate/deallocate,
/// the stealth list visits exactly `blocks_available` distinct in-range
/// indices. `Chunk::is_corrupt(true)` checks precisely this.
proptest! {
    #[test]
    fn chunk_free_list_always_consistent(ops in prop::collection::vec(prop::bool::ANY, 1..200)) {
        let mut chunk = Chunk::new(8, 32).unwrap();
        let mut outstanding = vec![];
        for alloc in ops {
            if alloc || outstanding.is_empty() {
                if let Some(p) = chunk.allocate() {
                    outstanding.push(p);
                }
            } else {
                let p = outstanding.swap_remove(outstanding.len() - 1);
                chunk.deallocate(p);
            }
            prop_assert!(!chunk.is_corrupt(true));
        }
    }
}

/// At-most-one-empty-chunk: a FixedAllocator never accumulates more than
/// one fully-free chunk, regardless of the alloc/free interleaving.
proptest! {
    #[test]
    fn fixed_allocator_keeps_at_most_one_empty_chunk(
        ops in prop::collection::vec(prop::bool::ANY, 1..500)
    ) {
        let mut fa = FixedAllocator::new(8, 4);
        let mut outstanding = vec![];
        for alloc in ops {
            if alloc || outstanding.is_empty() {
                if let Some(p) = fa.allocate() {
                    outstanding.push(p);
                }
            } else {
                let idx = outstanding.len() - 1;
                let p = outstanding.swap_remove(idx);
                prop_assert!(fa.deallocate(p, None));
            }
            prop_assert!(fa.count_empty_chunks() <= 1);
            prop_assert!(!fa.is_corrupt());
        }
    }
}

/// Ownership closure: every pointer the small-object allocator hands out
/// for an in-range size is claimed by exactly one pool.
proptest! {
    #[test]
    fn small_object_ownership_is_exclusive(sizes in prop::collection::vec(1usize..64, 1..100)) {
        let mut soa = SmallObjectAllocator::new(256, 64, 8);
        let mut live = vec![];
        for n in sizes {
            if let Some(p) = soa.allocate(n, false) {
                live.push((p, n));
            }
        }
        for (p, n) in live {
            soa.deallocate(p, n);
        }
        prop_assert!(!soa.is_corrupt());
    }
}

/// Free-set partition + index mirroring: the big allocator's free list is
/// always pairwise disjoint, non-adjacent, and exactly mirrored by its size
/// index. `is_corrupt` checks both.
proptest! {
    #[test]
    fn big_allocator_free_set_stays_well_formed(
        sizes in prop::collection::vec(1usize..64, 1..40)
    ) {
        let mut big = BigObjectAllocator::new(4096).unwrap();
        let mut live = vec![];
        for n in sizes {
            if let Some(p) = big.allocate(n) {
                live.push((p, n));
            }
            prop_assert!(!big.is_corrupt());
        }
        for (p, n) in live {
            big.deallocate(p, n);
            prop_assert!(!big.is_corrupt());
        }
    }
}

/// Round-trip: allocating then immediately deallocating the same size
/// returns the big allocator to a single whole-region free block.
proptest! {
    #[test]
    fn big_allocator_round_trip_restores_state(n in 1usize..1000) {
        let mut big = BigObjectAllocator::new(4096).unwrap();
        let before = big.free_blocks();
        let p = big.allocate(n).unwrap();
        big.deallocate(p, n);
        prop_assert_eq!(big.free_blocks(), before);
    }
}

/// Coalescing: freeing every allocation made from a fresh region leaves
/// exactly one free block spanning the whole region.
proptest! {
    #[test]
    fn freeing_everything_restores_one_whole_block(
        sizes in prop::collection::vec(1usize..200, 1..20)
    ) {
        let total = 4096;
        let mut big = BigObjectAllocator::new(total).unwrap();
        let mut live = vec![];
        for n in sizes {
            if let Some(p) = big.allocate(n) {
                live.push((p, n));
            } else {
                break;
            }
        }
        for (p, n) in live {
            big.deallocate(p, n);
        }
        prop_assert_eq!(big.free_blocks(), vec![(0, total)]);
    }
}
