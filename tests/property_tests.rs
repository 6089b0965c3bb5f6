//! Property-based tests using proptest.
//!
//! These exercise the universal invariants of the filter: members never go
//! missing, queries have no side effects, and the lookup-table routing
//! stays a partition of the entry space through arbitrary splits.

use std::collections::HashMap;

use proptest::prelude::*;

use dff::{Dff, DffFg, Status};

/// An operation over a deliberately small key universe, so sequences hit
/// duplicate inserts, colliding fingerprints, and removes of real members.
#[derive(Debug, Clone)]
enum Op {
    Insert(u16),
    Remove(u16),
    Query(u16),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<u16>().prop_map(Op::Insert),
        1 => any::<u16>().prop_map(Op::Remove),
        1 => any::<u16>().prop_map(Op::Query),
    ]
}

/// Replay operations against the filter and a multiset model. Removes are
/// only issued for keys the model still holds, mirroring the deletion
/// contract of fingerprint filters.
fn check_no_false_negatives<const GROWTH: bool>(ops: &[Op]) {
    let mut filter = dff::DynamicFingerprintFilter::<u64, GROWTH>::new(16).unwrap();
    let mut model: HashMap<u16, usize> = HashMap::new();

    for op in ops {
        match *op {
            Op::Insert(key) => {
                if filter.insert(&u64::from(key)) == Status::Ok {
                    *model.entry(key).or_insert(0) += 1;
                }
            }
            Op::Remove(key) => {
                if model.get(&key).copied().unwrap_or(0) > 0 {
                    assert_eq!(filter.remove(&u64::from(key)), Status::Ok);
                    *model.get_mut(&key).unwrap() -= 1;
                }
            }
            Op::Query(key) => {
                if model.get(&key).copied().unwrap_or(0) > 0 {
                    assert_eq!(filter.query(&u64::from(key)), Status::Ok);
                }
            }
        }
    }

    for (&key, &count) in &model {
        if count > 0 {
            assert_eq!(
                filter.query(&u64::from(key)),
                Status::Ok,
                "member {key} went missing"
            );
        }
    }
    assert!(filter.verify_routing());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Inserted-and-not-removed keys always answer `Ok`.
    #[test]
    fn prop_no_false_negatives(ops in prop::collection::vec(arb_op(), 1..1500)) {
        check_no_false_negatives::<false>(&ops);
    }

    /// The same invariant holds for the fingerprint-growth variant.
    #[test]
    fn prop_no_false_negatives_growth(ops in prop::collection::vec(arb_op(), 1..1500)) {
        check_no_false_negatives::<true>(&ops);
    }

    /// Repeating a query returns the same answer and the same counters.
    #[test]
    fn prop_query_is_idempotent(keys in prop::collection::vec(any::<u64>(), 1..500), probe in any::<u64>()) {
        let mut filter = Dff::<u64>::new(16).unwrap();
        for key in &keys {
            prop_assert_eq!(filter.insert(key), Status::Ok);
        }
        let before = filter.len();
        let first = filter.query(&probe);
        let second = filter.query(&probe);
        prop_assert_eq!(first, second);
        prop_assert_eq!(filter.len(), before);
    }

}

// Split-heavy properties insert tens of thousands of keys per case, so they
// run fewer cases.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    /// The lookup table stays a partition of the entry space and the
    /// per-region depth maxima stay consistent through splits.
    #[test]
    fn prop_routing_stays_partitioned(seed in any::<u64>(), n in 20_000usize..80_000) {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

        let mut filter = Dff::<u64>::new(16).unwrap();
        for _ in 0..n {
            let key: u64 = rng.gen();
            prop_assert_eq!(filter.insert(&key), Status::Ok);
        }
        prop_assert!(filter.verify_routing());
    }

    /// Growth-variant splits keep the routing partitioned too.
    #[test]
    fn prop_routing_stays_partitioned_growth(seed in any::<u64>(), n in 20_000usize..80_000) {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

        let mut filter = DffFg::<u64>::new(16).unwrap();
        for _ in 0..n {
            let key: u64 = rng.gen();
            prop_assert_eq!(filter.insert(&key), Status::Ok);
        }
        prop_assert!(filter.verify_routing());
    }
}
