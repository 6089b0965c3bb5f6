#![no_main]

use std::collections::HashMap;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use dff::{DynamicFingerprintFilter, Status};

/// One filter operation over a small key universe, so random sequences hit
/// duplicate inserts, fingerprint collisions, and removes of real members.
#[derive(Debug, Arbitrary)]
enum Op {
    Insert(u16),
    Remove(u16),
    Query(u16),
    Compact,
}

fn exercise<const GROWTH: bool>(ops: &[Op]) {
    let mut filter = DynamicFingerprintFilter::<u64, GROWTH>::new(12)
        .expect("12-bit fingerprints are valid");
    let mut model: HashMap<u16, usize> = HashMap::new();
    let mut accepting = true;

    for op in ops {
        match *op {
            Op::Insert(key) => {
                if !accepting {
                    continue;
                }
                match filter.insert(&u64::from(key)) {
                    Status::Ok => *model.entry(key).or_insert(0) += 1,
                    // Overflow without a possible split: stop inserting, as
                    // the API contract demands.
                    Status::NotEnoughSpace | Status::NotSupported => accepting = false,
                    Status::NotFound => unreachable!("insert never reports NotFound"),
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
            Op::Compact => {
                assert_eq!(filter.compact(), Status::Ok);
            }
        }
    }

    for (&key, &count) in &model {
        if count > 0 {
            assert_eq!(filter.query(&u64::from(key)), Status::Ok);
        }
    }
    assert!(filter.verify_routing());
}

fuzz_target!(|ops: Vec<Op>| {
    exercise::<false>(&ops);
    exercise::<true>(&ops);
});
