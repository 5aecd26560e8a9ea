//! Property-Based Tests for the Bounded Cache
//!
//! # Test Properties
//!
//! 1. **Byte Accounting**: `total_bytes` equals the sum of resident sizes after
//!    any sequence of operations
//! 2. **Capacity**: resident count never exceeds capacity
//! 3. **Recency**: the most recently set key is always resident

#![cfg(test)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::lru::BoundedCache;

#[derive(Debug, Clone)]
enum Op {
    Set(u8, u32),
    Get(u8),
    Remove(u8),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0u8..12, 0u32..100_000).prop_map(|(k, s)| Op::Set(k, s)),
        3 => (0u8..12).prop_map(Op::Get),
        1 => (0u8..12).prop_map(Op::Remove),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_total_bytes_matches_resident_sizes(
        capacity in 1usize..6,
        ops in prop::collection::vec(op_strategy(), 1..200),
    ) {
        let mut cache: BoundedCache<u32> = BoundedCache::new(capacity);
        // Shadow of every size ever set, per key; only resident keys are summed.
        let mut sizes: HashMap<String, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Set(k, size) => {
                    let key = format!("k{k}");
                    cache.set(key.clone(), size, size as u64, key.clone());
                    sizes.insert(key.clone(), size as u64);
                    prop_assert!(cache.has(&key));
                }
                Op::Get(k) => {
                    cache.get(&format!("k{k}"));
                }
                Op::Remove(k) => {
                    cache.remove(&format!("k{k}"));
                }
                Op::Clear => cache.clear(),
            }

            let expected: u64 = cache
                .keys_oldest_to_newest()
                .iter()
                .map(|k| sizes[k])
                .sum();
            prop_assert_eq!(cache.total_bytes(), expected);
            prop_assert_eq!(cache.stats().total_bytes, expected);
            prop_assert!(cache.len() <= capacity);
        }
    }

    #[test]
    fn prop_eviction_follows_recency(
        keys in prop::collection::vec(0u8..8, 1..60),
    ) {
        let capacity = 3;
        let mut cache: BoundedCache<u8> = BoundedCache::new(capacity);
        // Reference model: vector ordered oldest to newest.
        let mut model: Vec<String> = Vec::new();

        for k in keys {
            let key = format!("k{k}");
            if k % 2 == 0 && cache.has(&key) {
                cache.get(&key);
            } else {
                cache.set(key.clone(), k, 1, key.clone());
                if model.len() >= capacity && !model.contains(&key) {
                    model.remove(0);
                }
            }
            if let Some(pos) = model.iter().position(|m| m == &key) {
                model.remove(pos);
            }
            if cache.has(&key) {
                model.push(key);
            }
            prop_assert_eq!(cache.keys_oldest_to_newest(), model.clone());
        }
    }
}
