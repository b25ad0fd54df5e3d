// Checks `Dict` against `std::collections::HashMap` under random sequences of
// operations interleaved with explicit rehash steps and resizes.

use kvcore::{ConflictKind, Dict, DictError, ResizePolicy};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
enum Op {
    Add(u16, u32),
    Replace(u16, u32),
    Delete(u16),
    Find(u16),
    Rehash(u8),
    Expand(u16),
    Resize,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..512u16, any::<u32>()).prop_map(|(k, v)| Op::Add(k, v)),
        2 => (0..512u16, any::<u32>()).prop_map(|(k, v)| Op::Replace(k, v)),
        3 => (0..512u16).prop_map(Op::Delete),
        3 => (0..512u16).prop_map(Op::Find),
        1 => any::<u8>().prop_map(Op::Rehash),
        1 => (0..2048u16).prop_map(Op::Expand),
        1 => Just(Op::Resize),
    ]
}

fn policy() -> impl Strategy<Value = ResizePolicy> {
    prop_oneof![Just(ResizePolicy::Enable), Just(ResizePolicy::Avoid)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn dict_matches_hashmap(ops in prop::collection::vec(op(), 1..400), policy in policy()) {
        let mut dict = Dict::builder().resize_policy(policy).build();
        let mut model = HashMap::new();

        for op in ops {
            match op {
                Op::Add(k, v) => {
                    let result = dict.add(k, v).map(|e| *e.value());
                    if model.contains_key(&k) {
                        prop_assert_eq!(result, Err(DictError::KeyExists));
                    } else {
                        model.insert(k, v);
                        prop_assert_eq!(result, Ok(v));
                    }
                }
                Op::Replace(k, v) => {
                    let is_new = model.insert(k, v).is_none();
                    prop_assert_eq!(dict.replace(k, v), Ok(is_new));
                }
                Op::Delete(k) => {
                    let expected = match model.remove(&k) {
                        Some(_) => Ok(()),
                        None => Err(DictError::KeyNotFound),
                    };
                    prop_assert_eq!(dict.delete(&k), expected);
                }
                Op::Find(k) => {
                    prop_assert_eq!(dict.fetch_value(&k).copied(), model.get(&k).copied());
                }
                Op::Rehash(n) => {
                    dict.rehash(n as usize);
                }
                Op::Expand(size) => {
                    let size = size as usize;
                    let rehashing = dict.is_rehashing();
                    match dict.expand(size) {
                        Ok(()) => prop_assert!(!rehashing && size >= model.len()),
                        Err(DictError::StructuralConflict(ConflictKind::BelowElementCount)) => {
                            prop_assert!(size < model.len())
                        }
                        Err(DictError::StructuralConflict(_)) => {}
                        Err(e) => prop_assert!(false, "unexpected error {:?}", e),
                    }
                }
                Op::Resize => {
                    let _ = dict.resize();
                }
            }
            prop_assert_eq!(dict.len(), model.len());
            prop_assert_eq!(dict.table_len(0) + dict.table_len(1), model.len());
        }

        let mut keys: Vec<u16> = dict.iter().map(|e| *e.key()).collect();
        keys.sort_unstable();
        let mut expected: Vec<u16> = model.keys().copied().collect();
        expected.sort_unstable();
        prop_assert_eq!(keys, expected);

        dict.set_resize_policy(ResizePolicy::Enable);
        while dict.rehash(100) {}
        prop_assert!(!dict.is_rehashing());
        prop_assert_eq!(dict.rehash_index(), None);
        prop_assert_eq!(dict.table_len(1), 0);
        for (k, v) in &model {
            prop_assert_eq!(dict.fetch_value(k), Some(v));
        }
    }

    #[test]
    fn expand_below_element_count_changes_nothing(n in 5u32..300, shrink_to in 0usize..5) {
        let mut dict = Dict::new();
        for k in 0..n {
            dict.add(k, k).unwrap();
        }
        while dict.rehash(100) {}
        let slots = dict.slots();

        let err = dict.expand(shrink_to).unwrap_err();
        prop_assert_eq!(err, DictError::StructuralConflict(ConflictKind::BelowElementCount));
        prop_assert_eq!(dict.slots(), slots);
        prop_assert!(!dict.is_rehashing());
        prop_assert_eq!(dict.len(), n as usize);
    }

    #[test]
    fn scan_returns_keys_present_throughout(
        n in 1u32..600,
        grow_at in 0usize..40,
        extra in 0u32..400,
    ) {
        let mut dict = Dict::new();
        for k in 0..n {
            dict.add(k, ()).unwrap();
        }

        let mut seen = HashSet::new();
        let mut cursor = 0;
        let mut step = 0;
        loop {
            cursor = dict.scan(cursor, |e| {
                seen.insert(*e.key());
            });
            step += 1;
            if step == grow_at {
                for k in 0..extra {
                    dict.add(1_000_000 + k, ()).unwrap();
                }
            }
            if step == grow_at * 2 + 1 {
                for k in 0..extra {
                    let _ = dict.delete(&(1_000_000 + k));
                }
                let _ = dict.resize();
            }
            dict.rehash(1);
            if cursor == 0 {
                break;
            }
        }

        for k in 0..n {
            prop_assert!(seen.contains(&k), "key {} was not visited", k);
        }
    }
}
