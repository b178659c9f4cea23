use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use crate::{
    compactmap::{CompactMap, MAX_FREE},
    intset::IntSet,
};

#[derive(Debug, Clone)]
enum SetOp {
    Add(i64),
    Remove(i64),
}

#[derive(Debug, Clone)]
enum MapOp {
    Set(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

fn int_strategy() -> impl Strategy<Value = i64> {
    prop_oneof![
        -40_i64..40,
        (i16::MIN as i64 - 10)..(i16::MAX as i64 + 10),
        (i32::MIN as i64 - 10)..(i32::MAX as i64 + 10),
        any::<i64>(),
    ]
}

fn set_op_strategy() -> impl Strategy<Value = SetOp> {
    prop_oneof![
        3 => int_strategy().prop_map(SetOp::Add),
        2 => int_strategy().prop_map(SetOp::Remove),
    ]
}

fn bytes_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        8 => proptest::collection::vec(any::<u8>(), 0..12),
        1 => proptest::collection::vec(any::<u8>(), 250..300),
    ]
}

fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    // A small key space so that overwrites and deletes hit.
    let key = proptest::collection::vec(b'a'..b'e', 1..3);
    prop_oneof![
        3 => (key.clone(), bytes_strategy()).prop_map(|(k, v)| MapOp::Set(k, v)),
        1 => key.prop_map(MapOp::Delete),
    ]
}

fn check_set(s: &IntSet) {
    let members: Vec<_> = s.iter().collect();
    for pair in members.windows(2) {
        assert!(pair[0] < pair[1], "members out of order: {:?}", members);
    }
    assert_eq!(members.len(), s.len() as usize);
    assert_eq!(s.byte_size(), 8 + members.len() * s.width().bytes());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn intset_matches_model(ops in proptest::collection::vec(set_op_strategy(), 0..200)) {
        let mut s = IntSet::new();
        let mut model = BTreeSet::new();
        let mut width = s.width();
        for op in ops {
            match op {
                SetOp::Add(v) => {
                    let (next, inserted) = s.add(v);
                    s = next;
                    prop_assert_eq!(inserted, model.insert(v));
                    prop_assert!(s.contains(v));
                }
                SetOp::Remove(v) => {
                    let (next, removed) = s.remove(v);
                    s = next;
                    prop_assert_eq!(removed, model.remove(&v));
                    prop_assert!(!s.contains(v));
                }
            }
            prop_assert!(s.width() >= width);
            width = s.width();
            check_set(&s);
        }
        prop_assert_eq!(s.iter().collect::<Vec<_>>(), model.into_iter().collect::<Vec<_>>());
        prop_assert_eq!(IntSet::from_bytes(s.as_bytes().to_vec()).unwrap(), s);
    }

    #[test]
    fn intset_second_add_is_noop(values in proptest::collection::vec(int_strategy(), 0..50), v in int_strategy()) {
        let s = values.into_iter().fold(IntSet::new(), |s, x| s.add(x).0);
        let (once, _) = s.add(v);
        let len = once.len();
        let (twice, inserted) = once.add(v);
        prop_assert!(!inserted);
        prop_assert_eq!(twice.len(), len);
    }

    #[test]
    fn compactmap_matches_model(ops in proptest::collection::vec(map_op_strategy(), 0..150)) {
        let mut m = CompactMap::new();
        let mut model: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for op in ops {
            match op {
                MapOp::Set(k, v) => {
                    let len_before = model.len();
                    let (next, existed) = m.set(&k, &v);
                    m = next;
                    let was_there = model.insert(k.clone(), v.clone()).is_some();
                    prop_assert_eq!(existed, was_there);
                    if existed {
                        prop_assert_eq!(m.len() as usize, len_before);
                    }
                    prop_assert_eq!(m.get(&k), Some(v.as_slice()));
                    prop_assert!((m.free_bytes(&k).unwrap() as usize) < MAX_FREE);
                }
                MapOp::Delete(k) => {
                    let (next, deleted) = m.delete(&k);
                    m = next;
                    prop_assert_eq!(deleted, model.remove(&k).is_some());
                    prop_assert!(!m.exists(&k));
                }
            }
            prop_assert_eq!(m.len() as usize, model.len());
            prop_assert_eq!(m.byte_size(), m.as_bytes().len());
        }

        let mut seen: HashMap<Vec<u8>, Vec<u8>> = HashMap::new();
        for (k, v) in m.iter() {
            prop_assert!(seen.insert(k.to_vec(), v.to_vec()).is_none());
        }
        prop_assert_eq!(seen, model);
        prop_assert!(CompactMap::from_bytes(m.into_bytes()).is_ok());
    }
}
