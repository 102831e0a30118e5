#![cfg(test)]

// Property tests for HashTable kept inside the crate so structural
// invariants over raw records can be checked.

use crate::hash_table::{HashTable, InsertError, ResizeMode, MIN_SIZE};
use proptest::prelude::*;
use std::collections::HashMap;

// Entries compare by key only; the payload tracks which insert stored them.
#[derive(Clone, Debug)]
struct Entry {
    key: u16,
    payload: u32,
}

fn entry_eq(a: &Entry, b: &Entry, _: bool) -> bool {
    a.key == b.key
}

type Table = HashTable<Entry, fn(&Entry, &Entry, bool) -> bool>;

#[derive(Clone, Debug)]
enum Op {
    Insert(u16, u32),
    Remove(u16),
    Find(u16),
}

// Few distinct hashes force long runs, tombstones and wrap-around.
fn hash_of(key: u16, spread: u16) -> u32 {
    u32::from(key % spread).wrapping_mul(0x9E37_79B9) | u32::from(key % spread)
}

fn arb_mode() -> impl Strategy<Value = ResizeMode> {
    prop_oneof![
        Just(ResizeMode::Grow),
        Just(ResizeMode::GrowShrink),
        Just(ResizeMode::Disabled),
    ]
}

fn arb_scenario() -> impl Strategy<Value = (ResizeMode, u16, Vec<Op>)> {
    (arb_mode(), 1u16..12, 1u16..40).prop_flat_map(|(mode, spread, keys)| {
        let op = prop_oneof![
            (0..keys, any::<u32>()).prop_map(|(k, p)| Op::Insert(k, p)),
            (0..keys).prop_map(Op::Remove),
            (0..keys).prop_map(Op::Find),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (mode, spread, ops))
    })
}

// Checks the layout invariants every operation must preserve:
// - size is a power of two and at least MIN_SIZE; used + invalid <= size;
// - no never-used slot between a run's index and any of its members;
// - the first member of each run in probe order counts the whole run;
// - tombstones are only left while a never-used slot remains.
fn check_layout(t: &Table) -> Result<(), TestCaseError> {
    let size = t.size() as usize;
    prop_assert!(size.is_power_of_two());
    prop_assert!(t.size() >= MIN_SIZE);
    let live = t.records().iter().filter(|r| r.is_live()).count();
    let tombs = t.records().iter().filter(|r| r.is_tombstone()).count();
    prop_assert_eq!(live, t.len());
    prop_assert_eq!(tombs, t.invalid() as usize);
    prop_assert!(t.len() + t.invalid() as usize <= size);
    if tombs > 0 {
        prop_assert!(live + tombs < size);
    }

    let mask = size - 1;
    let mut run_len: HashMap<usize, i32> = HashMap::new();
    for (i, r) in t.records().iter().enumerate() {
        if !r.is_live() {
            continue;
        }
        let idx = r.hash() as usize & mask;
        *run_len.entry(idx).or_default() += 1;
        let mut j = idx;
        while j != i {
            prop_assert!(t.records()[j].hits() != 0, "gap inside run of slot {}", i);
            j = (j + 1) & mask;
        }
    }
    for (idx, count) in run_len {
        let mut j = idx;
        loop {
            let r = &t.records()[j];
            if r.is_live() && r.hash() as usize & mask == idx {
                prop_assert_eq!(r.hits(), count);
                break;
            }
            j = (j + 1) & mask;
        }
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// - Inserting an existing key fails with AlreadyExists and leaves the stored value.
// - A fixed table only reports TableFull when every slot is live.
// - `find` succeeds iff the key is in the model, with the model's payload.
// - `remove` returns the model's entry or NotFound.
proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((mode, spread, ops) in arb_scenario()) {
        let mut sut: Table = HashTable::new(8, entry_eq as fn(&Entry, &Entry, bool) -> bool, mode);
        let mut model: HashMap<u16, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(k, p) => {
                    let full = sut.len() == sut.size() as usize;
                    match sut.insert(Entry { key: k, payload: p }, hash_of(k, spread)) {
                        Ok(()) => {
                            prop_assert!(!model.contains_key(&k));
                            model.insert(k, p);
                        }
                        Err(InsertError::AlreadyExists(e)) => {
                            prop_assert!(model.contains_key(&k));
                            prop_assert_eq!(e.payload, p);
                        }
                        Err(InsertError::TableFull(_)) => {
                            prop_assert_eq!(mode, ResizeMode::Disabled);
                            prop_assert!(full);
                        }
                    }
                }
                Op::Remove(k) => {
                    let probe = Entry { key: k, payload: 0 };
                    match sut.remove(&probe, hash_of(k, spread)) {
                        Ok(e) => prop_assert_eq!(model.remove(&k), Some(e.payload)),
                        Err(_) => prop_assert!(!model.contains_key(&k)),
                    }
                }
                Op::Find(k) => {
                    let probe = Entry { key: k, payload: 0 };
                    let found = sut.find(&probe, hash_of(k, spread)).map(|e| e.payload);
                    prop_assert_eq!(found, model.get(&k).copied());
                }
            }
            prop_assert_eq!(sut.len(), model.len());
            check_layout(&sut)?;
        }

        let mut keys: Vec<u16> = sut.iter().map(|e| e.key).collect();
        keys.sort_unstable();
        let mut expected: Vec<u16> = model.keys().copied().collect();
        expected.sort_unstable();
        prop_assert_eq!(keys, expected);
    }
}
