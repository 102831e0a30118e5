// HashTable integration tests.
//
// Each test names the behavior it verifies. Invariants exercised:
// - Runs: the origin slot of a run counts its members in `hits`; other
//   members have `hits == 1`.
// - Presence: find succeeds iff the value is inserted and not removed.
// - Sizing: size is a power of two, never below MIN_SIZE; grows at 75%
//   load, shrinks below 25% once 50% was reached.
use yang_snapshot::{Error, HashTable, InsertError, ResizeMode, MIN_SIZE};

fn id_equal(a: &u32, b: &u32, _: bool) -> bool {
    a == b
}

type IdTable = HashTable<u32, fn(&u32, &u32, bool) -> bool>;

fn table(size: u32, resize: ResizeMode) -> IdTable {
    HashTable::new(size, id_equal as fn(&u32, &u32, bool) -> bool, resize)
}

fn hits(t: &IdTable) -> Vec<i32> {
    t.records().iter().map(|r| r.hits()).collect()
}

// Test: colliding hashes form one run headed by the masked index.
// Assumes: a fixed table of 8 slots.
// Verifies: slot 2 counts five members; later hashes find their own slots.
#[test]
fn collisions_share_a_run() {
    let mut t = table(8, ResizeMode::Disabled);
    let hashes = [2u32, 2, 2, 2, 2, 3, 4, 5];
    for (id, hash) in hashes.iter().enumerate() {
        t.insert(id as u32, *hash).unwrap();
    }
    assert_eq!(t.len(), 8);
    assert_eq!(hits(&t), vec![1, 1, 5, 1, 1, 1, 1, 1]);
    let recs = t.records();
    for slot in 2..=6 {
        assert_eq!(recs[slot].hash(), 2);
    }
    // 3, 4 and 5 start their runs past the end of the first one.
    assert_eq!(recs[7].hash(), 3);
    assert_eq!(recs[0].hash(), 4);
    assert_eq!(recs[1].hash(), 5);
    for (id, hash) in hashes.iter().enumerate() {
        assert_eq!(t.find(&(id as u32), *hash), Some(&(id as u32)));
    }
    assert!(t.find(&99, 2).is_none());
}

// Test: removal inside a full table.
// Assumes: the colliding layout above.
// Verifies: every other value is still found and tombstones are reclaimed
// once no never-used slot is left.
#[test]
fn removal_keeps_runs_searchable() {
    let mut t = table(8, ResizeMode::Disabled);
    let hashes = [2u32, 2, 2, 2, 2, 3, 4, 5];
    for (id, hash) in hashes.iter().enumerate() {
        t.insert(id as u32, *hash).unwrap();
    }
    assert_eq!(t.remove(&1, 2), Ok(1));
    assert_eq!(t.len(), 7);
    assert_eq!(t.invalid(), 0);
    for (id, hash) in hashes.iter().enumerate() {
        let found = t.find(&(id as u32), *hash);
        if id == 1 {
            assert!(found.is_none());
        } else {
            assert_eq!(found, Some(&(id as u32)));
        }
    }
    assert_eq!(t.remove(&1, 2), Err(Error::NotFound));
    assert_eq!(t.remove(&0, 2), Ok(0));
    assert_eq!(t.remove(&7, 5), Ok(7));
    for (id, hash) in hashes.iter().enumerate().skip(2).take(5) {
        assert_eq!(t.find(&(id as u32), *hash), Some(&(id as u32)));
    }
}

// Test: a duplicate is handed back untouched.
#[test]
fn duplicate_returned_to_caller() {
    let mut t = table(8, ResizeMode::Grow);
    t.insert(10, 3).unwrap();
    match t.insert(10, 3) {
        Err(InsertError::AlreadyExists(v)) => assert_eq!(v, 10),
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(t.len(), 1);
}

// Test: growth and shrinking thresholds.
// Verifies: size doubles on the insert reaching 75% and halves once load
// drops below 25%, never below MIN_SIZE.
#[test]
fn grow_then_shrink() {
    let mut t = table(8, ResizeMode::GrowShrink);
    for i in 0..5u32 {
        t.insert(i, i).unwrap();
    }
    assert_eq!(t.size(), 8);
    t.insert(5, 5).unwrap();
    assert_eq!(t.size(), 16);
    assert!(t.size().is_power_of_two());

    t.remove(&0, 0).unwrap();
    t.remove(&1, 1).unwrap();
    assert_eq!(t.size(), 16);
    t.remove(&2, 2).unwrap();
    assert_eq!(t.size(), 8);
    for i in 3..6u32 {
        assert_eq!(t.find(&i, i), Some(&i));
    }
    t.remove(&3, 3).unwrap();
    t.remove(&4, 4).unwrap();
    t.remove(&5, 5).unwrap();
    assert_eq!(t.size(), MIN_SIZE);
    assert!(t.is_empty());
}

// Test: the equality callback receives the removal flag.
#[test]
fn callback_sees_remove_flag() {
    let mut t = HashTable::new(
        8,
        |a: &(u32, u32), b: &(u32, u32), removing: bool| {
            if removing {
                a == b
            } else {
                a.0 == b.0
            }
        },
        ResizeMode::Grow,
    );
    t.insert((1, 100), 7).unwrap();
    assert_eq!(t.find(&(1, 0), 7), Some(&(1, 100)));
    assert_eq!(t.remove(&(1, 0), 7), Err(Error::NotFound));
    assert_eq!(t.remove(&(1, 100), 7), Ok((1, 100)));
}
