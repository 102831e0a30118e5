//! HashTable: open addressing with linear probing and per-run hit counts.
//!
//! Records whose hashes share the same masked index form a "run". The first
//! member of a run in probe order (its origin) counts the members in `hits`;
//! the other members have `hits == 1`. Removed records become tombstones
//! (`hits == -1`) unless the following slot was never used, in which case the
//! slot and any tombstones directly before it are reset to `hits == 0`.
//! No never-used slot ever lies between a run's masked index and one of its
//! members, so probing for a run stops at the first never-used slot.

use crate::error::{Error, Result};
use core::fmt;

/// Smallest table size; tables never shrink below it.
pub const MIN_SIZE: u32 = 8;
const ENLARGE_PERCENTAGE: u32 = 75;
const FIRST_SHRINK_PERCENTAGE: u32 = 50;
const SHRINK_PERCENTAGE: u32 = 25;
const REHASH_PERCENTAGE: u32 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ResizeMode {
    /// Fixed size; inserts fail once every slot is live.
    Disabled,
    /// Doubles at 75% load, never shrinks.
    Grow,
    /// Doubles at 75% load; once 50% load was reached, halves below 25%.
    GrowShrink,
}

#[derive(Clone, Debug)]
pub struct HashRecord<T> {
    hash: u32,
    hits: i32,
    value: Option<T>,
}

impl<T> HashRecord<T> {
    fn vacant() -> Self {
        Self {
            hash: 0,
            hits: 0,
            value: None,
        }
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Run length on a run origin, `1` on other members, `-1` on a tombstone
    /// and `0` on a slot never used since the last rehash.
    pub fn hits(&self) -> i32 {
        self.hits
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_live(&self) -> bool {
        self.hits > 0
    }

    pub fn is_tombstone(&self) -> bool {
        self.hits < 0
    }
}

/// Failed insert; the value is handed back.
#[derive(Debug)]
pub enum InsertError<T> {
    AlreadyExists(T),
    TableFull(T),
}

impl<T> InsertError<T> {
    pub fn into_value(self) -> T {
        match self {
            InsertError::AlreadyExists(v) | InsertError::TableFull(v) => v,
        }
    }
}

impl<T> From<InsertError<T>> for Error {
    fn from(e: InsertError<T>) -> Self {
        match e {
            InsertError::AlreadyExists(_) => Error::AlreadyExists,
            InsertError::TableFull(_) => Error::InvalidArgument("hash table is full"),
        }
    }
}

enum Probe {
    Found(usize),
    /// Where a record would go; `None` when no slot is free.
    Vacant(Option<usize>),
}

/// Open-addressing table over caller-defined values.
///
/// `equal(a, b, modifying)` decides value equality. `modifying` is true when
/// called from `insert` or `remove`, false from `find`.
#[derive(Clone)]
pub struct HashTable<T, E> {
    records: Vec<HashRecord<T>>,
    used: u32,
    invalid: u32,
    resize: ResizeMode,
    shrink_armed: bool,
    equal: E,
}

impl<T, E> HashTable<T, E>
where
    E: Fn(&T, &T, bool) -> bool,
{
    /// `size` is rounded up to a power of two and to at least [`MIN_SIZE`].
    pub fn new(size: u32, equal: E, resize: ResizeMode) -> Self {
        let size = size.max(MIN_SIZE).next_power_of_two();
        Self {
            records: (0..size).map(|_| HashRecord::vacant()).collect(),
            used: 0,
            invalid: 0,
            resize,
            shrink_armed: false,
            equal,
        }
    }

    /// Size of a fixed table that holds `count` records with room to spare.
    pub fn fixed_size(count: u32) -> u32 {
        let bits = u32::BITS - count.leading_zeros();
        1u32.checked_shl(bits).unwrap_or(1 << 31).max(MIN_SIZE)
    }

    pub fn len(&self) -> usize {
        self.used as usize
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn size(&self) -> u32 {
        self.records.len() as u32
    }

    pub fn invalid(&self) -> u32 {
        self.invalid
    }

    pub fn resize_mode(&self) -> ResizeMode {
        self.resize
    }

    /// Bytes one record occupies in memory.
    pub fn rec_size(&self) -> usize {
        core::mem::size_of::<HashRecord<T>>()
    }

    /// All slots in index order.
    pub fn records(&self) -> &[HashRecord<T>] {
        &self.records
    }

    /// Live values in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.records.iter().filter_map(|r| r.value.as_ref())
    }

    /// Replaces the equality callback, returning the previous one.
    pub fn set_equal(&mut self, equal: E) -> E {
        core::mem::replace(&mut self.equal, equal)
    }

    fn mask(&self) -> usize {
        self.records.len() - 1
    }

    fn first_of_run(&self, hash: u32) -> Probe {
        let mask = self.mask();
        let idx = hash as usize & mask;
        let mut i = idx;
        let mut tombstone = None;
        loop {
            let rec = &self.records[i];
            if rec.hits == 0 {
                return Probe::Vacant(tombstone.or(Some(i)));
            }
            if rec.hits > 0 && rec.hash as usize & mask == idx {
                return Probe::Found(i);
            }
            if rec.hits < 0 && tombstone.is_none() {
                tombstone = Some(i);
            }
            i = (i + 1) & mask;
            if i == idx {
                return Probe::Vacant(tombstone);
            }
        }
    }

    /// Next member of the run after `last`, or the slot a new member takes.
    /// Slots from the run's index up to its origin never take a member.
    fn next_of_run(&self, last: usize, first: usize) -> Probe {
        let mask = self.mask();
        let idx = self.records[last].hash as usize & mask;
        let mut i = last;
        let mut tombstone = None;
        loop {
            i = (i + 1) & mask;
            if i == idx || i == first {
                return Probe::Vacant(tombstone);
            }
            let rec = &self.records[i];
            if rec.hits == 0 {
                return Probe::Vacant(tombstone.or(Some(i)));
            }
            if rec.hits > 0 && rec.hash as usize & mask == idx {
                return Probe::Found(i);
            }
            if rec.hits < 0 && tombstone.is_none() {
                tombstone = Some(i);
            }
        }
    }

    /// Walks the run starting at `first`. Returns the first matching slot and
    /// the last slot visited (the last member unless stopped on a match).
    fn scan_run<F>(&self, first: usize, mut is_match: F, stop_on_match: bool) -> (Option<usize>, usize)
    where
        F: FnMut(&HashRecord<T>) -> bool,
    {
        let mut cur = first;
        let mut found = None;
        if is_match(&self.records[first]) {
            found = Some(first);
            if stop_on_match {
                return (found, cur);
            }
        }
        for _ in 1..self.records[first].hits {
            match self.next_of_run(cur, first) {
                Probe::Found(i) => cur = i,
                Probe::Vacant(_) => unreachable!("run shorter than its hit count"),
            }
            if found.is_none() && is_match(&self.records[cur]) {
                found = Some(cur);
                if stop_on_match {
                    break;
                }
            }
        }
        (found, cur)
    }

    fn slot_of<F>(&self, hash: u32, mut is_match: F) -> Option<usize>
    where
        F: FnMut(&T) -> bool,
    {
        match self.first_of_run(hash) {
            Probe::Found(first) => {
                self.scan_run(
                    first,
                    |r| r.hash == hash && r.value.as_ref().map_or(false, &mut is_match),
                    true,
                )
                .0
            }
            Probe::Vacant(_) => None,
        }
    }

    pub fn find(&self, value: &T, hash: u32) -> Option<&T> {
        self.find_with(hash, |v| (self.equal)(value, v, false))
    }

    /// Finds with a caller-provided predicate instead of the table callback.
    pub fn find_with<F>(&self, hash: u32, is_match: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        let slot = self.slot_of(hash, is_match)?;
        self.records[slot].value.as_ref()
    }

    /// Next value equal to `value` stored after `last` in the same run.
    /// `last` must be a reference returned by an earlier lookup.
    pub fn find_next(&self, value: &T, hash: u32, last: &T) -> Option<&T> {
        self.find_next_with(hash, last, |v| (self.equal)(value, v, false))
    }

    /// [`find_next`](HashTable::find_next) with a caller-provided predicate.
    pub fn find_next_with<F>(&self, hash: u32, last: &T, mut is_match: F) -> Option<&T>
    where
        F: FnMut(&T) -> bool,
    {
        let Probe::Found(first) = self.first_of_run(hash) else {
            return None;
        };
        let mut passed = false;
        let (found, _) = self.scan_run(
            first,
            |r| {
                let Some(v) = r.value.as_ref() else {
                    return false;
                };
                if passed {
                    return r.hash == hash && is_match(v);
                }
                passed = core::ptr::eq(v, last);
                false
            },
            true,
        );
        self.records[found?].value.as_ref()
    }

    pub fn find_mut(&mut self, value: &T, hash: u32) -> Option<&mut T> {
        let slot = self.slot_of(hash, |v| (self.equal)(value, v, false))?;
        self.records[slot].value.as_mut()
    }

    pub fn find_with_mut<F>(&mut self, hash: u32, is_match: F) -> Option<&mut T>
    where
        F: FnMut(&T) -> bool,
    {
        let slot = self.slot_of(hash, is_match)?;
        self.records[slot].value.as_mut()
    }

    pub fn insert(&mut self, value: T, hash: u32) -> Result<(), InsertError<T>> {
        self.insert_inner(value, hash, true)
    }

    /// Inserts without looking for an equal value, so equal values may be
    /// stored side by side in one run. Walk them with [`find_next`].
    ///
    /// [`find_next`]: HashTable::find_next
    pub fn insert_no_check(&mut self, value: T, hash: u32) -> Result<(), InsertError<T>> {
        self.insert_inner(value, hash, false)
    }

    fn insert_inner(&mut self, value: T, hash: u32, check: bool) -> Result<(), InsertError<T>> {
        let (slot, first) = match self.first_of_run(hash) {
            Probe::Found(first) => {
                let (dup, last) = self.scan_run(
                    first,
                    |r| {
                        check
                            && r.hash == hash
                            && r.value.as_ref().map_or(false, |v| (self.equal)(&value, v, true))
                    },
                    true,
                );
                if dup.is_some() {
                    return Err(InsertError::AlreadyExists(value));
                }
                match self.next_of_run(last, first) {
                    Probe::Vacant(None) => (self.tombstone_after(first), Some(first)),
                    Probe::Vacant(slot) => (slot, Some(first)),
                    Probe::Found(_) => unreachable!("run longer than its hit count"),
                }
            }
            Probe::Vacant(slot) => (slot, None),
        };
        let Some(slot) = slot else {
            return Err(InsertError::TableFull(value));
        };
        self.place(slot, first, value, hash);

        if self.resize != ResizeMode::Disabled {
            let r = self.used * 100 / self.size();
            if self.resize == ResizeMode::GrowShrink && r >= FIRST_SHRINK_PERCENTAGE {
                self.shrink_armed = true;
            }
            if r >= ENLARGE_PERCENTAGE {
                self.rehash(self.size() << 1);
            }
        }
        self.rehash_if_worn();
        Ok(())
    }

    /// Tombstones never outlive the last never-used slot.
    fn rehash_if_worn(&mut self) {
        let never_used = self.size() - self.used - self.invalid;
        if self.invalid > 0 && never_used * 100 / self.size() < REHASH_PERCENTAGE {
            self.rehash(self.size());
        }
    }

    /// With no never-used slot left, a tombstone after the run origin still
    /// takes a new member.
    fn tombstone_after(&self, first: usize) -> Option<usize> {
        let mask = self.mask();
        let idx = self.records[first].hash as usize & mask;
        let mut i = (first + 1) & mask;
        while i != idx && i != first {
            if self.records[i].hits < 0 {
                return Some(i);
            }
            i = (i + 1) & mask;
        }
        None
    }

    fn place(&mut self, slot: usize, first: Option<usize>, value: T, hash: u32) {
        let rec = &mut self.records[slot];
        debug_assert!(rec.hits < 1);
        if rec.hits < 0 {
            self.invalid -= 1;
        }
        rec.hash = hash;
        rec.hits = 1;
        rec.value = Some(value);
        if let Some(first) = first {
            self.records[first].hits += 1;
        }
        self.used += 1;
    }

    pub fn remove(&mut self, value: &T, hash: u32) -> Result<T> {
        let located = self.locate_for_remove(hash, |v| (self.equal)(value, v, true));
        self.remove_located(located, hash)
    }

    /// Removes the record matched by a caller-provided predicate.
    pub fn remove_with<F>(&mut self, hash: u32, is_match: F) -> Result<T>
    where
        F: FnMut(&T) -> bool,
    {
        let located = self.locate_for_remove(hash, is_match);
        self.remove_located(located, hash)
    }

    /// `(run origin, matching slot, last member)`.
    fn locate_for_remove<F>(&self, hash: u32, mut is_match: F) -> Option<(usize, usize, usize)>
    where
        F: FnMut(&T) -> bool,
    {
        let Probe::Found(first) = self.first_of_run(hash) else {
            return None;
        };
        let (found, last) = self.scan_run(
            first,
            |r| r.hash == hash && r.value.as_ref().map_or(false, &mut is_match),
            false,
        );
        found.map(|slot| (first, slot, last))
    }

    fn remove_located(&mut self, located: Option<(usize, usize, usize)>, hash: u32) -> Result<T> {
        let Some((first, slot, last)) = located else {
            log::debug!("Invalid argument hash {:#x} (remove).", hash);
            return Err(Error::NotFound);
        };
        let value = if slot != first {
            self.records[first].hits -= 1;
            self.vacate(slot)
        } else if last != first {
            // Move the last member into the origin so the run keeps its head.
            let hits = self.records[first].hits - 1;
            let moved_hash = self.records[last].hash;
            let moved = self.records[last].value.take();
            self.vacate(last);
            let origin = &mut self.records[first];
            origin.hash = moved_hash;
            origin.hits = hits;
            core::mem::replace(&mut origin.value, moved)
        } else {
            self.vacate(slot)
        };
        self.used -= 1;

        if self.resize == ResizeMode::GrowShrink && self.shrink_armed {
            let r = self.used * 100 / self.size();
            if r < SHRINK_PERCENTAGE && self.size() > MIN_SIZE {
                self.rehash(self.size() >> 1);
            }
        }
        self.rehash_if_worn();
        Ok(value.expect("located record is live"))
    }

    /// Frees one slot, returning whatever value it still held.
    fn vacate(&mut self, slot: usize) -> Option<T> {
        let mask = self.mask();
        let value = self.records[slot].value.take();
        if self.records[(slot + 1) & mask].hits != 0 {
            self.records[slot].hits = -1;
            self.invalid += 1;
            return value;
        }
        self.records[slot].hits = 0;
        let mut i = slot;
        loop {
            i = (i + mask) & mask;
            if i == slot || self.records[i].hits != -1 {
                break;
            }
            self.records[i].hits = 0;
            self.invalid -= 1;
        }
        value
    }

    /// Re-places every live record into `new_size` fresh slots.
    fn rehash(&mut self, new_size: u32) {
        log::debug!(
            "Hash table rehash: size {} -> {}, {} live, {} tombstones.",
            self.size(),
            new_size,
            self.used,
            self.invalid
        );
        let old = core::mem::replace(
            &mut self.records,
            (0..new_size).map(|_| HashRecord::vacant()).collect(),
        );
        self.used = 0;
        self.invalid = 0;
        for rec in old {
            if rec.hits <= 0 {
                continue;
            }
            let Some(value) = rec.value else { continue };
            let (slot, first) = match self.first_of_run(rec.hash) {
                Probe::Found(first) => {
                    let (_, last) = self.scan_run(first, |_| false, false);
                    match self.next_of_run(last, first) {
                        Probe::Vacant(slot) => (slot, Some(first)),
                        Probe::Found(_) => unreachable!("run longer than its hit count"),
                    }
                }
                Probe::Vacant(slot) => (slot, None),
            };
            let slot = slot.expect("rehashed table has room for every live record");
            self.place(slot, first, value, rec.hash);
        }
    }
}

impl<T, E> fmt::Debug for HashTable<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashTable")
            .field("size", &self.records.len())
            .field("used", &self.used)
            .field("invalid", &self.invalid)
            .field("resize", &self.resize)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq_u32(a: &u32, b: &u32, _: bool) -> bool {
        a == b
    }

    type Table = HashTable<u32, fn(&u32, &u32, bool) -> bool>;

    fn table(size: u32, resize: ResizeMode) -> Table {
        HashTable::new(size, eq_u32 as fn(&u32, &u32, bool) -> bool, resize)
    }

    fn hits(t: &Table) -> Vec<i32> {
        t.records().iter().map(|r| r.hits()).collect()
    }

    /// Invariant: sizes are powers of two and never below MIN_SIZE.
    #[test]
    fn new_rounds_size() {
        assert_eq!(table(0, ResizeMode::Grow).size(), 8);
        assert_eq!(table(9, ResizeMode::Grow).size(), 16);
        assert_eq!(table(64, ResizeMode::Grow).size(), 64);
    }

    /// Invariant: colliding hashes extend one run; the origin counts members.
    #[test]
    fn collisions_extend_run() {
        let mut t = table(8, ResizeMode::Disabled);
        for v in 2..6 {
            t.insert(v, 2).unwrap();
        }
        assert_eq!(hits(&t), vec![0, 0, 4, 1, 1, 1, 0, 0]);
        for v in 2..6 {
            assert_eq!(t.find(&v, 2), Some(&v));
        }
        assert!(t.find(&6, 2).is_none());
    }

    /// Invariant: removing a middle member leaves a tombstone; removing the
    /// origin moves the last member in, and trailing tombstones are reclaimed.
    #[test]
    fn remove_from_run() {
        let mut t = table(8, ResizeMode::Disabled);
        for v in 2..6 {
            t.insert(v, 2).unwrap();
        }
        assert_eq!(t.remove(&4, 2).unwrap(), 4);
        assert_eq!(hits(&t), vec![0, 0, 3, 1, -1, 1, 0, 0]);
        assert_eq!(t.invalid(), 1);

        assert_eq!(t.remove(&2, 2).unwrap(), 2);
        assert_eq!(hits(&t), vec![0, 0, 2, 1, 0, 0, 0, 0]);
        assert_eq!(t.records()[2].value(), Some(&5));
        assert_eq!(t.records()[3].value(), Some(&3));
        assert_eq!(t.invalid(), 0);

        assert!(t.find(&2, 2).is_none());
        assert!(t.find(&4, 2).is_none());
        assert_eq!(t.find(&3, 2), Some(&3));
        assert_eq!(t.find(&5, 2), Some(&5));

        t.remove(&3, 2).unwrap();
        t.remove(&5, 2).unwrap();
        assert_eq!(hits(&t), vec![0; 8]);
        assert!(t.is_empty());
    }

    /// Invariant: duplicates are rejected without mutation and the value comes back.
    #[test]
    fn duplicate_insert_rejected() {
        let mut t = table(8, ResizeMode::Grow);
        t.insert(7, 7).unwrap();
        match t.insert(7, 7) {
            Err(InsertError::AlreadyExists(v)) => assert_eq!(v, 7),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(t.len(), 1);
        assert_eq!(hits(&t)[7], 1);
    }

    /// Invariant: missing values report NotFound.
    #[test]
    fn remove_missing() {
        let mut t = table(8, ResizeMode::Grow);
        t.insert(1, 1).unwrap();
        assert_eq!(t.remove(&2, 2), Err(Error::NotFound));
        assert_eq!(t.remove(&9, 1), Err(Error::NotFound));
        assert_eq!(t.len(), 1);
    }

    /// Invariant: growth at 75% load, shrink below 25% once armed, never below MIN_SIZE.
    #[test]
    fn grow_and_shrink() {
        let mut t = table(8, ResizeMode::GrowShrink);
        for v in 2..8 {
            t.insert(v, v).unwrap();
        }
        assert_eq!(t.size(), 16);
        for (i, r) in t.records().iter().enumerate() {
            if (2..8).contains(&i) {
                assert_eq!(r.hits(), 1);
                assert_eq!(r.hash(), i as u32);
            } else {
                assert_eq!(r.hits(), 0);
            }
        }
        for v in 0..2 {
            assert_eq!(t.remove(&v, v), Err(Error::NotFound));
        }
        for v in 2..5 {
            t.remove(&v, v).unwrap();
        }
        assert_eq!(t.size(), 8);
        for v in 5..8 {
            t.remove(&v, v).unwrap();
        }
        assert_eq!(t.size(), 8);
        for v in 0..8 {
            assert!(t.find(&v, v).is_none());
        }
    }

    /// Invariant: Grow mode never shrinks.
    #[test]
    fn grow_only_keeps_size() {
        let mut t = table(8, ResizeMode::Grow);
        for v in 0..6 {
            t.insert(v, v).unwrap();
        }
        assert_eq!(t.size(), 16);
        for v in 0..6 {
            t.remove(&v, v).unwrap();
        }
        assert_eq!(t.size(), 16);
    }

    /// Invariant: a fixed table reports full, and a removal that leaves no
    /// never-used slot triggers a same-size rehash dropping the tombstone.
    #[test]
    fn fixed_table_full_and_rehash() {
        let mut t = table(8, ResizeMode::Disabled);
        for v in 0..8 {
            t.insert(v, v).unwrap();
        }
        match t.insert(8, 8) {
            Err(InsertError::TableFull(v)) => assert_eq!(v, 8),
            other => panic!("unexpected result: {:?}", other),
        }
        t.remove(&3, 3).unwrap();
        assert_eq!(t.size(), 8);
        assert_eq!(t.invalid(), 0);
        assert_eq!(t.records()[3].hits(), 0);
        for v in (0..8).filter(|v| *v != 3) {
            assert_eq!(t.find(&v, v), Some(&v));
        }
    }

    /// Invariant: filling the last never-used slot clears tombstones, so a
    /// later member never lands ahead of its run origin.
    #[test]
    fn last_never_used_slot_clears_tombstones() {
        let mut t = table(8, ResizeMode::Disabled);
        t.insert(5, 5).unwrap();
        t.insert(13, 5).unwrap();
        t.insert(22, 6).unwrap();
        t.remove(&13, 5).unwrap();
        assert_eq!(hits(&t), vec![0, 0, 0, 0, 0, 1, -1, 1]);

        for v in 0..5 {
            t.insert(v, v).unwrap();
        }
        assert_eq!(t.invalid(), 0);
        assert_eq!(hits(&t), vec![1, 1, 1, 1, 1, 1, 1, 0]);
        assert_eq!(t.records()[6].value(), Some(&22));

        t.insert(14, 6).unwrap();
        assert_eq!(t.records()[6].hits(), 2);
        assert_eq!(t.find(&22, 6), Some(&22));
        assert_eq!(t.find(&14, 6), Some(&14));
        for v in 0..6 {
            assert_eq!(t.find(&v, v), Some(&v));
        }
    }

    /// Invariant: equal values stored without the duplicate check are found
    /// one after another, in run order.
    #[test]
    fn equal_values_walked_with_find_next() {
        type Pairs = HashTable<(u32, u32), fn(&(u32, u32), &(u32, u32), bool) -> bool>;
        fn by_key(a: &(u32, u32), b: &(u32, u32), _: bool) -> bool {
            a.0 == b.0
        }
        let mut t: Pairs = HashTable::new(
            8,
            by_key as fn(&(u32, u32), &(u32, u32), bool) -> bool,
            ResizeMode::Grow,
        );
        t.insert_no_check((1, 10), 3).unwrap();
        t.insert_no_check((9, 90), 3).unwrap();
        t.insert_no_check((1, 11), 3).unwrap();
        t.insert_no_check((1, 12), 3).unwrap();
        assert!(matches!(t.insert((1, 13), 3), Err(InsertError::AlreadyExists(_))));
        assert_eq!(t.len(), 4);
        assert_eq!(t.records()[3].hits(), 4);

        let key = (1, 0);
        let mut seen = Vec::new();
        let mut cur = t.find(&key, 3);
        while let Some(v) = cur {
            seen.push(v.1);
            cur = t.find_next(&key, 3, v);
        }
        assert_eq!(seen, vec![10, 11, 12]);

        let nine = t.find(&(9, 0), 3).unwrap();
        assert!(t.find_next(&(9, 0), 3, nine).is_none());
        let first = t.find(&key, 3).unwrap();
        assert_eq!(t.find_next_with(3, first, |v| v.1 == 12), Some(&(1, 12)));
        assert!(t.find_next(&key, 4, first).is_none());
    }

    /// Invariant: runs wrap around the end of the table.
    #[test]
    fn run_wraps() {
        let mut t = table(8, ResizeMode::Disabled);
        for v in 0..3 {
            t.insert(v, 7).unwrap();
        }
        assert_eq!(hits(&t), vec![1, 1, 0, 0, 0, 0, 0, 3]);
        t.remove(&0, 7).unwrap();
        assert_eq!(t.records()[7].value(), Some(&2));
        assert_eq!(t.records()[7].hits(), 2);
        assert_eq!(t.find(&1, 7), Some(&1));
    }

    /// Invariant: custom predicates see only records with the exact hash.
    #[test]
    fn predicate_lookup_and_removal() {
        let mut t = table(8, ResizeMode::Grow);
        t.insert(10, 3).unwrap();
        t.insert(11, 11).unwrap();
        assert_eq!(t.find_with(3, |v| *v == 10), Some(&10));
        assert!(t.find_with(11, |v| *v == 10).is_none());
        *t.find_with_mut(11, |v| *v == 11).unwrap() = 12;
        assert_eq!(t.remove_with(11, |v| *v == 12), Ok(12));
    }

    /// Invariant: fixed sizes leave free slots for the requested count.
    #[test]
    fn fixed_sizes() {
        assert_eq!(Table::fixed_size(0), 8);
        assert_eq!(Table::fixed_size(5), 8);
        assert_eq!(Table::fixed_size(8), 16);
        assert_eq!(Table::fixed_size(100), 128);
    }

    /// Invariant: a duplicated table is independent of the original.
    #[test]
    fn clone_is_independent() {
        let mut t = table(8, ResizeMode::Grow);
        t.insert(1, 1).unwrap();
        let mut d = t.clone();
        d.remove(&1, 1).unwrap();
        assert_eq!(t.find(&1, 1), Some(&1));
        assert!(d.find(&1, 1).is_none());
    }
}
