//! AddressMap: original address to snapshot offset, for one flatten run.

use crate::error::{Error, Result};
use crate::hash::hash_bytes;
use crate::hash_table::{HashTable, InsertError, ResizeMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrEntry {
    pub orig: usize,
    pub new: usize,
}

type AddrEqual = fn(&AddrEntry, &AddrEntry, bool) -> bool;

fn addr_equal(a: &AddrEntry, b: &AddrEntry, _: bool) -> bool {
    a.orig == b.orig
}

fn addr_hash(orig: usize) -> u32 {
    hash_bytes(&orig.to_ne_bytes())
}

/// Append-only map of visited structures. Doubles as the visited set that
/// lets the flattener copy shared structures once and break cycles.
#[derive(Debug, Clone)]
pub struct AddressMap {
    table: HashTable<AddrEntry, AddrEqual>,
}

impl AddressMap {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(8, addr_equal as AddrEqual, ResizeMode::Grow),
        }
    }

    pub fn lookup(&self, orig: usize) -> Option<usize> {
        self.table
            .find_with(addr_hash(orig), |e| e.orig == orig)
            .map(|e| e.new)
    }

    /// Records where `orig` landed; a second record of the same address fails.
    pub fn record(&mut self, orig: usize, new: usize) -> Result<()> {
        match self.table.insert(AddrEntry { orig, new }, addr_hash(orig)) {
            Ok(()) => Ok(()),
            Err(InsertError::AlreadyExists(_)) => Err(Error::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AddrEntry> + '_ {
        self.table.iter()
    }
}

impl Default for AddressMap {
    fn default() -> Self {
        Self::new()
    }
}
