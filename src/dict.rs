//! Dictionary: refcounted string interning over [`HashTable`].
//!
//! Every distinct string is stored once. [`DictStr`] handles behave like the
//! refcount they stand for: cloning one is a repeated intern, dropping one is
//! a release, and the last release removes the record.

use crate::hash::hash_bytes;
use crate::hash_table::{HashTable, ResizeMode};
use core::fmt;
use core::ops::Deref;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// One interned string and the number of handles that reference it.
#[derive(Debug, Clone)]
pub struct DictRecord {
    value: Arc<str>,
    refcount: u32,
}

impl DictRecord {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Address of the shared string body, the same one every handle derefs to.
    pub fn addr(&self) -> usize {
        self.value.as_ptr() as usize
    }
}

pub type DictEqual = fn(&DictRecord, &DictRecord, bool) -> bool;
pub type DictTable = HashTable<DictRecord, DictEqual>;

fn dict_equal(a: &DictRecord, b: &DictRecord, _: bool) -> bool {
    a.value == b.value
}

struct DictInner {
    table: Mutex<DictTable>,
}

/// Thread-safe string dictionary.
pub struct Dictionary {
    inner: Arc<DictInner>,
}

/// A string still referenced when the dictionary was cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakReport {
    pub value: String,
    pub refcount: u32,
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "String \"{}\" not freed from the dictionary, refcount {}",
            self.value, self.refcount
        )
    }
}

fn new_table() -> DictTable {
    HashTable::new(8, dict_equal as DictEqual, ResizeMode::GrowShrink)
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DictInner {
                table: Mutex::new(new_table()),
            }),
        }
    }

    fn handle(&self, value: Arc<str>, hash: u32) -> DictStr {
        DictStr {
            value,
            hash,
            dict: Arc::downgrade(&self.inner),
        }
    }

    /// Returns the canonical handle for `s`, adding it on first use.
    pub fn intern(&self, s: &str) -> DictStr {
        let hash = hash_bytes(s.as_bytes());
        let mut table = self.inner.table.lock();
        if let Some(rec) = table.find_with_mut(hash, |r| &*r.value == s) {
            rec.refcount += 1;
            return self.handle(rec.value.clone(), hash);
        }
        let value: Arc<str> = Arc::from(s);
        self.store(&mut table, value, hash)
    }

    /// Interns a string the caller no longer needs, consuming it.
    pub fn intern_owned(&self, s: String) -> DictStr {
        let hash = hash_bytes(s.as_bytes());
        let mut table = self.inner.table.lock();
        if let Some(rec) = table.find_with_mut(hash, |r| *r.value == *s) {
            rec.refcount += 1;
            return self.handle(rec.value.clone(), hash);
        }
        self.store(&mut table, Arc::from(s), hash)
    }

    fn store(&self, table: &mut DictTable, value: Arc<str>, hash: u32) -> DictStr {
        log::trace!("Dictionary: inserting \"{}\".", value);
        table
            .insert(
                DictRecord {
                    value: value.clone(),
                    refcount: 1,
                },
                hash,
            )
            .expect("growable dictionary table accepts a string it does not hold");
        self.handle(value, hash)
    }

    /// Gives back one reference; the string is removed with its last one.
    /// A handle interned by another dictionary is handed back untouched.
    pub fn release(&self, s: DictStr) -> Result<(), DictStr> {
        if !Weak::ptr_eq(&s.dict, &Arc::downgrade(&self.inner)) {
            log::debug!("Dictionary: \"{}\" belongs to another dictionary (release).", s);
            return Err(s);
        }
        drop(s);
        Ok(())
    }

    pub fn refcount(&self, s: &str) -> Option<u32> {
        let hash = hash_bytes(s.as_bytes());
        self.inner
            .table
            .lock()
            .find_with(hash, |r| &*r.value == s)
            .map(|r| r.refcount)
    }

    pub fn contains(&self, s: &str) -> bool {
        self.refcount(s).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `f` over the locked table.
    pub fn with_table<R>(&self, f: impl FnOnce(&DictTable) -> R) -> R {
        f(&self.inner.table.lock())
    }

    /// Empties the dictionary, warning about every string still referenced.
    pub fn clean(&self) -> Vec<LeakReport> {
        let mut table = self.inner.table.lock();
        let leaks: Vec<LeakReport> = table
            .iter()
            .filter(|r| r.refcount > 0)
            .map(|r| LeakReport {
                value: r.value.to_string(),
                refcount: r.refcount,
            })
            .collect();
        for leak in &leaks {
            log::warn!("{}.", leak);
        }
        *table = new_table();
        leaks
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Dictionary {
    fn drop(&mut self) {
        self.clean();
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dictionary").field("len", &self.len()).finish()
    }
}

/// Handle to an interned string. Holds one reference in its dictionary.
pub struct DictStr {
    value: Arc<str>,
    hash: u32,
    dict: Weak<DictInner>,
}

impl DictStr {
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Both handles refer to the same interned body.
    pub fn ptr_eq(a: &DictStr, b: &DictStr) -> bool {
        Arc::ptr_eq(&a.value, &b.value)
    }

    /// Address of the interned body, shared with the dictionary record.
    pub fn addr(&self) -> usize {
        self.value.as_ptr() as usize
    }

    pub fn hash(&self) -> u32 {
        self.hash
    }
}

impl Clone for DictStr {
    fn clone(&self) -> Self {
        if let Some(inner) = self.dict.upgrade() {
            let mut table = inner.table.lock();
            if let Some(rec) = table.find_with_mut(self.hash, |r| Arc::ptr_eq(&r.value, &self.value)) {
                rec.refcount += 1;
            }
        }
        Self {
            value: self.value.clone(),
            hash: self.hash,
            dict: self.dict.clone(),
        }
    }
}

impl Drop for DictStr {
    fn drop(&mut self) {
        let Some(inner) = self.dict.upgrade() else {
            return;
        };
        let mut table = inner.table.lock();
        let value = &self.value;
        let Some(rec) = table.find_with_mut(self.hash, |r| Arc::ptr_eq(&r.value, value)) else {
            // The dictionary was cleaned while this handle was alive.
            return;
        };
        rec.refcount -= 1;
        if rec.refcount == 0 {
            log::trace!("Dictionary: removing \"{}\".", value);
            let _ = table.remove_with(self.hash, |r| Arc::ptr_eq(&r.value, value));
        }
    }
}

impl Deref for DictStr {
    type Target = str;
    fn deref(&self) -> &str {
        &self.value
    }
}

impl AsRef<str> for DictStr {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl PartialEq for DictStr {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value) || self.value == other.value
    }
}

impl Eq for DictStr {}

impl PartialEq<str> for DictStr {
    fn eq(&self, other: &str) -> bool {
        &*self.value == other
    }
}

impl PartialEq<&str> for DictStr {
    fn eq(&self, other: &&str) -> bool {
        &*self.value == *other
    }
}

impl core::hash::Hash for DictStr {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl fmt::Debug for DictStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.value, f)
    }
}

impl fmt::Display for DictStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.value, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: repeated interns share one body and count references.
    #[test]
    fn intern_twice_shares_body() {
        let d = Dictionary::new();
        let a = d.intern("test1");
        let b = d.intern("test1");
        assert!(DictStr::ptr_eq(&a, &b));
        assert_eq!(a.addr(), b.addr());
        assert_eq!(d.refcount("test1"), Some(2));
        d.release(b).unwrap();
        assert_eq!(d.refcount("test1"), Some(1));
        d.release(a).unwrap();
        assert_eq!(d.refcount("test1"), None);
        assert!(d.is_empty());
    }

    /// Invariant: releasing through a foreign dictionary changes neither one.
    #[test]
    fn release_checks_owner() {
        let d = Dictionary::new();
        let other = Dictionary::new();
        let a = d.intern("mine");
        let _theirs = other.intern("mine");
        let a = other.release(a).unwrap_err();
        assert_eq!(d.refcount("mine"), Some(1));
        assert_eq!(other.refcount("mine"), Some(1));
        d.release(a).unwrap();
        assert!(!d.contains("mine"));
        assert_eq!(other.refcount("mine"), Some(1));
    }

    /// Invariant: clone is a repeated intern; owned interning reuses existing bodies.
    #[test]
    fn clone_and_owned_intern() {
        let d = Dictionary::new();
        let a = d.intern_owned("leaf".to_string());
        let b = a.clone();
        let c = d.intern("leaf");
        assert_eq!(d.refcount("leaf"), Some(3));
        assert!(DictStr::ptr_eq(&a, &c));
        drop(a);
        drop(b);
        assert_eq!(d.refcount("leaf"), Some(1));
        assert_eq!(c, "leaf");
    }

    /// Invariant: clean reports exactly the strings still referenced and empties the table.
    #[test]
    fn clean_reports_leaks() {
        let d = Dictionary::new();
        let a = d.intern("test1");
        let _b = d.intern("test1");
        let c = d.intern("test2");
        drop(c);
        drop(a);
        let leaks = d.clean();
        assert_eq!(
            leaks,
            vec![LeakReport {
                value: "test1".to_string(),
                refcount: 1
            }]
        );
        assert_eq!(
            leaks[0].to_string(),
            "String \"test1\" not freed from the dictionary, refcount 1"
        );
        assert!(d.is_empty());
    }

    /// Invariant: handles outliving their dictionary stay readable and drop quietly.
    #[test]
    fn handle_outlives_dictionary() {
        let d = Dictionary::new();
        let a = d.intern("orphan");
        drop(d);
        assert_eq!(&*a, "orphan");
        let b = a.clone();
        drop(a);
        assert_eq!(b.as_str(), "orphan");
    }

    /// Invariant: concurrent interns of the same strings converge on one record each.
    #[test]
    fn concurrent_intern_release() {
        let d = Dictionary::new();
        let keep = d.intern("shared");
        std::thread::scope(|s| {
            for t in 0..4 {
                let d = &d;
                s.spawn(move || {
                    for i in 0..200 {
                        let a = d.intern("shared");
                        let b = d.intern(&format!("s{}", (i + t) % 17));
                        drop(a);
                        drop(b);
                    }
                });
            }
        });
        assert_eq!(d.refcount("shared"), Some(1));
        assert_eq!(d.len(), 1);
        drop(keep);
        assert!(d.is_empty());
    }

    /// Invariant: many distinct strings survive table growth and shrinking.
    #[test]
    fn survives_resize() {
        let d = Dictionary::new();
        let held: Vec<DictStr> = (0..100).map(|i| d.intern(&format!("node-{}", i))).collect();
        assert_eq!(d.len(), 100);
        for (i, s) in held.iter().enumerate() {
            assert_eq!(s.as_str(), format!("node-{}", i));
            assert_eq!(d.refcount(s), Some(1));
        }
        drop(held);
        assert!(d.is_empty());
        assert_eq!(d.with_table(|t| t.size()), 8);
    }
}
