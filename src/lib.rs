//! yang-snapshot: an open-addressing hash table, a refcounted string
//! dictionary built on it, and a two-pass flattener that copies a compiled
//! YANG schema context into one contiguous, relocatable buffer.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: turn a pointer-rich, partly shared, partly cyclic schema graph
//!   into a single byte buffer whose size is known exactly before it is
//!   written.
//! - Layers:
//!   - HashTable<T, E>: open addressing with linear probing. Records that
//!     share a masked index form a run whose first member counts its
//!     length (`hits`); removal leaves tombstones that a rehash reclaims.
//!   - Dictionary: interns strings in a HashTable behind a mutex. `DictStr`
//!     handles are the references: clone is intern, drop is release.
//!   - AddressMap: a HashTable from original address to snapshot offset,
//!     filled during one pass and thrown away after it.
//!   - Walk<S: Sink>: the only traversal of the graph. Over a `SizeSink` it
//!     counts, over a `WriteSink` it writes. Both sinks hand out the same
//!     offsets, so the two passes agree by construction.
//!
//! Constraints
//! - HashTable has no synchronization of its own; Dictionary serializes
//!   access with `parking_lot::Mutex`.
//! - Passes are synchronous, single-threaded and perform no I/O. The
//!   destination is one caller-supplied block; the writer never grows it
//!   and never writes outside it.
//! - Extension plugins lay out their own payloads through the same walk
//!   and must report the size they laid out.
//!
//! Snapshot format
//! - Little-endian 8-byte words. Pointers are offsets from the start of the
//!   buffer and `0` is null, so a snapshot can be moved, copied or mapped
//!   anywhere. A magic word and the total length open the buffer.
//! - Record layouts live in `layout` and nowhere else.
//!
//! Invariants
//! - Sized and written byte counts are equal for every graph.
//! - A structure reachable from several owners (types, whens, patterns)
//!   appears once; every owner points at that one copy.
//! - Back and sibling edges (parent, next/prev, module, identity and
//!   extension definition references) never drive recursion. They are
//!   resolved through the AddressMap, deferred until the target is laid out
//!   when it comes later in the walk.
//! - Anything the flattener cannot mirror (an uncompiled statement, a
//!   dangling reference, a plugin that misreports its size) is an internal
//!   error that aborts the pass.

pub mod addr_map;
pub mod dict;
pub mod error;
pub mod flatten;
pub mod hash;
pub mod hash_table;
mod hash_table_proptest;
pub mod layout;
pub mod plugin;
pub mod schema;
pub mod sink;
pub mod snapshot;
pub mod stmt;
pub mod walk;

// Public surface
pub use addr_map::AddressMap;
pub use dict::{DictStr, Dictionary, LeakReport};
pub use error::{Error, Result};
pub use flatten::{compiled_context_flatten, compiled_context_size};
pub use hash::{hash_bytes, hash_compute};
pub use hash_table::{HashTable, InsertError, ResizeMode, MIN_SIZE};
pub use plugin::{ExtensionPlugin, FlatSubstmts, StoragePlugin};
pub use schema::{Context, Module, ModuleId};
pub use snapshot::Snapshot;
pub use walk::{ext_stmt_storage_flatten, ext_stmt_storage_size, Printer, Sizer};
