//! chained-hashtable: separate-chaining hash tables whose elements sit on
//! two doubly linked orders at once.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: one chaining algorithm, two ownership models. Every element is
//!   threaded through a hash list, where each bucket's members form one
//!   contiguous run and equal keys are adjacent, and through a list order
//!   that records insertion sequence (or wherever the caller moved it).
//! - Layers:
//!   - `Partition`: maps a hash to a bucket index and picks the next
//!     bucket count (`PowerOfTwo` masks, `PrimeSequence` takes a modulus).
//!   - `Chains<Id, P>`: bucket array, sentinel root and the splice/unlink/
//!     rebuild algorithm, written against a `RecordStore` of linked
//!     records.
//!   - `HashTable<K, V, S, P>`: owns its entries in a `SlotMap` and hands
//!     out generational `Handle`s.
//!   - `EmbeddedHashTable<K, Id, S, P>`: indexes records the caller owns;
//!     each record embeds an `EmbeddedLink` per table it belongs to.
//!   - `adapters`: unique/multi maps and sets on top of the two engines.
//!
//! Constraints
//! - Single-threaded: tables are `!Send`/`!Sync` via the reentrancy
//!   tracker's marker.
//! - No unsafe code. Links are slot ids, and `None` stands for the
//!   sentinel root, so swapping two tables is a plain `mem::swap`.
//! - Each node caches its `u64` hash; `K: Hash` runs once per insert or
//!   lookup and never during a rebuild.
//! - Growth happens before an insert probes (load factor 1). When the
//!   partition refuses to grow, inserts still succeed and chains lengthen.
//!
//! Bucket-run invariants
//! - Inserting into an empty bucket puts the node at the front of the hash
//!   list; otherwise the node goes right before the first node that breaks
//!   the bucket's run, or right after the last equal key.
//! - Removal re-points a bucket's head only when the successor stays in
//!   the same bucket; otherwise the bucket becomes empty.
//! - A rebuild walks the hash list back to front and pushes each node to
//!   the front of its new run, so relative order within a bucket survives.
//!   The list order is never touched by a rebuild.
//!
//! Reentrancy policy
//! - Mutating entry points take a debug-only reentrancy section while
//!   links are being rewritten. A `Hash`/`Eq` impl that calls back into
//!   the same table panics in debug builds.
//! - Mutating entry points take `&mut self`, so a `Drop` impl of a removed
//!   key or value cannot reach the table. Bulk removals (`remove_key`,
//!   `remove_range`, `retain`, `clear`) drop entries while the section is
//!   held; `remove` hands the pair back to the caller instead.
//! - Debug builds stamp each handle and linked record with the issuing
//!   table and panic when another table is handed one.
//!
//! Notes and non-goals
//! - No concurrent access, no persistence.
//! - Handles are generational: a handle whose entry was removed reads as
//!   `None` rather than aliasing a newer entry.

pub mod adapters;
mod chains;
mod embedded;
mod embedded_proptest;
mod error;
mod hash_table;
mod hash_table_proptest;
mod link;
mod partition;
mod reentrancy;

// Public surface
pub use adapters::{EmbeddedMultiMap, MultiMap, MultiSet, UniqueMap, UniqueSet};
pub use chains::Order;
pub use embedded::EmbeddedHashTable;
pub use error::CapacityError;
pub use hash_table::{Handle, HashTable, Iter, IterMut};
pub use link::{EmbeddedLink, Linked, RecordStore};
pub use partition::{Exhaustion, Partition, PowerOfTwo, PrimeSequence};
