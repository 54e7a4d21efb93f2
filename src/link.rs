//! Link fields shared by both engines and the traits that let the chain
//! algorithm reach them.
//!
//! A record participates in a table by exposing an `EmbeddedLink` through
//! `Linked`. Records live in some arena addressed by ids (`RecordStore`);
//! the table stores only ids. A link slot holding `None` refers to the
//! table's sentinel root rather than to a record.

use slotmap::{DenseSlotMap, Key, SlotMap};

/// Identity of one table, stamped into the handles and links it issues.
///
/// Only debug builds carry an id; release builds compare zero-sized values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Owner {
    #[cfg(debug_assertions)]
    id: u64,
}

impl Owner {
    /// Owner of links that are not in any table.
    pub(crate) const UNOWNED: Owner = Owner {
        #[cfg(debug_assertions)]
        id: 0,
    };

    pub(crate) fn fresh() -> Self {
        #[cfg(debug_assertions)]
        {
            use core::sync::atomic::{AtomicU64, Ordering};
            static NEXT: AtomicU64 = AtomicU64::new(1);
            return Owner {
                id: NEXT.fetch_add(1, Ordering::Relaxed),
            };
        }

        #[cfg(not(debug_assertions))]
        {
            return Owner {};
        }
    }
}

/// The four link slots of one node: its position in hash-chain order and in
/// list (iteration) order. On the sentinel these are the list heads and
/// tails.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Links<Id> {
    pub(crate) hash_next: Option<Id>,
    pub(crate) hash_prev: Option<Id>,
    pub(crate) list_next: Option<Id>,
    pub(crate) list_prev: Option<Id>,
}

impl<Id> Links<Id> {
    pub(crate) const fn detached() -> Self {
        Self {
            hash_next: None,
            hash_prev: None,
            list_next: None,
            list_prev: None,
        }
    }
}

/// Link state embedded inside a record.
///
/// The key slot is empty until the record is inserted and is taken back out
/// when it is unlinked, so a record can be constructed without a key.
#[derive(Debug)]
pub struct EmbeddedLink<K, Id> {
    pub(crate) links: Links<Id>,
    pub(crate) hash: u64,
    pub(crate) key: Option<K>,
    pub(crate) owner: Owner,
}

impl<K, Id> EmbeddedLink<K, Id> {
    pub const fn new() -> Self {
        Self {
            links: Links::detached(),
            hash: 0,
            key: None,
            owner: Owner::UNOWNED,
        }
    }

    /// Whether the owning record is currently linked into a table.
    pub fn is_contained(&self) -> bool {
        self.key.is_some()
    }

    /// Key the record was inserted under, while linked.
    pub fn key(&self) -> Option<&K> {
        self.key.as_ref()
    }

    /// Cached hash of the key, while linked.
    pub fn cached_hash(&self) -> Option<u64> {
        self.key.as_ref().map(|_| self.hash)
    }

    pub(crate) fn attach(&mut self, key: K, hash: u64, owner: Owner) {
        debug_assert!(self.key.is_none(), "record is already linked");
        self.key = Some(key);
        self.hash = hash;
        self.owner = owner;
    }

    pub(crate) fn detach(&mut self) -> Option<K> {
        self.links = Links::detached();
        self.owner = Owner::UNOWNED;
        self.key.take()
    }
}

impl<K, Id> Default for EmbeddedLink<K, Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// A record type that carries an `EmbeddedLink`.
pub trait Linked<Id> {
    type Key;

    fn link(&self) -> &EmbeddedLink<Self::Key, Id>;
    fn link_mut(&mut self) -> &mut EmbeddedLink<Self::Key, Id>;
}

/// Id-addressed storage of linked records.
///
/// The table never inserts into a store; it only reads and rewrites link
/// fields, and removes records when asked to destroy them.
pub trait RecordStore<Id> {
    type Record: Linked<Id>;

    fn record(&self, id: Id) -> Option<&Self::Record>;
    fn record_mut(&mut self, id: Id) -> Option<&mut Self::Record>;
    /// Remove the record from the store, handing ownership back.
    fn take(&mut self, id: Id) -> Option<Self::Record>;
}

impl<Id: Key, R: Linked<Id>> RecordStore<Id> for SlotMap<Id, R> {
    type Record = R;

    #[inline]
    fn record(&self, id: Id) -> Option<&R> {
        self.get(id)
    }
    #[inline]
    fn record_mut(&mut self, id: Id) -> Option<&mut R> {
        self.get_mut(id)
    }
    fn take(&mut self, id: Id) -> Option<R> {
        self.remove(id)
    }
}

impl<Id: Key, R: Linked<Id>> RecordStore<Id> for DenseSlotMap<Id, R> {
    type Record = R;

    #[inline]
    fn record(&self, id: Id) -> Option<&R> {
        self.get(id)
    }
    #[inline]
    fn record_mut(&mut self, id: Id) -> Option<&mut R> {
        self.get_mut(id)
    }
    fn take(&mut self, id: Id) -> Option<R> {
        self.remove(id)
    }
}

/// Key type of the records held by store `St`.
pub(crate) type KeyOf<St, Id> = <<St as RecordStore<Id>>::Record as Linked<Id>>::Key;
