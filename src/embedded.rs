//! EmbeddedHashTable: the intrusive engine.
//!
//! Records are owned by the caller and kept in the caller's own id-addressed
//! store (a `SlotMap`, `DenseSlotMap`, or any `RecordStore`). Each record
//! embeds an `EmbeddedLink`; the table only writes those link fields and
//! holds the bucket array plus its sentinel root. It never allocates
//! records, and it destroys them only through the explicit `delete*` and
//! `remove_delete` calls.
//!
//! Every operation takes the store as an argument. Passing a different
//! store than the one the records were linked from is a contract violation;
//! a linked id that is missing from the store panics.

use crate::chains::{Chains, Order, Probe};
use crate::error::CapacityError;
use crate::link::{Linked, Owner, RecordStore};
use crate::partition::{Partition, PowerOfTwo};
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::Key;

/// Chained hash table over caller-owned records, keeping both a hash-bucket
/// order and an insertion order through each record's `EmbeddedLink`.
pub struct EmbeddedHashTable<K, Id, S = DefaultHashBuilder, P = PowerOfTwo> {
    hasher: S,
    chains: Chains<Id, P>,
    reentrancy: DebugReentrancy,
    _key: PhantomData<fn() -> K>,
}

impl<K, Id: Key> EmbeddedHashTable<K, Id> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, Id: Key, S: Default, P: Partition + Default> Default for EmbeddedHashTable<K, Id, S, P> {
    fn default() -> Self {
        Self::with_hasher_and_partition(S::default(), P::default())
    }
}

impl<K, Id: Key, S, P: Partition + Default> EmbeddedHashTable<K, Id, S, P> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_hasher_and_partition(hasher, P::default())
    }
}

impl<K, Id: Key, S, P: Partition> EmbeddedHashTable<K, Id, S, P> {
    pub fn with_hasher_and_partition(hasher: S, partition: P) -> Self {
        Self {
            hasher,
            chains: Chains::new(partition),
            reentrancy: DebugReentrancy::new(),
            _key: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }
    pub fn is_empty(&self) -> bool {
        self.chains.len() == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.chains.bucket_count()
    }

    pub fn partition(&self) -> &P {
        self.chains.partition()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Exchanges the roots of two tables in O(1). Records stay where they
    /// are; each table keeps referring to the same store it did before.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    pub fn first(&self, order: Order) -> Option<Id> {
        self.chains.first(order)
    }

    pub fn next<St>(&self, store: &St, id: Id, order: Order) -> Option<Id>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        if !self.chains.holds(store, id) {
            return None;
        }
        self.chains.next(store, id, order)
    }

    /// Linked record ids in list order.
    pub fn iter<'a, St>(&'a self, store: &'a St) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.chains.walk(store, Order::List)
    }

    /// Linked record ids in hash-chain order.
    pub fn hash_iter<'a, St>(&'a self, store: &'a St) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.chains.walk(store, Order::Hash)
    }

    /// Key a linked record was inserted under.
    pub fn key<'a, St>(&self, store: &'a St, id: Id) -> Option<&'a K>
    where
        K: 'a,
        Id: 'a,
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K> + 'a,
    {
        store.record(id)?.link().key()
    }

    pub fn resize<St>(&mut self, store: &mut St, n: usize) -> Result<bool, CapacityError>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        self.chains.resize(store, n)
    }

    /// Unlinks one record and gives back its key. The record stays in the
    /// store, owned by the caller.
    pub fn remove<St>(&mut self, store: &mut St, id: Id) -> Option<K>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        if !self.chains.holds(&*store, id) {
            return None;
        }
        self.chains.unlink(store, id);
        store.record_mut(id)?.link_mut().detach()
    }

    /// Unlinks one record and destroys it by taking it out of the store.
    pub fn delete<St>(&mut self, store: &mut St, id: Id) -> Option<St::Record>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.remove(store, id)?;
        store.take(id)
    }

    /// Unlinks every record, leaving all of them in the store.
    pub fn clear<St>(&mut self, store: &mut St)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        let order: Vec<Id> = self.chains.walk(store, Order::List).collect();
        self.chains.reset();
        for id in order {
            if let Some(record) = store.record_mut(id) {
                record.link_mut().detach();
            }
        }
    }

    /// Unlinks and destroys every linked record, front to back. Returns how
    /// many were destroyed.
    pub fn delete_all<St>(&mut self, store: &mut St) -> usize
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        let order: Vec<Id> = self.chains.walk(store, Order::List).collect();
        tracing::debug!(len = order.len(), "destroying all linked records");
        self.chains.reset();
        order
            .into_iter()
            .filter_map(|id| {
                let mut record = store.take(id)?;
                record.link_mut().detach();
                Some(record)
            })
            .count()
    }

    /// Repositions `id` immediately before `before` (`None` = the end) in
    /// list order. Returns false if either record is not linked.
    pub fn move_before<St>(&mut self, store: &mut St, id: Id, before: Option<Id>) -> bool
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        let linked = |at: Id| self.chains.holds(&*store, at);
        if !linked(id) || before.is_some_and(|b| !linked(b)) {
            return false;
        }
        self.chains.move_before(store, id, before);
        true
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent<St: RecordStore<Id>>(&self, store: &St) {
        self.chains.assert_consistent(store);
    }

    #[cfg(test)]
    pub(crate) fn bucket_index_of<St: RecordStore<Id>>(&self, store: &St, id: Id) -> usize {
        self.chains.bucket_index_of(store, id)
    }
}

impl<K, Id, S, P> EmbeddedHashTable<K, Id, S, P>
where
    K: Eq + Hash,
    Id: Key,
    S: BuildHasher,
    P: Partition,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Links `id` under `key` at the end of list order unless an equal key
    /// is already linked. Returns the record that holds the key and whether
    /// `id` was linked; on a duplicate `key` is dropped and `id` stays
    /// unlinked.
    pub fn insert_unique<St>(&mut self, store: &mut St, id: Id, key: K) -> (Id, bool)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.insert_unique_before(store, id, key, None)
    }

    /// `insert_unique` placing the record before `before` in list order,
    /// which lets an unlinked record be put back where it was. A `before`
    /// that is not linked counts as the end.
    pub fn insert_unique_before<St>(
        &mut self,
        store: &mut St,
        id: Id,
        key: K,
        before: Option<Id>,
    ) -> (Id, bool)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        let before = before.filter(|&b| self.chains.holds(&*store, b));
        let hash = self.make_hash(&key);
        self.chains.reserve_one(store);
        match self.chains.probe_unique(store, hash, |k: &K| *k == key) {
            Probe::Found(existing) => (existing, false),
            Probe::Vacant(slot) => {
                attach(store, id, key, hash, self.chains.owner());
                self.chains.link(store, id, slot, before);
                (id, true)
            }
        }
    }

    /// Links `id` under `key` after any records with an equal key in hash
    /// order, and at the end of list order.
    pub fn insert_equal<St>(&mut self, store: &mut St, id: Id, key: K)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.insert_equal_before(store, id, key, None)
    }

    /// `insert_equal` placing the record before `before` in list order. A
    /// `before` that is not linked counts as the end.
    pub fn insert_equal_before<St>(&mut self, store: &mut St, id: Id, key: K, before: Option<Id>)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        let _g = self.reentrancy.enter();
        let before = before.filter(|&b| self.chains.holds(&*store, b));
        let hash = self.make_hash(&key);
        self.chains.reserve_one(store);
        let slot = self.chains.probe_equal(store, hash, |k: &K| *k == key);
        attach(store, id, key, hash, self.chains.owner());
        self.chains.link(store, id, slot, before);
    }

    pub fn find<St, Q>(&self, store: &St, q: &Q) -> Option<Id>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        self.chains.find(store, hash, |k: &K| k.borrow() == q)
    }

    pub fn contains_key<St, Q>(&self, store: &St, q: &Q) -> bool
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(store, q).is_some()
    }

    /// Ids of every linked record whose key equals `q`, in hash order.
    pub fn equal_range<'a, St, Q>(&'a self, store: &'a St, q: &'a Q) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.chains
            .equal_run(store, hash, move |k: &K| k.borrow() == q)
    }

    pub fn count<St, Q>(&self, store: &St, q: &Q) -> usize
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        self.chains
            .equal_run(store, hash, |k: &K| k.borrow() == q)
            .count()
    }

    /// Unlinks every record whose key equals `q` without destroying them.
    /// Returns their ids in hash order.
    pub fn remove_key<St, Q>(&mut self, store: &mut St, q: &Q) -> Vec<Id>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        let run: Vec<Id> = self
            .chains
            .equal_run(store, hash, |k: &K| k.borrow() == q)
            .collect();
        for &id in &run {
            self.chains.unlink(store, id);
            if let Some(record) = store.record_mut(id) {
                record.link_mut().detach();
            }
        }
        run
    }

    /// Unlinks and destroys every record whose key equals `q`. Returns how
    /// many were destroyed.
    pub fn remove_delete<St, Q>(&mut self, store: &mut St, q: &Q) -> usize
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_key(store, q)
            .into_iter()
            .filter_map(|id| store.take(id))
            .count()
    }
}

fn attach<Id, St>(
    store: &mut St,
    id: Id,
    key: <St::Record as Linked<Id>>::Key,
    hash: u64,
    owner: Owner,
) where
    Id: Key,
    St: RecordStore<Id>,
{
    store
        .record_mut(id)
        .expect("record must be in its store before it is linked")
        .link_mut()
        .attach(key, hash, owner);
}
