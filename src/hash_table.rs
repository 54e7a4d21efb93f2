//! HashTable: the owned-node engine.
//!
//! Nodes live in a generational arena and are addressed by `Handle`s that
//! stay valid across insertion and bucket growth; erasing a node makes its
//! handle resolve to `None` instead of aliasing a later node.

use crate::chains::{Chains, Order, Probe, Walk};
use crate::error::CapacityError;
use crate::link::{EmbeddedLink, Linked, Owner};
use crate::partition::{Partition, PowerOfTwo};
use crate::reentrancy::DebugReentrancy;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::{DefaultKey, SecondaryMap, SlotMap};

/// Stable reference to one entry. Debug builds also record which table
/// issued it and assert that it is only used with that table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    id: DefaultKey,
    owner: Owner,
}

impl Handle {
    pub(crate) fn new(id: DefaultKey, owner: Owner) -> Self {
        Handle { id, owner }
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.id
    }

    pub fn key<'a, K, V, S, P>(&self, table: &'a HashTable<K, V, S, P>) -> Option<&'a K> {
        table.handle_key(*self)
    }

    pub fn value<'a, K, V, S, P>(&self, table: &'a HashTable<K, V, S, P>) -> Option<&'a V> {
        table.handle_value(*self)
    }

    pub fn value_mut<'a, K, V, S, P>(
        &self,
        table: &'a mut HashTable<K, V, S, P>,
    ) -> Option<&'a mut V> {
        table.handle_value_mut(*self)
    }
}

#[derive(Debug)]
struct Node<K, V> {
    link: EmbeddedLink<K, DefaultKey>,
    value: V,
}

impl<K, V> Node<K, V> {
    fn new(key: K, hash: u64, value: V, owner: Owner) -> Self {
        let mut link = EmbeddedLink::new();
        link.attach(key, hash, owner);
        Self { link, value }
    }
}

impl<K, V> Linked<DefaultKey> for Node<K, V> {
    type Key = K;

    #[inline]
    fn link(&self) -> &EmbeddedLink<K, DefaultKey> {
        &self.link
    }
    #[inline]
    fn link_mut(&mut self) -> &mut EmbeddedLink<K, DefaultKey> {
        &mut self.link
    }
}

impl<K: Clone, V: Clone> Clone for Node<K, V> {
    // Ids survive `SlotMap::clone`, so copied links stay meaningful.
    fn clone(&self) -> Self {
        Self {
            link: EmbeddedLink {
                links: self.link.links,
                hash: self.link.hash,
                key: self.link.key.clone(),
                owner: self.link.owner,
            },
            value: self.value.clone(),
        }
    }
}

type Nodes<K, V> = SlotMap<DefaultKey, Node<K, V>>;

/// Chained hash table over owned nodes, keeping both a hash-bucket order and
/// an insertion order over the same entries.
///
/// Supports unique-key (`insert_unique`) and duplicate-key (`insert_equal`)
/// use; entries with equal keys are kept adjacent in hash order.
pub struct HashTable<K, V, S = DefaultHashBuilder, P = PowerOfTwo> {
    hasher: S,
    chains: Chains<DefaultKey, P>,
    nodes: Nodes<K, V>,
    reentrancy: DebugReentrancy,
}

impl<K, V> HashTable<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// Table whose bucket array already fits `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut table = Self::new();
        if let Err(err) = table.resize(capacity) {
            tracing::warn!(%err, capacity, "requested capacity not reachable");
        }
        table
    }
}

impl<K, V, S: Default, P: Partition + Default> Default for HashTable<K, V, S, P> {
    fn default() -> Self {
        Self::with_hasher_and_partition(S::default(), P::default())
    }
}

impl<K, V, S, P: Partition + Default> HashTable<K, V, S, P> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_hasher_and_partition(hasher, P::default())
    }
}

impl<K, V, S, P> HashTable<K, V, S, P> {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn handle_key(&self, h: Handle) -> Option<&K> {
        let _g = self.reentrancy.enter();
        let id = self.live(h)?;
        self.nodes.get(id).and_then(|n| n.link.key.as_ref())
    }

    pub(crate) fn handle_value(&self, h: Handle) -> Option<&V> {
        let _g = self.reentrancy.enter();
        let id = self.live(h)?;
        self.nodes.get(id).map(|n| &n.value)
    }

    pub(crate) fn handle_value_mut(&mut self, h: Handle) -> Option<&mut V> {
        let _g = self.reentrancy.enter();
        let id = self.live(h)?;
        self.nodes.get_mut(id).map(|n| &mut n.value)
    }

    /// Arena id behind `handle` while its entry exists.
    fn live(&self, handle: Handle) -> Option<DefaultKey> {
        debug_assert_eq!(
            handle.owner,
            self.chains.owner(),
            "handle used with a table that did not issue it"
        );
        let id = handle.raw_handle();
        self.nodes.contains_key(id).then_some(id)
    }

    #[inline]
    fn handle(&self, id: DefaultKey) -> Handle {
        Handle::new(id, self.chains.owner())
    }

    fn entry(&self, id: DefaultKey) -> Option<(Handle, &K, &V)> {
        let node = self.nodes.get(id)?;
        Some((self.handle(id), node.link.key.as_ref()?, &node.value))
    }
}

impl<K, V, S, P: Partition> HashTable<K, V, S, P> {
    pub fn with_hasher_and_partition(hasher: S, partition: P) -> Self {
        Self {
            hasher,
            chains: Chains::new(partition),
            nodes: SlotMap::with_key(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.chains.bucket_count()
    }

    pub fn partition(&self) -> &P {
        self.chains.partition()
    }

    /// Grows the bucket array to at least `n` buckets; never shrinks.
    /// Returns whether the buckets were rebuilt. Iteration order is not
    /// affected.
    pub fn resize(&mut self, n: usize) -> Result<bool, CapacityError> {
        let _g = self.reentrancy.enter();
        self.chains.resize(&mut self.nodes, n)
    }

    /// Unlinks the entry and hands back its key and value.
    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        let _g = self.reentrancy.enter();
        let id = self.live(handle)?;
        // Unlink before the node leaves the arena so drops of K/V observe a
        // consistent table.
        self.chains.unlink(&mut self.nodes, id);
        let Node { link, value } = self.nodes.remove(id)?;
        link.key.map(move |k| (k, value))
    }

    /// Erases entries in list order from `first` up to, but excluding,
    /// `last` (`None` runs to the end). Returns the number erased.
    pub fn remove_range(&mut self, first: Handle, last: Option<Handle>) -> usize {
        let _g = self.reentrancy.enter();
        let stop = last.and_then(|h| self.live(h));
        let mut cur = self.live(first);
        let mut erased = 0;
        while let Some(id) = cur {
            if Some(id) == stop {
                break;
            }
            cur = self.chains.next(&self.nodes, id, Order::List);
            self.chains.unlink(&mut self.nodes, id);
            self.nodes.remove(id);
            erased += 1;
        }
        erased
    }

    /// Keeps only the entries for which `keep` returns true, visiting them
    /// in list order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let _g = self.reentrancy.enter();
        let mut cur = self.chains.first(Order::List);
        while let Some(id) = cur {
            cur = self.chains.next(&self.nodes, id, Order::List);
            let retained = match self.nodes.get_mut(id) {
                Some(Node { link, value }) => link.key.as_ref().map_or(true, |k| keep(k, value)),
                None => true,
            };
            if !retained {
                self.chains.unlink(&mut self.nodes, id);
                self.nodes.remove(id);
            }
        }
    }

    /// Drops every entry front to back in list order and returns to the
    /// initial bucket count.
    pub fn clear(&mut self) {
        let _g = self.reentrancy.enter();
        let order: Vec<DefaultKey> = self.chains.walk(&self.nodes, Order::List).collect();
        tracing::debug!(len = order.len(), "clearing table");
        self.chains.reset();
        for id in order {
            self.nodes.remove(id);
        }
    }

    /// Repositions `handle` immediately before `before` (`None` = the end)
    /// in list order. Hash order and lookups are unaffected. Returns false
    /// if either handle is stale.
    pub fn move_before(&mut self, handle: Handle, before: Option<Handle>) -> bool {
        let _g = self.reentrancy.enter();
        let Some(id) = self.live(handle) else {
            return false;
        };
        let before = match before {
            Some(h) => match self.live(h) {
                Some(b) => Some(b),
                None => return false,
            },
            None => None,
        };
        self.chains.move_before(&mut self.nodes, id, before);
        true
    }

    /// Exchanges the contents of two tables in O(1).
    ///
    /// Ends of both lists are encoded as `None` rather than as the address
    /// of a sentinel, so nothing needs repointing.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    pub fn first(&self, order: Order) -> Option<Handle> {
        self.chains.first(order).map(|id| self.handle(id))
    }

    /// Successor in `order`; `None` at the end or for a stale handle.
    pub fn next(&self, handle: Handle, order: Order) -> Option<Handle> {
        let id = self.live(handle)?;
        self.chains.next(&self.nodes, id, order).map(|id| self.handle(id))
    }

    /// Predecessor in `order`; `None` at the front or for a stale handle.
    pub fn prev(&self, handle: Handle, order: Order) -> Option<Handle> {
        let id = self.live(handle)?;
        self.chains.prev(&self.nodes, id, order).map(|id| self.handle(id))
    }

    /// Entries in list (insertion) order.
    pub fn iter(&self) -> Iter<'_, K, V, P> {
        self.iter_in(Order::List)
    }

    /// Entries in hash-chain order: bucket runs back to back, equal keys
    /// adjacent.
    pub fn hash_iter(&self) -> Iter<'_, K, V, P> {
        self.iter_in(Order::Hash)
    }

    pub fn iter_in(&self, order: Order) -> Iter<'_, K, V, P> {
        Iter {
            walk: self.chains.walk(&self.nodes, order),
            nodes: &self.nodes,
            owner: self.chains.owner(),
        }
    }

    pub fn handles(&self, order: Order) -> impl Iterator<Item = Handle> + '_ {
        let owner = self.chains.owner();
        self.chains.walk(&self.nodes, order).map(move |id| Handle::new(id, owner))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(_, k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, _, v)| v)
    }

    /// Mutable entries in list order.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let _g = self.reentrancy.enter();
        let len = self.nodes.len();
        let mut rank: SecondaryMap<DefaultKey, usize> = SecondaryMap::with_capacity(len);
        for (pos, id) in self.chains.walk(&self.nodes, Order::List).enumerate() {
            rank.insert(id, pos);
        }
        let owner = self.chains.owner();
        let mut ordered = Vec::with_capacity(len);
        ordered.resize_with(len, || None);
        for (id, node) in self.nodes.iter_mut() {
            let Node { link, value } = node;
            if let (Some(&pos), Some(key)) = (rank.get(id), link.key.as_ref()) {
                ordered[pos] = Some((Handle::new(id, owner), key, value));
            }
        }
        IterMut {
            it: ordered.into_iter().flatten(),
        }
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        self.chains.assert_consistent(&self.nodes);
    }

    #[cfg(test)]
    pub(crate) fn bucket_index_of(&self, handle: Handle) -> usize {
        self.chains.bucket_index_of(&self.nodes, handle.raw_handle())
    }
}

impl<K, V, S, P> HashTable<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    /// Inserts unless an equal key is present. On a duplicate the existing
    /// entry is returned untouched with `false` and `value` is dropped.
    pub fn insert_unique(&mut self, key: K, value: V) -> (Handle, bool) {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        self.chains.reserve_one(&mut self.nodes);
        match self.chains.probe_unique(&self.nodes, hash, |k: &K| *k == key) {
            Probe::Found(id) => (self.handle(id), false),
            Probe::Vacant(slot) => {
                let id = self.nodes.insert(Node::new(key, hash, value, self.chains.owner()));
                self.chains.link(&mut self.nodes, id, slot, None);
                (self.handle(id), true)
            }
        }
    }

    /// Always inserts; the new entry follows any entries with an equal key
    /// in hash order and goes to the end of list order.
    pub fn insert_equal(&mut self, key: K, value: V) -> Handle {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        self.chains.reserve_one(&mut self.nodes);
        let slot = self.chains.probe_equal(&self.nodes, hash, |k: &K| *k == key);
        let id = self.nodes.insert(Node::new(key, hash, value, self.chains.owner()));
        self.chains.link(&mut self.nodes, id, slot, None);
        self.handle(id)
    }

    /// Like `insert_unique`, but the value slot is filled by `make`. When
    /// the key already exists its current value is discarded and replaced
    /// by `make()`; `make` runs exactly once either way.
    pub fn key_insert_unique<F>(&mut self, key: K, make: F) -> (Handle, bool)
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        self.chains.reserve_one(&mut self.nodes);
        match self.chains.probe_unique(&self.nodes, hash, |k: &K| *k == key) {
            Probe::Found(id) => {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.value = make();
                }
                (self.handle(id), false)
            }
            Probe::Vacant(slot) => {
                let id = self.nodes.insert(Node::new(key, hash, make(), self.chains.owner()));
                self.chains.link(&mut self.nodes, id, slot, None);
                (self.handle(id), true)
            }
        }
    }

    /// Like `insert_equal`, with the value built by `make`.
    pub fn key_insert_equal<F>(&mut self, key: K, make: F) -> Handle
    where
        F: FnOnce() -> V,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(&key);
        self.chains.reserve_one(&mut self.nodes);
        let slot = self.chains.probe_equal(&self.nodes, hash, |k: &K| *k == key);
        let id = self.nodes.insert(Node::new(key, hash, make(), self.chains.owner()));
        self.chains.link(&mut self.nodes, id, slot, None);
        self.handle(id)
    }

    /// First entry with an equal key in hash order.
    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        self.chains
            .find(&self.nodes, hash, |k: &K| k.borrow() == q)
            .map(|id| self.handle(id))
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.find(q)?;
        self.handle_value(h)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.find(q)?;
        self.handle_value_mut(h)
    }

    /// Every entry whose key equals `q`, in hash order. Empty when absent.
    pub fn equal_range<'a, Q>(&'a self, q: &'a Q) -> impl Iterator<Item = (Handle, &'a K, &'a V)> + 'a
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.chains
            .equal_run(&self.nodes, hash, move |k: &K| k.borrow() == q)
            .filter_map(move |id| self.entry(id))
    }

    pub fn count<Q>(&self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        self.chains
            .equal_run(&self.nodes, hash, |k: &K| k.borrow() == q)
            .count()
    }

    /// Erases every entry whose key equals `q`; returns how many.
    pub fn remove_key<Q>(&mut self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        let hash = self.make_hash(q);
        let run: Vec<DefaultKey> = self
            .chains
            .equal_run(&self.nodes, hash, |k: &K| k.borrow() == q)
            .collect();
        for &id in &run {
            self.chains.unlink(&mut self.nodes, id);
            self.nodes.remove(id);
        }
        run.len()
    }
}

impl<K: Clone, V: Clone, S: Clone, P: Clone> Clone for HashTable<K, V, S, P> {
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            chains: self.chains.clone(),
            nodes: self.nodes.clone(),
            reentrancy: DebugReentrancy::new(),
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S, P: Partition> fmt::Debug for HashTable<K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(_, k, v)| (k, v)))
            .finish()
    }
}

/// Iterator over entries in list or hash order.
pub struct Iter<'a, K, V, P> {
    walk: Walk<'a, DefaultKey, Nodes<K, V>, P>,
    nodes: &'a Nodes<K, V>,
    owner: Owner,
}

impl<'a, K, V, P: Partition> Iterator for Iter<'a, K, V, P> {
    type Item = (Handle, &'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let id = self.walk.next()?;
        let node = self.nodes.get(id)?;
        Some((Handle::new(id, self.owner), node.link.key.as_ref()?, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.walk.size_hint()
    }
}

impl<'a, K, V, P: Partition> ExactSizeIterator for Iter<'a, K, V, P> {}

/// Iterator over mutable entries in list order.
pub struct IterMut<'a, K, V> {
    it: core::iter::Flatten<std::vec::IntoIter<Option<(Handle, &'a K, &'a mut V)>>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (Handle, &'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it.next()
    }
}
