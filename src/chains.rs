//! The chain algorithm shared by the owned and the embedded table.
//!
//! `Chains` owns the bucket array and the sentinel root. Records, and the
//! link fields inside them, live in a `RecordStore` passed into every call,
//! so the same code drives container-owned nodes and caller-owned records.
//!
//! Two doubly linked lists thread the same records:
//! - hash order: records grouped into one contiguous run per bucket, the
//!   bucket array pointing at the first record of each run;
//! - list order: insertion order unless reordered with `move_before`.
//!
//! A link value of `None` addresses the sentinel (`root`), whose hash and
//! list slots hold the heads and tails of both lists. Because the sentinel
//! is never a record it carries no key and can never match a lookup.

use crate::error::CapacityError;
use crate::link::{KeyOf, Linked, Links, Owner, RecordStore};
use crate::partition::Partition;
use slotmap::Key;

/// Which of the two orders to walk.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum Order {
    /// Insertion order, as adjusted by `move_before`.
    #[default]
    List,
    /// Hash-chain order: bucket runs back to back.
    Hash,
}

/// Hash-order position for a record about to be linked.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Slot<Id> {
    bucket: usize,
    before: Option<Id>,
    opens_bucket: bool,
}

#[derive(Copy, Clone, Debug)]
pub(crate) enum Probe<Id> {
    Found(Id),
    Vacant(Slot<Id>),
}

#[inline]
fn record<Id: Key, St: RecordStore<Id>>(store: &St, id: Id) -> &St::Record {
    store
        .record(id)
        .expect("linked id missing from its record store")
}

#[inline]
fn record_mut<Id: Key, St: RecordStore<Id>>(store: &mut St, id: Id) -> &mut St::Record {
    store
        .record_mut(id)
        .expect("linked id missing from its record store")
}

#[inline]
fn hash_of<Id: Key, St: RecordStore<Id>>(store: &St, id: Id) -> u64 {
    record(store, id).link().hash
}

#[derive(Clone, Debug)]
pub(crate) struct Chains<Id, P> {
    buckets: Vec<Option<Id>>,
    root: Links<Id>,
    len: usize,
    partition: P,
    growth_refused: bool,
    owner: Owner,
}

impl<Id, P> Chains<Id, P> {
    #[inline]
    pub(crate) fn owner(&self) -> Owner {
        self.owner
    }
}

impl<Id: Key, P: Partition> Chains<Id, P> {
    pub(crate) fn new(partition: P) -> Self {
        Self {
            buckets: vec![None; P::INITIAL_SIZE],
            root: Links::detached(),
            len: 0,
            partition,
            growth_refused: false,
            owner: Owner::fresh(),
        }
    }

    /// Whether `id` is linked, asserting in debug builds that a linked
    /// record was linked by this table.
    pub(crate) fn holds<St: RecordStore<Id>>(&self, store: &St, id: Id) -> bool {
        let Some(record) = store.record(id) else {
            return false;
        };
        let link = record.link();
        if !link.is_contained() {
            return false;
        }
        debug_assert_eq!(
            link.owner, self.owner,
            "record is linked into a different table"
        );
        true
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn partition(&self) -> &P {
        &self.partition
    }

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        self.partition.bucket_index(hash, self.buckets.len())
    }

    #[inline]
    fn links<'a, St: RecordStore<Id>>(&'a self, store: &'a St, at: Option<Id>) -> &'a Links<Id> {
        match at {
            None => &self.root,
            Some(id) => &record(store, id).link().links,
        }
    }

    #[inline]
    fn links_mut<'a, St: RecordStore<Id>>(
        &'a mut self,
        store: &'a mut St,
        at: Option<Id>,
    ) -> &'a mut Links<Id> {
        match at {
            None => &mut self.root,
            Some(id) => &mut record_mut(store, id).link_mut().links,
        }
    }

    #[inline]
    fn matches<St, F>(store: &St, id: Id, hash: u64, eq: &F) -> bool
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool,
    {
        let link = record(store, id).link();
        link.hash == hash && link.key.as_ref().is_some_and(eq)
    }

    /// First record of the list (or hash chain).
    #[inline]
    pub(crate) fn first(&self, order: Order) -> Option<Id> {
        match order {
            Order::List => self.root.list_next,
            Order::Hash => self.root.hash_next,
        }
    }

    /// Successor of `id` in the given order; `None` at the end.
    #[inline]
    pub(crate) fn next<St: RecordStore<Id>>(&self, store: &St, id: Id, order: Order) -> Option<Id> {
        let links = self.links(store, Some(id));
        match order {
            Order::List => links.list_next,
            Order::Hash => links.hash_next,
        }
    }

    #[inline]
    pub(crate) fn prev<St: RecordStore<Id>>(&self, store: &St, id: Id, order: Order) -> Option<Id> {
        let links = self.links(store, Some(id));
        match order {
            Order::List => links.list_prev,
            Order::Hash => links.hash_prev,
        }
    }

    pub(crate) fn walk<'a, St: RecordStore<Id>>(
        &'a self,
        store: &'a St,
        order: Order,
    ) -> Walk<'a, Id, St, P> {
        Walk {
            chains: self,
            store,
            next: self.first(order),
            order,
            remaining: self.len,
        }
    }

    /// Walks the bucket run for `hash`. `Ok` is the first record whose
    /// cached hash and key both match; `Err` is where a new record would be
    /// linked: before the record that ends the run, or at the front of the
    /// hash chain when the bucket is empty.
    fn scan_bucket<St, F>(&self, store: &St, hash: u64, eq: &F) -> Result<Id, Slot<Id>>
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool,
    {
        let bucket = self.bucket_of(hash);
        let Some(mut cur) = self.buckets[bucket] else {
            return Err(Slot {
                bucket,
                before: self.root.hash_next,
                opens_bucket: true,
            });
        };
        loop {
            if Self::matches(store, cur, hash, eq) {
                return Ok(cur);
            }
            match self.links(store, Some(cur)).hash_next {
                Some(next) if self.bucket_of(hash_of(store, next)) == bucket => cur = next,
                end => {
                    return Err(Slot {
                        bucket,
                        before: end,
                        opens_bucket: false,
                    })
                }
            }
        }
    }

    pub(crate) fn probe_unique<St, F>(&self, store: &St, hash: u64, eq: F) -> Probe<Id>
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool,
    {
        match self.scan_bucket(store, hash, &eq) {
            Ok(id) => Probe::Found(id),
            Err(slot) => Probe::Vacant(slot),
        }
    }

    /// Like `probe_unique`, but an existing equal run is skipped so the new
    /// record lands right after its last member.
    pub(crate) fn probe_equal<St, F>(&self, store: &St, hash: u64, eq: F) -> Slot<Id>
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool,
    {
        let mut last = match self.scan_bucket(store, hash, &eq) {
            Ok(first) => first,
            Err(slot) => return slot,
        };
        loop {
            match self.links(store, Some(last)).hash_next {
                Some(next) if Self::matches(store, next, hash, &eq) => last = next,
                end => {
                    return Slot {
                        bucket: self.bucket_of(hash),
                        before: end,
                        opens_bucket: false,
                    }
                }
            }
        }
    }

    pub(crate) fn find<St, F>(&self, store: &St, hash: u64, eq: F) -> Option<Id>
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool,
    {
        self.scan_bucket(store, hash, &eq).ok()
    }

    /// All records equal to the probed key, in hash order.
    pub(crate) fn equal_run<'a, St, F>(
        &'a self,
        store: &'a St,
        hash: u64,
        eq: F,
    ) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        F: Fn(&KeyOf<St, Id>) -> bool + 'a,
    {
        let first = self.scan_bucket(store, hash, &eq).ok();
        core::iter::successors(first, move |&id| {
            self.links(store, Some(id))
                .hash_next
                .filter(|&next| Self::matches(store, next, hash, &eq))
        })
    }

    /// Links `id`, whose key and hash are already attached, at `slot` in
    /// hash order and before `list_before` in list order.
    pub(crate) fn link<St: RecordStore<Id>>(
        &mut self,
        store: &mut St,
        id: Id,
        slot: Slot<Id>,
        list_before: Option<Id>,
    ) {
        debug_assert_eq!(slot.bucket, self.bucket_of(hash_of(store, id)));
        self.splice_hash(store, id, slot.before);
        if slot.opens_bucket {
            self.buckets[slot.bucket] = Some(id);
        }
        self.splice_list(store, id, list_before);
        self.len += 1;
    }

    fn splice_hash<St: RecordStore<Id>>(&mut self, store: &mut St, id: Id, before: Option<Id>) {
        let prev = self.links(store, before).hash_prev;
        let links = self.links_mut(store, Some(id));
        links.hash_prev = prev;
        links.hash_next = before;
        self.links_mut(store, prev).hash_next = Some(id);
        self.links_mut(store, before).hash_prev = Some(id);
    }

    fn splice_list<St: RecordStore<Id>>(&mut self, store: &mut St, id: Id, before: Option<Id>) {
        let prev = self.links(store, before).list_prev;
        let links = self.links_mut(store, Some(id));
        links.list_prev = prev;
        links.list_next = before;
        self.links_mut(store, prev).list_next = Some(id);
        self.links_mut(store, before).list_prev = Some(id);
    }

    /// Removes `id` from both orders in O(1). The key stays attached; the
    /// caller decides what happens to the record.
    pub(crate) fn unlink<St: RecordStore<Id>>(&mut self, store: &mut St, id: Id) {
        let links = *self.links(store, Some(id));
        let bucket = self.bucket_of(hash_of(store, id));
        if self.buckets[bucket] == Some(id) {
            // The run continues only if the successor hashes to this bucket.
            self.buckets[bucket] = match links.hash_next {
                Some(next) if self.bucket_of(hash_of(store, next)) == bucket => Some(next),
                _ => None,
            };
        }
        self.links_mut(store, links.hash_prev).hash_next = links.hash_next;
        self.links_mut(store, links.hash_next).hash_prev = links.hash_prev;
        self.links_mut(store, links.list_prev).list_next = links.list_next;
        self.links_mut(store, links.list_next).list_prev = links.list_prev;
        *self.links_mut(store, Some(id)) = Links::detached();
        self.len -= 1;
    }

    /// Repositions `id` immediately before `before` in list order. Hash
    /// order is untouched.
    pub(crate) fn move_before<St: RecordStore<Id>>(
        &mut self,
        store: &mut St,
        id: Id,
        before: Option<Id>,
    ) {
        let links = *self.links(store, Some(id));
        if before == Some(id) || links.list_next == before {
            return;
        }
        self.links_mut(store, links.list_prev).list_next = links.list_next;
        self.links_mut(store, links.list_next).list_prev = links.list_prev;
        self.splice_list(store, id, before);
    }

    /// Grows the bucket array so it holds at least `minimum` buckets.
    /// Never shrinks. Returns whether the array was rebuilt.
    pub(crate) fn resize<St: RecordStore<Id>>(
        &mut self,
        store: &mut St,
        minimum: usize,
    ) -> Result<bool, CapacityError> {
        let current = self.buckets.len();
        if minimum <= current {
            return Ok(false);
        }
        let target = self.partition.grow(current, minimum)?;
        if target <= current {
            return Ok(false);
        }
        self.rebuild(store, target);
        Ok(true)
    }

    /// Growth ahead of a single insertion. A refusal from the partition
    /// policy is not an error here: the table keeps its buckets and chains
    /// get longer.
    pub(crate) fn reserve_one<St: RecordStore<Id>>(&mut self, store: &mut St) {
        if let Err(err) = self.resize(store, self.len + 1) {
            if !self.growth_refused {
                self.growth_refused = true;
                tracing::warn!(%err, len = self.len, "bucket array cannot grow further");
            }
        }
    }

    // Walks the old hash chain from tail to head and pushes every record to
    // the front of its new bucket run. Walking backwards while inserting at
    // the front keeps each bucket's records in their previous relative order.
    fn rebuild<St: RecordStore<Id>>(&mut self, store: &mut St, bucket_count: usize) {
        tracing::trace!(
            from = self.buckets.len(),
            to = bucket_count,
            len = self.len,
            "rebuilding bucket array"
        );
        let mut cur = self.root.hash_prev;
        self.buckets = vec![None; bucket_count];
        self.root.hash_next = None;
        self.root.hash_prev = None;
        while let Some(id) = cur {
            cur = self.links(store, Some(id)).hash_prev;
            let bucket = self.bucket_of(hash_of(store, id));
            let before = match self.buckets[bucket] {
                Some(head) => Some(head),
                None => self.root.hash_next,
            };
            self.splice_hash(store, id, before);
            self.buckets[bucket] = Some(id);
        }
    }

    /// Forgets every link and returns to a fresh `INITIAL_SIZE` bucket
    /// array. Records must already have been detached or dropped.
    pub(crate) fn reset(&mut self) {
        self.buckets = vec![None; P::INITIAL_SIZE];
        self.root = Links::detached();
        self.len = 0;
        self.growth_refused = false;
    }

    #[cfg(test)]
    pub(crate) fn bucket_index_of<St: RecordStore<Id>>(&self, store: &St, id: Id) -> usize {
        self.bucket_of(hash_of(store, id))
    }

    /// Checks both lists' back-links, lengths and membership, and that every
    /// bucket's records form one contiguous run headed by its bucket entry.
    #[cfg(test)]
    pub(crate) fn assert_consistent<St: RecordStore<Id>>(&self, store: &St) {
        use std::collections::HashSet;

        let mut hash_members = HashSet::new();
        let mut runs_seen = HashSet::new();
        let mut prev: Option<Id> = None;
        let mut prev_bucket: Option<usize> = None;
        let mut cur = self.root.hash_next;
        while let Some(id) = cur {
            assert!(hash_members.insert(id), "hash chain revisits a record");
            assert!(hash_members.len() <= self.len, "hash chain longer than len");
            let links = self.links(store, Some(id));
            assert_eq!(links.hash_prev, prev, "hash_prev back-link broken");
            assert!(record(store, id).link().is_contained());
            assert_eq!(record(store, id).link().owner, self.owner, "record owned by another table");
            let bucket = self.bucket_index_of(store, id);
            if prev_bucket != Some(bucket) {
                assert!(runs_seen.insert(bucket), "bucket {bucket} split into several runs");
                assert_eq!(self.buckets[bucket], Some(id), "bucket {bucket} head mismatch");
            }
            prev_bucket = Some(bucket);
            prev = Some(id);
            cur = links.hash_next;
        }
        assert_eq!(self.root.hash_prev, prev, "hash tail mismatch");
        assert_eq!(hash_members.len(), self.len);
        for (bucket, head) in self.buckets.iter().enumerate() {
            assert_eq!(head.is_some(), runs_seen.contains(&bucket), "stale bucket {bucket}");
        }

        let mut list_members = HashSet::new();
        let mut prev: Option<Id> = None;
        let mut cur = self.root.list_next;
        while let Some(id) = cur {
            assert!(list_members.insert(id), "list revisits a record");
            assert!(list_members.len() <= self.len, "list longer than len");
            let links = self.links(store, Some(id));
            assert_eq!(links.list_prev, prev, "list_prev back-link broken");
            prev = Some(id);
            cur = links.list_next;
        }
        assert_eq!(self.root.list_prev, prev, "list tail mismatch");
        assert_eq!(list_members, hash_members);
    }
}

/// Iterator over record ids in one of the two orders.
pub(crate) struct Walk<'a, Id, St, P> {
    chains: &'a Chains<Id, P>,
    store: &'a St,
    next: Option<Id>,
    order: Order,
    remaining: usize,
}

impl<'a, Id: Key, St: RecordStore<Id>, P: Partition> Iterator for Walk<'a, Id, St, P> {
    type Item = Id;

    #[inline]
    fn next(&mut self) -> Option<Id> {
        let id = self.next?;
        self.next = self.chains.next(self.store, id, self.order);
        self.remaining = self.remaining.saturating_sub(1);
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, Id: Key, St: RecordStore<Id>, P: Partition> ExactSizeIterator for Walk<'a, Id, St, P> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::EmbeddedLink;
    use crate::partition::PowerOfTwo;
    use slotmap::{DefaultKey, SlotMap};

    struct Rec {
        link: EmbeddedLink<u64, DefaultKey>,
    }

    impl Linked<DefaultKey> for Rec {
        type Key = u64;
        fn link(&self) -> &EmbeddedLink<u64, DefaultKey> {
            &self.link
        }
        fn link_mut(&mut self) -> &mut EmbeddedLink<u64, DefaultKey> {
            &mut self.link
        }
    }

    // Keys double as their own hash so bucket placement is predictable.
    fn push(
        chains: &mut Chains<DefaultKey, PowerOfTwo>,
        store: &mut SlotMap<DefaultKey, Rec>,
        key: u64,
    ) -> DefaultKey {
        chains.reserve_one(store);
        let slot = chains.probe_equal(store, key, |k| *k == key);
        let id = store.insert(Rec {
            link: EmbeddedLink::new(),
        });
        store[id].link.attach(key, key, chains.owner());
        chains.link(store, id, slot, None);
        id
    }

    fn keys(
        chains: &Chains<DefaultKey, PowerOfTwo>,
        store: &SlotMap<DefaultKey, Rec>,
        order: Order,
    ) -> Vec<u64> {
        chains
            .walk(store, order)
            .map(|id| store[id].link.hash)
            .collect()
    }

    #[test]
    fn empty_bucket_opens_at_hash_front() {
        let mut store = SlotMap::new();
        let mut chains = Chains::new(PowerOfTwo);
        push(&mut chains, &mut store, 1);
        push(&mut chains, &mut store, 2);
        assert_eq!(keys(&chains, &store, Order::Hash), vec![2, 1]);
        assert_eq!(keys(&chains, &store, Order::List), vec![1, 2]);
        chains.assert_consistent(&store);
    }

    #[test]
    fn erasing_bucket_head_hands_bucket_to_successor_in_same_run() {
        let mut store = SlotMap::new();
        let mut chains = Chains::new(PowerOfTwo);
        let a = push(&mut chains, &mut store, 3);
        let b = push(&mut chains, &mut store, 11);
        // 4 opens its own bucket at the front, so the run for 3 is [3, 11].
        push(&mut chains, &mut store, 4);
        chains.unlink(&mut store, a);
        assert_eq!(chains.buckets[3], Some(b));
        chains.unlink(&mut store, b);
        assert_eq!(chains.buckets[3], None);
        chains.assert_consistent(&store);
    }

    #[test]
    fn walk_reports_exact_size() {
        let mut store = SlotMap::new();
        let mut chains = Chains::new(PowerOfTwo);
        for k in 0..5 {
            push(&mut chains, &mut store, k);
        }
        let walk = chains.walk(&store, Order::List);
        assert_eq!(walk.len(), 5);
    }

    #[test]
    fn rebuild_keeps_relative_order_inside_buckets() {
        let mut store = SlotMap::new();
        let mut chains = Chains::new(PowerOfTwo);
        // All land in bucket 1 of 8; after growing to 16 they split into
        // buckets 1 and 9 by parity of the fourth bit.
        for k in [1, 9, 17, 25, 33, 41] {
            push(&mut chains, &mut store, k);
        }
        assert!(chains.resize(&mut store, 16).unwrap());
        assert_eq!(chains.bucket_count(), 16);
        let hash_order = keys(&chains, &store, Order::Hash);
        let low: Vec<_> = hash_order.iter().copied().filter(|k| k % 16 == 1).collect();
        let high: Vec<_> = hash_order.iter().copied().filter(|k| k % 16 == 9).collect();
        assert_eq!(low, vec![1, 17, 33]);
        assert_eq!(high, vec![9, 25, 41]);
        assert_eq!(keys(&chains, &store, Order::List), vec![1, 9, 17, 25, 33, 41]);
        chains.assert_consistent(&store);
    }

    #[test]
    fn resize_never_shrinks() {
        let mut store: SlotMap<DefaultKey, Rec> = SlotMap::new();
        let mut chains = Chains::new(PowerOfTwo);
        assert!(chains.resize(&mut store, 64).unwrap());
        assert!(!chains.resize(&mut store, 4).unwrap());
        assert_eq!(chains.bucket_count(), 64);
    }
}
