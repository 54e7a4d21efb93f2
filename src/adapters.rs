//! Map and set adapters over the two engines.
//!
//! Each adapter fixes one insertion discipline (unique or equal keys) and
//! projects its element to a key: maps store `(K, V)` pairs, sets store the
//! element itself as the key with a unit value.

use crate::embedded::EmbeddedHashTable;
use crate::hash_table::{Handle, HashTable};
use crate::link::{Linked, RecordStore};
use crate::partition::{Partition, PowerOfTwo};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::Key;

/// Map with at most one entry per key, iterating in insertion order.
pub struct UniqueMap<K, V, S = DefaultHashBuilder, P = PowerOfTwo> {
    table: HashTable<K, V, S, P>,
}

impl<K, V> UniqueMap<K, V> {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<K, V, S: Default, P: Partition + Default> Default for UniqueMap<K, V, S, P> {
    fn default() -> Self {
        Self {
            table: HashTable::default(),
        }
    }
}

impl<K, V, S, P> UniqueMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    pub fn with_hasher_and_partition(hasher: S, partition: P) -> Self {
        Self {
            table: HashTable::with_hasher_and_partition(hasher, partition),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Inserts if `key` is absent. Returns false, leaving the stored value
    /// untouched, when it is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.table.insert_unique(key, value).1
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert_or_replace(&mut self, key: K, value: V) -> Handle {
        self.table.key_insert_unique(key, move || value).0
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get(q)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.get_mut(q)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(q)
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.table.find(q)?;
        self.table.remove(h).map(|(_, v)| v)
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.table.iter().map(|(_, k, v)| (k, v))
    }

    pub fn table(&self) -> &HashTable<K, V, S, P> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut HashTable<K, V, S, P> {
        &mut self.table
    }
}

impl<K, V, S, P> Extend<(K, V)> for UniqueMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.table.insert_unique(k, v);
        }
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for UniqueMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S, P: Partition> fmt::Debug for UniqueMap<K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.table, f)
    }
}

/// Map allowing several entries per key; entries for one key stay grouped.
pub struct MultiMap<K, V, S = DefaultHashBuilder, P = PowerOfTwo> {
    table: HashTable<K, V, S, P>,
}

impl<K, V> MultiMap<K, V> {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<K, V, S: Default, P: Partition + Default> Default for MultiMap<K, V, S, P> {
    fn default() -> Self {
        Self {
            table: HashTable::default(),
        }
    }
}

impl<K, V, S, P> MultiMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    pub fn with_hasher_and_partition(hasher: S, partition: P) -> Self {
        Self {
            table: HashTable::with_hasher_and_partition(hasher, partition),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn insert(&mut self, key: K, value: V) -> Handle {
        self.table.insert_equal(key, value)
    }

    pub fn count<Q>(&self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.count(q)
    }

    /// Values stored under `q`, oldest first.
    pub fn get_all<'a, Q>(&'a self, q: &'a Q) -> impl Iterator<Item = &'a V> + 'a
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.equal_range(q).map(|(_, _, v)| v)
    }

    pub fn remove_all<Q>(&mut self, q: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove_key(q)
    }

    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        self.table.remove(handle)
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.table.iter().map(|(_, k, v)| (k, v))
    }

    pub fn table(&self) -> &HashTable<K, V, S, P> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut HashTable<K, V, S, P> {
        &mut self.table
    }
}

impl<K, V, S, P> Extend<(K, V)> for MultiMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.table.insert_equal(k, v);
        }
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for MultiMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K: fmt::Debug, V: fmt::Debug, S, P: Partition> fmt::Debug for MultiMap<K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.table, f)
    }
}

/// Set of distinct elements, iterating in insertion order.
pub struct UniqueSet<T, S = DefaultHashBuilder, P = PowerOfTwo> {
    table: HashTable<T, (), S, P>,
}

impl<T> UniqueSet<T> {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<T, S: Default, P: Partition + Default> Default for UniqueSet<T, S, P> {
    fn default() -> Self {
        Self {
            table: HashTable::default(),
        }
    }
}

impl<T, S, P> UniqueSet<T, S, P>
where
    T: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns whether `value` was newly added.
    pub fn insert(&mut self, value: T) -> bool {
        self.table.insert_unique(value, ()).1
    }

    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.contains_key(q)
    }

    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove_key(q) > 0
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.table.keys()
    }
}

impl<T: Eq + Hash, S: BuildHasher, P: Partition> Extend<T> for UniqueSet<T, S, P> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.table.insert_unique(v, ());
        }
    }
}

impl<T: Eq + Hash> FromIterator<T> for UniqueSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: fmt::Debug, S, P: Partition> fmt::Debug for UniqueSet<T, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.table.keys()).finish()
    }
}

/// Set counting repeated elements; equal elements stay grouped.
pub struct MultiSet<T, S = DefaultHashBuilder, P = PowerOfTwo> {
    table: HashTable<T, (), S, P>,
}

impl<T> MultiSet<T> {
    pub fn new() -> Self {
        Self {
            table: HashTable::new(),
        }
    }
}

impl<T, S: Default, P: Partition + Default> Default for MultiSet<T, S, P> {
    fn default() -> Self {
        Self {
            table: HashTable::default(),
        }
    }
}

impl<T, S, P> MultiSet<T, S, P>
where
    T: Eq + Hash,
    S: BuildHasher,
    P: Partition,
{
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn insert(&mut self, value: T) {
        self.table.insert_equal(value, ());
    }

    pub fn count<Q>(&self, q: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.count(q)
    }

    /// Removes one occurrence of `q`; returns whether one was present.
    pub fn remove_one<Q>(&mut self, q: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.table.find(q) {
            Some(h) => self.table.remove(h).is_some(),
            None => false,
        }
    }

    pub fn remove_all<Q>(&mut self, q: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove_key(q)
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Elements in hash order, so equal elements come out together.
    pub fn iter_grouped(&self) -> impl Iterator<Item = &T> + '_ {
        self.table.hash_iter().map(|(_, k, _)| k)
    }

    /// Elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.table.keys()
    }
}

impl<T: Eq + Hash, S: BuildHasher, P: Partition> Extend<T> for MultiSet<T, S, P> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for v in iter {
            self.table.insert_equal(v, ());
        }
    }
}

impl<T: Eq + Hash> FromIterator<T> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<T: fmt::Debug, S, P: Partition> fmt::Debug for MultiSet<T, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.table.keys()).finish()
    }
}

/// Non-owning multimap index over caller-owned records.
///
/// Several indexes can thread the same records as long as each uses a
/// different embedded link.
pub struct EmbeddedMultiMap<K, Id, S = DefaultHashBuilder, P = PowerOfTwo> {
    table: EmbeddedHashTable<K, Id, S, P>,
}

impl<K, Id: Key> EmbeddedMultiMap<K, Id> {
    pub fn new() -> Self {
        Self {
            table: EmbeddedHashTable::new(),
        }
    }
}

impl<K, Id: Key, S: Default, P: Partition + Default> Default for EmbeddedMultiMap<K, Id, S, P> {
    fn default() -> Self {
        Self {
            table: EmbeddedHashTable::default(),
        }
    }
}

impl<K, Id, S, P> EmbeddedMultiMap<K, Id, S, P>
where
    K: Eq + Hash,
    Id: Key,
    S: BuildHasher,
    P: Partition,
{
    pub fn len(&self) -> usize {
        self.table.len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn insert<St>(&mut self, store: &mut St, id: Id, key: K)
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.table.insert_equal(store, id, key);
    }

    pub fn get_all<'a, St, Q>(&'a self, store: &'a St, q: &'a Q) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.equal_range(store, q)
    }

    pub fn count<St, Q>(&self, store: &St, q: &Q) -> usize
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.count(store, q)
    }

    /// Unlinks one record; it stays in the store.
    pub fn unlink<St>(&mut self, store: &mut St, id: Id) -> Option<K>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.table.remove(store, id)
    }

    /// Unlinks every record under `q`; they stay in the store.
    pub fn unlink_all<St, Q>(&mut self, store: &mut St, q: &Q) -> Vec<Id>
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.table.remove_key(store, q)
    }

    /// Ids in the order they were indexed.
    pub fn iter<'a, St>(&'a self, store: &'a St) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.table.iter(store)
    }

    /// Ids grouped by key.
    pub fn iter_grouped<'a, St>(&'a self, store: &'a St) -> impl Iterator<Item = Id> + 'a
    where
        St: RecordStore<Id>,
        St::Record: Linked<Id, Key = K>,
    {
        self.table.hash_iter(store)
    }

    pub fn table(&self) -> &EmbeddedHashTable<K, Id, S, P> {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut EmbeddedHashTable<K, Id, S, P> {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::EmbeddedLink;
    use slotmap::{DefaultKey, SlotMap};

    #[test]
    fn unique_map_keeps_first_value_unless_replaced() {
        let mut m = UniqueMap::new();
        assert!(m.insert("a", 1));
        assert!(!m.insert("a", 2));
        assert_eq!(m.get("a"), Some(&1));
        m.insert_or_replace("a", 3);
        assert_eq!(m.get("a"), Some(&3));
        assert_eq!(m.remove("a"), Some(3));
        assert!(m.is_empty());
    }

    #[test]
    fn unique_map_collects_in_insertion_order() {
        let m: UniqueMap<&str, i32> = [("z", 1), ("a", 2), ("z", 3), ("m", 4)].into_iter().collect();
        let pairs: Vec<_> = m.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(pairs, vec![("z", 1), ("a", 2), ("m", 4)]);
        assert_eq!(format!("{m:?}"), r#"{"z": 1, "a": 2, "m": 4}"#);
    }

    #[test]
    fn multi_map_groups_values_per_key() {
        let mut m = MultiMap::new();
        m.insert("x", 1);
        m.insert("y", 2);
        m.insert("x", 3);
        assert_eq!(m.count("x"), 2);
        assert_eq!(m.get_all("x").copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(m.count("nope"), 0);
        assert_eq!(m.remove_all("x"), 2);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn unique_set_rejects_duplicates() {
        let mut s: UniqueSet<String> = ["b", "a", "b"].into_iter().map(String::from).collect();
        assert_eq!(s.len(), 2);
        assert!(s.contains("a"));
        assert!(!s.insert("a".to_string()));
        assert!(s.remove("a"));
        assert!(!s.remove("a"));
        assert_eq!(s.iter().cloned().collect::<Vec<_>>(), vec!["b".to_string()]);
    }

    #[test]
    fn multi_set_counts_and_groups() {
        let mut s: MultiSet<u8> = [3, 1, 3, 2, 3].into_iter().collect();
        assert_eq!(s.count(&3), 3);
        assert!(s.remove_one(&3));
        assert_eq!(s.count(&3), 2);
        let grouped: Vec<_> = s.iter_grouped().copied().collect();
        let threes = grouped.iter().position(|&v| v == 3).unwrap();
        assert_eq!(&grouped[threes..threes + 2], &[3, 3]);
        assert_eq!(s.iter().copied().collect::<Vec<_>>(), vec![1, 3, 2, 3]);
        assert_eq!(s.remove_all(&3), 2);
        assert!(!s.remove_one(&3));
    }

    struct Person {
        city: EmbeddedLink<&'static str, DefaultKey>,
        name: &'static str,
    }

    impl Linked<DefaultKey> for Person {
        type Key = &'static str;
        fn link(&self) -> &EmbeddedLink<&'static str, DefaultKey> {
            &self.city
        }
        fn link_mut(&mut self) -> &mut EmbeddedLink<&'static str, DefaultKey> {
            &mut self.city
        }
    }

    #[test]
    fn embedded_multimap_indexes_without_owning() {
        let mut people = SlotMap::new();
        let mut by_city = EmbeddedMultiMap::new();
        for (name, city) in [("ann", "oslo"), ("bo", "rome"), ("cy", "oslo")] {
            let id = people.insert(Person {
                city: EmbeddedLink::new(),
                name,
            });
            by_city.insert(&mut people, id, city);
        }
        let oslo: Vec<_> = by_city
            .get_all(&people, &"oslo")
            .map(|id| people[id].name)
            .collect();
        assert_eq!(oslo, vec!["ann", "cy"]);
        assert_eq!(by_city.count(&people, &"rome"), 1);

        let grouped: Vec<_> = by_city.iter_grouped(&people).map(|id| people[id].name).collect();
        assert_eq!(grouped.len(), 3);

        let unlinked = by_city.unlink_all(&mut people, &"oslo");
        assert_eq!(unlinked.len(), 2);
        assert_eq!(people.len(), 3);
        assert_eq!(by_city.len(), 1);
        let rest: Vec<_> = by_city.iter(&people).map(|id| people[id].name).collect();
        assert_eq!(rest, vec!["bo"]);
    }
}
