// HashTable integration scenarios.
//
// Keys are u64s hashed to themselves so bucket placement is known up front:
// with the power-of-two partition a key lands in bucket `key & (n - 1)`.
// The invariants exercised:
// - A bucket's records form one contiguous run of the hash list.
// - List order is insertion order until `move_before` changes it, and no
//   resize ever touches it.
// - Equal keys stay adjacent and `find` returns the first of them.
use chained_hashtable::{Handle, HashTable, Order, Partition, PowerOfTwo, PrimeSequence};
use std::hash::{BuildHasher, Hasher};

#[derive(Clone, Default)]
struct Identity;
struct IdentityHasher(u64);
impl BuildHasher for Identity {
    type Hasher = IdentityHasher;
    fn build_hasher(&self) -> IdentityHasher {
        IdentityHasher(0)
    }
}
impl Hasher for IdentityHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }
    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

type Table<V> = HashTable<u64, V, Identity, PowerOfTwo>;

fn keys<V, P: Partition>(t: &HashTable<u64, V, Identity, P>, order: Order) -> Vec<u64> {
    t.iter_in(order).map(|(_, k, _)| *k).collect()
}

// Test: four keys sharing bucket 3 of 8.
// Verifies: both orders yield them as inserted, and each is found.
#[test]
fn colliding_keys_share_one_run() {
    let mut t: Table<&str> = HashTable::with_hasher(Identity);
    assert_eq!(t.bucket_count(), 8);
    for (k, v) in [(3, "k1"), (11, "k2"), (19, "k3"), (27, "k4")] {
        assert!(t.insert_unique(k, v).1);
    }
    assert_eq!(t.bucket_count(), 8);
    assert_eq!(keys(&t, Order::Hash), vec![3, 11, 19, 27]);
    assert_eq!(keys(&t, Order::List), vec![3, 11, 19, 27]);
    for k in [3, 11, 19, 27] {
        assert!(t.contains_key(&k));
    }
    assert!(!t.contains_key(&35));
}

// Test: interleaved buckets.
// Verifies: a key whose bucket already holds records joins that run rather
// than the front of the hash list.
#[test]
fn new_key_joins_existing_bucket_run() {
    let mut t: Table<()> = HashTable::with_hasher(Identity);
    t.insert_unique(1, ());
    t.insert_unique(2, ());
    t.insert_unique(9, ());
    // Empty buckets push to the front; 9 joins bucket 1 after key 1.
    assert_eq!(keys(&t, Order::Hash), vec![2, 1, 9]);
    assert_eq!(keys(&t, Order::List), vec![1, 2, 9]);
}

// Test: twenty sequential inserts.
// Verifies: the table doubles 8 -> 16 -> 32 and list order stays the
// insertion order after every step.
#[test]
fn growth_keeps_list_order() {
    let mut t: Table<u64> = HashTable::with_hasher(Identity);
    let mut seen = Vec::new();
    let mut sizes = vec![t.bucket_count()];
    for i in 0..20u64 {
        let k = i * 37 % 101;
        t.insert_unique(k, i);
        seen.push(k);
        if sizes.last() != Some(&t.bucket_count()) {
            sizes.push(t.bucket_count());
        }
        assert_eq!(keys(&t, Order::List), seen);
    }
    assert_eq!(sizes, vec![8, 16, 32]);
    for (i, k) in seen.iter().enumerate() {
        assert_eq!(t.get(k), Some(&(i as u64)));
    }
}

// Test: explicit resize.
// Verifies: bucket runs keep their relative order after a rebuild.
#[test]
fn resize_preserves_order_within_bucket() {
    let mut t: Table<()> = HashTable::with_hasher(Identity);
    for k in [5, 21, 13, 37, 29] {
        t.insert_equal(k, ());
    }
    assert_eq!(t.resize(16), Ok(true));
    // 16 buckets: 5, 21, 37 share bucket 5; 13, 29 share bucket 13.
    let hashed = keys(&t, Order::Hash);
    let pos = |k: u64| hashed.iter().position(|&x| x == k).unwrap();
    assert!(pos(5) < pos(21) && pos(21) < pos(37));
    assert!(pos(13) < pos(29));
    assert_eq!(keys(&t, Order::List), vec![5, 21, 13, 37, 29]);
    assert_eq!(t.resize(4), Ok(false));
    assert_eq!(t.bucket_count(), 16);
}

// Test: list reordering.
// Verifies: moving K3 before K1 changes iteration only; lookups and the
// equal run are untouched.
#[test]
fn move_before_reorders_list_only() {
    let mut t: Table<&str> = HashTable::with_hasher(Identity);
    let h1 = t.insert_equal(3, "k1");
    t.insert_equal(11, "k2");
    let h3 = t.insert_equal(19, "k3");
    t.insert_equal(27, "k4");
    let hash_before = keys(&t, Order::Hash);

    assert!(t.move_before(h3, Some(h1)));
    let vals: Vec<&str> = t.values().copied().collect();
    assert_eq!(vals, vec!["k3", "k1", "k2", "k4"]);
    assert_eq!(keys(&t, Order::Hash), hash_before);
    assert_eq!(t.find(&19), Some(h3));
    assert_eq!(t.equal_range(&19).count(), 1);

    // Moving to the end.
    assert!(t.move_before(h3, None));
    let vals: Vec<&str> = t.values().copied().collect();
    assert_eq!(vals, vec!["k1", "k2", "k4", "k3"]);
}

// Test: duplicate keys.
// Verifies: equal keys are adjacent in hash order, keep insertion order,
// and `find` returns the oldest.
#[test]
fn equal_keys_stay_adjacent() {
    let mut t: Table<u32> = HashTable::with_hasher(Identity);
    let a = t.insert_equal(4, 1);
    t.insert_equal(12, 2);
    t.insert_equal(4, 3);
    t.insert_equal(12, 4);
    t.insert_equal(4, 5);
    let run: Vec<u32> = t.equal_range(&4).map(|(_, _, v)| *v).collect();
    assert_eq!(run, vec![1, 3, 5]);
    assert_eq!(t.count(&4), 3);
    assert_eq!(t.find(&4), Some(a));
    assert_eq!(keys(&t, Order::Hash), vec![4, 4, 4, 12, 12]);

    assert_eq!(t.remove_key(&4), 3);
    assert_eq!(t.count(&4), 0);
    assert_eq!(keys(&t, Order::List), vec![12, 12]);
}

// Test: the prime partition.
// Verifies: buckets step through the prime table as the table grows.
#[test]
fn prime_partition_steps_through_primes() {
    let mut t: HashTable<u64, (), Identity, PrimeSequence> =
        HashTable::with_hasher_and_partition(Identity, PrimeSequence::default());
    assert_eq!(t.bucket_count(), 7);
    for k in 0..8 {
        t.insert_unique(k, ());
    }
    assert_eq!(t.bucket_count(), 13);
    for k in 8..14 {
        t.insert_unique(k, ());
    }
    assert_eq!(t.bucket_count(), 29);
    assert_eq!(keys(&t, Order::List), (0..14).collect::<Vec<_>>());
}

// Test: handles across removal.
// Verifies: a removed entry's handle no longer resolves and other handles
// are unaffected.
#[test]
fn handles_survive_unrelated_removal() {
    let mut t: Table<String> = HashTable::with_hasher(Identity);
    let hs: Vec<Handle> = (0..10).map(|k| t.insert_unique(k, k.to_string()).0).collect();
    assert_eq!(t.remove(hs[4]), Some((4, "4".to_string())));
    assert!(hs[4].value(&t).is_none());
    for (i, h) in hs.iter().enumerate().filter(|(i, _)| *i != 4) {
        assert_eq!(h.value(&t), Some(&i.to_string()));
        assert_eq!(h.key(&t), Some(&(i as u64)));
    }
    if let Some(v) = hs[0].value_mut(&mut t) {
        v.push('!');
    }
    assert_eq!(t.get(&0).map(String::as_str), Some("0!"));
}

// Test: range removal and clear.
// Verifies: a range erases a list-order span; clear empties and returns to
// the initial bucket count.
#[test]
fn remove_range_then_clear() {
    let mut t: Table<()> = HashTable::with_hasher(Identity);
    let hs: Vec<Handle> = (0..12).map(|k| t.insert_unique(k, ()).0).collect();
    assert_eq!(t.bucket_count(), 16);
    assert_eq!(t.remove_range(hs[2], Some(hs[5])), 3);
    assert_eq!(keys(&t, Order::List), vec![0, 1, 5, 6, 7, 8, 9, 10, 11]);
    assert_eq!(t.remove_range(hs[9], None), 3);
    assert_eq!(t.len(), 6);
    t.clear();
    assert!(t.is_empty());
    assert_eq!(t.bucket_count(), 8);
    assert!(t.first(Order::List).is_none());
}

// Test: swap.
// Verifies: two tables exchange contents wholesale and both stay usable.
#[test]
fn swap_exchanges_contents() {
    let mut a: Table<char> = HashTable::with_hasher(Identity);
    let mut b: Table<char> = HashTable::with_hasher(Identity);
    a.insert_unique(1, 'a');
    b.insert_unique(2, 'b');
    b.insert_unique(3, 'c');
    a.swap(&mut b);
    assert_eq!(keys(&a, Order::List), vec![2, 3]);
    assert_eq!(keys(&b, Order::List), vec![1]);
    a.insert_unique(4, 'd');
    b.insert_unique(5, 'e');
    assert_eq!(a.len(), 3);
    assert_eq!(b.get(&5), Some(&'e'));
}
