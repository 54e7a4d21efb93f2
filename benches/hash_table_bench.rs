use chained_hashtable::{EmbeddedHashTable, EmbeddedLink, Handle, HashTable, Linked, Order, PrimeSequence};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use slotmap::{DefaultKey, SlotMap};
use std::time::Duration;

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

fn bench_insert_unique_100k(c: &mut Criterion) {
    c.bench_function("table::insert_unique_100k", |b| {
        b.iter_batched(
            HashTable::<String, u64>::new,
            |mut m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    m.insert_unique(key(x), i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_insert_unique_prime_100k(c: &mut Criterion) {
    c.bench_function("table::insert_unique_prime_100k", |b| {
        b.iter_batched(
            || {
                HashTable::<String, u64, _, PrimeSequence>::with_hasher(
                    hashbrown::hash_map::DefaultHashBuilder::default(),
                )
            },
            |mut m| {
                for (i, x) in lcg(1).take(100_000).enumerate() {
                    m.insert_unique(key(x), i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_insert_equal_dup_heavy(c: &mut Criterion) {
    // 100k inserts over 1k distinct keys: runs of about 100 equal keys.
    c.bench_function("table::insert_equal_100k_over_1k_keys", |b| {
        let keys: Vec<String> = lcg(3).take(1_000).map(key).collect();
        b.iter_batched(
            HashTable::<String, u64>::new,
            |mut m| {
                for (i, x) in lcg(9).take(100_000).enumerate() {
                    m.insert_equal(keys[(x as usize) % keys.len()].clone(), i as u64);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_remove_random_10k(c: &mut Criterion) {
    c.bench_function("table::remove_random_10k_of_110k", |b| {
        b.iter_batched(
            || {
                let mut m = HashTable::new();
                let handles: Vec<Handle> = lcg(5)
                    .take(110_000)
                    .enumerate()
                    .map(|(i, x)| m.insert_unique(key(x), i as u64).0)
                    .collect();
                let n = handles.len();
                let mut sel = std::collections::HashSet::with_capacity(10_000);
                let mut s = 0x9e3779b97f4a7c15u64;
                while sel.len() < 10_000 {
                    s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                    sel.insert((s as usize) % n);
                }
                let to_remove: Vec<Handle> = sel.into_iter().map(|i| handles[i]).collect();
                (m, to_remove)
            },
            |(mut m, to_remove)| {
                for h in to_remove {
                    let _ = m.remove(h);
                }
                black_box(m)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    c.bench_function("table::find_hit_10k_on_100k", |b| {
        let mut m = HashTable::new();
        let keys: Vec<_> = lcg(7).take(100_000).map(key).collect();
        for (i, k) in keys.iter().enumerate() {
            m.insert_unique(k.clone(), i as u64);
        }
        let n = keys.len();
        let mut s = 0x9e3779b97f4a7c15u64;
        let queries: Vec<String> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                keys[(s as usize) % n].clone()
            })
            .collect();
        b.iter(|| {
            for k in &queries {
                black_box(m.find(k));
            }
        })
    });
}

fn bench_find_miss_10k(c: &mut Criterion) {
    c.bench_function("table::find_miss_10k_on_100k", |b| {
        let mut m = HashTable::new();
        for (i, x) in lcg(11).take(100_000).enumerate() {
            m.insert_unique(key(x), i as u64);
        }
        let misses: Vec<String> = lcg(0xdead_beef).take(10_000).map(key).collect();
        b.iter(|| {
            for k in &misses {
                black_box(m.find(k));
            }
        })
    });
}

fn bench_iter_orders(c: &mut Criterion) {
    let mut m = HashTable::new();
    for (i, x) in lcg(13).take(100_000).enumerate() {
        m.insert_unique(key(x), i as u64);
    }
    c.bench_function("table::iter_list_100k", |b| {
        b.iter(|| black_box(m.iter().map(|(_, _, v)| *v).sum::<u64>()))
    });
    c.bench_function("table::iter_hash_100k", |b| {
        b.iter(|| black_box(m.iter_in(Order::Hash).map(|(_, _, v)| *v).sum::<u64>()))
    });
}

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

fn bench_embedded_link_unlink_100k(c: &mut Criterion) {
    c.bench_function("embedded::link_unlink_100k", |b| {
        b.iter_batched(
            || {
                let mut store = SlotMap::new();
                let ids: Vec<DefaultKey> = (0..100_000)
                    .map(|_| store.insert(Rec { link: EmbeddedLink::new() }))
                    .collect();
                (store, ids)
            },
            |(mut store, ids)| {
                let mut index = EmbeddedHashTable::new();
                for (&id, x) in ids.iter().zip(lcg(17)) {
                    index.insert_equal(&mut store, id, x % 50_000);
                }
                for &id in &ids {
                    index.remove(&mut store, id);
                }
                black_box((store, index))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_insert;
    config = bench_config();
    targets = bench_insert_unique_100k,
              bench_insert_unique_prime_100k,
              bench_insert_equal_dup_heavy
}
criterion_group! {
    name = benches_ops;
    config = bench_config();
    targets = bench_remove_random_10k,
              bench_find_hit_10k,
              bench_find_miss_10k,
              bench_iter_orders,
              bench_embedded_link_unlink_100k
}
criterion_main!(benches_insert, benches_ops);
