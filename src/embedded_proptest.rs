#![cfg(test)]

// Property tests for EmbeddedHashTable over a SlotMap store. The test owns
// every record; the model tracks which ones are linked, in what list order,
// and which were unlinked or destroyed along the way.

use crate::embedded::EmbeddedHashTable;
use crate::hash_table_proptest::ConstBuildHasher;
use crate::link::{EmbeddedLink, Linked};
use crate::partition::{Exhaustion, Partition, PrimeSequence};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use slotmap::{new_key_type, SlotMap};
use std::collections::HashMap;
use std::hash::BuildHasher;

new_key_type! {
    struct RecId;
}

// Small key space so equal runs and collisions are common.
const KEYS: u8 = 6;

#[derive(Debug)]
struct Rec {
    tag: u8,
    link: EmbeddedLink<u8, RecId>,
}

impl Rec {
    fn new(tag: u8) -> Self {
        Self {
            tag,
            link: EmbeddedLink::new(),
        }
    }
}

impl Linked<RecId> for Rec {
    type Key = u8;
    fn link(&self) -> &EmbeddedLink<u8, RecId> {
        &self.link
    }
    fn link_mut(&mut self) -> &mut EmbeddedLink<u8, RecId> {
        &mut self.link
    }
}

type Store = SlotMap<RecId, Rec>;

// Positions are taken modulo the live (or detached) count so they stay
// meaningful while shrinking.
#[derive(Clone, Debug)]
enum Op {
    InsertUnique(u8),
    InsertEqual(u8),
    InsertEqualBefore(u8, usize),
    Relink(usize),
    Remove(usize),
    Delete(usize),
    RemoveKey(u8),
    RemoveDelete(u8),
    Move(usize, Option<usize>),
    Resize(u16),
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    let key = 0..KEYS;
    let op = prop_oneof![
        3 => key.clone().prop_map(Op::InsertUnique),
        3 => key.clone().prop_map(Op::InsertEqual),
        2 => (key.clone(), any::<usize>()).prop_map(|(k, p)| Op::InsertEqualBefore(k, p)),
        1 => any::<usize>().prop_map(Op::Relink),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::Delete),
        1 => key.clone().prop_map(Op::RemoveKey),
        1 => key.prop_map(Op::RemoveDelete),
        2 => (any::<usize>(), proptest::option::of(any::<usize>()))
            .prop_map(|(a, b)| Op::Move(a, b)),
        1 => (0u16..300).prop_map(Op::Resize),
    ];
    proptest::collection::vec(op, 1..100)
}

#[derive(Default)]
struct Model {
    list: Vec<RecId>,
    keys: HashMap<RecId, u8>,
    runs: HashMap<u8, Vec<RecId>>,
    detached: Vec<RecId>,
    deleted: Vec<RecId>,
}

impl Model {
    fn link(&mut self, id: RecId, k: u8, before: Option<RecId>) {
        let at = before
            .and_then(|b| self.list.iter().position(|&x| x == b))
            .unwrap_or(self.list.len());
        self.list.insert(at, id);
        self.runs.entry(k).or_default().push(id);
        self.keys.insert(id, k);
    }

    fn forget(&mut self, id: RecId) -> u8 {
        self.list.retain(|&x| x != id);
        let k = self.keys.remove(&id).expect("tracked record");
        if let Some(run) = self.runs.get_mut(&k) {
            run.retain(|&x| x != id);
            if run.is_empty() {
                self.runs.remove(&k);
            }
        }
        k
    }

    fn run_of(&self, k: u8) -> &[RecId] {
        self.runs.get(&k).map_or(&[], Vec::as_slice)
    }

    fn pick(&self, pos: usize) -> Option<RecId> {
        (!self.list.is_empty()).then(|| self.list[pos % self.list.len()])
    }
}

fn check_resize_keeps_bucket_order<S: BuildHasher, P: Partition>(
    sut: &mut EmbeddedHashTable<u8, RecId, S, P>,
    store: &mut Store,
    n: usize,
) -> Result<(), TestCaseError> {
    let before: Vec<RecId> = sut.hash_iter(&*store).collect();
    let list_before: Vec<RecId> = sut.iter(&*store).collect();
    let buckets_before = sut.bucket_count();
    let rebuilt = sut.resize(store, n).unwrap_or(false);
    if !rebuilt {
        prop_assert_eq!(sut.bucket_count(), buckets_before);
        return Ok(());
    }
    prop_assert!(sut.bucket_count() >= n);
    let old_pos: HashMap<RecId, usize> = before.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let after: Vec<RecId> = sut.hash_iter(&*store).collect();
    for pair in after.windows(2) {
        if sut.bucket_index_of(&*store, pair[0]) == sut.bucket_index_of(&*store, pair[1]) {
            prop_assert!(
                old_pos[&pair[0]] < old_pos[&pair[1]],
                "rebuild reordered records within a bucket"
            );
        }
    }
    let list_after: Vec<RecId> = sut.iter(&*store).collect();
    prop_assert_eq!(list_after, list_before);
    Ok(())
}

fn run_scenario<S: BuildHasher, P: Partition>(
    mut sut: EmbeddedHashTable<u8, RecId, S, P>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut store: Store = SlotMap::with_key();
    let mut model = Model::default();
    let mut buckets = sut.bucket_count();

    for op in ops {
        match op {
            Op::InsertUnique(k) => {
                let id = store.insert(Rec::new(k));
                let existing = model.run_of(k).first().copied();
                let (got, linked) = sut.insert_unique(&mut store, id, k);
                match existing {
                    Some(e) => {
                        prop_assert!(!linked, "duplicate key must be refused");
                        prop_assert_eq!(got, e);
                        prop_assert!(!store[id].link.is_contained());
                        model.detached.push(id);
                    }
                    None => {
                        prop_assert!(linked);
                        prop_assert_eq!(got, id);
                        model.link(id, k, None);
                    }
                }
            }
            Op::InsertEqual(k) => {
                let id = store.insert(Rec::new(k));
                sut.insert_equal(&mut store, id, k);
                model.link(id, k, None);
            }
            Op::InsertEqualBefore(k, pos) => {
                let before = model.pick(pos);
                let id = store.insert(Rec::new(k));
                sut.insert_equal_before(&mut store, id, k, before);
                model.link(id, k, before);
            }
            Op::Relink(pos) => {
                if model.detached.is_empty() {
                    continue;
                }
                let id = model.detached.swap_remove(pos % model.detached.len());
                let k = store[id].tag;
                let front = model.list.first().copied();
                let existing = model.run_of(k).first().copied();
                let (got, linked) = sut.insert_unique_before(&mut store, id, k, front);
                match existing {
                    Some(e) => {
                        prop_assert!(!linked);
                        prop_assert_eq!(got, e);
                        model.detached.push(id);
                    }
                    None => {
                        prop_assert!(linked);
                        model.link(id, k, front);
                    }
                }
            }
            Op::Remove(pos) => {
                let Some(id) = model.pick(pos) else { continue };
                let k = model.forget(id);
                prop_assert_eq!(sut.remove(&mut store, id), Some(k));
                prop_assert!(sut.remove(&mut store, id).is_none(), "second removal must miss");
                model.detached.push(id);
            }
            Op::Delete(pos) => {
                let Some(id) = model.pick(pos) else { continue };
                let k = model.forget(id);
                let rec = sut.delete(&mut store, id);
                prop_assert!(rec.is_some_and(|r| r.tag == k && !r.link.is_contained()));
                model.deleted.push(id);
            }
            Op::RemoveKey(k) => {
                let run = model.run_of(k).to_vec();
                for &id in &run {
                    model.forget(id);
                }
                prop_assert_eq!(sut.remove_key(&mut store, &k), run.clone());
                model.detached.extend(run);
            }
            Op::RemoveDelete(k) => {
                let run = model.run_of(k).to_vec();
                for &id in &run {
                    model.forget(id);
                }
                prop_assert_eq!(sut.remove_delete(&mut store, &k), run.len());
                model.deleted.extend(run);
            }
            Op::Move(a, b) => {
                if let Some(&loose) = model.detached.first() {
                    prop_assert!(!sut.move_before(&mut store, loose, None));
                }
                let Some(id) = model.pick(a) else { continue };
                let before = b.and_then(|b| model.pick(b));
                prop_assert!(sut.move_before(&mut store, id, before));
                if before != Some(id) {
                    model.list.retain(|&x| x != id);
                    let at = before
                        .and_then(|b| model.list.iter().position(|&x| x == b))
                        .unwrap_or(model.list.len());
                    model.list.insert(at, id);
                }
            }
            Op::Resize(n) => {
                check_resize_keeps_bucket_order(&mut sut, &mut store, usize::from(n))?;
            }
        }

        // Post-conditions after each op
        sut.assert_consistent(&store);
        let listed: Vec<RecId> = sut.iter(&store).collect();
        prop_assert_eq!(&listed, &model.list);
        for &id in &model.list {
            prop_assert_eq!(sut.key(&store, id), Some(&model.keys[&id]));
        }

        // Equal keys form one run, in the order the model recorded them.
        let hashed: Vec<RecId> = sut.hash_iter(&store).collect();
        for k in 0..KEYS {
            let run = model.run_of(k);
            prop_assert_eq!(sut.find(&store, &k), run.first().copied());
            prop_assert_eq!(sut.count(&store, &k), run.len());
            let range: Vec<RecId> = sut.equal_range(&store, &k).collect();
            prop_assert_eq!(range.as_slice(), run);
            if let Some(start) = run.first().and_then(|f| hashed.iter().position(|x| x == f)) {
                prop_assert_eq!(&hashed[start..start + run.len()], run);
            }
        }

        for &id in &model.detached {
            prop_assert!(!store[id].link.is_contained());
            prop_assert!(sut.key(&store, id).is_none());
        }
        for &id in &model.deleted {
            prop_assert!(!store.contains_key(id));
        }
        prop_assert_eq!(store.len(), model.list.len() + model.detached.len());
        prop_assert!(sut.bucket_count() >= buckets);
        buckets = sut.bucket_count();
        prop_assert_eq!(sut.len(), model.list.len());
        prop_assert_eq!(sut.is_empty(), model.list.is_empty());
    }

    sut.clear(&mut store);
    prop_assert!(store.values().all(|r| !r.link.is_contained()));
    Ok(())
}

// Property: list order, equal-key runs and lookups agree with the model
// after every operation, unlinked records read as detached, and resizing
// never reorders a bucket.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_embedded_state_machine(ops in arb_ops()) {
        run_scenario(EmbeddedHashTable::new(), ops)?;
    }

    #[test]
    fn prop_embedded_state_machine_prime_buckets(ops in arb_ops()) {
        let table: EmbeddedHashTable<u8, RecId, hashbrown::hash_map::DefaultHashBuilder, PrimeSequence> =
            EmbeddedHashTable::with_hasher_and_partition(Default::default(), PrimeSequence::new(Exhaustion::Refuse));
        run_scenario(table, ops)?;
    }

    #[test]
    fn prop_embedded_state_machine_with_collisions(ops in arb_ops()) {
        let table: EmbeddedHashTable<u8, RecId, ConstBuildHasher> =
            EmbeddedHashTable::with_hasher(ConstBuildHasher);
        run_scenario(table, ops)?;
    }
}
