//! Benchmark utilities.
//!
//! Changesets are generated against the testkit briefcase schema, so every
//! benchmark exercises the real row store.

use changemerge_changeset::{ChangeRecord, Changeset, Value};
use changemerge_engine::{MergeConfig, MergeSession};
use changemerge_store::MemoryDatabase;
use changemerge_testkit::{aspect, element, new_briefcase};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generate a random alphanumeric label of `len` characters.
pub fn random_label(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generate a changeset inserting `count` elements, each owning `aspects` aspects.
pub fn insert_changeset(parent_id: &str, count: usize, aspects: usize) -> Changeset {
    let mut records = Vec::with_capacity(count * (1 + aspects));
    for i in 0..count as i64 {
        let code = format!("E{i}");
        records.push(ChangeRecord::insert(
            "Element",
            &[0],
            element(i, &code, &random_label(16)),
        ));
        for j in 0..aspects as i64 {
            let id = i * aspects as i64 + j;
            records.push(ChangeRecord::insert(
                "Aspect",
                &[0],
                aspect(id, i, &random_label(32)),
            ));
        }
    }
    Changeset::new(parent_id, records)
}

/// Create a briefcase holding the rows of `seed`, chained onto it.
pub fn seeded_briefcase(seed: &Changeset) -> MemoryDatabase {
    let mut db = new_briefcase();
    let outcome =
        MergeSession::new(&mut db, MergeConfig::default()).pull(std::slice::from_ref(seed));
    assert!(outcome.is_success(), "seed changeset should apply cleanly");
    db
}

/// Generate a changeset deleting every element of `seed`.
///
/// Aspect deletes appear as indirect records after each element delete, which
/// the receiving briefcase has already cascaded away.
pub fn cascade_delete_changeset(seed: &Changeset) -> Changeset {
    let mut remote = seeded_briefcase(seed);
    let keys: Vec<Value> = remote
        .rows("Element")
        .expect("Element table should exist")
        .into_iter()
        .map(|row| row[0].clone())
        .collect();
    remote
        .local(|txn| {
            keys.iter()
                .try_for_each(|key| txn.delete("Element", std::slice::from_ref(key)))
        })
        .expect("deletes should succeed");
    remote
        .take_local_changeset()
        .expect("deletes should produce a changeset")
}
