//! Integration tests for replaying captured local changes into a second briefcase.

use changemerge_changeset::{
    ApplyStatus, ConflictCause, ConflictOccurrence, DbOpcode, Resolution, RowStore, Value,
};
use changemerge_store::{MemoryDatabase, OnDelete, TableSchema};
use proptest::prelude::*;

fn schema() -> Vec<TableSchema> {
    vec![
        TableSchema::new("Parent")
            .required("id")
            .column("label")
            .primary_key(&["id"]),
        TableSchema::new("Child")
            .required("id")
            .column("parent_id")
            .column("note")
            .primary_key(&["id"])
            .foreign_key(&["parent_id"], "Parent", OnDelete::Cascade),
        TableSchema::new("ec_Link")
            .required("id")
            .column("parent_id")
            .primary_key(&["id"])
            .foreign_key(&["parent_id"], "Parent", OnDelete::SetNull),
    ]
}

fn briefcase() -> MemoryDatabase {
    MemoryDatabase::with_schema(schema()).unwrap()
}

fn int(i: i64) -> Value {
    Value::Integer(i)
}

fn fail_on_conflict(occurrence: &ConflictOccurrence<'_>) -> Resolution {
    panic!(
        "unexpected {} conflict on {}",
        occurrence.cause,
        occurrence.record.dump()
    );
}

fn skip_all(_: &ConflictOccurrence<'_>) -> Resolution {
    Resolution::Skip
}

#[test]
fn push_then_pull_reproduces_rows() {
    let mut a = briefcase();
    let mut b = briefcase();

    a.local(|txn| {
        txn.insert("Parent", vec![int(1), "one".into()])?;
        txn.insert("Child", vec![int(10), int(1), "x".into()])?;
        txn.insert("ec_Link", vec![int(100), int(1)])
    })
    .unwrap();
    let first = a.take_local_changeset().unwrap();

    let status = b.apply_changeset(&first, &mut fail_on_conflict).unwrap();
    assert!(status.is_committed());
    b.set_parent_changeset_id(&first.id).unwrap();

    a.local(|txn| txn.update("Child", &[int(10)], &[("note", "y".into())]))
        .unwrap();
    let second = a.take_local_changeset().unwrap();
    assert_eq!(second.parent_id, first.id);

    b.apply_changeset(&second, &mut fail_on_conflict).unwrap();
    for table in ["Parent", "Child", "ec_Link"] {
        assert_eq!(a.rows(table).unwrap(), b.rows(table).unwrap());
    }
}

#[test]
fn delete_side_effects_conflict_on_replica() {
    let mut a = briefcase();
    let mut b = briefcase();

    a.local(|txn| {
        txn.insert("Parent", vec![int(1), "one".into()])?;
        txn.insert("Child", vec![int(10), int(1), Value::Null])?;
        txn.insert("ec_Link", vec![int(100), int(1)])
    })
    .unwrap();
    let seed = a.take_local_changeset().unwrap();
    b.apply_changeset(&seed, &mut fail_on_conflict).unwrap();

    a.local(|txn| txn.delete("Parent", &[int(1)])).unwrap();
    let delete = a.take_local_changeset().unwrap();
    assert_eq!(delete.len(), 3);
    assert_eq!(delete.records[0].opcode, DbOpcode::Delete);
    assert!(!delete.records[0].indirect);

    let mut seen = Vec::new();
    let mut record_causes = |occurrence: &ConflictOccurrence<'_>| {
        seen.push((occurrence.cause, occurrence.table().to_owned(), occurrence.opcode()));
        Resolution::Skip
    };
    let status = b.apply_changeset(&delete, &mut record_causes).unwrap();

    assert!(status.is_committed());
    // The replica's own delete already cascaded: the child row is gone and the
    // metadata link was nulled before the captured side effects arrive.
    assert_eq!(
        seen,
        vec![
            (ConflictCause::Data, "ec_Link".to_owned(), DbOpcode::Update),
            (ConflictCause::NotFound, "Child".to_owned(), DbOpcode::Delete),
        ]
    );
    assert_eq!(b.row_count("Parent").unwrap(), 0);
    assert_eq!(b.get("ec_Link", &[int(100)]).unwrap(), Some(vec![int(100), Value::Null]));
}

#[test]
fn aborted_apply_leaves_replica_untouched() {
    let mut a = briefcase();
    let mut b = briefcase();

    b.local(|txn| txn.insert("Parent", vec![int(2), "mine".into()]))
        .unwrap();
    let before = b.rows("Parent").unwrap();

    a.local(|txn| {
        txn.insert("Parent", vec![int(1), "one".into()])?;
        txn.insert("Parent", vec![int(2), "theirs".into()])
    })
    .unwrap();
    let incoming = a.take_local_changeset().unwrap();

    let mut abort = |_: &ConflictOccurrence<'_>| Resolution::Abort;
    let status = b.apply_changeset(&incoming, &mut abort).unwrap();

    assert_eq!(status, ApplyStatus::Aborted);
    assert_eq!(b.rows("Parent").unwrap(), before);
    assert!(b.has_pending_local_changes().unwrap());
}

#[derive(Debug, Clone)]
enum Edit {
    AddParent(i64),
    AddChild(i64, i64),
    Relabel(i64, String),
    DropParent(i64),
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0i64..8).prop_map(Edit::AddParent),
        (0i64..16, 0i64..8).prop_map(|(c, p)| Edit::AddChild(c, p)),
        (0i64..8, "[a-z]{1,6}").prop_map(|(p, s)| Edit::Relabel(p, s)),
        (0i64..8).prop_map(Edit::DropParent),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replayed_local_edits_converge(edits in prop::collection::vec(edit_strategy(), 0..24)) {
        let mut a = briefcase();
        let mut b = briefcase();

        for edit in &edits {
            // Edits that break a constraint are rolled back and not journaled.
            let _ = a.local(|txn| match edit {
                Edit::AddParent(p) => txn.insert("Parent", vec![int(*p), Value::Null]),
                Edit::AddChild(c, p) => {
                    txn.insert("Child", vec![int(*c), int(*p), Value::Null])
                }
                Edit::Relabel(p, s) => {
                    txn.update("Parent", &[int(*p)], &[("label", s.as_str().into())])
                }
                Edit::DropParent(p) => txn.delete("Parent", &[int(*p)]),
            });
        }

        if let Some(changeset) = a.take_local_changeset() {
            prop_assert!(changeset.verify_id());
            // Cascaded child deletes are captured as well, so a replica sees them as
            // already-deleted rows.
            let status = b.apply_changeset(&changeset, &mut skip_all).unwrap();
            prop_assert!(status.is_committed());
        }

        prop_assert_eq!(a.rows("Parent").unwrap(), b.rows("Parent").unwrap());
        prop_assert_eq!(a.rows("Child").unwrap(), b.rows("Child").unwrap());
        prop_assert_eq!(b.foreign_key_violation_count().unwrap(), 0);
    }
}
