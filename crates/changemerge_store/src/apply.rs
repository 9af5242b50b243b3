//! Changeset replay with conflict reporting.

use crate::database::{delete_cascading, MemoryDatabase};
use crate::table::Table;
use changemerge_changeset::{
    ApplyStatus, ChangeRecord, Changeset, ConflictCause, ConflictHandler, ConflictOccurrence,
    DbOpcode, Resolution, StoreError, StoreResult, Value,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Guard that restores the pre-apply table state unless committed.
struct ApplyScope<'a> {
    db: &'a mut MemoryDatabase,
    snapshot: Option<BTreeMap<String, Table>>,
}

impl<'a> ApplyScope<'a> {
    fn begin(db: &'a mut MemoryDatabase) -> Self {
        let snapshot = Some(db.tables.clone());
        Self { db, snapshot }
    }

    fn commit(mut self) {
        self.snapshot = None;
    }
}

impl Drop for ApplyScope<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.db.tables = snapshot;
            debug!("changeset apply rolled back");
        }
    }
}

/// What to do after one record.
enum Step {
    Continue,
    Abort,
}

pub(crate) fn apply_changeset(
    db: &mut MemoryDatabase,
    changeset: &Changeset,
    handler: &mut dyn ConflictHandler,
) -> StoreResult<ApplyStatus> {
    debug!(
        changeset = changeset.short_id(),
        records = changeset.len(),
        "applying changeset"
    );
    let violations_before = db.foreign_key_violations().len();
    let scope = ApplyScope::begin(db);

    let mut records_applied = 0;
    let mut records_filtered = 0;
    let mut filter_cache: BTreeMap<&str, bool> = BTreeMap::new();

    for record in changeset {
        let accepted = *filter_cache
            .entry(record.table.as_str())
            .or_insert_with(|| handler.filter_table(&record.table));
        if !accepted {
            records_filtered += 1;
            continue;
        }

        let key = validate_framing(scope.db, record)?;
        let step = match record.opcode {
            DbOpcode::Insert => apply_insert(scope.db, record, key, handler)?,
            DbOpcode::Update => apply_update(scope.db, record, key, handler)?,
            DbOpcode::Delete => apply_delete(scope.db, record, key, handler)?,
        };
        if let Step::Abort = step {
            return Ok(ApplyStatus::Aborted);
        }
        records_applied += 1;
    }

    let violations = scope.db.foreign_key_violations();
    if violations.len() > violations_before {
        let culprit = changeset
            .iter()
            .filter(|r| filter_cache.get(r.table.as_str()).copied().unwrap_or(false))
            .find(|r| {
                let Some(key) = r.primary_key_values() else {
                    return false;
                };
                violations.iter().any(|v| {
                    (v.child_table == r.table && v.child_key == key)
                        || (v.parent_table == r.table && v.parent_key == key)
                })
            })
            .or_else(|| changeset.records.last());

        if let Some(record) = culprit {
            let occurrence = ConflictOccurrence::foreign_key(record, violations.len());
            match handler.on_conflict(&occurrence) {
                Resolution::Skip => {}
                Resolution::Abort => return Ok(ApplyStatus::Aborted),
                Resolution::Replace => {
                    return Err(invalid_resolution(
                        record,
                        ConflictCause::ForeignKey,
                        Resolution::Replace,
                    ))
                }
            }
        }
    }

    scope.commit();
    debug!(records_applied, records_filtered, "changeset committed");
    Ok(ApplyStatus::Committed {
        records_applied,
        records_filtered,
    })
}

/// Checks a record against its table schema and extracts the row key.
fn validate_framing(db: &MemoryDatabase, record: &ChangeRecord) -> StoreResult<Vec<Value>> {
    let table = db.table(&record.table)?;
    if record.column_count() != table.column_count() {
        return Err(StoreError::ColumnCountMismatch {
            table: record.table.clone(),
            expected: table.column_count(),
            actual: record.column_count(),
        });
    }
    if record.primary_key != table.key_mask {
        return Err(StoreError::corrupt(format!(
            "primary key mask of {} record does not match table {}",
            record.opcode, record.table
        )));
    }

    let images_ok = match record.opcode {
        DbOpcode::Insert => record.new.len() == table.column_count(),
        DbOpcode::Delete => record.old.len() == table.column_count(),
        DbOpcode::Update => {
            record.old.len() == table.column_count() && record.new.len() == table.column_count()
        }
    };
    if !images_ok {
        return Err(StoreError::corrupt(format!(
            "{} record for {} has truncated images",
            record.opcode, record.table
        )));
    }

    record.primary_key_values().ok_or_else(|| {
        StoreError::corrupt(format!(
            "{} record for {} is missing primary key values",
            record.opcode, record.table
        ))
    })
}

fn conflict(
    handler: &mut dyn ConflictHandler,
    cause: ConflictCause,
    record: &ChangeRecord,
) -> Resolution {
    trace!(table = %record.table, %cause, key = %record.format_primary_key(), "conflict");
    handler.on_conflict(&ConflictOccurrence::new(cause, record))
}

fn invalid_resolution(
    record: &ChangeRecord,
    cause: ConflictCause,
    resolution: Resolution,
) -> StoreError {
    StoreError::InvalidResolution {
        table: record.table.clone(),
        cause: cause.to_string(),
        resolution: resolution.to_string(),
    }
}

fn table_mut<'t>(db: &'t mut MemoryDatabase, name: &str) -> StoreResult<&'t mut Table> {
    db.tables
        .get_mut(name)
        .ok_or_else(|| StoreError::unknown_table(name))
}

/// Writes `row` under `key` after constraint checks, raising a constraint conflict
/// if they fail.
fn write_checked(
    db: &mut MemoryDatabase,
    record: &ChangeRecord,
    key: Vec<Value>,
    row: Vec<Value>,
    replacing: bool,
    handler: &mut dyn ConflictHandler,
) -> StoreResult<Step> {
    let table = table_mut(db, &record.table)?;
    let check = table.check_constraints(&row, replacing.then_some(key.as_slice()));
    if check.is_err() {
        return match conflict(handler, ConflictCause::Constraint, record) {
            Resolution::Skip => Ok(Step::Continue),
            Resolution::Abort => Ok(Step::Abort),
            Resolution::Replace => Err(invalid_resolution(
                record,
                ConflictCause::Constraint,
                Resolution::Replace,
            )),
        };
    }
    table.rows.insert(key, row);
    Ok(Step::Continue)
}

fn apply_insert(
    db: &mut MemoryDatabase,
    record: &ChangeRecord,
    key: Vec<Value>,
    handler: &mut dyn ConflictHandler,
) -> StoreResult<Step> {
    let row: Vec<Value> = record
        .new
        .iter()
        .cloned()
        .collect::<Option<Vec<Value>>>()
        .ok_or_else(|| {
            StoreError::corrupt(format!("insert into {} is missing columns", record.table))
        })?;

    let exists = db.table(&record.table)?.rows.contains_key(&key);
    if exists {
        match conflict(handler, ConflictCause::Data, record) {
            Resolution::Skip => return Ok(Step::Continue),
            Resolution::Abort => return Ok(Step::Abort),
            Resolution::Replace => {}
        }
    }
    write_checked(db, record, key, row, exists, handler)
}

fn apply_update(
    db: &mut MemoryDatabase,
    record: &ChangeRecord,
    key: Vec<Value>,
    handler: &mut dyn ConflictHandler,
) -> StoreResult<Step> {
    let current = db.table(&record.table)?.rows.get(&key).cloned();
    let Some(current) = current else {
        return match conflict(handler, ConflictCause::NotFound, record) {
            Resolution::Skip => Ok(Step::Continue),
            Resolution::Abort => Ok(Step::Abort),
            Resolution::Replace => Err(invalid_resolution(
                record,
                ConflictCause::NotFound,
                Resolution::Replace,
            )),
        };
    };

    if pre_image_differs(record, &current) {
        match conflict(handler, ConflictCause::Data, record) {
            Resolution::Skip => return Ok(Step::Continue),
            Resolution::Abort => return Ok(Step::Abort),
            Resolution::Replace => {}
        }
    }

    let mut updated = current;
    for (i, value) in record.new.iter().enumerate() {
        if record.is_primary_key(i) {
            continue;
        }
        if let Some(value) = value {
            updated[i] = value.clone();
        }
    }
    write_checked(db, record, key, updated, true, handler)
}

fn apply_delete(
    db: &mut MemoryDatabase,
    record: &ChangeRecord,
    key: Vec<Value>,
    handler: &mut dyn ConflictHandler,
) -> StoreResult<Step> {
    let current = db.table(&record.table)?.rows.get(&key).cloned();
    let Some(current) = current else {
        // Replace on a missing row has nothing left to do.
        return match conflict(handler, ConflictCause::NotFound, record) {
            Resolution::Skip | Resolution::Replace => Ok(Step::Continue),
            Resolution::Abort => Ok(Step::Abort),
        };
    };

    if pre_image_differs(record, &current) {
        match conflict(handler, ConflictCause::Data, record) {
            Resolution::Skip => return Ok(Step::Continue),
            Resolution::Abort => return Ok(Step::Abort),
            Resolution::Replace => {}
        }
    }

    match delete_cascading(&mut db.tables, &record.table, &key) {
        Ok(_) => Ok(Step::Continue),
        Err(violation) => {
            trace!(
                table = %violation.table,
                message = %violation.message,
                "on delete action failed"
            );
            match conflict(handler, ConflictCause::Constraint, record) {
                Resolution::Skip => Ok(Step::Continue),
                Resolution::Abort => Ok(Step::Abort),
                Resolution::Replace => Err(invalid_resolution(
                    record,
                    ConflictCause::Constraint,
                    Resolution::Replace,
                )),
            }
        }
    }
}

/// True if any non-key column present in the pre-image differs from `current`.
fn pre_image_differs(record: &ChangeRecord, current: &[Value]) -> bool {
    record.old.iter().enumerate().any(|(i, old)| {
        !record.is_primary_key(i) && old.as_ref().is_some_and(|v| *v != current[i])
    })
}
