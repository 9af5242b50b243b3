//! The in-memory database handle.

use crate::apply;
use crate::schema::{OnDelete, TableSchema};
use crate::table::Table;
use changemerge_changeset::{
    ApplyStatus, ChangeRecord, Changeset, ConflictHandler, RowStore, StoreError, StoreResult,
    Value,
};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// A foreign-key reference with no matching parent row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Table holding the dangling reference.
    pub child_table: String,
    /// Primary key of the referencing row.
    pub child_key: Vec<Value>,
    /// Referenced table.
    pub parent_table: String,
    /// Referenced (missing) parent key.
    pub parent_key: Vec<Value>,
}

/// An in-memory relational database standing in for one briefcase.
///
/// # Local edits and pending changes
///
/// Edits made through [`MemoryDatabase::local`] are journaled as change records,
/// exactly as a session extension would capture them. While the journal is
/// non-empty the database reports pending local changes.
/// [`MemoryDatabase::take_local_changeset`] packages the journal into a changeset
/// chained onto the current parent id, which is how a briefcase pushes.
///
/// # Applying changesets
///
/// [`RowStore::apply_changeset`] replays incoming changesets with deferred foreign
/// keys and all-or-nothing rollback.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    pub(crate) tables: BTreeMap<String, Table>,
    settings: HashMap<String, bool>,
    parent_changeset_id: String,
    journal: Vec<ChangeRecord>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database from table definitions, in dependency order.
    pub fn with_schema(schemas: impl IntoIterator<Item = TableSchema>) -> StoreResult<Self> {
        let mut db = Self::new();
        for schema in schemas {
            db.create_table(schema)?;
        }
        Ok(db)
    }

    /// Creates a table. Foreign-key parents must already exist.
    pub fn create_table(&mut self, schema: TableSchema) -> StoreResult<()> {
        if self.tables.contains_key(&schema.name) {
            return Err(StoreError::constraint(&schema.name, "table already exists"));
        }
        let table = Table::new(schema)?;
        for fk in &table.foreign_keys {
            let parent_key_len = if fk.parent == table.name() {
                table.key.len()
            } else {
                self.table(&fk.parent)?.key.len()
            };
            if parent_key_len != fk.columns.len() {
                return Err(StoreError::constraint(
                    table.name(),
                    format!("foreign key to {} does not match its primary key", fk.parent),
                ));
            }
        }
        self.tables.insert(table.name().to_owned(), table);
        Ok(())
    }

    /// Table definitions in name order.
    pub fn schemas(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values().map(|t| &t.schema)
    }

    /// Reads a row by primary key.
    pub fn get(&self, table: &str, key: &[Value]) -> StoreResult<Option<Vec<Value>>> {
        Ok(self.table(table)?.rows.get(key).cloned())
    }

    /// All rows of a table in key order.
    pub fn rows(&self, table: &str) -> StoreResult<Vec<Vec<Value>>> {
        Ok(self.table(table)?.rows.values().cloned().collect())
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.table(table)?.rows.len())
    }

    /// Sets a briefcase-local boolean setting.
    pub fn set_debug_flag(&mut self, name: impl Into<String>, value: bool) {
        self.settings.insert(name.into(), value);
    }

    /// Runs local edits atomically.
    ///
    /// If `f` fails, or the edits leave new foreign-key violations behind, every
    /// change is rolled back and nothing is journaled.
    pub fn local<F, T>(&mut self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut LocalTransaction<'_>) -> StoreResult<T>,
    {
        let snapshot = self.tables.clone();
        let violations_before = self.foreign_key_violations().len();

        let mut txn = LocalTransaction {
            tables: &mut self.tables,
            records: Vec::new(),
        };
        let result = f(&mut txn);
        let LocalTransaction { records, .. } = txn;

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.tables = snapshot;
                return Err(e);
            }
        };

        let violations = self.foreign_key_violations();
        if violations.len() > violations_before {
            self.tables = snapshot;
            let first = &violations[0];
            return Err(StoreError::constraint(
                &first.child_table,
                format!("FOREIGN KEY constraint failed: no {} row", first.parent_table),
            ));
        }

        self.journal.extend(records);
        Ok(value)
    }

    /// Local changes not yet packaged into a changeset.
    pub fn pending_records(&self) -> &[ChangeRecord] {
        &self.journal
    }

    /// Packages pending local changes into a changeset and makes it the new parent.
    ///
    /// Returns `None` when there is nothing to push.
    pub fn take_local_changeset(&mut self) -> Option<Changeset> {
        if self.journal.is_empty() {
            return None;
        }
        let records = std::mem::take(&mut self.journal);
        let changeset = Changeset::new(self.parent_changeset_id.clone(), records);
        debug!(
            changeset = changeset.short_id(),
            records = changeset.len(),
            "packaged local changes"
        );
        self.parent_changeset_id = changeset.id.clone();
        Some(changeset)
    }

    /// Every dangling foreign-key reference in the database.
    pub fn foreign_key_violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();
        for child in self.tables.values() {
            for fk in &child.foreign_keys {
                let parent = self.tables.get(&fk.parent);
                for (child_key, row) in &child.rows {
                    let parent_key: Vec<Value> =
                        fk.columns.iter().map(|&i| row[i].clone()).collect();
                    if parent_key.iter().any(Value::is_null) {
                        continue;
                    }
                    if !parent.is_some_and(|p| p.rows.contains_key(&parent_key)) {
                        violations.push(Violation {
                            child_table: child.name().to_owned(),
                            child_key: child_key.clone(),
                            parent_table: fk.parent.clone(),
                            parent_key,
                        });
                    }
                }
            }
        }
        violations
    }

    pub(crate) fn table(&self, name: &str) -> StoreResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| StoreError::unknown_table(name))
    }
}

impl RowStore for MemoryDatabase {
    fn apply_changeset(
        &mut self,
        changeset: &Changeset,
        handler: &mut dyn ConflictHandler,
    ) -> StoreResult<ApplyStatus> {
        apply::apply_changeset(self, changeset, handler)
    }

    fn foreign_key_violation_count(&self) -> StoreResult<usize> {
        Ok(self.foreign_key_violations().len())
    }

    fn has_pending_local_changes(&self) -> StoreResult<bool> {
        Ok(!self.journal.is_empty())
    }

    fn query_debug_flag(&self, name: &str) -> StoreResult<bool> {
        Ok(self.settings.get(name).copied().unwrap_or(false))
    }

    fn parent_changeset_id(&self) -> StoreResult<String> {
        Ok(self.parent_changeset_id.clone())
    }

    fn set_parent_changeset_id(&mut self, id: &str) -> StoreResult<()> {
        self.parent_changeset_id = id.to_owned();
        Ok(())
    }
}

/// Local edits in progress. See [`MemoryDatabase::local`].
pub struct LocalTransaction<'a> {
    tables: &'a mut BTreeMap<String, Table>,
    records: Vec<ChangeRecord>,
}

impl LocalTransaction<'_> {
    /// Inserts a row.
    pub fn insert(&mut self, table: &str, row: Vec<Value>) -> StoreResult<()> {
        let t = table_mut(self.tables, table)?;
        if row.len() != t.column_count() {
            return Err(StoreError::ColumnCountMismatch {
                table: table.to_owned(),
                expected: t.column_count(),
                actual: row.len(),
            });
        }
        let key = t.key_of(&row);
        if t.rows.contains_key(&key) {
            return Err(StoreError::constraint(table, "PRIMARY KEY constraint failed"));
        }
        t.check_constraints(&row, None)
            .map_err(|message| StoreError::constraint(table, message))?;

        self.records
            .push(ChangeRecord::insert(table, &t.key, row.clone()));
        t.rows.insert(key, row);
        Ok(())
    }

    /// Updates named columns of the row with primary key `key`.
    pub fn update(
        &mut self,
        table: &str,
        key: &[Value],
        changes: &[(&str, Value)],
    ) -> StoreResult<()> {
        let t = table_mut(self.tables, table)?;
        let current = t.rows.get(key).cloned().ok_or_else(|| row_not_found(table, key))?;

        let mut old: Vec<Option<Value>> = vec![None; current.len()];
        let mut new: Vec<Option<Value>> = vec![None; current.len()];
        for &i in &t.key {
            old[i] = Some(current[i].clone());
        }

        let mut updated = current.clone();
        for (name, value) in changes {
            let i = t
                .schema
                .column_index(name)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: table.to_owned(),
                    column: (*name).to_owned(),
                })?;
            if t.key_mask[i] {
                return Err(StoreError::constraint(table, "primary key columns are immutable"));
            }
            if current[i] == *value {
                continue;
            }
            old[i] = Some(current[i].clone());
            new[i] = Some(value.clone());
            updated[i] = value.clone();
        }

        if new.iter().all(Option::is_none) {
            return Ok(());
        }
        t.check_constraints(&updated, Some(key))
            .map_err(|message| StoreError::constraint(table, message))?;

        self.records
            .push(ChangeRecord::update(table, &t.key, old, new));
        t.rows.insert(key.to_vec(), updated);
        Ok(())
    }

    /// Deletes a row, applying `ON DELETE` actions to rows that reference it.
    ///
    /// Cascaded changes are journaled as indirect records after the direct delete.
    pub fn delete(&mut self, table: &str, key: &[Value]) -> StoreResult<()> {
        let t = table_mut(self.tables, table)?;
        let row = t.rows.get(key).cloned().ok_or_else(|| row_not_found(table, key))?;
        let key_columns = t.key.clone();

        let effects = delete_cascading(self.tables, table, key)
            .map_err(|v| StoreError::constraint(v.table, v.message))?;
        self.records
            .push(ChangeRecord::delete(table, &key_columns, row));
        self.records.extend(effects);
        Ok(())
    }
}

fn table_mut<'t>(
    tables: &'t mut BTreeMap<String, Table>,
    name: &str,
) -> StoreResult<&'t mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::unknown_table(name))
}

fn row_not_found(table: &str, key: &[Value]) -> StoreError {
    let parts: Vec<String> = key.iter().map(Value::to_string).collect();
    StoreError::RowNotFound {
        table: table.to_owned(),
        key: format!("({})", parts.join(", ")),
    }
}

/// An `ON DELETE SET NULL` action that would null a `NOT NULL` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SetNullViolation {
    pub table: String,
    pub message: String,
}

/// Removes a row and runs `ON DELETE` actions for rows referencing it, transitively.
///
/// Returns the side effects (child deletes and nullifications) as indirect change
/// records, in the order they happened. The direct delete itself is not included.
/// If a nullification would break a `NOT NULL` column, every change made so far is
/// undone and the tables are left as they were.
pub(crate) fn delete_cascading(
    tables: &mut BTreeMap<String, Table>,
    table: &str,
    key: &[Value],
) -> Result<Vec<ChangeRecord>, SetNullViolation> {
    let mut effects = Vec::new();
    // Prior contents of every row touched, oldest first.
    let mut undo: Vec<(String, Vec<Value>, Vec<Value>)> = Vec::new();
    let mut pending = vec![(table.to_owned(), key.to_vec(), true)];
    let mut violation = None;

    'cascade: while let Some((name, key, direct)) = pending.pop() {
        let Some(parent) = tables.get_mut(&name) else {
            continue;
        };
        let Some(row) = parent.rows.remove(&key) else {
            continue;
        };
        undo.push((name.clone(), key.clone(), row.clone()));
        if !direct {
            effects.push(ChangeRecord::delete(&name, &parent.key, row).indirect());
        }

        for child in tables.values_mut() {
            let key_columns = child.key.clone();
            for fk in child.foreign_keys.iter().filter(|fk| fk.parent == name) {
                let referencing: Vec<Vec<Value>> = child
                    .rows
                    .iter()
                    .filter(|(_, r)| fk.columns.iter().zip(&key).all(|(&i, v)| &r[i] == v))
                    .map(|(k, _)| k.clone())
                    .collect();

                for child_key in referencing {
                    match fk.on_delete {
                        OnDelete::Cascade => {
                            pending.push((child.schema.name.clone(), child_key, false));
                        }
                        OnDelete::SetNull => {
                            if let Some(&i) = fk.columns.iter().find(|&&i| child.not_null[i]) {
                                violation = Some(SetNullViolation {
                                    table: child.schema.name.clone(),
                                    message: format!(
                                        "NOT NULL constraint failed: {}.{}",
                                        child.schema.name, child.schema.columns[i].name
                                    ),
                                });
                                break 'cascade;
                            }
                            let Some(child_row) = child.rows.get_mut(&child_key) else {
                                continue;
                            };
                            undo.push((
                                child.schema.name.clone(),
                                child_key.clone(),
                                child_row.clone(),
                            ));
                            let mut old = vec![None; child_row.len()];
                            let mut new = vec![None; child_row.len()];
                            for &i in &key_columns {
                                old[i] = Some(child_row[i].clone());
                            }
                            for &i in &fk.columns {
                                old[i] = Some(child_row[i].clone());
                                new[i] = Some(Value::Null);
                                child_row[i] = Value::Null;
                            }
                            effects.push(
                                ChangeRecord::update(&child.schema.name, &key_columns, old, new)
                                    .indirect(),
                            );
                        }
                        OnDelete::Restrict => {}
                    }
                }
            }
        }
    }

    match violation {
        None => Ok(effects),
        Some(violation) => {
            for (name, key, row) in undo.into_iter().rev() {
                if let Some(t) = tables.get_mut(&name) {
                    t.rows.insert(key, row);
                }
            }
            Err(violation)
        }
    }
}
