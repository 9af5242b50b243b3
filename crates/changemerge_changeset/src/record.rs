//! Row-level change records.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of mutation a change record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbOpcode {
    /// A row was inserted.
    Insert,
    /// A row was updated.
    Update,
    /// A row was deleted.
    Delete,
}

impl DbOpcode {
    /// Returns the upper-case SQL keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            DbOpcode::Insert => "INSERT",
            DbOpcode::Update => "UPDATE",
            DbOpcode::Delete => "DELETE",
        }
    }
}

impl fmt::Display for DbOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row-level mutation decoded from a changeset.
///
/// # Images
///
/// - `old` is the pre-image. Inserts carry none. For updates, only primary-key
///   columns and columns that changed are present (`Some`).
/// - `new` is the post-image. Deletes carry none. For updates, only columns that
///   changed are present.
///
/// Records are read-only once built; the merge engine inspects them during a
/// single conflict callback and never retains them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Target table name.
    pub table: String,
    /// Mutation kind.
    pub opcode: DbOpcode,
    /// True if this change was a side effect (e.g. a cascade) of another change.
    #[serde(default)]
    pub indirect: bool,
    /// Primary-key column mask, one entry per column.
    pub primary_key: Vec<bool>,
    /// Pre-image column values.
    #[serde(default)]
    pub old: Vec<Option<Value>>,
    /// Post-image column values.
    #[serde(default)]
    pub new: Vec<Option<Value>>,
}

impl ChangeRecord {
    /// Creates an insert record. `key_columns` lists primary-key column indexes.
    pub fn insert(table: impl Into<String>, key_columns: &[usize], values: Vec<Value>) -> Self {
        let primary_key = key_mask(values.len(), key_columns);
        Self {
            table: table.into(),
            opcode: DbOpcode::Insert,
            indirect: false,
            primary_key,
            old: Vec::new(),
            new: values.into_iter().map(Some).collect(),
        }
    }

    /// Creates a delete record carrying the full pre-image of the removed row.
    pub fn delete(table: impl Into<String>, key_columns: &[usize], values: Vec<Value>) -> Self {
        let primary_key = key_mask(values.len(), key_columns);
        Self {
            table: table.into(),
            opcode: DbOpcode::Delete,
            indirect: false,
            primary_key,
            old: values.into_iter().map(Some).collect(),
            new: Vec::new(),
        }
    }

    /// Creates an update record.
    ///
    /// `old` and `new` must have one entry per column; primary-key columns must be
    /// present in `old`.
    pub fn update(
        table: impl Into<String>,
        key_columns: &[usize],
        old: Vec<Option<Value>>,
        new: Vec<Option<Value>>,
    ) -> Self {
        let primary_key = key_mask(old.len(), key_columns);
        Self {
            table: table.into(),
            opcode: DbOpcode::Update,
            indirect: false,
            primary_key,
            old,
            new,
        }
    }

    /// Marks the record as an indirect change.
    #[must_use]
    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }

    /// Number of columns in the target table.
    pub fn column_count(&self) -> usize {
        self.primary_key.len()
    }

    /// Pre-image value of column `index`, if part of the change.
    pub fn old_value(&self, index: usize) -> Option<&Value> {
        self.old.get(index).and_then(Option::as_ref)
    }

    /// Post-image value of column `index`, if part of the change.
    pub fn new_value(&self, index: usize) -> Option<&Value> {
        self.new.get(index).and_then(Option::as_ref)
    }

    /// Returns true if column `index` belongs to the primary key.
    pub fn is_primary_key(&self, index: usize) -> bool {
        self.primary_key.get(index).copied().unwrap_or(false)
    }

    /// Indexes of the primary-key columns.
    pub fn primary_key_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.primary_key
            .iter()
            .enumerate()
            .filter_map(|(i, is_key)| is_key.then_some(i))
    }

    /// The primary-key tuple identifying the affected row.
    ///
    /// Inserts take the key from the post-image, everything else from the pre-image.
    /// Returns `None` if a key column is missing from that image.
    pub fn primary_key_values(&self) -> Option<Vec<Value>> {
        let image = match self.opcode {
            DbOpcode::Insert => &self.new,
            DbOpcode::Update | DbOpcode::Delete => &self.old,
        };
        self.primary_key_columns()
            .map(|i| image.get(i).cloned().flatten())
            .collect()
    }

    /// Formats the primary key as `(v1, v2)` for diagnostics.
    pub fn format_primary_key(&self) -> String {
        match self.primary_key_values() {
            Some(values) => {
                let parts: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("({})", parts.join(", "))
            }
            None => "(?)".to_owned(),
        }
    }

    /// Renders every column of both images, one per line.
    pub fn dump(&self) -> String {
        let mut out = format!(
            "{} {}{} key={}",
            self.opcode,
            self.table,
            if self.indirect { " [indirect]" } else { "" },
            self.format_primary_key()
        );
        for i in 0..self.column_count() {
            let old = self.old_value(i).map(Value::to_string);
            let new = self.new_value(i).map(Value::to_string);
            if old.is_none() && new.is_none() {
                continue;
            }
            let marker = if self.is_primary_key(i) { "*" } else { " " };
            out.push_str(&format!(
                "\n  {marker}col[{i}] old={} new={}",
                old.as_deref().unwrap_or("-"),
                new.as_deref().unwrap_or("-")
            ));
        }
        out
    }
}

fn key_mask(column_count: usize, key_columns: &[usize]) -> Vec<bool> {
    let mut mask = vec![false; column_count];
    for &i in key_columns {
        if let Some(slot) = mask.get_mut(i) {
            *slot = true;
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Integer(id), Value::Text(name.into())]
    }

    #[test]
    fn insert_key_from_post_image() {
        let record = ChangeRecord::insert("Foo", &[0], row(7, "a"));
        assert_eq!(record.column_count(), 2);
        assert!(record.is_primary_key(0));
        assert!(!record.is_primary_key(1));
        assert_eq!(record.primary_key_values(), Some(vec![Value::Integer(7)]));
        assert!(record.old_value(0).is_none());
    }

    #[test]
    fn update_key_from_pre_image() {
        let record = ChangeRecord::update(
            "Foo",
            &[0],
            vec![Some(Value::Integer(7)), Some("a".into())],
            vec![None, Some("b".into())],
        );
        assert_eq!(record.format_primary_key(), "(7)");
        assert_eq!(record.new_value(1), Some(&Value::Text("b".into())));
        assert!(record.new_value(0).is_none());
    }

    #[test]
    fn missing_key_column() {
        let record = ChangeRecord::update("Foo", &[0], vec![None, None], vec![None, None]);
        assert_eq!(record.primary_key_values(), None);
        assert_eq!(record.format_primary_key(), "(?)");
    }

    #[test]
    fn dump_marks_key_columns_and_indirect() {
        let record = ChangeRecord::delete("Child", &[0], row(3, "x")).indirect();
        let dump = record.dump();
        assert!(dump.starts_with("DELETE Child [indirect] key=(3)"));
        assert!(dump.contains("*col[0] old=3 new=-"));
        assert!(dump.contains(" col[1] old='x' new=-"));
    }
}
