//! Resolved tables and their rows.

use crate::schema::{OnDelete, TableSchema};
use changemerge_changeset::{StoreError, StoreResult, Value};
use std::collections::BTreeMap;

/// A foreign key with column names resolved to indexes.
#[derive(Debug, Clone)]
pub(crate) struct ForeignKey {
    pub columns: Vec<usize>,
    pub parent: String,
    pub on_delete: OnDelete,
}

/// A table: schema with resolved indexes, plus rows keyed by primary key.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub schema: TableSchema,
    pub key: Vec<usize>,
    pub key_mask: Vec<bool>,
    pub not_null: Vec<bool>,
    pub unique: Vec<Vec<usize>>,
    pub foreign_keys: Vec<ForeignKey>,
    pub rows: BTreeMap<Vec<Value>, Vec<Value>>,
}

impl Table {
    /// Resolves a schema. Parent tables of foreign keys are validated by the database.
    pub fn new(schema: TableSchema) -> StoreResult<Self> {
        let resolve = |name: &String| {
            schema
                .column_index(name)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: schema.name.clone(),
                    column: name.clone(),
                })
        };

        if schema.primary_key.is_empty() {
            return Err(StoreError::constraint(
                &schema.name,
                "table has no primary key",
            ));
        }

        let key = schema
            .primary_key
            .iter()
            .map(resolve)
            .collect::<StoreResult<Vec<_>>>()?;
        let unique = schema
            .unique
            .iter()
            .map(|cols| cols.iter().map(resolve).collect::<StoreResult<Vec<_>>>())
            .collect::<StoreResult<Vec<_>>>()?;
        let foreign_keys = schema
            .foreign_keys
            .iter()
            .map(|fk| -> StoreResult<ForeignKey> {
                Ok(ForeignKey {
                    columns: fk.columns.iter().map(resolve).collect::<StoreResult<_>>()?,
                    parent: fk.parent.clone(),
                    on_delete: fk.on_delete,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        let mut key_mask = vec![false; schema.columns.len()];
        for &i in &key {
            key_mask[i] = true;
        }
        // Primary-key columns are implicitly NOT NULL.
        let not_null = schema
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| c.not_null || key_mask[i])
            .collect();

        Ok(Self {
            schema,
            key,
            key_mask,
            not_null,
            unique,
            foreign_keys,
            rows: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn column_count(&self) -> usize {
        self.schema.columns.len()
    }

    pub fn key_of(&self, row: &[Value]) -> Vec<Value> {
        self.key.iter().map(|&i| row[i].clone()).collect()
    }

    /// Checks `NOT NULL` and uniqueness for `row`, ignoring the row stored under
    /// `replacing` (the row being overwritten, if any).
    pub fn check_constraints(
        &self,
        row: &[Value],
        replacing: Option<&[Value]>,
    ) -> Result<(), String> {
        for (i, value) in row.iter().enumerate() {
            if self.not_null[i] && value.is_null() {
                return Err(format!(
                    "NOT NULL constraint failed: {}.{}",
                    self.name(),
                    self.schema.columns[i].name
                ));
            }
        }

        for index in &self.unique {
            let probe: Vec<&Value> = index.iter().map(|&i| &row[i]).collect();
            if probe.iter().any(|v| v.is_null()) {
                continue;
            }
            let clash = self.rows.iter().any(|(key, other)| {
                Some(key.as_slice()) != replacing
                    && index.iter().zip(&probe).all(|(&i, v)| &other[i] == *v)
            });
            if clash {
                let names: Vec<&str> = index
                    .iter()
                    .map(|&i| self.schema.columns[i].name.as_str())
                    .collect();
                return Err(format!(
                    "UNIQUE constraint failed: {}.{}",
                    self.name(),
                    names.join(", ")
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(
            TableSchema::new("Foo")
                .required("id")
                .required("code")
                .column("note")
                .primary_key(&["id"])
                .unique(&["code"]),
        )
        .unwrap()
    }

    fn row(id: i64, code: &str) -> Vec<Value> {
        vec![Value::Integer(id), Value::Text(code.into()), Value::Null]
    }

    #[test]
    fn resolves_indexes() {
        let t = table();
        assert_eq!(t.key, vec![0]);
        assert_eq!(t.key_mask, vec![true, false, false]);
        assert_eq!(t.unique, vec![vec![1]]);
        assert_eq!(t.key_of(&row(4, "a")), vec![Value::Integer(4)]);
    }

    #[test]
    fn unknown_column_rejected() {
        let err = Table::new(TableSchema::new("Foo").column("id").primary_key(&["nope"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn missing_primary_key_rejected() {
        assert!(Table::new(TableSchema::new("Foo").column("id")).is_err());
    }

    #[test]
    fn not_null_and_unique() {
        let mut t = table();
        t.rows.insert(vec![Value::Integer(1)], row(1, "a"));

        let mut null_code = row(2, "b");
        null_code[1] = Value::Null;
        assert!(t.check_constraints(&null_code, None).unwrap_err().contains("NOT NULL"));

        assert!(t.check_constraints(&row(2, "a"), None).unwrap_err().contains("UNIQUE"));
        assert!(t.check_constraints(&row(2, "b"), None).is_ok());
        // Overwriting the row that owns the value is fine.
        assert!(t
            .check_constraints(&row(1, "a"), Some(&[Value::Integer(1)][..]))
            .is_ok());
    }
}
