//! Table definitions.

use serde::{Deserialize, Serialize};

/// Action taken on child rows when a referenced parent row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    /// Delete the child rows as well.
    Cascade,
    /// Set the referencing columns to `NULL`.
    SetNull,
    /// Leave child rows alone; the dangling reference is a violation.
    #[default]
    Restrict,
}

/// A column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Whether `NULL` is rejected.
    #[serde(default)]
    pub not_null: bool,
}

/// A foreign key referencing the primary key of a parent table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Referencing columns, in parent primary-key order.
    pub columns: Vec<String>,
    /// Parent table name.
    pub parent: String,
    /// Delete action.
    #[serde(default)]
    pub on_delete: OnDelete,
}

/// Definition of one table.
///
/// # Example
///
/// ```
/// use changemerge_store::{OnDelete, TableSchema};
///
/// let schema = TableSchema::new("Child")
///     .required("id")
///     .column("parent_id")
///     .primary_key(&["id"])
///     .foreign_key(&["parent_id"], "Parent", OnDelete::Cascade);
/// assert_eq!(schema.columns.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Columns in storage order.
    pub columns: Vec<ColumnDef>,
    /// Primary-key column names.
    pub primary_key: Vec<String>,
    /// Unique indexes, each a list of column names.
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    /// Foreign keys.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDef>,
}

impl TableSchema {
    /// Creates an empty table definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            unique: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Adds a nullable column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            not_null: false,
        });
        self
    }

    /// Adds a `NOT NULL` column.
    #[must_use]
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            not_null: true,
        });
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| (*c).to_owned()).collect();
        self
    }

    /// Adds a unique index.
    #[must_use]
    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique
            .push(columns.iter().map(|c| (*c).to_owned()).collect());
        self
    }

    /// Adds a foreign key to `parent`'s primary key.
    #[must_use]
    pub fn foreign_key(
        mut self,
        columns: &[&str],
        parent: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        self.foreign_keys.push(ForeignKeyDef {
            columns: columns.iter().map(|c| (*c).to_owned()).collect(),
            parent: parent.into(),
            on_delete,
        });
        self
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}
