//! Conflict classification.

use crate::config::is_metadata_table;
use changemerge_changeset::{ConflictCause, ConflictOccurrence, DbOpcode};
use std::fmt;

/// Resolution-relevant category of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Insert key collision in a briefcase with no pending local changes.
    PrimaryKeyCollisionLocalClean,
    /// Insert key collision while local changes are pending.
    PrimaryKeyCollisionLocalDirty,
    /// The changeset left foreign-key violations.
    ForeignKey,
    /// A delete found its row already gone, typically removed by a cascade.
    CascadeDeleteArtifact,
    /// An update of a metadata table found its row gone.
    MetadataNullOnDelete,
    /// Any other missing-row conflict.
    NotFoundOther {
        /// Operation of the incoming record.
        operation: DbOpcode,
    },
    /// A `NOT NULL` or unique constraint rejected the incoming row.
    ConstraintViolation,
    /// The row exists but differs from the incoming pre-image.
    GenericOverwrite,
}

impl Category {
    /// Every category.
    pub const ALL: [Category; 10] = [
        Category::PrimaryKeyCollisionLocalClean,
        Category::PrimaryKeyCollisionLocalDirty,
        Category::ForeignKey,
        Category::CascadeDeleteArtifact,
        Category::MetadataNullOnDelete,
        Category::NotFoundOther {
            operation: DbOpcode::Insert,
        },
        Category::NotFoundOther {
            operation: DbOpcode::Update,
        },
        Category::NotFoundOther {
            operation: DbOpcode::Delete,
        },
        Category::ConstraintViolation,
        Category::GenericOverwrite,
    ];

    /// Short name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::PrimaryKeyCollisionLocalClean => "primary_key_collision_local_clean",
            Category::PrimaryKeyCollisionLocalDirty => "primary_key_collision_local_dirty",
            Category::ForeignKey => "foreign_key",
            Category::CascadeDeleteArtifact => "cascade_delete_artifact",
            Category::MetadataNullOnDelete => "metadata_null_on_delete",
            Category::NotFoundOther {
                operation: DbOpcode::Update,
            } => "not_found_update",
            Category::NotFoundOther { .. } => "not_found_other",
            Category::ConstraintViolation => "constraint_violation",
            Category::GenericOverwrite => "generic_overwrite",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a conflict.
///
/// A data conflict is a key collision only for inserts; on updates and deletes it
/// means the stored row no longer matches the incoming pre-image. Dirtiness is
/// whole-briefcase, not per row.
pub fn classify(
    occurrence: &ConflictOccurrence<'_>,
    has_pending_local_changes: bool,
    metadata_table_prefix: &str,
) -> Category {
    let operation = occurrence.opcode();
    match occurrence.cause {
        ConflictCause::Data if operation == DbOpcode::Insert => {
            if has_pending_local_changes {
                Category::PrimaryKeyCollisionLocalDirty
            } else {
                Category::PrimaryKeyCollisionLocalClean
            }
        }
        ConflictCause::Data => Category::GenericOverwrite,
        ConflictCause::ForeignKey => Category::ForeignKey,
        ConflictCause::NotFound => match operation {
            DbOpcode::Delete => Category::CascadeDeleteArtifact,
            DbOpcode::Update if is_metadata_table(metadata_table_prefix, occurrence.table()) => {
                Category::MetadataNullOnDelete
            }
            operation => Category::NotFoundOther { operation },
        },
        ConflictCause::Constraint => Category::ConstraintViolation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changemerge_changeset::{ChangeRecord, Value};

    fn insert(table: &str) -> ChangeRecord {
        ChangeRecord::insert(table, &[0], vec![Value::Integer(1)])
    }

    fn update(table: &str) -> ChangeRecord {
        ChangeRecord::update(
            table,
            &[0],
            vec![Some(Value::Integer(1)), Some(Value::Integer(2))],
            vec![None, Some(Value::Null)],
        )
    }

    fn delete(table: &str) -> ChangeRecord {
        ChangeRecord::delete(table, &[0], vec![Value::Integer(1)])
    }

    fn of(cause: ConflictCause, record: &ChangeRecord, dirty: bool) -> Category {
        classify(&ConflictOccurrence::new(cause, record), dirty, "ec_")
    }

    #[test]
    fn key_collisions_split_on_dirtiness() {
        let r = insert("Foo");
        assert_eq!(
            of(ConflictCause::Data, &r, false),
            Category::PrimaryKeyCollisionLocalClean
        );
        assert_eq!(
            of(ConflictCause::Data, &r, true),
            Category::PrimaryKeyCollisionLocalDirty
        );
    }

    #[test]
    fn data_on_update_or_delete_is_overwrite() {
        assert_eq!(
            of(ConflictCause::Data, &update("Foo"), true),
            Category::GenericOverwrite
        );
        assert_eq!(
            of(ConflictCause::Data, &delete("Foo"), false),
            Category::GenericOverwrite
        );
    }

    #[test]
    fn not_found_variants() {
        assert_eq!(
            of(ConflictCause::NotFound, &delete("Foo"), false),
            Category::CascadeDeleteArtifact
        );
        assert_eq!(
            of(ConflictCause::NotFound, &update("ec_Link"), false),
            Category::MetadataNullOnDelete
        );
        assert_eq!(
            of(ConflictCause::NotFound, &update("Foo"), false),
            Category::NotFoundOther {
                operation: DbOpcode::Update
            }
        );
        assert_eq!(
            of(ConflictCause::NotFound, &insert("Foo"), false),
            Category::NotFoundOther {
                operation: DbOpcode::Insert
            }
        );
    }

    #[test]
    fn foreign_key_and_constraint() {
        let r = update("Foo");
        let occurrence = ConflictOccurrence::foreign_key(&r, 3);
        assert_eq!(classify(&occurrence, true, "ec_"), Category::ForeignKey);
        assert_eq!(
            of(ConflictCause::Constraint, &r, true),
            Category::ConstraintViolation
        );
    }

    #[test]
    fn custom_prefix() {
        let r = update("meta_Link");
        let occurrence = ConflictOccurrence::new(ConflictCause::NotFound, &r);
        assert_eq!(
            classify(&occurrence, false, "meta_"),
            Category::MetadataNullOnDelete
        );
        assert_eq!(
            classify(&occurrence, false, "ec_").as_str(),
            "not_found_update"
        );
    }

    #[test]
    fn all_is_sorted_and_distinct() {
        let mut sorted = Category::ALL.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, Category::ALL.to_vec());
    }
}
