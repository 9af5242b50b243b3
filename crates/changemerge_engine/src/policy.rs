//! Pluggable conflict policies.
//!
//! An [`ExternalConflictPolicy`] is consulted before the built-in decision table
//! and may settle any conflict itself. Returning `None` defers to the table.

use crate::classifier::Category;
use changemerge_changeset::{ConflictOccurrence, Resolution};
use std::collections::BTreeMap;

/// Overrides built-in conflict resolutions.
pub trait ExternalConflictPolicy: Send + Sync {
    /// Returns a resolution for the conflict, or `None` to use the default.
    fn resolve(&self, category: Category, occurrence: &ConflictOccurrence<'_>)
        -> Option<Resolution>;
}

impl<F> ExternalConflictPolicy for F
where
    F: Fn(Category, &ConflictOccurrence<'_>) -> Option<Resolution> + Send + Sync,
{
    fn resolve(
        &self,
        category: Category,
        occurrence: &ConflictOccurrence<'_>,
    ) -> Option<Resolution> {
        self(category, occurrence)
    }
}

/// Fixed resolutions keyed by table, with optional per-category refinement.
///
/// A `(table, category)` rule wins over a table-wide rule.
#[derive(Debug, Clone, Default)]
pub struct TablePolicy {
    tables: BTreeMap<String, Resolution>,
    categories: BTreeMap<(String, Category), Resolution>,
}

impl TablePolicy {
    /// Creates an empty policy that defers everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every conflict on `table` the same way.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>, resolution: Resolution) -> Self {
        self.tables.insert(table.into(), resolution);
        self
    }

    /// Resolves conflicts of one category on `table`.
    #[must_use]
    pub fn category(
        mut self,
        table: impl Into<String>,
        category: Category,
        resolution: Resolution,
    ) -> Self {
        self.categories.insert((table.into(), category), resolution);
        self
    }

    /// Returns true if no rule is set.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.categories.is_empty()
    }
}

impl ExternalConflictPolicy for TablePolicy {
    fn resolve(
        &self,
        category: Category,
        occurrence: &ConflictOccurrence<'_>,
    ) -> Option<Resolution> {
        let table = occurrence.table();
        self.categories
            .get(&(table.to_owned(), category))
            .or_else(|| self.tables.get(table))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use changemerge_changeset::{ChangeRecord, ConflictCause, Value};

    #[test]
    fn table_policy_lookup() {
        let policy = TablePolicy::new()
            .table("Foo", Resolution::Skip)
            .category("Foo", Category::GenericOverwrite, Resolution::Abort);
        assert!(!policy.is_empty());

        let foo = ChangeRecord::insert("Foo", &[0], vec![Value::Integer(1)]);
        let bar = ChangeRecord::insert("Bar", &[0], vec![Value::Integer(1)]);
        let on_foo = ConflictOccurrence::new(ConflictCause::Data, &foo);
        let on_bar = ConflictOccurrence::new(ConflictCause::Data, &bar);

        assert_eq!(
            policy.resolve(Category::GenericOverwrite, &on_foo),
            Some(Resolution::Abort)
        );
        assert_eq!(
            policy.resolve(Category::PrimaryKeyCollisionLocalClean, &on_foo),
            Some(Resolution::Skip)
        );
        assert_eq!(policy.resolve(Category::GenericOverwrite, &on_bar), None);
    }

    #[test]
    fn closures_are_policies() {
        let never_abort = |category: Category, _: &ConflictOccurrence<'_>| {
            (category == Category::ForeignKey).then_some(Resolution::Skip)
        };
        let record = ChangeRecord::insert("Foo", &[0], vec![Value::Integer(1)]);
        let occurrence = ConflictOccurrence::foreign_key(&record, 2);

        assert_eq!(
            never_abort.resolve(Category::ForeignKey, &occurrence),
            Some(Resolution::Skip)
        );
        assert_eq!(never_abort.resolve(Category::GenericOverwrite, &occurrence), None);
    }
}
