//! Property-based test generators using proptest.
//!
//! Provides strategies for values, change records, changesets and conflict
//! occurrences.

use changemerge_changeset::{
    ChangeRecord, Changeset, ConflictCause, ConflictOccurrence, DbOpcode, Value,
};
use proptest::prelude::*;

/// Strategy for column values of every storage class.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        4 => any::<i64>().prop_map(Value::Integer),
        1 => (-1.0e6f64..1.0e6).prop_map(Value::Real),
        3 => "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
        1 => prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Blob),
    ]
}

/// Strategy for table names, about a third of them in the `ec_` namespace.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        2 => "[A-Z][a-zA-Z]{0,11}",
        1 => "[A-Z][a-zA-Z]{0,11}".prop_map(|name| format!("ec_{name}")),
    ]
}

/// Strategy for record operations.
pub fn opcode_strategy() -> impl Strategy<Value = DbOpcode> {
    prop_oneof![
        Just(DbOpcode::Insert),
        Just(DbOpcode::Update),
        Just(DbOpcode::Delete),
    ]
}

/// Strategy for conflict causes.
pub fn cause_strategy() -> impl Strategy<Value = ConflictCause> {
    prop_oneof![
        Just(ConflictCause::Data),
        Just(ConflictCause::ForeignKey),
        Just(ConflictCause::NotFound),
        Just(ConflictCause::Constraint),
    ]
}

/// Strategy for a well-formed record: integer key in column 0, one to four
/// further columns.
pub fn record_strategy() -> impl Strategy<Value = ChangeRecord> {
    (
        table_name_strategy(),
        opcode_strategy(),
        any::<i64>(),
        prop::collection::vec(value_strategy(), 1..5),
        prop::collection::vec(value_strategy(), 1..5),
        any::<bool>(),
    )
        .prop_map(|(table, opcode, key, before, after, indirect)| {
            let mut old = vec![Value::Integer(key)];
            old.extend(before);
            let mut new = vec![Value::Integer(key)];
            new.extend(after);
            new.resize(old.len(), Value::Null);

            let record = match opcode {
                DbOpcode::Insert => ChangeRecord::insert(table, &[0], new),
                DbOpcode::Delete => ChangeRecord::delete(table, &[0], old),
                DbOpcode::Update => {
                    let mut new: Vec<Option<Value>> = new.into_iter().map(Some).collect();
                    new[0] = None;
                    ChangeRecord::update(table, &[0], old.into_iter().map(Some).collect(), new)
                }
            };
            if indirect {
                record.indirect()
            } else {
                record
            }
        })
}

/// Strategy for a changeset of up to `max_records` records.
pub fn changeset_strategy(max_records: usize) -> impl Strategy<Value = Changeset> {
    (
        "[0-9a-f]{0,16}",
        prop::collection::vec(record_strategy(), 0..=max_records),
    )
        .prop_map(|(parent, records)| Changeset::new(parent, records))
}

/// An owned conflict occurrence.
#[derive(Debug, Clone)]
pub struct ConflictCase {
    /// Conflict cause.
    pub cause: ConflictCause,
    /// Conflicting record.
    pub record: ChangeRecord,
    /// Outstanding foreign-key violations, for foreign-key conflicts.
    pub violations: usize,
}

impl ConflictCase {
    /// Borrows as an occurrence.
    pub fn occurrence(&self) -> ConflictOccurrence<'_> {
        if self.cause == ConflictCause::ForeignKey {
            ConflictOccurrence::foreign_key(&self.record, self.violations)
        } else {
            ConflictOccurrence::new(self.cause, &self.record)
        }
    }
}

/// Strategy for conflict occurrences of any cause.
pub fn conflict_case_strategy() -> impl Strategy<Value = ConflictCase> {
    (cause_strategy(), record_strategy(), 1usize..64).prop_map(|(cause, record, violations)| {
        ConflictCase {
            cause,
            record,
            violations,
        }
    })
}

/// Strategy for conflict occurrences with a fixed cause.
pub fn conflict_case_with_cause(cause: ConflictCause) -> impl Strategy<Value = ConflictCase> {
    (record_strategy(), 1usize..64).prop_map(move |(record, violations)| ConflictCase {
        cause,
        record,
        violations,
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn records_have_a_key(record in record_strategy()) {
            prop_assert_eq!(record.primary_key_columns().collect::<Vec<_>>(), vec![0]);
            prop_assert!(record.primary_key_values().is_some());
        }

        #[test]
        fn changeset_ids_verify(changeset in changeset_strategy(6)) {
            prop_assert!(changeset.verify_id());
            prop_assert!(changeset.len() <= 6);
        }

        #[test]
        fn foreign_key_cases_carry_count(case in conflict_case_with_cause(ConflictCause::ForeignKey)) {
            let occurrence = case.occurrence();
            prop_assert_eq!(occurrence.cause, ConflictCause::ForeignKey);
            prop_assert!(occurrence.foreign_key_violations > 0);
        }
    }
}
