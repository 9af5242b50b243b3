//! Changesets: ordered, content-addressed revisions.

use crate::record::{ChangeRecord, DbOpcode};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One committed revision: an ordered list of row changes plus its place in history.
///
/// The id is the SHA-256 of the parent id and the record contents, so two
/// briefcases that build the same revision on the same parent agree on its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    /// Content-addressed changeset id (lowercase hex).
    pub id: String,
    /// Id of the changeset this one was built on; empty for the first revision.
    #[serde(default)]
    pub parent_id: String,
    /// Change records in decode order.
    pub records: Vec<ChangeRecord>,
}

impl Changeset {
    /// Creates a changeset and computes its id.
    pub fn new(parent_id: impl Into<String>, records: Vec<ChangeRecord>) -> Self {
        let parent_id = parent_id.into();
        let id = compute_id(&parent_id, &records);
        Self {
            id,
            parent_id,
            records,
        }
    }

    /// Returns true if the stored id matches the contents.
    pub fn verify_id(&self) -> bool {
        compute_id(&self.parent_id, &self.records) == self.id
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates records in decode order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChangeRecord> {
        self.records.iter()
    }

    /// Tables touched by this changeset, in first-appearance order.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for record in &self.records {
            if !tables.contains(&record.table.as_str()) {
                tables.push(&record.table);
            }
        }
        tables
    }

    /// Short form of the id for log lines.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

impl<'a> IntoIterator for &'a Changeset {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

fn compute_id(parent_id: &str, records: &[ChangeRecord]) -> String {
    let mut hasher = Sha256::new();
    hash_str(&mut hasher, parent_id);
    hasher.update((records.len() as u64).to_le_bytes());

    for record in records {
        hash_str(&mut hasher, &record.table);
        hasher.update([
            match record.opcode {
                DbOpcode::Insert => 1u8,
                DbOpcode::Update => 2,
                DbOpcode::Delete => 3,
            },
            u8::from(record.indirect),
        ]);
        hasher.update((record.primary_key.len() as u64).to_le_bytes());
        hasher.update(
            record
                .primary_key
                .iter()
                .map(|k| u8::from(*k))
                .collect::<Vec<u8>>(),
        );
        hash_image(&mut hasher, &record.old);
        hash_image(&mut hasher, &record.new);
    }

    hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_image(hasher: &mut Sha256, image: &[Option<Value>]) {
    hasher.update((image.len() as u64).to_le_bytes());
    for value in image {
        match value {
            None => hasher.update([0u8]),
            Some(Value::Null) => hasher.update([1u8]),
            Some(Value::Integer(i)) => {
                hasher.update([2u8]);
                hasher.update(i.to_le_bytes());
            }
            Some(Value::Real(r)) => {
                hasher.update([3u8]);
                hasher.update(r.to_bits().to_le_bytes());
            }
            Some(Value::Text(s)) => {
                hasher.update([4u8]);
                hash_str(hasher, s);
            }
            Some(Value::Blob(b)) => {
                hasher.update([5u8]);
                hasher.update((b.len() as u64).to_le_bytes());
                hasher.update(b);
            }
        }
    }
}
