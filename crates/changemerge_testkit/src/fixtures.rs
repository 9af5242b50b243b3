//! Test fixtures: schemas, briefcases and a changeset hub.
//!
//! Provides convenience functions for setting up briefcases that share a
//! schema and exchange changesets through an in-memory [`Hub`].

use changemerge_changeset::{Changeset, RowStore, Value};
use changemerge_store::{MemoryDatabase, OnDelete, TableSchema};

/// Schema shared by fixture briefcases.
///
/// - `Element(id, code UNIQUE, label)`
/// - `Aspect(id, element_id -> Element ON DELETE CASCADE, payload)`
/// - `ec_Link(id, element_id -> Element ON DELETE SET NULL)`
pub fn briefcase_schema() -> Vec<TableSchema> {
    vec![
        TableSchema::new("Element")
            .required("id")
            .column("code")
            .column("label")
            .primary_key(&["id"])
            .unique(&["code"]),
        TableSchema::new("Aspect")
            .required("id")
            .column("element_id")
            .column("payload")
            .primary_key(&["id"])
            .foreign_key(&["element_id"], "Element", OnDelete::Cascade),
        TableSchema::new("ec_Link")
            .required("id")
            .column("element_id")
            .primary_key(&["id"])
            .foreign_key(&["element_id"], "Element", OnDelete::SetNull),
    ]
}

/// Creates an empty briefcase with [`briefcase_schema`].
pub fn new_briefcase() -> MemoryDatabase {
    MemoryDatabase::with_schema(briefcase_schema()).expect("Fixture schema should be valid")
}

/// Integer value.
pub fn int(i: i64) -> Value {
    Value::Integer(i)
}

/// Text value.
pub fn text(s: &str) -> Value {
    Value::Text(s.to_owned())
}

/// An `Element` row.
pub fn element(id: i64, code: &str, label: &str) -> Vec<Value> {
    vec![int(id), text(code), text(label)]
}

/// An `Aspect` row.
pub fn aspect(id: i64, element_id: i64, payload: &str) -> Vec<Value> {
    vec![int(id), int(element_id), text(payload)]
}

/// An `ec_Link` row.
pub fn link(id: i64, element_id: i64) -> Vec<Value> {
    vec![int(id), int(element_id)]
}

/// Linear changeset history shared by briefcases.
#[derive(Debug, Default)]
pub struct Hub {
    history: Vec<Changeset>,
}

impl Hub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the newest changeset, or `""` when empty.
    pub fn tip(&self) -> &str {
        self.history.last().map_or("", |c| c.id.as_str())
    }

    /// All changesets, oldest first.
    pub fn history(&self) -> &[Changeset] {
        &self.history
    }

    /// Accepts a changeset that follows the current tip.
    pub fn accept(&mut self, changeset: Changeset) -> Result<(), String> {
        if changeset.parent_id != self.tip() {
            return Err(format!(
                "changeset {} follows {:?}, hub tip is {:?}",
                changeset.short_id(),
                changeset.parent_id,
                self.tip()
            ));
        }
        self.history.push(changeset);
        Ok(())
    }

    /// Packages `briefcase`'s local changes and accepts them.
    ///
    /// Returns the id of the pushed changeset, or `None` if there was nothing to push.
    /// A briefcase that is behind the tip keeps its local changes.
    pub fn push(&mut self, briefcase: &mut MemoryDatabase) -> Result<Option<String>, String> {
        let parent = briefcase.parent_changeset_id().map_err(|e| e.to_string())?;
        if parent != self.tip() {
            return Err(format!("briefcase at {parent:?} must pull before pushing"));
        }
        let Some(changeset) = briefcase.take_local_changeset() else {
            return Ok(None);
        };
        let id = changeset.id.clone();
        self.accept(changeset)?;
        Ok(Some(id))
    }

    /// Changesets after `parent_id`, oldest first.
    pub fn since(&self, parent_id: &str) -> &[Changeset] {
        if parent_id.is_empty() {
            return &self.history;
        }
        match self.history.iter().position(|c| c.id == parent_id) {
            Some(i) => &self.history[i + 1..],
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_chains_pushes() {
        let mut hub = Hub::new();
        let mut a = new_briefcase();

        a.local(|txn| txn.insert("Element", element(1, "E1", "one")))
            .unwrap();
        let first = hub.push(&mut a).unwrap().unwrap();
        assert_eq!(hub.tip(), first);
        assert_eq!(a.parent_changeset_id().unwrap(), first);

        a.local(|txn| txn.insert("Aspect", aspect(10, 1, "x")))
            .unwrap();
        hub.push(&mut a).unwrap();

        assert_eq!(hub.since("").len(), 2);
        assert_eq!(hub.since(&first).len(), 1);
        assert!(hub.push(&mut a).unwrap().is_none());
    }

    #[test]
    fn hub_rejects_stale_push() {
        let mut hub = Hub::new();
        let mut a = new_briefcase();
        let mut b = new_briefcase();

        a.local(|txn| txn.insert("Element", element(1, "E1", "one")))
            .unwrap();
        b.local(|txn| txn.insert("Element", element(2, "E2", "two")))
            .unwrap();

        hub.push(&mut a).unwrap();
        assert!(hub.push(&mut b).is_err());
        assert_eq!(b.pending_records().len(), 1);
    }
}
