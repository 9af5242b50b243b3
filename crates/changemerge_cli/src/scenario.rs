//! Scenario files.
//!
//! A scenario describes one briefcase, the changesets it is about to pull and the
//! settings to pull them with. The changesets come from a second replica of the
//! same schema: `seed` edits are made there first and pulled into the briefcase,
//! then each `incoming` entry becomes one changeset.
//!
//! ```json
//! {
//!   "schema": [
//!     { "name": "Foo", "columns": [{ "name": "id", "not_null": true }, { "name": "v" }],
//!       "primary_key": ["id"] }
//!   ],
//!   "seed": [{ "op": "insert", "table": "Foo", "row": [1, "a"] }],
//!   "local": [{ "op": "update", "table": "Foo", "key": [1], "set": { "v": "b" } }],
//!   "incoming": [{ "edits": [{ "op": "delete", "table": "Foo", "key": [1] }] }],
//!   "flags": { "allowForeignKeyViolations": false },
//!   "merge": { "verbose": true },
//!   "policy": [{ "table": "Foo", "resolution": "skip" }]
//! }
//! ```
//!
//! Row values are plain JSON: `null`, numbers, strings and booleans (stored as
//! `0`/`1`). An `incoming` entry may also carry raw change records
//! (`{ "records": [...] }`, in the format printed by `dump --format json`); those
//! bypass the replica's own constraint checks.

use changemerge_changeset::{ChangeRecord, Changeset, Resolution, RowStore, StoreError, Value};
use changemerge_engine::{Category, MergeConfig, MergeError, MergeSession, TablePolicy};
use changemerge_store::{LocalTransaction, MemoryDatabase, TableSchema};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Errors loading or preparing a scenario.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The file could not be read.
    #[error("cannot read scenario: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid scenario.
    #[error("invalid scenario: {0}")]
    Parse(#[from] serde_json::Error),

    /// A row value has no column-value equivalent.
    #[error("unsupported value {0}: use null, a number, a string or a boolean")]
    UnsupportedValue(String),

    /// A policy rule names an unknown category.
    #[error("unknown conflict category: {0}")]
    UnknownCategory(String),

    /// The schema or an edit was rejected.
    #[error("scenario setup failed: {0}")]
    Store(#[from] StoreError),

    /// The seed changeset did not merge cleanly.
    #[error("seeding the briefcase failed: {0}")]
    Seed(#[from] MergeError),
}

/// Result type for scenario operations.
pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// A scenario file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    /// Tables, in dependency order.
    pub schema: Vec<TableSchema>,
    /// Edits shared by both replicas before the scenario starts.
    #[serde(default)]
    pub seed: Vec<Edit>,
    /// Pending local edits in the briefcase.
    #[serde(default)]
    pub local: Vec<Edit>,
    /// Changesets to pull, oldest first.
    #[serde(default)]
    pub incoming: Vec<Incoming>,
    /// Briefcase debug flags.
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    /// Merge settings.
    #[serde(default)]
    pub merge: MergeSettings,
    /// Conflict policy overrides.
    #[serde(default)]
    pub policy: Vec<PolicyRule>,
}

/// A local edit.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", deny_unknown_fields)]
pub enum Edit {
    /// Inserts a full row.
    Insert {
        /// Table name.
        table: String,
        /// Column values in storage order.
        row: Vec<JsonValue>,
    },
    /// Updates named columns of a row.
    Update {
        /// Table name.
        table: String,
        /// Primary-key values.
        key: Vec<JsonValue>,
        /// New column values by name.
        set: BTreeMap<String, JsonValue>,
    },
    /// Deletes a row.
    Delete {
        /// Table name.
        table: String,
        /// Primary-key values.
        key: Vec<JsonValue>,
    },
}

/// One incoming changeset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Incoming {
    /// Edits made on the remote replica.
    Edits(Vec<Edit>),
    /// Raw change records.
    Records(Vec<ChangeRecord>),
}

/// Merge settings of a scenario.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSettings {
    /// Emit info-level diagnostics.
    pub verbose: bool,
    /// Metadata table prefix; `ec_` when absent.
    pub metadata_table_prefix: Option<String>,
    /// Tables the row store skips.
    pub excluded_tables: Vec<String>,
    /// Foreign-key override; read from the briefcase flag when absent.
    pub allow_foreign_key_violations: Option<bool>,
    /// Check that changesets chain onto the briefcase.
    pub verify_parent_chain: Option<bool>,
}

impl MergeSettings {
    /// Builds the engine configuration.
    pub fn to_config(&self) -> MergeConfig {
        let mut config = MergeConfig::new().with_verbose_diagnostics(self.verbose);
        if let Some(prefix) = &self.metadata_table_prefix {
            config = config.with_metadata_table_prefix(prefix.clone());
        }
        for table in &self.excluded_tables {
            config = config.exclude_table(table.clone());
        }
        if let Some(allow) = self.allow_foreign_key_violations {
            config = config.with_foreign_key_override(allow);
        }
        if let Some(verify) = self.verify_parent_chain {
            config = config.with_verify_parent_chain(verify);
        }
        config
    }
}

/// A fixed resolution for conflicts on one table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyRule {
    /// Table name.
    pub table: String,
    /// Category name (as printed in diagnostics); every category when absent.
    #[serde(default)]
    pub category: Option<String>,
    /// Resolution to apply.
    pub resolution: Resolution,
}

/// A scenario ready to replay.
#[derive(Debug)]
pub struct Prepared {
    /// The briefcase, seeded and carrying its local edits.
    pub briefcase: MemoryDatabase,
    /// Changesets to pull.
    pub changesets: Vec<Changeset>,
    /// Engine configuration.
    pub config: MergeConfig,
    /// Policy overrides, if any.
    pub policy: Option<TablePolicy>,
}

impl Scenario {
    /// Reads a scenario file.
    pub fn load(path: &Path) -> ScenarioResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Parses a scenario from JSON.
    pub fn parse(text: &str) -> ScenarioResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builds the briefcase and the incoming changesets.
    pub fn prepare(&self) -> ScenarioResult<Prepared> {
        let mut remote = MemoryDatabase::with_schema(self.schema.clone())?;
        let mut briefcase = MemoryDatabase::with_schema(self.schema.clone())?;

        run_edits(&mut remote, &self.seed)?;
        if let Some(seed) = remote.take_local_changeset() {
            debug!(records = seed.len(), "seeding briefcase");
            MergeSession::new(&mut briefcase, MergeConfig::default())
                .pull(std::slice::from_ref(&seed))
                .into_result()?;
        }

        for (name, value) in &self.flags {
            briefcase.set_debug_flag(name.clone(), *value);
        }
        run_edits(&mut briefcase, &self.local)?;

        let mut changesets = Vec::with_capacity(self.incoming.len());
        for incoming in &self.incoming {
            let changeset = match incoming {
                Incoming::Edits(edits) => {
                    run_edits(&mut remote, edits)?;
                    match remote.take_local_changeset() {
                        Some(changeset) => changeset,
                        None => continue,
                    }
                }
                Incoming::Records(records) => {
                    let changeset = Changeset::new(remote.parent_changeset_id()?, records.clone());
                    remote.set_parent_changeset_id(&changeset.id)?;
                    changeset
                }
            };
            changesets.push(changeset);
        }

        Ok(Prepared {
            briefcase,
            changesets,
            config: self.merge.to_config(),
            policy: self.table_policy()?,
        })
    }

    fn table_policy(&self) -> ScenarioResult<Option<TablePolicy>> {
        if self.policy.is_empty() {
            return Ok(None);
        }
        let mut policy = TablePolicy::new();
        for rule in &self.policy {
            let Some(name) = &rule.category else {
                policy = policy.table(rule.table.clone(), rule.resolution);
                continue;
            };
            let matching: Vec<Category> = Category::ALL
                .into_iter()
                .filter(|c| c.as_str() == name)
                .collect();
            if matching.is_empty() {
                return Err(ScenarioError::UnknownCategory(name.clone()));
            }
            for category in matching {
                policy = policy.category(rule.table.clone(), category, rule.resolution);
            }
        }
        Ok(Some(policy))
    }
}

/// A local edit with its values converted.
enum Prepped {
    Insert(String, Vec<Value>),
    Update(String, Vec<Value>, Vec<(String, Value)>),
    Delete(String, Vec<Value>),
}

fn run_edits(db: &mut MemoryDatabase, edits: &[Edit]) -> ScenarioResult<()> {
    if edits.is_empty() {
        return Ok(());
    }
    let prepped = edits.iter().map(prep).collect::<ScenarioResult<Vec<_>>>()?;
    db.local(|txn| prepped.iter().try_for_each(|edit| perform(txn, edit)))?;
    Ok(())
}

fn prep(edit: &Edit) -> ScenarioResult<Prepped> {
    Ok(match edit {
        Edit::Insert { table, row } => Prepped::Insert(table.clone(), to_values(row)?),
        Edit::Update { table, key, set } => {
            let changes = set
                .iter()
                .map(|(column, v)| Ok((column.clone(), to_value(v)?)))
                .collect::<ScenarioResult<Vec<_>>>()?;
            Prepped::Update(table.clone(), to_values(key)?, changes)
        }
        Edit::Delete { table, key } => Prepped::Delete(table.clone(), to_values(key)?),
    })
}

fn perform(txn: &mut LocalTransaction<'_>, edit: &Prepped) -> Result<(), StoreError> {
    match edit {
        Prepped::Insert(table, row) => txn.insert(table, row.clone()),
        Prepped::Update(table, key, changes) => {
            let changes: Vec<(&str, Value)> = changes
                .iter()
                .map(|(column, v)| (column.as_str(), v.clone()))
                .collect();
            txn.update(table, key, &changes)
        }
        Prepped::Delete(table, key) => txn.delete(table, key),
    }
}

fn to_values(json: &[JsonValue]) -> ScenarioResult<Vec<Value>> {
    json.iter().map(to_value).collect()
}

/// Converts a plain JSON value to a column value.
pub fn to_value(json: &JsonValue) -> ScenarioResult<Value> {
    match json {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Integer(i64::from(*b))),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Integer)
            .or_else(|| n.as_f64().map(Value::Real))
            .ok_or_else(|| ScenarioError::UnsupportedValue(json.to_string())),
        JsonValue::String(s) => Ok(Value::Text(s.clone())),
        JsonValue::Array(_) | JsonValue::Object(_) => {
            Err(ScenarioError::UnsupportedValue(json.to_string()))
        }
    }
}
