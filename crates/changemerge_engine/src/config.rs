//! Configuration for merge sessions.

use std::collections::BTreeSet;

/// Name of the briefcase-local debug flag that lets foreign-key violations through.
pub const FK_OVERRIDE_FLAG: &str = "allowForeignKeyViolations";

/// Table-name prefix of the reserved metadata namespace.
pub const DEFAULT_METADATA_TABLE_PREFIX: &str = "ec_";

/// Configuration for merging changesets into a briefcase.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Emit info-level diagnostics (benign skips and replays).
    pub verbose_diagnostics: bool,
    /// Prefix identifying metadata tables. An empty prefix matches no table.
    pub metadata_table_prefix: String,
    /// Tables whose records are dropped before they reach the row store.
    pub excluded_tables: BTreeSet<String>,
    /// Explicit foreign-key override. `None` reads [`FK_OVERRIDE_FLAG`] from the store.
    pub allow_foreign_key_violations: Option<bool>,
    /// Require each changeset's parent id to match the store's current parent.
    pub verify_parent_chain: bool,
}

impl MergeConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            verbose_diagnostics: false,
            metadata_table_prefix: DEFAULT_METADATA_TABLE_PREFIX.to_owned(),
            excluded_tables: BTreeSet::new(),
            allow_foreign_key_violations: None,
            verify_parent_chain: true,
        }
    }

    /// Enables or disables info-level diagnostics.
    #[must_use]
    pub fn with_verbose_diagnostics(mut self, verbose: bool) -> Self {
        self.verbose_diagnostics = verbose;
        self
    }

    /// Sets the metadata table prefix.
    #[must_use]
    pub fn with_metadata_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_table_prefix = prefix.into();
        self
    }

    /// Excludes a table from merging.
    #[must_use]
    pub fn exclude_table(mut self, table: impl Into<String>) -> Self {
        self.excluded_tables.insert(table.into());
        self
    }

    /// Forces the foreign-key override on or off, ignoring the store's debug flag.
    #[must_use]
    pub fn with_foreign_key_override(mut self, allow: bool) -> Self {
        self.allow_foreign_key_violations = Some(allow);
        self
    }

    /// Enables or disables parent-chain verification.
    #[must_use]
    pub fn with_verify_parent_chain(mut self, verify: bool) -> Self {
        self.verify_parent_chain = verify;
        self
    }

    /// Returns true if records for `table` are merged.
    pub fn includes_table(&self, table: &str) -> bool {
        !self.excluded_tables.contains(table)
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_metadata_table(prefix: &str, table: &str) -> bool {
    !prefix.is_empty() && table.starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = MergeConfig::default();
        assert!(!config.verbose_diagnostics);
        assert_eq!(config.metadata_table_prefix, "ec_");
        assert!(config.allow_foreign_key_violations.is_none());
        assert!(config.verify_parent_chain);
        assert!(config.includes_table("Foo"));
    }

    #[test]
    fn builder_pattern() {
        let config = MergeConfig::new()
            .with_verbose_diagnostics(true)
            .with_metadata_table_prefix("meta_")
            .exclude_table("Scratch")
            .with_foreign_key_override(true)
            .with_verify_parent_chain(false);

        assert!(config.verbose_diagnostics);
        assert_eq!(config.metadata_table_prefix, "meta_");
        assert!(!config.includes_table("Scratch"));
        assert_eq!(config.allow_foreign_key_violations, Some(true));
        assert!(!config.verify_parent_chain);
    }

    #[test]
    fn empty_prefix_matches_nothing() {
        assert!(is_metadata_table("ec_", "ec_Class"));
        assert!(!is_metadata_table("", "ec_Class"));
        assert!(!is_metadata_table("", ""));
    }
}
