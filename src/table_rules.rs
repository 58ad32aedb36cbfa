// ABOUTME: Per-table export rules: skipped tables and dangling-reference filter overrides
// ABOUTME: Supports config/CLI inputs and a deterministic fingerprint recorded in the manifest

use crate::utils::{quote_ident, validate_sqlite_identifier};
use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// One child column and the parent key it must reference when set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentJoin {
    pub column: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// Export-time predicate that drops rows whose foreign keys point at missing parents.
///
/// A NULL foreign key references nothing and is kept. The predicate is expressed
/// as left joins so SQLite can drive it through the parent primary-key index
/// instead of evaluating a subquery per child row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOverride {
    table: String,
    joins: Vec<ParentJoin>,
}

impl FilterOverride {
    pub fn new(table: impl Into<String>, joins: Vec<ParentJoin>) -> Result<Self> {
        let table = table.into();
        validate_sqlite_identifier(&table)?;
        if joins.is_empty() {
            bail!("Filter override for '{}' needs at least one parent join", table);
        }
        for join in &joins {
            validate_sqlite_identifier(&join.column)?;
            validate_sqlite_identifier(&join.parent_table)?;
            validate_sqlite_identifier(&join.parent_column)?;
        }
        Ok(Self { table, joins })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn joins(&self) -> &[ParentJoin] {
        &self.joins
    }

    /// Stable identifier written to the manifest, e.g. `parent-exists:word_id->Words.word_id`
    pub fn id(&self) -> String {
        let parts: Vec<String> = self
            .joins
            .iter()
            .map(|j| format!("{}->{}.{}", j.column, j.parent_table, j.parent_column))
            .collect();
        format!("parent-exists:{}", parts.join(","))
    }

    /// Full SELECT returning the child rows whose non-NULL references all resolve
    pub fn select_sql(&self) -> String {
        let mut sql = format!("SELECT c.* FROM {} c", quote_ident(&self.table));
        let mut conditions = Vec::with_capacity(self.joins.len());
        for (idx, join) in self.joins.iter().enumerate() {
            let column = quote_ident(&join.column);
            let parent_column = quote_ident(&join.parent_column);
            sql.push_str(&format!(
                " LEFT JOIN {} p{idx} ON c.{column} = p{idx}.{parent_column}",
                quote_ident(&join.parent_table),
            ));
            conditions.push(format!(
                "(c.{column} IS NULL OR p{idx}.{parent_column} IS NOT NULL)"
            ));
        }
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
        sql
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableRules {
    skip_tables: BTreeSet<String>,
    filter_overrides: BTreeMap<String, FilterOverride>,
}

impl TableRules {
    /// Rules for the pronunciation database: known-empty cache/test tables are
    /// skipped, and the three tables left with orphans by the tag-migration run
    /// (executed with `foreign_keys = OFF`) are exported through join filters.
    pub fn pronunciation_defaults() -> Self {
        let mut rules = TableRules::default();
        for table in [
            "sqlite_sequence",
            "AntonymCache",
            "CompoundWordParts",
            "EmbeddingModels",
            "MaintenanceLogs",
            "MorphologicalForms",
            "SenseEmbeddings",
            "TestCaseResults",
            "TestRuns",
            "WordEmbeddings",
        ] {
            rules.skip_tables.insert(table.to_string());
        }

        let word = |column: &str| ParentJoin {
            column: column.to_string(),
            parent_table: "Words".to_string(),
            parent_column: "word_id".to_string(),
        };
        let defaults = [
            ("Variants", vec![word("word_id")]),
            (
                "SemanticRelationships",
                vec![word("source_word_id"), word("target_word_id")],
            ),
            ("SynonymCache", vec![word("word_id"), word("synonym_word_id")]),
        ];
        for (table, joins) in defaults {
            let rule = FilterOverride {
                table: table.to_string(),
                joins,
            };
            rules.filter_overrides.insert(table.to_string(), rule);
        }
        rules
    }

    pub fn add_skip_table(&mut self, table: String) -> Result<()> {
        validate_sqlite_identifier(&table)?;
        if self.filter_overrides.contains_key(&table) {
            bail!(
                "Cannot skip table '{}' because it has a filter override",
                table
            );
        }
        self.skip_tables.insert(table);
        Ok(())
    }

    pub fn add_filter_override(&mut self, rule: FilterOverride) -> Result<()> {
        if self.skip_tables.contains(rule.table()) {
            bail!(
                "Cannot apply filter override to table '{}' because it is skipped",
                rule.table()
            );
        }
        self.filter_overrides.insert(rule.table().to_string(), rule);
        Ok(())
    }

    /// Parse `Table:column->Parent.column[,column->Parent.column...]` specs
    pub fn apply_filter_override_cli(&mut self, specs: &[String]) -> Result<()> {
        for spec in specs {
            let (table, joins) = spec
                .split_once(':')
                .with_context(|| format!("Filter override '{}' missing ':' separator", spec))?;
            let joins = joins
                .split(',')
                .map(parse_join_spec)
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("Invalid filter override '{}'", spec))?;
            self.add_filter_override(FilterOverride::new(table.trim(), joins)?)?;
        }
        Ok(())
    }

    pub fn should_export(&self, table: &str) -> bool {
        !self.skip_tables.contains(table)
    }

    pub fn filter_override(&self, table: &str) -> Option<&FilterOverride> {
        self.filter_overrides.get(table)
    }

    pub fn skip_tables(&self) -> impl Iterator<Item = &str> {
        self.skip_tables.iter().map(String::as_str)
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for table in &self.skip_tables {
            hasher.update(b"skip:");
            hasher.update(table.as_bytes());
            hasher.update(b"|");
        }
        for (table, rule) in &self.filter_overrides {
            hasher.update(table.as_bytes());
            hasher.update(b"=");
            hasher.update(rule.id().as_bytes());
            hasher.update(b"|");
        }
        format!("{:x}", hasher.finalize())
    }
}

fn parse_join_spec(input: &str) -> Result<ParentJoin> {
    let (column, parent) = input
        .trim()
        .split_once("->")
        .with_context(|| format!("Join '{}' must be column->Parent.column", input))?;
    let (parent_table, parent_column) = parent
        .split_once('.')
        .with_context(|| format!("Parent '{}' must be Parent.column", parent))?;
    Ok(ParentJoin {
        column: column.trim().to_string(),
        parent_table: parent_table.trim().to_string(),
        parent_column: parent_column.trim().to_string(),
    })
}
