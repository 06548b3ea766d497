//! Catalog entries and the versioned registry that holds them.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::binder::BindError;
use crate::error::{Result, RuduError};
use crate::parser::ast::{DropKind, SelectStatement};
use crate::types::DataType;

use super::transaction::{Timestamp, Transaction};
use super::CatalogLookup;

/// Name of the schema every catalog starts with.
pub const DEFAULT_SCHEMA: &str = "main";

/// Central registry of all schemas and their relations.
///
/// Every entry is versioned by commit timestamp so that lookups can be made
/// against a transaction snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    schemas: HashMap<String, SchemaCatalog>,
    /// Next object ID for auto-increment.
    next_oid: u32,
    /// Highest commit timestamp applied to this catalog.
    last_commit_ts: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaCatalog {
    created_at: Timestamp,
    entries: HashMap<String, Vec<EntryVersion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryVersion {
    entry: CatalogEntry,
    created_at: Timestamp,
    dropped_at: Option<Timestamp>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    /// Creates a catalog containing only the empty default schema.
    #[must_use]
    pub fn new() -> Self {
        let mut schemas = HashMap::new();
        schemas.insert(
            DEFAULT_SCHEMA.to_string(),
            SchemaCatalog {
                created_at: 0,
                entries: HashMap::new(),
            },
        );
        Catalog {
            schemas,
            next_oid: 0,
            last_commit_ts: 0,
        }
    }

    /// Returns the next object ID and increments the counter.
    fn next_oid(&mut self) -> u32 {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    fn record_commit(&mut self, commit_ts: Timestamp) {
        self.last_commit_ts = self.last_commit_ts.max(commit_ts);
    }

    /// Returns the highest commit timestamp applied to this catalog.
    #[must_use]
    pub fn last_commit_ts(&self) -> Timestamp {
        self.last_commit_ts
    }

    /// Creates a new schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema already exists.
    pub fn create_schema(&mut self, name: &str, commit_ts: Timestamp) -> Result<()> {
        if self.schemas.contains_key(name) {
            return Err(RuduError::SchemaError(format!(
                "Schema '{name}' already exists"
            )));
        }
        self.schemas.insert(
            name.to_string(),
            SchemaCatalog {
                created_at: commit_ts,
                entries: HashMap::new(),
            },
        );
        self.record_commit(commit_ts);
        Ok(())
    }

    /// Registers a new table.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema does not exist or the name is taken.
    pub fn create_table(&mut self, mut table: TableCatalogEntry, commit_ts: Timestamp) -> Result<u32> {
        let oid = self.next_oid();
        table.oid = oid;
        let schema = table.schema.clone();
        let name = table.name.clone();
        self.insert_entry(&schema, &name, CatalogEntry::Table(Arc::new(table)), commit_ts)?;
        Ok(oid)
    }

    /// Registers a new view.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema does not exist or the name is taken.
    pub fn create_view(&mut self, mut view: ViewCatalogEntry, commit_ts: Timestamp) -> Result<u32> {
        let oid = self.next_oid();
        view.oid = oid;
        let schema = view.schema.clone();
        let name = view.name.clone();
        self.insert_entry(&schema, &name, CatalogEntry::View(Arc::new(view)), commit_ts)?;
        Ok(oid)
    }

    /// Registers a new index.
    ///
    /// # Errors
    ///
    /// Returns an error if the indexed table does not exist, a column is
    /// unknown, or the index name is taken.
    pub fn create_index(&mut self, mut index: IndexCatalogEntry, commit_ts: Timestamp) -> Result<u32> {
        let table = match self.live_entry(&index.schema, &index.table) {
            Some(CatalogEntry::Table(table)) => Arc::clone(table),
            _ => {
                return Err(RuduError::SchemaError(format!(
                    "Table '{}.{}' does not exist",
                    index.schema, index.table
                )))
            }
        };
        for column in &index.columns {
            if table.get_column(column).is_none() {
                return Err(RuduError::SchemaError(format!(
                    "Column '{column}' not found in table '{}'",
                    table.name
                )));
            }
        }

        let oid = self.next_oid();
        index.oid = oid;
        let schema = index.schema.clone();
        let name = index.name.clone();
        self.insert_entry(&schema, &name, CatalogEntry::Index(Arc::new(index)), commit_ts)?;
        Ok(oid)
    }

    fn insert_entry(
        &mut self,
        schema: &str,
        name: &str,
        entry: CatalogEntry,
        commit_ts: Timestamp,
    ) -> Result<()> {
        if self.live_entry(schema, name).is_some() {
            return Err(RuduError::SchemaError(format!(
                "Relation '{schema}.{name}' already exists"
            )));
        }
        let schema_catalog = self
            .schemas
            .get_mut(schema)
            .ok_or_else(|| RuduError::SchemaError(format!("Schema '{schema}' does not exist")))?;
        schema_catalog
            .entries
            .entry(name.to_string())
            .or_default()
            .push(EntryVersion {
                entry,
                created_at: commit_ts,
                dropped_at: None,
            });
        self.record_commit(commit_ts);
        Ok(())
    }

    /// Marks a live entry as dropped at `commit_ts`. Dropping a table also
    /// drops the indexes defined on it.
    ///
    /// Returns false if no live entry with that name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but is of a different kind.
    pub fn drop_entry(
        &mut self,
        schema: &str,
        name: &str,
        kind: DropKind,
        commit_ts: Timestamp,
    ) -> Result<bool> {
        let Some(entry) = self.live_entry(schema, name) else {
            return Ok(false);
        };
        if entry.drop_kind() != kind {
            return Err(RuduError::SchemaError(format!(
                "'{schema}.{name}' is a {}, not a {}",
                entry.kind(),
                kind.as_str().to_lowercase()
            )));
        }

        let dependent_indexes: Vec<String> = if kind == DropKind::Table {
            self.schemas
                .get(schema)
                .map(|s| {
                    s.entries
                        .values()
                        .filter_map(|versions| versions.last())
                        .filter(|v| v.dropped_at.is_none())
                        .filter_map(|v| match &v.entry {
                            CatalogEntry::Index(index) if index.table == name => {
                                Some(index.name.clone())
                            }
                            _ => None,
                        })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if let Some(schema_catalog) = self.schemas.get_mut(schema) {
            for target in dependent_indexes.iter().map(String::as_str).chain([name]) {
                if let Some(version) = schema_catalog
                    .entries
                    .get_mut(target)
                    .and_then(|versions| versions.last_mut())
                {
                    version.dropped_at = Some(commit_ts);
                }
            }
        }
        self.record_commit(commit_ts);
        Ok(true)
    }

    /// Returns the newest, not yet dropped version of an entry.
    fn live_entry(&self, schema: &str, name: &str) -> Option<&CatalogEntry> {
        self.schemas
            .get(schema)?
            .entries
            .get(name)?
            .last()
            .filter(|v| v.dropped_at.is_none())
            .map(|v| &v.entry)
    }

    /// Returns true if the schema exists in the latest catalog state.
    #[must_use]
    pub fn schema_exists(&self, schema: &str) -> bool {
        self.schemas.contains_key(schema)
    }

    /// Returns true if a live relation with this name exists.
    #[must_use]
    pub fn entry_exists(&self, schema: &str, name: &str) -> bool {
        self.live_entry(schema, name).is_some()
    }

    /// Retrieves the version of an entry visible to `transaction`.
    #[must_use]
    pub fn get_entry(
        &self,
        transaction: &Transaction,
        schema: &str,
        name: &str,
    ) -> Option<&CatalogEntry> {
        let schema_catalog = self
            .schemas
            .get(schema)
            .filter(|s| s.created_at <= transaction.snapshot())?;
        schema_catalog
            .entries
            .get(name)?
            .iter()
            .rev()
            .find(|v| transaction.can_see(v.created_at, v.dropped_at))
            .map(|v| &v.entry)
    }

    /// Returns the names of all relations in `schema` visible to `transaction`, sorted.
    #[must_use]
    pub fn entry_names(&self, transaction: &Transaction, schema: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .schemas
            .get(schema)
            .map(|s| {
                s.entries
                    .iter()
                    .filter(|(_, versions)| {
                        versions
                            .iter()
                            .any(|v| transaction.can_see(v.created_at, v.dropped_at))
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Serializes the catalog to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| RuduError::CatalogError(format!("Failed to serialize catalog: {e}")))
    }

    /// Deserializes a catalog from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data)
            .map_err(|e| RuduError::CatalogError(format!("Failed to deserialize catalog: {e}")))
    }
}

impl CatalogLookup for Catalog {
    fn get_table_or_view(
        &self,
        transaction: &Transaction,
        schema: &str,
        name: &str,
    ) -> Result<CatalogEntry> {
        let schema_visible = self
            .schemas
            .get(schema)
            .is_some_and(|s| s.created_at <= transaction.snapshot());
        if !schema_visible {
            return Err(BindError::UndefinedSchema(schema.to_string()).into());
        }
        self.get_entry(transaction, schema, name)
            .cloned()
            .ok_or_else(|| BindError::UndefinedTable(name.to_string()).into())
    }
}

/// A catalog entry, tagged by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogEntry {
    Table(Arc<TableCatalogEntry>),
    View(Arc<ViewCatalogEntry>),
    Index(Arc<IndexCatalogEntry>),
}

impl CatalogEntry {
    /// Returns the entry's kind.
    #[must_use]
    pub fn kind(&self) -> CatalogEntryKind {
        match self {
            CatalogEntry::Table(_) => CatalogEntryKind::Table,
            CatalogEntry::View(_) => CatalogEntryKind::View,
            CatalogEntry::Index(_) => CatalogEntryKind::Index,
        }
    }

    /// Returns the entry's name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            CatalogEntry::Table(t) => &t.name,
            CatalogEntry::View(v) => &v.name,
            CatalogEntry::Index(i) => &i.name,
        }
    }

    fn drop_kind(&self) -> DropKind {
        match self {
            CatalogEntry::Table(_) => DropKind::Table,
            CatalogEntry::View(_) => DropKind::View,
            CatalogEntry::Index(_) => DropKind::Index,
        }
    }
}

/// Kind of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogEntryKind {
    Table,
    View,
    Index,
}

impl fmt::Display for CatalogEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CatalogEntryKind::Table => "table",
            CatalogEntryKind::View => "view",
            CatalogEntryKind::Index => "index",
        })
    }
}

/// Schema definition for a base table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCatalogEntry {
    /// Internal object ID (assigned by the catalog).
    pub oid: u32,
    /// Owning schema.
    pub schema: String,
    /// Table name.
    pub name: String,
    /// Ordered list of column definitions.
    pub columns: Vec<ColumnDef>,
}

impl TableCatalogEntry {
    /// Creates a new table entry with validation.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no columns or column names repeat.
    pub fn new(schema: String, name: String, columns: Vec<ColumnDef>) -> Result<Self> {
        let table = TableCatalogEntry {
            oid: 0, // Will be set by catalog
            schema,
            name,
            columns,
        };
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(RuduError::SchemaError(
                "Table must have at least one column".into(),
            ));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if !seen.insert(&col.name) {
                return Err(RuduError::SchemaError(format!(
                    "Duplicate column name '{}'",
                    col.name
                )));
            }
        }

        Ok(())
    }

    /// Finds a column definition by name.
    #[must_use]
    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Finds the index of a column by name.
    #[must_use]
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// A stored view: its unbound defining query and declared column aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewCatalogEntry {
    pub oid: u32,
    pub schema: String,
    pub name: String,
    pub query: SelectStatement,
    /// Declared column aliases; may be shorter than the query's output.
    pub aliases: Vec<String>,
}

impl ViewCatalogEntry {
    #[must_use]
    pub fn new(schema: String, name: String, query: SelectStatement, aliases: Vec<String>) -> Self {
        ViewCatalogEntry {
            oid: 0,
            schema,
            name,
            query,
            aliases,
        }
    }
}

/// A secondary index. Indexes live in the same namespace as tables and views
/// but cannot be used as table references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCatalogEntry {
    pub oid: u32,
    pub schema: String,
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
}

impl IndexCatalogEntry {
    #[must_use]
    pub fn new(schema: String, name: String, table: String, columns: Vec<String>) -> Self {
        IndexCatalogEntry {
            oid: 0,
            schema,
            name,
            table,
            columns,
        }
    }
}

/// Definition of a single column in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Column data type.
    pub data_type: DataType,
}

impl ColumnDef {
    /// Creates a new column definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the column name is empty.
    pub fn new(name: String, data_type: DataType) -> Result<Self> {
        if name.is_empty() {
            return Err(RuduError::SchemaError("Column name cannot be empty".into()));
        }
        Ok(ColumnDef { name, data_type })
    }
}
