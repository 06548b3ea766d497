//! rudu - SQL binding stage
//!
//! Parses SQL, resolves table references (base tables, views, common table
//! expressions, subqueries) against a versioned catalog, and binds prepared
//! statement parameters, producing logical plans ready for an executor.
//!
//! ```no_run
//! use rudu::{Database, StatementOutcome, Value};
//!
//! # fn main() -> rudu::Result<()> {
//! let db = Database::new();
//! let mut conn = db.connect();
//! conn.run("CREATE TABLE people (name STRING, age INT64)")?;
//! conn.run("PREPARE adults AS SELECT name FROM people WHERE age >= $1")?;
//! if let StatementOutcome::Execute(plan) = conn.run("EXECUTE adults(18)")? {
//!     println!("{}", plan.plan().explain());
//! }
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod catalog;
pub mod error;
pub mod parser;
pub mod planner;
pub mod types;

use std::collections::HashMap;
use std::path::Path;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::debug;

pub use binder::BinderConfig;
pub use error::{Result, RuduError};
pub use types::{DataType, Value};

use binder::{Binder, BoundStatement};
use catalog::{Catalog, CatalogEntryKind, Timestamp, Transaction, TransactionManager};
use parser::ast::DropKind;
use planner::{ExecutePlan, LogicalPlan, Planner, PreparedStatement};

/// A catalog of schemas, tables, views and indexes that connections bind
/// statements against.
///
/// Can be shared between threads; each thread opens its own [`Connection`].
#[derive(Debug)]
pub struct Database {
    /// Schema catalog.
    catalog: RwLock<Catalog>,
    /// Snapshot and commit timestamp allocation.
    transactions: TransactionManager,
    config: BinderConfig,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates a new in-memory database.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BinderConfig::default())
    }

    /// Creates a new in-memory database with the given binder configuration.
    #[must_use]
    pub fn with_config(config: BinderConfig) -> Self {
        Database {
            catalog: RwLock::new(Catalog::new()),
            transactions: TransactionManager::new(),
            config,
        }
    }

    /// Opens a catalog previously written by [`Database::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid catalog.
    pub fn open(path: &Path, config: BinderConfig) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let catalog = Catalog::deserialize(&bytes)?;
        debug!(path = %path.display(), last_commit = catalog.last_commit_ts(), "opened catalog");
        Ok(Database {
            transactions: TransactionManager::resume(catalog.last_commit_ts()),
            catalog: RwLock::new(catalog),
            config,
        })
    }

    /// Writes the catalog to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = self.catalog.read().serialize()?;
        std::fs::write(path, bytes)?;
        debug!(path = %path.display(), "saved catalog");
        Ok(())
    }

    /// Opens a connection.
    #[must_use]
    pub fn connect(&self) -> Connection<'_> {
        Connection {
            database: self,
            prepared: HashMap::new(),
        }
    }

    /// Returns the binder configuration.
    #[must_use]
    pub fn config(&self) -> &BinderConfig {
        &self.config
    }

    /// Starts a read transaction at the latest committed snapshot.
    #[must_use]
    pub fn begin(&self) -> Transaction {
        self.transactions.begin()
    }

    /// Returns a read guard over the catalog.
    pub fn catalog(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    /// Creates an empty schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema already exists.
    pub fn create_schema(&self, name: &str) -> Result<()> {
        self.commit(|catalog, ts| catalog.create_schema(name, ts))?;
        debug!(schema = %name, "created schema");
        Ok(())
    }

    /// Applies a catalog change under the write lock at a fresh commit timestamp.
    fn commit<T>(&self, change: impl FnOnce(&mut Catalog, Timestamp) -> Result<T>) -> Result<T> {
        let mut catalog = self.catalog.write();
        let commit_ts = self.transactions.next_commit_ts();
        change(&mut catalog, commit_ts)
    }
}

/// Result of running one statement.
#[derive(Debug)]
pub enum StatementOutcome<'a> {
    /// Logical plan of a SELECT.
    Select(LogicalPlan),
    /// A table, view or index was created.
    Created { kind: CatalogEntryKind, name: String },
    /// DROP ran; `existed` is false only for `IF EXISTS` on a missing name.
    Dropped {
        kind: DropKind,
        name: String,
        existed: bool,
    },
    /// A prepared statement was registered (replacing any of the same name).
    Prepared { name: String, parameter_count: usize },
    /// Parameters were assigned; the plan is ready to run.
    Execute(ExecutePlan<'a>),
    /// A prepared statement was removed.
    Deallocated { name: String },
}

/// A session: runs statements one at a time in autocommit mode and owns its
/// prepared statements.
///
/// An [`StatementOutcome::Execute`] borrows the connection, so the connection
/// cannot run another statement until the execution plan is dropped.
pub struct Connection<'db> {
    database: &'db Database,
    prepared: HashMap<String, PreparedStatement>,
}

impl<'db> Connection<'db> {
    /// Returns the database this connection belongs to.
    #[must_use]
    pub fn database(&self) -> &'db Database {
        self.database
    }

    /// Parses, binds and plans one SQL statement, applying DDL to the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails to parse, bind or plan, or if
    /// the catalog rejects the change.
    pub fn run(&mut self, sql: &str) -> Result<StatementOutcome<'_>> {
        let statement = parser::parse_query(sql)?;
        let transaction = self.database.begin();
        let bound = {
            let catalog = self.database.catalog.read();
            let mut binder = Binder::new(&*catalog, &transaction, &self.database.config);
            binder.bind_statement(&statement)?
        };

        match bound {
            BoundStatement::Select(select) => {
                Ok(StatementOutcome::Select(Planner::new().plan_select(select)?))
            }
            BoundStatement::CreateTable(table) => {
                let name = table.name.clone();
                self.database
                    .commit(|catalog, ts| catalog.create_table(table, ts))?;
                debug!(table = %name, "created table");
                Ok(StatementOutcome::Created {
                    kind: CatalogEntryKind::Table,
                    name,
                })
            }
            BoundStatement::CreateView(view) => {
                let name = view.name.clone();
                self.database
                    .commit(|catalog, ts| catalog.create_view(view, ts))?;
                debug!(view = %name, "created view");
                Ok(StatementOutcome::Created {
                    kind: CatalogEntryKind::View,
                    name,
                })
            }
            BoundStatement::CreateIndex(index) => {
                let name = index.name.clone();
                self.database
                    .commit(|catalog, ts| catalog.create_index(index, ts))?;
                debug!(index = %name, "created index");
                Ok(StatementOutcome::Created {
                    kind: CatalogEntryKind::Index,
                    name,
                })
            }
            BoundStatement::Drop {
                kind,
                schema,
                name,
                if_exists,
            } => {
                let existed = self
                    .database
                    .commit(|catalog, ts| catalog.drop_entry(&schema, &name, kind, ts))?;
                if !existed && !if_exists {
                    return Err(RuduError::SchemaError(format!(
                        "{} with name {name} does not exist",
                        kind.as_str()
                    )));
                }
                debug!(name = %name, existed, "dropped {}", kind.as_str());
                Ok(StatementOutcome::Dropped {
                    kind,
                    name,
                    existed,
                })
            }
            BoundStatement::Prepare {
                name,
                select,
                parameters,
            } => {
                let prepared = Planner::new().plan_prepare(&name, select, parameters)?;
                let parameter_count = prepared.parameter_count();
                self.prepared.insert(name.clone(), prepared);
                debug!(name = %name, parameter_count, "prepared statement");
                Ok(StatementOutcome::Prepared {
                    name,
                    parameter_count,
                })
            }
            BoundStatement::Execute { name, values } => {
                let prepared = self.prepared.get(&name).ok_or_else(|| {
                    RuduError::BindError(format!("Prepared statement \"{name}\" does not exist"))
                })?;
                Ok(StatementOutcome::Execute(prepared.bind_execute(&values)?))
            }
            BoundStatement::Deallocate { name } => {
                if self.prepared.remove(&name).is_none() {
                    return Err(RuduError::BindError(format!(
                        "Prepared statement \"{name}\" does not exist"
                    )));
                }
                Ok(StatementOutcome::Deallocated { name })
            }
        }
    }

    /// Returns a prepared statement by name.
    #[must_use]
    pub fn prepared(&self, name: &str) -> Option<&PreparedStatement> {
        self.prepared.get(name)
    }

    /// Binds `values` to a prepared statement without going through SQL.
    ///
    /// Fails rather than waits while an earlier [`ExecutePlan`] of the same
    /// statement is alive. To wait for it from another thread, use
    /// [`PreparedStatement::bind_execute`] on [`Connection::prepared`].
    ///
    /// # Errors
    ///
    /// Returns an error if no statement has that name, the statement is
    /// already executing, or binding fails.
    pub fn execute(&self, name: &str, values: &[Value]) -> Result<ExecutePlan<'_>> {
        let prepared = self.prepared.get(name).ok_or_else(|| {
            RuduError::BindError(format!("Prepared statement \"{name}\" does not exist"))
        })?;
        prepared.try_bind_execute(values)
    }
}
