//! Bind context: the row-producing sources visible in one scope.

use std::collections::HashMap;

use crate::catalog::TableCatalogEntry;
use crate::types::DataType;

use super::semantic::BindError;

/// One registered source: an alias, its scope index and its visible columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// Alias the source is referenced by.
    pub alias: String,
    /// Scope index identifying the source within the statement.
    pub table_index: usize,
    /// Visible column names, in output order.
    pub column_names: Vec<String>,
    /// Column types, parallel to `column_names`.
    pub column_types: Vec<DataType>,
}

impl Binding {
    /// Finds the position of a column by name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }
}

/// A column reference resolved against a [`BindContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub table_index: usize,
    pub column_index: usize,
    pub data_type: DataType,
}

/// Alias-keyed registry of the sources visible in the current scope.
///
/// Bindings keep their registration order, which is the order `*` expands in.
#[derive(Debug, Clone, Default)]
pub struct BindContext {
    bindings: Vec<Binding>,
    by_alias: HashMap<String, usize>,
}

impl BindContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a base table under `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias is already taken in this scope.
    pub fn add_base_table(
        &mut self,
        alias: &str,
        table_index: usize,
        table: &TableCatalogEntry,
    ) -> Result<(), BindError> {
        self.add_binding(Binding {
            alias: alias.to_string(),
            table_index,
            column_names: table.columns.iter().map(|c| c.name.clone()).collect(),
            column_types: table.columns.iter().map(|c| c.data_type).collect(),
        })
    }

    /// Registers a subquery's output columns under `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias is already taken in this scope.
    pub fn add_subquery(
        &mut self,
        alias: &str,
        table_index: usize,
        column_names: Vec<String>,
        column_types: Vec<DataType>,
    ) -> Result<(), BindError> {
        self.add_binding(Binding {
            alias: alias.to_string(),
            table_index,
            column_names,
            column_types,
        })
    }

    fn add_binding(&mut self, binding: Binding) -> Result<(), BindError> {
        if self.by_alias.contains_key(&binding.alias) {
            return Err(BindError::DuplicateAlias(binding.alias));
        }
        self.by_alias
            .insert(binding.alias.clone(), self.bindings.len());
        self.bindings.push(binding);
        Ok(())
    }

    /// Looks up a binding by alias.
    #[must_use]
    pub fn get_binding(&self, alias: &str) -> Option<&Binding> {
        self.by_alias.get(alias).map(|&i| &self.bindings[i])
    }

    /// Returns all bindings in registration order.
    #[must_use]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Returns the number of registered sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true if no source is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Resolves a possibly qualified column reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the alias or column is unknown, or if an unqualified
    /// name matches columns of more than one source.
    pub fn bind_column(&self, table: Option<&str>, column: &str) -> Result<ColumnBinding, BindError> {
        if let Some(alias) = table {
            let binding = self
                .get_binding(alias)
                .ok_or_else(|| BindError::UndefinedAlias(alias.to_string()))?;
            let column_index = binding.column_index(column).ok_or_else(|| {
                BindError::UndefinedColumn(alias.to_string(), column.to_string())
            })?;
            return Ok(ColumnBinding {
                table_index: binding.table_index,
                column_index,
                data_type: binding.column_types[column_index],
            });
        }

        let mut found: Option<ColumnBinding> = None;
        for binding in &self.bindings {
            if let Some(column_index) = binding.column_index(column) {
                if found.is_some() {
                    return Err(BindError::AmbiguousColumn(column.to_string()));
                }
                found = Some(ColumnBinding {
                    table_index: binding.table_index,
                    column_index,
                    data_type: binding.column_types[column_index],
                });
            }
        }
        found.ok_or_else(|| BindError::UnresolvedColumn(column.to_string()))
    }
}
