//! Table reference binding: CTE substitution, view expansion, base tables and
//! subqueries.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::{CatalogEntry, TableCatalogEntry};
use crate::error::{Result, RuduError};
use crate::parser::ast::{BaseTableRef, SubqueryRef, TableRef};

use super::cte::CteRegistry;
use super::semantic::{BindError, Binder, BoundSelect};

/// A table reference after binding.
#[derive(Debug, Clone)]
pub enum BoundTableRef {
    /// A catalog table.
    BaseTable(BoundBaseTableRef),
    /// A subquery, or a CTE or view expanded into one.
    Subquery(BoundSubqueryRef),
    /// Every row of `left` combined with every row of `right`.
    CrossProduct {
        left: Box<BoundTableRef>,
        right: Box<BoundTableRef>,
    },
}

impl BoundTableRef {
    /// Returns the scope indices this reference registered, left to right.
    #[must_use]
    pub fn table_indices(&self) -> Vec<usize> {
        match self {
            BoundTableRef::BaseTable(base) => vec![base.table_index],
            BoundTableRef::Subquery(sub) => vec![sub.table_index],
            BoundTableRef::CrossProduct { left, right } => {
                let mut indices = left.table_indices();
                indices.extend(right.table_indices());
                indices
            }
        }
    }
}

/// A bound catalog table.
#[derive(Debug, Clone)]
pub struct BoundBaseTableRef {
    pub table: Arc<TableCatalogEntry>,
    pub table_index: usize,
    pub alias: String,
}

/// A bound subquery together with its externally visible column names.
#[derive(Debug, Clone)]
pub struct BoundSubqueryRef {
    pub alias: String,
    pub table_index: usize,
    pub subquery: Box<BoundSelect>,
    /// Output names after column aliases were applied.
    pub column_names: Vec<String>,
}

impl Binder<'_> {
    /// Binds a table reference in the current scope.
    ///
    /// Every base or subquery reference registers exactly one entry in the
    /// current bind context; a cross product registers both of its sides.
    ///
    /// # Errors
    ///
    /// Returns an error if a name cannot be resolved, an alias is used twice in
    /// the same scope, or the referenced relation is not a table or view.
    pub fn bind_table_ref(&mut self, table_ref: &TableRef) -> Result<BoundTableRef> {
        match table_ref {
            TableRef::Base(base) => self.bind_base_table_ref(base),
            TableRef::Subquery(subquery) => self
                .bind_subquery_ref(subquery)
                .map(BoundTableRef::Subquery),
            TableRef::CrossProduct { left, right } => {
                let left = self.bind_table_ref(left)?;
                let right = self.bind_table_ref(right)?;
                Ok(BoundTableRef::CrossProduct {
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
        }
    }

    /// Binds a named table reference.
    ///
    /// CTEs take precedence over catalog relations of the same name. Views are
    /// expanded into subqueries over a fresh copy of their stored query, with
    /// their declared column aliases renaming the leading output columns.
    ///
    /// # Errors
    ///
    /// See [`Binder::bind_table_ref`].
    pub fn bind_base_table_ref(&mut self, base: &BaseTableRef) -> Result<BoundTableRef> {
        let alias = base.alias.clone().unwrap_or_else(|| base.name.clone());

        if let Some((cte, definition_scope)) = self.ctes.find(&base.name) {
            debug!(cte = %base.name, alias = %alias, "table reference resolved to CTE");
            let subquery = SubqueryRef {
                query: cte.query.clone(),
                alias: Some(alias),
                column_aliases: cte.column_aliases.clone(),
            };
            return self
                .bind_subquery_in(&subquery, definition_scope, ExtraAliases::Reject)
                .map(BoundTableRef::Subquery);
        }

        let config = self.config;
        let schema = base.schema.as_deref().unwrap_or(&config.default_schema);
        match self
            .catalog
            .get_table_or_view(self.transaction, schema, &base.name)?
        {
            CatalogEntry::Table(table) => {
                let table_index = self.generate_table_index();
                self.bind_context
                    .add_base_table(&alias, table_index, &table)?;
                debug!(table = %table.name, alias = %alias, table_index, "bound base table");
                Ok(BoundTableRef::BaseTable(BoundBaseTableRef {
                    table,
                    table_index,
                    alias,
                }))
            }
            CatalogEntry::View(view) => {
                debug!(view = %view.name, alias = %alias, "expanding view");
                let subquery = SubqueryRef {
                    query: Box::new(view.query.clone()),
                    alias: Some(alias),
                    column_aliases: view.aliases.clone(),
                };
                // The underlying tables may have lost columns since the view
                // was created; surplus aliases are dropped.
                self.bind_subquery_in(&subquery, CteRegistry::new(), ExtraAliases::Ignore)
                    .map(BoundTableRef::Subquery)
            }
            other => Err(RuduError::Internal(format!(
                "Catalog entry type '{}' cannot be used as a table reference: {schema}.{}",
                other.kind(),
                other.name()
            ))),
        }
    }

    /// Binds a parenthesized subquery in the FROM clause. The subquery sees the
    /// CTEs of the enclosing scope but none of its sources.
    ///
    /// # Errors
    ///
    /// Returns an error if the subquery fails to bind, it has fewer output
    /// columns than column aliases, or its alias is already taken.
    pub fn bind_subquery_ref(&mut self, subquery: &SubqueryRef) -> Result<BoundSubqueryRef> {
        let ctes = self.ctes.clone();
        self.bind_subquery_in(subquery, ctes, ExtraAliases::Reject)
    }

    fn bind_subquery_in(
        &mut self,
        subquery: &SubqueryRef,
        ctes: CteRegistry,
        extra_aliases: ExtraAliases,
    ) -> Result<BoundSubqueryRef> {
        let bound = self.with_nested_scope(ctes, |binder| binder.bind_select_node(&subquery.query))?;

        if extra_aliases == ExtraAliases::Reject
            && subquery.column_aliases.len() > bound.names.len()
        {
            return Err(BindError::TooManyColumnAliases {
                relation: subquery
                    .alias
                    .clone()
                    .unwrap_or_else(|| "subquery".to_string()),
                aliases: subquery.column_aliases.len(),
                columns: bound.names.len(),
            }
            .into());
        }
        let mut column_names = bound.names.clone();
        for (name, alias) in column_names.iter_mut().zip(&subquery.column_aliases) {
            name.clone_from(alias);
        }

        let table_index = self.generate_table_index();
        let alias = match &subquery.alias {
            Some(alias) => alias.clone(),
            None => self.anonymous_subquery_alias(table_index),
        };
        self.bind_context.add_subquery(
            &alias,
            table_index,
            column_names.clone(),
            bound.types.clone(),
        )?;

        Ok(BoundSubqueryRef {
            alias,
            table_index,
            subquery: Box::new(bound),
            column_names,
        })
    }

    /// Picks `subquery_<index>`, adding a numeric suffix while the name is
    /// already bound in the current scope.
    fn anonymous_subquery_alias(&self, table_index: usize) -> String {
        let base = format!("subquery_{table_index}");
        let mut alias = base.clone();
        let mut suffix = 1;
        while self.bind_context.get_binding(&alias).is_some() {
            alias = format!("{base}_{suffix}");
            suffix += 1;
        }
        alias
    }
}

/// How a subquery treats column aliases beyond its output width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtraAliases {
    /// Fail with `TooManyColumnAliases`.
    Reject,
    /// Keep only as many aliases as there are output columns.
    Ignore,
}
