//! Semantic analysis and binding.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::datatypes::{Field, Schema};
use tracing::debug;

use crate::catalog::{
    CatalogEntry, CatalogLookup, ColumnDef, IndexCatalogEntry, TableCatalogEntry, Transaction,
    ViewCatalogEntry,
};
use crate::error::{Result, RuduError};
use crate::parser::ast::{
    ComparisonOp, DropKind, Expression, Literal, SelectItem, SelectStatement, Statement,
};
use crate::types::{DataType, Value};

use super::bind_context::BindContext;
use super::cte::CteRegistry;
use super::expression::{BoundExpression, ParameterSlot};
use super::table_ref::BoundTableRef;
use super::BinderConfig;

/// Errors that can occur during binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// Referenced a schema that does not exist.
    UndefinedSchema(String),
    /// Referenced a table, view or CTE that does not exist.
    UndefinedTable(String),
    /// Qualified a column with an alias that is not in scope.
    UndefinedAlias(String),
    /// Referenced a column the aliased source does not have.
    UndefinedColumn(String, String),
    /// Unqualified column name not found in any source.
    UnresolvedColumn(String),
    /// Unqualified column name found in more than one source.
    AmbiguousColumn(String),
    /// Two sources in one scope share an alias.
    DuplicateAlias(String),
    /// The same name defined twice in one WITH clause.
    DuplicateCte(String),
    /// More column aliases than output columns.
    TooManyColumnAliases {
        relation: String,
        aliases: usize,
        columns: usize,
    },
    /// Type mismatch in expression.
    TypeMismatch {
        expected: DataType,
        actual: DataType,
    },
    /// Comparison between incompatible types.
    IncomparableTypes {
        left: DataType,
        op: ComparisonOp,
        right: DataType,
    },
    /// `*` used without a FROM clause.
    WildcardWithoutFrom,
    /// Parameter placeholder outside of PREPARE.
    UnexpectedParameter(usize),
    /// Parameter placeholder whose type cannot be inferred from context.
    ParameterTypeUnresolved(usize),
    /// Parameter placeholder used with two different types.
    ParameterTypeConflict {
        index: usize,
        first: DataType,
        second: DataType,
    },
    /// EXECUTE argument that is not a constant.
    NonConstantArgument(String),
    /// Subquery, view or CTE nesting deeper than the configured limit.
    MaxDepthExceeded(usize),
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::UndefinedSchema(name) => write!(f, "Schema with name {name} does not exist"),
            BindError::UndefinedTable(name) => write!(f, "Table with name {name} does not exist"),
            BindError::UndefinedAlias(alias) => {
                write!(f, "Referenced table \"{alias}\" not found in FROM clause")
            }
            BindError::UndefinedColumn(table, col) => {
                write!(f, "Table \"{table}\" does not have a column named \"{col}\"")
            }
            BindError::UnresolvedColumn(col) => {
                write!(f, "Referenced column \"{col}\" not found in FROM clause")
            }
            BindError::AmbiguousColumn(col) => write!(f, "Ambiguous column reference \"{col}\""),
            BindError::DuplicateAlias(alias) => {
                write!(f, "Duplicate alias \"{alias}\" in query")
            }
            BindError::DuplicateCte(name) => write!(f, "Duplicate CTE name \"{name}\""),
            BindError::TooManyColumnAliases {
                relation,
                aliases,
                columns,
            } => write!(
                f,
                "{relation} has {columns} columns available but {aliases} column aliases specified"
            ),
            BindError::TypeMismatch { expected, actual } => {
                write!(f, "Type mismatch: expected {expected}, got {actual}")
            }
            BindError::IncomparableTypes { left, op, right } => write!(
                f,
                "Cannot compare values of type {left} and {right} with '{}'",
                op.as_str()
            ),
            BindError::WildcardWithoutFrom => {
                write!(f, "SELECT * with no tables specified is not valid")
            }
            BindError::UnexpectedParameter(index) => {
                write!(f, "Parameter ${index} is only allowed in PREPARE")
            }
            BindError::ParameterTypeUnresolved(index) => {
                write!(f, "Could not determine the type of parameter ${index}")
            }
            BindError::ParameterTypeConflict {
                index,
                first,
                second,
            } => write!(f, "Parameter ${index} used as both {first} and {second}"),
            BindError::NonConstantArgument(expr) => {
                write!(f, "EXECUTE arguments must be constants, got {expr}")
            }
            BindError::MaxDepthExceeded(depth) => {
                write!(f, "Maximum binding depth of {depth} exceeded")
            }
        }
    }
}

impl std::error::Error for BindError {}

impl From<BindError> for RuduError {
    fn from(err: BindError) -> Self {
        RuduError::BindError(err.to_string())
    }
}

/// Bound statement after semantic analysis.
#[derive(Debug)]
pub enum BoundStatement {
    /// Bound query.
    Select(BoundSelect),
    /// Validated table definition, ready to be added to the catalog.
    CreateTable(TableCatalogEntry),
    /// Validated view definition.
    CreateView(ViewCatalogEntry),
    /// Validated index definition.
    CreateIndex(IndexCatalogEntry),
    /// DROP with the schema resolved.
    Drop {
        kind: DropKind,
        schema: String,
        name: String,
        if_exists: bool,
    },
    /// Bound PREPARE body with the placeholders it declares.
    Prepare {
        name: String,
        select: BoundSelect,
        parameters: BTreeMap<usize, Arc<ParameterSlot>>,
    },
    /// EXECUTE with its arguments folded to values.
    Execute { name: String, values: Vec<Value> },
    /// DEALLOCATE.
    Deallocate { name: String },
}

/// A bound SELECT.
#[derive(Debug, Clone)]
pub struct BoundSelect {
    /// Bound FROM clause.
    pub from: Option<BoundTableRef>,
    /// Bound WHERE clause.
    pub where_clause: Option<BoundExpression>,
    /// Projected expressions, with `*` expanded.
    pub select_list: Vec<BoundExpression>,
    /// Output column names.
    pub names: Vec<String>,
    /// Output column types.
    pub types: Vec<DataType>,
    /// Sources visible in this SELECT's scope.
    pub bind_context: BindContext,
}

impl BoundSelect {
    /// Returns the number of output columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    /// Returns the output as an Arrow schema.
    #[must_use]
    pub fn arrow_schema(&self) -> Schema {
        Schema::new(
            self.names
                .iter()
                .zip(&self.types)
                .map(|(name, ty)| Field::new(name, ty.to_arrow(), true))
                .collect::<Vec<_>>(),
        )
    }
}

/// Main binder for semantic analysis.
///
/// One binder binds one statement: scope indices are unique across everything
/// it binds.
pub struct Binder<'a> {
    /// Relation lookup.
    pub(super) catalog: &'a dyn CatalogLookup,
    /// Snapshot the catalog is read at.
    pub(super) transaction: &'a Transaction,
    pub(super) config: &'a BinderConfig,
    /// Sources of the scope being bound.
    pub(super) bind_context: BindContext,
    /// CTEs visible in the scope being bound.
    pub(super) ctes: CteRegistry,
    next_table_index: usize,
    depth: usize,
    /// Placeholders collected so far; None outside of PREPARE.
    parameters: Option<BTreeMap<usize, Arc<ParameterSlot>>>,
}

impl<'a> Binder<'a> {
    /// Creates a new binder reading `catalog` at the snapshot of `transaction`.
    #[must_use]
    pub fn new(
        catalog: &'a dyn CatalogLookup,
        transaction: &'a Transaction,
        config: &'a BinderConfig,
    ) -> Self {
        Binder {
            catalog,
            transaction,
            config,
            bind_context: BindContext::new(),
            ctes: CteRegistry::new(),
            next_table_index: 0,
            depth: 0,
            parameters: None,
        }
    }

    /// Makes `ctes` visible to table references bound in the current scope.
    #[must_use]
    pub fn with_ctes(mut self, ctes: CteRegistry) -> Self {
        self.ctes = ctes;
        self
    }

    /// Returns the bind context of the current scope.
    #[must_use]
    pub fn bind_context(&self) -> &BindContext {
        &self.bind_context
    }

    /// Allocates the next scope index.
    pub(super) fn generate_table_index(&mut self) -> usize {
        let index = self.next_table_index;
        self.next_table_index += 1;
        index
    }

    /// Runs `f` in a fresh scope seeing `ctes`, restoring the current scope
    /// afterwards whether or not `f` succeeds.
    pub(super) fn with_nested_scope<T>(
        &mut self,
        ctes: CteRegistry,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.depth >= self.config.max_depth {
            return Err(BindError::MaxDepthExceeded(self.config.max_depth).into());
        }
        let saved_context = std::mem::take(&mut self.bind_context);
        let saved_ctes = std::mem::replace(&mut self.ctes, ctes);
        self.depth += 1;

        let result = f(self);

        self.depth -= 1;
        self.bind_context = saved_context;
        self.ctes = saved_ctes;
        result
    }

    /// Binds a statement.
    ///
    /// # Errors
    ///
    /// Returns an error if any name cannot be resolved or any expression is
    /// ill-typed.
    pub fn bind_statement(&mut self, statement: &Statement) -> Result<BoundStatement> {
        match statement {
            Statement::Select(select) => self.bind_select(select).map(BoundStatement::Select),
            Statement::CreateTable {
                schema,
                table_name,
                columns,
            } => {
                let columns = columns
                    .iter()
                    .map(|(name, data_type)| ColumnDef::new(name.clone(), *data_type))
                    .collect::<Result<Vec<_>>>()?;
                let table =
                    TableCatalogEntry::new(self.schema_name(schema.as_ref()), table_name.clone(), columns)?;
                Ok(BoundStatement::CreateTable(table))
            }
            Statement::CreateView {
                schema,
                view_name,
                aliases,
                query,
            } => {
                let bound = self.bind_select(query)?;
                if aliases.len() > bound.column_count() {
                    return Err(BindError::TooManyColumnAliases {
                        relation: view_name.clone(),
                        aliases: aliases.len(),
                        columns: bound.column_count(),
                    }
                    .into());
                }
                Ok(BoundStatement::CreateView(ViewCatalogEntry::new(
                    self.schema_name(schema.as_ref()),
                    view_name.clone(),
                    (**query).clone(),
                    aliases.clone(),
                )))
            }
            Statement::CreateIndex {
                index_name,
                schema,
                table_name,
                columns,
            } => {
                let schema = self.schema_name(schema.as_ref());
                let CatalogEntry::Table(table) =
                    self.catalog
                        .get_table_or_view(self.transaction, &schema, table_name)?
                else {
                    return Err(RuduError::SchemaError(format!(
                        "'{schema}.{table_name}' is not a table"
                    )));
                };
                if let Some(missing) = columns.iter().find(|c| table.get_column(c).is_none()) {
                    return Err(BindError::UndefinedColumn(table_name.clone(), missing.clone()).into());
                }
                Ok(BoundStatement::CreateIndex(IndexCatalogEntry::new(
                    schema,
                    index_name.clone(),
                    table_name.clone(),
                    columns.clone(),
                )))
            }
            Statement::Drop {
                kind,
                schema,
                name,
                if_exists,
            } => Ok(BoundStatement::Drop {
                kind: *kind,
                schema: self.schema_name(schema.as_ref()),
                name: name.clone(),
                if_exists: *if_exists,
            }),
            Statement::Prepare { name, statement } => {
                let saved = self.parameters.replace(BTreeMap::new());
                let result = self.bind_select(statement);
                let parameters = std::mem::replace(&mut self.parameters, saved).unwrap_or_default();
                let select = result?;
                debug!(name = %name, parameters = parameters.len(), "bound prepared statement");
                Ok(BoundStatement::Prepare {
                    name: name.clone(),
                    select,
                    parameters,
                })
            }
            Statement::Execute { name, arguments } => {
                let values = arguments
                    .iter()
                    .map(fold_constant)
                    .collect::<Result<Vec<_>>>()?;
                Ok(BoundStatement::Execute {
                    name: name.clone(),
                    values,
                })
            }
            Statement::Deallocate { name } => Ok(BoundStatement::Deallocate { name: name.clone() }),
        }
    }

    fn schema_name(&self, schema: Option<&String>) -> String {
        schema.map_or_else(|| self.config.default_schema.clone(), Clone::clone)
    }

    /// Binds a SELECT in its own scope. The SELECT sees the CTEs visible in
    /// the current scope, but none of its sources.
    ///
    /// # Errors
    ///
    /// Returns an error if any name cannot be resolved or any expression is
    /// ill-typed.
    pub fn bind_select(&mut self, select: &SelectStatement) -> Result<BoundSelect> {
        let ctes = self.ctes.clone();
        self.with_nested_scope(ctes, |binder| binder.bind_select_node(select))
    }

    /// Binds a SELECT into the current (fresh) scope.
    pub(super) fn bind_select_node(&mut self, select: &SelectStatement) -> Result<BoundSelect> {
        for (i, cte) in select.ctes.iter().enumerate() {
            if select.ctes[..i].iter().any(|earlier| earlier.name == cte.name) {
                return Err(BindError::DuplicateCte(cte.name.clone()).into());
            }
            self.ctes = self.ctes.define(cte.clone());
        }

        let from = select
            .from
            .as_ref()
            .map(|table_ref| self.bind_table_ref(table_ref))
            .transpose()?;
        let where_clause = select
            .where_clause
            .as_ref()
            .map(|predicate| self.bind_predicate(predicate))
            .transpose()?;

        let mut select_list = Vec::new();
        let mut names = Vec::new();
        for item in &select.select_list {
            match item {
                SelectItem::Wildcard => {
                    if self.bind_context.is_empty() {
                        return Err(BindError::WildcardWithoutFrom.into());
                    }
                    for binding in self.bind_context.bindings() {
                        for (i, name) in binding.column_names.iter().enumerate() {
                            select_list.push(BoundExpression::ColumnRef {
                                table_index: binding.table_index,
                                column_index: i,
                                name: name.clone(),
                                data_type: binding.column_types[i],
                            });
                            names.push(name.clone());
                        }
                    }
                }
                SelectItem::QualifiedWildcard(alias) => {
                    let binding = self
                        .bind_context
                        .get_binding(alias)
                        .ok_or_else(|| BindError::UndefinedAlias(alias.clone()))?;
                    for (i, name) in binding.column_names.iter().enumerate() {
                        select_list.push(BoundExpression::ColumnRef {
                            table_index: binding.table_index,
                            column_index: i,
                            name: name.clone(),
                            data_type: binding.column_types[i],
                        });
                        names.push(name.clone());
                    }
                }
                SelectItem::Expression { expr, alias } => {
                    select_list.push(self.bind_expression(expr, None)?);
                    names.push(alias.clone().unwrap_or_else(|| expr.name()));
                }
            }
        }
        let types = select_list.iter().map(BoundExpression::data_type).collect();

        Ok(BoundSelect {
            from,
            where_clause,
            select_list,
            names,
            types,
            bind_context: std::mem::take(&mut self.bind_context),
        })
    }

    /// Binds an expression that must evaluate to BOOL.
    fn bind_predicate(&mut self, expr: &Expression) -> Result<BoundExpression> {
        let bound = self.bind_expression(expr, Some(DataType::Bool))?;
        if bound.data_type() != DataType::Bool {
            return Err(BindError::TypeMismatch {
                expected: DataType::Bool,
                actual: bound.data_type(),
            }
            .into());
        }
        Ok(bound)
    }

    /// Binds an expression against the current scope. `expected` is the type
    /// the context implies, used to type parameter placeholders.
    fn bind_expression(
        &mut self,
        expr: &Expression,
        expected: Option<DataType>,
    ) -> Result<BoundExpression> {
        match expr {
            Expression::ColumnRef { table, column } => {
                let binding = self.bind_context.bind_column(table.as_deref(), column)?;
                Ok(BoundExpression::ColumnRef {
                    table_index: binding.table_index,
                    column_index: binding.column_index,
                    name: column.clone(),
                    data_type: binding.data_type,
                })
            }
            Expression::Literal(literal) => Ok(BoundExpression::literal(literal_value(literal))),
            Expression::Parameter(index) => self.bind_parameter(*index, expected),
            Expression::Cast { expr, data_type } => {
                let inner = self.bind_expression(expr, Some(*data_type))?;
                Ok(BoundExpression::Cast {
                    expr: Box::new(inner),
                    data_type: *data_type,
                })
            }
            Expression::Comparison { left, op, right } => {
                let is_parameter = |e: &Expression| matches!(e, Expression::Parameter(_));
                let (left, right) = if is_parameter(left) && !is_parameter(right) {
                    let right = self.bind_expression(right, None)?;
                    let left = self.bind_expression(left, Some(right.data_type()))?;
                    (left, right)
                } else if is_parameter(right) && !is_parameter(left) {
                    let left = self.bind_expression(left, None)?;
                    let right = self.bind_expression(right, Some(left.data_type()))?;
                    (left, right)
                } else {
                    (
                        self.bind_expression(left, None)?,
                        self.bind_expression(right, None)?,
                    )
                };

                let comparable = left.is_null_literal()
                    || right.is_null_literal()
                    || left.data_type().is_comparable_with(right.data_type());
                if !comparable {
                    return Err(BindError::IncomparableTypes {
                        left: left.data_type(),
                        op: *op,
                        right: right.data_type(),
                    }
                    .into());
                }
                Ok(BoundExpression::comparison(left, *op, right))
            }
            Expression::Logical { op, operands } => {
                let operands = operands
                    .iter()
                    .map(|operand| self.bind_predicate(operand))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BoundExpression::Logical { op: *op, operands })
            }
        }
    }

    fn bind_parameter(&mut self, index: usize, expected: Option<DataType>) -> Result<BoundExpression> {
        let Some(parameters) = self.parameters.as_mut() else {
            return Err(BindError::UnexpectedParameter(index).into());
        };
        let data_type = expected.ok_or(BindError::ParameterTypeUnresolved(index))?;

        if let Some(slot) = parameters.get(&index) {
            if slot.data_type() != data_type {
                return Err(BindError::ParameterTypeConflict {
                    index,
                    first: slot.data_type(),
                    second: data_type,
                }
                .into());
            }
            return Ok(BoundExpression::Parameter(Arc::clone(slot)));
        }

        let slot = Arc::new(ParameterSlot::new(index, data_type));
        parameters.insert(index, Arc::clone(&slot));
        Ok(BoundExpression::Parameter(slot))
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(i) => Value::Int64(*i),
        Literal::Float(f) => Value::Float64(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Folds an EXECUTE argument to a value. Only literals and casts of constants
/// are accepted.
fn fold_constant(expr: &Expression) -> Result<Value> {
    match expr {
        Expression::Literal(literal) => Ok(literal_value(literal)),
        Expression::Cast { expr, data_type } => fold_constant(expr)?.cast_to(*data_type),
        other => Err(BindError::NonConstantArgument(other.to_string()).into()),
    }
}
